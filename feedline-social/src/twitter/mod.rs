//! X (Twitter) v2 integration: HTTP wrapper, wire types and the row parser.
pub mod client;
pub mod parse;
pub mod types;

pub use client::TwitterApi;
