//! Feed acquisition and normalization for Feedline.
//!
//! [`source`] decides where a payload comes from (the live X API or the seeded
//! synthetic generator), [`twitter::parse`] turns whatever came back into
//! [`feedline_common::TweetRow`]s. Both modes emit the same wire shape, so the
//! parser never needs to know which one ran.
pub mod payload;
pub mod source;
pub mod synthetic;
pub mod twitter;

pub use payload::Payload;
pub use source::{source_from_config, LiveSource, PayloadSource, SourceConfig, SourceMode};
pub use synthetic::SyntheticSource;
pub use twitter::parse::{parse, parse_with_report, ParseReport};
