//! Shared types and utilities for the Feedline ingestion workspace.
//!
//! Every other crate depends on this one, so it stays small: the canonical
//! [`TweetRow`], the error taxonomy ([`IngestError`], [`ProviderError`],
//! [`StorageError`]) and the [`observability`] helpers.
//!
//! # Examples
//!
//! ```rust
//! use feedline_common::TweetRow;
//!
//! let row = TweetRow::new("1790000000000000001", "hello from the feed", "test");
//! assert!(row.is_valid());
//! assert!(row.author_id.is_none());
//! ```
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub mod observability;

/// Canonical, provider-agnostic tweet record produced by the parser and
/// persisted by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TweetRow {
    /// External id assigned by the provider; dedup key within an owner.
    pub tid: String,
    pub text: String,
    /// Tag of the payload source that produced the row (`"live"`, `"test"`, ...).
    pub src: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lang: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<TweetMetrics>,
}

impl TweetRow {
    /// Row with only the required fields set.
    pub fn new(tid: impl Into<String>, text: impl Into<String>, src: impl Into<String>) -> Self {
        Self {
            tid: tid.into(),
            text: text.into(),
            src: src.into(),
            author_id: None,
            author_username: None,
            author_name: None,
            created_at: None,
            lang: None,
            conversation_id: None,
            metrics: None,
        }
    }

    /// A row is persistable only with a non-blank id and body.
    pub fn is_valid(&self) -> bool {
        !self.tid.trim().is_empty() && !self.text.trim().is_empty()
    }
}

/// Engagement counters as reported by the provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TweetMetrics {
    pub like_count: Option<u64>,
    #[serde(alias = "retweet_count")]
    pub repost_count: Option<u64>,
    pub reply_count: Option<u64>,
    pub quote_count: Option<u64>,
}

/// Failures surfaced by the ingestion core.
#[derive(thiserror::Error, Debug)]
pub enum IngestError {
    /// Invalid caller-supplied parameter.
    #[error("configuration error: {0}")]
    Config(String),

    /// Missing or malformed credential.
    #[error("auth error: {0}")]
    Auth(String),

    /// Live fetch failed.
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Persistence failed; nothing from the failing call was committed.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// The payload was absent or its root had an unusable shape.
    #[error("malformed payload: {0}")]
    Payload(String),
}

impl IngestError {
    /// Whether a caller may reasonably retry the same call after backing off.
    pub fn is_retryable(&self) -> bool {
        match self {
            IngestError::Provider(e) => e.is_retryable(),
            IngestError::Storage(StorageError::Timeout { .. }) => true,
            _ => false,
        }
    }
}

/// Live provider failures, split into retryable and terminal kinds.
#[derive(thiserror::Error, Debug)]
pub enum ProviderError {
    #[error("rate limited (retry after {retry_after_secs:?}s): {message}")]
    RateLimited {
        retry_after_secs: Option<u64>,
        message: String,
    },
    #[error("unauthorized ({status}): {message}")]
    Unauthorized { status: u16, message: String },
    #[error("provider unavailable ({status}): {message}")]
    Unavailable { status: u16, message: String },
    #[error("request rejected ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("network failure: {0}")]
    Network(String),
    #[error("request timed out")]
    Timeout,
    #[error("undecodable response: {0}")]
    Decode(String),
}

impl ProviderError {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProviderError::RateLimited { .. }
                | ProviderError::Unavailable { .. }
                | ProviderError::Network(_)
                | ProviderError::Timeout
        )
    }
}

#[derive(thiserror::Error, Debug)]
pub enum StorageError {
    #[error("{op} timed out after {after:?}")]
    Timeout { op: &'static str, after: Duration },
    #[error(transparent)]
    Backend(Box<dyn std::error::Error + Send + Sync + 'static>),
}

impl StorageError {
    pub fn backend<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        StorageError::Backend(Box::new(err))
    }
}

/// Convenient alias for results that use [`IngestError`].
pub type Result<T> = std::result::Result<T, IngestError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_fields_are_invalid() {
        assert!(!TweetRow::new("", "text", "test").is_valid());
        assert!(!TweetRow::new("1", "   ", "test").is_valid());
        assert!(TweetRow::new("1", "text", "").is_valid());
    }

    #[test]
    fn retryability_follows_error_kind() {
        let limited = IngestError::from(ProviderError::RateLimited {
            retry_after_secs: Some(3),
            message: "slow down".into(),
        });
        assert!(limited.is_retryable());

        let denied = IngestError::from(ProviderError::Unauthorized {
            status: 401,
            message: "bad token".into(),
        });
        assert!(!denied.is_retryable());

        let timeout = IngestError::from(StorageError::Timeout {
            op: "store.upsert",
            after: Duration::from_secs(1),
        });
        assert!(timeout.is_retryable());

        assert!(!IngestError::Config("limit must be positive".into()).is_retryable());
        assert!(!IngestError::Auth("empty bearer".into()).is_retryable());
    }

    #[test]
    fn metrics_accept_retweet_alias() {
        let m: TweetMetrics =
            serde_json::from_str(r#"{"like_count":1,"retweet_count":4}"#).unwrap();
        assert_eq!(m.repost_count, Some(4));
        assert_eq!(m.reply_count, None);
    }
}
