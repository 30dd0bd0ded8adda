//! Payload acquisition: one trait, a live and a synthetic implementation, and a
//! factory that picks between them from an explicit [`SourceConfig`].
use crate::payload::Payload;
use crate::synthetic::SyntheticSource;
use crate::twitter::client::{TwitterApi, DEFAULT_BASE_URL};
use async_trait::async_trait;
use feedline_common::{IngestError, ProviderError, Result};
use feedline_http::{sanitize_bearer, HttpError};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// Something that can hand back a provider-shaped feed payload.
#[async_trait]
pub trait PayloadSource: Send + Sync {
    /// Fetch up to `max_results` tweets for `provider_user_id`.
    ///
    /// Fails with [`IngestError::Auth`] for an empty/malformed bearer and
    /// [`IngestError::Config`] for `max_results == 0` or a blank user id.
    async fn fetch(
        &self,
        bearer: &str,
        provider_user_id: &str,
        max_results: u32,
    ) -> Result<Payload>;

    /// Default `src` tag for rows parsed from this source.
    fn label(&self) -> &str;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SourceMode {
    Live,
    #[default]
    Synthetic,
}

impl FromStr for SourceMode {
    type Err = IngestError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "live" => Ok(SourceMode::Live),
            "synthetic" => Ok(SourceMode::Synthetic),
            other => Err(IngestError::Config(format!(
                "unknown source mode `{other}` (expected `live` or `synthetic`)"
            ))),
        }
    }
}

/// Selects and parameterizes the payload source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceConfig {
    pub mode: SourceMode,
    /// Only read in synthetic mode.
    pub seed: u64,
    /// Only read in live mode.
    pub base_url: String,
    pub timeout: Duration,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            mode: SourceMode::Synthetic,
            seed: 0,
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(15),
        }
    }
}

pub fn source_from_config(cfg: &SourceConfig) -> Result<Arc<dyn PayloadSource>> {
    tracing::info!(mode = ?cfg.mode, "source.selected");
    match cfg.mode {
        SourceMode::Synthetic => Ok(Arc::new(SyntheticSource::new(cfg.seed))),
        SourceMode::Live => Ok(Arc::new(LiveSource::new(&cfg.base_url, cfg.timeout)?)),
    }
}

/// Argument checks shared by every source, performed before any I/O.
pub(crate) fn validate_request(bearer: &str, provider_user_id: &str, max_results: u32) -> Result<()> {
    if bearer.trim().is_empty() {
        return Err(IngestError::Auth("bearer token is empty".into()));
    }
    sanitize_bearer(bearer).map_err(|e| IngestError::Auth(e.to_string()))?;

    let uid = provider_user_id.trim();
    if uid.is_empty() {
        return Err(IngestError::Config("provider user id is empty".into()));
    }
    if uid.contains(['/', '?', '#']) || uid.chars().any(char::is_whitespace) {
        return Err(IngestError::Config(format!(
            "provider user id `{uid}` is not a valid path segment"
        )));
    }
    if max_results == 0 {
        return Err(IngestError::Config("max_results must be positive".into()));
    }
    Ok(())
}

/// Calls the real X v2 timeline endpoint.
#[derive(Clone)]
pub struct LiveSource {
    api: TwitterApi,
}

impl LiveSource {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let api = TwitterApi::new(base_url, timeout)
            .map_err(|e| IngestError::Config(format!("live source: {e}")))?;
        Ok(Self { api })
    }
}

#[async_trait]
impl PayloadSource for LiveSource {
    async fn fetch(
        &self,
        bearer: &str,
        provider_user_id: &str,
        max_results: u32,
    ) -> Result<Payload> {
        validate_request(bearer, provider_user_id, max_results)?;
        let value = self
            .api
            .user_tweets(bearer, provider_user_id.trim(), max_results)
            .await
            .map_err(provider_error)?;
        Ok(Payload::new(value))
    }

    fn label(&self) -> &str {
        "live"
    }
}

fn provider_error(err: HttpError) -> IngestError {
    let mapped = match err {
        HttpError::Api {
            status,
            message,
            retry_after_secs,
            ..
        } => match status.as_u16() {
            429 => ProviderError::RateLimited {
                retry_after_secs,
                message,
            },
            code @ (401 | 403) => ProviderError::Unauthorized {
                status: code,
                message,
            },
            code if status.is_server_error() => ProviderError::Unavailable {
                status: code,
                message,
            },
            code => ProviderError::Rejected {
                status: code,
                message,
            },
        },
        HttpError::Timeout(_) => ProviderError::Timeout,
        HttpError::Network(msg) => ProviderError::Network(msg),
        HttpError::Decode(msg, _) => ProviderError::Decode(msg),
        HttpError::Build(msg) => return IngestError::Auth(msg),
        HttpError::Url(msg) => return IngestError::Config(msg),
    };
    tracing::warn!(error = %mapped, retryable = mapped.is_retryable(), "source.live.failed");
    IngestError::Provider(mapped)
}
