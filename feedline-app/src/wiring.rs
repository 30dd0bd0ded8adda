use anyhow::{Context, Result};
use feedline_common::observability::LogConfig;
use feedline_config::{FeedlineConfig, LoggingSection, SourceSection, StoreSection};
use feedline_pipeline::Pipeline;
use feedline_social::{SourceConfig, SourceMode, source_from_config};
use feedline_store::{StoreConfig, TweetStore};

pub fn log_config(cfg: &LoggingSection) -> LogConfig {
    LogConfig {
        app_name: "feedline",
        log_dir: cfg.log_dir.clone(),
        emit_stderr: cfg.emit_stderr,
        format: cfg.format,
        default_filter: cfg.default_filter.clone(),
    }
}

pub fn source_config(cfg: &SourceSection) -> Result<SourceConfig> {
    let mode: SourceMode = cfg.mode.parse().context("source.mode")?;
    Ok(SourceConfig {
        mode,
        seed: cfg.seed,
        base_url: cfg.base_url.clone(),
        timeout: cfg.timeout(),
    })
}

pub fn store_config(cfg: &StoreSection) -> StoreConfig {
    StoreConfig {
        database_url: cfg.database_url.clone(),
        max_connections: cfg.max_connections,
        busy_timeout: cfg.busy_timeout(),
        op_timeout: cfg.op_timeout(),
    }
}

/// Open the store, provision the schema and pick the payload source.
pub async fn build_from_config(cfg: &FeedlineConfig) -> Result<Pipeline> {
    let source = source_from_config(&source_config(&cfg.source)?)?;
    let store = TweetStore::connect(&store_config(&cfg.store))
        .await
        .with_context(|| format!("opening {}", cfg.store.database_url))?;
    store.ensure_schema().await?;
    Ok(Pipeline::new(source, store))
}
