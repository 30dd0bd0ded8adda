#![allow(dead_code)]

use std::sync::OnceLock;

use feedline_common::observability::{LogConfig, LogFormat};
use feedline_store::{StoreConfig, TweetStore};
use tempfile::TempDir;

static INIT_PATH: OnceLock<std::path::PathBuf> = OnceLock::new();

pub fn init_test_tracing() {
    let _ = INIT_PATH.get_or_init(|| {
        let config = LogConfig {
            app_name: "feedline-tests",
            emit_stderr: true,
            format: if std::env::var("FEEDLINE_LOG_FORMAT")
                .map(|raw| raw.trim().eq_ignore_ascii_case("json"))
                .unwrap_or(false)
            {
                LogFormat::Json
            } else {
                LogFormat::Text
            },
            default_filter: "debug".to_string(),
            log_dir: Some(std::env::temp_dir().join("feedline-tests")),
        };

        feedline_common::observability::init_logging(config).unwrap_or_default()
    });
}

/// File-backed store with the schema applied; keep the `TempDir` alive.
pub async fn temp_store() -> anyhow::Result<(TempDir, TweetStore)> {
    let tmp = TempDir::new()?;
    let store = TweetStore::connect(&StoreConfig {
        database_url: format!("sqlite://{}", tmp.path().join("feedline.db").display()),
        ..Default::default()
    })
    .await?;
    store.ensure_schema().await?;
    Ok((tmp, store))
}
