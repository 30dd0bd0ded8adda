//! One ingestion run: fetch a payload, parse it into rows, upsert them.
//!
//! The pipeline holds no state of its own between runs; everything durable
//! lives in the [`TweetStore`]. Failures surface unchanged and are never
//! retried here.
use std::sync::Arc;

use feedline_common::{Result, TweetRow};
use feedline_social::{parse_with_report, PayloadSource};
use feedline_store::TweetStore;
use tracing::{info, instrument};

/// Counts from a single run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunReport {
    /// Entries present in the fetched payload.
    pub fetched: usize,
    /// Entries the parser dropped.
    pub skipped: usize,
    /// Rows whose `tid` was new for the owner.
    pub inserted: u64,
}

#[derive(Clone)]
pub struct Pipeline {
    source: Arc<dyn PayloadSource>,
    store: TweetStore,
    src: Option<String>,
}

impl Pipeline {
    pub fn new(source: Arc<dyn PayloadSource>, store: TweetStore) -> Self {
        Self {
            source,
            store,
            src: None,
        }
    }

    /// Tag rows with `src` instead of the source's own label.
    pub fn with_src(mut self, src: impl Into<String>) -> Self {
        self.src = Some(src.into());
        self
    }

    pub fn src(&self) -> &str {
        self.src.as_deref().unwrap_or_else(|| self.source.label())
    }

    pub fn store(&self) -> &TweetStore {
        &self.store
    }

    /// Returns the number of newly inserted rows.
    pub async fn run(
        &self,
        bearer: &str,
        provider_user_id: &str,
        owner_user_id: i64,
        max_results: u32,
    ) -> Result<u64> {
        self.run_with_report(bearer, provider_user_id, owner_user_id, max_results)
            .await
            .map(|r| r.inserted)
    }

    #[instrument(
        name = "pipeline.run",
        skip(self, bearer),
        fields(src = %self.src(), source = self.source.label())
    )]
    pub async fn run_with_report(
        &self,
        bearer: &str,
        provider_user_id: &str,
        owner_user_id: i64,
        max_results: u32,
    ) -> Result<RunReport> {
        let payload = self
            .source
            .fetch(bearer, provider_user_id, max_results)
            .await?;
        let fetched = payload.entry_count();

        let parsed = parse_with_report(&payload, self.src())?;
        let inserted = self.store.upsert(owner_user_id, &parsed.rows).await?;

        let report = RunReport {
            fetched,
            skipped: parsed.skipped,
            inserted,
        };
        info!(
            owner_user_id,
            fetched = report.fetched,
            parsed = parsed.rows.len(),
            skipped = report.skipped,
            inserted = report.inserted,
            "pipeline.run.done"
        );
        Ok(report)
    }

    /// Newest-first rows for `owner_user_id`.
    pub async fn list(&self, owner_user_id: i64, limit: i64) -> Result<Vec<TweetRow>> {
        self.store.list(owner_user_id, limit).await
    }
}
