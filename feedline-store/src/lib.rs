//! SQLite persistence for ingested tweets, scoped per owning account.
//!
//! Writes go through a single conflict-resolving statement keyed on
//! `(owner_user_id, tid)`, one transaction per [`TweetStore::upsert`] call, so
//! a batch lands entirely or not at all. The database runs in WAL mode, so
//! listings only ever see committed rows while ingestion is in flight. Every
//! call is bounded by `op_timeout` (plus SQLite's own busy timeout); an expired
//! call is rolled back when its transaction is dropped.
mod schema;

use chrono::{DateTime, Utc};
use feedline_common::{IngestError, Result, StorageError, TweetMetrics, TweetRow};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous,
};
use sqlx::{FromRow, SqlitePool};
use std::collections::HashSet;
use std::future::Future;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

const UPSERT_TWEET: &str = r#"
INSERT INTO tweets (
    owner_user_id, tid, text, src,
    author_id, author_username, author_name,
    created_at_ms, lang, conversation_id,
    like_count, repost_count, reply_count, quote_count,
    ingested_at_ms, updated_at_ms, ingest_run
)
VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?15, ?16)
ON CONFLICT(owner_user_id, tid) DO UPDATE SET
    text            = excluded.text,
    src             = excluded.src,
    author_id       = COALESCE(excluded.author_id, tweets.author_id),
    author_username = COALESCE(excluded.author_username, tweets.author_username),
    author_name     = COALESCE(excluded.author_name, tweets.author_name),
    created_at_ms   = COALESCE(excluded.created_at_ms, tweets.created_at_ms),
    lang            = COALESCE(excluded.lang, tweets.lang),
    conversation_id = COALESCE(excluded.conversation_id, tweets.conversation_id),
    like_count      = COALESCE(excluded.like_count, tweets.like_count),
    repost_count    = COALESCE(excluded.repost_count, tweets.repost_count),
    reply_count     = COALESCE(excluded.reply_count, tweets.reply_count),
    quote_count     = COALESCE(excluded.quote_count, tweets.quote_count),
    updated_at_ms   = excluded.updated_at_ms
WHERE tweets.text IS NOT excluded.text
   OR tweets.src IS NOT excluded.src
   OR tweets.author_id IS NOT COALESCE(excluded.author_id, tweets.author_id)
   OR tweets.author_username IS NOT COALESCE(excluded.author_username, tweets.author_username)
   OR tweets.author_name IS NOT COALESCE(excluded.author_name, tweets.author_name)
   OR tweets.created_at_ms IS NOT COALESCE(excluded.created_at_ms, tweets.created_at_ms)
   OR tweets.lang IS NOT COALESCE(excluded.lang, tweets.lang)
   OR tweets.conversation_id IS NOT COALESCE(excluded.conversation_id, tweets.conversation_id)
   OR tweets.like_count IS NOT COALESCE(excluded.like_count, tweets.like_count)
   OR tweets.repost_count IS NOT COALESCE(excluded.repost_count, tweets.repost_count)
   OR tweets.reply_count IS NOT COALESCE(excluded.reply_count, tweets.reply_count)
   OR tweets.quote_count IS NOT COALESCE(excluded.quote_count, tweets.quote_count)
RETURNING ingest_run
"#;

const LIST_TWEETS: &str = r#"
SELECT tid, text, src,
       author_id, author_username, author_name,
       created_at_ms, lang, conversation_id,
       like_count, repost_count, reply_count, quote_count
FROM tweets
WHERE owner_user_id = ?1
ORDER BY COALESCE(created_at_ms, ingested_at_ms) DESC, id DESC
LIMIT ?2
"#;

#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// e.g. `sqlite://feedline.db` or `sqlite::memory:`
    pub database_url: String,
    pub max_connections: u32,
    /// How long SQLite waits on a locked database before giving up.
    pub busy_timeout: Duration,
    /// Upper bound for any single store call, pool acquisition included.
    pub op_timeout: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://feedline.db".to_string(),
            max_connections: 5,
            busy_timeout: Duration::from_secs(5),
            op_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Clone)]
pub struct TweetStore {
    pool: SqlitePool,
    op_timeout: Duration,
}

#[derive(Debug, FromRow)]
struct TweetRecord {
    tid: String,
    text: String,
    src: String,
    author_id: Option<String>,
    author_username: Option<String>,
    author_name: Option<String>,
    created_at_ms: Option<i64>,
    lang: Option<String>,
    conversation_id: Option<String>,
    like_count: Option<i64>,
    repost_count: Option<i64>,
    reply_count: Option<i64>,
    quote_count: Option<i64>,
}

impl From<TweetRecord> for TweetRow {
    fn from(r: TweetRecord) -> Self {
        let metrics = TweetMetrics {
            like_count: from_i64(r.like_count),
            repost_count: from_i64(r.repost_count),
            reply_count: from_i64(r.reply_count),
            quote_count: from_i64(r.quote_count),
        };
        TweetRow {
            tid: r.tid,
            text: r.text,
            src: r.src,
            author_id: r.author_id,
            author_username: r.author_username,
            author_name: r.author_name,
            created_at: r.created_at_ms.and_then(DateTime::<Utc>::from_timestamp_millis),
            lang: r.lang,
            conversation_id: r.conversation_id,
            metrics: (metrics != TweetMetrics::default()).then_some(metrics),
        }
    }
}

struct UpsertOutcome {
    inserted: u64,
    updated: u64,
}

impl TweetStore {
    /// Open (creating if needed) the database described by `cfg`.
    pub async fn connect(cfg: &StoreConfig) -> Result<Self> {
        let url = cfg.database_url.as_str();
        let in_memory = url.contains(":memory:") || url.contains("mode=memory");

        let mut opts = SqliteConnectOptions::from_str(url)
            .map_err(|e| IngestError::Config(format!("invalid database url `{url}`: {e}")))?
            .create_if_missing(true)
            .busy_timeout(cfg.busy_timeout)
            .synchronous(SqliteSynchronous::Normal);
        if !in_memory {
            opts = opts.journal_mode(SqliteJournalMode::Wal);
        }

        // An in-memory database lives and dies with its single connection.
        let pool_opts = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(cfg.max_connections.max(1))
        };

        let pool = bounded(
            "store.connect",
            cfg.op_timeout,
            pool_opts.acquire_timeout(cfg.op_timeout).connect_with(opts),
        )
        .await?;
        info!(database_url = url, in_memory, "store.connected");
        Ok(Self::from_pool(pool, cfg.op_timeout))
    }

    pub fn from_pool(pool: SqlitePool, op_timeout: Duration) -> Self {
        Self { pool, op_timeout }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Create tables and indexes if absent. Safe on every start.
    pub async fn ensure_schema(&self) -> Result<()> {
        bounded("store.ensure_schema", self.op_timeout, async {
            let mut tx = self.pool.begin().await?;
            for stmt in schema::STATEMENTS {
                sqlx::query(*stmt).execute(&mut *tx).await?;
            }
            tx.commit().await
        })
        .await?;
        info!("store.ensure_schema");
        Ok(())
    }

    /// Insert-or-update `rows` for `owner_user_id`; returns how many `tid`s
    /// were new for that owner.
    ///
    /// Invalid rows are dropped before touching storage. Rows that already
    /// exist are updated in place when a mutable field changed and are not
    /// counted. On any failure nothing from this call is committed.
    pub async fn upsert(&self, owner_user_id: i64, rows: &[TweetRow]) -> Result<u64> {
        let valid: Vec<&TweetRow> = rows.iter().filter(|r| r.is_valid()).collect();
        let dropped = rows.len() - valid.len();
        if dropped > 0 {
            debug!(owner_user_id, dropped, "store.upsert.invalid_rows_dropped");
        }
        if valid.is_empty() {
            return Ok(0);
        }

        let run = Uuid::new_v4().to_string();
        let now_ms = Utc::now().timestamp_millis();
        let outcome = bounded(
            "store.upsert",
            self.op_timeout,
            upsert_batch(&self.pool, owner_user_id, &valid, &run, now_ms),
        )
        .await?;

        info!(
            owner_user_id,
            rows = valid.len(),
            inserted = outcome.inserted,
            updated = outcome.updated,
            "store.upsert"
        );
        Ok(outcome.inserted)
    }

    /// Newest-first rows for `owner_user_id`, at most `limit` of them.
    pub async fn list(&self, owner_user_id: i64, limit: i64) -> Result<Vec<TweetRow>> {
        if limit <= 0 {
            return Err(IngestError::Config(format!(
                "limit must be positive, got {limit}"
            )));
        }
        let records: Vec<TweetRecord> = bounded(
            "store.list",
            self.op_timeout,
            sqlx::query_as(LIST_TWEETS)
                .bind(owner_user_id)
                .bind(limit)
                .fetch_all(&self.pool),
        )
        .await?;
        debug!(owner_user_id, limit, rows = records.len(), "store.list");
        Ok(records.into_iter().map(TweetRow::from).collect())
    }

    /// Number of rows stored for `owner_user_id`.
    pub async fn count(&self, owner_user_id: i64) -> Result<i64> {
        bounded(
            "store.count",
            self.op_timeout,
            sqlx::query_scalar("SELECT COUNT(*) FROM tweets WHERE owner_user_id = ?1")
                .bind(owner_user_id)
                .fetch_one(&self.pool),
        )
        .await
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

async fn upsert_batch(
    pool: &SqlitePool,
    owner_user_id: i64,
    rows: &[&TweetRow],
    run: &str,
    now_ms: i64,
) -> std::result::Result<UpsertOutcome, sqlx::Error> {
    let mut tx = pool.begin().await?;

    // A tid repeated within one batch is still a single insert.
    let mut inserted: HashSet<&str> = HashSet::new();
    let mut updated = 0u64;

    for row in rows {
        let tid = row.tid.trim();
        let m = row.metrics.unwrap_or_default();
        let returned: Option<String> = sqlx::query_scalar(UPSERT_TWEET)
            .bind(owner_user_id)
            .bind(tid)
            .bind(row.text.as_str())
            .bind(row.src.as_str())
            .bind(row.author_id.as_deref())
            .bind(row.author_username.as_deref())
            .bind(row.author_name.as_deref())
            .bind(row.created_at.map(|t| t.timestamp_millis()))
            .bind(row.lang.as_deref())
            .bind(row.conversation_id.as_deref())
            .bind(to_i64(m.like_count))
            .bind(to_i64(m.repost_count))
            .bind(to_i64(m.reply_count))
            .bind(to_i64(m.quote_count))
            .bind(now_ms)
            .bind(run)
            .fetch_optional(&mut *tx)
            .await?;

        match returned {
            Some(first_run) if first_run == run => {
                inserted.insert(tid);
            }
            Some(_) => updated += 1,
            None => {}
        }
    }

    tx.commit().await?;
    Ok(UpsertOutcome {
        inserted: inserted.len() as u64,
        updated,
    })
}

/// Run `fut` under `after`, mapping both expiry and driver errors into
/// [`StorageError`].
async fn bounded<T, F>(op: &'static str, after: Duration, fut: F) -> Result<T>
where
    F: Future<Output = std::result::Result<T, sqlx::Error>>,
{
    match tokio::time::timeout(after, fut).await {
        Ok(Ok(v)) => Ok(v),
        Ok(Err(sqlx::Error::PoolTimedOut)) | Err(_) => {
            warn!(op, after_ms = after.as_millis() as u64, "store.timeout");
            Err(StorageError::Timeout { op, after }.into())
        }
        Ok(Err(err)) => {
            warn!(op, error = %err, "store.backend_error");
            Err(StorageError::backend(err).into())
        }
    }
}

fn to_i64(v: Option<u64>) -> Option<i64> {
    v.and_then(|n| i64::try_from(n).ok())
}

fn from_i64(v: Option<i64>) -> Option<u64> {
    v.and_then(|n| u64::try_from(n).ok())
}
