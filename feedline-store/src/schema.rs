//! Table layout for persisted tweets.
//!
//! Every statement is `IF NOT EXISTS`, so provisioning can run on each start
//! without touching existing rows.

/// One row per `(owner_user_id, tid)`.
///
/// `ingest_run` and `ingested_at_ms` are written once on insert and never
/// updated; the upsert relies on that to tell inserts from updates.
pub(crate) const CREATE_TWEETS: &str = r#"
CREATE TABLE IF NOT EXISTS tweets (
    id               INTEGER PRIMARY KEY AUTOINCREMENT,
    owner_user_id    INTEGER NOT NULL,
    tid              TEXT    NOT NULL,
    text             TEXT    NOT NULL,
    src              TEXT    NOT NULL,
    author_id        TEXT,
    author_username  TEXT,
    author_name      TEXT,
    created_at_ms    INTEGER,
    lang             TEXT,
    conversation_id  TEXT,
    like_count       INTEGER,
    repost_count     INTEGER,
    reply_count      INTEGER,
    quote_count      INTEGER,
    ingested_at_ms   INTEGER NOT NULL,
    updated_at_ms    INTEGER NOT NULL,
    ingest_run       TEXT    NOT NULL,
    UNIQUE (owner_user_id, tid)
)
"#;

pub(crate) const CREATE_OWNER_RECENT_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_tweets_owner_recent
    ON tweets (owner_user_id, COALESCE(created_at_ms, ingested_at_ms) DESC, id DESC)
"#;

pub(crate) const STATEMENTS: &[&str] = &[CREATE_TWEETS, CREATE_OWNER_RECENT_INDEX];
