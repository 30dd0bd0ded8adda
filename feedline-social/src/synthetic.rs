//! Seeded, offline stand-in for the live timeline endpoint.
//!
//! The generator only depends on the seed and `max_results`, so a given pair
//! always yields the same document. Output mirrors the live wire shape
//! (`data` / `includes.users` / `meta`) so the parser handles both alike.
use crate::payload::Payload;
use crate::source::{validate_request, PayloadSource};
use crate::twitter::types::{Includes, Meta, PublicMetrics, TimelineResponse, Tweet, User};
use async_trait::async_trait;
use feedline_common::{IngestError, Result};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use chrono::{DateTime, Duration, SecondsFormat, TimeZone, Utc};
use rand::{Rng, SeedableRng};

/// Same cap the live endpoint enforces.
pub const SYNTHETIC_MAX_RESULTS: u32 = 100;

const ID_FLOOR: u64 = 1_780_000_000_000_000_000;
/// 2024-06-01T00:00:00Z
const EPOCH_SECS: i64 = 1_717_200_000;

const HANDLES: &[&str] = &[
    "quietharbor", "ferrisfan", "lowtide", "northwind", "paperlantern", "slowcoffee",
];
const WORDS: &[&str] = &[
    "shipping", "today", "the", "new", "build", "finally", "works", "after", "a", "long",
    "week", "of", "debugging", "coffee", "thread", "notes", "on", "async", "storage",
    "release", "small", "fix", "for", "big", "feed", "morning", "reading", "list",
];
const TAGS: &[&str] = &["#rust", "#buildinpublic", "#sqlite", "#devlog"];
const LANGS: &[&str] = &["en", "en", "en", "de", "es"];

#[derive(Debug, Clone)]
pub struct SyntheticSource {
    seed: u64,
}

impl SyntheticSource {
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Build the timeline document for `max_results` tweets, newest first.
    pub fn generate(&self, max_results: u32) -> TimelineResponse {
        let count = max_results.min(SYNTHETIC_MAX_RESULTS) as usize;
        let mut rng = StdRng::seed_from_u64(self.seed);

        let user_count = rng.gen_range(1..=3usize);
        let users: Vec<User> = (0..user_count)
            .map(|i| {
                let handle = HANDLES[rng.gen_range(0..HANDLES.len())];
                User {
                    id: (4_000_000_000 + (self.seed % 100_000) * 10 + i as u64).to_string(),
                    username: Some(format!("{handle}_{i}")),
                    name: Some(capitalize(handle)),
                }
            })
            .collect();

        let mut id = ID_FLOOR + rng.gen_range(0..1_000_000_000_000u64);
        let mut at = epoch() + Duration::minutes(rng.gen_range(0..60 * 24 * 30));

        let mut tweets = Vec::with_capacity(count);
        for _ in 0..count {
            let author = &users[rng.gen_range(0..users.len())];
            tweets.push(Tweet {
                id: id.to_string(),
                text: synth_text(&mut rng),
                author_id: Some(author.id.clone()),
                lang: LANGS.choose(&mut rng).map(|l| l.to_string()),
                created_at: Some(format_created_at(at)),
                conversation_id: Some(id.to_string()),
                public_metrics: Some(PublicMetrics {
                    like_count: Some(rng.gen_range(0..500)),
                    retweet_count: Some(rng.gen_range(0..80)),
                    reply_count: Some(rng.gen_range(0..40)),
                    quote_count: Some(rng.gen_range(0..10)),
                }),
            });
            id -= rng.gen_range(1_000..5_000_000u64);
            at -= Duration::minutes(rng.gen_range(1..=180));
        }

        let meta = Meta {
            result_count: tweets.len() as u32,
            newest_id: tweets.first().map(|t| t.id.clone()),
            oldest_id: tweets.last().map(|t| t.id.clone()),
            next_token: None,
        };

        TimelineResponse {
            data: Some(tweets),
            includes: Some(Includes { users: Some(users) }),
            meta: Some(meta),
        }
    }
}

#[async_trait]
impl PayloadSource for SyntheticSource {
    async fn fetch(
        &self,
        bearer: &str,
        provider_user_id: &str,
        max_results: u32,
    ) -> Result<Payload> {
        validate_request(bearer, provider_user_id, max_results)?;
        let resp = self.generate(max_results);
        let value = serde_json::to_value(&resp)
            .map_err(|e| IngestError::Payload(format!("synthetic encode failed: {e}")))?;
        tracing::debug!(
            seed = self.seed,
            max_results,
            tweets = resp.meta.as_ref().map(|m| m.result_count),
            "source.synthetic.generated"
        );
        Ok(Payload::new(value))
    }

    fn label(&self) -> &str {
        "synthetic"
    }
}

fn synth_text(rng: &mut StdRng) -> String {
    let len = rng.gen_range(4..=12);
    let mut words: Vec<&str> = (0..len)
        .map(|_| WORDS[rng.gen_range(0..WORDS.len())])
        .collect();
    if rng.gen_bool(0.3) {
        words.push(TAGS[rng.gen_range(0..TAGS.len())]);
    }
    capitalize(&words.join(" "))
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn epoch() -> DateTime<Utc> {
    Utc.timestamp_opt(EPOCH_SECS, 0)
        .single()
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

/// Provider format: millisecond precision, `Z` suffix.
fn format_created_at(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}
