//! Thin wrapper around the X v2 user-timeline endpoint.
//!
//! Shapes the request (fields, expansions, result cap) and hands the raw JSON
//! back untouched; interpretation belongs to the parser.
use feedline_http::{Auth, HttpClient, HttpError, RequestOpts};
use serde_json::Value;
use std::borrow::Cow;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://api.twitter.com";

/// The timeline endpoint rejects `max_results` outside this window.
const TIMELINE_MIN_RESULTS: u32 = 5;
const TIMELINE_MAX_RESULTS: u32 = 100;

const TWEET_FIELDS: &str = "created_at,lang,conversation_id,public_metrics,author_id";

#[derive(Clone)]
pub struct TwitterApi {
    http: HttpClient,
}

impl TwitterApi {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, HttpError> {
        let http = HttpClient::new(base_url)?.with_timeout(timeout);
        Ok(Self { http })
    }

    /// `GET /2/users/{id}/tweets` with author expansion. Never retries.
    pub async fn user_tweets(
        &self,
        bearer: &str,
        user_id: &str,
        max_results: u32,
    ) -> Result<Value, HttpError> {
        let max_results = max_results.clamp(TIMELINE_MIN_RESULTS, TIMELINE_MAX_RESULTS);
        let path = format!("2/users/{user_id}/tweets");

        let params: Vec<(&str, Cow<'_, str>)> = vec![
            ("max_results", max_results.to_string().into()),
            ("tweet.fields", TWEET_FIELDS.into()),
            ("expansions", "author_id".into()),
            ("user.fields", "username,name".into()),
        ];

        let resp: Value = self
            .http
            .get_json(
                &path,
                RequestOpts {
                    auth: Some(Auth::Bearer(bearer)),
                    query: Some(params),
                    ..Default::default()
                },
            )
            .await?;

        tracing::debug!(
            user_id,
            result_count = ?resp.get("meta").and_then(|m| m.get("result_count")),
            "twitter.user_tweets"
        );
        Ok(resp)
    }
}
