//! Normalize provider payloads into [`TweetRow`]s.
//!
//! Accepted roots: `{"data": [..], "includes": {..}}`, `{"data": {..}}` (single
//! lookup) and a bare `[..]` of tweets. Entries are converted one at a time;
//! anything that fails to decode or lacks an id/text is skipped and counted.
use crate::payload::Payload;
use crate::twitter::types::{Tweet, User};
use chrono::{DateTime, Utc};
use feedline_common::{IngestError, Result, TweetMetrics, TweetRow};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::slice;

/// Rows extracted from one payload plus the number of entries dropped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParseReport {
    pub rows: Vec<TweetRow>,
    pub skipped: usize,
}

/// Extract rows from `payload`, tagging each with `src`.
pub fn parse(payload: &Payload, src: &str) -> Result<Vec<TweetRow>> {
    parse_with_report(payload, src).map(|r| r.rows)
}

pub fn parse_with_report(payload: &Payload, src: &str) -> Result<ParseReport> {
    let (entries, includes) = split_root(payload.as_value())?;

    let users = author_index(includes);
    let mut report = ParseReport {
        rows: Vec::with_capacity(entries.len()),
        skipped: 0,
    };

    for (idx, entry) in entries.iter().enumerate() {
        match to_row(entry, &users, src) {
            Some(row) => report.rows.push(row),
            None => {
                report.skipped += 1;
                tracing::debug!(index = idx, "parse.entry_skipped");
            }
        }
    }

    if report.skipped > 0 {
        tracing::info!(
            src,
            rows = report.rows.len(),
            skipped = report.skipped,
            "parse.skipped"
        );
    }
    Ok(report)
}

fn split_root(root: &Value) -> Result<(&[Value], Option<&Value>)> {
    match root {
        Value::Null => Err(IngestError::Payload("payload is absent".into())),
        Value::Array(items) => Ok((items.as_slice(), None)),
        Value::Object(map) => {
            let includes = map.get("includes");
            if let Some(Value::Array(errors)) = map.get("errors") {
                tracing::debug!(count = errors.len(), "parse.provider_partial_errors");
            }
            let entries = match map.get("data") {
                None | Some(Value::Null) => &[][..],
                Some(Value::Array(items)) => items.as_slice(),
                Some(one @ Value::Object(_)) => slice::from_ref(one),
                Some(other) => {
                    return Err(IngestError::Payload(format!(
                        "`data` must be an array or object, got {}",
                        json_kind(other)
                    )))
                }
            };
            Ok((entries, includes))
        }
        other => Err(IngestError::Payload(format!(
            "payload root must be an object or array, got {}",
            json_kind(other)
        ))),
    }
}

/// Users are decoded one by one so a bad entry only loses itself.
fn author_index(includes: Option<&Value>) -> HashMap<String, User> {
    let Some(Value::Array(users)) = includes.and_then(|inc| inc.get("users")) else {
        return HashMap::new();
    };
    users
        .iter()
        .filter_map(|u| {
            User::deserialize(u)
                .map_err(|e| tracing::debug!(error = %e, "parse.include_user_skipped"))
                .ok()
        })
        .map(|u| (u.id.clone(), u))
        .collect()
}

fn to_row(entry: &Value, users: &HashMap<String, User>, src: &str) -> Option<TweetRow> {
    let tweet = Tweet::deserialize(entry).ok()?;
    let tid = tweet.id.trim();
    if tid.is_empty() || tweet.text.trim().is_empty() {
        return None;
    }

    let author = tweet
        .author_id
        .as_deref()
        .and_then(|aid| users.get(aid));

    Some(TweetRow {
        tid: tid.to_string(),
        src: src.to_string(),
        author_username: author.and_then(|u| u.username.clone()),
        author_name: author.and_then(|u| u.name.clone()),
        created_at: tweet.created_at.as_deref().and_then(parse_timestamp),
        metrics: tweet.public_metrics.map(|m| TweetMetrics {
            like_count: m.like_count,
            repost_count: m.retweet_count,
            reply_count: m.reply_count,
            quote_count: m.quote_count,
        }),
        author_id: tweet.author_id,
        lang: tweet.lang,
        conversation_id: tweet.conversation_id,
        text: tweet.text,
    })
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| tracing::debug!(raw, error = %e, "parse.bad_timestamp"))
        .ok()
}

fn json_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
