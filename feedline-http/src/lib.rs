//! Small JSON-over-HTTP client used by the live payload source.
//!
//! - Per-request options: auth, query params, timeout
//! - Bearer tokens are sanitized before use and never logged
//! - One attempt per call; `Retry-After` is surfaced on the error for the caller
//! - Raw request/response logging (target `http.raw`) via `FEEDLINE_HTTP_RAW=1`
//!
//! Example (no_run):
//! ```rust
//! # async fn demo() -> Result<(), feedline_http::HttpError> {
//! let client = feedline_http::HttpClient::new("https://api.example.com")?;
//! let got: serde_json::Value = client
//!     .get_json("v1/items", feedline_http::RequestOpts::default())
//!     .await?;
//! # Ok(()) }
//! ```

use reqwest::header::{HeaderMap, HeaderValue, RETRY_AFTER};
use reqwest::{Client, Method, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::borrow::Cow;
use std::env;
use std::time::{Duration, Instant};
use thiserror::Error;
use uuid::Uuid;

const RAW_ENV: &str = "FEEDLINE_HTTP_RAW";
const RAW_MAX_BODY: usize = 64 * 1024;
const SNIPPET_LEN: usize = 500;

fn raw_enabled() -> bool {
    matches!(
        env::var(RAW_ENV).as_deref(),
        Ok("1") | Ok("true") | Ok("yes")
    )
}

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("invalid URL: {0}")]
    Url(String),
    #[error("request build failed: {0}")]
    Build(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("decode error: {0}, body_snippet: {1}")]
    Decode(String, String),
    #[error("server returned error {status}: {message}, request_id={request_id}")]
    Api {
        status: StatusCode,
        message: String,
        request_id: String,
        retry_after_secs: Option<u64>,
    },
}

/// Authentication strategies supported by the client.
#[derive(Clone, Debug)]
pub enum Auth<'a> {
    /// Authorization: Bearer <token>
    Bearer(&'a str),
    None,
}

/// Per-request tuning knobs.
///
/// ```
/// use feedline_http::{Auth, RequestOpts};
/// use std::time::{Duration, Instant};
///
/// let opts = RequestOpts {
///     timeout: Some(Duration::from_secs(30)),
///     auth: Some(Auth::Bearer("token")),
///     ..Default::default()
/// };
///
/// assert_eq!(opts.timeout.unwrap().as_secs(), 30);
/// assert!(opts.query.is_none());
/// ```
#[derive(Clone, Debug, Default)]
pub struct RequestOpts<'a> {
    pub timeout: Option<Duration>,
    pub auth: Option<Auth<'a>>,
    pub query: Option<Vec<(&'a str, Cow<'a, str>)>>,
}

#[derive(Clone)]
pub struct HttpClient {
    base: Url,
    inner: Client,
    pub default_timeout: Duration,
}

impl HttpClient {
    /// Construct a client anchored to a base URL.
    ///
    /// ```no_run
    /// use feedline_http::{HttpClient, HttpError};
    /// use std::time::{Duration, Instant};
    ///
    /// let client = HttpClient::new("https://api.example.com")?;
    /// assert_eq!(client.default_timeout, Duration::from_secs(15));
    /// # Ok::<(), HttpError>(())
    /// ```
    pub fn new(base: &str) -> Result<Self, HttpError> {
        // `join` drops the last path segment unless the base ends with '/'.
        let base = if base.ends_with('/') {
            Cow::Borrowed(base)
        } else {
            Cow::Owned(format!("{base}/"))
        };
        let base = Url::parse(&base).map_err(|e| HttpError::Url(e.to_string()))?;
        let inner = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| HttpError::Build(e.to_string()))?;
        Ok(Self {
            base,
            inner,
            default_timeout: Duration::from_secs(15),
        })
    }

    pub fn with_timeout(mut self, dur: Duration) -> Self {
        self.default_timeout = dur;
        self
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    /// GET JSON with per-request options.
    pub async fn get_json<T>(&self, path: &str, opts: RequestOpts<'_>) -> Result<T, HttpError>
    where
        T: DeserializeOwned,
    {
        self.request_json(Method::GET, path, opts).await
    }

    async fn request_json<T>(
        &self,
        method: Method,
        path: &str,
        opts: RequestOpts<'_>,
    ) -> Result<T, HttpError>
    where
        T: DeserializeOwned,
    {
        let url = self
            .base
            .join(path.trim_start_matches('/'))
            .map_err(|e| HttpError::Url(e.to_string()))?;

        let bearer = match &opts.auth {
            Some(Auth::Bearer(tok)) => Some(sanitize_bearer(tok)?),
            Some(Auth::None) | None => None,
        };
        let auth_kind = if bearer.is_some() { "bearer" } else { "none" };
        let timeout = opts.timeout.unwrap_or(self.default_timeout);
        let query: Vec<(&str, &str)> = opts
            .query
            .as_ref()
            .map(|q| q.iter().map(|(k, v)| (*k, v.as_ref())).collect())
            .unwrap_or_default();
        let redacted_q = redact_query(&query);

        let mut rb = self
            .inner
            .request(method.clone(), url.clone())
            .timeout(timeout)
            .query(&query);
        if let Some(tok) = &bearer {
            rb = rb.bearer_auth(tok);
        }

        let req_id = Uuid::new_v4().simple().to_string();
        tracing::debug!(
            req_id=%req_id,
            method=%method,
            host_path=%format!("{}{}", url.host_str().unwrap_or("-"), url.path()),
            query=?redacted_q,
            timeout_ms=timeout.as_millis() as u64,
            auth_kind,
            "http.request.start"
        );
        if raw_enabled() {
            tracing::debug!(
                target: "http.raw",
                %req_id,
                curl=%make_curl(&method, &url, &redacted_q, bearer.is_some()),
                "request"
            );
        }

        let t0 = Instant::now();
        let sent = match rb.send().await {
            Ok(resp) => {
                let status = resp.status();
                let headers = resp.headers().clone();
                resp.bytes().await.map(|b| (status, headers, b))
            }
            Err(err) => Err(err),
        };
        let (status, headers, bytes) = sent.map_err(|err| {
            tracing::warn!(req_id=%req_id, message=%err, "http.network_error");
            if err.is_timeout() {
                HttpError::Timeout(timeout)
            } else {
                HttpError::Network(err.to_string())
            }
        })?;
        let dur_ms = t0.elapsed().as_millis() as u64;

        let request_id = headers
            .get("x-request-id")
            .or_else(|| headers.get("x-transaction-id"))
            .and_then(|v| v.to_str().ok())
            .unwrap_or("-")
            .to_string();
        tracing::debug!(
            req_id=%req_id,
            %status,
            duration_ms=dur_ms,
            body_len=bytes.len(),
            x_request_id=%request_id,
            rate_limit.remaining=?header_str(&headers, "x-rate-limit-remaining"),
            rate_limit.reset=?header_str(&headers, "x-rate-limit-reset"),
            "http.response.headers"
        );
        if raw_enabled() {
            let mut body = bytes.to_vec();
            let truncated = body.len() > RAW_MAX_BODY;
            body.truncate(RAW_MAX_BODY);
            tracing::debug!(
                target: "http.raw",
                %req_id,
                %status,
                body=%String::from_utf8_lossy(&body),
                truncated,
                "response"
            );
        }

        let snippet = snip_body(&bytes);
        if status.is_success() {
            return serde_json::from_slice::<T>(&bytes).map_err(|e| {
                tracing::warn!(
                    req_id=%req_id,
                    serde_err=%e,
                    body_snippet=%snippet,
                    "http.response.decode_error"
                );
                HttpError::Decode(e.to_string(), snippet)
            });
        }

        let message = extract_error_message(&bytes);
        tracing::warn!(
            req_id=%req_id,
            %status,
            message=%message,
            x_request_id=%request_id,
            "http.error"
        );
        Err(HttpError::Api {
            status,
            message,
            request_id,
            retry_after_secs: retry_after_delay_secs(&headers),
        })
    }
}

fn header_str<'h>(h: &'h HeaderMap, name: &str) -> Option<&'h str> {
    h.get(name).and_then(|v| v.to_str().ok())
}

fn is_secret_param(key: &str) -> bool {
    matches!(
        key.to_ascii_lowercase().as_str(),
        "access_token" | "authorization" | "auth" | "key" | "api_key" | "token" | "bearer"
    )
}

fn redact_query(q: &[(&str, &str)]) -> Vec<(String, String)> {
    q.iter()
        .map(|(k, v)| {
            let v = if is_secret_param(k) {
                "<redacted>".to_string()
            } else {
                (*v).to_string()
            };
            ((*k).to_string(), v)
        })
        .collect()
}

/// Best-effort curl line for repro; query is already redacted and the token is never shown.
fn make_curl(method: &Method, url: &Url, query: &[(String, String)], bearer: bool) -> String {
    let mut shown = url.clone();
    shown.query_pairs_mut().clear().extend_pairs(query);
    let mut parts = vec!["curl".to_string(), format!("-X{method}")];
    if bearer {
        parts.push("-H 'Authorization: Bearer <redacted>'".to_string());
    }
    parts.push(format!("'{}'", shown.as_str().replace('\'', r"'\''")));
    parts.join(" ")
}

fn extract_error_message(body: &[u8]) -> String {
    // X v2: {"errors":[{"message":..}]} or problem JSON {"title":..,"detail":..}
    #[derive(Deserialize)]
    struct Errors {
        errors: Vec<Problem>,
    }
    #[derive(Deserialize)]
    struct Problem {
        #[serde(default)]
        message: String,
        #[serde(default)]
        detail: String,
        #[serde(default)]
        title: String,
    }

    let pick = |p: Problem| {
        [p.message, p.detail, p.title]
            .into_iter()
            .find(|s| !s.is_empty())
    };

    if let Ok(e) = serde_json::from_slice::<Errors>(body) {
        if let Some(msg) = e.errors.into_iter().next().and_then(pick) {
            return msg;
        }
    }
    if let Ok(p) = serde_json::from_slice::<Problem>(body) {
        if let Some(msg) = pick(p) {
            return msg;
        }
    }
    snip_body(body)
}

fn retry_after_delay_secs(h: &HeaderMap) -> Option<u64> {
    h.get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())?
        .trim()
        .parse()
        .ok()
}

fn snip_body(body: &[u8]) -> String {
    let mut snip = String::from_utf8_lossy(body).to_string();
    if snip.len() > SNIPPET_LEN {
        let mut cut = SNIPPET_LEN;
        while !snip.is_char_boundary(cut) {
            cut -= 1;
        }
        snip.truncate(cut);
        snip.push_str("...");
    }
    snip
}

/// Trim quotes/whitespace and make sure the token is a valid header value.
pub fn sanitize_bearer(raw: &str) -> Result<String, HttpError> {
    let s = raw.trim().trim_matches(|c| c == '"' || c == '\'');
    if s.is_empty() {
        return Err(HttpError::Build("bearer token is empty".into()));
    }
    if !s.is_ascii() {
        return Err(HttpError::Build("bearer token contains non-ASCII bytes".into()));
    }
    if s.bytes().any(|b| b.is_ascii_whitespace() || b < 0x20 || b == 0x7F) {
        return Err(HttpError::Build(
            "bearer token contains whitespace or control characters".into(),
        ));
    }
    HeaderValue::from_str(&format!("Bearer {s}"))
        .map_err(|e| HttpError::Build(format!("invalid Authorization header: {e}")))?;
    Ok(s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn sanitize_strips_quotes_and_rejects_garbage() {
        assert_eq!(sanitize_bearer("  \"abc123\" ").unwrap(), "abc123");
        assert!(sanitize_bearer("").is_err());
        assert!(sanitize_bearer("two words").is_err());
        assert!(sanitize_bearer("tok\u{e9}n").is_err());
    }

    #[test]
    fn error_message_prefers_provider_fields() {
        let body = br#"{"errors":[{"message":"","detail":"Too Many Requests"}]}"#;
        assert_eq!(extract_error_message(body), "Too Many Requests");
        let body = br#"{"title":"Unauthorized","detail":""}"#;
        assert_eq!(extract_error_message(body), "Unauthorized");
        assert_eq!(extract_error_message(b"plain"), "plain");
    }

    #[test]
    fn secret_query_params_are_redacted() {
        let q = redact_query(&[("max_results", "5"), ("token", "s3cr3t")]);
        assert_eq!(q[0].1, "5");
        assert_eq!(q[1].1, "<redacted>");
    }

    #[tokio::test]
    async fn get_json_sends_bearer_and_query() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/2/ping"))
            .and(header("authorization", "Bearer tok"))
            .and(query_param("max_results", "5"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
            .mount(&server)
            .await;

        let client = HttpClient::new(&format!("{}/api", server.uri())).unwrap();
        let got: serde_json::Value = client
            .get_json(
                "2/ping",
                RequestOpts {
                    auth: Some(Auth::Bearer("tok")),
                    query: Some(vec![("max_results", "5".into())]),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(got["ok"], true);
    }

    #[tokio::test]
    async fn server_errors_are_returned_after_one_attempt() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503).set_body_string("upstream down"))
            .expect(1)
            .mount(&server)
            .await;

        let client = HttpClient::new(&server.uri()).unwrap();
        let err = client
            .get_json::<serde_json::Value>("busy", RequestOpts::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            HttpError::Api { status, .. } if status == StatusCode::SERVICE_UNAVAILABLE
        ));
    }

    #[tokio::test]
    async fn api_error_carries_status_and_retry_after() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(429)
                    .insert_header("retry-after", "7")
                    .set_body_json(serde_json::json!({"title": "Too Many Requests"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = HttpClient::new(&server.uri()).unwrap();
        let err = client
            .get_json::<serde_json::Value>("anything", RequestOpts::default())
            .await
            .unwrap_err();
        match err {
            HttpError::Api {
                status,
                retry_after_secs,
                message,
                ..
            } => {
                assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
                assert_eq!(retry_after_secs, Some(7));
                assert_eq!(message, "Too Many Requests");
            }
            other => panic!("expected api error, got {other:?}"),
        }
    }
}
