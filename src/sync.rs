use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_RETRIES: u32 = 3;
pub const DEFAULT_TIMEOUT_SECS: u64 = 180;
pub const DEFAULT_BACKOFF_MS: u64 = 2000;

/// Surfaced after every retry is exhausted on a timeout. The UI shows this
/// verbatim to Thai-speaking staff.
const CONNECT_TIMEOUT_MESSAGE: &str =
    "เชื่อมต่อเซิร์ฟเวอร์ไม่สำเร็จ กรุณาตรวจสอบอินเทอร์เน็ตแล้วลองใหม่อีกครั้ง";

/// The backend rejects unknown `action` values when the deployed script is
/// older than the app. Rewrite that into something staff can act on.
const STALE_DEPLOYMENT_HINT: &str =
    "สคริปต์หลังบ้านยังเป็นเวอร์ชันเก่า กรุณา Deploy Apps Script เวอร์ชันล่าสุดแล้วลองใหม่ (backend deployment is out of date)";

#[derive(Debug, Error)]
pub enum SyncError {
    /// The backend answered with a business error. Never retried.
    #[error("{0}")]
    Backend(String),
    /// Transport-level failure that survived every retry.
    #[error("{0}")]
    Connectivity(String),
}

/// Credentials attached to every outgoing payload. The token is preferred;
/// accounts created before token issuance fall back to the password.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthUser {
    pub id: String,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default, rename = "idCard")]
    pub id_card: Option<String>,
}

/// Yields the current user, read fresh on every call so a logout in another
/// window is picked up immediately. Injected rather than read from ambient
/// state so tests and future callers can substitute their own source.
pub trait CredentialsProvider: Send {
    fn credentials(&self) -> Option<AuthUser>;
}

#[derive(Debug, Deserialize)]
struct ResponseEnvelope {
    status: String,
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    message: Option<String>,
}

/// HTTP bridge to the spreadsheet backend: one POST endpoint, an `action`
/// discriminator in the body, and an envelope that always arrives with HTTP
/// 200. Transport problems are retried with linear-growth backoff; business
/// errors are not.
pub struct RemoteClient {
    http: reqwest::blocking::Client,
    endpoint: String,
    retries: u32,
    backoff_ms: u64,
    credentials: Box<dyn CredentialsProvider>,
}

impl RemoteClient {
    pub fn new(
        endpoint: String,
        retries: u32,
        timeout_secs: u64,
        backoff_ms: u64,
        credentials: Box<dyn CredentialsProvider>,
    ) -> anyhow::Result<Self> {
        let http = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(RemoteClient {
            http,
            endpoint,
            retries: retries.max(1),
            backoff_ms,
            credentials,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Posts `action` with the given fields and returns the envelope's
    /// `data`. Either returns success data or an error; an error envelope is
    /// never handed back silently. The caller's map is consumed, so auth
    /// injection happens on an owned copy rather than mutating shared state.
    pub fn send(&self, action: &str, payload: Map<String, Value>) -> Result<Value, SyncError> {
        self.send_with_retries(action, payload, self.retries)
    }

    pub fn send_with_retries(
        &self,
        action: &str,
        payload: Map<String, Value>,
        retries: u32,
    ) -> Result<Value, SyncError> {
        let mut body = payload;
        body.insert("action".to_string(), json!(action));
        if let Some(user) = self.credentials.credentials() {
            let token = user
                .token
                .filter(|t| !t.is_empty())
                .or(user.password);
            body.insert(
                "auth".to_string(),
                json!({ "id": user.id, "token": token, "idCard": user.id_card }),
            );
        }
        let body_text = Value::Object(body).to_string();

        let attempts = retries.max(1);
        let mut last_error = String::new();
        let mut timed_out = false;

        for attempt in 1..=attempts {
            if attempt > 1 {
                std::thread::sleep(Duration::from_millis(
                    self.backoff_ms * u64::from(attempt - 1),
                ));
            }
            // Cache-buster: the backend host aggressively caches GET-shaped
            // URLs, and some proxies extend that to POST. Deployment URLs
            // may already carry a query string.
            let url = cache_busted(&self.endpoint, chrono::Utc::now().timestamp_millis());

            let response = match self
                .http
                .post(&url)
                // text/plain avoids a CORS preflight against the backend
                // host; the body is still JSON.
                .header(reqwest::header::CONTENT_TYPE, "text/plain;charset=utf-8")
                .body(body_text.clone())
                .send()
            {
                Ok(r) => r,
                Err(e) => {
                    timed_out = e.is_timeout();
                    last_error = e.to_string();
                    tracing::warn!(action, attempt, error = %last_error, "request failed");
                    continue;
                }
            };

            let status = response.status();
            let text = response.text().unwrap_or_default();

            if !status.is_success() {
                timed_out = false;
                last_error = format!("server responded with HTTP {}", status.as_u16());
                tracing::warn!(action, attempt, %status, "non-success status");
                continue;
            }
            if text.trim().is_empty() {
                timed_out = false;
                last_error = "server returned an empty response".to_string();
                tracing::warn!(action, attempt, "empty response body");
                continue;
            }

            let envelope: ResponseEnvelope = match serde_json::from_str(&text) {
                Ok(v) => v,
                Err(_) => {
                    timed_out = false;
                    last_error = describe_non_json(&text);
                    tracing::warn!(action, attempt, error = %last_error, "non-JSON response");
                    continue;
                }
            };

            if envelope.status == "success" {
                return Ok(envelope.data.unwrap_or(Value::Null));
            }

            // Business failure: surface immediately, no retry.
            let message = envelope
                .message
                .unwrap_or_else(|| "unknown backend error".to_string());
            if message.contains("Invalid action") || message.contains("Unknown action") {
                return Err(SyncError::Backend(STALE_DEPLOYMENT_HINT.to_string()));
            }
            return Err(SyncError::Backend(message));
        }

        if timed_out {
            Err(SyncError::Connectivity(CONNECT_TIMEOUT_MESSAGE.to_string()))
        } else {
            Err(SyncError::Connectivity(last_error))
        }
    }
}

fn cache_busted(endpoint: &str, stamp: i64) -> String {
    let sep = if endpoint.contains('?') { '&' } else { '?' };
    format!("{}{}t={}", endpoint, sep, stamp)
}

/// Best-effort diagnostics for an HTML error page (the backend host serves
/// those for auth and quota problems): prefer the page title, else the
/// first 100 characters.
fn describe_non_json(body: &str) -> String {
    let lower = body.to_ascii_lowercase();
    if let Some(start) = lower.find("<title>") {
        if let Some(len) = lower[start + 7..].find("</title>") {
            let title = body[start + 7..start + 7 + len].trim();
            if !title.is_empty() {
                return format!("server returned a non-JSON response: {}", title);
            }
        }
    }
    let snippet: String = body.chars().take(100).collect();
    format!("server returned a non-JSON response: {}", snippet.trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_buster_respects_existing_query_string() {
        assert_eq!(
            cache_busted("https://host/exec", 7),
            "https://host/exec?t=7"
        );
        assert_eq!(
            cache_busted("https://host/exec?deploy=3", 7),
            "https://host/exec?deploy=3&t=7"
        );
    }

    #[test]
    fn non_json_diagnostics_prefer_title() {
        let body = "<html><head><TITLE>Quota exceeded</TITLE></head><body>x</body></html>";
        assert_eq!(
            describe_non_json(body),
            "server returned a non-JSON response: Quota exceeded"
        );
    }

    #[test]
    fn non_json_diagnostics_truncate_raw_body() {
        let body = "x".repeat(500);
        let described = describe_non_json(&body);
        assert!(described.ends_with(&"x".repeat(100)));
    }
}
