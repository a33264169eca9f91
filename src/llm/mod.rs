//! LLM Gateway (component D): a typed, retrying HTTP client over a
//! Gemini-style `generateContent` endpoint, with a fixed backoff schedule,
//! 429/403 classification, and JSON extraction from markdown-fenced model
//! output.

pub mod credentials;

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::error::{ImpulseError, LlmErrorKind, Result};
use credentials::CredentialSource;

/// Fixed backoff schedule between attempts: 2s, 5s, 10s, 20s, 40s.
const RETRY_DELAYS_SECS: [u64; 5] = [2, 5, 10, 20, 40];

/// Consecutive 429s tolerated before giving up, tracked separately from
/// `RETRY_DELAYS_SECS` since a 429 doesn't consume an attempt.
const MAX_CONSECUTIVE_RATE_LIMITS: usize = 3;

/// A single failed attempt, carrying a `Retry-After` value when the
/// upstream sent one.
struct CallError {
    kind: LlmErrorKind,
    retry_after_secs: Option<u64>,
}

impl From<LlmErrorKind> for CallError {
    fn from(kind: LlmErrorKind) -> Self {
        Self {
            kind,
            retry_after_secs: None,
        }
    }
}

/// One call to the LLM: a system instruction plus a user prompt, always
/// requesting a JSON response.
pub struct LlmRequest {
    pub system_instruction: String,
    pub prompt: String,
}

/// Client for the Gemini-style `generateContent` REST API, with retry and
/// typed error classification.
pub struct LlmGateway {
    http: reqwest::Client,
    credentials: Option<CredentialSource>,
    base_url: String,
    model: String,
}

impl LlmGateway {
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        credentials: Option<CredentialSource>,
        timeout: Duration,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ImpulseError::other(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            credentials,
            base_url: base_url.into(),
            model: model.into(),
        })
    }

    /// Whether this gateway has credentials configured at all. When false,
    /// the Reasoner must take its degraded path without attempting a call.
    pub fn is_configured(&self) -> bool {
        self.credentials.is_some()
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }

    /// Send a request, retrying per the fixed schedule, and return the
    /// parsed JSON payload the model produced.
    pub async fn call(&self, request: &LlmRequest) -> Result<serde_json::Value> {
        let credentials = self
            .credentials
            .as_ref()
            .ok_or_else(|| ImpulseError::CredentialsInvalid("no LLM credentials configured".into()))?;

        let payload = json!({
            "contents": [{"parts": [{"text": request.prompt}]}],
            "systemInstruction": {"parts": [{"text": request.system_instruction}]},
            "generationConfig": {"responseMimeType": "application/json"},
        });

        let mut last_error: Option<LlmErrorKind> = None;
        let mut attempt = 0usize;
        let mut consecutive_rate_limits = 0usize;

        while attempt < RETRY_DELAYS_SECS.len() {
            let delay_secs = RETRY_DELAYS_SECS[attempt];
            let access_token = credentials.access_token().await?;

            match self.call_once(&payload, &access_token).await {
                Ok(value) => return Ok(value),
                Err(CallError {
                    kind: LlmErrorKind::RateLimited,
                    retry_after_secs,
                }) => {
                    consecutive_rate_limits += 1;
                    if consecutive_rate_limits > MAX_CONSECUTIVE_RATE_LIMITS {
                        return Err(ImpulseError::Llm(LlmErrorKind::RateLimited));
                    }
                    let wait_secs = retry_after_secs.unwrap_or(delay_secs * 2);
                    warn!(
                        consecutive_rate_limits,
                        wait_secs, "rate limited, retrying without consuming an attempt"
                    );
                    sleep(Duration::from_secs(wait_secs)).await;
                    last_error = Some(LlmErrorKind::RateLimited);
                }
                Err(CallError {
                    kind:
                        kind @ (LlmErrorKind::ServiceDisabled
                        | LlmErrorKind::InsufficientScope
                        | LlmErrorKind::PermissionDenied),
                    ..
                }) => {
                    return Err(ImpulseError::Llm(kind));
                }
                Err(CallError { kind, .. }) => {
                    consecutive_rate_limits = 0;
                    warn!(attempt, error = %kind, "LLM call failed, will retry");
                    last_error = Some(kind);
                    attempt += 1;
                    if attempt < RETRY_DELAYS_SECS.len() {
                        sleep(Duration::from_secs(delay_secs)).await;
                    }
                }
            }
        }

        Err(ImpulseError::Llm(
            last_error.unwrap_or(LlmErrorKind::Generic("exhausted retries".into())),
        ))
    }

    async fn call_once(
        &self,
        payload: &serde_json::Value,
        access_token: &str,
    ) -> std::result::Result<serde_json::Value, CallError> {
        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(access_token)
            .json(payload)
            .send()
            .await
            .map_err(|e| CallError::from(LlmErrorKind::Transport(e.to_string())))?;

        let status = response.status();

        if status.as_u16() == 429 {
            let retry_after_secs = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok());
            return Err(CallError {
                kind: LlmErrorKind::RateLimited,
                retry_after_secs,
            });
        }

        if status.as_u16() == 403 {
            let body: serde_json::Value = response.json().await.unwrap_or_default();
            return Err(classify_403(&body).into());
        }

        if status.as_u16() >= 400 {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmErrorKind::Generic(format!("HTTP {status}: {body}")).into());
        }

        let body: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| CallError::from(LlmErrorKind::MalformedJson(e.to_string())))?;

        let text = body
            .candidates
            .first()
            .and_then(|c| c.content.parts.first())
            .map(|p| p.text.clone())
            .ok_or_else(|| {
                CallError::from(LlmErrorKind::MalformedJson(
                    "no candidate text in response".into(),
                ))
            })?;

        debug!(chars = text.len(), "received LLM response text");
        extract_json(&text).map_err(|e| CallError::from(LlmErrorKind::MalformedJson(e)))
    }
}

fn classify_403(body: &serde_json::Value) -> LlmErrorKind {
    let reason = body["error"]["details"]
        .as_array()
        .and_then(|details| {
            details.iter().find_map(|d| {
                if d["@type"].as_str() == Some("type.googleapis.com/google.rpc.ErrorInfo") {
                    d["reason"].as_str()
                } else {
                    None
                }
            })
        })
        .unwrap_or("");

    match reason {
        "SERVICE_DISABLED" => LlmErrorKind::ServiceDisabled,
        "ACCESS_TOKEN_SCOPE_INSUFFICIENT" => LlmErrorKind::InsufficientScope,
        "PERMISSION_DENIED" => LlmErrorKind::PermissionDenied,
        _ => {
            let message = body["error"]["message"].as_str().unwrap_or("access denied");
            LlmErrorKind::Generic(format!("403 Forbidden: {message}"))
        }
    }
}

/// Extract a JSON value from raw text, a ` ```json ` fence, or a bare
/// ` ``` ` fence, trying each in turn. Any other text is a parse failure —
/// this deliberately does not scan for a brace span inside surrounding
/// prose, since that would accept output the model was never asked to
/// produce.
pub fn extract_json(text: &str) -> std::result::Result<serde_json::Value, String> {
    let trimmed = text.trim();

    if let Ok(v) = serde_json::from_str(trimmed) {
        return Ok(v);
    }

    if let Some(extracted) = extract_fenced(trimmed, "```json") {
        if let Ok(v) = serde_json::from_str(&extracted) {
            return Ok(v);
        }
    }

    if let Some(extracted) = extract_fenced(trimmed, "```") {
        if let Ok(v) = serde_json::from_str(&extracted) {
            return Ok(v);
        }
    }

    Err(format!("could not extract JSON from response: {trimmed:.120}"))
}

fn extract_fenced(text: &str, fence: &str) -> Option<String> {
    let start = text.find(fence)? + fence.len();
    let rest = &text[start..];
    let rest = rest.strip_prefix('\n').unwrap_or(rest);
    let end = rest.find("```")?;
    Some(rest[..end].trim().to_string())
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize, Serialize)]
struct Part {
    text: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_raw_json() {
        let v = extract_json(r#"{"a": 1}"#).unwrap();
        assert_eq!(v["a"], 1);
    }

    #[test]
    fn extracts_json_fenced_block() {
        let text = "Here you go:\n```json\n{\"a\": 2}\n```\n";
        let v = extract_json(text).unwrap();
        assert_eq!(v["a"], 2);
    }

    #[test]
    fn extracts_generic_fenced_block() {
        let text = "```\n{\"a\": 3}\n```";
        let v = extract_json(text).unwrap();
        assert_eq!(v["a"], 3);
    }

    #[test]
    fn rejects_json_embedded_in_surrounding_prose() {
        let text = "Sure, the result is {\"a\": 4} and that's final.";
        assert!(extract_json(text).is_err());
    }

    #[test]
    fn fails_on_non_json() {
        assert!(extract_json("not json at all").is_err());
    }

    #[test]
    fn classifies_service_disabled() {
        let body = json!({
            "error": {
                "message": "disabled",
                "details": [{
                    "@type": "type.googleapis.com/google.rpc.ErrorInfo",
                    "reason": "SERVICE_DISABLED"
                }]
            }
        });
        assert_eq!(classify_403(&body), LlmErrorKind::ServiceDisabled);
    }

    #[test]
    fn classifies_insufficient_scope() {
        let body = json!({
            "error": {"details": [{
                "@type": "type.googleapis.com/google.rpc.ErrorInfo",
                "reason": "ACCESS_TOKEN_SCOPE_INSUFFICIENT"
            }]}
        });
        assert_eq!(classify_403(&body), LlmErrorKind::InsufficientScope);
    }

    #[test]
    fn classifies_permission_denied() {
        let body = json!({
            "error": {"details": [{
                "@type": "type.googleapis.com/google.rpc.ErrorInfo",
                "reason": "PERMISSION_DENIED"
            }]}
        });
        assert_eq!(classify_403(&body), LlmErrorKind::PermissionDenied);
    }

    #[test]
    fn unclassified_403_is_generic() {
        let body = json!({"error": {"message": "weird"}});
        assert!(matches!(classify_403(&body), LlmErrorKind::Generic(_)));
    }
}
