//! Shared utility functions for provider adapters.

use sb_domain::error::{Error, Result};
use serde_json::Value;

/// Convert a [`reqwest::Error`] into the domain [`Error`] type.
///
/// Timeout errors map to [`Error::Timeout`]; everything else maps to
/// [`Error::Http`].
pub(crate) fn from_reqwest(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Timeout(e.to_string())
    } else {
        Error::Http(e.to_string())
    }
}

/// Classify a non-success HTTP response.
///
/// 429 and `RESOURCE_EXHAUSTED` bodies become [`Error::RateLimited`] (with
/// the retry hint when the body carries one); everything else is a generic
/// [`Error::Provider`].
pub fn classify_status(provider: &str, status: u16, body: &str) -> Error {
    let exhausted = body.contains("RESOURCE_EXHAUSTED");
    if status == 429 || exhausted {
        return Error::RateLimited {
            provider: provider.to_string(),
            message: format!("HTTP {status} - {}", truncate_body(body)),
            retry_after_secs: extract_retry_after(body),
        };
    }
    Error::Provider {
        provider: provider.to_string(),
        message: format!("HTTP {status} - {}", truncate_body(body)),
    }
}

/// Resolve the API key from the named environment variable.
pub fn resolve_api_key(env_var: &str) -> Result<String> {
    match std::env::var(env_var) {
        Ok(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(Error::Auth(format!(
            "environment variable '{env_var}' not set or empty"
        ))),
    }
}

/// Pull a retry hint out of a Gemini error body
/// (`error.details[].retryDelay = "31s"`) or a flat `retry_after` field.
fn extract_retry_after(body: &str) -> Option<u64> {
    let v: Value = serde_json::from_str(body).ok()?;
    if let Some(secs) = v.get("retry_after").and_then(|r| r.as_u64()) {
        return Some(secs);
    }
    v.get("error")?
        .get("details")?
        .as_array()?
        .iter()
        .filter_map(|d| d.get("retryDelay").and_then(|r| r.as_str()))
        .find_map(|delay| {
            let secs = delay.trim_end_matches('s');
            secs.parse::<f64>().ok().map(|s| s.ceil() as u64)
        })
}

fn truncate_body(body: &str) -> &str {
    const MAX: usize = 500;
    if body.len() <= MAX {
        return body;
    }
    let mut end = MAX;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    &body[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_429_is_rate_limited() {
        let err = classify_status("google", 429, "slow down");
        assert!(err.is_rate_limit());
    }

    #[test]
    fn resource_exhausted_body_is_rate_limited() {
        let body = r#"{"error":{"code":429,"status":"RESOURCE_EXHAUSTED","details":[{"@type":"type.googleapis.com/google.rpc.RetryInfo","retryDelay":"31s"}]}}"#;
        match classify_status("google", 400, body) {
            Error::RateLimited {
                retry_after_secs, ..
            } => assert_eq!(retry_after_secs, Some(31)),
            other => panic!("expected RateLimited, got {other:?}"),
        }
    }

    #[test]
    fn server_error_is_generic_provider_error() {
        let err = classify_status("google", 500, "boom");
        assert!(!err.is_rate_limit());
        assert!(err.to_string().contains("HTTP 500"));
    }

    #[test]
    fn missing_env_key_is_auth_error() {
        let err = resolve_api_key("SB_TEST_NONEXISTENT_KEY_4242").unwrap_err();
        assert!(matches!(err, Error::Auth(_)));
    }

    #[test]
    fn long_bodies_are_truncated() {
        let body = "x".repeat(2_000);
        let err = classify_status("google", 500, &body);
        assert!(err.to_string().len() < 600);
    }
}
