//! Optional log verification over HTTP
//!
//! The log bytes are posted to a configured endpoint and the response text is
//! classified. Network trouble never fails a rip; the caller records it as an
//! advisory.

use reqwest::blocking::Client;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

/// Classified verification response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum WebCheckResult {
    Success,
    Mismatch,
    Unknown,
}

/// Verification errors
#[derive(Debug, Error)]
pub enum WebCheckError {
    #[error("HTTP client error: {0}")]
    Client(String),

    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),
}

/// Posts logs to a verification endpoint
pub struct WebVerifier {
    client: Client,
    url: String,
}

impl WebVerifier {
    pub fn new(url: impl Into<String>, timeout_secs: u64) -> Result<Self, WebCheckError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(concat!("ripcheck/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| WebCheckError::Client(e.to_string()))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Submit a log and classify the reply
    pub fn verify(&self, log_bytes: &[u8]) -> Result<WebCheckResult, WebCheckError> {
        tracing::debug!(url = %self.url, bytes = log_bytes.len(), "Submitting log for verification");
        let response = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/octet-stream")
            .body(log_bytes.to_vec())
            .send()?
            .error_for_status()?;
        let text = response.text()?;
        let result = interpret_response(&text);
        tracing::info!(url = %self.url, result = ?result, "Log verification response");
        Ok(result)
    }
}

/// Classify a verification reply by keyword
pub fn interpret_response(text: &str) -> WebCheckResult {
    let lower = text.to_ascii_lowercase();
    // "invalid" contains "valid", so negatives are checked first
    if ["mismatch", "invalid", "modified"].iter().any(|k| lower.contains(k)) {
        WebCheckResult::Mismatch
    } else if ["success", "valid"].iter().any(|k| lower.contains(k)) {
        WebCheckResult::Success
    } else {
        WebCheckResult::Unknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interpret_response() {
        assert_eq!(interpret_response("Log signature: VALID"), WebCheckResult::Success);
        assert_eq!(interpret_response("success"), WebCheckResult::Success);
        assert_eq!(interpret_response("Log is INVALID"), WebCheckResult::Mismatch);
        assert_eq!(interpret_response("checksum mismatch"), WebCheckResult::Mismatch);
        assert_eq!(interpret_response("log was modified"), WebCheckResult::Mismatch);
        assert_eq!(interpret_response("<html>busy</html>"), WebCheckResult::Unknown);
    }

    #[test]
    fn test_unreachable_endpoint_is_error() {
        let verifier = WebVerifier::new("http://127.0.0.1:9/verify", 1).unwrap();
        assert!(verifier.verify(b"log").is_err());
    }
}
