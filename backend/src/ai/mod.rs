//! AI Module for column mapping suggestion
//!
//! Uses the Anthropic Messages API to suggest a mapping from file headers to
//! the canonical IPDR schema. The client only returns raw text; parsing and
//! fallback live in [`crate::mapping::suggest`].
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::{sync::Arc, time::Duration};
//! use ipdrload::ai::AiClient;
//! use ipdrload::mapping::MappingSuggester;
//!
//! let client = AiClient::new(api_key, Duration::from_secs(30))?;
//! let suggester = MappingSuggester::new(Arc::new(client));
//! let suggestion = suggester.suggest(&headers).await;
//! ```

pub mod prompt;

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{AiError, AiResult};
use crate::mapping::{SuggestionRequest, SuggestionSource};

pub use prompt::{system_prompt, user_prompt};

/// Default model
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";

const API_URL: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";

/// Default number of attempts per suggestion
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default per-request timeout in seconds
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

const MAX_TOKENS: u32 = 1024;

/// Delay between retries in milliseconds
const RETRY_DELAY_MS: u64 = 1000;

/// Anthropic API client
#[derive(Clone)]
pub struct AiClient {
    http: reqwest::Client,
    api_key: String,
    api_url: String,
    model: String,
    max_tokens: u32,
    max_retries: u32,
}

/// Anthropic API response structure
#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    content_type: String,
    #[serde(default)]
    text: String,
}

/// Anthropic API error response
#[derive(Debug, Deserialize)]
struct AnthropicError {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

impl AiClient {
    /// Create a client; each HTTP request gives up after `timeout`.
    pub fn new(api_key: impl Into<String>, timeout: Duration) -> AiResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AiError::RequestFailed(e.to_string()))?;

        Ok(Self {
            http,
            api_key: api_key.into(),
            api_url: API_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            max_tokens: MAX_TOKENS,
            max_retries: DEFAULT_MAX_RETRIES,
        })
    }

    /// Point the client at another Messages endpoint (proxy, gateway)
    pub fn with_api_url(mut self, url: &str) -> Self {
        self.api_url = url.to_string();
        self
    }

    /// Set the model to use
    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }

    /// Set the number of attempts per suggestion
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries.max(1);
        self
    }

    /// Request a suggestion, retrying with a fixed delay
    pub async fn complete_with_retries(&self, request: &SuggestionRequest) -> AiResult<String> {
        let mut last_error = None;

        for attempt in 1..=self.max_retries {
            match self.call_api(request).await {
                Ok(text) => return Ok(text),
                Err(e) => {
                    warn!(attempt, max = self.max_retries, error = %e, "suggestion request failed");
                    last_error = Some(e);

                    if attempt < self.max_retries {
                        tokio::time::sleep(Duration::from_millis(RETRY_DELAY_MS)).await;
                    }
                }
            }
        }

        Err(last_error.unwrap_or_else(|| AiError::ApiError("Unknown error".to_string())))
    }

    /// Single call to the Anthropic API
    async fn call_api(&self, request: &SuggestionRequest) -> AiResult<String> {
        debug!(model = %self.model, headers = request.headers.len(), "calling Anthropic API");

        let request_body = serde_json::json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "temperature": 0,
            "system": prompt::system_prompt(),
            "messages": [
                { "role": "user", "content": prompt::user_prompt(request) }
            ]
        });

        let response = self
            .http
            .post(&self.api_url)
            .header("Content-Type", "application/json")
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&request_body)
            .send()
            .await
            .map_err(|e| AiError::RequestFailed(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AiError::RequestFailed(e.to_string()))?;

        if !status.is_success() {
            return Err(parse_error_body(status.as_u16(), &body));
        }

        let text = extract_text(&body)?;
        debug!(bytes = text.len(), "received suggestion");
        Ok(text)
    }
}

#[async_trait]
impl SuggestionSource for AiClient {
    async fn suggest(&self, request: &SuggestionRequest) -> AiResult<String> {
        self.complete_with_retries(request).await
    }
}

/// Turn a non-2xx body into an error
fn parse_error_body(status: u16, body: &str) -> AiError {
    match serde_json::from_str::<AnthropicError>(body) {
        Ok(error) => AiError::ApiError(error.error.message),
        Err(_) => AiError::ApiError(format!("HTTP {}: {}", status, body)),
    }
}

/// Concatenate the text blocks of a successful response
fn extract_text(body: &str) -> AiResult<String> {
    let response: AnthropicResponse =
        serde_json::from_str(body).map_err(|e| AiError::InvalidResponse(e.to_string()))?;

    let text = response
        .content
        .iter()
        .filter(|c| c.content_type == "text")
        .map(|c| c.text.as_str())
        .collect::<Vec<_>>()
        .join("");

    if text.is_empty() {
        return Err(AiError::InvalidResponse("Empty response".to_string()));
    }

    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_text_blocks() {
        let body = r#"{"content": [
            {"type": "text", "text": "{\"a_party_id\": "},
            {"type": "tool_use"},
            {"type": "text", "text": "\"MSISDN\"}"}
        ]}"#;
        assert_eq!(extract_text(body).unwrap(), r#"{"a_party_id": "MSISDN"}"#);
    }

    #[test]
    fn test_extract_text_empty() {
        assert!(matches!(
            extract_text(r#"{"content": []}"#),
            Err(AiError::InvalidResponse(_))
        ));
        assert!(matches!(extract_text("nope"), Err(AiError::InvalidResponse(_))));
    }

    #[test]
    fn test_parse_error_body() {
        let err = parse_error_body(401, r#"{"error": {"message": "invalid x-api-key"}}"#);
        assert_eq!(err.to_string(), "API error: invalid x-api-key");

        let err = parse_error_body(502, "Bad Gateway");
        assert_eq!(err.to_string(), "API error: HTTP 502: Bad Gateway");
    }

    #[test]
    fn test_builder() {
        let client = AiClient::new("key", Duration::from_secs(5))
            .unwrap()
            .with_model("other-model")
            .with_api_url("http://localhost:9/v1/messages")
            .with_max_retries(0);
        assert_eq!(client.model, "other-model");
        assert_eq!(client.api_url, "http://localhost:9/v1/messages");
        assert_eq!(client.max_retries, 1);
    }

    #[tokio::test]
    async fn test_unresponsive_api_times_out() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/v1/messages", listener.local_addr().unwrap());
        // Accept connections and never answer
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let client = AiClient::new("key", Duration::from_millis(200))
            .unwrap()
            .with_api_url(&url)
            .with_max_retries(1);
        let request = SuggestionRequest::new(&["MSISDN".to_string()]);
        let result = tokio::time::timeout(Duration::from_secs(5), client.complete_with_retries(&request)).await;
        assert!(matches!(result, Ok(Err(AiError::RequestFailed(_)))));

        let suggester = crate::mapping::MappingSuggester::new(std::sync::Arc::new(client));
        let headers = vec!["MSISDN".to_string(), "Dst IP".to_string()];
        let suggestion = tokio::time::timeout(Duration::from_secs(5), suggester.suggest(&headers))
            .await
            .unwrap();
        assert_eq!(suggestion.source, crate::mapping::MappingSource::Fuzzy);
        assert_eq!(suggestion.mapping.get("a_party_id"), Some("MSISDN"));
    }
}
