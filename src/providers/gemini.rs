//! Google Gemini `generateContent` client.
//!
//! See: <https://ai.google.dev/api/generate-content>

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::traits::{GenerationParams, RemoteGenerator, RemoteOutput};
use crate::{AbridgeError, Result};

/// Default base URL for the Gemini API.
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Default model for summaries and mindmaps.
pub const DEFAULT_MODEL: &str = "gemini-1.5-flash";

/// Client for the Gemini REST API.
///
/// One `generate` call is one HTTP request. Status codes are mapped onto
/// [`AbridgeError`] variants so the retry loop can classify them.
#[derive(Clone)]
pub struct GeminiGenerator {
    api_key: String,
    model: String,
    http: Client,
    base_url: String,
}

impl GeminiGenerator {
    /// Create a client for `model` with the given API key.
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Result<Self> {
        Self::with_base_url(api_key, model, DEFAULT_BASE_URL)
    }

    /// Create a client with a custom base URL (for testing with wiremock).
    pub fn with_base_url(
        api_key: impl Into<String>,
        model: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(AbridgeError::Configuration("Gemini API key is empty".into()));
        }
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| AbridgeError::Configuration(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            api_key,
            model: model.into(),
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    async fn error_for_status(response: reqwest::Response) -> AbridgeError {
        let status = response.status().as_u16();
        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_secs);
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorEnvelope>(&body)
            .map(|e| e.error.message)
            .unwrap_or(body);

        match status {
            401 | 403 => AbridgeError::AuthenticationFailed,
            429 if is_hard_quota(&message) => AbridgeError::QuotaExceeded(message),
            429 => AbridgeError::RateLimited { retry_after },
            _ => AbridgeError::Api { status, message },
        }
    }
}

/// Daily / billing quotas do not recover within a retry window.
fn is_hard_quota(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    lower.contains("per day") || lower.contains("billing") || lower.contains("daily")
}

#[async_trait]
impl RemoteGenerator for GeminiGenerator {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn generate(&self, prompt: &str, params: &GenerationParams) -> Result<RemoteOutput> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        );
        let request = GenerateContentRequest {
            contents: vec![Content {
                role: "user",
                parts: vec![Part { text: prompt }],
            }],
            generation_config: GenerationConfig {
                temperature: params.temperature,
                max_output_tokens: params.max_output_tokens,
                response_mime_type: params.json_output.then_some("application/json"),
            },
        };

        let response = self
            .http
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .timeout(params.timeout)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::error_for_status(response).await);
        }

        let body: GenerateContentResponse = response.json().await?;

        if let Some(reason) = body
            .prompt_feedback
            .as_ref()
            .and_then(|f| f.block_reason.as_deref())
        {
            return Err(AbridgeError::InvalidInput(format!(
                "prompt blocked by provider: {reason}"
            )));
        }

        let text: String = body
            .candidates
            .iter()
            .take(1)
            .flat_map(|c| c.content.iter().flat_map(|content| &content.parts))
            .filter_map(|p| p.text.as_deref())
            .collect();
        if text.trim().is_empty() {
            return Err(AbridgeError::EmptyResponse);
        }

        let usage = body.usage_metadata.unwrap_or_default();
        debug!(
            model = %self.model,
            tokens_in = usage.prompt_token_count,
            tokens_out = usage.candidates_token_count,
            "gemini call complete"
        );
        Ok(RemoteOutput::new(
            text,
            usage.prompt_token_count,
            usage.candidates_token_count,
        ))
    }
}

#[derive(Serialize)]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<&'static str>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u64,
    #[serde(default)]
    candidates_token_count: u64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hard_quota_detection() {
        assert!(is_hard_quota("Quota exceeded: requests per day"));
        assert!(!is_hard_quota("Resource exhausted, requests per minute"));
    }

    #[test]
    fn empty_key_rejected() {
        assert!(GeminiGenerator::new("  ", DEFAULT_MODEL).is_err());
    }

    #[test]
    fn request_serializes_camel_case() {
        let request = GenerateContentRequest {
            contents: vec![Content {
                role: "user",
                parts: vec![Part { text: "hi" }],
            }],
            generation_config: GenerationConfig {
                temperature: 0.5,
                max_output_tokens: 128,
                response_mime_type: None,
            },
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["generationConfig"]["maxOutputTokens"], 128);
        assert!(json["generationConfig"].get("responseMimeType").is_none());
        assert_eq!(json["contents"][0]["parts"][0]["text"], "hi");
    }
}
