// Gemini API client for structured text generation
//
// Implements the text-generation capability boundary:
// - one generateContent call per request, JSON response mode with a schema
// - returns the raw text payload (or nothing) for the recommender to validate
// - classifies transport and HTTP failures

use crate::error::RecommendationError;
use async_trait::async_trait;
use reqwest::{header, Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

/// A black-box capability: prompt + response schema in, text payload out.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// `Ok(None)` means the capability answered without a payload.
    async fn generate(
        &self,
        api_key: &str,
        prompt: &str,
        schema: &Value,
    ) -> Result<Option<String>, RecommendationError>;

    fn model(&self) -> &str;
}

/// Request to the generateContent endpoint
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig<'a>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig<'a> {
    response_mime_type: &'static str,
    response_schema: &'a Value,
}

/// Response from the generateContent endpoint
#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
}

pub struct GeminiClient {
    base_url: String,
    model: String,
    client: Client,
}

impl GeminiClient {
    /// Create a client against `base_url` (no trailing path)
    pub fn new(base_url: &str, model: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            client,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/v1beta/models/{}:generateContent", self.base_url, self.model)
    }

    /// Map a non-success status to an error kind
    fn classify_status(status: StatusCode, body: &str) -> RecommendationError {
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                RecommendationError::CredentialRejected(status.as_u16())
            }
            // Gemini reports unknown keys as a 400 with this reason
            StatusCode::BAD_REQUEST if body.contains("API_KEY_INVALID") => {
                RecommendationError::CredentialRejected(status.as_u16())
            }
            StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => RecommendationError::Timeout,
            _ => RecommendationError::UpstreamFailure(format!("API error {}: {}", status, body)),
        }
    }

    /// Concatenate the text parts of the first candidate
    fn extract_text(response: GenerateContentResponse) -> Option<String> {
        let text = response
            .candidates
            .into_iter()
            .next()?
            .content?
            .parts
            .into_iter()
            .filter_map(|part| part.text)
            .collect::<Vec<_>>()
            .join("");

        if text.trim().is_empty() {
            None
        } else {
            Some(text)
        }
    }
}

#[async_trait]
impl TextGenerator for GeminiClient {
    async fn generate(
        &self,
        api_key: &str,
        prompt: &str,
        schema: &Value,
    ) -> Result<Option<String>, RecommendationError> {
        let request = GenerateContentRequest {
            contents: vec![Content {
                role: "user",
                parts: vec![Part { text: prompt }],
            }],
            generation_config: GenerationConfig {
                response_mime_type: "application/json",
                response_schema: schema,
            },
        };

        tracing::debug!("Requesting recommendations from {}", self.model);

        let response = self
            .client
            .post(self.endpoint())
            .header(header::CONTENT_TYPE, "application/json")
            .header("x-goog-api-key", api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(Self::classify_status(status, &error_text));
        }

        let body: GenerateContentResponse = response.json().await.map_err(|e| {
            if e.is_timeout() {
                RecommendationError::Timeout
            } else {
                RecommendationError::UpstreamFailure(format!("Failed to parse response envelope: {}", e))
            }
        })?;

        Ok(Self::extract_text(body))
    }

    fn model(&self) -> &str {
        &self.model
    }
}
