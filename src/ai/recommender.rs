// Recommendation client
//
// Sends a built prompt to the text-generation capability and turns the
// untrusted payload into typed recommendations:
// 1. no payload -> EmptyResponse
// 2. payload must be an array of objects matching the response schema,
//    otherwise MalformedResponse (never a partial list)
// 3. catalog mode: entries not in the catalog are dropped; if that leaves
//    nothing, EmptyResponse
// 4. received order is preserved

use super::context_builder::{CatalogMode, PromptSpec, RequestBuilder, ResponseSchema};
use super::credentials::CredentialManager;
use super::gemini_client::TextGenerator;
use crate::catalog::Catalog;
use crate::error::RecommendationError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// One recommended book with its generated relevance explanation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendationResult {
    pub title: String,
    pub author: String,
    pub description: String,
    pub relevance: String,
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_year: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub isbn: Option<String>,
}

/// Anything that can turn a research topic into recommendations
#[async_trait]
pub trait Recommend: Send + Sync {
    async fn recommend(&self, query: &str) -> Result<Vec<RecommendationResult>, RecommendationError>;
}

pub struct RecommendationClient {
    generator: Arc<dyn TextGenerator>,
    credentials: Arc<CredentialManager>,
    catalog: Arc<Catalog>,
    mode: CatalogMode,
    timeout: Duration,
}

impl RecommendationClient {
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        credentials: Arc<CredentialManager>,
        catalog: Arc<Catalog>,
        mode: CatalogMode,
        timeout: Duration,
    ) -> Self {
        Self {
            generator,
            credentials,
            catalog,
            mode,
            timeout,
        }
    }

    /// One round-trip to the capability, validated. No retries.
    pub async fn fetch_recommendations(
        &self,
        spec: &PromptSpec,
    ) -> Result<Vec<RecommendationResult>, RecommendationError> {
        let api_key = self
            .credentials
            .api_key()
            .ok_or(RecommendationError::MissingCredential)?;

        let schema = spec.output_shape.to_json();
        let call = self
            .generator
            .generate(&api_key, &spec.instruction_text, &schema);

        let payload = match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(payload)) => payload,
            Ok(Err(e)) => {
                if let RecommendationError::CredentialRejected(status) = e {
                    tracing::warn!("Provider rejected the API key (HTTP {})", status);
                    self.credentials.invalidate();
                } else {
                    tracing::error!("Recommendation request failed: {}", e);
                }
                return Err(e);
            }
            Err(_) => {
                tracing::warn!("Recommendation request exceeded {:?}", self.timeout);
                return Err(RecommendationError::Timeout);
            }
        };

        let text = payload
            .filter(|text| !text.trim().is_empty())
            .ok_or(RecommendationError::EmptyResponse)?;

        let parsed = parse_payload(&text, &spec.output_shape).map_err(|detail| {
            tracing::warn!("Discarding malformed recommendation payload: {}", detail);
            RecommendationError::MalformedResponse(detail)
        })?;

        match spec.mode {
            CatalogMode::Open => Ok(parsed),
            CatalogMode::Catalog => self.restrict_to_catalog(parsed),
        }
    }

    /// Keep only entries that name a catalog book, rewritten with the
    /// catalog's own fields so they match it exactly.
    fn restrict_to_catalog(
        &self,
        parsed: Vec<RecommendationResult>,
    ) -> Result<Vec<RecommendationResult>, RecommendationError> {
        let received = parsed.len();
        let mut accepted: Vec<RecommendationResult> = Vec::with_capacity(received);

        for rec in parsed {
            let Some(entry) = self.catalog.find(&rec.title, &rec.author) else {
                tracing::warn!(
                    "Dropping recommendation not in catalog: {:?} by {:?}",
                    rec.title,
                    rec.author
                );
                continue;
            };

            if accepted
                .iter()
                .any(|a| a.title == entry.title && a.author == entry.author)
            {
                tracing::debug!("Dropping duplicate recommendation {:?}", entry.title);
                continue;
            }

            accepted.push(RecommendationResult {
                title: entry.title.clone(),
                author: entry.author.clone(),
                description: entry.description.clone(),
                relevance: rec.relevance,
                category: entry.category.clone(),
                published_year: Some(entry.published_year.clone()),
                isbn: None,
            });
        }

        // An empty list from the capability is a legitimate "nothing matched";
        // an empty list produced by filtering is not.
        if accepted.is_empty() && received > 0 {
            return Err(RecommendationError::EmptyResponse);
        }

        Ok(accepted)
    }
}

#[async_trait]
impl Recommend for RecommendationClient {
    async fn recommend(&self, query: &str) -> Result<Vec<RecommendationResult>, RecommendationError> {
        let spec = RequestBuilder::build(query, self.catalog.entries(), self.mode);
        let results = self.fetch_recommendations(&spec).await?;
        tracing::info!(
            "Received {} recommendations from {}",
            results.len(),
            self.generator.model()
        );
        Ok(results)
    }
}

/// Validate a payload against the response schema. Returns a diagnostic
/// message on the first violation.
fn parse_payload(text: &str, schema: &ResponseSchema) -> Result<Vec<RecommendationResult>, String> {
    let json_text = extract_json(text);
    let value: Value = serde_json::from_str(json_text).map_err(|e| format!("invalid JSON: {}", e))?;

    let items = value
        .as_array()
        .ok_or_else(|| format!("expected a JSON array, found {}", json_kind(&value)))?;

    items
        .iter()
        .enumerate()
        .map(|(index, item)| validate_item(index, item, schema))
        .collect()
}

fn validate_item(index: usize, item: &Value, schema: &ResponseSchema) -> Result<RecommendationResult, String> {
    let object = item
        .as_object()
        .ok_or_else(|| format!("item {} is {}, not an object", index, json_kind(item)))?;

    for field in &schema.fields {
        match object.get(field.name) {
            None | Some(Value::Null) if field.required => {
                return Err(format!("item {} is missing required field `{}`", index, field.name));
            }
            Some(Value::String(s)) if field.required && s.trim().is_empty() => {
                return Err(format!("item {} has a blank `{}`", index, field.name));
            }
            None | Some(Value::Null) | Some(Value::String(_)) => {}
            Some(other) => {
                return Err(format!(
                    "item {} field `{}` is {}, not a string",
                    index,
                    field.name,
                    json_kind(other)
                ));
            }
        }
    }

    serde_json::from_value(item.clone()).map_err(|e| format!("item {}: {}", index, e))
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Strip a markdown code fence if the payload came wrapped in one
fn extract_json(text: &str) -> &str {
    let text = text.trim();

    if let Some(start) = text.find("```json") {
        let json_start = start + 7;
        if let Some(end) = text[json_start..].find("```") {
            return text[json_start..json_start + end].trim();
        }
    }

    if let Some(start) = text.find("```") {
        let json_start = start + 3;
        if let Some(end) = text[json_start..].find("```") {
            return text[json_start..json_start + end].trim();
        }
    }

    text
}
