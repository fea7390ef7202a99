use async_trait::async_trait;
use log::{debug, error};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::GenerationError;

use super::{GenerativeTextClient, ModelChoice};

pub const DEFAULT_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_API_KEY_ENV: &str = "GEMINI_API_KEY";

pub struct GeminiClient {
    client: Client,
    api_key: String,
    endpoint: String,
}

impl GeminiClient {
    pub fn new<K: AsRef<str>, E: AsRef<str>>(api_key: K, endpoint: E) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.as_ref().to_string(),
            endpoint: endpoint.as_ref().trim_end_matches('/').to_string(),
        }
    }

    /// Reads the API key from the environment variable `var`
    pub fn from_env<V: AsRef<str>, E: AsRef<str>>(
        var: V,
        endpoint: E,
    ) -> Result<Self, GenerationError> {
        let var = var.as_ref();
        let api_key = std::env::var(var).map_err(|_| GenerationError::MissingApiKey {
            var: var.to_string(),
        })?;
        Ok(Self::new(api_key, endpoint))
    }

    fn url(&self, model: &ModelChoice) -> String {
        format!("{}/models/{}:generateContent", self.endpoint, model)
    }
}

#[async_trait]
impl GenerativeTextClient for GeminiClient {
    async fn generate(
        &self,
        model: &ModelChoice,
        instruction: &str,
    ) -> Result<String, GenerationError> {
        let request_payload = GeminiRequest {
            contents: vec![GeminiContent {
                parts: vec![GeminiPart {
                    text: instruction.to_string(),
                }],
            }],
        };

        debug!(
            "Sending {} chars to model {}",
            instruction.chars().count(),
            model
        );
        let response = self
            .client
            .post(self.url(model))
            .header("Content-Type", "application/json")
            .header("x-goog-api-key", &self.api_key)
            .json(&request_payload)
            .send()
            .await?;

        if response.status().is_success() {
            let body = response.text().await?;
            let gemini_response: GeminiResponse = serde_json::from_str(&body)
                .map_err(|e| GenerationError::MalformedResponse(e.to_string()))?;

            if let Some(usage) = &gemini_response.usage_metadata {
                debug!("Prompt Tokens Used: {}", usage.prompt_token_count);
                debug!("Completion Tokens Used: {}", usage.candidates_token_count);
                debug!("Total Tokens: {}", usage.total_token_count);
            }

            let text = gemini_response
                .candidates
                .into_iter()
                .filter_map(|c| c.content)
                .flat_map(|c| c.parts)
                .filter_map(|p| p.text)
                .collect::<Vec<String>>()
                .join("\n");

            Ok(text)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!("Gemini returned {}: {}", status, body);
            Err(GenerationError::Status {
                status: status.as_u16(),
                body,
            })
        }
    }
}

#[derive(Serialize)]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
}

#[derive(Serialize)]
struct GeminiContent {
    parts: Vec<GeminiPart>,
}

#[derive(Serialize)]
struct GeminiPart {
    text: String,
}

#[derive(Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    #[serde(rename = "usageMetadata")]
    usage_metadata: Option<GeminiUsageMetadata>,
}

#[derive(Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiCandidateContent>,
}

#[derive(Deserialize)]
struct GeminiCandidateContent {
    #[serde(default)]
    parts: Vec<GeminiCandidatePart>,
}

#[derive(Deserialize)]
struct GeminiCandidatePart {
    text: Option<String>,
}

#[derive(Deserialize)]
struct GeminiUsageMetadata {
    #[serde(rename = "promptTokenCount", default)]
    prompt_token_count: u32,
    #[serde(rename = "candidatesTokenCount", default)]
    candidates_token_count: u32,
    #[serde(rename = "totalTokenCount", default)]
    total_token_count: u32,
}
