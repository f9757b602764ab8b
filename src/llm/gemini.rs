//! Google Gemini client.

use reqwest::Client;
use serde::{Deserialize, Serialize};

use async_trait::async_trait;

use super::{
    extract_news_payload, ProviderClient, ProviderError, ProviderId, SearchOutcome, SearchParams,
    TokenUsage,
};

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

#[derive(Debug, Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
struct Part {
    text: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f64,
    #[serde(rename = "responseMimeType")]
    response_mime_type: &'static str,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(rename = "usageMetadata", default)]
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UsageMetadata {
    #[serde(rename = "promptTokenCount", default)]
    prompt_token_count: u64,
    #[serde(rename = "candidatesTokenCount", default)]
    candidates_token_count: u64,
}

pub struct GeminiClient {
    client: Client,
    api_key: String,
    model: String,
}

impl GeminiClient {
    pub fn new(client: Client, api_key: String, model: String) -> Self {
        Self {
            client,
            api_key,
            model,
        }
    }
}

#[async_trait]
impl ProviderClient for GeminiClient {
    fn id(&self) -> ProviderId {
        ProviderId::Gemini
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn search(
        &self,
        prompt: &str,
        params: &SearchParams,
    ) -> Result<SearchOutcome, ProviderError> {
        let request = GenerateRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: prompt.to_string(),
                }],
            }],
            generation_config: GenerationConfig {
                temperature: params.temperature,
                response_mime_type: "application/json",
            },
        };

        let url = format!("{GEMINI_API_BASE}/{}:generateContent", self.model);

        tracing::debug!(model = %self.model, "sending request to Gemini");

        let response = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&request)
            .timeout(params.timeout)
            .send()
            .await
            .map_err(|e| ProviderError::from_transport(e, params.timeout))?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(ProviderError::from_status(status.as_u16(), &body));
        }

        let parsed: GenerateResponse = serde_json::from_str(&body)
            .map_err(|e| ProviderError::Parse(format!("invalid generateContent body: {e}")))?;

        let content = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| {
                c.parts
                    .into_iter()
                    .filter_map(|p| p.text)
                    .collect::<Vec<_>>()
                    .join("\n")
            })
            .ok_or_else(|| ProviderError::Parse("no candidates in response".to_string()))?;

        let usage = parsed
            .usage_metadata
            .map(|u| TokenUsage::new(u.prompt_token_count, u.candidates_token_count))
            .unwrap_or_default();

        let payload = extract_news_payload(&content)?;
        Ok(SearchOutcome { payload, usage })
    }
}
