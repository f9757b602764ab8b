//! OpenAI chat completions client.
//!
//! The wire types here are the OpenAI chat-completions shapes; the Grok
//! client reuses them since xAI exposes a compatible API.

use reqwest::Client;
use serde::{Deserialize, Serialize};

use async_trait::async_trait;

use super::{
    extract_news_payload, ProviderClient, ProviderError, ProviderId, SearchOutcome, SearchParams,
    TokenUsage,
};

const OPENAI_API_URL: &str = "https://api.openai.com/v1/chat/completions";

const SYSTEM_PROMPT: &str =
    "You are a news research assistant. Use web search where available and \
     return the answer strictly as JSON.";

/// Chat-completions request body (shared with the Grok client).
#[derive(Debug, Serialize)]
pub(super) struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatRequestMessage>,
    pub temperature: f64,
    pub response_format: ResponseFormat,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub web_search_options: Option<WebSearchOptions>,
}

#[derive(Debug, Serialize)]
pub(super) struct ChatRequestMessage {
    pub role: &'static str,
    pub content: String,
}

#[derive(Debug, Serialize)]
pub(super) struct ResponseFormat {
    #[serde(rename = "type")]
    pub format_type: &'static str,
}

impl ResponseFormat {
    pub fn json_object() -> Self {
        Self {
            format_type: "json_object",
        }
    }
}

/// Web-search tuning understood by the xAI endpoint.
#[derive(Debug, Serialize)]
pub(super) struct WebSearchOptions {
    pub max_search_results: u32,
    pub search_context_size: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_domains: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
pub(super) struct ChatResponse {
    pub choices: Vec<ChatChoice>,
    #[serde(default)]
    pub usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
pub(super) struct ChatChoice {
    pub message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
pub(super) struct ChatResponseMessage {
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(super) struct ChatUsage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
}

/// Execute a chat-completions request against an OpenAI-compatible endpoint
/// and pull the news payload out of the first choice.
pub(super) async fn execute_chat(
    client: &Client,
    url: &str,
    api_key: &str,
    request: &ChatRequest,
    params: &SearchParams,
) -> Result<SearchOutcome, ProviderError> {
    let response = client
        .post(url)
        .bearer_auth(api_key)
        .json(request)
        .timeout(params.timeout)
        .send()
        .await
        .map_err(|e| ProviderError::from_transport(e, params.timeout))?;

    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    if !status.is_success() {
        return Err(ProviderError::from_status(status.as_u16(), &body));
    }

    let parsed: ChatResponse = serde_json::from_str(&body)
        .map_err(|e| ProviderError::Parse(format!("invalid completion body: {e}")))?;

    let content = parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .ok_or_else(|| ProviderError::Parse("no choices in response".to_string()))?;

    let usage = parsed
        .usage
        .map(|u| TokenUsage::new(u.prompt_tokens, u.completion_tokens))
        .unwrap_or_default();

    let payload = extract_news_payload(&content)?;
    Ok(SearchOutcome { payload, usage })
}

/// OpenAI GPT client.
pub struct OpenAiClient {
    client: Client,
    api_key: String,
    model: String,
}

impl OpenAiClient {
    pub fn new(client: Client, api_key: String, model: String) -> Self {
        Self {
            client,
            api_key,
            model,
        }
    }
}

#[async_trait]
impl ProviderClient for OpenAiClient {
    fn id(&self) -> ProviderId {
        ProviderId::OpenAi
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn search(
        &self,
        prompt: &str,
        params: &SearchParams,
    ) -> Result<SearchOutcome, ProviderError> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatRequestMessage {
                    role: "system",
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatRequestMessage {
                    role: "user",
                    content: prompt.to_string(),
                },
            ],
            temperature: params.temperature,
            response_format: ResponseFormat::json_object(),
            web_search_options: None,
        };

        tracing::debug!(model = %self.model, "sending request to OpenAI");
        execute_chat(&self.client, OPENAI_API_URL, &self.api_key, &request, params).await
    }
}
