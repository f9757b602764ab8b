//! Anthropic Claude client.

use reqwest::Client;
use serde::{Deserialize, Serialize};

use async_trait::async_trait;

use super::{
    extract_news_payload, ProviderClient, ProviderError, ProviderId, SearchOutcome, SearchParams,
    TokenUsage,
};

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 6144;

const SYSTEM_PROMPT: &str =
    "You are a news research assistant. Return the result strictly as JSON.";

#[derive(Debug, Serialize)]
struct MessageRequest {
    model: String,
    max_tokens: u32,
    system: &'static str,
    messages: Vec<Message>,
    tools: Vec<WebSearchTool>,
    temperature: f64,
}

#[derive(Debug, Serialize)]
struct Message {
    role: &'static str,
    content: String,
}

#[derive(Debug, Serialize)]
struct WebSearchTool {
    #[serde(rename = "type")]
    tool_type: &'static str,
    name: &'static str,
    max_uses: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    allowed_domains: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct MessageResponse {
    content: Vec<ContentBlock>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
}

pub struct AnthropicClient {
    client: Client,
    api_key: String,
    model: String,
}

impl AnthropicClient {
    pub fn new(client: Client, api_key: String, model: String) -> Self {
        Self {
            client,
            api_key,
            model,
        }
    }
}

#[async_trait]
impl ProviderClient for AnthropicClient {
    fn id(&self) -> ProviderId {
        ProviderId::Anthropic
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn search(
        &self,
        prompt: &str,
        params: &SearchParams,
    ) -> Result<SearchOutcome, ProviderError> {
        let request = MessageRequest {
            model: self.model.clone(),
            max_tokens: MAX_TOKENS,
            system: SYSTEM_PROMPT,
            messages: vec![Message {
                role: "user",
                content: prompt.to_string(),
            }],
            tools: vec![WebSearchTool {
                tool_type: "web_search_20250305",
                name: "web_search",
                max_uses: params.max_search_results,
                allowed_domains: params.allowed_domain.clone().map(|d| vec![d]),
            }],
            temperature: params.temperature,
        };

        tracing::debug!(model = %self.model, "sending request to Anthropic");

        let response = self
            .client
            .post(ANTHROPIC_API_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
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

        let parsed: MessageResponse = serde_json::from_str(&body)
            .map_err(|e| ProviderError::Parse(format!("invalid message body: {e}")))?;

        // The reply interleaves tool-use blocks with text; only text blocks
        // carry the payload.
        let content = parsed
            .content
            .into_iter()
            .filter(|b| b.block_type == "text")
            .filter_map(|b| b.text)
            .collect::<Vec<_>>()
            .join("\n");

        let usage = parsed
            .usage
            .map(|u| TokenUsage::new(u.input_tokens, u.output_tokens))
            .unwrap_or_default();

        let payload = extract_news_payload(&content)?;
        Ok(SearchOutcome { payload, usage })
    }
}
