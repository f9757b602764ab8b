//! Grok (xAI) client.
//!
//! xAI exposes an OpenAI-compatible chat completions endpoint with built-in
//! web search; the search can be pinned to the target site's domain to keep
//! results (and cost) focused.

use reqwest::Client;

use async_trait::async_trait;

use super::openai::{
    execute_chat, ChatRequest, ChatRequestMessage, ResponseFormat, WebSearchOptions,
};
use super::{ProviderClient, ProviderError, ProviderId, SearchOutcome, SearchParams};

const XAI_API_URL: &str = "https://api.x.ai/v1/chat/completions";

const SYSTEM_PROMPT: &str =
    "Use web search to find news. Return the answer strictly as JSON.";

pub struct GrokClient {
    client: Client,
    api_key: String,
    model: String,
}

impl GrokClient {
    pub fn new(client: Client, api_key: String, model: String) -> Self {
        Self {
            client,
            api_key,
            model,
        }
    }
}

#[async_trait]
impl ProviderClient for GrokClient {
    fn id(&self) -> ProviderId {
        ProviderId::Grok
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
            web_search_options: Some(WebSearchOptions {
                max_search_results: params.max_search_results,
                search_context_size: params.search_context_size.as_str(),
                allowed_domains: params.allowed_domain.clone().map(|d| vec![d]),
            }),
        };

        tracing::debug!(model = %self.model, domain = ?params.allowed_domain, "sending request to Grok");
        execute_chat(&self.client, XAI_API_URL, &self.api_key, &request, params).await
    }
}
