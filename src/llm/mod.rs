//! LLM provider clients for news search.
//!
//! This module provides a trait-based abstraction over the supported
//! providers (Grok/xAI, Anthropic, Gemini, OpenAI). Every client implements
//! the same `search` contract: send a search prompt, parse the JSON news
//! payload out of the model's reply, and report token usage.

mod anthropic;
mod error;
mod extract;
mod gemini;
mod grok;
mod openai;

pub use anthropic::AnthropicClient;
pub use error::{classify_http_status, ProviderError, ProviderErrorKind};
pub use extract::extract_news_payload;
pub use gemini::GeminiClient;
pub use grok::GrokClient;
pub use openai::OpenAiClient;

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::locale::LocalizedText;

/// Identifier of a provider, including the pseudo-provider `auto`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderId {
    Auto,
    Grok,
    Anthropic,
    Gemini,
    #[serde(rename = "openai")]
    OpenAi,
}

impl ProviderId {
    /// The concrete providers, in the order they are presented.
    pub const CONCRETE: [ProviderId; 4] = [
        ProviderId::Grok,
        ProviderId::Anthropic,
        ProviderId::Gemini,
        ProviderId::OpenAi,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderId::Auto => "auto",
            ProviderId::Grok => "grok",
            ProviderId::Anthropic => "anthropic",
            ProviderId::Gemini => "gemini",
            ProviderId::OpenAi => "openai",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            ProviderId::Auto => "Automatic (fallback chain)",
            ProviderId::Grok => "Grok (xAI)",
            ProviderId::Anthropic => "Anthropic Claude",
            ProviderId::Gemini => "Google Gemini",
            ProviderId::OpenAi => "OpenAI GPT",
        }
    }

    /// Parse a provider id. Unknown values coerce to `Auto` rather than
    /// failing: an invalid selector must never reject a discovery request.
    pub fn parse_lenient(value: &str) -> ProviderId {
        match value.trim().to_ascii_lowercase().as_str() {
            "grok" => ProviderId::Grok,
            "anthropic" => ProviderId::Anthropic,
            "gemini" => ProviderId::Gemini,
            "openai" => ProviderId::OpenAi,
            _ => ProviderId::Auto,
        }
    }
}

impl std::fmt::Display for ProviderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the caller picked a provider for a discovery run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderSelector {
    /// Walk the configured fallback chain.
    Auto,
    /// Use exactly this provider; failure is terminal.
    Explicit(ProviderId),
}

impl ProviderSelector {
    pub fn parse(value: &str) -> ProviderSelector {
        match ProviderId::parse_lenient(value) {
            ProviderId::Auto => ProviderSelector::Auto,
            id => ProviderSelector::Explicit(id),
        }
    }

    pub fn as_provider_id(&self) -> ProviderId {
        match self {
            ProviderSelector::Auto => ProviderId::Auto,
            ProviderSelector::Explicit(id) => *id,
        }
    }
}

/// Token usage reported by a provider for one request.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl TokenUsage {
    pub fn new(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            input_tokens,
            output_tokens,
        }
    }

    pub fn total(&self) -> u64 {
        self.input_tokens.saturating_add(self.output_tokens)
    }
}

/// Size of the web-search context window, a cost/quality trade-off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchContextSize {
    Low,
    Medium,
    High,
}

impl SearchContextSize {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchContextSize::Low => "low",
            SearchContextSize::Medium => "medium",
            SearchContextSize::High => "high",
        }
    }
}

impl Default for SearchContextSize {
    fn default() -> Self {
        SearchContextSize::Low
    }
}

/// Per-request tuning passed to a provider client.
#[derive(Debug, Clone)]
pub struct SearchParams {
    pub temperature: f64,
    pub timeout: Duration,
    pub max_search_results: u32,
    pub search_context_size: SearchContextSize,
    /// Restrict web search to this domain when the provider supports it.
    pub allowed_domain: Option<String>,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            temperature: 0.3,
            timeout: Duration::from_secs(120),
            max_search_results: 5,
            search_context_size: SearchContextSize::default(),
            allowed_domain: None,
        }
    }
}

/// One news item extracted from a provider reply.
#[derive(Debug, Clone, Serialize)]
pub struct NewsItem {
    pub title: LocalizedText,
    pub summary: LocalizedText,
    pub source_url: Option<String>,
}

/// Title/summary values arrive either as a plain string (single-language
/// sources) or as a language→text map.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum MaybeLocalized {
    Map(BTreeMap<String, String>),
    Plain(String),
}

impl MaybeLocalized {
    fn into_localized(self, fallback_lang: &str) -> LocalizedText {
        match self {
            MaybeLocalized::Plain(text) => LocalizedText::plain(fallback_lang, text),
            MaybeLocalized::Map(map) => LocalizedText::from(map),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawNewsItem {
    title: Option<MaybeLocalized>,
    #[serde(default)]
    summary: Option<MaybeLocalized>,
    #[serde(default)]
    source_url: Option<String>,
}

/// The JSON payload providers are instructed to return:
/// `{"news": [{"title": ..., "summary": ..., "source_url": ...}]}`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct NewsPayload {
    pub news: Vec<NewsItem>,
}

impl NewsPayload {
    /// Convert a parsed JSON value into a payload, tolerating both the
    /// plain-string and per-language item shapes. Items without any title
    /// are dropped.
    pub fn from_value(value: serde_json::Value) -> Result<Self, serde_json::Error> {
        #[derive(Deserialize)]
        struct RawPayload {
            #[serde(default)]
            news: Vec<RawNewsItem>,
        }

        let raw: RawPayload = serde_json::from_value(value)?;
        let news = raw
            .news
            .into_iter()
            .filter_map(|item| {
                let title = item.title?.into_localized("ru");
                if title.is_empty() {
                    return None;
                }
                let summary = item
                    .summary
                    .map(|s| s.into_localized("ru"))
                    .unwrap_or_default();
                let source_url = item.source_url.filter(|u| !u.trim().is_empty());
                Some(NewsItem {
                    title,
                    summary,
                    source_url,
                })
            })
            .collect();
        Ok(Self { news })
    }
}

/// Result of a successful provider search.
#[derive(Debug, Clone)]
pub struct SearchOutcome {
    pub payload: NewsPayload,
    pub usage: TokenUsage,
}

/// Trait implemented by every provider client.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    fn id(&self) -> ProviderId;

    /// Model name requests are issued with.
    fn model(&self) -> &str;

    /// Run one news search. Any transport, quota, or payload problem is a
    /// [`ProviderError`]; the caller decides whether to fall back.
    async fn search(
        &self,
        prompt: &str,
        params: &SearchParams,
    ) -> Result<SearchOutcome, ProviderError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_provider_coerces_to_auto() {
        assert_eq!(ProviderId::parse_lenient("grok"), ProviderId::Grok);
        assert_eq!(ProviderId::parse_lenient("OpenAI"), ProviderId::OpenAi);
        assert_eq!(ProviderId::parse_lenient("mistral"), ProviderId::Auto);
        assert_eq!(ProviderId::parse_lenient(""), ProviderId::Auto);
    }

    #[test]
    fn selector_parse() {
        assert_eq!(ProviderSelector::parse("auto"), ProviderSelector::Auto);
        assert_eq!(
            ProviderSelector::parse("anthropic"),
            ProviderSelector::Explicit(ProviderId::Anthropic)
        );
        assert_eq!(ProviderSelector::parse("bogus"), ProviderSelector::Auto);
    }

    #[test]
    fn payload_accepts_plain_and_localized_items() {
        let value = serde_json::json!({
            "news": [
                {"title": "Простой заголовок", "summary": "Текст", "source_url": "https://a.example/1"},
                {"title": {"en": "Plant opened", "ru": "Завод открыт"},
                 "summary": {"en": "Details"}, "source_url": ""},
                {"summary": "no title, dropped"}
            ]
        });
        let payload = NewsPayload::from_value(value).unwrap();
        assert_eq!(payload.news.len(), 2);
        assert_eq!(
            payload.news[0].title.resolve("ru"),
            Some("Простой заголовок")
        );
        assert_eq!(
            payload.news[0].source_url.as_deref(),
            Some("https://a.example/1")
        );
        assert_eq!(payload.news[1].title.get("en"), Some("Plant opened"));
        assert!(payload.news[1].source_url.is_none());
    }

    #[test]
    fn token_usage_total_saturates() {
        let usage = TokenUsage::new(u64::MAX, 10);
        assert_eq!(usage.total(), u64::MAX);
    }
}
