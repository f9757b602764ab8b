//! The fallback chain executor.
//!
//! One target, one effective provider order. Explicit selection makes a
//! single attempt; auto mode advances through the order until a provider
//! succeeds or the order is exhausted. Every attempt, including ones that
//! never reach an API, yields exactly one attempt record for the ledger.

use std::time::Instant;

use crate::llm::{NewsItem, ProviderError, ProviderId, ProviderSelector, SearchParams, TokenUsage};
use crate::store::{Price, PricingTable};

use super::registry::ProviderRegistry;

/// Ledger precision for stored costs (six decimal places).
const COST_SCALE: f64 = 1_000_000.0;

/// Cost of one attempt in USD: token counts times the per-1M-token prices.
pub fn attempt_cost(usage: &TokenUsage, price: &Price) -> f64 {
    let raw = (usage.input_tokens as f64 * price.input
        + usage.output_tokens as f64 * price.output)
        / 1_000_000.0;
    round_cost(raw)
}

fn round_cost(value: f64) -> f64 {
    (value * COST_SCALE).round() / COST_SCALE
}

/// Record of one provider attempt.
#[derive(Debug, Clone)]
pub struct Attempt {
    pub provider: ProviderId,
    pub model: String,
    pub usage: TokenUsage,
    pub cost_usd: f64,
    pub duration_ms: u64,
    pub success: bool,
    pub error: Option<String>,
    pub news_extracted: u64,
}

/// Result of walking the chain for one target.
#[derive(Debug, Clone, Default)]
pub struct ChainOutcome {
    /// Items from the successful provider, empty otherwise.
    pub items: Vec<NewsItem>,
    /// The provider that succeeded, if any.
    pub succeeded: Option<ProviderId>,
    /// One entry per attempt, in order.
    pub attempts: Vec<Attempt>,
}

impl ChainOutcome {
    /// Errors collected along the chain, for the placeholder record.
    pub fn error_summary(&self) -> String {
        self.attempts
            .iter()
            .filter_map(|a| {
                a.error
                    .as_ref()
                    .map(|e| format!("{}: {e}", a.provider))
            })
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Walk the effective provider order for one target.
pub async fn execute(
    registry: &ProviderRegistry,
    selector: ProviderSelector,
    prompt: &str,
    params: &SearchParams,
    pricing: &PricingTable,
) -> ChainOutcome {
    let order = registry.effective_order(selector);
    let mut outcome = ChainOutcome::default();

    for provider in order {
        let Some(client) = registry.client(provider) else {
            // Explicit selection of an unconfigured provider: the attempt is
            // recorded with zero tokens, since no API was ever reached.
            tracing::error!(%provider, "provider requested but not configured");
            outcome.attempts.push(Attempt {
                provider,
                model: registry.model_for(provider).to_string(),
                usage: TokenUsage::default(),
                cost_usd: 0.0,
                duration_ms: 0,
                success: false,
                error: Some(ProviderError::MissingKey.to_string()),
                news_extracted: 0,
            });
            continue;
        };

        let price = pricing.price(provider);
        let start = Instant::now();
        let result = client.search(prompt, params).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(found) => {
                let cost = attempt_cost(&found.usage, &price);
                tracing::info!(
                    %provider,
                    input_tokens = found.usage.input_tokens,
                    output_tokens = found.usage.output_tokens,
                    news = found.payload.news.len(),
                    duration_ms,
                    "provider succeeded"
                );
                outcome.attempts.push(Attempt {
                    provider,
                    model: client.model().to_string(),
                    usage: found.usage,
                    cost_usd: cost,
                    duration_ms,
                    success: true,
                    error: None,
                    news_extracted: found.payload.news.len() as u64,
                });
                outcome.succeeded = Some(provider);
                outcome.items = found.payload.news;
                break;
            }
            Err(err) => {
                // Parse failures still consumed tokens upstream, but the
                // usage never reached us; the ledger records zero.
                tracing::warn!(%provider, kind = %err.kind(), error = %err, "provider failed");
                outcome.attempts.push(Attempt {
                    provider,
                    model: client.model().to_string(),
                    usage: TokenUsage::default(),
                    cost_usd: 0.0,
                    duration_ms,
                    success: false,
                    error: Some(err.to_string()),
                    news_extracted: 0,
                });
            }
        }
    }

    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::testutil::{Script, ScriptedProvider};
    use crate::store::PricingTable;

    fn pricing() -> PricingTable {
        PricingTable::default()
    }

    #[tokio::test]
    async fn auto_mode_stops_at_first_success() {
        let grok = ScriptedProvider::new(
            ProviderId::Grok,
            vec![Script::Succeed {
                items: 2,
                usage: TokenUsage::new(1000, 500),
            }],
        );
        let anthropic = ScriptedProvider::new(ProviderId::Anthropic, vec![Script::Fail]);
        let registry = ProviderRegistry::with_clients(
            vec![grok.clone(), anthropic.clone()],
            vec![ProviderId::Grok, ProviderId::Anthropic],
        );

        let outcome = execute(
            &registry,
            ProviderSelector::Auto,
            "prompt",
            &SearchParams::default(),
            &pricing(),
        )
        .await;

        assert_eq!(outcome.succeeded, Some(ProviderId::Grok));
        assert_eq!(outcome.items.len(), 2);
        assert_eq!(outcome.attempts.len(), 1);
        assert_eq!(anthropic.call_count(), 0);
    }

    #[tokio::test]
    async fn auto_mode_advances_on_failure() {
        let grok = ScriptedProvider::new(ProviderId::Grok, vec![Script::Fail]);
        let anthropic = ScriptedProvider::new(
            ProviderId::Anthropic,
            vec![Script::Succeed {
                items: 1,
                usage: TokenUsage::new(800, 200),
            }],
        );
        let registry = ProviderRegistry::with_clients(
            vec![grok, anthropic],
            vec![ProviderId::Grok, ProviderId::Anthropic],
        );

        let outcome = execute(
            &registry,
            ProviderSelector::Auto,
            "prompt",
            &SearchParams::default(),
            &pricing(),
        )
        .await;

        assert_eq!(outcome.succeeded, Some(ProviderId::Anthropic));
        assert_eq!(outcome.attempts.len(), 2);
        assert!(!outcome.attempts[0].success);
        assert_eq!(outcome.attempts[0].usage.input_tokens, 0);
        assert_eq!(outcome.attempts[0].cost_usd, 0.0);
        assert!(outcome.attempts[1].success);
        assert!(outcome.error_summary().contains("grok"));
    }

    #[tokio::test]
    async fn explicit_mode_never_falls_back() {
        let openai = ScriptedProvider::new(ProviderId::OpenAi, vec![Script::Fail]);
        let anthropic = ScriptedProvider::new(
            ProviderId::Anthropic,
            vec![Script::Succeed {
                items: 3,
                usage: TokenUsage::default(),
            }],
        );
        let registry = ProviderRegistry::with_clients(
            vec![openai, anthropic.clone()],
            vec![ProviderId::OpenAi, ProviderId::Anthropic],
        );

        let outcome = execute(
            &registry,
            ProviderSelector::Explicit(ProviderId::OpenAi),
            "prompt",
            &SearchParams::default(),
            &pricing(),
        )
        .await;

        assert!(outcome.succeeded.is_none());
        assert_eq!(outcome.attempts.len(), 1);
        assert_eq!(anthropic.call_count(), 0);
    }

    #[tokio::test]
    async fn explicit_unconfigured_provider_yields_one_zero_token_record() {
        let registry = ProviderRegistry::with_clients(vec![], vec![]);

        let outcome = execute(
            &registry,
            ProviderSelector::Explicit(ProviderId::Gemini),
            "prompt",
            &SearchParams::default(),
            &pricing(),
        )
        .await;

        assert_eq!(outcome.attempts.len(), 1);
        let attempt = &outcome.attempts[0];
        assert_eq!(attempt.provider, ProviderId::Gemini);
        assert!(!attempt.success);
        assert_eq!(attempt.usage.total(), 0);
        assert_eq!(attempt.cost_usd, 0.0);
    }

    #[tokio::test]
    async fn exhausted_chain_reports_every_attempt() {
        let grok = ScriptedProvider::new(ProviderId::Grok, vec![Script::Fail]);
        let anthropic = ScriptedProvider::new(ProviderId::Anthropic, vec![Script::Fail]);
        let registry = ProviderRegistry::with_clients(
            vec![grok, anthropic],
            vec![ProviderId::Grok, ProviderId::Anthropic],
        );

        let outcome = execute(
            &registry,
            ProviderSelector::Auto,
            "prompt",
            &SearchParams::default(),
            &pricing(),
        )
        .await;

        assert!(outcome.succeeded.is_none());
        assert!(outcome.items.is_empty());
        assert_eq!(outcome.attempts.len(), 2);
    }

    #[test]
    fn cost_formula_and_rounding() {
        // 1000 input at $3/M plus 500 output at $15/M.
        let usage = TokenUsage::new(1000, 500);
        let price = Price {
            input: 3.0,
            output: 15.0,
        };
        let cost = attempt_cost(&usage, &price);
        assert!((cost - 0.0105).abs() < 1e-12);

        // Sub-precision amounts round to the ledger's six decimals.
        let tiny = attempt_cost(&TokenUsage::new(1, 0), &Price { input: 0.075, output: 0.3 });
        assert_eq!(tiny, 0.0);

        // Zero tokens cost exactly zero.
        assert_eq!(attempt_cost(&TokenUsage::default(), &price), 0.0);
    }
}
