//! Provider availability and the per-run client registry.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;

use crate::config::Credentials;
use crate::llm::{
    AnthropicClient, GeminiClient, GrokClient, OpenAiClient, ProviderClient, ProviderId,
    ProviderSelector,
};
use crate::store::ConfigSnapshot;

/// A provider is available iff its credential is present and non-empty;
/// `auto` requires at least one underlying provider. Pure function of the
/// configured credentials.
pub fn provider_available(credentials: &Credentials, provider: ProviderId) -> bool {
    match provider {
        ProviderId::Auto => ProviderId::CONCRETE
            .iter()
            .any(|p| credentials.key(*p).is_some()),
        concrete => credentials.key(concrete).is_some(),
    }
}

/// Provider entry for the `list providers` operation.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderInfo {
    pub id: ProviderId,
    pub name: String,
    pub description: String,
    pub available: bool,
}

/// Describe every selectable provider, `auto` first.
pub fn list_providers(credentials: &Credentials, snapshot: &ConfigSnapshot) -> Vec<ProviderInfo> {
    let mut providers = vec![ProviderInfo {
        id: ProviderId::Auto,
        name: ProviderId::Auto.display_name().to_string(),
        description: format!(
            "Tries {} first, then the configured fallback chain",
            snapshot.primary_provider
        ),
        available: provider_available(credentials, ProviderId::Auto),
    }];
    for id in ProviderId::CONCRETE {
        let price = snapshot.pricing.price(id);
        providers.push(ProviderInfo {
            id,
            name: id.display_name().to_string(),
            description: format!(
                "{} — ${}/M input, ${}/M output tokens",
                snapshot.models.model(id),
                price.input,
                price.output
            ),
            available: provider_available(credentials, id),
        });
    }
    providers
}

/// Clients for one run, built from the run's configuration snapshot.
///
/// Only available providers get a client; the executor synthesizes a failed
/// attempt for an explicitly requested provider with no client.
pub struct ProviderRegistry {
    clients: BTreeMap<ProviderId, Arc<dyn ProviderClient>>,
    auto_order: Vec<ProviderId>,
    models: BTreeMap<ProviderId, String>,
}

impl ProviderRegistry {
    pub fn from_snapshot(
        snapshot: &ConfigSnapshot,
        credentials: &Credentials,
        http: reqwest::Client,
    ) -> Self {
        let mut clients: BTreeMap<ProviderId, Arc<dyn ProviderClient>> = BTreeMap::new();
        for id in ProviderId::CONCRETE {
            let Some(key) = credentials.key(id) else {
                continue;
            };
            let key = key.to_string();
            let model = snapshot.models.model(id).to_string();
            let client: Arc<dyn ProviderClient> = match id {
                ProviderId::Grok => Arc::new(GrokClient::new(http.clone(), key, model)),
                ProviderId::Anthropic => Arc::new(AnthropicClient::new(http.clone(), key, model)),
                ProviderId::Gemini => Arc::new(GeminiClient::new(http.clone(), key, model)),
                ProviderId::OpenAi => Arc::new(OpenAiClient::new(http.clone(), key, model)),
                ProviderId::Auto => continue,
            };
            clients.insert(id, client);
        }

        let auto_order = auto_order(snapshot);
        let models = ProviderId::CONCRETE
            .into_iter()
            .map(|id| (id, snapshot.models.model(id).to_string()))
            .collect();
        Self {
            clients,
            auto_order,
            models,
        }
    }

    /// Build a registry from pre-made clients. The executor and tests use
    /// this to inject scripted providers.
    pub fn with_clients(
        clients: Vec<Arc<dyn ProviderClient>>,
        auto_order: Vec<ProviderId>,
    ) -> Self {
        let models = clients
            .iter()
            .map(|c| (c.id(), c.model().to_string()))
            .collect();
        let clients = clients.into_iter().map(|c| (c.id(), c)).collect();
        Self {
            clients,
            auto_order,
            models,
        }
    }

    pub fn client(&self, id: ProviderId) -> Option<&Arc<dyn ProviderClient>> {
        self.clients.get(&id)
    }

    /// Model name attempts against `id` would use, even when no client is
    /// configured (needed for failed-attempt ledger rows).
    pub fn model_for(&self, id: ProviderId) -> &str {
        self.models.get(&id).map(|m| m.as_str()).unwrap_or("")
    }

    /// Resolve the effective provider order for a selector.
    ///
    /// Explicit selection yields exactly that provider, configured or not;
    /// auto yields the primary-then-fallback order restricted to providers
    /// that actually have a client.
    pub fn effective_order(&self, selector: ProviderSelector) -> Vec<ProviderId> {
        match selector {
            ProviderSelector::Explicit(id) => vec![id],
            ProviderSelector::Auto => self
                .auto_order
                .iter()
                .copied()
                .filter(|id| self.clients.contains_key(id))
                .collect(),
        }
    }
}

/// Primary provider followed by the fallback chain, deduplicated.
fn auto_order(snapshot: &ConfigSnapshot) -> Vec<ProviderId> {
    let mut order = vec![snapshot.primary_provider];
    for id in &snapshot.fallback_chain {
        if *id != ProviderId::Auto && !order.contains(id) {
            order.push(*id);
        }
    }
    order
}
