//! News discovery: provider registry, fallback chain, and the orchestrator
//! that walks targets and feeds the run/call ledger.

pub mod chain;
pub mod orchestrator;
pub mod progress;
pub mod prompt;
pub mod registry;

pub use chain::{Attempt, ChainOutcome};
pub use orchestrator::{DiscoveryEngine, StartError, Target, TargetScope};
pub use progress::{DiscoveryHub, DiscoveryPhase, ProgressSnapshot};
pub use registry::{provider_available, ProviderInfo, ProviderRegistry};

#[cfg(test)]
pub(crate) mod testutil {
    //! Scripted provider clients for exercising the chain and orchestrator
    //! without network access.

    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;

    use crate::llm::{
        NewsItem, NewsPayload, ProviderClient, ProviderError, ProviderId, SearchOutcome,
        SearchParams, TokenUsage,
    };
    use crate::locale::LocalizedText;

    /// What a scripted provider does when asked to search.
    #[derive(Clone)]
    pub enum Script {
        /// Succeed with this many items and the given usage.
        Succeed { items: usize, usage: TokenUsage },
        /// Fail with a server error.
        Fail,
    }

    pub struct ScriptedProvider {
        id: ProviderId,
        model: String,
        /// One script entry per call; the last entry repeats.
        scripts: Vec<Script>,
        calls: AtomicUsize,
    }

    impl ScriptedProvider {
        pub fn new(id: ProviderId, scripts: Vec<Script>) -> Arc<Self> {
            Arc::new(Self {
                id,
                model: format!("{}-test-model", id.as_str()),
                scripts,
                calls: AtomicUsize::new(0),
            })
        }

        pub fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ProviderClient for ScriptedProvider {
        fn id(&self) -> ProviderId {
            self.id
        }

        fn model(&self) -> &str {
            &self.model
        }

        async fn search(
            &self,
            _prompt: &str,
            _params: &SearchParams,
        ) -> Result<SearchOutcome, ProviderError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            let script = self
                .scripts
                .get(n)
                .or_else(|| self.scripts.last())
                .cloned()
                .unwrap_or(Script::Fail);
            match script {
                Script::Succeed { items, usage } => {
                    let news = (0..items)
                        .map(|i| NewsItem {
                            title: LocalizedText::plain("en", format!("Item {i} from {}", self.id)),
                            summary: LocalizedText::plain("en", "Summary"),
                            source_url: Some(format!("https://{}.example/{n}/{i}", self.id)),
                        })
                        .collect();
                    Ok(SearchOutcome {
                        payload: NewsPayload { news },
                        usage,
                    })
                }
                Script::Fail => Err(ProviderError::Server {
                    status: 500,
                    message: "scripted failure".to_string(),
                }),
            }
        }
    }
}
