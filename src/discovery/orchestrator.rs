//! Discovery orchestration.
//!
//! `DiscoveryEngine::start` resolves targets, claims the progress hub,
//! opens a ledger run and hands the work to a background task. Targets are
//! processed one at a time with an optional courtesy delay; every provider
//! attempt lands in the ledger as it completes, so a crash loses nothing
//! that already happened.

use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::config::Credentials;
use crate::llm::{NewsItem, ProviderSelector};
use crate::store::{
    CallInput, ConfigSnapshot, Database, Manufacturer, NewPost, PostStatus, Source, TargetRef,
};

use super::chain;
use super::progress::{DiscoveryHub, ProgressSnapshot};
use super::prompt;
use super::registry::ProviderRegistry;

/// Which targets a discovery invocation covers.
#[derive(Debug, Clone)]
pub enum TargetScope {
    AllSources,
    Sources(Vec<i64>),
    AllManufacturers,
    Manufacturers(Vec<i64>),
    Everything,
}

/// A single unit of work for the chain executor.
#[derive(Debug, Clone)]
pub enum Target {
    Source(Source),
    Manufacturer(Manufacturer),
}

impl Target {
    pub fn name(&self) -> &str {
        match self {
            Target::Source(s) => &s.name,
            Target::Manufacturer(m) => &m.name,
        }
    }

    pub fn url(&self) -> Option<&str> {
        match self {
            Target::Source(s) => Some(s.url.as_str()),
            Target::Manufacturer(m) => m.websites.first().map(|w| w.as_str()),
        }
    }

    /// Manufacturer searches run industry-wide in English.
    pub fn language(&self) -> &str {
        match self {
            Target::Source(s) => &s.language,
            Target::Manufacturer(_) => "en",
        }
    }

    pub fn target_ref(&self) -> TargetRef {
        match self {
            Target::Source(s) => TargetRef::source(s.id),
            Target::Manufacturer(m) => TargetRef::manufacturer(m.id),
        }
    }
}

#[derive(Debug, Error)]
pub enum StartError {
    #[error("a discovery is already running")]
    AlreadyRunning,
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

/// Owns everything a discovery run needs.
#[derive(Clone)]
pub struct DiscoveryEngine {
    db: Database,
    hub: Arc<DiscoveryHub>,
    credentials: Credentials,
    http: reqwest::Client,
}

impl DiscoveryEngine {
    pub fn new(db: Database, credentials: Credentials) -> Self {
        Self {
            db,
            hub: Arc::new(DiscoveryHub::new()),
            credentials,
            http: reqwest::Client::new(),
        }
    }

    pub fn hub(&self) -> Arc<DiscoveryHub> {
        Arc::clone(&self.hub)
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// Start a discovery in the background and return the initial status
    /// descriptor. Only one discovery runs at a time.
    pub async fn start(
        &self,
        scope: TargetScope,
        selector: ProviderSelector,
    ) -> Result<ProgressSnapshot, StartError> {
        let config = self.db.active_config()?;
        let snapshot = config.snapshot();
        let targets = resolve_targets(&self.db, &scope)?;

        let run_uuid = Uuid::new_v4();
        if !self.hub.begin(targets.len(), run_uuid).await {
            return Err(StartError::AlreadyRunning);
        }

        let today = Utc::now().date_naive();
        let (run_id, since) = match prepare_run(&self.db, run_uuid, &snapshot, today) {
            Ok(v) => v,
            Err(e) => {
                self.hub.abort().await;
                return Err(StartError::Store(e));
            }
        };

        tracing::info!(
            run = %run_uuid,
            targets = targets.len(),
            provider = %selector.as_provider_id(),
            config = %snapshot.name,
            "starting discovery run"
        );

        let registry =
            ProviderRegistry::from_snapshot(&snapshot, &self.credentials, self.http.clone());
        let db = self.db.clone();
        let hub = Arc::clone(&self.hub);
        tokio::spawn(async move {
            run_pass(db, hub, registry, selector, targets, snapshot, run_id, since, today).await;
        });

        Ok(self.hub.snapshot().await)
    }
}

fn prepare_run(
    db: &Database,
    run_uuid: Uuid,
    snapshot: &ConfigSnapshot,
    today: NaiveDate,
) -> anyhow::Result<(i64, NaiveDate)> {
    let since = db.last_search_date(today)?;
    let run_id = db.create_run(run_uuid, snapshot, today)?;
    Ok((run_id, since))
}

fn resolve_targets(db: &Database, scope: &TargetScope) -> anyhow::Result<Vec<Target>> {
    let mut targets = Vec::new();
    match scope {
        TargetScope::AllSources => {
            targets.extend(db.list_automatic_sources()?.into_iter().map(Target::Source));
        }
        TargetScope::Sources(ids) => {
            for id in ids {
                if let Some(source) = db.get_source(*id)? {
                    if source.kind == crate::store::SourceKind::Manual {
                        tracing::debug!(source = %source.name, "skipping manual source");
                        continue;
                    }
                    targets.push(Target::Source(source));
                }
            }
        }
        TargetScope::AllManufacturers => {
            targets.extend(
                db.list_manufacturers()?
                    .into_iter()
                    .map(Target::Manufacturer),
            );
        }
        TargetScope::Manufacturers(ids) => {
            for id in ids {
                if let Some(m) = db.get_manufacturer(*id)? {
                    targets.push(Target::Manufacturer(m));
                }
            }
        }
        TargetScope::Everything => {
            targets.extend(db.list_automatic_sources()?.into_iter().map(Target::Source));
            targets.extend(
                db.list_manufacturers()?
                    .into_iter()
                    .map(Target::Manufacturer),
            );
        }
    }
    Ok(targets)
}

/// The background pass over all targets. Failures never abort the run:
/// they degrade to per-target placeholder records.
#[allow(clippy::too_many_arguments)]
pub(crate) async fn run_pass(
    db: Database,
    hub: Arc<DiscoveryHub>,
    registry: ProviderRegistry,
    selector: ProviderSelector,
    targets: Vec<Target>,
    snapshot: ConfigSnapshot,
    run_id: i64,
    since: NaiveDate,
    today: NaiveDate,
) {
    let delay = Duration::from_millis(snapshot.delay_between_requests_ms);

    for (i, target) in targets.iter().enumerate() {
        if i > 0 && !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if let Err(e) =
            process_target(&db, &registry, selector, &snapshot, target, run_id, since, today).await
        {
            tracing::error!(target = target.name(), error = %e, "failed to process target");
        }
        hub.tick(i + 1).await;
    }

    if let Err(e) = db.finish_run(run_id) {
        tracing::error!(run_id, error = %e, "failed to finalize run");
    }
    hub.finish().await;
    tracing::info!(run_id, "discovery run finished");
}

#[allow(clippy::too_many_arguments)]
async fn process_target(
    db: &Database,
    registry: &ProviderRegistry,
    selector: ProviderSelector,
    snapshot: &ConfigSnapshot,
    target: &Target,
    run_id: i64,
    since: NaiveDate,
    today: NaiveDate,
) -> anyhow::Result<()> {
    let prompt_text = match target {
        Target::Source(s) => prompt::source_prompt(s, since, today),
        Target::Manufacturer(m) => prompt::manufacturer_prompt(m, since, today),
    };
    let domain = match target {
        Target::Source(s) => prompt::extract_domain(&s.url),
        Target::Manufacturer(_) => None,
    };
    let params = snapshot.search_params(domain);

    let outcome = chain::execute(registry, selector, &prompt_text, &params, &snapshot.pricing).await;

    let target_ref = target.target_ref();
    for attempt in &outcome.attempts {
        db.record_call(
            run_id,
            &target_ref,
            &CallInput {
                provider: attempt.provider,
                model: attempt.model.clone(),
                input_tokens: attempt.usage.input_tokens,
                output_tokens: attempt.usage.output_tokens,
                cost_usd: attempt.cost_usd,
                duration_ms: attempt.duration_ms,
                success: attempt.success,
                error_message: attempt.error.clone().unwrap_or_default(),
                news_extracted: attempt.news_extracted,
            },
        )?;
    }

    match outcome.succeeded {
        Some(provider) if !outcome.items.is_empty() => {
            let (created, duplicates) =
                store_items(db, target, &outcome.items, snapshot.max_news_per_target)?;
            tracing::info!(
                target = target.name(),
                %provider,
                created,
                duplicates,
                "stored discovered news"
            );
            db.add_run_results(run_id, created, duplicates, false)?;
        }
        Some(_) => {
            create_placeholder(db, target, since, today)?;
            db.add_run_results(run_id, 0, 0, false)?;
        }
        None => {
            tracing::warn!(
                target = target.name(),
                errors = %outcome.error_summary(),
                "all providers failed, writing placeholder"
            );
            create_placeholder(db, target, since, today)?;
            db.add_run_results(run_id, 0, 0, true)?;
        }
    }
    Ok(())
}

fn store_items(
    db: &Database,
    target: &Target,
    items: &[NewsItem],
    cap: u32,
) -> anyhow::Result<(u64, u64)> {
    let lang = target.language();
    let target_ref = target.target_ref();
    let mut created = 0u64;
    let mut duplicates = 0u64;

    for item in items.iter().take(cap as usize) {
        let source_url = item
            .source_url
            .clone()
            .or_else(|| target.url().map(String::from));

        if let Some(url) = source_url.as_deref() {
            if db.is_duplicate_post(url, &item.title, lang)? {
                duplicates += 1;
                continue;
            }
        }

        let id = db.insert_post(&NewPost {
            title: item.title.clone(),
            body: item.summary.clone(),
            source_url,
            manufacturer_id: target_ref.manufacturer_id,
            status: PostStatus::Draft,
            pub_date: Utc::now(),
            source_language: lang.to_string(),
            is_no_news_found: false,
        })?;
        tracing::debug!(post_id = id, target = target.name(), "created news post");
        created += 1;
    }

    Ok((created, duplicates))
}

/// Exactly one flagged placeholder per target that yielded nothing, whether
/// the chain succeeded with an empty list or was exhausted.
fn create_placeholder(
    db: &Database,
    target: &Target,
    since: NaiveDate,
    today: NaiveDate,
) -> anyhow::Result<()> {
    let (title, body) = prompt::no_news_texts(target.name(), target.url(), since, today);
    let target_ref = target.target_ref();
    db.insert_post(&NewPost {
        title,
        body,
        source_url: target.url().map(String::from),
        manufacturer_id: target_ref.manufacturer_id,
        status: PostStatus::Draft,
        pub_date: Utc::now(),
        source_language: "en".to_string(),
        is_no_news_found: true,
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::testutil::{Script, ScriptedProvider};
    use crate::llm::{ProviderClient, ProviderId, TokenUsage};
    use crate::locale::LocalizedText;
    use crate::store::{ConfigInput, NewSource, PostFilter, SourceKind};

    fn test_db() -> Database {
        Database::open_in_memory().unwrap()
    }

    fn fast_snapshot(db: &Database) -> ConfigSnapshot {
        let id = db
            .insert_config(&ConfigInput {
                delay_between_requests_ms: 0,
                ..ConfigInput::default()
            })
            .unwrap();
        db.get_config(id).unwrap().unwrap().snapshot()
    }

    fn add_source(db: &Database, name: &str) -> i64 {
        db.insert_source(&NewSource {
            name: name.to_string(),
            url: format!("https://{}.example", name.to_lowercase()),
            language: "en".to_string(),
            kind: SourceKind::Automatic,
            custom_instructions: None,
        })
        .unwrap()
    }

    fn targets(db: &Database) -> Vec<Target> {
        resolve_targets(db, &TargetScope::AllSources).unwrap()
    }

    async fn run(
        db: &Database,
        clients: Vec<Arc<dyn ProviderClient>>,
        order: Vec<ProviderId>,
        selector: ProviderSelector,
    ) -> (i64, Uuid) {
        let snapshot = fast_snapshot(db);
        let hub = Arc::new(DiscoveryHub::new());
        let uuid = Uuid::new_v4();
        let today = Utc::now().date_naive();
        let run_id = db.create_run(uuid, &snapshot, today).unwrap();
        let registry = ProviderRegistry::with_clients(clients, order);
        let list = targets(db);
        hub.begin(list.len(), uuid).await;
        run_pass(
            db.clone(),
            Arc::clone(&hub),
            registry,
            selector,
            list,
            snapshot,
            run_id,
            today,
            today,
        )
        .await;
        (run_id, uuid)
    }

    #[tokio::test]
    async fn fallback_example_produces_four_calls() {
        // Three sources; grok fails for the first and succeeds for the other
        // two; anthropic picks up the first.
        let db = test_db();
        let a = add_source(&db, "Alpha");
        add_source(&db, "Beta");
        add_source(&db, "Gamma");

        let grok = ScriptedProvider::new(
            ProviderId::Grok,
            vec![
                Script::Fail,
                Script::Succeed {
                    items: 1,
                    usage: TokenUsage::new(100, 50),
                },
                Script::Succeed {
                    items: 1,
                    usage: TokenUsage::new(100, 50),
                },
            ],
        );
        let anthropic = ScriptedProvider::new(
            ProviderId::Anthropic,
            vec![Script::Succeed {
                items: 1,
                usage: TokenUsage::new(200, 80),
            }],
        );

        let (run_id, uuid) = run(
            &db,
            vec![grok, anthropic.clone()],
            vec![ProviderId::Grok, ProviderId::Anthropic, ProviderId::OpenAi],
            ProviderSelector::Auto,
        )
        .await;

        let calls = db.list_calls(run_id).unwrap();
        assert_eq!(calls.len(), 4);
        let alpha_calls: Vec<_> = calls.iter().filter(|c| c.source_id == Some(a)).collect();
        assert_eq!(alpha_calls.len(), 2);
        assert_eq!(alpha_calls[0].provider, ProviderId::Grok);
        assert!(!alpha_calls[0].success);
        assert_eq!(alpha_calls[1].provider, ProviderId::Anthropic);
        assert!(alpha_calls[1].success);
        assert_eq!(anthropic.call_count(), 1);

        let run = db.get_run(uuid).unwrap().unwrap();
        assert_eq!(run.news_found, 3);
        assert_eq!(run.targets_processed, 3);
        assert_eq!(run.targets_failed, 0);
        assert_eq!(run.total_requests, 4);
        assert_eq!(run.state(), "finished");
        assert_eq!(run.provider_stats["grok"].errors, 1);
    }

    #[tokio::test]
    async fn explicit_failure_is_terminal_with_one_call_and_one_placeholder() {
        let db = test_db();
        add_source(&db, "Alpha");

        let openai = ScriptedProvider::new(ProviderId::OpenAi, vec![Script::Fail]);
        let grok = ScriptedProvider::new(
            ProviderId::Grok,
            vec![Script::Succeed {
                items: 5,
                usage: TokenUsage::new(1, 1),
            }],
        );

        let (run_id, uuid) = run(
            &db,
            vec![openai, grok.clone()],
            vec![ProviderId::Grok, ProviderId::OpenAi],
            ProviderSelector::Explicit(ProviderId::OpenAi),
        )
        .await;

        let calls = db.list_calls(run_id).unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].provider, ProviderId::OpenAi);
        assert!(!calls[0].success);
        assert_eq!(grok.call_count(), 0);

        let posts = db.list_posts(&PostFilter::default()).unwrap();
        assert_eq!(posts.len(), 1);
        assert!(posts[0].is_no_news_found);

        let run = db.get_run(uuid).unwrap().unwrap();
        assert_eq!(run.targets_failed, 1);
        assert_eq!(run.news_found, 0);
    }

    #[tokio::test]
    async fn exhausted_chain_yields_exactly_one_placeholder() {
        let db = test_db();
        add_source(&db, "Alpha");

        let grok = ScriptedProvider::new(ProviderId::Grok, vec![Script::Fail]);
        let anthropic = ScriptedProvider::new(ProviderId::Anthropic, vec![Script::Fail]);

        let (run_id, uuid) = run(
            &db,
            vec![grok, anthropic],
            vec![ProviderId::Grok, ProviderId::Anthropic],
            ProviderSelector::Auto,
        )
        .await;

        assert_eq!(db.list_calls(run_id).unwrap().len(), 2);

        let posts = db.list_posts(&PostFilter::default()).unwrap();
        assert_eq!(posts.len(), 1);
        assert!(posts[0].is_no_news_found);

        let run = db.get_run(uuid).unwrap().unwrap();
        assert_eq!(run.targets_failed, 1);
    }

    #[tokio::test]
    async fn empty_result_creates_flagged_placeholder_without_failure() {
        let db = test_db();
        add_source(&db, "Alpha");

        let grok = ScriptedProvider::new(
            ProviderId::Grok,
            vec![Script::Succeed {
                items: 0,
                usage: TokenUsage::new(500, 20),
            }],
        );

        let (_, uuid) = run(
            &db,
            vec![grok],
            vec![ProviderId::Grok],
            ProviderSelector::Auto,
        )
        .await;

        let posts = db.list_posts(&PostFilter::default()).unwrap();
        assert_eq!(posts.len(), 1);
        assert!(posts[0].is_no_news_found);

        let run = db.get_run(uuid).unwrap().unwrap();
        assert_eq!(run.targets_failed, 0);
        assert_eq!(run.targets_processed, 1);
    }

    #[tokio::test]
    async fn duplicates_are_counted_and_skipped() {
        let db = test_db();
        add_source(&db, "Alpha");

        // The scripted provider's first call produces exactly this item.
        db.insert_post(&NewPost {
            title: LocalizedText::plain("en", "Item 0 from grok"),
            body: LocalizedText::plain("en", "Summary"),
            source_url: Some("https://grok.example/0/0".to_string()),
            manufacturer_id: None,
            status: PostStatus::Draft,
            pub_date: Utc::now(),
            source_language: "en".to_string(),
            is_no_news_found: false,
        })
        .unwrap();

        let grok = ScriptedProvider::new(
            ProviderId::Grok,
            vec![Script::Succeed {
                items: 1,
                usage: TokenUsage::new(100, 10),
            }],
        );

        let (_, uuid) = run(
            &db,
            vec![grok],
            vec![ProviderId::Grok],
            ProviderSelector::Auto,
        )
        .await;

        let run = db.get_run(uuid).unwrap().unwrap();
        assert_eq!(run.news_found, 0);
        assert_eq!(run.news_duplicates, 1);
        // Only the pre-seeded post exists; no placeholder either, since the
        // provider did return items.
        assert_eq!(db.list_posts(&PostFilter::default()).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn manufacturer_targets_link_posts_and_calls() {
        let db = test_db();
        let m_id = db
            .insert_manufacturer(&crate::store::NewManufacturer {
                name: "Acme".to_string(),
                websites: vec!["https://acme.example".to_string()],
            })
            .unwrap();

        let snapshot = fast_snapshot(&db);
        let hub = Arc::new(DiscoveryHub::new());
        let uuid = Uuid::new_v4();
        let today = Utc::now().date_naive();
        let run_id = db.create_run(uuid, &snapshot, today).unwrap();
        let grok = ScriptedProvider::new(
            ProviderId::Grok,
            vec![Script::Succeed {
                items: 1,
                usage: TokenUsage::new(10, 10),
            }],
        );
        let registry = ProviderRegistry::with_clients(vec![grok], vec![ProviderId::Grok]);
        let list = resolve_targets(&db, &TargetScope::AllManufacturers).unwrap();
        hub.begin(list.len(), uuid).await;
        run_pass(
            db.clone(),
            hub,
            registry,
            ProviderSelector::Auto,
            list,
            snapshot,
            run_id,
            today,
            today,
        )
        .await;

        let calls = db.list_calls(run_id).unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].manufacturer_id, Some(m_id));
        assert_eq!(calls[0].source_id, None);

        let posts = db.list_posts(&PostFilter::default()).unwrap();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].manufacturer_id, Some(m_id));
    }

    #[tokio::test]
    async fn engine_rejects_concurrent_starts() {
        let db = test_db();
        db.insert_config(&ConfigInput::default()).unwrap();
        let engine = DiscoveryEngine::new(db, Credentials::default());

        // Claim the hub as if a run were in flight.
        assert!(engine.hub().begin(1, Uuid::new_v4()).await);

        let err = engine
            .start(TargetScope::AllSources, ProviderSelector::Auto)
            .await
            .unwrap_err();
        assert!(matches!(err, StartError::AlreadyRunning));
    }

    #[tokio::test]
    async fn manual_sources_are_not_targeted() {
        let db = test_db();
        add_source(&db, "Auto");
        db.insert_source(&NewSource {
            name: "Manual".to_string(),
            url: "https://manual.example".to_string(),
            language: "en".to_string(),
            kind: SourceKind::Manual,
            custom_instructions: None,
        })
        .unwrap();

        let list = resolve_targets(&db, &TargetScope::AllSources).unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].name(), "Auto");
    }
}
