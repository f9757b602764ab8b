//! Search configurations.
//!
//! Tunable discovery parameters live in the database so administrators can
//! adjust providers, prices, and limits without a redeploy. Exactly one
//! configuration is active at a time; every run embeds a value copy of the
//! configuration it ran with, so history stays reproducible.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::llm::{ProviderId, SearchContextSize, SearchParams};

use super::db::{parse_ts, to_ts, Database};

/// Price per one million tokens, USD.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Price {
    pub input: f64,
    pub output: f64,
}

impl Price {
    pub const ZERO: Price = Price {
        input: 0.0,
        output: 0.0,
    };
}

/// Token prices for every concrete provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricingTable {
    pub grok: Price,
    pub anthropic: Price,
    pub gemini: Price,
    pub openai: Price,
}

impl PricingTable {
    pub fn price(&self, provider: ProviderId) -> Price {
        match provider {
            ProviderId::Grok => self.grok,
            ProviderId::Anthropic => self.anthropic,
            ProviderId::Gemini => self.gemini,
            ProviderId::OpenAi => self.openai,
            ProviderId::Auto => Price::ZERO,
        }
    }
}

impl Default for PricingTable {
    fn default() -> Self {
        Self {
            grok: Price {
                input: 3.0,
                output: 15.0,
            },
            anthropic: Price {
                input: 0.80,
                output: 4.0,
            },
            gemini: Price {
                input: 0.075,
                output: 0.30,
            },
            openai: Price {
                input: 2.50,
                output: 10.0,
            },
        }
    }
}

/// Model names for every concrete provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelTable {
    pub grok: String,
    pub anthropic: String,
    pub gemini: String,
    pub openai: String,
}

impl ModelTable {
    pub fn model(&self, provider: ProviderId) -> &str {
        match provider {
            ProviderId::Grok => &self.grok,
            ProviderId::Anthropic => &self.anthropic,
            ProviderId::Gemini => &self.gemini,
            ProviderId::OpenAi => &self.openai,
            ProviderId::Auto => "",
        }
    }
}

impl Default for ModelTable {
    fn default() -> Self {
        Self {
            grok: "grok-4-1-fast".to_string(),
            anthropic: "claude-3-5-haiku-20241022".to_string(),
            gemini: "gemini-2.0-flash-exp".to_string(),
            openai: "gpt-4o".to_string(),
        }
    }
}

/// A stored search configuration.
#[derive(Debug, Clone, Serialize)]
pub struct SearchConfiguration {
    pub id: i64,
    pub name: String,
    pub is_active: bool,
    pub primary_provider: ProviderId,
    pub fallback_chain: Vec<ProviderId>,
    pub temperature: f64,
    pub timeout_secs: u64,
    pub max_search_results: u32,
    pub search_context_size: SearchContextSize,
    pub models: ModelTable,
    pub pricing: PricingTable,
    pub max_news_per_target: u32,
    pub delay_between_requests_ms: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SearchConfiguration {
    /// Value copy embedded into a run at invocation time.
    pub fn snapshot(&self) -> ConfigSnapshot {
        ConfigSnapshot {
            name: self.name.clone(),
            primary_provider: self.primary_provider,
            fallback_chain: self.fallback_chain.clone(),
            temperature: self.temperature,
            timeout_secs: self.timeout_secs,
            max_search_results: self.max_search_results,
            search_context_size: self.search_context_size,
            models: self.models.clone(),
            pricing: self.pricing.clone(),
            max_news_per_target: self.max_news_per_target,
            delay_between_requests_ms: self.delay_between_requests_ms,
        }
    }
}

/// Immutable copy of a configuration as it was when a run started.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigSnapshot {
    pub name: String,
    pub primary_provider: ProviderId,
    pub fallback_chain: Vec<ProviderId>,
    pub temperature: f64,
    pub timeout_secs: u64,
    pub max_search_results: u32,
    pub search_context_size: SearchContextSize,
    pub models: ModelTable,
    pub pricing: PricingTable,
    pub max_news_per_target: u32,
    pub delay_between_requests_ms: u64,
}

impl ConfigSnapshot {
    /// Per-request parameters derived from this snapshot.
    pub fn search_params(&self, allowed_domain: Option<String>) -> SearchParams {
        SearchParams {
            temperature: self.temperature,
            timeout: Duration::from_secs(self.timeout_secs),
            max_search_results: self.max_search_results,
            search_context_size: self.search_context_size,
            allowed_domain,
        }
    }
}

/// Fields an administrator can set when creating or editing a configuration.
/// Omitted fields fall back to the defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigInput {
    pub name: String,
    pub primary_provider: ProviderId,
    #[serde(default)]
    pub fallback_chain: Vec<ProviderId>,
    pub temperature: f64,
    pub timeout_secs: u64,
    pub max_search_results: u32,
    pub search_context_size: SearchContextSize,
    pub models: ModelTable,
    pub pricing: PricingTable,
    pub max_news_per_target: u32,
    pub delay_between_requests_ms: u64,
}

impl Default for ConfigInput {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            primary_provider: ProviderId::Grok,
            fallback_chain: vec![ProviderId::Anthropic, ProviderId::OpenAi],
            temperature: 0.3,
            timeout_secs: 120,
            max_search_results: 5,
            search_context_size: SearchContextSize::Low,
            models: ModelTable::default(),
            pricing: PricingTable::default(),
            max_news_per_target: 10,
            delay_between_requests_ms: 500,
        }
    }
}

fn row_to_config(row: &Row<'_>) -> Result<SearchConfiguration> {
    let fallback_json: String = row.get("fallback_chain")?;
    let models_json: String = row.get("models")?;
    let pricing_json: String = row.get("pricing")?;
    let context: String = row.get("search_context_size")?;
    let primary: String = row.get("primary_provider")?;
    let created: String = row.get("created_at")?;
    let updated: String = row.get("updated_at")?;

    Ok(SearchConfiguration {
        id: row.get("id")?,
        name: row.get("name")?,
        is_active: row.get::<_, i64>("is_active")? != 0,
        primary_provider: ProviderId::parse_lenient(&primary),
        fallback_chain: serde_json::from_str(&fallback_json)
            .context("bad fallback_chain in database")?,
        temperature: row.get("temperature")?,
        timeout_secs: row.get::<_, i64>("timeout_secs")? as u64,
        max_search_results: row.get::<_, i64>("max_search_results")? as u32,
        search_context_size: serde_json::from_value(serde_json::Value::String(context))
            .unwrap_or_default(),
        models: serde_json::from_str(&models_json).context("bad models in database")?,
        pricing: serde_json::from_str(&pricing_json).context("bad pricing in database")?,
        max_news_per_target: row.get::<_, i64>("max_news_per_target")? as u32,
        delay_between_requests_ms: row.get::<_, i64>("delay_between_requests_ms")? as u64,
        created_at: parse_ts(&created)?,
        updated_at: parse_ts(&updated)?,
    })
}

const CONFIG_COLUMNS: &str = "id, name, is_active, primary_provider, fallback_chain, temperature, \
     timeout_secs, max_search_results, search_context_size, models, pricing, \
     max_news_per_target, delay_between_requests_ms, created_at, updated_at";

impl Database {
    pub fn list_configs(&self) -> Result<Vec<SearchConfiguration>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {CONFIG_COLUMNS} FROM search_configurations \
             ORDER BY is_active DESC, updated_at DESC"
        ))?;
        let rows = stmt.query_and_then([], |row| row_to_config(row))?;
        rows.collect()
    }

    pub fn get_config(&self, id: i64) -> Result<Option<SearchConfiguration>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {CONFIG_COLUMNS} FROM search_configurations WHERE id = ?1"
        ))?;
        let mut rows = stmt.query_and_then(params![id], |row| row_to_config(row))?;
        rows.next().transpose()
    }

    pub fn insert_config(&self, input: &ConfigInput) -> Result<i64> {
        let conn = self.lock()?;
        let now = to_ts(Utc::now());
        conn.execute(
            "INSERT INTO search_configurations \
             (name, is_active, primary_provider, fallback_chain, temperature, timeout_secs, \
              max_search_results, search_context_size, models, pricing, max_news_per_target, \
              delay_between_requests_ms, created_at, updated_at) \
             VALUES (?1, 0, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?12)",
            params![
                input.name,
                input.primary_provider.as_str(),
                serde_json::to_string(&input.fallback_chain)?,
                input.temperature,
                input.timeout_secs as i64,
                input.max_search_results as i64,
                input.search_context_size.as_str(),
                serde_json::to_string(&input.models)?,
                serde_json::to_string(&input.pricing)?,
                input.max_news_per_target as i64,
                input.delay_between_requests_ms as i64,
                now,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn update_config(&self, id: i64, input: &ConfigInput) -> Result<bool> {
        let conn = self.lock()?;
        let now = to_ts(Utc::now());
        let changed = conn.execute(
            "UPDATE search_configurations SET \
             name = ?2, primary_provider = ?3, fallback_chain = ?4, temperature = ?5, \
             timeout_secs = ?6, max_search_results = ?7, search_context_size = ?8, \
             models = ?9, pricing = ?10, max_news_per_target = ?11, \
             delay_between_requests_ms = ?12, updated_at = ?13 \
             WHERE id = ?1",
            params![
                id,
                input.name,
                input.primary_provider.as_str(),
                serde_json::to_string(&input.fallback_chain)?,
                input.temperature,
                input.timeout_secs as i64,
                input.max_search_results as i64,
                input.search_context_size.as_str(),
                serde_json::to_string(&input.models)?,
                serde_json::to_string(&input.pricing)?,
                input.max_news_per_target as i64,
                input.delay_between_requests_ms as i64,
                now,
            ],
        )?;
        Ok(changed > 0)
    }

    pub fn delete_config(&self, id: i64) -> Result<bool> {
        let conn = self.lock()?;
        Ok(conn.execute("DELETE FROM search_configurations WHERE id = ?1", params![id])? > 0)
    }

    /// Make `id` the single active configuration. The whole flip happens in
    /// one transaction so two concurrent activations cannot leave two active
    /// rows.
    pub fn activate_config(&self, id: i64) -> Result<bool> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let exists: Option<i64> = tx
            .query_row(
                "SELECT id FROM search_configurations WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        if exists.is_none() {
            return Ok(false);
        }
        tx.execute(
            "UPDATE search_configurations SET is_active = (id = ?1)",
            params![id],
        )?;
        tx.commit()?;
        Ok(true)
    }

    /// The active configuration. When none is marked active, the most
    /// recently updated row is elected; an empty table gets the default
    /// configuration created and activated.
    pub fn active_config(&self) -> Result<SearchConfiguration> {
        {
            let conn = self.lock()?;
            let mut stmt = conn.prepare(&format!(
                "SELECT {CONFIG_COLUMNS} FROM search_configurations \
                 WHERE is_active = 1 LIMIT 1"
            ))?;
            let mut rows = stmt.query_and_then([], |row| row_to_config(row))?;
            if let Some(config) = rows.next().transpose()? {
                return Ok(config);
            }
        }

        let fallback = {
            let conn = self.lock()?;
            let mut stmt = conn.prepare(&format!(
                "SELECT {CONFIG_COLUMNS} FROM search_configurations \
                 ORDER BY updated_at DESC LIMIT 1"
            ))?;
            let mut rows = stmt.query_and_then([], |row| row_to_config(row))?;
            rows.next().transpose()?
        };

        let id = match fallback {
            Some(config) => config.id,
            None => self.insert_config(&ConfigInput::default())?,
        };
        self.activate_config(id)?;
        self.get_config(id)?
            .context("configuration vanished during activation")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn activation_deactivates_everything_else() {
        let db = Database::open_in_memory().unwrap();
        let a = db.insert_config(&ConfigInput::default()).unwrap();
        let b = db
            .insert_config(&ConfigInput {
                name: "aggressive".to_string(),
                ..ConfigInput::default()
            })
            .unwrap();

        assert!(db.activate_config(a).unwrap());
        assert!(db.activate_config(b).unwrap());

        let configs = db.list_configs().unwrap();
        let active: Vec<_> = configs.iter().filter(|c| c.is_active).collect();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, b);
    }

    #[test]
    fn activate_unknown_id_is_a_noop() {
        let db = Database::open_in_memory().unwrap();
        let a = db.insert_config(&ConfigInput::default()).unwrap();
        db.activate_config(a).unwrap();
        assert!(!db.activate_config(9999).unwrap());
        assert!(db.get_config(a).unwrap().unwrap().is_active);
    }

    #[test]
    fn active_config_elects_or_creates() {
        let db = Database::open_in_memory().unwrap();
        // Empty table: a default configuration is created and activated.
        let config = db.active_config().unwrap();
        assert_eq!(config.name, "default");
        assert!(config.is_active);
        assert_eq!(config.primary_provider, ProviderId::Grok);

        // Still exactly one active row on repeat calls.
        let again = db.active_config().unwrap();
        assert_eq!(again.id, config.id);
        assert_eq!(db.list_configs().unwrap().len(), 1);
    }

    #[test]
    fn config_round_trip() {
        let db = Database::open_in_memory().unwrap();
        let input = ConfigInput {
            name: "tuned".to_string(),
            primary_provider: ProviderId::Anthropic,
            fallback_chain: vec![ProviderId::Gemini],
            temperature: 0.7,
            timeout_secs: 60,
            max_search_results: 3,
            search_context_size: SearchContextSize::High,
            max_news_per_target: 4,
            delay_between_requests_ms: 250,
            ..ConfigInput::default()
        };
        let id = db.insert_config(&input).unwrap();
        let stored = db.get_config(id).unwrap().unwrap();
        assert_eq!(stored.primary_provider, ProviderId::Anthropic);
        assert_eq!(stored.fallback_chain, vec![ProviderId::Gemini]);
        assert_eq!(stored.search_context_size, SearchContextSize::High);
        assert_eq!(stored.timeout_secs, 60);

        let snapshot = stored.snapshot();
        let params = snapshot.search_params(Some("example.com".to_string()));
        assert_eq!(params.timeout, Duration::from_secs(60));
        assert_eq!(params.allowed_domain.as_deref(), Some("example.com"));
    }
}
