//! The discovery run/call ledger.
//!
//! One row per run, one immutable row per provider attempt. Run aggregates
//! are updated in the same transaction that inserts a call, so history
//! survives a process restart up to the last completed call.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Row};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::llm::ProviderId;

use super::config::ConfigSnapshot;
use super::db::{parse_ts, to_ts, Database};

/// Per-provider aggregates inside a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderStat {
    pub requests: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost: f64,
    pub errors: u64,
}

/// One discovery invocation.
#[derive(Debug, Clone, Serialize)]
pub struct DiscoveryRun {
    pub id: i64,
    pub uuid: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub config_snapshot: ConfigSnapshot,
    pub provider_stats: BTreeMap<String, ProviderStat>,
    pub total_requests: u64,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub estimated_cost_usd: f64,
    pub news_found: u64,
    pub news_duplicates: u64,
    pub targets_processed: u64,
    pub targets_failed: u64,
    pub last_search_date: NaiveDate,
    pub created_at: DateTime<Utc>,
}

impl DiscoveryRun {
    /// News found per dollar spent. Derived at read time, never stored;
    /// zero when the run cost nothing.
    pub fn efficiency(&self) -> f64 {
        if self.estimated_cost_usd > 0.0 {
            self.news_found as f64 / self.estimated_cost_usd
        } else {
            0.0
        }
    }

    pub fn duration_seconds(&self) -> Option<i64> {
        self.finished_at
            .map(|f| (f - self.started_at).num_seconds())
    }

    pub fn state(&self) -> &'static str {
        if self.finished_at.is_some() {
            "finished"
        } else {
            "running"
        }
    }
}

/// Target a call was made for: a source or a manufacturer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TargetRef {
    pub source_id: Option<i64>,
    pub manufacturer_id: Option<i64>,
}

impl TargetRef {
    pub fn source(id: i64) -> Self {
        Self {
            source_id: Some(id),
            manufacturer_id: None,
        }
    }

    pub fn manufacturer(id: i64) -> Self {
        Self {
            source_id: None,
            manufacturer_id: Some(id),
        }
    }
}

/// Ledger entry for one provider attempt.
#[derive(Debug, Clone)]
pub struct CallInput {
    pub provider: ProviderId,
    pub model: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost_usd: f64,
    pub duration_ms: u64,
    pub success: bool,
    pub error_message: String,
    pub news_extracted: u64,
}

/// A stored call row.
#[derive(Debug, Clone, Serialize)]
pub struct ApiCallRecord {
    pub id: i64,
    pub run_id: i64,
    pub source_id: Option<i64>,
    pub manufacturer_id: Option<i64>,
    pub provider: ProviderId,
    pub model: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost_usd: f64,
    pub duration_ms: u64,
    pub success: bool,
    pub error_message: String,
    pub news_extracted: u64,
    pub created_at: DateTime<Utc>,
}

fn row_to_run(row: &Row<'_>) -> Result<DiscoveryRun> {
    let uuid: String = row.get("uuid")?;
    let started: String = row.get("started_at")?;
    let finished: Option<String> = row.get("finished_at")?;
    let snapshot: String = row.get("config_snapshot")?;
    let stats: String = row.get("provider_stats")?;
    let last_search: String = row.get("last_search_date")?;
    let created: String = row.get("created_at")?;

    Ok(DiscoveryRun {
        id: row.get("id")?,
        uuid: Uuid::parse_str(&uuid).context("bad run uuid in database")?,
        started_at: parse_ts(&started)?,
        finished_at: finished.as_deref().map(parse_ts).transpose()?,
        config_snapshot: serde_json::from_str(&snapshot).context("bad config snapshot")?,
        provider_stats: serde_json::from_str(&stats).context("bad provider stats")?,
        total_requests: row.get::<_, i64>("total_requests")? as u64,
        total_input_tokens: row.get::<_, i64>("total_input_tokens")? as u64,
        total_output_tokens: row.get::<_, i64>("total_output_tokens")? as u64,
        estimated_cost_usd: row.get("estimated_cost_usd")?,
        news_found: row.get::<_, i64>("news_found")? as u64,
        news_duplicates: row.get::<_, i64>("news_duplicates")? as u64,
        targets_processed: row.get::<_, i64>("targets_processed")? as u64,
        targets_failed: row.get::<_, i64>("targets_failed")? as u64,
        last_search_date: NaiveDate::parse_from_str(&last_search, "%Y-%m-%d")
            .context("bad last_search_date")?,
        created_at: parse_ts(&created)?,
    })
}

fn row_to_call(row: &Row<'_>) -> Result<ApiCallRecord> {
    let provider: String = row.get("provider")?;
    let created: String = row.get("created_at")?;
    Ok(ApiCallRecord {
        id: row.get("id")?,
        run_id: row.get("run_id")?,
        source_id: row.get("source_id")?,
        manufacturer_id: row.get("manufacturer_id")?,
        provider: ProviderId::parse_lenient(&provider),
        model: row.get("model")?,
        input_tokens: row.get::<_, i64>("input_tokens")? as u64,
        output_tokens: row.get::<_, i64>("output_tokens")? as u64,
        cost_usd: row.get("cost_usd")?,
        duration_ms: row.get::<_, i64>("duration_ms")? as u64,
        success: row.get::<_, i64>("success")? != 0,
        error_message: row.get("error_message")?,
        news_extracted: row.get::<_, i64>("news_extracted")? as u64,
        created_at: parse_ts(&created)?,
    })
}

const RUN_COLUMNS: &str = "id, uuid, started_at, finished_at, config_snapshot, provider_stats, \
     total_requests, total_input_tokens, total_output_tokens, estimated_cost_usd, news_found, \
     news_duplicates, targets_processed, targets_failed, last_search_date, created_at";

const CALL_COLUMNS: &str = "id, run_id, source_id, manufacturer_id, provider, model, \
     input_tokens, output_tokens, cost_usd, duration_ms, success, error_message, \
     news_extracted, created_at";

impl Database {
    /// Start a run: snapshot the configuration and stamp the watermark date.
    pub fn create_run(
        &self,
        uuid: Uuid,
        snapshot: &ConfigSnapshot,
        search_date: NaiveDate,
    ) -> Result<i64> {
        let conn = self.lock()?;
        let now = to_ts(Utc::now());
        conn.execute(
            "INSERT INTO discovery_runs \
             (uuid, started_at, config_snapshot, provider_stats, last_search_date, created_at) \
             VALUES (?1, ?2, ?3, '{}', ?4, ?2)",
            params![
                uuid.to_string(),
                now,
                serde_json::to_string(snapshot)?,
                search_date.format("%Y-%m-%d").to_string(),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Record one provider attempt: inserts the call row and folds it into
    /// the run's aggregates in a single transaction.
    pub fn record_call(&self, run_id: i64, target: &TargetRef, call: &CallInput) -> Result<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        tx.execute(
            "INSERT INTO discovery_api_calls \
             (run_id, source_id, manufacturer_id, provider, model, input_tokens, output_tokens, \
              cost_usd, duration_ms, success, error_message, news_extracted, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                run_id,
                target.source_id,
                target.manufacturer_id,
                call.provider.as_str(),
                call.model,
                call.input_tokens as i64,
                call.output_tokens as i64,
                call.cost_usd,
                call.duration_ms as i64,
                call.success as i64,
                call.error_message,
                call.news_extracted as i64,
                to_ts(Utc::now()),
            ],
        )?;

        let stats_json: String = tx.query_row(
            "SELECT provider_stats FROM discovery_runs WHERE id = ?1",
            params![run_id],
            |row| row.get(0),
        )?;
        let mut stats: BTreeMap<String, ProviderStat> =
            serde_json::from_str(&stats_json).unwrap_or_default();
        let entry = stats.entry(call.provider.as_str().to_string()).or_default();
        entry.requests += 1;
        entry.input_tokens += call.input_tokens;
        entry.output_tokens += call.output_tokens;
        entry.cost += call.cost_usd;
        if !call.success {
            entry.errors += 1;
        }

        tx.execute(
            "UPDATE discovery_runs SET \
             provider_stats = ?2, \
             total_requests = total_requests + 1, \
             total_input_tokens = total_input_tokens + ?3, \
             total_output_tokens = total_output_tokens + ?4, \
             estimated_cost_usd = estimated_cost_usd + ?5 \
             WHERE id = ?1",
            params![
                run_id,
                serde_json::to_string(&stats)?,
                call.input_tokens as i64,
                call.output_tokens as i64,
                call.cost_usd,
            ],
        )?;

        tx.commit()?;
        Ok(())
    }

    /// Fold one processed target's results into the run.
    pub fn add_run_results(
        &self,
        run_id: i64,
        news_found: u64,
        duplicates: u64,
        failed: bool,
    ) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE discovery_runs SET \
             news_found = news_found + ?2, \
             news_duplicates = news_duplicates + ?3, \
             targets_processed = targets_processed + 1, \
             targets_failed = targets_failed + ?4 \
             WHERE id = ?1",
            params![run_id, news_found as i64, duplicates as i64, failed as i64],
        )?;
        Ok(())
    }

    pub fn finish_run(&self, run_id: i64) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE discovery_runs SET finished_at = ?2 WHERE id = ?1",
            params![run_id, to_ts(Utc::now())],
        )?;
        Ok(())
    }

    pub fn list_runs(&self, limit: usize) -> Result<Vec<DiscoveryRun>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {RUN_COLUMNS} FROM discovery_runs ORDER BY id DESC LIMIT ?1"
        ))?;
        let rows = stmt.query_and_then(params![limit as i64], |row| row_to_run(row))?;
        rows.collect()
    }

    pub fn get_run(&self, uuid: Uuid) -> Result<Option<DiscoveryRun>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {RUN_COLUMNS} FROM discovery_runs WHERE uuid = ?1"
        ))?;
        let mut rows = stmt.query_and_then(params![uuid.to_string()], |row| row_to_run(row))?;
        rows.next().transpose()
    }

    pub fn list_calls(&self, run_id: i64) -> Result<Vec<ApiCallRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {CALL_COLUMNS} FROM discovery_api_calls WHERE run_id = ?1 ORDER BY id"
        ))?;
        let rows = stmt.query_and_then(params![run_id], |row| row_to_call(row))?;
        rows.collect()
    }

    /// Date of the most recent run, used as the start of the next search
    /// period; `fallback` (today) when no run exists yet.
    pub fn last_search_date(&self, fallback: NaiveDate) -> Result<NaiveDate> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare("SELECT last_search_date FROM discovery_runs ORDER BY id DESC LIMIT 1")?;
        let date: Option<String> = stmt
            .query_map([], |row| row.get(0))?
            .next()
            .transpose()?;
        match date {
            Some(d) => Ok(NaiveDate::parse_from_str(&d, "%Y-%m-%d")
                .context("bad last_search_date")?),
            None => Ok(fallback),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ConfigInput;

    fn snapshot() -> ConfigSnapshot {
        let db = Database::open_in_memory().unwrap();
        let id = db.insert_config(&ConfigInput::default()).unwrap();
        db.get_config(id).unwrap().unwrap().snapshot()
    }

    fn call(provider: ProviderId, success: bool, tokens: (u64, u64), cost: f64) -> CallInput {
        CallInput {
            provider,
            model: "test-model".to_string(),
            input_tokens: tokens.0,
            output_tokens: tokens.1,
            cost_usd: cost,
            duration_ms: 1200,
            success,
            error_message: if success { String::new() } else { "boom".to_string() },
            news_extracted: 0,
        }
    }

    #[test]
    fn calls_aggregate_into_the_run() {
        let db = Database::open_in_memory().unwrap();
        let uuid = Uuid::new_v4();
        let run_id = db
            .create_run(uuid, &snapshot(), Utc::now().date_naive())
            .unwrap();

        let target = TargetRef::source(1);
        db.record_call(run_id, &target, &call(ProviderId::Grok, false, (0, 0), 0.0))
            .unwrap();
        db.record_call(
            run_id,
            &target,
            &call(ProviderId::Anthropic, true, (1000, 400), 0.0024),
        )
        .unwrap();

        let run = db.get_run(uuid).unwrap().unwrap();
        assert_eq!(run.total_requests, 2);
        assert_eq!(run.total_input_tokens, 1000);
        assert_eq!(run.total_output_tokens, 400);
        assert!((run.estimated_cost_usd - 0.0024).abs() < 1e-9);
        assert_eq!(run.provider_stats["grok"].errors, 1);
        assert_eq!(run.provider_stats["anthropic"].requests, 1);
        assert_eq!(run.state(), "running");

        db.finish_run(run_id).unwrap();
        let run = db.get_run(uuid).unwrap().unwrap();
        assert_eq!(run.state(), "finished");
        assert!(run.duration_seconds().is_some());
    }

    #[test]
    fn efficiency_is_derived_and_zero_without_cost() {
        let db = Database::open_in_memory().unwrap();
        let uuid = Uuid::new_v4();
        let run_id = db
            .create_run(uuid, &snapshot(), Utc::now().date_naive())
            .unwrap();
        db.add_run_results(run_id, 5, 1, false).unwrap();

        let run = db.get_run(uuid).unwrap().unwrap();
        assert_eq!(run.news_found, 5);
        assert_eq!(run.news_duplicates, 1);
        assert_eq!(run.efficiency(), 0.0);

        db.record_call(
            run_id,
            &TargetRef::source(1),
            &call(ProviderId::Grok, true, (100, 100), 0.5),
        )
        .unwrap();
        let run = db.get_run(uuid).unwrap().unwrap();
        assert!((run.efficiency() - 10.0).abs() < 1e-9);
    }

    #[test]
    fn snapshot_is_isolated_from_later_config_edits() {
        let db = Database::open_in_memory().unwrap();
        let config_id = db.insert_config(&ConfigInput::default()).unwrap();
        let config = db.get_config(config_id).unwrap().unwrap();
        let uuid = Uuid::new_v4();
        db.create_run(uuid, &config.snapshot(), Utc::now().date_naive())
            .unwrap();

        db.update_config(
            config_id,
            &ConfigInput {
                temperature: 0.99,
                name: "rewritten".to_string(),
                ..ConfigInput::default()
            },
        )
        .unwrap();

        let run = db.get_run(uuid).unwrap().unwrap();
        assert_eq!(run.config_snapshot.name, "default");
        assert!((run.config_snapshot.temperature - 0.3).abs() < 1e-9);
    }

    #[test]
    fn last_search_date_watermark() {
        let db = Database::open_in_memory().unwrap();
        let today = Utc::now().date_naive();
        assert_eq!(db.last_search_date(today).unwrap(), today);

        let earlier = today.pred_opt().unwrap();
        db.create_run(Uuid::new_v4(), &snapshot(), earlier).unwrap();
        assert_eq!(db.last_search_date(today).unwrap(), earlier);
    }
}
