//! Server configuration loaded from the environment.
//!
//! Environment variables are the single source of configuration for the
//! process itself (bind address, auth, credentials, database path). Search
//! tuning lives in the database as [`crate::store::SearchConfiguration`]
//! so it can be edited at runtime.

use std::path::PathBuf;

use crate::llm::ProviderId;

/// Top-level server configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Bind host (default `0.0.0.0`).
    pub host: String,
    /// Bind port (default `8080`).
    pub port: u16,
    /// When true, authentication is bypassed entirely.
    pub dev_mode: bool,
    /// SQLite database file (default `newswire.db`).
    pub database_path: PathBuf,
    pub auth: AuthConfig,
    pub credentials: Credentials,
}

/// Single-tenant JWT auth settings.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Secret used to sign tokens. Required outside dev mode.
    pub jwt_secret: Option<String>,
    /// Password accepted by the login endpoint.
    pub dashboard_password: Option<String>,
    /// Token lifetime in days.
    pub jwt_ttl_days: i64,
}

impl AuthConfig {
    pub fn auth_required(&self, dev_mode: bool) -> bool {
        !dev_mode
    }
}

/// API keys for the known LLM providers.
///
/// A provider is usable iff its key is present and non-empty; availability
/// is derived from this struct alone (see `discovery::registry`).
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub grok: Option<String>,
    pub anthropic: Option<String>,
    pub gemini: Option<String>,
    pub openai: Option<String>,
}

impl Credentials {
    pub fn from_env() -> Self {
        Self {
            grok: non_empty_env("XAI_API_KEY"),
            anthropic: non_empty_env("ANTHROPIC_API_KEY"),
            gemini: non_empty_env("GEMINI_API_KEY"),
            openai: non_empty_env("OPENAI_API_KEY"),
        }
    }

    /// Key for a concrete provider. `Auto` has no key of its own.
    pub fn key(&self, provider: ProviderId) -> Option<&str> {
        let key = match provider {
            ProviderId::Grok => &self.grok,
            ProviderId::Anthropic => &self.anthropic,
            ProviderId::Gemini => &self.gemini,
            ProviderId::OpenAi => &self.openai,
            ProviderId::Auto => &None,
        };
        key.as_deref()
    }
}

impl Config {
    /// Build configuration from environment variables.
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = std::env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(8080);
        let dev_mode = std::env::var("DEV_MODE")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        let database_path = std::env::var("DATABASE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("newswire.db"));

        let auth = AuthConfig {
            jwt_secret: non_empty_env("JWT_SECRET"),
            dashboard_password: non_empty_env("DASHBOARD_PASSWORD"),
            jwt_ttl_days: std::env::var("JWT_TTL_DAYS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(30),
        };

        Self {
            host,
            port,
            dev_mode,
            database_path,
            auth,
            credentials: Credentials::from_env(),
        }
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}
