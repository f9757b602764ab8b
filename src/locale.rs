//! Per-language text values.
//!
//! News content carries title/body in up to four languages. A
//! [`LocalizedText`] is a small language→text map with deterministic
//! fallback resolution for display.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Languages the content pipeline knows about.
pub const SUPPORTED_LANGUAGES: [&str; 4] = ["ru", "en", "de", "pt"];

/// A piece of text keyed by language code.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LocalizedText(BTreeMap<String, String>);

impl LocalizedText {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Single-language text.
    pub fn plain(lang: &str, text: impl Into<String>) -> Self {
        let mut map = BTreeMap::new();
        map.insert(lang.to_string(), text.into());
        Self(map)
    }

    pub fn set(&mut self, lang: &str, text: impl Into<String>) {
        self.0.insert(lang.to_string(), text.into());
    }

    pub fn get(&self, lang: &str) -> Option<&str> {
        self.0.get(lang).map(|s| s.as_str())
    }

    /// Resolve text for display: the requested language, then English,
    /// then Russian, then whatever is present.
    pub fn resolve(&self, lang: &str) -> Option<&str> {
        self.get(lang)
            .or_else(|| self.get("en"))
            .or_else(|| self.get("ru"))
            .or_else(|| self.0.values().next().map(|s| s.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.values().all(|v| v.trim().is_empty())
    }

    pub fn languages(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(|k| k.as_str())
    }
}

impl From<BTreeMap<String, String>> for LocalizedText {
    fn from(map: BTreeMap<String, String>) -> Self {
        Self(map)
    }
}
