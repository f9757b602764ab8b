//! Discovery targets: news sources and manufacturers.

use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{params, Row};
use serde::{Deserialize, Serialize};

use super::db::{parse_ts, to_ts, Database};

/// How a source is fed: automatic sources are crawled by discovery, manual
/// sources are maintained by editors and skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Automatic,
    Manual,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Automatic => "automatic",
            SourceKind::Manual => "manual",
        }
    }

    pub fn parse(value: &str) -> SourceKind {
        match value {
            "manual" => SourceKind::Manual,
            _ => SourceKind::Automatic,
        }
    }
}

/// A news source (site) discovery searches.
#[derive(Debug, Clone, Serialize)]
pub struct Source {
    pub id: i64,
    pub name: String,
    pub url: String,
    pub language: String,
    pub kind: SourceKind,
    pub custom_instructions: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewSource {
    pub name: String,
    pub url: String,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default = "default_kind")]
    pub kind: SourceKind,
    #[serde(default)]
    pub custom_instructions: Option<String>,
}

fn default_language() -> String {
    "en".to_string()
}

fn default_kind() -> SourceKind {
    SourceKind::Automatic
}

/// A manufacturer whose news is searched across the open web.
#[derive(Debug, Clone, Serialize)]
pub struct Manufacturer {
    pub id: i64,
    pub name: String,
    pub websites: Vec<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewManufacturer {
    pub name: String,
    #[serde(default)]
    pub websites: Vec<String>,
}

fn row_to_source(row: &Row<'_>) -> Result<Source> {
    let kind: String = row.get("kind")?;
    let created: String = row.get("created_at")?;
    Ok(Source {
        id: row.get("id")?,
        name: row.get("name")?,
        url: row.get("url")?,
        language: row.get("language")?,
        kind: SourceKind::parse(&kind),
        custom_instructions: row.get("custom_instructions")?,
        created_at: parse_ts(&created)?,
    })
}

fn row_to_manufacturer(row: &Row<'_>) -> Result<Manufacturer> {
    let websites: String = row.get("websites")?;
    let created: String = row.get("created_at")?;
    Ok(Manufacturer {
        id: row.get("id")?,
        name: row.get("name")?,
        websites: serde_json::from_str(&websites)?,
        created_at: parse_ts(&created)?,
    })
}

impl Database {
    pub fn list_sources(&self) -> Result<Vec<Source>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, name, url, language, kind, custom_instructions, created_at \
             FROM sources ORDER BY name",
        )?;
        let rows = stmt.query_and_then([], |row| row_to_source(row))?;
        rows.collect()
    }

    pub fn get_source(&self, id: i64) -> Result<Option<Source>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, name, url, language, kind, custom_instructions, created_at \
             FROM sources WHERE id = ?1",
        )?;
        let mut rows = stmt.query_and_then(params![id], |row| row_to_source(row))?;
        rows.next().transpose()
    }

    /// Sources eligible for automatic discovery, in id order.
    pub fn list_automatic_sources(&self) -> Result<Vec<Source>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, name, url, language, kind, custom_instructions, created_at \
             FROM sources WHERE kind != 'manual' ORDER BY id",
        )?;
        let rows = stmt.query_and_then([], |row| row_to_source(row))?;
        rows.collect()
    }

    pub fn insert_source(&self, source: &NewSource) -> Result<i64> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO sources (name, url, language, kind, custom_instructions, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                source.name,
                source.url,
                source.language,
                source.kind.as_str(),
                source.custom_instructions,
                to_ts(Utc::now()),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn update_source(&self, id: i64, source: &NewSource) -> Result<bool> {
        let conn = self.lock()?;
        let changed = conn.execute(
            "UPDATE sources SET name = ?2, url = ?3, language = ?4, kind = ?5, \
             custom_instructions = ?6 WHERE id = ?1",
            params![
                id,
                source.name,
                source.url,
                source.language,
                source.kind.as_str(),
                source.custom_instructions,
            ],
        )?;
        Ok(changed > 0)
    }

    pub fn delete_source(&self, id: i64) -> Result<bool> {
        let conn = self.lock()?;
        Ok(conn.execute("DELETE FROM sources WHERE id = ?1", params![id])? > 0)
    }

    pub fn list_manufacturers(&self) -> Result<Vec<Manufacturer>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, name, websites, created_at FROM manufacturers ORDER BY name",
        )?;
        let rows = stmt.query_and_then([], |row| row_to_manufacturer(row))?;
        rows.collect()
    }

    pub fn get_manufacturer(&self, id: i64) -> Result<Option<Manufacturer>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, name, websites, created_at FROM manufacturers WHERE id = ?1",
        )?;
        let mut rows = stmt.query_and_then(params![id], |row| row_to_manufacturer(row))?;
        rows.next().transpose()
    }

    pub fn insert_manufacturer(&self, manufacturer: &NewManufacturer) -> Result<i64> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO manufacturers (name, websites, created_at) VALUES (?1, ?2, ?3)",
            params![
                manufacturer.name,
                serde_json::to_string(&manufacturer.websites)?,
                to_ts(Utc::now()),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn update_manufacturer(&self, id: i64, manufacturer: &NewManufacturer) -> Result<bool> {
        let conn = self.lock()?;
        let changed = conn.execute(
            "UPDATE manufacturers SET name = ?2, websites = ?3 WHERE id = ?1",
            params![
                id,
                manufacturer.name,
                serde_json::to_string(&manufacturer.websites)?,
            ],
        )?;
        Ok(changed > 0)
    }

    pub fn delete_manufacturer(&self, id: i64) -> Result<bool> {
        let conn = self.lock()?;
        Ok(conn.execute("DELETE FROM manufacturers WHERE id = ?1", params![id])? > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_sources_are_excluded_from_discovery() {
        let db = Database::open_in_memory().unwrap();
        db.insert_source(&NewSource {
            name: "Auto Site".to_string(),
            url: "https://auto.example".to_string(),
            language: "en".to_string(),
            kind: SourceKind::Automatic,
            custom_instructions: None,
        })
        .unwrap();
        db.insert_source(&NewSource {
            name: "Hand-fed".to_string(),
            url: "https://manual.example".to_string(),
            language: "de".to_string(),
            kind: SourceKind::Manual,
            custom_instructions: None,
        })
        .unwrap();

        assert_eq!(db.list_sources().unwrap().len(), 2);
        let automatic = db.list_automatic_sources().unwrap();
        assert_eq!(automatic.len(), 1);
        assert_eq!(automatic[0].name, "Auto Site");
    }

    #[test]
    fn manufacturer_round_trip() {
        let db = Database::open_in_memory().unwrap();
        let id = db
            .insert_manufacturer(&NewManufacturer {
                name: "Acme Compressors".to_string(),
                websites: vec![
                    "https://acme.example".to_string(),
                    "https://blog.acme.example".to_string(),
                ],
            })
            .unwrap();
        let stored = db.get_manufacturer(id).unwrap().unwrap();
        assert_eq!(stored.websites.len(), 2);

        assert!(db.delete_manufacturer(id).unwrap());
        assert!(db.get_manufacturer(id).unwrap().is_none());
    }
}
