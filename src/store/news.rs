//! News posts.

use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{params, Row};
use serde::{Deserialize, Serialize};

use crate::locale::LocalizedText;

use super::db::{parse_ts, to_ts, Database};

/// Publication status of a post.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostStatus {
    Draft,
    Scheduled,
    Published,
}

impl PostStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PostStatus::Draft => "draft",
            PostStatus::Scheduled => "scheduled",
            PostStatus::Published => "published",
        }
    }

    pub fn parse(value: &str) -> Option<PostStatus> {
        match value {
            "draft" => Some(PostStatus::Draft),
            "scheduled" => Some(PostStatus::Scheduled),
            "published" => Some(PostStatus::Published),
            _ => None,
        }
    }
}

/// A stored news post.
#[derive(Debug, Clone, Serialize)]
pub struct NewsPost {
    pub id: i64,
    pub title: LocalizedText,
    pub body: LocalizedText,
    pub source_url: Option<String>,
    pub manufacturer_id: Option<i64>,
    pub status: PostStatus,
    pub pub_date: DateTime<Utc>,
    pub source_language: String,
    pub is_no_news_found: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl NewsPost {
    /// A post is visible to non-administrators iff its publication time has
    /// passed and it is published or an already-due scheduled post.
    pub fn is_visible(&self, now: DateTime<Utc>) -> bool {
        matches!(self.status, PostStatus::Published | PostStatus::Scheduled)
            && self.pub_date <= now
    }
}

/// Fields for creating or replacing a post.
#[derive(Debug, Clone)]
pub struct NewPost {
    pub title: LocalizedText,
    pub body: LocalizedText,
    pub source_url: Option<String>,
    pub manufacturer_id: Option<i64>,
    pub status: PostStatus,
    pub pub_date: DateTime<Utc>,
    pub source_language: String,
    pub is_no_news_found: bool,
}

/// Admin listing filter.
#[derive(Debug, Clone, Default)]
pub struct PostFilter {
    pub status: Option<PostStatus>,
    pub no_news_only: bool,
}

fn row_to_post(row: &Row<'_>) -> Result<NewsPost> {
    let title_json: String = row.get("title")?;
    let body_json: String = row.get("body")?;
    let status: String = row.get("status")?;
    let pub_date: String = row.get("pub_date")?;
    let created: String = row.get("created_at")?;
    let updated: String = row.get("updated_at")?;

    Ok(NewsPost {
        id: row.get("id")?,
        title: serde_json::from_str(&title_json)?,
        body: serde_json::from_str(&body_json)?,
        source_url: row.get("source_url")?,
        manufacturer_id: row.get("manufacturer_id")?,
        status: PostStatus::parse(&status).unwrap_or(PostStatus::Draft),
        pub_date: parse_ts(&pub_date)?,
        source_language: row.get("source_language")?,
        is_no_news_found: row.get::<_, i64>("is_no_news_found")? != 0,
        created_at: parse_ts(&created)?,
        updated_at: parse_ts(&updated)?,
    })
}

const POST_COLUMNS: &str = "id, title, body, source_url, manufacturer_id, status, pub_date, \
     source_language, is_no_news_found, created_at, updated_at";

impl Database {
    pub fn insert_post(&self, post: &NewPost) -> Result<i64> {
        let conn = self.lock()?;
        let now = to_ts(Utc::now());
        conn.execute(
            "INSERT INTO news_posts \
             (title, body, source_url, manufacturer_id, status, pub_date, source_language, \
              is_no_news_found, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)",
            params![
                serde_json::to_string(&post.title)?,
                serde_json::to_string(&post.body)?,
                post.source_url,
                post.manufacturer_id,
                post.status.as_str(),
                to_ts(post.pub_date),
                post.source_language,
                post.is_no_news_found as i64,
                now,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn get_post(&self, id: i64) -> Result<Option<NewsPost>> {
        let conn = self.lock()?;
        let mut stmt =
            conn.prepare(&format!("SELECT {POST_COLUMNS} FROM news_posts WHERE id = ?1"))?;
        let mut rows = stmt.query_and_then(params![id], |row| row_to_post(row))?;
        rows.next().transpose()
    }

    /// Posts visible to the public at `now`, newest first.
    pub fn list_visible_posts(&self, now: DateTime<Utc>) -> Result<Vec<NewsPost>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {POST_COLUMNS} FROM news_posts \
             WHERE status IN ('published', 'scheduled') AND pub_date <= ?1 \
             ORDER BY pub_date DESC"
        ))?;
        let rows = stmt.query_and_then(params![to_ts(now)], |row| row_to_post(row))?;
        rows.collect()
    }

    /// All posts for the admin panel, optionally filtered.
    pub fn list_posts(&self, filter: &PostFilter) -> Result<Vec<NewsPost>> {
        let conn = self.lock()?;
        let mut sql = format!("SELECT {POST_COLUMNS} FROM news_posts WHERE 1=1");
        if filter.status.is_some() {
            sql.push_str(" AND status = ?1");
        }
        if filter.no_news_only {
            sql.push_str(" AND is_no_news_found = 1");
        }
        sql.push_str(" ORDER BY pub_date DESC");

        let mut stmt = conn.prepare(&sql)?;
        match filter.status {
            Some(status) => stmt
                .query_and_then(params![status.as_str()], |row| row_to_post(row))?
                .collect(),
            None => stmt
                .query_and_then([], |row| row_to_post(row))?
                .collect(),
        }
    }

    pub fn update_post(&self, id: i64, post: &NewPost) -> Result<bool> {
        let conn = self.lock()?;
        let changed = conn.execute(
            "UPDATE news_posts SET \
             title = ?2, body = ?3, source_url = ?4, manufacturer_id = ?5, status = ?6, \
             pub_date = ?7, source_language = ?8, is_no_news_found = ?9, updated_at = ?10 \
             WHERE id = ?1",
            params![
                id,
                serde_json::to_string(&post.title)?,
                serde_json::to_string(&post.body)?,
                post.source_url,
                post.manufacturer_id,
                post.status.as_str(),
                to_ts(post.pub_date),
                post.source_language,
                post.is_no_news_found as i64,
                to_ts(Utc::now()),
            ],
        )?;
        Ok(changed > 0)
    }

    pub fn delete_post(&self, id: i64) -> Result<bool> {
        let conn = self.lock()?;
        Ok(conn.execute("DELETE FROM news_posts WHERE id = ?1", params![id])? > 0)
    }

    /// Bulk-delete the synthetic "no news found" placeholders.
    pub fn purge_no_news_posts(&self) -> Result<usize> {
        let conn = self.lock()?;
        Ok(conn.execute("DELETE FROM news_posts WHERE is_no_news_found = 1", [])?)
    }

    /// A discovered item is a duplicate when a non-placeholder post already
    /// carries the same source URL and the same title in `lang`.
    pub fn is_duplicate_post(
        &self,
        source_url: &str,
        title: &LocalizedText,
        lang: &str,
    ) -> Result<bool> {
        let Some(wanted) = title.resolve(lang) else {
            return Ok(false);
        };
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT title FROM news_posts WHERE source_url = ?1 AND is_no_news_found = 0",
        )?;
        let titles = stmt.query_map(params![source_url], |row| row.get::<_, String>(0))?;
        for stored in titles {
            let stored: LocalizedText = serde_json::from_str(&stored?)?;
            if stored.resolve(lang) == Some(wanted) {
                return Ok(true);
            }
        }
        Ok(false)
    }
}
