//! News post endpoints.
//!
//! The public surface only ever sees posts whose publication time has
//! arrived; the admin surface sees everything and can purge the synthetic
//! no-news placeholders in bulk.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::locale::LocalizedText;
use crate::store::{NewPost, NewsPost, PostFilter, PostStatus};

use super::routes::{internal_error, AppState};

pub fn admin_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(admin_list).post(create_post))
        .route("/purge-no-news", post(purge_no_news))
        .route(
            "/:id",
            get(admin_get).put(update_post).delete(delete_post),
        )
}

// ─────────────────────────────────────────────────────────────────────────────
// Request/Response Types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct PublicListQuery {
    /// Preferred language for the flattened `title`/`body` fields.
    #[serde(default)]
    lang: Option<String>,
}

/// Public view: localized maps plus the text resolved for the requested
/// language.
#[derive(Debug, Serialize)]
pub struct PublicPost {
    pub id: i64,
    pub title: String,
    pub body: String,
    pub titles: LocalizedText,
    pub bodies: LocalizedText,
    pub source_url: Option<String>,
    pub pub_date: DateTime<Utc>,
    pub source_language: String,
}

impl PublicPost {
    fn from_post(post: NewsPost, lang: &str) -> Self {
        let title = post.title.resolve(lang).unwrap_or_default().to_string();
        let body = post.body.resolve(lang).unwrap_or_default().to_string();
        Self {
            id: post.id,
            title,
            body,
            titles: post.title,
            bodies: post.body,
            source_url: post.source_url,
            pub_date: post.pub_date,
            source_language: post.source_language,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AdminListQuery {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    no_news_only: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct PostRequest {
    pub title: LocalizedText,
    #[serde(default)]
    pub body: LocalizedText,
    #[serde(default)]
    pub source_url: Option<String>,
    #[serde(default)]
    pub manufacturer_id: Option<i64>,
    #[serde(default = "default_status")]
    pub status: PostStatus,
    #[serde(default)]
    pub pub_date: Option<DateTime<Utc>>,
    #[serde(default = "default_language")]
    pub source_language: String,
    #[serde(default)]
    pub is_no_news_found: bool,
}

fn default_status() -> PostStatus {
    PostStatus::Draft
}

fn default_language() -> String {
    "ru".to_string()
}

impl PostRequest {
    fn into_new_post(self) -> Result<NewPost, (StatusCode, String)> {
        if self.title.is_empty() {
            return Err((StatusCode::BAD_REQUEST, "Title cannot be empty".to_string()));
        }
        Ok(NewPost {
            title: self.title,
            body: self.body,
            source_url: self.source_url.filter(|u| !u.trim().is_empty()),
            manufacturer_id: self.manufacturer_id,
            status: self.status,
            pub_date: self.pub_date.unwrap_or_else(Utc::now),
            source_language: self.source_language,
            is_no_news_found: self.is_no_news_found,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Public handlers
// ─────────────────────────────────────────────────────────────────────────────

/// GET /api/news - published posts only.
pub async fn list_public(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PublicListQuery>,
) -> Result<Json<Vec<PublicPost>>, (StatusCode, String)> {
    let lang = query.lang.as_deref().unwrap_or("en").to_string();
    let posts = state
        .db
        .list_visible_posts(Utc::now())
        .map_err(internal_error)?;
    Ok(Json(
        posts
            .into_iter()
            .map(|p| PublicPost::from_post(p, &lang))
            .collect(),
    ))
}

/// GET /api/news/:id - a single published post.
pub async fn get_public(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Query(query): Query<PublicListQuery>,
) -> Result<Json<PublicPost>, (StatusCode, String)> {
    let lang = query.lang.as_deref().unwrap_or("en").to_string();
    let post = state
        .db
        .get_post(id)
        .map_err(internal_error)?
        .filter(|p| p.is_visible(Utc::now()))
        .ok_or_else(|| (StatusCode::NOT_FOUND, format!("Post {id} not found")))?;
    Ok(Json(PublicPost::from_post(post, &lang)))
}

// ─────────────────────────────────────────────────────────────────────────────
// Admin handlers
// ─────────────────────────────────────────────────────────────────────────────

async fn admin_list(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AdminListQuery>,
) -> Result<Json<Vec<NewsPost>>, (StatusCode, String)> {
    let filter = PostFilter {
        status: query.status.as_deref().and_then(PostStatus::parse),
        no_news_only: query.no_news_only.unwrap_or(false),
    };
    let posts = state.db.list_posts(&filter).map_err(internal_error)?;
    Ok(Json(posts))
}

async fn admin_get(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<NewsPost>, (StatusCode, String)> {
    state
        .db
        .get_post(id)
        .map_err(internal_error)?
        .map(Json)
        .ok_or_else(|| (StatusCode::NOT_FOUND, format!("Post {id} not found")))
}

async fn create_post(
    State(state): State<Arc<AppState>>,
    Json(req): Json<PostRequest>,
) -> Result<Json<NewsPost>, (StatusCode, String)> {
    let new_post = req.into_new_post()?;
    let id = state.db.insert_post(&new_post).map_err(internal_error)?;
    tracing::info!(post_id = id, "created news post");
    state
        .db
        .get_post(id)
        .map_err(internal_error)?
        .map(Json)
        .ok_or_else(|| internal_error(anyhow::anyhow!("post vanished after insert")))
}

async fn update_post(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(req): Json<PostRequest>,
) -> Result<Json<NewsPost>, (StatusCode, String)> {
    let new_post = req.into_new_post()?;
    if !state
        .db
        .update_post(id, &new_post)
        .map_err(internal_error)?
    {
        return Err((StatusCode::NOT_FOUND, format!("Post {id} not found")));
    }
    state
        .db
        .get_post(id)
        .map_err(internal_error)?
        .map(Json)
        .ok_or_else(|| (StatusCode::NOT_FOUND, format!("Post {id} not found")))
}

async fn delete_post(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<(StatusCode, String), (StatusCode, String)> {
    if state.db.delete_post(id).map_err(internal_error)? {
        Ok((StatusCode::OK, format!("Post {id} deleted")))
    } else {
        Err((StatusCode::NOT_FOUND, format!("Post {id} not found")))
    }
}

#[derive(Debug, Serialize)]
struct PurgeResponse {
    deleted: usize,
}

/// POST /api/admin/news/purge-no-news - bulk-delete placeholder posts.
async fn purge_no_news(
    State(state): State<Arc<AppState>>,
) -> Result<Json<PurgeResponse>, (StatusCode, String)> {
    let deleted = state.db.purge_no_news_posts().map_err(internal_error)?;
    tracing::info!(deleted, "purged no-news placeholder posts");
    Ok(Json(PurgeResponse { deleted }))
}
