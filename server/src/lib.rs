pub mod error;

use anyhow::Result;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use error::ApiError;
use quill_core::{ContentItem, ContentStore, ItemId, NewItem, ScoredItem, SimilarStatus, StoreError, TextConfig};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use time::OffsetDateTime;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

const EXCERPT_CHARS: usize = 200;

#[derive(Debug, Clone, Default)]
pub struct ServerConfig {
    pub data_dir: PathBuf,
    pub text: TextConfig,
    pub admin_token: Option<String>,
    /// Comma-separated origins; any origin when unset or unparseable.
    pub cors_allow_origin: Option<String>,
}

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<ContentStore>,
    pub admin_token: Option<String>,
    pub cors_allow_origin: Option<String>,
}

impl AppState {
    pub fn open(config: &ServerConfig) -> Result<Self> {
        let store = ContentStore::open(&config.data_dir, config.text.composer()?)?;
        Ok(Self {
            store: Arc::new(store),
            admin_token: config.admin_token.clone(),
            cors_allow_origin: config.cors_allow_origin.clone(),
        })
    }
}

pub fn build_app(config: &ServerConfig) -> Result<Router> {
    Ok(router(AppState::open(config)?))
}

pub fn router(state: AppState) -> Router {
    let cors = match state.cors_allow_origin.as_deref() {
        Some(val) => {
            let origins: Vec<_> = val
                .split(',')
                .filter_map(|s| s.trim().parse().ok())
                .collect();
            if origins.is_empty() {
                CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)
            } else {
                CorsLayer::new().allow_origin(AllowOrigin::list(origins)).allow_methods(Any).allow_headers(Any)
            }
        }
        None => CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any),
    };

    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/items", post(create_item))
        .route("/items/:id", get(get_item).put(update_item).delete(delete_item))
        .route("/items/:id/similar", get(similar_items))
        .route("/search", get(search_handler))
        .route("/index/rebuild", post(index_rebuild))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// Run a store call off the async runtime; noun extraction may block on a subprocess.
async fn with_store<T, F>(state: &AppState, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&ContentStore) -> Result<T, StoreError> + Send + 'static,
    T: Send + 'static,
{
    let store = Arc::clone(&state.store);
    tokio::task::spawn_blocking(move || f(&store))
        .await
        .map_err(|e| ApiError::Internal(format!("store task failed: {e}")))?
        .map_err(ApiError::from)
}

fn excerpt(body: &str) -> String {
    body.chars().take(EXCERPT_CHARS).collect()
}

// --- Items ---

#[derive(Deserialize)]
pub struct CreateItemRequest {
    #[serde(default)]
    pub author_ref: String,
    pub title: Option<String>,
    pub body: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
}

#[derive(Deserialize)]
pub struct UpdateItemRequest {
    pub title: Option<String>,
    pub body: Option<String>,
}

fn require_fields(title: Option<String>, body: Option<String>) -> Result<(String, String), ApiError> {
    let mut missing = Vec::new();
    if title.is_none() { missing.push("title"); }
    if body.is_none() { missing.push("body"); }
    match (title, body) {
        (Some(title), Some(body)) => Ok((title, body)),
        _ => Err(ApiError::BadRequest(format!("missing required field(s): {}", missing.join(", ")))),
    }
}

pub async fn create_item(State(state): State<AppState>, Json(req): Json<CreateItemRequest>) -> Result<(StatusCode, Json<ContentItem>), ApiError> {
    let (title, body) = require_fields(req.title, req.body)?;
    let new = NewItem { author_ref: req.author_ref, title, body, image_url: req.image_url };
    let item = with_store(&state, move |store| store.create(new)).await?;
    tracing::info!(id = item.id, "item created");
    Ok((StatusCode::CREATED, Json(item)))
}

pub async fn get_item(State(state): State<AppState>, Path(id): Path<ItemId>) -> Result<Json<ContentItem>, ApiError> {
    let item = with_store(&state, move |store| store.get(id)).await?;
    Ok(Json(item))
}

pub async fn update_item(State(state): State<AppState>, Path(id): Path<ItemId>, Json(req): Json<UpdateItemRequest>) -> Result<Json<ContentItem>, ApiError> {
    let (title, body) = require_fields(req.title, req.body)?;
    let item = with_store(&state, move |store| store.update(id, &title, &body)).await?;
    Ok(Json(item))
}

pub async fn delete_item(State(state): State<AppState>, Path(id): Path<ItemId>) -> Result<Json<serde_json::Value>, ApiError> {
    with_store(&state, move |store| store.delete(id)).await?;
    tracing::info!(id, "item deleted");
    Ok(Json(serde_json::json!({ "deleted_id": id })))
}

// --- Similar items ---

#[derive(Deserialize)]
pub struct SimilarParams {
    /// Kept as text so malformed values fall back to the default like non-positive ones.
    pub limit: Option<String>,
}

fn similar_limit(raw: Option<&str>) -> usize {
    raw.and_then(|s| s.trim().parse::<i64>().ok())
        .filter(|k| *k > 0)
        .map(|k| k as usize)
        .unwrap_or(0)
}

#[derive(Serialize)]
pub struct SimilarResponse {
    pub status: SimilarStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub similar_items: Vec<SimilarHit>,
}

#[derive(Serialize)]
pub struct SimilarHit {
    pub id: ItemId,
    pub title: String,
    pub excerpt: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub author_ref: String,
    pub image_url: Option<String>,
    pub score: f32,
    pub view_count: u64,
    pub like_count: u64,
    pub comment_count: u64,
}

impl From<ScoredItem> for SimilarHit {
    fn from(hit: ScoredItem) -> Self {
        let item = hit.item;
        Self {
            id: item.id,
            excerpt: excerpt(&item.body),
            title: item.title,
            created_at: item.created_at,
            author_ref: item.author_ref,
            image_url: item.image_url,
            score: hit.score,
            view_count: item.view_count,
            like_count: item.like_count,
            comment_count: item.comment_count,
        }
    }
}

pub async fn similar_items(State(state): State<AppState>, Path(id): Path<ItemId>, Query(params): Query<SimilarParams>) -> Result<Json<SimilarResponse>, ApiError> {
    // 0 selects the store default.
    let k = similar_limit(params.limit.as_deref());
    let outcome = with_store(&state, move |store| store.find_similar(id, k)).await?;
    let message = match outcome.status {
        SimilarStatus::InsufficientKeywords => Some("not enough keywords in this item to find similar items".to_string()),
        SimilarStatus::Found if outcome.items.is_empty() => Some("no similar items found".to_string()),
        SimilarStatus::Found => None,
    };
    Ok(Json(SimilarResponse {
        status: outcome.status,
        message,
        similar_items: outcome.items.into_iter().map(SimilarHit::from).collect(),
    }))
}

// --- Keyword search ---

#[derive(Deserialize)]
pub struct SearchParams {
    pub q: String,
    #[serde(default = "default_k")]
    pub k: usize,
}
fn default_k() -> usize { 10 }

#[derive(Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub took_s: f64,
    pub total_hits: usize,
    pub results: Vec<SearchHit>,
}

#[derive(Serialize)]
pub struct SearchHit {
    pub id: ItemId,
    pub score: f32,
    pub title: String,
    pub author_ref: String,
    pub snippet: Option<String>,
}

pub async fn search_handler(State(state): State<AppState>, Query(params): Query<SearchParams>) -> Result<Json<SearchResponse>, ApiError> {
    let start = std::time::Instant::now();
    if params.q.trim().is_empty() {
        return Err(ApiError::BadRequest("query must not be empty".into()));
    }
    let query = params.q.clone();
    let k = params.k.max(1);
    let hits = with_store(&state, move |store| store.search(&query, k)).await?;

    // Capture raw query terms for highlighting
    let raw_terms: Vec<String> = params.q.split_whitespace().map(|s| s.to_string()).collect();
    let results: Vec<SearchHit> = hits
        .into_iter()
        .map(|hit| SearchHit {
            id: hit.item.id,
            score: hit.score,
            snippet: snippet(&hit.item.body, &raw_terms),
            title: hit.item.title,
            author_ref: hit.item.author_ref,
        })
        .collect();

    let elapsed = start.elapsed();
    Ok(Json(SearchResponse { query: params.q, took_s: elapsed.as_secs_f64(), total_hits: results.len(), results }))
}

fn snippet(text: &str, raw_terms: &[String]) -> Option<String> {
    if text.is_empty() { return None; }
    let lower = text.to_lowercase();
    let first_idx = raw_terms
        .iter()
        .filter(|t| !t.trim().is_empty())
        .find_map(|t| lower.find(&t.to_lowercase()));
    let snippet: String = match first_idx {
        // Lowercasing can shift byte offsets, so fall back to the start when off a boundary.
        Some(idx) if text.is_char_boundary(idx) => {
            let start = text[..idx].char_indices().rev().nth(99).map(|(i, _)| i).unwrap_or(0);
            text[start..].chars().take(300).collect()
        }
        _ => text.chars().take(EXCERPT_CHARS).collect(),
    };
    Some(highlight_terms(&snippet, raw_terms))
}

fn highlight_terms(snippet: &str, terms: &[String]) -> String {
    let mut s = snippet.to_string();
    for t in terms {
        if t.trim().is_empty() { continue; }
        let Ok(pat) = regex::RegexBuilder::new(&regex::escape(t)).case_insensitive(true).build() else {
            continue;
        };
        s = pat.replace_all(&s, |caps: &regex::Captures| format!("<em>{}</em>", &caps[0])).to_string();
    }
    s
}

// --- Admin ---

#[derive(Serialize)]
pub struct RebuildResponse {
    pub items: usize,
    pub updated: usize,
}

async fn index_rebuild(State(state): State<AppState>, headers: HeaderMap) -> Result<Json<RebuildResponse>, ApiError> {
    authorize(&state, &headers)?;
    let report = with_store(&state, |store| store.reindex_all()).await?;
    Ok(Json(RebuildResponse { items: report.items, updated: report.updated }))
}

fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    let required = match &state.admin_token {
        Some(t) => t,
        None => return Err(ApiError::Unauthorized("ADMIN_TOKEN not set".into())),
    };
    let provided = headers.get("X-ADMIN-TOKEN").and_then(|v| v.to_str().ok()).unwrap_or("");
    if provided == required {
        Ok(())
    } else {
        Err(ApiError::Unauthorized("invalid admin token".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snippet_highlights_terms() {
        let s = snippet("Rust is great. rust systems programming.", &["rust".to_string()]).unwrap();
        assert_eq!(s, "<em>Rust</em> is great. <em>rust</em> systems programming.");
    }

    #[test]
    fn excerpt_is_char_bounded() {
        let body = "가".repeat(500);
        assert_eq!(excerpt(&body).chars().count(), EXCERPT_CHARS);
    }

    #[test]
    fn similar_limit_is_lenient() {
        assert_eq!(similar_limit(Some("5")), 5);
        assert_eq!(similar_limit(Some("-2")), 0);
        assert_eq!(similar_limit(Some("abc")), 0);
        assert_eq!(similar_limit(None), 0);
    }

    #[test]
    fn missing_fields_are_listed() {
        match require_fields(None, None) {
            Err(ApiError::BadRequest(msg)) => assert!(msg.contains("title, body")),
            _ => panic!("expected bad request"),
        }
    }
}
