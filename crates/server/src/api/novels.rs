//! Library and novel API handlers.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use atlas_core::{Category, Chapter, FetchOutcome, HistoryRemoval, Novel};

use super::handlers::{api_error, library_error, ApiError};
use crate::state::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Query parameters for searching the library
#[derive(Debug, Deserialize)]
pub struct LibrarySearchParams {
    pub q: String,
}

/// Request body for changing a novel's category
#[derive(Debug, Deserialize)]
pub struct CategoryBody {
    pub category: String,
}

/// Query parameters for fetching one chapter
#[derive(Debug, Deserialize)]
pub struct ChapterParams {
    /// Bypass the cached body.
    #[serde(default)]
    pub refresh: bool,
}

#[derive(Debug, Serialize)]
pub struct LibraryResponse {
    pub novels: Vec<Novel>,
    pub total: usize,
}

impl From<Vec<Novel>> for LibraryResponse {
    fn from(novels: Vec<Novel>) -> Self {
        Self {
            total: novels.len(),
            novels,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ChaptersResponse {
    pub novel_id: String,
    pub chapters: Vec<Chapter>,
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub novel_id: String,
    pub removal: HistoryRemoval,
}

// ============================================================================
// Handlers
// ============================================================================

/// Library and reading history, most recently read first
pub async fn list_library(
    State(state): State<Arc<AppState>>,
) -> Result<Json<LibraryResponse>, ApiError> {
    let novels = state.library().library().await.map_err(library_error)?;
    Ok(Json(LibraryResponse::from(novels)))
}

/// Search library members by title
pub async fn search_library(
    State(state): State<Arc<AppState>>,
    Query(params): Query<LibrarySearchParams>,
) -> Result<Json<LibraryResponse>, ApiError> {
    let novels = state
        .library()
        .search_library(params.q.trim())
        .await
        .map_err(library_error)?;
    Ok(Json(LibraryResponse::from(novels)))
}

/// Add a novel to the library and sync its chapters
pub async fn add_to_library(
    State(state): State<Arc<AppState>>,
    Json(novel): Json<Novel>,
) -> Result<(StatusCode, Json<Novel>), ApiError> {
    let novel = state
        .library()
        .add_to_library(novel)
        .await
        .map_err(library_error)?;
    Ok((StatusCode::CREATED, Json(novel)))
}

/// The novel last opened in the reader
pub async fn last_active(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Novel>, ApiError> {
    state
        .library()
        .last_active_novel()
        .await
        .map_err(library_error)?
        .map(Json)
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, "No novel has been opened yet"))
}

/// Open a search result, storing it as a preview if it is new
pub async fn open_preview(
    State(state): State<Arc<AppState>>,
    Json(preview): Json<Novel>,
) -> Result<Json<Novel>, ApiError> {
    let opened = state
        .library()
        .open_preview(preview)
        .await
        .map_err(library_error)?;
    // Details are written back in the background and pushed over the websocket
    Ok(Json(opened.novel))
}

/// Chapter list of a search result, straight from its source
pub async fn preview_chapters(
    State(state): State<Arc<AppState>>,
    Json(preview): Json<Novel>,
) -> Json<ChaptersResponse> {
    let chapters = state.library().preview_chapters(&preview).await;
    Json(ChaptersResponse {
        novel_id: preview.id,
        chapters,
    })
}

/// Get a stored novel
pub async fn get_novel(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Novel>, ApiError> {
    state
        .library()
        .get_novel(&id)
        .await
        .map_err(library_error)?
        .map(Json)
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, format!("Novel not found: {}", id)))
}

/// Move a novel to another category
pub async fn set_category(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<CategoryBody>,
) -> Result<Json<Novel>, ApiError> {
    let category: Category = body
        .category
        .parse()
        .map_err(|e: atlas_core::novel::UnknownCategory| {
            api_error(StatusCode::BAD_REQUEST, e.to_string())
        })?;

    let novel = state
        .library()
        .set_category(&id, category)
        .await
        .map_err(library_error)?;
    Ok(Json(novel))
}

/// Remove a novel from the reading history
pub async fn remove_from_history(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let removal = state
        .library()
        .remove_from_history(&id, state.tracker())
        .await
        .map_err(library_error)?;
    Ok(Json(HistoryResponse {
        novel_id: id,
        removal,
    }))
}

/// Stored chapters of a novel
pub async fn list_chapters(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ChaptersResponse>, ApiError> {
    let chapters = state.library().chapters(&id).await.map_err(library_error)?;
    Ok(Json(ChaptersResponse {
        novel_id: id,
        chapters,
    }))
}

/// Resolve one chapter from cache or source
pub async fn get_chapter(
    State(state): State<Arc<AppState>>,
    Path((id, index)): Path<(String, u32)>,
    Query(params): Query<ChapterParams>,
) -> Result<Json<FetchOutcome>, ApiError> {
    if state
        .library()
        .get_novel(&id)
        .await
        .map_err(library_error)?
        .is_none()
    {
        return Err(api_error(
            StatusCode::NOT_FOUND,
            format!("Novel not found: {}", id),
        ));
    }

    let outcome = state
        .coordinator()
        .fetch_chapter(&id, index, params.refresh)
        .await;
    Ok(Json(outcome))
}
