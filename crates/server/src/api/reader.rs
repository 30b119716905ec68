//! Reader session API handlers.
//!
//! A reader session holds the window of loaded chapters for one open novel.
//! Closing a session writes its pending reading progress immediately.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use atlas_core::{ChapterData, ReaderSession, ReadingProgress};

use super::handlers::{api_error, library_error, ApiError};
use crate::state::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Request body for opening a reader session
#[derive(Debug, Deserialize)]
pub struct OpenReaderBody {
    pub novel_id: String,
    /// Chapter to start at; resumes from the last read chapter when absent.
    pub start_index: Option<u32>,
}

/// Request body reporting the chapters visible on screen
#[derive(Debug, Deserialize)]
pub struct VisibleRangeBody {
    pub first: u32,
    pub last: u32,
}

/// Request body for saving the reading position
#[derive(Debug, Deserialize)]
pub struct ProgressBody {
    pub chapter_index: u32,
    pub scroll_offset: u32,
}

#[derive(Debug, Serialize)]
pub struct ReaderResponse {
    pub session_id: String,
    pub novel_id: String,
    pub chapter_count: u32,
    pub chapters: Vec<ChapterData>,
}

impl ReaderResponse {
    fn new(session_id: &str, session: &ReaderSession) -> Self {
        Self {
            session_id: session_id.to_string(),
            novel_id: session.novel_id().to_string(),
            chapter_count: session.chapter_count(),
            chapters: session.chapters(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct LoadResponse {
    /// Chapters loaded by this request; empty when it was ignored.
    pub loaded: Vec<ChapterData>,
    /// Indices now in the window.
    pub window: Vec<u32>,
}

impl LoadResponse {
    fn new(loaded: Vec<ChapterData>, session: &ReaderSession) -> Self {
        Self {
            loaded,
            window: session.chapters().iter().map(|c| c.index).collect(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CloseResponse {
    pub session_id: String,
    /// Whether a pending position was written.
    pub flushed: bool,
}

// ============================================================================
// Handlers
// ============================================================================

/// Open the reader for a novel
pub async fn open_reader(
    State(state): State<Arc<AppState>>,
    Json(body): Json<OpenReaderBody>,
) -> Result<(StatusCode, Json<ReaderResponse>), ApiError> {
    let start_index = match body.start_index {
        Some(index) => index,
        None => resume_index(&state, &body.novel_id).await?,
    };

    let session = ReaderSession::open(
        state.coordinator().clone(),
        &body.novel_id,
        start_index,
        state.config().reader.prefetch,
    )
    .await
    .map_err(library_error)?;

    let session_id = uuid::Uuid::new_v4().to_string();
    let response = ReaderResponse::new(&session_id, &session);
    state.insert_session(session_id.clone(), session).await;
    info!(session_id = %session_id, novel_id = %body.novel_id, start_index, "Reader session opened");

    Ok((StatusCode::CREATED, Json(response)))
}

/// Current window of a reader session
pub async fn get_reader(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<Json<ReaderResponse>, ApiError> {
    let session = find_session(&state, &session_id).await?;
    Ok(Json(ReaderResponse::new(&session_id, &session)))
}

/// Load the chapter after the window
pub async fn load_next(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<Json<LoadResponse>, ApiError> {
    let session = find_session(&state, &session_id).await?;
    let loaded = session.load_next().await.into_iter().collect();
    Ok(Json(LoadResponse::new(loaded, &session)))
}

/// Load the chapter before the window
pub async fn load_previous(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<Json<LoadResponse>, ApiError> {
    let session = find_session(&state, &session_id).await?;
    let loaded = session.load_previous().await.into_iter().collect();
    Ok(Json(LoadResponse::new(loaded, &session)))
}

/// Report the visible chapter range; loads neighbours at the window edges
pub async fn visible_range(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    Json(body): Json<VisibleRangeBody>,
) -> Result<Json<LoadResponse>, ApiError> {
    let session = find_session(&state, &session_id).await?;
    let loaded = session.on_visible_range(body.first, body.last).await;
    Ok(Json(LoadResponse::new(loaded, &session)))
}

/// Re-download one chapter of the window
pub async fn refresh_chapter(
    State(state): State<Arc<AppState>>,
    Path((session_id, index)): Path<(String, u32)>,
) -> Result<Json<LoadResponse>, ApiError> {
    let session = find_session(&state, &session_id).await?;
    let loaded = session.refresh(index).await.into_iter().collect();
    Ok(Json(LoadResponse::new(loaded, &session)))
}

/// Save the reading position (debounced)
pub async fn save_progress(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    Json(body): Json<ProgressBody>,
) -> Result<Json<ReadingProgress>, ApiError> {
    let session = find_session(&state, &session_id).await?;
    state
        .tracker()
        .record_progress(session.novel_id(), body.chapter_index, body.scroll_offset)
        .await;
    Ok(Json(ReadingProgress {
        chapter_index: body.chapter_index,
        scroll_offset: body.scroll_offset,
    }))
}

/// Close a reader session, writing pending progress immediately
pub async fn close_reader(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<Json<CloseResponse>, ApiError> {
    let session = state
        .remove_session(&session_id)
        .await
        .ok_or_else(|| session_not_found(&session_id))?;

    let flushed = match state.tracker().flush_novel(session.novel_id()).await {
        Ok(flushed) => flushed,
        Err(e) => {
            warn!(session_id = %session_id, "Failed to flush progress on close: {}", e);
            return Err(api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()));
        }
    };

    info!(session_id = %session_id, novel_id = %session.novel_id(), flushed, "Reader session closed");
    Ok(Json(CloseResponse {
        session_id,
        flushed,
    }))
}

// ============================================================================
// Helpers
// ============================================================================

async fn find_session(state: &AppState, session_id: &str) -> Result<Arc<ReaderSession>, ApiError> {
    state
        .session(session_id)
        .await
        .ok_or_else(|| session_not_found(session_id))
}

fn session_not_found(session_id: &str) -> ApiError {
    api_error(
        StatusCode::NOT_FOUND,
        format!("Reader session not found: {}", session_id),
    )
}

/// Chapter to resume at: the in-memory position if any, else the stored one.
async fn resume_index(state: &AppState, novel_id: &str) -> Result<u32, ApiError> {
    if let Some(progress) = state.tracker().current(novel_id) {
        return Ok(progress.chapter_index);
    }
    let novel = state
        .library()
        .get_novel(novel_id)
        .await
        .map_err(library_error)?
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, format!("Novel not found: {}", novel_id)))?;
    Ok(novel.last_read_chapter_index)
}
