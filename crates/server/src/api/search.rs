//! Source search API handlers.

use axum::{extract::State, http::StatusCode, Json};
use serde::Deserialize;
use std::sync::Arc;

use atlas_core::{SearchResults, SearchSession, SourceSelector};

use super::handlers::{api_error, ApiError};
use crate::state::AppState;

/// Request body for a new search
#[derive(Debug, Deserialize)]
pub struct SearchBody {
    pub query: String,
    /// Source to search; all sources when absent or "All Sources".
    pub source: Option<String>,
}

/// Search the configured sources.
///
/// The returned session is passed back to `/search/next` for more results.
pub async fn search(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SearchBody>,
) -> Result<Json<SearchResults>, ApiError> {
    let query = body.query.trim();
    if query.is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "Query must not be empty"));
    }

    let selector = SourceSelector::from_name(body.source.as_deref());
    Ok(Json(state.library().search(query, &selector).await))
}

/// Load the next page of a search session.
pub async fn search_next(
    State(state): State<Arc<AppState>>,
    Json(session): Json<SearchSession>,
) -> Json<SearchResults> {
    Json(state.library().next_page(&session).await)
}
