use axum::{
    middleware,
    routing::{delete, get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use super::{handlers, middleware::metrics_middleware, novels, reader, search, ws};
use crate::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    // API routes
    let api_routes = Router::new()
        // Health and config
        .route("/health", get(handlers::health))
        .route("/config", get(handlers::get_config))
        .route("/sources", get(handlers::list_sources))
        // Source search
        .route("/search", post(search::search))
        .route("/search/next", post(search::search_next))
        // Library
        .route(
            "/library",
            get(novels::list_library).post(novels::add_to_library),
        )
        .route("/library/search", get(novels::search_library))
        .route("/library/last-active", get(novels::last_active))
        // Novels
        .route("/novels/preview", post(novels::open_preview))
        .route("/novels/preview/chapters", post(novels::preview_chapters))
        .route("/novels/{id}", get(novels::get_novel))
        .route("/novels/{id}/category", put(novels::set_category))
        .route("/novels/{id}/history", delete(novels::remove_from_history))
        .route("/novels/{id}/chapters", get(novels::list_chapters))
        .route("/novels/{id}/chapters/{index}", get(novels::get_chapter))
        // Reader sessions
        .route("/reader", post(reader::open_reader))
        .route(
            "/reader/{session}",
            get(reader::get_reader).delete(reader::close_reader),
        )
        .route("/reader/{session}/next", post(reader::load_next))
        .route("/reader/{session}/previous", post(reader::load_previous))
        .route("/reader/{session}/visible", post(reader::visible_range))
        .route(
            "/reader/{session}/refresh/{index}",
            post(reader::refresh_chapter),
        )
        .route("/reader/{session}/progress", put(reader::save_progress))
        // Live updates
        .route("/ws", get(ws::ws_handler));

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/metrics", get(handlers::metrics))
        .with_state(state)
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
