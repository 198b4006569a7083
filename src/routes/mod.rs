//! Router assembly: HTTP endpoints, WebSocket upgrade, static files, CORS, and HTTP tracing.

use std::sync::Arc;

use axum::{
    routing::{delete, get, post, put},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    services::{ServeDir, ServeFile},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::state::AppState;

pub mod http;
pub mod ws;

/// Build the application router with:
/// - WebSocket at `/ws`
/// - learner API under `/api/v1/...`, staff API under `/api/v1/admin/...`
/// - Static SPA from `./static` with index fallback
/// - CORS (allow any origin/method/headers)
/// - HTTP trace layer (per-request spans w/ method, path, status, latency)
pub fn build_router(state: Arc<AppState>) -> Router {
    let static_service = ServeDir::new("./static")
        .append_index_html_on_directories(true)
        .not_found_service(ServeFile::new("./static/index.html"));

    let admin = Router::new()
        .route("/users", get(http::http_list_users).post(http::http_provision_user))
        .route("/class-stats", get(http::http_class_stats))
        .route("/users/:id", delete(http::http_delete_user))
        .route("/users/:id/xp", post(http::http_adjust_xp))
        .route("/quests", put(http::http_save_quest))
        .route("/quests/:id", delete(http::http_delete_quest))
        .route("/quests/:id/status", post(http::http_set_quest_status))
        .route("/chapters/:id/generate", post(http::http_generate_drafts))
        .route("/config", get(http::http_get_admin_config).put(http::http_save_config));

    Router::new()
        .route("/ws", get(ws::ws_upgrade))
        .route("/api/v1/health", get(http::http_health))
        .route("/api/v1/config", get(http::http_public_config))
        .route("/api/v1/auth/register", post(http::http_register))
        .route("/api/v1/auth/login", post(http::http_login))
        .route("/api/v1/users/:id", get(http::http_get_user))
        .route("/api/v1/leaderboard", get(http::http_leaderboard))
        .route("/api/v1/chapters", get(http::http_chapters))
        .route("/api/v1/quests/:id", get(http::http_quest_detail))
        .route("/api/v1/quests/:id/submit", post(http::http_submit_quest))
        .route("/api/v1/tutor/ask", post(http::http_ask_tutor))
        .route("/api/v1/tutor/suggestions", get(http::http_suggestions))
        .route("/api/v1/tutor/topic", get(http::http_suggest_topic))
        .nest("/api/v1/admin", admin)
        .with_state(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .fallback_service(static_service)
}
