// HTTP server - exposes the privacy API to the rest of the application

use crate::commands_privacy::{self, PrivacySettingsUpdate};
use crate::db::Database;
use crate::privacy::TokenType;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use std::net::SocketAddr;
use tower_http::cors::{Any, CorsLayer};

#[derive(Clone)]
pub struct AppState {
    pub db: Database,
}

pub fn build_router(db: Database) -> Router {
    let state = AppState { db };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(root))
        .route("/api/health", get(health))
        .route(
            "/api/privacy/settings",
            get(get_privacy_settings).patch(update_privacy_settings),
        )
        .route("/api/privacy/preview", get(preview_tokenization))
        .route("/api/privacy/tokens", get(list_tokens))
        .route("/api/privacy/stats", get(get_token_stats))
        .layer(cors)
        .with_state(state)
}

pub async fn run_http_server(db: Database, port: u16) {
    let app = build_router(db);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            eprintln!("Failed to bind HTTP server to port {}: {}", port, e);
            eprintln!("Try setting LEDGERLENS_HTTP_PORT to a different port, e.g.:");
            eprintln!("  LEDGERLENS_HTTP_PORT=3002 cargo run --bin ledgerlens-http-server");
            return;
        }
    };
    if let Err(e) = axum::serve(listener, app).await {
        eprintln!("HTTP server error: {}", e);
    }
}

// Root route - shows API info and available endpoints
async fn root() -> impl IntoResponse {
    Json(serde_json::json!({
        "name": "LedgerLens Privacy API",
        "version": "1.0.0",
        "status": "running",
        "endpoints": {
            "health": "/api/health",
            "settings": "GET/PATCH /api/privacy/settings",
            "preview": "GET /api/privacy/preview?text=...",
            "tokens": "GET /api/privacy/tokens?token_type=&limit=&offset=",
            "stats": "GET /api/privacy/stats"
        },
        "docs": "Use /api/health to check server status"
    }))
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn get_privacy_settings(State(state): State<AppState>) -> impl IntoResponse {
    match commands_privacy::get_privacy_settings_impl(&state.db).await {
        Ok(settings) => (StatusCode::OK, Json(serde_json::json!(settings))).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, Json(serde_json::json!({ "error": e }))).into_response(),
    }
}

async fn update_privacy_settings(
    State(state): State<AppState>,
    Json(updates): Json<PrivacySettingsUpdate>,
) -> impl IntoResponse {
    match commands_privacy::update_privacy_settings_impl(&state.db, updates).await {
        Ok(settings) => (StatusCode::OK, Json(serde_json::json!(settings))).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, Json(serde_json::json!({ "error": e }))).into_response(),
    }
}

async fn preview_tokenization(
    State(state): State<AppState>,
    Query(params): Query<std::collections::HashMap<String, String>>,
) -> impl IntoResponse {
    let text = params.get("text").cloned().unwrap_or_default();
    if text.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "error": "text query parameter is required" })),
        )
            .into_response();
    }
    match commands_privacy::preview_tokenization_impl(&state.db, text).await {
        Ok(preview) => (StatusCode::OK, Json(serde_json::json!(preview))).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, Json(serde_json::json!({ "error": e }))).into_response(),
    }
}

async fn list_tokens(
    State(state): State<AppState>,
    Query(params): Query<std::collections::HashMap<String, String>>,
) -> impl IntoResponse {
    let token_type = match params.get("token_type").map(String::as_str) {
        None | Some("") => None,
        Some(s) => match TokenType::parse(s) {
            Some(t) => Some(t),
            None => {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(serde_json::json!({
                        "error": format!("unknown token_type: {}", s)
                    })),
                )
                    .into_response();
            }
        },
    };
    let limit: i64 = params
        .get("limit")
        .and_then(|s| s.parse().ok())
        .unwrap_or(50);
    let offset: i64 = params
        .get("offset")
        .and_then(|s| s.parse().ok())
        .unwrap_or(0);

    match commands_privacy::list_tokens_impl(&state.db, token_type, limit, offset).await {
        Ok(tokens) => (StatusCode::OK, Json(serde_json::json!(tokens))).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, Json(serde_json::json!({ "error": e }))).into_response(),
    }
}

async fn get_token_stats(State(state): State<AppState>) -> impl IntoResponse {
    match commands_privacy::get_token_stats_impl(&state.db).await {
        Ok(stats) => (StatusCode::OK, Json(serde_json::json!(stats))).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, Json(serde_json::json!({ "error": e }))).into_response(),
    }
}
