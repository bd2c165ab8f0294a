use crate::startup::AppState;
use axum::{
    Json, Router,
    extract::Extension,
    http::{
        HeaderValue, Method, StatusCode,
        header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
    },
    response::IntoResponse,
    routing::{get, post},
};
use serde_json::json;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

#[macro_use]
extern crate tracing;

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod polls;
pub mod realtime;
pub mod startup;

/// Every HTTP and WebSocket route, with state and middleware attached.
pub fn app(app_state: AppState) -> Router {
    let cors = cors_layer(&app_state.config.cors_origins);

    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/auth/me", get(auth::me))
        .route("/polls", get(polls::list_polls).post(polls::create_poll))
        .route("/polls/:poll_id", get(polls::get_poll))
        .route("/polls/:poll_id/vote", post(polls::vote_on_poll))
        .route(
            "/polls/:poll_id/like",
            post(polls::like_poll).delete(polls::unlike_poll),
        )
        .route("/ws", get(realtime::ws_handler))
        .layer(Extension(app_state))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .fallback(handler_404)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin {origin}");
                None
            }
        })
        .collect();

    let allow_origin = if allowed.is_empty() {
        AllowOrigin::mirror_request()
    } else {
        AllowOrigin::list(allowed)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE, ACCEPT, AUTHORIZATION])
}

async fn root() -> impl IntoResponse {
    Json(json!({
        "message": "QuickPoll API",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn health_check() -> impl IntoResponse {
    Json(json!({ "status": "healthy" }))
}

async fn handler_404() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "nothing to see here")
}
