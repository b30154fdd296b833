//! HTTP and WebSocket gateway for the IdeaBridge backend.
//!
//! Exposes the durable REST surface and the live channel over a single
//! axum router sharing one [`AppState`].

pub mod error;
pub mod registry;
pub mod rest;
pub mod rooms;
pub mod state;
pub mod util;
pub mod websocket;

use axum::http::Method;
use axum::routing::{get, patch, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};

pub use error::{ApiError, ErrorResponse};
pub use state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(rest::health::health_check))
        .route("/api/auth/register", post(rest::auth::register))
        .route("/api/auth/login", post(rest::auth::login))
        .route("/api/users/me", get(rest::auth::me))
        .route(
            "/api/conversations",
            get(rest::conversations::list_conversations)
                .post(rest::conversations::create_conversation),
        )
        .route(
            "/api/conversations/:conversation_id",
            get(rest::conversations::get_conversation),
        )
        .route(
            "/api/conversations/:conversation_id/messages",
            post(rest::conversations::post_message),
        )
        .route(
            "/api/conversations/:conversation_id/read",
            patch(rest::conversations::mark_read),
        )
        .route("/ws", get(websocket::websocket_handler))
        .layer(cors_layer())
        .with_state(state)
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::OPTIONS,
        ])
        .allow_origin(Any)
        .allow_headers(Any)
}
