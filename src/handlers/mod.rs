pub mod chats;
pub mod health;

use std::sync::Arc;

use axum::http::{HeaderValue, Method};
use axum::routing::get;
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    let cors = match state.config.cors_origin.as_str() {
        "*" => CorsLayer::new().allow_origin(Any),
        origin => match HeaderValue::from_str(origin) {
            Ok(value) => CorsLayer::new().allow_origin(value),
            Err(_) => {
                tracing::warn!(origin, "invalid CORS_ORIGIN, allowing any origin");
                CorsLayer::new().allow_origin(Any)
            }
        },
    }
    .allow_methods([Method::GET, Method::POST])
    .allow_headers(Any);

    Router::new()
        .route("/health", get(health::health))
        .route("/chats", get(chats::list_chats).post(chats::create_chat))
        .route(
            "/chats/:chat_id/messages",
            get(chats::get_messages).post(chats::post_message),
        )
        .route("/chats/:chat_id/state", get(chats::get_state))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
