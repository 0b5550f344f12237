pub mod appresult;
pub mod chats;
pub mod config;
pub mod db;
pub mod error;
pub mod messages;
pub mod messenger;
pub mod models;
pub mod realtime;
pub mod store;

use axum::{Router, debug_handler, extract::FromRef, routing::get};
use tower_http::cors::CorsLayer;

pub use appresult::{AppError, AppResult};
pub use messenger::{Messenger, MessengerOptions};

#[derive(Clone, FromRef)]
pub struct AppState {
    pub messenger: Messenger,
}

/// The full HTTP + WebSocket surface over one messenger.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/test", get(test))
        .route("/ws", get(messages::chat_ws))
        .nest("/messages", messages::router())
        .nest("/chats", chats::router())
        .with_state(state)
        .layer(CorsLayer::permissive())
}

#[debug_handler]
async fn test() -> &'static str {
    "Test is successful"
}
