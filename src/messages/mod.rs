mod msg;
mod ws;

use axum::{Router, routing::{get, post}};

use crate::AppState;

pub(crate) use msg::chat_history;
pub use ws::chat_ws;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(msg::send_message))
        .route(
            "/{id}",
            get(msg::get_message).put(msg::update_message).delete(msg::delete_message),
        )
}
