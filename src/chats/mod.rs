mod manage;
mod summary;

use axum::{Router, routing::{get, post, put}};

use crate::AppState;

pub use summary::SummaryAggregator;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(manage::list_chats).post(manage::create_chat))
        .route("/{chat_id}", put(manage::update_chat).delete(manage::delete_chat))
        .route("/{chat_id}/messages", get(crate::messages::chat_history))
        .route(
            "/{chat_id}/members/{person_id}",
            post(manage::add_member).delete(manage::remove_member),
        )
}
