use axum::{
    Json, debug_handler,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;

use crate::{
    AppResult,
    messenger::Messenger,
    models::{ChatId, Message, MessageId, MessageStatus, MessageUpdate, NewMessage},
};

/// Body of `PUT /messages/{id}`; the id comes from the path.
#[derive(Debug, Deserialize)]
pub(crate) struct EditMessage {
    message: String,
    #[serde(default)]
    status: Option<MessageStatus>,
}

#[debug_handler]
pub(crate) async fn send_message(
    State(messenger): State<Messenger>,
    Json(request): Json<NewMessage>,
) -> AppResult<impl IntoResponse> {
    let message = messenger.send(request).await?;
    Ok((StatusCode::CREATED, Json(message)))
}

#[debug_handler]
pub(crate) async fn get_message(
    State(messenger): State<Messenger>,
    Path(id): Path<MessageId>,
) -> AppResult<Json<Message>> {
    Ok(Json(messenger.message(id).await?))
}

#[debug_handler]
pub(crate) async fn update_message(
    State(messenger): State<Messenger>,
    Path(id): Path<MessageId>,
    Json(EditMessage { message, status }): Json<EditMessage>,
) -> AppResult<StatusCode> {
    messenger
        .update_message(MessageUpdate { id, text: message, status })
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[debug_handler]
pub(crate) async fn delete_message(
    State(messenger): State<Messenger>,
    Path(id): Path<MessageId>,
) -> AppResult<StatusCode> {
    messenger.delete_message(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[debug_handler]
pub(crate) async fn chat_history(
    State(messenger): State<Messenger>,
    Path(chat_id): Path<ChatId>,
) -> AppResult<Json<Vec<Message>>> {
    Ok(Json(messenger.history(chat_id).await?))
}
