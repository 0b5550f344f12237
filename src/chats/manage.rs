use axum::{
    Json, debug_handler,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;

use crate::{
    AppResult,
    messenger::Messenger,
    models::{Chat, ChatId, ChatSummary, NewChat, UserId},
};

#[derive(Debug, Deserialize)]
pub(crate) struct ListChatsQuery {
    user_id: UserId,
    page: i64,
    count: i64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct MemberQuery {
    user_id: UserId,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RenameChat {
    name: String,
}

#[debug_handler]
pub(crate) async fn list_chats(
    State(messenger): State<Messenger>,
    Query(ListChatsQuery { user_id, page, count }): Query<ListChatsQuery>,
) -> AppResult<Json<Vec<ChatSummary>>> {
    Ok(Json(messenger.list_chat_summaries(user_id, page, count).await?))
}

#[debug_handler]
pub(crate) async fn create_chat(
    State(messenger): State<Messenger>,
    Json(new_chat): Json<NewChat>,
) -> AppResult<impl IntoResponse> {
    let chat_id = messenger.create_chat(new_chat).await?;
    Ok((StatusCode::CREATED, Json(chat_id)))
}

#[debug_handler]
pub(crate) async fn update_chat(
    State(messenger): State<Messenger>,
    Path(chat_id): Path<ChatId>,
    Json(RenameChat { name }): Json<RenameChat>,
) -> AppResult<StatusCode> {
    messenger.update_chat(Chat { id: chat_id, name }).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[debug_handler]
pub(crate) async fn delete_chat(
    State(messenger): State<Messenger>,
    Path(chat_id): Path<ChatId>,
    Query(MemberQuery { user_id }): Query<MemberQuery>,
) -> AppResult<StatusCode> {
    messenger.delete_chat(chat_id, user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[debug_handler]
pub(crate) async fn add_member(
    State(messenger): State<Messenger>,
    Path((chat_id, person_id)): Path<(ChatId, UserId)>,
) -> AppResult<StatusCode> {
    messenger.add_member(chat_id, person_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[debug_handler]
pub(crate) async fn remove_member(
    State(messenger): State<Messenger>,
    Path((chat_id, person_id)): Path<(ChatId, UserId)>,
) -> AppResult<StatusCode> {
    messenger.remove_member(chat_id, person_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
