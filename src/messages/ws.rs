use std::time::Duration;

use axum::{
    debug_handler,
    extract::{
        Query, State, WebSocketUpgrade,
        ws::{CloseFrame, Message as WsMessage, WebSocket, close_code},
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::{
    messenger::Messenger,
    realtime::{Frame, session::parse_user_id},
};

/// How long the writer may keep flushing queued frames after the read loop ends.
const WRITER_DRAIN: Duration = Duration::from_secs(1);

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    user_id: Option<String>,
}

#[debug_handler]
pub async fn chat_ws(
    State(messenger): State<Messenger>,
    Query(WsQuery { user_id }): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(async move |socket| serve_socket(messenger, user_id, socket).await)
}

async fn serve_socket(messenger: Messenger, raw_user_id: Option<String>, mut socket: WebSocket) {
    let user_id = match parse_user_id(raw_user_id.as_deref()) {
        Ok(user_id) => user_id,
        Err(e) => {
            warn!(error = %e, "rejecting socket");
            reject(&mut socket, close_code::POLICY, "invalid user_id").await;
            return;
        }
    };

    let (connection, mut outbox) = messenger.open_connection(user_id);
    let session = match messenger.on_connect(connection).await {
        Ok(session) => session,
        Err(e) => {
            warn!(user_id = %user_id, error = %e, "rejecting socket");
            reject(&mut socket, close_code::ERROR, "membership lookup failed").await;
            return;
        }
    };

    let (mut sender, receiver) = socket.split();

    let mut writer = tokio::spawn(async move {
        while let Some(frame) = outbox.recv().await {
            if sender.send(WsMessage::Text((&*frame).into())).await.is_err() {
                break;
            }
        }
        let _ = sender.close().await;
    });

    let inbound = receiver.map(|read| read.map(into_frame));
    let reason = session.run(&messenger, inbound).await;
    debug!(user_id = %user_id, reason = ?reason, "read loop finished");

    if tokio::time::timeout(WRITER_DRAIN, &mut writer).await.is_err() {
        writer.abort();
    }
}

fn into_frame(message: WsMessage) -> Frame {
    match message {
        WsMessage::Text(text) => Frame::Text(text.as_str().to_owned()),
        WsMessage::Close(_) => Frame::Close,
        _ => Frame::Ignored,
    }
}

async fn reject(socket: &mut WebSocket, code: u16, reason: &'static str) {
    let frame = CloseFrame {
        code,
        reason: reason.into(),
    };
    let _ = socket.send(WsMessage::Close(Some(frame))).await;
}
