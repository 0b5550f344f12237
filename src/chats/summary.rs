use std::sync::Arc;

use tokio::{sync::Semaphore, task::JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::{
    error::{ChatError, ChatResult},
    models::{ChatSummary, UserId},
    store::ChatDirectory,
};

/// Builds one page of chat summaries with a fetch per chat running concurrently.
///
/// The page is all-or-nothing: the first failed fetch cancels the rest and fails the call.
/// Results keep the membership order of the page no matter which fetch finishes first.
#[derive(Clone)]
pub struct SummaryAggregator {
    chats: Arc<dyn ChatDirectory>,
    fanout_limit: Option<usize>,
}

impl SummaryAggregator {
    pub fn new(chats: Arc<dyn ChatDirectory>, fanout_limit: Option<usize>) -> Self {
        Self { chats, fanout_limit }
    }

    pub async fn list(&self, user_id: UserId, page: i64, page_size: i64) -> ChatResult<Vec<ChatSummary>> {
        let page = positive("page", page)?;
        let page_size = positive("count", page_size)?;

        let chat_ids = self
            .chats
            .get_chat_ids(user_id, page, page_size)
            .await
            .map_err(|source| ChatError::upstream("chats.get_chat_ids", source))?;
        if chat_ids.is_empty() {
            return Ok(Vec::new());
        }

        let cancel = CancellationToken::new();
        let limiter = self.fanout_limit.map(|limit| Arc::new(Semaphore::new(limit.max(1))));
        let mut fetches = JoinSet::new();

        for (index, chat_id) in chat_ids.iter().copied().enumerate() {
            let chats = Arc::clone(&self.chats);
            let cancel = cancel.clone();
            let limiter = limiter.clone();

            fetches.spawn(async move {
                let _permit = match limiter {
                    Some(limiter) => limiter.acquire_owned().await.ok(),
                    None => None,
                };
                if cancel.is_cancelled() {
                    return (index, None);
                }
                let summary = chats.get_chat_summary(chat_id).await;
                // cancel while still holding the permit so no queued fetch starts
                if summary.is_err() {
                    cancel.cancel();
                }
                (index, Some(summary))
            });
        }

        // each slot is owned by exactly one fetch
        let mut slots: Vec<Option<ChatSummary>> = vec![None; chat_ids.len()];
        let mut first_error = None;

        while let Some(joined) = fetches.join_next().await {
            let failure = match joined {
                Ok((index, Some(Ok(summary)))) => {
                    slots[index] = Some(summary);
                    continue;
                }
                Ok((_, None)) => continue,
                Ok((index, Some(Err(source)))) => {
                    warn!(chat_id = %chat_ids[index], error = %source, "chat summary fetch failed");
                    ChatError::upstream("chats.list_summaries", source)
                }
                Err(e) => {
                    error!(error = %e, "chat summary task panicked");
                    ChatError::Internal(format!("chats.list_summaries: {e}"))
                }
            };

            if first_error.is_none() {
                cancel.cancel();
                first_error = Some(failure);
            }
        }

        if let Some(err) = first_error {
            return Err(err);
        }

        debug!(user_id = %user_id, page, page_size, chats = slots.len(), "listed chat summaries");
        slots
            .into_iter()
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| ChatError::Internal("chats.list_summaries: missing summary".to_owned()))
    }
}

fn positive(field: &'static str, value: i64) -> ChatResult<u32> {
    if value < 1 {
        return Err(ChatError::validation(field, format!("must be at least 1, got {value}")));
    }
    u32::try_from(value).map_err(|_| ChatError::validation(field, format!("{value} is too large")))
}
