use axum::{http::StatusCode, response::{IntoResponse, Response}};

use crate::error::{ChatError, StoreError};

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug)]
pub struct AppError(pub anyhow::Error);

impl AppError {
    fn status(&self) -> StatusCode {
        let Some(err) = self.0.downcast_ref::<ChatError>() else {
            return StatusCode::INTERNAL_SERVER_ERROR;
        };

        match err {
            ChatError::Validation { .. } | ChatError::Decode(_) => StatusCode::BAD_REQUEST,
            ChatError::Upstream { source: StoreError::NotFound, .. } => StatusCode::NOT_FOUND,
            ChatError::Upstream { .. } => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self.0, "request failed");
        }

        (status, format!("{:#}", self.0)).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn core_errors_pick_their_status() {
        let cases = [
            (AppError::from(ChatError::validation("page", "zero")), StatusCode::BAD_REQUEST),
            (
                AppError::from(ChatError::upstream("messages.get", StoreError::NotFound)),
                StatusCode::NOT_FOUND,
            ),
            (
                AppError::from(ChatError::upstream("messages.get", StoreError::Corrupt("x".into()))),
                StatusCode::BAD_GATEWAY,
            ),
            (AppError::from(anyhow::anyhow!("boom")), StatusCode::INTERNAL_SERVER_ERROR),
        ];

        for (err, expected) in cases {
            assert_eq!(err.into_response().status(), expected);
        }
    }
}
