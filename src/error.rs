//! Error handler for cba.

use axum::extract::rejection::JsonRejection;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use sqlx::{Error as SQLxError, postgres::PgDatabaseError};
use thiserror::Error;
use validator::ValidationErrors;

pub type Result<T> = std::result::Result<T, ServerError>;

/// Enum representing server-side errors.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("validation error occurred: {0}")]
    Validation(#[from] ValidationErrors),

    #[error(transparent)]
    Json(#[from] JsonRejection),

    #[error("SQL request failed: {0}")]
    Sql(#[from] SQLxError),

    #[error("account number {0} is already taken")]
    AccountNumberTaken(String),

    #[error("no free account number after {0} attempts")]
    AccountNumberExhausted(u32),

    #[error("transaction timed out, nothing was written")]
    TransactionTimeout,

    #[error("commit failed, the outcome of the transaction is unknown: {0}")]
    Commit(SQLxError),
}

impl ServerError {
    /// HTTP status bound to the error.
    pub fn status(&self) -> StatusCode {
        match self {
            ServerError::Validation(_) | ServerError::Json(_) => {
                StatusCode::BAD_REQUEST
            },
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn details(&self) -> String {
        match self {
            ServerError::Validation(errors) => {
                let mut lines = errors
                    .field_errors()
                    .iter()
                    .flat_map(|(field, issues)| {
                        issues.iter().map(move |issue| match &issue.message {
                            Some(message) => format!("{field}: {message}"),
                            None => format!("{field}: {}", issue.code),
                        })
                    })
                    .collect::<Vec<_>>();
                lines.sort();
                lines.join("\n")
            },
            ServerError::Json(rejection) => rejection.body_text(),
            ServerError::Sql(err) => err
                .as_database_error()
                .and_then(|e| e.try_downcast_ref::<PgDatabaseError>())
                .and_then(|e| e.detail())
                .map(|detail| format!("SQL request failed: {detail}"))
                .unwrap_or_else(|| self.to_string()),
            _ => self.to_string(),
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = self.details();

        if status.is_server_error() {
            tracing::error!(error = %self, "server returned 500 status");
        } else {
            tracing::debug!(error = %body, "request rejected");
        }

        (
            status,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            body,
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;
    use validator::ValidationError;

    #[tokio::test]
    async fn test_validation_is_bad_request() {
        let mut errors = ValidationErrors::new();
        errors.add(
            "nin",
            ValidationError::new("digits")
                .with_message("NIN must be 11 digits.".into()),
        );
        errors.add("email", ValidationError::new("email"));

        let response = ServerError::from(errors).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/plain; charset=utf-8"
        );

        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"email: email\nnin: NIN must be 11 digits.");
    }

    #[tokio::test]
    async fn test_write_failures_are_internal() {
        let response =
            ServerError::AccountNumberExhausted(5).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let response = ServerError::TransactionTimeout.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let response =
            ServerError::Commit(SQLxError::PoolClosed).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert!(String::from_utf8_lossy(&body).contains("unknown"));
    }
}
