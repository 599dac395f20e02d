use axum::{http::StatusCode, response::IntoResponse};
use serde_json::json;
use thiserror::Error;

use super::problem::ProblemDetails;
use crate::{identity::IdentityError, services::ChatServiceError};

pub type AppResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
#[error("{code}: {message}")]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
    details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn unauthenticated(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "unauthenticated", message)
    }

    pub fn forbidden(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, code, message)
    }

    pub fn not_found(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, code, message)
    }

    pub fn unprocessable(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNPROCESSABLE_ENTITY, code, message)
    }

    pub fn service_unavailable(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, code, message)
            .with_details(json!({ "retryable": true }))
    }

    pub fn internal_server_error(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", message)
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn code(&self) -> &'static str {
        self.code
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let mut problem = ProblemDetails::new(self.status, self.code, self.message);
        if let Some(details) = self.details {
            problem = problem.with_details(details);
        }
        problem.into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(value: anyhow::Error) -> Self {
        Self::internal_server_error(value.to_string())
    }
}

impl From<ChatServiceError> for ApiError {
    fn from(err: ChatServiceError) -> Self {
        let message = err.to_string();
        match err {
            ChatServiceError::Unauthenticated => Self::unauthenticated(message),
            ChatServiceError::SelfConversation => {
                Self::unprocessable("self_conversation", message)
            }
            ChatServiceError::InvalidParty => Self::unprocessable("invalid_party", message),
            ChatServiceError::EmptyMessage => Self::unprocessable("empty_message", message),
            ChatServiceError::NotParticipant(_) => Self::forbidden("not_participant", message),
            ChatServiceError::ConversationNotFound(_) => {
                Self::not_found("conversation_not_found", message)
            }
            ChatServiceError::ConversationCreation(_) => Self::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "conversation_creation_failed",
                message,
            ),
            ChatServiceError::TransientStore(_) => {
                Self::service_unavailable("store_unavailable", message)
            }
            ChatServiceError::Subscription(_) => {
                Self::service_unavailable("subscription_failed", message)
            }
        }
    }
}

impl From<IdentityError> for ApiError {
    fn from(err: IdentityError) -> Self {
        // A broken provider is indistinguishable from a missing identity.
        Self::unauthenticated(err.to_string())
    }
}
