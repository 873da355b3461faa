use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::ranking::CapacityExceeded;

/// Application-level errors
#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Not allowed: {0}")]
    Forbidden(String),

    #[error("Not possible right now: {0}")]
    InvalidState(String),

    #[error("Preferences were already submitted for this party")]
    AlreadySubmitted,

    #[error("Swiping was already completed for this party")]
    AlreadyCompleted,

    #[error("User {0} is already a member of this party")]
    AlreadyMember(String),

    #[error("Unknown candidate: {0}")]
    UnknownCandidate(String),

    #[error("Recommendations unavailable, try again: {0}")]
    RecommendationUnavailable(String),

    #[error("Track metadata unavailable, try again: {0}")]
    MetadataUnavailable(String),

    #[error(transparent)]
    CapacityExceeded(#[from] CapacityExceeded),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Cache error: {0}")]
    Cache(#[from] redis::RedisError),

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    /// Coarse category reported to clients next to the message, so a UI can
    /// tell "you may not" apart from "not now" and "retry later".
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "invalid",
            AppError::Forbidden(_) => "not_allowed",
            AppError::InvalidState(_)
            | AppError::AlreadySubmitted
            | AppError::AlreadyCompleted
            | AppError::AlreadyMember(_)
            | AppError::UnknownCandidate(_) => "conflict",
            AppError::RecommendationUnavailable(_)
            | AppError::MetadataUnavailable(_)
            | AppError::HttpClient(_) => "external",
            AppError::NotFound(_) => "not_found",
            AppError::CapacityExceeded(_)
            | AppError::Database(_)
            | AppError::Cache(_)
            | AppError::Internal(_) => "internal",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::InvalidState(_)
            | AppError::AlreadySubmitted
            | AppError::AlreadyCompleted
            | AppError::AlreadyMember(_) => StatusCode::CONFLICT,
            AppError::UnknownCandidate(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::RecommendationUnavailable(_)
            | AppError::MetadataUnavailable(_)
            | AppError::HttpClient(_) => StatusCode::BAD_GATEWAY,
            AppError::CapacityExceeded(_)
            | AppError::Database(_)
            | AppError::Cache(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }

        let body = Json(json!({
            "error": self.to_string(),
            "kind": self.kind(),
        }));

        (status, body).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
