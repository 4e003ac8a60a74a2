//! The error type returned by every request handler.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use types_rs::univote::{ApiError, ErrorCode, ItemKind, Status, ValidationErrors};

use crate::store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{0}")]
    Validation(#[from] ValidationErrors),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("You are not eligible to vote in this {0}")]
    NotEligible(ItemKind),

    #[error("{0}")]
    NotFound(String),

    #[error("You have already voted in this {0}")]
    AlreadyVoted(ItemKind),

    #[error("This {kind} is {status}; votes are only accepted while it is active")]
    NotActive { kind: ItemKind, status: Status },

    #[error("Results for this {0} are available once it has closed")]
    ResultsUnavailable(ItemKind),

    #[error("Temporary failure, please try again")]
    Transient(#[source] StoreError),

    #[error("Internal server error")]
    Internal(#[source] StoreError),
}

impl From<StoreError> for Error {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::Corrupt(_) => Self::Internal(error),
            StoreError::Database(_) | StoreError::Unavailable(_) => Self::Transient(error),
        }
    }
}

impl Error {
    pub fn item_not_found(kind: ItemKind) -> Self {
        Self::NotFound(format!("No such {kind}"))
    }

    pub fn selection_not_found(kind: ItemKind) -> Self {
        Self::NotFound(format!("No such {} in this {kind}", kind.selection_noun()))
    }

    /// The machine-readable category sent to clients.
    pub const fn kind(&self) -> ErrorCode {
        match self {
            Self::Validation(_) => ErrorCode::Validation,
            Self::Unauthorized(_) => ErrorCode::Unauthorized,
            Self::Forbidden(_) => ErrorCode::Forbidden,
            Self::NotEligible(_) => ErrorCode::NotEligible,
            Self::NotFound(_) => ErrorCode::NotFound,
            Self::AlreadyVoted(_) => ErrorCode::AlreadyVoted,
            Self::NotActive { .. } => ErrorCode::NotActive,
            Self::ResultsUnavailable(_) => ErrorCode::ResultsUnavailable,
            Self::Transient(_) => ErrorCode::Transient,
            Self::Internal(_) => ErrorCode::Internal,
        }
    }

    pub const fn status_code(&self) -> StatusCode {
        match self.kind() {
            ErrorCode::Validation => StatusCode::BAD_REQUEST,
            ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorCode::Forbidden | ErrorCode::NotEligible => StatusCode::FORBIDDEN,
            ErrorCode::NotFound => StatusCode::NOT_FOUND,
            ErrorCode::AlreadyVoted => StatusCode::CONFLICT,
            ErrorCode::NotActive | ErrorCode::ResultsUnavailable => StatusCode::LOCKED,
            ErrorCode::Transient => StatusCode::SERVICE_UNAVAILABLE,
            ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();
        match &self {
            Self::Transient(source) | Self::Internal(source) => {
                tracing::error!("Responding with error: {status} {source}");
            }
            Self::AlreadyVoted(_) | Self::NotActive { .. } | Self::NotEligible(_) => {
                tracing::info!("Rejected vote: {status} {self}");
            }
            _ => {
                tracing::debug!("Responding with error: {status} {self}");
            }
        }

        let body = ApiError {
            error: self.to_string(),
            code: self.kind(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_status_codes_are_distinct_per_category() {
        assert_eq!(
            Error::AlreadyVoted(ItemKind::Election).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            Error::NotActive {
                kind: ItemKind::Poll,
                status: Status::Closed
            }
            .status_code(),
            StatusCode::LOCKED
        );
        assert_eq!(
            Error::Transient(StoreError::Unavailable("pool timed out".to_owned())).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            Error::item_not_found(ItemKind::Poll).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            Error::from(ValidationErrors::new("title", "Title is required")).status_code(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn test_messages() {
        assert_eq!(
            Error::AlreadyVoted(ItemKind::Election).to_string(),
            "You have already voted in this election"
        );
        assert_eq!(
            Error::NotActive {
                kind: ItemKind::Poll,
                status: Status::Scheduled
            }
            .to_string(),
            "This poll is scheduled; votes are only accepted while it is active"
        );
        assert_eq!(
            Error::selection_not_found(ItemKind::Election).to_string(),
            "No such candidate in this election"
        );
    }

    #[test]
    fn test_transient_is_the_only_retryable_kind() {
        let transient = Error::from(StoreError::Unavailable("pool timed out".to_owned()));
        assert_eq!(transient.kind(), ErrorCode::Transient);
        assert!(transient.kind().is_retryable());
        assert!(!Error::AlreadyVoted(ItemKind::Poll).kind().is_retryable());
    }

    #[test]
    fn test_corrupt_record_is_not_retryable() {
        let error = Error::from(StoreError::Corrupt("unknown role: owner".to_owned()));
        assert_eq!(error.kind(), ErrorCode::Internal);
        assert!(!error.kind().is_retryable());
        assert_eq!(error.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        // the stored value stays in the logs
        assert_eq!(error.to_string(), "Internal server error");
    }
}
