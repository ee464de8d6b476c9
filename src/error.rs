use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde::Serialize;
use thiserror::Error;

use crate::identity::Identifier;

#[derive(Error, Debug, PartialEq)]
pub enum ValidationError {
    #[error("'{0}' is required")]
    MissingField(&'static str),
    #[error("'{0}' is not a valid email address")]
    InvalidEmail(String),
    #[error("Amount must be greater than zero, got {0}")]
    NonPositiveAmount(f64),
    #[error("At least one participant is required")]
    NoParticipants,
    #[error("Identifier (email, mobile_number, or name) is required")]
    MissingIdentifier,
    #[error("Invalid page parameter")]
    InvalidPage,
    #[error("Invalid limit parameter")]
    InvalidLimit,
    #[error("Malformed request: {0}")]
    Malformed(String),
}

#[derive(Error, Debug, PartialEq)]
pub enum IdentityError {
    #[error("no user found with {0}")]
    NotFound(Identifier),
    #[error(
        "multiple users found with the name '{0}'. Please use email or mobile number to identify the user"
    )]
    Ambiguous(String),
}

#[derive(Error, Debug, PartialEq)]
pub enum SplitError {
    #[error("Invalid participant identifier '{key}': {reason}")]
    InvalidParticipant { key: String, reason: String },
    #[error("Invalid amount for user '{0}' in split_details")]
    InvalidAmount(String),
    #[error("{0}")]
    SplitMismatch(&'static str),
    #[error("Invalid split_type '{0}'")]
    InvalidPolicy(String),
    #[error("split_details required for {0} split")]
    SplitDetailsRequired(&'static str),
    #[error("split_details has no entry for participant '{0}'")]
    MissingShare(String),
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("store operation '{0}' timed out")]
    Timeout(&'static str),
    #[error("Email or mobile number already exists")]
    DuplicateKey,
    #[error(transparent)]
    Backend(#[from] mongodb::error::Error),
    #[error("stored document is corrupt: {0}")]
    Corrupt(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Identity(#[from] IdentityError),
    #[error("{context}: {source}")]
    IdentityIn {
        context: String,
        #[source]
        source: IdentityError,
    },
    #[error(transparent)]
    Split(#[from] SplitError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    /// Attaches the role of the identifier that failed to resolve, e.g. the
    /// payer of an expense.
    pub fn identity_in(context: impl Into<String>, source: IdentityError) -> Self {
        ApiError::IdentityIn {
            context: context.into(),
            source,
        }
    }

    fn public_message(&self) -> String {
        match self {
            ApiError::Store(StoreError::DuplicateKey) => StoreError::DuplicateKey.to_string(),
            ApiError::Store(_) | ApiError::Internal(_) => {
                "Internal server error, please retry later".to_string()
            }
            other => other.to_string(),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Validation(_)
            | ApiError::Identity(_)
            | ApiError::IdentityIn { .. }
            | ApiError::Split(_)
            | ApiError::Store(StoreError::DuplicateKey) => StatusCode::BAD_REQUEST,
            ApiError::Store(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("request failed: {self}");
        } else {
            tracing::warn!("request rejected: {self}");
        }
        HttpResponse::build(status).json(ErrorBody {
            error: self.public_message(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_errors_are_bad_request() {
        let err = ApiError::from(IdentityError::Ambiguous("bob".to_string()));
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        let err = ApiError::from(SplitError::SplitMismatch(
            "Sum of percentages must be exactly 100%",
        ));
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        let err = ApiError::from(StoreError::DuplicateKey);
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.public_message(), "Email or mobile number already exists");
    }

    #[test]
    fn store_failures_do_not_leak_detail() {
        let err = ApiError::from(StoreError::Timeout("find users"));
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!err.public_message().contains("find users"));
    }

    #[test]
    fn identity_context_is_prefixed() {
        let err = ApiError::identity_in(
            "Invalid 'created_by' identifier",
            IdentityError::NotFound(Identifier::Email("z@x.com".to_string())),
        );
        assert_eq!(
            err.to_string(),
            "Invalid 'created_by' identifier: no user found with the given email"
        );
    }
}
