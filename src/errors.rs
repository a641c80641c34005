use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

use crate::types::{Currency, LoanType};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum OfferError {
    #[error("invalid {field}: {message}")]
    Validation {
        field: &'static str,
        message: String,
    },

    #[error("{entity} not found: {id}")]
    NotFound {
        entity: &'static str,
        id: Uuid,
    },

    #[error("{actor} may not act on {resource} {id}")]
    Forbidden {
        actor: Uuid,
        resource: &'static str,
        id: Uuid,
    },

    #[error("version conflict on {id}: expected {expected}, found {found}")]
    VersionConflict {
        id: Uuid,
        expected: u64,
        found: u64,
    },

    #[error("institution {institution_id} already holds offer {existing} for application {application_id}")]
    DuplicateOffer {
        institution_id: Uuid,
        application_id: Uuid,
        existing: Uuid,
    },

    #[error("no active rate card for institution {institution_id} ({loan_type}/{currency})")]
    NoActiveRateCard {
        institution_id: Uuid,
        loan_type: LoanType,
        currency: Currency,
    },

    #[error("override {field} = {value} outside [{min}, {max}]")]
    InvalidOverride {
        field: &'static str,
        value: Decimal,
        min: Decimal,
        max: Decimal,
    },

    #[error("offer {offer_id} expired at {expired_at}")]
    OfferExpired {
        offer_id: Uuid,
        expired_at: DateTime<Utc>,
    },

    #[error("invalid state: current {current}, expected {expected}")]
    InvalidState {
        current: String,
        expected: String,
    },

    #[error("rate limit exceeded for {caller}, retry in {retry_after_secs}s")]
    RateLimited {
        caller: String,
        retry_after_secs: u64,
    },

    #[error("calculation error: {message}")]
    CalculationError {
        message: String,
    },

    #[error("storage unavailable: {message}")]
    Storage {
        message: String,
    },
}

/// coarse classification used at the request boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Forbidden,
    Conflict,
    Precondition,
    Expired,
    RateLimited,
    Internal,
}

impl OfferError {
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        OfferError::Validation {
            field,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            OfferError::Validation { .. } | OfferError::InvalidOverride { .. } => ErrorKind::Validation,
            OfferError::NotFound { .. } => ErrorKind::NotFound,
            OfferError::Forbidden { .. } => ErrorKind::Forbidden,
            OfferError::VersionConflict { .. } | OfferError::DuplicateOffer { .. } => ErrorKind::Conflict,
            OfferError::NoActiveRateCard { .. } | OfferError::InvalidState { .. } => ErrorKind::Precondition,
            OfferError::OfferExpired { .. } => ErrorKind::Expired,
            OfferError::RateLimited { .. } => ErrorKind::RateLimited,
            OfferError::CalculationError { .. } | OfferError::Storage { .. } => ErrorKind::Internal,
        }
    }

    /// stable code for caller-facing rejections
    pub fn error_code(&self) -> &'static str {
        match self {
            OfferError::Validation { .. } => "VALIDATION_ERROR",
            OfferError::InvalidOverride { .. } => "INVALID_OVERRIDE",
            OfferError::NotFound { .. } => "NOT_FOUND",
            OfferError::Forbidden { .. } => "FORBIDDEN",
            OfferError::VersionConflict { .. } | OfferError::DuplicateOffer { .. } => "CONFLICT",
            OfferError::NoActiveRateCard { .. } => "NO_ACTIVE_RATE_CARD",
            OfferError::OfferExpired { .. } => "OFFER_EXPIRED",
            OfferError::InvalidState { .. } => "INVALID_STATE",
            OfferError::RateLimited { .. } => "TOO_MANY_REQUESTS",
            OfferError::CalculationError { .. } => "CALCULATION_ERROR",
            OfferError::Storage { .. } => "STORAGE_UNAVAILABLE",
        }
    }

    /// http-equivalent status
    pub fn status_code(&self) -> u16 {
        match self.kind() {
            ErrorKind::Validation => 400,
            ErrorKind::Forbidden => 403,
            ErrorKind::NotFound => 404,
            ErrorKind::Conflict => 409,
            ErrorKind::Expired => 410,
            ErrorKind::Precondition => 422,
            ErrorKind::RateLimited => 429,
            ErrorKind::Internal => 500,
        }
    }

    pub fn is_conflict(&self) -> bool {
        self.kind() == ErrorKind::Conflict
    }
}

/// failures reported by storage adapters
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RepositoryError {
    #[error("stale write on {id}: expected version {expected}, stored {found}")]
    VersionConflict { id: Uuid, expected: u64, found: u64 },

    #[error("active offer {existing} already exists for institution {institution_id} and application {application_id}")]
    DuplicateActive {
        institution_id: Uuid,
        application_id: Uuid,
        existing: Uuid,
    },

    #[error("record not found: {id}")]
    NotFound { id: Uuid },

    #[error("record {id} is closed and cannot change")]
    Immutable { id: Uuid },

    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

impl From<RepositoryError> for OfferError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::VersionConflict { id, expected, found } => {
                OfferError::VersionConflict { id, expected, found }
            }
            RepositoryError::DuplicateActive {
                institution_id,
                application_id,
                existing,
            } => OfferError::DuplicateOffer {
                institution_id,
                application_id,
                existing,
            },
            RepositoryError::NotFound { id } => OfferError::NotFound { entity: "record", id },
            RepositoryError::Immutable { id } => OfferError::InvalidState {
                current: format!("{id} closed"),
                expected: "open record".to_string(),
            },
            RepositoryError::Unavailable(message) => OfferError::Storage { message },
        }
    }
}

pub type Result<T> = std::result::Result<T, OfferError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let id = Uuid::new_v4();
        assert_eq!(OfferError::NotFound { entity: "offer", id }.error_code(), "NOT_FOUND");
        assert_eq!(OfferError::validation("reason", "too long").error_code(), "VALIDATION_ERROR");
        assert_eq!(
            OfferError::RateLimited { caller: "ip".into(), retry_after_secs: 1 }.error_code(),
            "TOO_MANY_REQUESTS"
        );
    }

    #[test]
    fn test_expired_is_distinct_from_not_found() {
        let id = Uuid::new_v4();
        let expired = OfferError::OfferExpired { offer_id: id, expired_at: Utc::now() };
        let missing = OfferError::NotFound { entity: "offer", id };
        assert_eq!(expired.status_code(), 410);
        assert_eq!(missing.status_code(), 404);
        assert_ne!(expired.error_code(), missing.error_code());
    }

    #[test]
    fn test_repository_conflicts_map_to_conflict_kind() {
        let id = Uuid::new_v4();
        let err: OfferError = RepositoryError::VersionConflict { id, expected: 1, found: 2 }.into();
        assert!(err.is_conflict());
        assert_eq!(err.status_code(), 409);

        let err: OfferError = RepositoryError::Unavailable("down".into()).into();
        assert_eq!(err.kind(), ErrorKind::Internal);
    }
}
