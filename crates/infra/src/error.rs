//! Application service errors.

use thiserror::Error;

use inventrack_core::DomainError;

use crate::store::StoreError;

/// Failure of an application service call.
///
/// This is the only error the HTTP layer maps to statuses.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ServiceError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("insufficient stock for product {product_id}: available {available}, requested {requested}")]
    InsufficientStock {
        product_id: String,
        available: i64,
        requested: i64,
    },

    #[error("conflict: {0}")]
    Conflict(String),

    /// Row lock could not be acquired in time. Safe to retry.
    #[error("contention: {0}")]
    Contention(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, ServiceError::Contention(_))
    }
}

impl From<DomainError> for ServiceError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::Validation(msg) | DomainError::InvalidId(msg) => ServiceError::Validation(msg),
            DomainError::NotFound(msg) => ServiceError::NotFound(msg),
            DomainError::InsufficientStock {
                product_id,
                available,
                requested,
            } => ServiceError::InsufficientStock {
                product_id,
                available,
                requested,
            },
            DomainError::Conflict(msg) => ServiceError::Conflict(msg),
        }
    }
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Contention(msg) => ServiceError::Contention(msg),
            StoreError::Conflict(msg) => ServiceError::Conflict(msg),
            StoreError::Backend(msg) => ServiceError::Internal(msg),
        }
    }
}
