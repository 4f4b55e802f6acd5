//! Application-level error taxonomy.
//!
//! `Err` means nothing was committed. Side effects that fail after a commit
//! are reported as [`Warning`]s on the successful result instead.

use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;

use galley_core::DomainError;
use galley_infra::{DispatchError, LockError};
use galley_purchasing::LinkError;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProcurementError {
    #[error("validation failed: {0}")]
    Validation(String),

    /// Business-state conflict, including stale-version concurrency and lock timeouts.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("insufficient stock: requested {requested}, available {available}")]
    InsufficientStock { requested: Decimal, available: Decimal },

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("storage failure: {0}")]
    Storage(String),
}

impl ProcurementError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    /// Stable machine-readable code, used for warnings and bulk results.
    pub fn code(&self) -> &'static str {
        match self {
            ProcurementError::Validation(_) => "validation",
            ProcurementError::Conflict(_) => "conflict",
            ProcurementError::NotFound(_) => "not_found",
            ProcurementError::InsufficientStock { .. } => "insufficient_stock",
            ProcurementError::Forbidden(_) => "forbidden",
            ProcurementError::Storage(_) => "storage",
        }
    }
}

impl From<DispatchError> for ProcurementError {
    fn from(value: DispatchError) -> Self {
        match value {
            DispatchError::Validation(msg) | DispatchError::InvariantViolation(msg) => {
                ProcurementError::Validation(msg)
            }
            DispatchError::Conflict(msg) | DispatchError::Concurrency(msg) => {
                ProcurementError::Conflict(msg)
            }
            DispatchError::NotFound(what) => ProcurementError::NotFound(what),
            DispatchError::InsufficientStock { requested, available } => {
                ProcurementError::InsufficientStock { requested, available }
            }
            DispatchError::TenantIsolation(msg) => ProcurementError::Forbidden(msg),
            DispatchError::Deserialize(msg) => ProcurementError::Storage(msg),
            DispatchError::Store(err) => ProcurementError::Storage(err.to_string()),
        }
    }
}

impl From<DomainError> for ProcurementError {
    fn from(value: DomainError) -> Self {
        DispatchError::from(value).into()
    }
}

impl From<LockError> for ProcurementError {
    fn from(value: LockError) -> Self {
        match value {
            LockError::Timeout(_) => ProcurementError::Conflict(value.to_string()),
            LockError::Poisoned => ProcurementError::Storage(value.to_string()),
        }
    }
}

impl From<LinkError> for ProcurementError {
    fn from(value: LinkError) -> Self {
        ProcurementError::Forbidden(value.to_string())
    }
}

/// Non-fatal problem attached to a successful result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Warning {
    pub code: String,
    pub message: String,
}

impl Warning {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use galley_infra::EventStoreError;

    #[test]
    fn stale_versions_surface_as_conflicts() {
        let err: ProcurementError = DispatchError::from(EventStoreError::Concurrency("v3".into())).into();
        assert!(matches!(err, ProcurementError::Conflict(_)));
        assert_eq!(err.code(), "conflict");
    }

    #[test]
    fn domain_overflow_is_a_validation_failure() {
        let err: ProcurementError = DomainError::validation("amount out of range").into();
        assert_eq!(err, ProcurementError::validation("amount out of range"));
    }

    #[test]
    fn link_failures_are_forbidden() {
        let err: ProcurementError = LinkError::InvalidSignature.into();
        assert!(matches!(err, ProcurementError::Forbidden(_)));
    }
}
