// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for sagaline-core.
//!
//! Provides a unified error type covering call-level failures (timeout,
//! open circuit, dependency errors) and saga-level failures (compensation
//! exhaustion, unknown instances, store errors).

use std::fmt;

/// Result type using CoreError
pub type Result<T> = std::result::Result<T, CoreError>;

/// Core errors that can occur while executing calls and sagas.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum CoreError {
    /// The circuit breaker for the dependency denied the call.
    ///
    /// No network attempt was made.
    CircuitOpen {
        /// The dependency whose breaker is open.
        dependency: String,
    },

    /// The call exceeded its deadline and the in-flight attempt was cancelled.
    Timeout {
        /// The dependency that timed out.
        dependency: String,
        /// The enforced deadline in milliseconds.
        timeout_ms: u64,
    },

    /// The dependency itself reported a failure (or was unreachable).
    DependencyError {
        /// The dependency that failed.
        dependency: String,
        /// Error details from the transport.
        message: String,
    },

    /// The request was rejected as malformed by the dependency.
    ///
    /// Caller-side errors do not reflect dependency health and are never
    /// counted as breaker failures.
    InvalidAction {
        /// The dependency that rejected the request.
        dependency: String,
        /// Rejection details.
        message: String,
    },

    /// A compensating action could not be applied within its retry budget.
    ///
    /// The saga is left partially compensated; this condition is always
    /// escalated through the alerting collaborator.
    CompensationFailed {
        /// The saga instance that is stuck.
        saga_id: String,
        /// Zero-based index of the step whose compensation failed.
        step_index: usize,
        /// The reason the final attempt failed.
        reason: String,
    },

    /// Saga instance was not found in the store.
    SagaNotFound {
        /// The saga instance ID that was not found.
        saga_id: String,
    },

    /// No saga definition is registered under the given name.
    UnknownDefinition {
        /// The definition name that was looked up.
        name: String,
    },

    /// Input validation failed.
    ValidationError {
        /// The field that failed validation.
        field: String,
        /// The validation error message.
        message: String,
    },

    /// Store operation failed.
    StoreError {
        /// The operation that failed.
        operation: String,
        /// Error details.
        details: String,
    },
}

impl CoreError {
    /// Get the error code string for this error type.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::CircuitOpen { .. } => "CIRCUIT_OPEN",
            Self::Timeout { .. } => "TIMEOUT",
            Self::DependencyError { .. } => "DEPENDENCY_ERROR",
            Self::InvalidAction { .. } => "INVALID_ACTION",
            Self::CompensationFailed { .. } => "COMPENSATION_FAILED",
            Self::SagaNotFound { .. } => "SAGA_NOT_FOUND",
            Self::UnknownDefinition { .. } => "UNKNOWN_DEFINITION",
            Self::ValidationError { .. } => "VALIDATION_ERROR",
            Self::StoreError { .. } => "STORE_ERROR",
        }
    }

    /// Whether this error counts as a failure against the dependency's
    /// circuit breaker.
    ///
    /// Only errors that reflect dependency health do: timeouts and
    /// dependency-reported failures. A denied call never reached the
    /// network, and a caller-side rejection proves the dependency is
    /// answering.
    pub fn counts_as_breaker_failure(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. } | Self::DependencyError { .. }
        )
    }
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CircuitOpen { dependency } => {
                write!(f, "Circuit open for dependency '{}'", dependency)
            }
            Self::Timeout {
                dependency,
                timeout_ms,
            } => {
                write!(
                    f,
                    "Call to dependency '{}' timed out after {}ms",
                    dependency, timeout_ms
                )
            }
            Self::DependencyError {
                dependency,
                message,
            } => {
                write!(f, "Dependency '{}' failed: {}", dependency, message)
            }
            Self::InvalidAction {
                dependency,
                message,
            } => {
                write!(
                    f,
                    "Dependency '{}' rejected the request: {}",
                    dependency, message
                )
            }
            Self::CompensationFailed {
                saga_id,
                step_index,
                reason,
            } => {
                write!(
                    f,
                    "Compensation for step {} of saga '{}' failed: {}",
                    step_index, saga_id, reason
                )
            }
            Self::SagaNotFound { saga_id } => {
                write!(f, "Saga '{}' not found", saga_id)
            }
            Self::UnknownDefinition { name } => {
                write!(f, "No saga definition registered under '{}'", name)
            }
            Self::ValidationError { field, message } => {
                write!(f, "Validation error for '{}': {}", field, message)
            }
            Self::StoreError { operation, details } => {
                write!(f, "Store error during '{}': {}", operation, details)
            }
        }
    }
}

impl std::error::Error for CoreError {}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::StoreError {
            operation: "json".to_string(),
            details: err.to_string(),
        }
    }
}
