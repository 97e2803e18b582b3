// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Dependency invocation transport seam.
//!
//! The transport owns connection pooling, TLS, and serialization; this
//! crate only hands it a dependency identity and a serialized action.
//! Implementations live outside the core; tests use scripted fakes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::breaker::DependencyId;

/// A serialized action to invoke against a dependency.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionRequest {
    /// Action name understood by the dependency (e.g. "reserve-stock").
    pub action: String,
    /// Opaque serialized payload.
    pub payload: Vec<u8>,
    /// Deterministic key so at-least-once delivery cannot double-apply.
    pub idempotency_key: String,
}

/// Response payload from a successful invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionResponse {
    /// Opaque serialized response body.
    pub payload: Vec<u8>,
}

/// How a transport failure relates to dependency health.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// Could not reach the dependency (connect/reset). Counts against the
    /// breaker.
    Connection,
    /// The dependency answered with a failure. Counts against the breaker.
    Dependency,
    /// The dependency rejected the request as malformed. Does not reflect
    /// dependency health and never feeds the breaker.
    Caller,
}

/// Classified transport failure.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{kind:?} error: {message}")]
pub struct TransportError {
    /// Failure classification.
    pub kind: TransportErrorKind,
    /// Human-readable details.
    pub message: String,
}

impl TransportError {
    /// A connection-level failure.
    pub fn connection(message: impl Into<String>) -> Self {
        Self {
            kind: TransportErrorKind::Connection,
            message: message.into(),
        }
    }

    /// A failure reported by the dependency itself.
    pub fn dependency(message: impl Into<String>) -> Self {
        Self {
            kind: TransportErrorKind::Dependency,
            message: message.into(),
        }
    }

    /// A caller-side rejection (malformed request).
    pub fn caller(message: impl Into<String>) -> Self {
        Self {
            kind: TransportErrorKind::Caller,
            message: message.into(),
        }
    }
}

/// Performs the actual network call for a dependency invocation.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Invoke `request` against `dependency`.
    ///
    /// Implementations must classify failures via [`TransportErrorKind`]
    /// so the executor can keep caller-side errors out of the breaker.
    async fn invoke(
        &self,
        dependency: &DependencyId,
        request: &ActionRequest,
    ) -> Result<ActionResponse, TransportError>;
}
