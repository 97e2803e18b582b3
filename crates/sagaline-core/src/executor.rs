// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Call executor: breaker-gated, deadline-enforced dependency invocation.
//!
//! Every outbound call flows through [`CallExecutor::execute`], which
//! checks the dependency's circuit breaker, drives the transport under a
//! deadline, and reports the outcome back to the breaker exactly once.
//! There is no internal retry; retry policy is an explicit wrapper chosen
//! by the caller.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, instrument, warn};

use crate::breaker::{BreakerRegistry, DependencyId};
use crate::error::{CoreError, Result};
use crate::transport::{ActionRequest, ActionResponse, Transport, TransportErrorKind};

/// Executes single dependency calls with breaker gating and timeouts.
pub struct CallExecutor {
    breakers: Arc<BreakerRegistry>,
    transport: Arc<dyn Transport>,
}

impl std::fmt::Debug for CallExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallExecutor")
            .field("breakers", &self.breakers)
            .field("transport", &"...")
            .finish()
    }
}

impl CallExecutor {
    /// Create an executor over the given breaker registry and transport.
    pub fn new(breakers: Arc<BreakerRegistry>, transport: Arc<dyn Transport>) -> Self {
        Self {
            breakers,
            transport,
        }
    }

    /// Handle to the breaker registry, shared across saga instances.
    pub fn breakers(&self) -> &Arc<BreakerRegistry> {
        &self.breakers
    }

    /// Invoke `request` against `dependency` under `timeout`.
    ///
    /// # Errors
    ///
    /// - [`CoreError::CircuitOpen`] if the breaker denies the call; no
    ///   network attempt is made.
    /// - [`CoreError::Timeout`] if the deadline expires; the in-flight
    ///   attempt is cancelled and no partial response is returned.
    /// - [`CoreError::DependencyError`] for connection errors and failures
    ///   reported by the dependency.
    /// - [`CoreError::InvalidAction`] for caller-side rejections; these do
    ///   not count against the breaker.
    #[instrument(skip(self, request), fields(dependency = %dependency, action = %request.action))]
    pub async fn execute(
        &self,
        dependency: &DependencyId,
        request: &ActionRequest,
        timeout: Duration,
    ) -> Result<ActionResponse> {
        // 1. Gate on the breaker before touching the network
        let breaker = self.breakers.breaker(dependency);
        let Some(permit) = breaker.try_acquire() else {
            debug!("Breaker denied call, failing fast");
            return Err(CoreError::CircuitOpen {
                dependency: dependency.to_string(),
            });
        };

        // 2. Drive the transport under the deadline, holding the permit
        //    across the await. Dropping the future on expiry cancels the
        //    in-flight attempt; dropping this whole call (task abort,
        //    outer timeout) drops the permit and frees its trial slot.
        let outcome =
            tokio::time::timeout(timeout, self.transport.invoke(dependency, request)).await;

        // 3. Report to the breaker exactly once, then return to the caller
        let err = match outcome {
            Ok(Ok(response)) => {
                permit.record_success();
                return Ok(response);
            }
            Ok(Err(err)) => match err.kind {
                TransportErrorKind::Caller => CoreError::InvalidAction {
                    dependency: dependency.to_string(),
                    message: err.message,
                },
                TransportErrorKind::Connection | TransportErrorKind::Dependency => {
                    CoreError::DependencyError {
                        dependency: dependency.to_string(),
                        message: err.message,
                    }
                }
            },
            Err(_elapsed) => {
                warn!(timeout_ms = timeout.as_millis() as u64, "Call timed out");
                CoreError::Timeout {
                    dependency: dependency.to_string(),
                    timeout_ms: timeout.as_millis() as u64,
                }
            }
        };

        // A caller-side rejection proves the dependency is answering, so
        // it resolves the permit as a success; the call still fails.
        if err.counts_as_breaker_failure() {
            permit.record_failure();
        } else {
            permit.record_success();
        }
        Err(err)
    }
}
