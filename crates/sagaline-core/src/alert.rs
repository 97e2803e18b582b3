// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Operator alerting for stuck compensations.
//!
//! A compensation that exhausts its retry budget leaves the saga
//! partially compensated. That condition is never dropped silently; it is
//! pushed through [`Alerter`] to whatever operator-visible channel the
//! embedder wires in (paging, ticketing, dead-letter topic).

use chrono::{DateTime, Utc};
use tracing::error;

/// Details of a compensation that could not be applied.
#[derive(Debug, Clone)]
pub struct CompensationAlert {
    /// The saga instance left in an inconsistent state.
    pub saga_id: String,
    /// Zero-based index of the step whose compensation failed.
    pub step_index: usize,
    /// Name of the step.
    pub step_name: String,
    /// Number of attempts made before giving up.
    pub attempts: u32,
    /// The final attempt's error.
    pub reason: String,
    /// When the retry budget was exhausted.
    pub created_at: DateTime<Utc>,
}

/// Operator-visible escalation channel.
pub trait Alerter: Send + Sync {
    /// Surface a stuck compensation to an operator.
    fn alert(&self, alert: &CompensationAlert);
}

/// Default alerter that escalates through the tracing error stream.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAlerter;

impl Alerter for TracingAlerter {
    fn alert(&self, alert: &CompensationAlert) {
        error!(
            saga_id = %alert.saga_id,
            step_index = alert.step_index,
            step_name = %alert.step_name,
            attempts = alert.attempts,
            reason = %alert.reason,
            "Compensation exhausted its retry budget, saga left partially compensated"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracing_alerter_does_not_panic() {
        let alerter = TracingAlerter;
        alerter.alert(&CompensationAlert {
            saga_id: "s-1".to_string(),
            step_index: 2,
            step_name: "charge-card".to_string(),
            attempts: 5,
            reason: "connection refused".to_string(),
            created_at: Utc::now(),
        });
    }
}
