// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Compensation execution for saga rollback.
//!
//! When a forward step fails, previously succeeded steps are undone in
//! reverse order. Each compensating action is retried with jittered
//! exponential backoff and never skipped; exhausting the retry budget
//! escalates through the alerting channel and fails the rollback for
//! that step.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, instrument, warn};

use crate::alert::{Alerter, CompensationAlert};
use crate::backoff::calculate_backoff;
use crate::config::CompensationRetryConfig;
use crate::error::{CoreError, Result};
use crate::executor::CallExecutor;
use crate::registry::{ActionDirection, StepDefinition};
use crate::saga::StepOutcome;
use crate::transport::ActionRequest;

/// Applies compensating actions with bounded retry.
pub struct CompensationRunner {
    executor: Arc<CallExecutor>,
    config: CompensationRetryConfig,
    default_timeout: Duration,
    alerter: Arc<dyn Alerter>,
}

impl std::fmt::Debug for CompensationRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompensationRunner")
            .field("config", &self.config)
            .field("default_timeout", &self.default_timeout)
            .finish()
    }
}

impl CompensationRunner {
    /// Create a runner over the given executor and retry policy.
    pub fn new(
        executor: Arc<CallExecutor>,
        config: CompensationRetryConfig,
        default_timeout: Duration,
        alerter: Arc<dyn Alerter>,
    ) -> Self {
        Self {
            executor,
            config,
            default_timeout,
            alerter,
        }
    }

    /// Apply the compensating action for one step.
    ///
    /// Returns the number of attempts on success; zero means the step has
    /// no compensating action and there was nothing to undo.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::CompensationFailed`] once the retry budget is
    /// exhausted. The condition is alerted before returning.
    #[instrument(skip(self, step), fields(saga_id = %saga_id, step_index, step = %step.name))]
    pub async fn compensate_step(
        &self,
        saga_id: &str,
        step_index: usize,
        step: &StepDefinition,
    ) -> Result<u32> {
        let Some(compensation) = &step.compensation else {
            debug!("Step has no compensating action, nothing to undo");
            return Ok(0);
        };

        let request = ActionRequest {
            action: compensation.action.clone(),
            payload: compensation.payload.clone(),
            idempotency_key: step.idempotency_key(saga_id, step_index, ActionDirection::Compensate),
        };
        let timeout = step.timeout.unwrap_or(self.default_timeout);

        let mut last_error: Option<CoreError> = None;
        for attempt in 1..=self.config.max_attempts {
            let delay = calculate_backoff(
                attempt - 1,
                self.config.base_backoff,
                self.config.max_backoff,
            );
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            match self
                .executor
                .execute(&step.dependency, &request, timeout)
                .await
            {
                Ok(_) => {
                    debug!(attempt, "Compensation applied");
                    return Ok(attempt);
                }
                Err(err) => {
                    warn!(attempt, error = %err, "Compensation attempt failed");
                    last_error = Some(err);
                }
            }
        }

        let reason = last_error
            .map(|err| err.to_string())
            .unwrap_or_else(|| "unknown".to_string());

        self.alerter.alert(&CompensationAlert {
            saga_id: saga_id.to_string(),
            step_index,
            step_name: step.name.clone(),
            attempts: self.config.max_attempts,
            reason: reason.clone(),
            created_at: Utc::now(),
        });

        Err(CoreError::CompensationFailed {
            saga_id: saga_id.to_string(),
            step_index,
            reason,
        })
    }
}

/// Aggregate compensation progress for an instance, for operator queries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompensationStatus {
    /// Steps that had succeeded and therefore needed compensation.
    pub total: usize,
    /// Steps whose compensation was applied.
    pub compensated: usize,
    /// Steps whose compensation exhausted its retry budget.
    pub stuck: usize,
}

impl CompensationStatus {
    /// Compute the summary from per-step outcomes.
    ///
    /// Steps still marked `Succeeded` while others are compensated are the
    /// stuck ones once rollback has finished.
    pub fn from_outcomes(outcomes: &[StepOutcome], failed_step: Option<usize>) -> Self {
        let Some(failed) = failed_step else {
            return Self {
                total: 0,
                compensated: 0,
                stuck: 0,
            };
        };

        let mut total = 0;
        let mut compensated = 0;
        let mut stuck = 0;
        for outcome in outcomes.iter().take(failed) {
            match outcome {
                StepOutcome::Compensated => {
                    total += 1;
                    compensated += 1;
                }
                StepOutcome::Succeeded => {
                    total += 1;
                    stuck += 1;
                }
                StepOutcome::Pending | StepOutcome::Failed => {}
            }
        }
        Self {
            total,
            compensated,
            stuck,
        }
    }
}
