// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Saga coordinator: orchestrated multi-step transactions with rollback.
//!
//! One coordinator drives many saga instances; each instance executes its
//! step sequence on a single logical task and never shares mutable state
//! with other instances. The only shared resource is the circuit breaker
//! registry inside the call executor.
//!
//! # Instance State Machine
//!
//! ```text
//!                ┌─────────┐
//!                │ RUNNING │
//!                └────┬────┘
//!          all steps  │  any step fails
//!          succeed    │  (incl. timeout, open circuit, cancel)
//!        ┌────────────┴────────────┐
//!        ▼                         ▼
//!  ┌───────────┐           ┌──────────────┐
//!  │ COMPLETED │           │ COMPENSATING │
//!  └───────────┘           └──────┬───────┘
//!                                 │ reverse-order rollback
//!                                 ▼
//!                           ┌─────────┐
//!                           │ ABORTED │
//!                           └─────────┘
//! ```
//!
//! `COMPLETED` and `ABORTED` are immutable; a terminal instance is never
//! reprocessed.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::alert::Alerter;
use crate::compensation::{CompensationRunner, CompensationStatus};
use crate::config::Config;
use crate::error::{CoreError, Result};
use crate::events::{EventPublisher, SagaEvent, SagaEventType};
use crate::executor::CallExecutor;
use crate::persistence::{SagaEventRecord, SagaRecord, SagaStore};
use crate::registry::{ActionDirection, SagaDefinition, StepRegistry};
use crate::transport::ActionRequest;

/// Outcome of a single step within a saga instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// Not yet attempted.
    Pending,
    /// Forward action applied.
    Succeeded,
    /// Forward action failed; this step triggered compensation.
    Failed,
    /// Forward action was undone (or there was nothing to undo).
    Compensated,
}

impl StepOutcome {
    /// Returns the string representation of the outcome.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Compensated => "compensated",
        }
    }

    /// Parse an outcome from a string. Unknown strings default to pending.
    pub fn parse(s: &str) -> Self {
        match s {
            "succeeded" => Self::Succeeded,
            "failed" => Self::Failed,
            "compensated" => Self::Compensated,
            _ => Self::Pending,
        }
    }
}

/// Overall status of a saga instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SagaStatus {
    /// Forward steps are executing.
    Running,
    /// All steps succeeded. Terminal.
    Completed,
    /// A step failed; compensations are running in reverse order.
    Compensating,
    /// Rolled back. Terminal.
    Aborted,
}

impl SagaStatus {
    /// Returns the string representation of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Compensating => "compensating",
            Self::Aborted => "aborted",
        }
    }

    /// Parse a status from a string. Unknown strings default to running.
    pub fn parse(s: &str) -> Self {
        match s {
            "completed" => Self::Completed,
            "compensating" => Self::Compensating,
            "aborted" => Self::Aborted,
            _ => Self::Running,
        }
    }

    /// Whether this status is terminal and immutable.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Aborted)
    }
}

/// One in-progress distributed transaction.
///
/// Owned exclusively by the coordinator task driving it; never mutated
/// externally.
#[derive(Debug, Clone)]
pub struct SagaInstance {
    /// Unique identifier.
    pub saga_id: String,
    /// The definition this instance runs.
    pub definition: Arc<SagaDefinition>,
    /// Index of the next step to execute.
    pub current_step: usize,
    /// Per-step outcomes, indexed by step.
    pub outcomes: Vec<StepOutcome>,
    /// Overall status.
    pub status: SagaStatus,
    /// Index of the step whose failure triggered compensation.
    pub failed_step: Option<usize>,
    /// Error message from the failing step.
    pub error: Option<String>,
    /// Whether every compensation succeeded; None until rollback finishes.
    pub all_compensations_succeeded: Option<bool>,
    /// When the instance was created.
    pub created_at: DateTime<Utc>,
    /// When the instance reached a terminal status.
    pub finished_at: Option<DateTime<Utc>>,
}

impl SagaInstance {
    fn new(definition: Arc<SagaDefinition>) -> Self {
        let step_count = definition.steps.len();
        Self {
            saga_id: Uuid::new_v4().to_string(),
            definition,
            current_step: 0,
            outcomes: vec![StepOutcome::Pending; step_count],
            status: SagaStatus::Running,
            failed_step: None,
            error: None,
            all_compensations_succeeded: None,
            created_at: Utc::now(),
            finished_at: None,
        }
    }

    fn from_record(record: SagaRecord, definition: Arc<SagaDefinition>) -> Result<Self> {
        if record.step_outcomes.len() != definition.steps.len() {
            return Err(CoreError::ValidationError {
                field: "step_outcomes".to_string(),
                message: format!(
                    "record has {} outcomes but definition '{}' has {} steps",
                    record.step_outcomes.len(),
                    definition.name,
                    definition.steps.len()
                ),
            });
        }
        Ok(Self {
            saga_id: record.saga_id,
            definition,
            current_step: record.current_step,
            outcomes: record
                .step_outcomes
                .iter()
                .map(|s| StepOutcome::parse(s))
                .collect(),
            status: SagaStatus::parse(&record.status),
            failed_step: record.failed_step,
            error: record.error,
            all_compensations_succeeded: record.all_compensations_succeeded,
            created_at: record.created_at,
            finished_at: record.finished_at,
        })
    }

    fn to_record(&self) -> SagaRecord {
        SagaRecord {
            saga_id: self.saga_id.clone(),
            definition: self.definition.name.clone(),
            status: self.status.as_str().to_string(),
            current_step: self.current_step,
            step_outcomes: self
                .outcomes
                .iter()
                .map(|o| o.as_str().to_string())
                .collect(),
            failed_step: self.failed_step,
            all_compensations_succeeded: self.all_compensations_succeeded,
            error: self.error.clone(),
            created_at: self.created_at,
            finished_at: self.finished_at,
        }
    }

    fn report(&self) -> SagaReport {
        SagaReport {
            saga_id: self.saga_id.clone(),
            status: self.status,
            failed_step: self.failed_step.map(|index| FailedStep {
                index,
                name: self
                    .definition
                    .steps
                    .get(index)
                    .map(|s| s.name.clone())
                    .unwrap_or_default(),
                error: self.error.clone().unwrap_or_default(),
            }),
            all_compensations_succeeded: self.all_compensations_succeeded.unwrap_or(true),
        }
    }
}

/// The step whose failure aborted a saga.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedStep {
    /// Zero-based step index.
    pub index: usize,
    /// Step name from the definition.
    pub name: String,
    /// Error message from the failing call.
    pub error: String,
}

/// What callers receive when a saga finishes.
#[derive(Debug, Clone)]
pub struct SagaReport {
    /// The saga instance id.
    pub saga_id: String,
    /// Final status: `Completed` or `Aborted`.
    pub status: SagaStatus,
    /// The failing step, present on `Aborted`.
    pub failed_step: Option<FailedStep>,
    /// Whether every compensating action was applied. Always true on
    /// `Completed`; false means the saga needs operator attention.
    pub all_compensations_succeeded: bool,
}

/// Orchestrates saga instances over the call executor.
pub struct SagaCoordinator {
    registry: Arc<StepRegistry>,
    executor: Arc<CallExecutor>,
    runner: CompensationRunner,
    store: Arc<dyn SagaStore>,
    publisher: Arc<dyn EventPublisher>,
    default_timeout: Duration,
}

impl std::fmt::Debug for SagaCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SagaCoordinator")
            .field("registry", &self.registry)
            .field("default_timeout", &self.default_timeout)
            .finish()
    }
}

impl SagaCoordinator {
    /// Create a coordinator over the given collaborators.
    pub fn new(
        registry: Arc<StepRegistry>,
        executor: Arc<CallExecutor>,
        store: Arc<dyn SagaStore>,
        publisher: Arc<dyn EventPublisher>,
        alerter: Arc<dyn Alerter>,
        config: &Config,
    ) -> Self {
        let runner = CompensationRunner::new(
            executor.clone(),
            config.compensation.clone(),
            config.executor.default_timeout,
            alerter,
        );
        Self {
            registry,
            executor,
            runner,
            store,
            publisher,
            default_timeout: config.executor.default_timeout,
        }
    }

    /// Handle to the call executor (and through it, the breaker registry).
    pub fn executor(&self) -> &Arc<CallExecutor> {
        &self.executor
    }

    /// Start a new saga instance and drive it to a terminal status.
    #[instrument(skip(self), fields(definition = %definition_name))]
    pub async fn start(&self, definition_name: &str) -> Result<SagaReport> {
        let (_, rx) = watch::channel(false);
        self.start_with_cancel(definition_name, rx).await
    }

    /// Start a new saga instance with an external cancellation signal.
    ///
    /// Setting the watched value to `true` is treated as a failure of the
    /// current step: the instance takes the normal compensation path and
    /// never skips compensation of already-succeeded steps. Cancellation
    /// is observed at step boundaries, so an in-flight call first runs to
    /// its own deadline.
    #[instrument(skip(self, cancel), fields(definition = %definition_name))]
    pub async fn start_with_cancel(
        &self,
        definition_name: &str,
        cancel: watch::Receiver<bool>,
    ) -> Result<SagaReport> {
        let definition = self.registry.get(definition_name)?;
        let mut instance = SagaInstance::new(definition);

        info!(saga_id = %instance.saga_id, "Saga started");
        self.persist(&instance).await?;
        self.emit(&instance, SagaEventType::Started, None, None).await;

        self.drive(&mut instance, cancel).await
    }

    /// Resume a saga instance from the store, e.g. after a crash.
    ///
    /// Steps already recorded as succeeded are not re-applied; execution
    /// continues from the first incomplete step. A terminal instance is
    /// not reprocessed: its stored report is returned as-is.
    #[instrument(skip(self), fields(saga_id = %saga_id))]
    pub async fn resume(&self, saga_id: &str) -> Result<SagaReport> {
        let record = self
            .store
            .load_instance(saga_id)
            .await?
            .ok_or_else(|| CoreError::SagaNotFound {
                saga_id: saga_id.to_string(),
            })?;

        let definition = self.registry.get(&record.definition)?;
        let mut instance = SagaInstance::from_record(record, definition)?;

        if instance.status.is_terminal() {
            debug!(status = instance.status.as_str(), "Instance is terminal, not reprocessing");
            return Ok(instance.report());
        }

        info!(status = instance.status.as_str(), "Resuming saga");
        if instance.status == SagaStatus::Compensating {
            return self.compensate(&mut instance).await;
        }

        let (_, rx) = watch::channel(false);
        self.drive(&mut instance, rx).await
    }

    /// Current stored state of an instance.
    pub async fn status(&self, saga_id: &str) -> Result<SagaRecord> {
        self.store
            .load_instance(saga_id)
            .await?
            .ok_or_else(|| CoreError::SagaNotFound {
                saga_id: saga_id.to_string(),
            })
    }

    /// Compensation progress summary for an instance.
    pub async fn compensation_status(&self, saga_id: &str) -> Result<CompensationStatus> {
        let record = self.status(saga_id).await?;
        let outcomes: Vec<StepOutcome> = record
            .step_outcomes
            .iter()
            .map(|s| StepOutcome::parse(s))
            .collect();
        Ok(CompensationStatus::from_outcomes(
            &outcomes,
            record.failed_step,
        ))
    }

    /// Execute forward steps strictly in order.
    async fn drive(
        &self,
        instance: &mut SagaInstance,
        cancel: watch::Receiver<bool>,
    ) -> Result<SagaReport> {
        let step_count = instance.definition.steps.len();

        while instance.current_step < step_count {
            let index = instance.current_step;

            // Resume: skip steps the store already recorded as applied
            if instance.outcomes[index] == StepOutcome::Succeeded {
                instance.current_step += 1;
                continue;
            }

            // External cancellation fails the current step
            if *cancel.borrow() {
                info!(saga_id = %instance.saga_id, step = index, "Saga cancelled");
                return self
                    .fail_step(instance, index, "cancelled by caller".to_string())
                    .await;
            }

            let step = instance.definition.steps[index].clone();
            let key = step.idempotency_key(&instance.saga_id, index, ActionDirection::Forward);
            let request = ActionRequest {
                action: step.forward.action.clone(),
                payload: step.forward.payload.clone(),
                idempotency_key: key.clone(),
            };
            let timeout = step.timeout.unwrap_or(self.default_timeout);

            match self.executor.execute(&step.dependency, &request, timeout).await {
                Ok(_) => {
                    debug!(saga_id = %instance.saga_id, step = index, "Step succeeded");
                    instance.outcomes[index] = StepOutcome::Succeeded;
                    instance.current_step = index + 1;
                    self.persist(instance).await?;
                    self.emit(instance, SagaEventType::StepSucceeded, Some(index), Some(key))
                        .await;
                }
                Err(err) => {
                    warn!(
                        saga_id = %instance.saga_id,
                        step = index,
                        error_code = err.error_code(),
                        "Step failed, starting compensation"
                    );
                    return self.fail_step(instance, index, err.to_string()).await;
                }
            }
        }

        instance.status = SagaStatus::Completed;
        instance.finished_at = Some(Utc::now());
        self.persist(instance).await?;
        self.emit(instance, SagaEventType::Completed, None, None).await;
        info!(saga_id = %instance.saga_id, "Saga completed");

        Ok(instance.report())
    }

    /// Record a step failure and run the compensation path.
    async fn fail_step(
        &self,
        instance: &mut SagaInstance,
        index: usize,
        error: String,
    ) -> Result<SagaReport> {
        instance.outcomes[index] = StepOutcome::Failed;
        instance.failed_step = Some(index);
        instance.error = Some(error);
        instance.status = SagaStatus::Compensating;
        self.persist(instance).await?;
        self.emit(instance, SagaEventType::StepFailed, Some(index), None)
            .await;

        self.compensate(instance).await
    }

    /// Undo previously succeeded steps in strict reverse order.
    ///
    /// A compensation that exhausts its retry budget is alerted and left
    /// for an operator, but earlier steps are still compensated.
    async fn compensate(&self, instance: &mut SagaInstance) -> Result<SagaReport> {
        let failed_index = instance.failed_step.unwrap_or(instance.current_step);
        let mut all_succeeded = true;

        for index in (0..failed_index).rev() {
            if instance.outcomes[index] != StepOutcome::Succeeded {
                continue;
            }
            let step = instance.definition.steps[index].clone();
            match self
                .runner
                .compensate_step(&instance.saga_id, index, &step)
                .await
            {
                Ok(_) => {
                    instance.outcomes[index] = StepOutcome::Compensated;
                    self.persist(instance).await?;
                    let key =
                        step.idempotency_key(&instance.saga_id, index, ActionDirection::Compensate);
                    self.emit(
                        instance,
                        SagaEventType::StepCompensated,
                        Some(index),
                        Some(key),
                    )
                    .await;
                }
                Err(err) => {
                    // Already alerted by the runner; the step stays applied
                    all_succeeded = false;
                    warn!(
                        saga_id = %instance.saga_id,
                        step = index,
                        error = %err,
                        "Compensation stuck, continuing rollback of earlier steps"
                    );
                    self.emit(instance, SagaEventType::CompensationFailed, Some(index), None)
                        .await;
                }
            }
        }

        instance.status = SagaStatus::Aborted;
        instance.all_compensations_succeeded = Some(all_succeeded);
        instance.finished_at = Some(Utc::now());
        self.persist(instance).await?;
        self.emit(instance, SagaEventType::Aborted, None, None).await;
        info!(
            saga_id = %instance.saga_id,
            all_compensations_succeeded = all_succeeded,
            "Saga aborted"
        );

        Ok(instance.report())
    }

    async fn persist(&self, instance: &SagaInstance) -> Result<()> {
        self.store.save_instance(&instance.to_record()).await
    }

    /// Record and publish a lifecycle event.
    ///
    /// Event trouble never fails the saga itself.
    async fn emit(
        &self,
        instance: &SagaInstance,
        event_type: SagaEventType,
        step_index: Option<usize>,
        idempotency_key: Option<String>,
    ) {
        let created_at = Utc::now();

        let record = SagaEventRecord {
            saga_id: instance.saga_id.clone(),
            event_type: event_type.as_str().to_string(),
            step_index,
            created_at,
        };
        if let Err(err) = self.store.insert_event(&record).await {
            warn!(saga_id = %instance.saga_id, error = %err, "Failed to record saga event");
        }

        let event = SagaEvent {
            saga_id: instance.saga_id.clone(),
            definition: instance.definition.name.clone(),
            event_type,
            step_index,
            step_name: step_index
                .and_then(|i| instance.definition.steps.get(i))
                .map(|s| s.name.clone()),
            idempotency_key,
            created_at,
        };
        if let Err(err) = self.publisher.publish(&event).await {
            warn!(saga_id = %instance.saga_id, error = %err, "Failed to publish saga event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{ActionDescriptor, StepDefinition};

    fn definition() -> Arc<SagaDefinition> {
        Arc::new(
            SagaDefinition::new(
                "order",
                vec![
                    StepDefinition::new(
                        "reserve",
                        "inventory",
                        ActionDescriptor::new("reserve", b"{}".to_vec()),
                        ActionDescriptor::new("release", b"{}".to_vec()),
                    ),
                    StepDefinition::new(
                        "charge",
                        "payments",
                        ActionDescriptor::new("charge", b"{}".to_vec()),
                        ActionDescriptor::new("refund", b"{}".to_vec()),
                    ),
                ],
            )
            .unwrap(),
        )
    }

    #[test]
    fn test_outcome_roundtrip() {
        for outcome in [
            StepOutcome::Pending,
            StepOutcome::Succeeded,
            StepOutcome::Failed,
            StepOutcome::Compensated,
        ] {
            assert_eq!(StepOutcome::parse(outcome.as_str()), outcome);
        }
        assert_eq!(StepOutcome::parse("bogus"), StepOutcome::Pending);
    }

    #[test]
    fn test_status_roundtrip_and_terminality() {
        for status in [
            SagaStatus::Running,
            SagaStatus::Completed,
            SagaStatus::Compensating,
            SagaStatus::Aborted,
        ] {
            assert_eq!(SagaStatus::parse(status.as_str()), status);
        }
        assert!(SagaStatus::Completed.is_terminal());
        assert!(SagaStatus::Aborted.is_terminal());
        assert!(!SagaStatus::Running.is_terminal());
        assert!(!SagaStatus::Compensating.is_terminal());
    }

    #[test]
    fn test_instance_record_roundtrip() {
        let mut instance = SagaInstance::new(definition());
        instance.outcomes[0] = StepOutcome::Succeeded;
        instance.current_step = 1;

        let record = instance.to_record();
        assert_eq!(record.status, "running");
        assert_eq!(record.step_outcomes, vec!["succeeded", "pending"]);

        let restored = SagaInstance::from_record(record, definition()).unwrap();
        assert_eq!(restored.saga_id, instance.saga_id);
        assert_eq!(restored.current_step, 1);
        assert_eq!(restored.outcomes[0], StepOutcome::Succeeded);
        assert_eq!(restored.outcomes[1], StepOutcome::Pending);
    }

    #[test]
    fn test_from_record_rejects_step_count_mismatch() {
        let instance = SagaInstance::new(definition());
        let mut record = instance.to_record();
        record.step_outcomes.push("pending".to_string());

        let err = SagaInstance::from_record(record, definition()).unwrap_err();
        assert_eq!(err.error_code(), "VALIDATION_ERROR");
    }

    #[test]
    fn test_report_carries_failing_step() {
        let mut instance = SagaInstance::new(definition());
        instance.outcomes[0] = StepOutcome::Compensated;
        instance.outcomes[1] = StepOutcome::Failed;
        instance.failed_step = Some(1);
        instance.error = Some("payments down".to_string());
        instance.status = SagaStatus::Aborted;
        instance.all_compensations_succeeded = Some(true);

        let report = instance.report();
        assert_eq!(report.status, SagaStatus::Aborted);
        let failed = report.failed_step.unwrap();
        assert_eq!(failed.index, 1);
        assert_eq!(failed.name, "charge");
        assert_eq!(failed.error, "payments down");
        assert!(report.all_compensations_succeeded);
    }
}
