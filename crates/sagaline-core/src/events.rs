// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Saga lifecycle events and the publication seam.
//!
//! Every status transition is emitted through [`EventPublisher`] so
//! choreographed consumers can react to saga progress. Delivery is
//! assumed at-least-once downstream; events carry the step's idempotency
//! key so repeated delivery cannot double-apply.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Kind of lifecycle event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SagaEventType {
    /// A saga instance started running.
    Started,
    /// A forward step succeeded.
    StepSucceeded,
    /// A forward step failed; compensation begins.
    StepFailed,
    /// A compensating action was applied.
    StepCompensated,
    /// A compensating action exhausted its retry budget.
    CompensationFailed,
    /// All steps succeeded.
    Completed,
    /// The saga was rolled back.
    Aborted,
}

impl SagaEventType {
    /// Returns the string representation of the event type.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Started => "started",
            Self::StepSucceeded => "step_succeeded",
            Self::StepFailed => "step_failed",
            Self::StepCompensated => "step_compensated",
            Self::CompensationFailed => "compensation_failed",
            Self::Completed => "completed",
            Self::Aborted => "aborted",
        }
    }
}

/// A named saga lifecycle event with its payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SagaEvent {
    /// The saga instance this event belongs to.
    pub saga_id: String,
    /// Name of the saga definition.
    pub definition: String,
    /// What happened.
    pub event_type: SagaEventType,
    /// Zero-based step index, when the event concerns a step.
    pub step_index: Option<usize>,
    /// Step name, when the event concerns a step.
    pub step_name: Option<String>,
    /// Idempotency key of the action the event refers to.
    pub idempotency_key: Option<String>,
    /// When the event occurred.
    pub created_at: DateTime<Utc>,
}

/// Publishes saga events to an external messaging collaborator.
///
/// Implementations own delivery; at-least-once semantics are assumed.
/// Publication failures never fail the saga itself.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish one event.
    async fn publish(&self, event: &SagaEvent) -> Result<()>;
}

/// Publisher that drops events, for embedders without choreography.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopPublisher;

#[async_trait]
impl EventPublisher for NoopPublisher {
    async fn publish(&self, _event: &SagaEvent) -> Result<()> {
        Ok(())
    }
}
