// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Persistence interfaces and backends for saga instance state.
//!
//! This module defines the store abstraction the coordinator persists
//! through. Durable backends are external collaborators keyed by saga
//! instance id; the in-memory backend here serves embedders that do not
//! need durability, and tests.

pub mod memory;

pub use self::memory::MemoryStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Saga instance record from the persistence layer.
///
/// Status and outcome fields are stored as strings so backends do not
/// depend on in-memory enum layout; the coordinator parses them back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SagaRecord {
    /// Unique identifier for the saga instance.
    pub saga_id: String,
    /// Name of the saga definition this instance runs.
    pub definition: String,
    /// Current status (running, completed, compensating, aborted).
    pub status: String,
    /// Index of the next step to execute.
    pub current_step: usize,
    /// Per-step outcome (pending, succeeded, failed, compensated),
    /// indexed by step.
    pub step_outcomes: Vec<String>,
    /// Index of the step whose failure triggered compensation.
    pub failed_step: Option<usize>,
    /// Whether every compensation succeeded; None while not compensating.
    pub all_compensations_succeeded: Option<bool>,
    /// Error message from the failing step.
    pub error: Option<String>,
    /// When the instance was created.
    pub created_at: DateTime<Utc>,
    /// When the instance reached a terminal status.
    pub finished_at: Option<DateTime<Utc>>,
}

/// Saga event record from the persistence layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SagaEventRecord {
    /// Saga instance this event belongs to.
    pub saga_id: String,
    /// Type of event (started, step_succeeded, step_failed,
    /// step_compensated, compensation_failed, completed, aborted).
    pub event_type: String,
    /// Step index if the event concerns a step.
    pub step_index: Option<usize>,
    /// When the event occurred.
    pub created_at: DateTime<Utc>,
}

/// Store for saga instance state, keyed by saga instance id.
#[async_trait]
pub trait SagaStore: Send + Sync {
    /// Insert or replace an instance record.
    async fn save_instance(&self, record: &SagaRecord) -> Result<()>;

    /// Load an instance record by id.
    async fn load_instance(&self, saga_id: &str) -> Result<Option<SagaRecord>>;

    /// List instances, optionally filtered by status string.
    async fn list_instances(&self, status: Option<&str>) -> Result<Vec<SagaRecord>>;

    /// Append an event to the instance's trail.
    async fn insert_event(&self, event: &SagaEventRecord) -> Result<()>;

    /// List events for an instance in insertion order.
    async fn list_events(&self, saga_id: &str) -> Result<Vec<SagaEventRecord>>;
}
