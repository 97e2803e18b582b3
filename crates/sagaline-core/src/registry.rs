// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Static saga and step definitions.
//!
//! A [`SagaDefinition`] is an ordered list of immutable [`StepDefinition`]s
//! shared read-only across many saga instances. Definitions carry data,
//! not behavior: forward and compensating action descriptors plus an
//! idempotency key template.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::breaker::DependencyId;
use crate::error::{CoreError, Result};

/// Whether a derived key is for the forward or the compensating action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionDirection {
    /// The step's forward action.
    Forward,
    /// The step's compensating action.
    Compensate,
}

impl ActionDirection {
    /// Returns the string representation of the direction.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Forward => "forward",
            Self::Compensate => "compensate",
        }
    }
}

/// Serialized action understood by a dependency.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionDescriptor {
    /// Action name (e.g. "reserve-stock").
    pub action: String,
    /// Opaque serialized payload.
    pub payload: Vec<u8>,
}

impl ActionDescriptor {
    /// Create a descriptor with the given action name and payload.
    pub fn new(action: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            action: action.into(),
            payload: payload.into(),
        }
    }
}

/// Immutable description of one saga step.
#[derive(Debug, Clone)]
pub struct StepDefinition {
    /// Step name, unique within its saga definition.
    pub name: String,
    /// The dependency this step calls.
    pub dependency: DependencyId,
    /// Forward action applied when the saga progresses.
    pub forward: ActionDescriptor,
    /// Compensating action that semantically undoes the forward action.
    /// Steps without one (e.g. read-only steps) are skipped during rollback.
    pub compensation: Option<ActionDescriptor>,
    /// Template mixed into derived idempotency keys.
    pub idempotency_template: String,
    /// Per-step call deadline; falls back to the executor default.
    pub timeout: Option<Duration>,
}

impl StepDefinition {
    /// Create a step with a compensating action.
    pub fn new(
        name: impl Into<String>,
        dependency: impl Into<DependencyId>,
        forward: ActionDescriptor,
        compensation: ActionDescriptor,
    ) -> Self {
        let name = name.into();
        Self {
            idempotency_template: name.clone(),
            name,
            dependency: dependency.into(),
            forward,
            compensation: Some(compensation),
            timeout: None,
        }
    }

    /// Create a step with no compensating action.
    pub fn without_compensation(
        name: impl Into<String>,
        dependency: impl Into<DependencyId>,
        forward: ActionDescriptor,
    ) -> Self {
        let name = name.into();
        Self {
            idempotency_template: name.clone(),
            name,
            dependency: dependency.into(),
            forward,
            compensation: None,
            timeout: None,
        }
    }

    /// Override the idempotency key template (defaults to the step name).
    pub fn with_idempotency_template(mut self, template: impl Into<String>) -> Self {
        self.idempotency_template = template.into();
        self
    }

    /// Override the call deadline for this step.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Derive the idempotency key for this step within a saga instance.
    ///
    /// The key is a function of the template, the saga instance id, the
    /// step index, and the direction, so re-delivery of the same action
    /// always carries the same key and distinct actions never collide.
    pub fn idempotency_key(
        &self,
        saga_id: &str,
        step_index: usize,
        direction: ActionDirection,
    ) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.idempotency_template.as_bytes());
        hasher.update(b"\n");
        hasher.update(saga_id.as_bytes());
        hasher.update(b"\n");
        hasher.update(step_index.to_string().as_bytes());
        hasher.update(b"\n");
        hasher.update(direction.as_str().as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

/// Ordered sequence of steps forming one saga type.
#[derive(Debug, Clone)]
pub struct SagaDefinition {
    /// Definition name (e.g. "place-order").
    pub name: String,
    /// Steps in forward execution order.
    pub steps: Vec<StepDefinition>,
}

impl SagaDefinition {
    /// Create a definition from an ordered step list.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the name or step list is empty, or if
    /// two steps share a name.
    pub fn new(name: impl Into<String>, steps: Vec<StepDefinition>) -> Result<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(CoreError::ValidationError {
                field: "name".to_string(),
                message: "definition name must not be empty".to_string(),
            });
        }
        if steps.is_empty() {
            return Err(CoreError::ValidationError {
                field: "steps".to_string(),
                message: "a saga needs at least one step".to_string(),
            });
        }
        let mut seen = std::collections::HashSet::new();
        for step in &steps {
            if !seen.insert(step.name.as_str()) {
                return Err(CoreError::ValidationError {
                    field: "steps".to_string(),
                    message: format!("duplicate step name '{}'", step.name),
                });
            }
        }
        Ok(Self { name, steps })
    }
}

/// Registry of saga definitions, shared read-only across instances.
#[derive(Default)]
pub struct StepRegistry {
    definitions: HashMap<String, Arc<SagaDefinition>>,
}

impl fmt::Debug for StepRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepRegistry")
            .field("definitions", &self.definitions.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl StepRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a definition under its name.
    ///
    /// # Errors
    ///
    /// Returns a validation error if a definition with the same name is
    /// already registered.
    pub fn register(&mut self, definition: SagaDefinition) -> Result<()> {
        if self.definitions.contains_key(&definition.name) {
            return Err(CoreError::ValidationError {
                field: "name".to_string(),
                message: format!("definition '{}' already registered", definition.name),
            });
        }
        self.definitions
            .insert(definition.name.clone(), Arc::new(definition));
        Ok(())
    }

    /// Look up a definition by name.
    pub fn get(&self, name: &str) -> Result<Arc<SagaDefinition>> {
        self.definitions
            .get(name)
            .cloned()
            .ok_or_else(|| CoreError::UnknownDefinition {
                name: name.to_string(),
            })
    }

    /// Names of all registered definitions.
    pub fn names(&self) -> Vec<&str> {
        self.definitions.keys().map(String::as_str).collect()
    }
}
