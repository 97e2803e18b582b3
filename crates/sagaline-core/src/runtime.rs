// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Embeddable runtime for sagaline-core.
//!
//! This module provides [`SagaRuntime`] which wires the breaker registry,
//! call executor, and saga coordinator together for embedding into an
//! existing tokio application.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use sagaline_core::runtime::SagaRuntime;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let runtime = SagaRuntime::builder()
//!         .transport(Arc::new(MyHttpTransport::new()))
//!         .registry(my_step_registry())
//!         .build()?;
//!
//!     let report = runtime.coordinator().start("place-order").await?;
//!     println!("saga {} finished {}", report.saga_id, report.status.as_str());
//!     Ok(())
//! }
//! ```

use std::sync::Arc;

use anyhow::Result;

use crate::alert::{Alerter, TracingAlerter};
use crate::breaker::BreakerRegistry;
use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::events::{EventPublisher, NoopPublisher};
use crate::executor::CallExecutor;
use crate::persistence::{MemoryStore, SagaStore};
use crate::registry::StepRegistry;
use crate::saga::SagaCoordinator;
use crate::transport::Transport;

/// Builder for creating a [`SagaRuntime`].
pub struct SagaRuntimeBuilder {
    transport: Option<Arc<dyn Transport>>,
    registry: Option<StepRegistry>,
    store: Option<Arc<dyn SagaStore>>,
    publisher: Option<Arc<dyn EventPublisher>>,
    alerter: Option<Arc<dyn Alerter>>,
    clock: Option<Arc<dyn Clock>>,
    config: Config,
}

impl std::fmt::Debug for SagaRuntimeBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SagaRuntimeBuilder")
            .field("transport", &self.transport.as_ref().map(|_| "..."))
            .field("registry", &self.registry)
            .field("config", &self.config)
            .finish()
    }
}

impl Default for SagaRuntimeBuilder {
    fn default() -> Self {
        Self {
            transport: None,
            registry: None,
            store: None,
            publisher: None,
            alerter: None,
            clock: None,
            config: Config::default(),
        }
    }
}

impl SagaRuntimeBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the dependency invocation transport (required).
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Set the saga definitions (required).
    pub fn registry(mut self, registry: StepRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Set the saga instance store.
    ///
    /// Default: in-memory, no durability across restarts.
    pub fn store(mut self, store: Arc<dyn SagaStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Set the lifecycle event publisher.
    ///
    /// Default: events are dropped.
    pub fn publisher(mut self, publisher: Arc<dyn EventPublisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    /// Set the operator alerting channel.
    ///
    /// Default: alerts go to the tracing error stream.
    pub fn alerter(mut self, alerter: Arc<dyn Alerter>) -> Self {
        self.alerter = Some(alerter);
        self
    }

    /// Set the time source for breaker cool-down measurement.
    ///
    /// Default: the system clock.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Set the configuration (breaker, executor, and retry tunables).
    ///
    /// Default: [`Config::default`].
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Build the runtime.
    ///
    /// Returns an error if required fields are missing.
    pub fn build(self) -> Result<SagaRuntime> {
        let transport = self
            .transport
            .ok_or_else(|| anyhow::anyhow!("transport is required"))?;
        let registry = self
            .registry
            .ok_or_else(|| anyhow::anyhow!("registry is required"))?;

        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryStore::new()) as Arc<dyn SagaStore>);
        let publisher = self
            .publisher
            .unwrap_or_else(|| Arc::new(NoopPublisher) as Arc<dyn EventPublisher>);
        let alerter = self
            .alerter
            .unwrap_or_else(|| Arc::new(TracingAlerter) as Arc<dyn Alerter>);

        let breakers = Arc::new(BreakerRegistry::new(self.config.breaker.clone(), clock));
        let executor = Arc::new(CallExecutor::new(breakers, transport));
        let coordinator = Arc::new(SagaCoordinator::new(
            Arc::new(registry),
            executor,
            store,
            publisher,
            alerter,
            &self.config,
        ));

        Ok(SagaRuntime { coordinator })
    }
}

/// A wired saga coordinator ready for embedding.
#[derive(Debug, Clone)]
pub struct SagaRuntime {
    coordinator: Arc<SagaCoordinator>,
}

impl SagaRuntime {
    /// Create a builder with default settings.
    pub fn builder() -> SagaRuntimeBuilder {
        SagaRuntimeBuilder::new()
    }

    /// The saga coordinator.
    pub fn coordinator(&self) -> &Arc<SagaCoordinator> {
        &self.coordinator
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::breaker::DependencyId;
    use crate::registry::{ActionDescriptor, SagaDefinition, StepDefinition};
    use crate::transport::{ActionRequest, ActionResponse, TransportError};
    use async_trait::async_trait;

    struct OkTransport;

    #[async_trait]
    impl Transport for OkTransport {
        async fn invoke(
            &self,
            _dependency: &DependencyId,
            _request: &ActionRequest,
        ) -> std::result::Result<ActionResponse, TransportError> {
            Ok(ActionResponse { payload: vec![] })
        }
    }

    fn registry() -> StepRegistry {
        let mut registry = StepRegistry::new();
        registry
            .register(
                SagaDefinition::new(
                    "noop",
                    vec![StepDefinition::without_compensation(
                        "only",
                        "svc",
                        ActionDescriptor::new("do", b"{}".to_vec()),
                    )],
                )
                .unwrap(),
            )
            .unwrap();
        registry
    }

    #[test]
    fn test_build_requires_transport() {
        let err = SagaRuntime::builder().registry(registry()).build();
        assert!(err.is_err());
    }

    #[test]
    fn test_build_requires_registry() {
        let err = SagaRuntime::builder()
            .transport(Arc::new(OkTransport))
            .build();
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn test_built_runtime_runs_a_saga() {
        let runtime = SagaRuntime::builder()
            .transport(Arc::new(OkTransport))
            .registry(registry())
            .build()
            .unwrap();

        let report = runtime.coordinator().start("noop").await.unwrap();
        assert_eq!(report.status, crate::saga::SagaStatus::Completed);
    }
}
