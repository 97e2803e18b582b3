// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Common test infrastructure for sagaline-core integration tests.
//!
//! Provides a scripted transport, collecting collaborator fakes, and a
//! TestContext wiring them into a runtime on a manual clock.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use sagaline_core::alert::{Alerter, CompensationAlert};
use sagaline_core::breaker::DependencyId;
use sagaline_core::clock::ManualClock;
use sagaline_core::config::Config;
use sagaline_core::error::Result;
use sagaline_core::events::{EventPublisher, SagaEvent};
use sagaline_core::persistence::MemoryStore;
use sagaline_core::registry::StepRegistry;
use sagaline_core::runtime::SagaRuntime;
use sagaline_core::saga::SagaCoordinator;
use sagaline_core::transport::{ActionRequest, ActionResponse, Transport, TransportError};

/// One recorded transport invocation.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub dependency: String,
    pub action: String,
    pub idempotency_key: String,
}

/// What a scripted action should do on its next invocation.
pub enum ScriptedOutcome {
    Ok(Vec<u8>),
    Err(TransportError),
    Hang,
}

/// Transport fake: actions succeed unless scripted otherwise, and every
/// invocation is recorded.
#[derive(Default)]
pub struct ScriptedTransport {
    scripts: Mutex<HashMap<String, VecDeque<ScriptedOutcome>>>,
    invocations: Mutex<Vec<Invocation>>,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queue an outcome for the next invocation of `action`.
    pub fn script(&self, action: &str, outcome: ScriptedOutcome) {
        self.scripts
            .lock()
            .unwrap()
            .entry(action.to_string())
            .or_default()
            .push_back(outcome);
    }

    /// Queue `times` consecutive failures for `action`.
    pub fn fail_times(&self, action: &str, times: usize, err: TransportError) {
        for _ in 0..times {
            self.script(action, ScriptedOutcome::Err(err.clone()));
        }
    }

    /// All invocations so far, in order.
    pub fn invocations(&self) -> Vec<Invocation> {
        self.invocations.lock().unwrap().clone()
    }

    /// Number of invocations of `action`.
    pub fn count(&self, action: &str) -> usize {
        self.invocations
            .lock()
            .unwrap()
            .iter()
            .filter(|inv| inv.action == action)
            .count()
    }

    /// Action names in invocation order.
    pub fn action_sequence(&self) -> Vec<String> {
        self.invocations
            .lock()
            .unwrap()
            .iter()
            .map(|inv| inv.action.clone())
            .collect()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn invoke(
        &self,
        dependency: &DependencyId,
        request: &ActionRequest,
    ) -> std::result::Result<ActionResponse, TransportError> {
        self.invocations.lock().unwrap().push(Invocation {
            dependency: dependency.to_string(),
            action: request.action.clone(),
            idempotency_key: request.idempotency_key.clone(),
        });

        let scripted = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(&request.action)
            .and_then(|queue| queue.pop_front());

        match scripted {
            Some(ScriptedOutcome::Ok(payload)) => Ok(ActionResponse { payload }),
            Some(ScriptedOutcome::Err(err)) => Err(err),
            Some(ScriptedOutcome::Hang) => std::future::pending().await,
            None => Ok(ActionResponse { payload: vec![] }),
        }
    }
}

/// Publisher fake collecting every published event.
#[derive(Default)]
pub struct CollectingPublisher {
    events: Mutex<Vec<SagaEvent>>,
}

impl CollectingPublisher {
    pub fn events(&self) -> Vec<SagaEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventPublisher for CollectingPublisher {
    async fn publish(&self, event: &SagaEvent) -> Result<()> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}

/// Alerter fake collecting every alert.
#[derive(Default)]
pub struct CollectingAlerter {
    alerts: Mutex<Vec<CompensationAlert>>,
}

impl CollectingAlerter {
    pub fn alerts(&self) -> Vec<CompensationAlert> {
        self.alerts.lock().unwrap().clone()
    }
}

impl Alerter for CollectingAlerter {
    fn alert(&self, alert: &CompensationAlert) {
        self.alerts.lock().unwrap().push(alert.clone());
    }
}

/// Test context wiring the fakes into a runtime on a manual clock.
pub struct TestContext {
    pub transport: Arc<ScriptedTransport>,
    pub store: Arc<MemoryStore>,
    pub publisher: Arc<CollectingPublisher>,
    pub alerter: Arc<CollectingAlerter>,
    pub clock: Arc<ManualClock>,
    pub runtime: SagaRuntime,
}

/// Route test logs through tracing, honoring `RUST_LOG`.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

impl TestContext {
    pub fn new(registry: StepRegistry) -> Self {
        Self::with_config(registry, Config::default())
    }

    pub fn with_config(registry: StepRegistry, config: Config) -> Self {
        init_tracing();
        let transport = ScriptedTransport::new();
        let store = Arc::new(MemoryStore::new());
        let publisher = Arc::new(CollectingPublisher::default());
        let alerter = Arc::new(CollectingAlerter::default());
        let clock = Arc::new(ManualClock::new());

        let runtime = SagaRuntime::builder()
            .transport(transport.clone())
            .registry(registry)
            .store(store.clone())
            .publisher(publisher.clone())
            .alerter(alerter.clone())
            .clock(clock.clone())
            .config(config)
            .build()
            .expect("runtime should build");

        Self {
            transport,
            store,
            publisher,
            alerter,
            clock,
            runtime,
        }
    }

    /// Build a fresh runtime over the same store and transport, as if the
    /// process restarted.
    pub fn restart(&self, registry: StepRegistry, config: Config) -> Self {
        let runtime = SagaRuntime::builder()
            .transport(self.transport.clone())
            .registry(registry)
            .store(self.store.clone())
            .publisher(self.publisher.clone())
            .alerter(self.alerter.clone())
            .clock(self.clock.clone())
            .config(config)
            .build()
            .expect("runtime should build");

        Self {
            transport: self.transport.clone(),
            store: self.store.clone(),
            publisher: self.publisher.clone(),
            alerter: self.alerter.clone(),
            clock: self.clock.clone(),
            runtime,
        }
    }

    pub fn coordinator(&self) -> &Arc<SagaCoordinator> {
        self.runtime.coordinator()
    }
}
