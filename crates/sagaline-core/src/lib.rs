// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Sagaline Core - Resilient Inter-Service Call Layer
//!
//! This crate provides a library-level core for calling unreliable
//! dependencies safely: per-dependency circuit breakers, a deadline-enforced
//! call executor, and an orchestrated saga coordinator that rolls back
//! partially applied business transactions through compensating actions.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Embedding Application                            │
//! │                  (builds SagaRuntime, registers sagas)                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//!                                    │
//!                                    ▼
//! ┌───────────────────────┐  per step   ┌─────────────────────────────┐
//! │   Saga Coordinator    │────────────▶│       Call Executor         │
//! │  (this crate)         │             │  breaker gate + deadline    │
//! │  forward / rollback   │◀────────────│  exactly-once reporting     │
//! └───────┬───────────────┘  outcome    └──────────┬──────────────────┘
//!         │                                        │
//!         │ persists via                           ▼
//!         ▼                             ┌─────────────────────────┐
//! ┌───────────────────┐                 │   Breaker Registry      │
//! │   SagaStore       │                 │ one breaker/dependency  │
//! │ (collaborator)    │                 └──────────┬──────────────┘
//! └───────────────────┘                            │ admit / record
//!                                                  ▼
//!                                       ┌─────────────────────────┐
//!                                       │  Transport              │
//!                                       │ (collaborator: network, │
//!                                       │  TLS, serialization)    │
//!                                       └─────────────────────────┘
//! ```
//!
//! # Circuit Breaker State Machine
//!
//! ```text
//!                  failures >= threshold
//!                  within rolling window
//!      ┌─────────┐ ───────────────────────▶ ┌──────┐
//!      │ CLOSED  │                          │ OPEN │◀─────────────┐
//!      └─────────┘ ◀──────────────┐         └──┬───┘              │
//!           ▲                     │            │ cool-down        │
//!           │                     │            │ elapsed          │
//!           │ consecutive trial   │            ▼                  │
//!           │ successes reach     │       ┌───────────┐  trial    │
//!           │ threshold           └───────│ HALF-OPEN │──failure───┘
//!           └─────────────────────────────└───────────┘
//! ```
//!
//! One breaker exists per dependency identity and is the only state shared
//! across concurrently running saga instances. While half-open, at most a
//! bounded number of trial calls is in flight; admission beyond the budget
//! is denied, not queued.
//!
//! # Error Taxonomy
//!
//! | Code | Meaning | Breaker failure? |
//! |------|---------|------------------|
//! | `CIRCUIT_OPEN` | Breaker denied the call, no network attempt | no |
//! | `TIMEOUT` | Deadline expired, in-flight attempt cancelled | yes |
//! | `DEPENDENCY_ERROR` | Dependency failed or was unreachable | yes |
//! | `INVALID_ACTION` | Dependency rejected the request as malformed | no |
//! | `COMPENSATION_FAILED` | Compensation exhausted its retry budget | — |
//!
//! All four call-level errors count as a step failure to the coordinator
//! and trigger compensation of previously succeeded steps in strict
//! reverse order. `COMPENSATION_FAILED` additionally escalates through the
//! [`alert::Alerter`] channel because the saga is left in an inconsistent
//! state an operator must resolve.
//!
//! # Configuration
//!
//! All tunables are optional environment variables with defaults:
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `SAGALINE_FAILURE_THRESHOLD` | `5` | Failures tripping a breaker |
//! | `SAGALINE_FAILURE_WINDOW_MS` | `10000` | Rolling failure window |
//! | `SAGALINE_COOL_DOWN_MS` | `30000` | Open-state cool-down |
//! | `SAGALINE_HALF_OPEN_MAX_TRIALS` | `1` | Concurrent trial budget |
//! | `SAGALINE_HALF_OPEN_SUCCESSES` | `3` | Successes to close |
//! | `SAGALINE_CALL_TIMEOUT_MS` | `5000` | Default call deadline |
//! | `SAGALINE_COMPENSATION_MAX_ATTEMPTS` | `5` | Compensation retry budget |
//! | `SAGALINE_COMPENSATION_BASE_BACKOFF_MS` | `100` | Backoff base |
//! | `SAGALINE_COMPENSATION_MAX_BACKOFF_MS` | `5000` | Backoff cap |
//!
//! # Modules
//!
//! - [`alert`]: Operator-visible escalation for stuck compensations
//! - [`backoff`]: Jittered exponential backoff
//! - [`breaker`]: Per-dependency circuit breakers and their registry
//! - [`clock`]: Mockable time source for cool-down measurement
//! - [`compensation`]: Bounded-retry compensation runner
//! - [`config`]: Tunables from environment variables
//! - [`error`]: Error types with stable error codes
//! - [`events`]: Saga lifecycle events and the publication seam
//! - [`executor`]: Breaker-gated, deadline-enforced call execution
//! - [`persistence`]: Saga instance store trait and in-memory backend
//! - [`registry`]: Immutable saga and step definitions
//! - [`runtime`]: Builder for embedding the wired coordinator
//! - [`saga`]: The saga coordinator and instance state machine
//! - [`transport`]: Dependency invocation seam

#![deny(missing_docs)]

/// Operator-visible escalation for stuck compensations.
pub mod alert;

/// Jittered exponential backoff for compensation retries.
pub mod backoff;

/// Per-dependency circuit breakers and their registry.
pub mod breaker;

/// Mockable time source for breaker cool-down measurement.
pub mod clock;

/// Compensation execution with bounded retry.
pub mod compensation;

/// Configuration loading from environment variables.
pub mod config;

/// Error types with stable error codes.
pub mod error;

/// Saga lifecycle events and the publication seam.
pub mod events;

/// Breaker-gated, deadline-enforced call execution.
pub mod executor;

/// Saga instance store trait and in-memory backend.
pub mod persistence;

/// Immutable saga and step definitions.
pub mod registry;

/// Builder for embedding the wired coordinator.
pub mod runtime;

/// The saga coordinator and instance state machine.
pub mod saga;

/// Dependency invocation transport seam.
pub mod transport;
