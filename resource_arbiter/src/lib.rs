// /////////////////////////////////////////////////////////////////////////////
// Resource Arbiter RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Resource Arbiter
//!
//! A run-time resource arbiter for heterogeneous platforms: workloads
//! (adaptive applications and plain processes) register with the daemon,
//! a pluggable allocation policy periodically decides which resources
//! each workload may use, and a multi-phase synchronisation protocol
//! drives the decisions into the workloads and the platform — with
//! atomic commit or rollback of the accounting state.
//!
//! ## Architecture
//!
//! The crate composes the layers of the workspace:
//!
//! - **Domain** (`resource-arbiter-domain`): resource paths and tree,
//!   per-view accounting, working modes, the schedulable state machine;
//! - **Application** (this crate): workload registries, the system
//!   facade handed to policies, the scheduler and synchronisation
//!   managers;
//! - **Infrastructure** (this crate): configuration, logging, metrics,
//!   the control loop with its debounced optimisation deferrable, the
//!   command FIFO, the workload-agent channel, the platform adapter and
//!   the shipped policies;
//! - **Bootstrap** (`resource-arbiter-bootstrap`): signals, shutdown
//!   coordination, CLI and exit codes.
//!
//! ## One Optimisation Cycle
//!
//! ```text
//! events ─▶ control loop ─▶ deferrable ─▶ scheduler manager ─▶ policy
//!                                              │                  │
//!                                              ▼                  ▼
//!                                      sync manager ◀── candidate view
//!                                    (4-phase protocol)
//!                                              │
//!                                              ▼
//!                                     accounter sync commit
//! ```

pub mod application;
pub mod infrastructure;

pub use application::policy::{PolicyRegistry, SchedulerPolicy, SyncPolicy};
pub use application::services::{
    ApplicationManager, ProcessManager, SchedulerManager, SchedulingResult, SyncResult,
    SynchronizationManager, System,
};
pub use infrastructure::config::ArbiterSettings;
pub use infrastructure::metrics::ArbiterMetrics;
pub use infrastructure::runtime::{ControlEvent, ControlLoop, EventBus, LoopOutcome};
