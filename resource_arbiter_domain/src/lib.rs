// /////////////////////////////////////////////////////////////////////////////
// Resource Arbiter RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Resource Arbiter Domain
//!
//! The domain layer of the run-time resource arbiter: the core business
//! logic of resource accounting and workload scheduling, independent of
//! runtimes, wire protocols and operating-system facilities.
//!
//! ## Module Structure
//!
//! ### Value Objects
//! Immutable, self-validating values: resource types and paths, declared
//! capacity units, resource requests with their fill policies, and the
//! opaque view tokens of the accounting kernel.
//!
//! ### Entities
//! Identity-bearing objects whose state evolves: resource tree nodes,
//! working modes with their bindings, and the schedulable workloads
//! (applications and processes) with their scheduling state machine.
//!
//! ### Aggregates
//! The resource accounter: resource tree plus view arena, the single
//! consistency boundary for all accounting operations — booking, release,
//! speculative views and the atomic commit/rollback of sync sessions.
//!
//! ### Domain Services
//! The stateless resource binder, plus the infrastructure ports the outer
//! layers implement: the platform adapter and the workload agent.
//!
//! ### Errors
//! One error enum ([`ArbiterError`]) carrying every failure mode the core
//! surfaces, with category and recoverability projections.

pub mod aggregates;
pub mod entities;
pub mod error;
pub mod services;
pub mod value_objects;

pub use error::ArbiterError;

// Aggregates
pub use aggregates::{Holding, ResourceAccounter, ResourceStatus};

// Entities
pub use entities::{
    Application, AssignedMode, Assignment, AwmId, Binding, BindingReference, ExcId, Pid,
    PowerProfile, Priority, Process, ResourceNode, SchedUid, Schedulable, ScheduleRequest, State,
    SyncState, WorkingMode, DEFAULT_PROCESS_PRIORITY, LOWEST_PRIORITY, QUOTA_PER_CORE,
};

// Value objects
pub use value_objects::{
    DeclaredUnit, FillPolicy, PathSegment, ResourceId, ResourcePath, ResourceRequest, ResourceType,
    ViewToken, MAX_PATH_LEVELS, MAX_TOKEN_PROBES, SYSTEM_VIEW,
};

// Services and ports
pub use services::{
    bind_request, not_supported, Candidate, PlatformService, SyncLatencyMs, WorkloadAgent,
    WorkloadDescriptor,
};
