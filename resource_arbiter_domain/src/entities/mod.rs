// /////////////////////////////////////////////////////////////////////////////
// Resource Arbiter RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Entities
//!
//! Identity-bearing objects of the resource arbiter domain: resource tree
//! nodes, working modes and the schedulable workloads (applications and
//! processes) whose state changes over time while their identity persists.

pub mod application;
pub mod process;
pub mod resource_node;
pub mod schedulable;
pub mod working_mode;

pub use application::{Application, ExcId};
pub use process::{Process, ScheduleRequest, DEFAULT_PROCESS_PRIORITY, QUOTA_PER_CORE};
pub use resource_node::{PowerProfile, ResourceNode};
pub use schedulable::{Pid, Priority, SchedUid, Schedulable, State, SyncState, LOWEST_PRIORITY};
pub use working_mode::{Assignment, AssignedMode, AwmId, Binding, BindingReference, WorkingMode};
