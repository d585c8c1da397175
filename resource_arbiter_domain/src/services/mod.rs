// /////////////////////////////////////////////////////////////////////////////
// Resource Arbiter RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Domain Services
//!
//! Stateless business logic that does not belong to a single entity (the
//! resource binder) and the infrastructure ports the domain defines but
//! the outer layers implement (platform adapter, workload agent).

pub mod platform_service;
pub mod resource_binder;
pub mod workload_agent;

pub use platform_service::{not_supported, PlatformService, WorkloadDescriptor};
pub use resource_binder::{bind_request, Candidate};
pub use workload_agent::{SyncLatencyMs, WorkloadAgent};
