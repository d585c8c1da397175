// /////////////////////////////////////////////////////////////////////////////
// Resource Arbiter RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Infrastructure Adapters
//!
//! Implementations of the domain's infrastructure ports: the local
//! platform adapter and the workload-agent proxy.

pub mod agent_proxy;
pub mod local_platform;

pub use agent_proxy::{AgentChannel, AgentProxy};
pub use local_platform::LocalPlatformAdapter;
