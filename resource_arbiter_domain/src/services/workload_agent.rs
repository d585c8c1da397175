// /////////////////////////////////////////////////////////////////////////////
// Resource Arbiter RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Workload Agent Port
//!
//! Infrastructure port towards the in-workload runtime: the agent embedded
//! in every adaptive application that performs the local side of a
//! reconfiguration when the synchronisation manager asks for it.
//!
//! Every call carries a deadline supplied by the synchronisation policy.
//! Implementations convert an expired deadline into `AgentTimeout` and a
//! broken channel into `AgentWriteError`; both disable the workload
//! without failing the session.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::ArbiterError;

/// Synchronisation latency declared by an agent, in milliseconds.
pub type SyncLatencyMs = u32;

/// The workload-agent port used during the synchronisation protocol.
#[async_trait]
pub trait WorkloadAgent: Send + Sync {
    /// Announces the upcoming reconfiguration and collects the agent's
    /// estimate of its synchronisation latency.
    async fn pre_change(&self, deadline: Duration) -> Result<SyncLatencyMs, ArbiterError>;

    /// Instructs the agent to cross its next synchronisation point.
    async fn sync_change(&self, deadline: Duration) -> Result<(), ArbiterError>;

    /// Notifies the agent that the reconfiguration may proceed.
    async fn do_change(&self, deadline: Duration) -> Result<(), ArbiterError>;

    /// Asks the agent to stop execution (blocked or disabled workloads).
    async fn stop_execution(&self, deadline: Duration) -> Result<(), ArbiterError>;
}
