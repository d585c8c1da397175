// /////////////////////////////////////////////////////////////////////////////
// Resource Arbiter RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Workload-Agent Wire Protocol
//!
//! The typed messages exchanged with in-workload agents over the Unix
//! socket channel, framed as one JSON object per line. The agent opens
//! the channel, pairs with `AppPair` (version negotiation), registers
//! its execution contexts, and announces start/stop/exit; the core sends
//! synchronisation requests. Every non-response message is answered by
//! `Resp` carrying the originating `seq` and a result code.
//!
//! Version negotiation accepts an equal major and an agent minor no
//! newer than the core's; anything else answers `VERSION_MISMATCH` and
//! closes the channel.

use serde::{Deserialize, Serialize};

/// Result codes carried by `Resp`.
pub mod result_code {
    /// Request served
    pub const OK: i32 = 0;
    /// Generic failure
    pub const ERROR: i32 = 1;
    /// Pairing refused: incompatible protocol versions
    pub const VERSION_MISMATCH: i32 = 2;
    /// Registration refused: unknown or malformed recipe
    pub const BAD_RECIPE: i32 = 3;
    /// Request references an unknown execution context
    pub const NOT_REGISTERED: i32 = 4;
    /// Message sequencing violated (e.g. not paired yet)
    pub const PROTOCOL: i32 = 5;
}

/// One protocol message, in either direction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentMessage {
    /// Agent → core: open the channel for a hosting process
    AppPair {
        seq: u64,
        pid: u32,
        name: String,
        major: u8,
        minor: u8,
    },
    /// Agent → core: register an execution context under a recipe
    ExcRegister {
        seq: u64,
        pid: u32,
        exc_id: u32,
        name: String,
        recipe: String,
    },
    /// Agent → core: unregister an execution context
    ExcUnregister { seq: u64, pid: u32, exc_id: u32 },
    /// Agent → core: the execution context wants to run
    ExcStart { seq: u64, pid: u32, exc_id: u32 },
    /// Agent → core: the execution context stops
    ExcStop { seq: u64, pid: u32, exc_id: u32 },
    /// Agent → core: the hosting process is exiting
    AppExit { seq: u64, pid: u32 },

    /// Core → agent: announce a reconfiguration, collect the latency
    PreChange { seq: u64, exc_id: u32 },
    /// Core → agent: cross the next synchronisation point
    SyncChange { seq: u64, exc_id: u32 },
    /// Core → agent: the reconfiguration may proceed
    DoChange { seq: u64, exc_id: u32 },
    /// Core → agent: stop executing (blocked or disabled)
    StopExecution { seq: u64, exc_id: u32 },

    /// Either direction: answer to the message carrying `seq`
    Resp {
        seq: u64,
        result: i32,
        /// Declared synchronisation latency (PreChange answers only)
        #[serde(default, skip_serializing_if = "Option::is_none")]
        latency_ms: Option<u32>,
    },
}

impl AgentMessage {
    /// The sequence number of this message.
    pub fn seq(&self) -> u64 {
        match self {
            AgentMessage::AppPair { seq, .. }
            | AgentMessage::ExcRegister { seq, .. }
            | AgentMessage::ExcUnregister { seq, .. }
            | AgentMessage::ExcStart { seq, .. }
            | AgentMessage::ExcStop { seq, .. }
            | AgentMessage::AppExit { seq, .. }
            | AgentMessage::PreChange { seq, .. }
            | AgentMessage::SyncChange { seq, .. }
            | AgentMessage::DoChange { seq, .. }
            | AgentMessage::StopExecution { seq, .. }
            | AgentMessage::Resp { seq, .. } => *seq,
        }
    }
}

/// Whether an agent at `(major, minor)` may pair with this core.
pub fn version_compatible(core: (u8, u8), agent: (u8, u8)) -> bool {
    agent.0 == core.0 && agent.1 <= core.1
}
