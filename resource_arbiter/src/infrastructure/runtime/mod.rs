// /////////////////////////////////////////////////////////////////////////////
// Resource Arbiter RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Runtime
//!
//! The daemon's execution machinery: the worker contract and pool, the
//! coalescing deferrable timers and the control loop.

pub mod control_loop;
pub mod deferrable;
pub mod worker;

pub use control_loop::{ControlEvent, ControlLoop, EventBus, LoopOutcome};
pub use deferrable::{Deferrable, DeferredAction};
pub use worker::{Worker, WorkerPool};
