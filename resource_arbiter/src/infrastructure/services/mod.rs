// /////////////////////////////////////////////////////////////////////////////
// Resource Arbiter RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Infrastructure Services
//!
//! Long-running services and loaders: the command FIFO, the
//! workload-agent channel, recipe loading and the power monitor.

pub mod agent_protocol;
pub mod agent_server;
pub mod command_server;
pub mod commands;
pub mod power_monitor;
pub mod recipe_loader;

pub use agent_protocol::AgentMessage;
pub use agent_server::AgentServer;
pub use command_server::{split_command_line, CommandHandler, CommandManager};
pub use commands::register_core_commands;
pub use power_monitor::PowerMonitor;
pub use recipe_loader::{Recipe, RecipeLoader};
