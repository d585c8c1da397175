// /////////////////////////////////////////////////////////////////////////////
// Resource Arbiter RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Infrastructure Layer
//!
//! Everything that touches the outside world: configuration, logging,
//! metrics, the runtime machinery, port adapters, shipped policies and
//! the external-interface services.

pub mod adapters;
pub mod config;
pub mod logging;
pub mod metrics;
pub mod policies;
pub mod runtime;
pub mod services;
