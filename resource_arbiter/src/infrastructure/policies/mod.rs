// /////////////////////////////////////////////////////////////////////////////
// Resource Arbiter RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Shipped Policies
//!
//! The allocation and synchronisation policies bundled with the arbiter.
//! Allocation policies register under their name; the configuration
//! picks one at boot.

pub mod naive;
pub mod ordered_sync;
pub mod random;

pub use naive::NaivePolicy;
pub use ordered_sync::OrderedSyncPolicy;
pub use random::RandomPolicy;

use std::sync::Arc;

use crate::application::policy::PolicyRegistry;

/// Builds the registry pre-loaded with the shipped allocation policies.
pub fn default_registry() -> PolicyRegistry {
    let registry = PolicyRegistry::new();
    registry.register(Arc::new(NaivePolicy::new()));
    registry.register(Arc::new(RandomPolicy::new()));
    registry
}
