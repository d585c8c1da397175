// /////////////////////////////////////////////////////////////////////////////
// Resource Arbiter RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Policy Ports
//!
//! The two pluggable decision points of the core:
//!
//! - the **scheduler policy** produces a complete candidate allocation on
//!   a view it owns, using the [`System`](crate::application::services::System)
//!   facade;
//! - the **sync policy** drives the synchronisation protocol: queue
//!   order, per-workload participation, latency handling and the agent
//!   RPC deadline.
//!
//! Policies are discovered by name from the registry and selected via
//! configuration. The registry replaces dynamic module loading: a policy
//! is an ordinary trait object registered at composition time.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use resource_arbiter_domain::{ArbiterError, Schedulable, SyncState, ViewToken};

use crate::application::services::system::System;

/// The allocation policy port.
///
/// `schedule` must return the token of a view describing the complete
/// candidate assignment; every workload the policy intends to
/// reconfigure must have gone through `schedule_request` (or
/// `schedule_request_as_prev`) before it returns.
pub trait SchedulerPolicy: Send + Sync {
    /// Registry name of this policy.
    fn name(&self) -> &str;

    /// Produces a candidate allocation view.
    ///
    /// # Errors
    /// - `PolicyDelayed` to ask for a later retry
    /// - any other error marks the run as failed
    fn schedule(&self, system: &System) -> Result<ViewToken, ArbiterError>;
}

/// The synchronisation policy port.
pub trait SyncPolicy: Send + Sync {
    /// Registry name of this policy.
    fn name(&self) -> &str;

    /// The sync queues to serve, in order. Queues may be split or
    /// skipped; workloads in unlisted flavours wait for a later session.
    fn queues(&self) -> Vec<SyncState>;

    /// Whether this workload takes part in the current session.
    fn do_sync(&self, sched: &Schedulable) -> bool {
        let _ = sched;
        true
    }

    /// Clamps an agent-declared synchronisation latency.
    fn check_latency(&self, sched: &Schedulable, declared_ms: u32) -> u32;

    /// Estimated settle time before the synchronisation point, from the
    /// latencies declared in PreChange.
    fn estimated_sync_time(&self, latencies_ms: &[u32]) -> u64;

    /// Deadline applied to every workload-agent RPC.
    fn agent_deadline(&self) -> Duration;
}

/// Name-keyed registry of allocation policies.
#[derive(Default)]
pub struct PolicyRegistry {
    policies: Mutex<HashMap<String, Arc<dyn SchedulerPolicy>>>,
}

impl PolicyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a policy under its own name (last registration wins).
    pub fn register(&self, policy: Arc<dyn SchedulerPolicy>) {
        self.policies
            .lock()
            .insert(policy.name().to_string(), policy);
    }

    /// Resolves a policy by name.
    ///
    /// # Errors
    /// Returns `PolicyMissing` with the known names for an unknown one.
    pub fn get(&self, name: &str) -> Result<Arc<dyn SchedulerPolicy>, ArbiterError> {
        self.policies.lock().get(name).cloned().ok_or_else(|| {
            ArbiterError::PolicyMissing(format!(
                "'{}' (available: {})",
                name,
                self.names().join(", ")
            ))
        })
    }

    /// The registered policy names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.policies.lock().keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NullPolicy(&'static str);

    impl SchedulerPolicy for NullPolicy {
        fn name(&self) -> &str {
            self.0
        }

        fn schedule(&self, _system: &System) -> Result<ViewToken, ArbiterError> {
            Err(ArbiterError::PolicyFailed("null".into()))
        }
    }

    #[test]
    fn test_registry_lookup() {
        let registry = PolicyRegistry::new();
        registry.register(Arc::new(NullPolicy("alpha")));
        registry.register(Arc::new(NullPolicy("beta")));

        assert!(registry.get("alpha").is_ok());
        assert_eq!(registry.names(), vec!["alpha", "beta"]);
        assert!(matches!(
            registry.get("gamma"),
            Err(ArbiterError::PolicyMissing(_))
        ));
    }
}
