// /////////////////////////////////////////////////////////////////////////////
// Resource Arbiter RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Ordered Sync Policy
//!
//! The default synchronisation policy: serve the sync queues in the
//! fixed order Starting → Reconf → MigRec → Migrate → Blocked (starting
//! workloads first so fresh resources come online before migrations
//! shuffle the rest), synchronise every workload, clamp declared
//! latencies to a configured ceiling and take the slowest declared
//! latency as the settle-time estimate.

use std::time::Duration;

use resource_arbiter_domain::{Schedulable, SyncState};

use crate::application::policy::SyncPolicy;

/// Fixed-order, sync-everything policy.
pub struct OrderedSyncPolicy {
    agent_deadline: Duration,
    max_latency_ms: u32,
}

impl OrderedSyncPolicy {
    pub const NAME: &'static str = "ordered";

    pub fn new(agent_deadline: Duration, max_latency_ms: u32) -> Self {
        Self {
            agent_deadline,
            max_latency_ms,
        }
    }
}

impl SyncPolicy for OrderedSyncPolicy {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn queues(&self) -> Vec<SyncState> {
        vec![
            SyncState::Starting,
            SyncState::Reconf,
            SyncState::MigRec,
            SyncState::Migrate,
            SyncState::Blocked,
        ]
    }

    fn check_latency(&self, _sched: &Schedulable, declared_ms: u32) -> u32 {
        declared_ms.min(self.max_latency_ms)
    }

    fn estimated_sync_time(&self, latencies_ms: &[u32]) -> u64 {
        latencies_ms.iter().copied().max().unwrap_or(0).into()
    }

    fn agent_deadline(&self) -> Duration {
        self.agent_deadline
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_order() {
        let policy = OrderedSyncPolicy::new(Duration::from_millis(500), 1000);
        assert_eq!(
            policy.queues(),
            vec![
                SyncState::Starting,
                SyncState::Reconf,
                SyncState::MigRec,
                SyncState::Migrate,
                SyncState::Blocked,
            ]
        );
    }

    #[test]
    fn test_latency_clamp_and_estimate() {
        let policy = OrderedSyncPolicy::new(Duration::from_millis(500), 300);
        let sched = Schedulable::new(1, 1, "x", 0);
        assert_eq!(policy.check_latency(&sched, 120), 120);
        assert_eq!(policy.check_latency(&sched, 5000), 300);
        assert_eq!(policy.estimated_sync_time(&[10, 250, 40]), 250);
        assert_eq!(policy.estimated_sync_time(&[]), 0);
    }
}
