// /////////////////////////////////////////////////////////////////////////////
// Resource Arbiter RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Power Monitor
//!
//! Periodic sampler walking the registered resources and querying the
//! platform adapter for load, temperature, clock, power and fan
//! readings. Readings land on the node's power profile, where policies
//! and the status reports pick them up.
//!
//! `NotSupported` answers are remembered per node and quantity, so a
//! thin adapter is asked exactly once per question. A zero period
//! disables the worker entirely.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use tracing::{debug, trace};

use resource_arbiter_bootstrap::shutdown::CancellationToken;
use resource_arbiter_domain::{
    ArbiterError, PlatformService, PowerProfile, ResourceAccounter, ResourcePath,
};

use crate::infrastructure::runtime::worker::Worker;

/// The quantities the monitor samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Quantity {
    Load,
    Temperature,
    Clock,
    Power,
    FanSpeed,
}

/// Periodic power/thermal sampler.
pub struct PowerMonitor {
    accounter: Arc<Mutex<ResourceAccounter>>,
    platform: Arc<dyn PlatformService>,
    period: Duration,
    /// Per-node quantities the adapter declared unsupported
    unsupported: Mutex<HashSet<(ResourcePath, Quantity)>>,
}

impl PowerMonitor {
    pub fn new(
        accounter: Arc<Mutex<ResourceAccounter>>,
        platform: Arc<dyn PlatformService>,
        period: Duration,
    ) -> Self {
        Self {
            accounter,
            platform,
            period,
            unsupported: Mutex::new(HashSet::new()),
        }
    }

    fn skip(&self, path: &ResourcePath, quantity: Quantity) -> bool {
        self.unsupported.lock().contains(&(path.clone(), quantity))
    }

    fn mark_unsupported(&self, path: &ResourcePath, quantity: Quantity) {
        trace!(path = %path, ?quantity, "Sampling not supported, not asking again");
        self.unsupported.lock().insert((path.clone(), quantity));
    }

    /// Samples every registered node once.
    pub async fn sample_all(&self) {
        let paths: Vec<ResourcePath> = {
            let accounter = self.accounter.lock();
            accounter.paths().cloned().collect()
        };

        for path in paths {
            let mut profile = PowerProfile {
                sampled_at: Some(Utc::now()),
                ..PowerProfile::default()
            };
            let mut sampled = false;

            if !self.skip(&path, Quantity::Load) {
                match self.platform.get_load(&path).await {
                    Ok(load) => {
                        profile.load = Some(load);
                        sampled = true;
                    }
                    Err(ArbiterError::NotSupported(_)) => self.mark_unsupported(&path, Quantity::Load),
                    Err(e) => debug!(path = %path, error = %e, "Load sampling failed"),
                }
            }
            if !self.skip(&path, Quantity::Temperature) {
                match self.platform.get_temperature(&path).await {
                    Ok(temperature) => {
                        profile.temperature = Some(temperature);
                        sampled = true;
                    }
                    Err(ArbiterError::NotSupported(_)) => {
                        self.mark_unsupported(&path, Quantity::Temperature)
                    }
                    Err(e) => debug!(path = %path, error = %e, "Temperature sampling failed"),
                }
            }
            if !self.skip(&path, Quantity::Clock) {
                match self.platform.get_clock_freq(&path).await {
                    Ok(khz) => {
                        profile.clock_khz = Some(khz);
                        sampled = true;
                    }
                    Err(ArbiterError::NotSupported(_)) => self.mark_unsupported(&path, Quantity::Clock),
                    Err(e) => debug!(path = %path, error = %e, "Clock sampling failed"),
                }
            }
            if !self.skip(&path, Quantity::Power) {
                match self.platform.get_power_usage(&path).await {
                    Ok(mw) => {
                        profile.power_mw = Some(mw);
                        sampled = true;
                    }
                    Err(ArbiterError::NotSupported(_)) => self.mark_unsupported(&path, Quantity::Power),
                    Err(e) => debug!(path = %path, error = %e, "Power sampling failed"),
                }
            }
            if !self.skip(&path, Quantity::FanSpeed) {
                match self.platform.get_fan_speed(&path).await {
                    Ok(percent) => {
                        profile.fan_speed = Some(percent);
                        sampled = true;
                    }
                    Err(ArbiterError::NotSupported(_)) => {
                        self.mark_unsupported(&path, Quantity::FanSpeed)
                    }
                    Err(e) => debug!(path = %path, error = %e, "Fan sampling failed"),
                }
            }

            if sampled {
                let mut accounter = self.accounter.lock();
                if let Some(node) = accounter.node_mut(&path) {
                    node.update_power(profile);
                }
            }
        }
    }
}

#[async_trait]
impl Worker for PowerMonitor {
    fn name(&self) -> &str {
        "bq.pm.monitor"
    }

    async fn run(&self, done: CancellationToken) -> Result<(), ArbiterError> {
        if self.period.is_zero() {
            debug!("Power monitor disabled (zero period)");
            done.cancelled().await;
            return Ok(());
        }
        loop {
            tokio::select! {
                _ = done.cancelled() => return Ok(()),
                _ = tokio::time::sleep(self.period) => self.sample_all().await,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use resource_arbiter_domain::{Assignment, DeclaredUnit, WorkloadDescriptor};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Adapter supporting only load queries, counting how often it is
    /// asked for temperature.
    struct LoadOnlyAdapter {
        temperature_queries: AtomicUsize,
    }

    #[async_trait]
    impl PlatformService for LoadOnlyAdapter {
        async fn load_platform_data(&self) -> Result<(), ArbiterError> {
            Ok(())
        }
        async fn start(&self) -> Result<(), ArbiterError> {
            Ok(())
        }
        async fn stop(&self) -> Result<(), ArbiterError> {
            Ok(())
        }
        async fn map_resources(
            &self,
            _workload: &WorkloadDescriptor,
            _assignment: &Assignment,
        ) -> Result<(), ArbiterError> {
            Ok(())
        }
        async fn reclaim_resources(
            &self,
            _workload: &WorkloadDescriptor,
        ) -> Result<(), ArbiterError> {
            Ok(())
        }
        async fn get_load(&self, _path: &ResourcePath) -> Result<f32, ArbiterError> {
            Ok(42.5)
        }
        async fn get_temperature(&self, path: &ResourcePath) -> Result<u32, ArbiterError> {
            self.temperature_queries.fetch_add(1, Ordering::SeqCst);
            Err(resource_arbiter_domain::not_supported("get_temperature", path))
        }
    }

    #[tokio::test]
    async fn test_sampling_updates_profiles_and_remembers_unsupported() {
        let mut ra = ResourceAccounter::new();
        ra.register("sys0.cpu0.pe0", DeclaredUnit::Count, 100).unwrap();
        let accounter = Arc::new(Mutex::new(ra));
        let adapter = Arc::new(LoadOnlyAdapter {
            temperature_queries: AtomicUsize::new(0),
        });
        let monitor = PowerMonitor::new(
            Arc::clone(&accounter),
            Arc::clone(&adapter) as Arc<dyn PlatformService>,
            Duration::from_millis(100),
        );

        monitor.sample_all().await;
        monitor.sample_all().await;

        let path: ResourcePath = "sys0.cpu0.pe0".parse().unwrap();
        {
            let accounter = accounter.lock();
            let node = accounter.node(&path).unwrap();
            assert_eq!(node.power().load, Some(42.5));
            assert!(node.power().sampled_at.is_some());
            assert_eq!(node.power().temperature, None);
        }
        // Unsupported quantities are asked exactly once per node:
        // pe0 plus its auto-created ancestors sys0 and sys0.cpu0
        assert_eq!(adapter.temperature_queries.load(Ordering::SeqCst), 3);
    }
}
