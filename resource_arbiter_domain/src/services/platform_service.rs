// /////////////////////////////////////////////////////////////////////////////
// Resource Arbiter RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Platform Service Port
//!
//! Infrastructure port towards the platform adapter: the subsystem that
//! maps logical resource assignments onto the OS and hardware (control
//! groups, DVFS, fans, accelerator firmware) and samples power/thermal
//! quantities.
//!
//! The port is async because every operation ultimately crosses into
//! sysfs, drivers or vendor libraries. Sampling queries return
//! `NotSupported` for quantities a thin adapter does not implement; the
//! power monitor records such answers once and stops asking.

use async_trait::async_trait;

use crate::entities::schedulable::{Pid, SchedUid, Schedulable};
use crate::entities::working_mode::Assignment;
use crate::error::ArbiterError;
use crate::value_objects::ResourcePath;

/// Owned, lock-free identification of a workload handed to the adapter.
#[derive(Debug, Clone)]
pub struct WorkloadDescriptor {
    pub uid: SchedUid,
    pub pid: Pid,
    pub name: String,
}

impl From<&Schedulable> for WorkloadDescriptor {
    fn from(sched: &Schedulable) -> Self {
        Self {
            uid: sched.uid(),
            pid: sched.pid(),
            name: sched.name().to_string(),
        }
    }
}

/// Convenience constructor for `NotSupported` answers.
pub fn not_supported(what: &str, path: &ResourcePath) -> ArbiterError {
    ArbiterError::NotSupported(format!("{} on {}", what, path))
}

/// The platform adapter port.
///
/// Control operations are mandatory; sampling and tuning queries default
/// to `NotSupported` so thin adapters only implement what the hardware
/// offers.
#[async_trait]
pub trait PlatformService: Send + Sync {
    /// Discovers platform resources and registers them with the arbiter.
    async fn load_platform_data(&self) -> Result<(), ArbiterError>;

    /// Starts the adapter (event sources, vendor sessions).
    async fn start(&self) -> Result<(), ArbiterError>;

    /// Stops the adapter.
    async fn stop(&self) -> Result<(), ArbiterError>;

    /// Maps (or re-maps) the given per-node assignment onto the platform.
    async fn map_resources(
        &self,
        workload: &WorkloadDescriptor,
        assignment: &Assignment,
    ) -> Result<(), ArbiterError>;

    /// Releases whatever the workload currently holds on the platform.
    async fn reclaim_resources(&self, workload: &WorkloadDescriptor) -> Result<(), ArbiterError>;

    /// Sets the power state of a resource.
    async fn set_power_state(&self, path: &ResourcePath, state: u32) -> Result<(), ArbiterError> {
        let _ = state;
        Err(not_supported("set_power_state", path))
    }

    /// Load percentage (0..100).
    async fn get_load(&self, path: &ResourcePath) -> Result<f32, ArbiterError> {
        Err(not_supported("get_load", path))
    }

    /// Temperature in millidegree Celsius.
    async fn get_temperature(&self, path: &ResourcePath) -> Result<u32, ArbiterError> {
        Err(not_supported("get_temperature", path))
    }

    /// Clock frequency in KHz.
    async fn get_clock_freq(&self, path: &ResourcePath) -> Result<u32, ArbiterError> {
        Err(not_supported("get_clock_freq", path))
    }

    /// Supported clock frequencies in KHz.
    async fn get_available_freqs(&self, path: &ResourcePath) -> Result<Vec<u32>, ArbiterError> {
        Err(not_supported("get_available_freqs", path))
    }

    /// Sets the clock frequency in KHz.
    async fn set_clock_freq(&self, path: &ResourcePath, khz: u32) -> Result<(), ArbiterError> {
        let _ = khz;
        Err(not_supported("set_clock_freq", path))
    }

    /// Voltage in millivolts.
    async fn get_voltage(&self, path: &ResourcePath) -> Result<u32, ArbiterError> {
        Err(not_supported("get_voltage", path))
    }

    /// Fan speed percentage (0..100).
    async fn get_fan_speed(&self, path: &ResourcePath) -> Result<u8, ArbiterError> {
        Err(not_supported("get_fan_speed", path))
    }

    /// Sets the fan speed percentage (0..100).
    async fn set_fan_speed(&self, path: &ResourcePath, percent: u8) -> Result<(), ArbiterError> {
        let _ = percent;
        Err(not_supported("set_fan_speed", path))
    }

    /// Power consumption in milliwatts.
    async fn get_power_usage(&self, path: &ResourcePath) -> Result<u32, ArbiterError> {
        Err(not_supported("get_power_usage", path))
    }

    /// Current performance state index.
    async fn get_perf_state(&self, path: &ResourcePath) -> Result<u32, ArbiterError> {
        Err(not_supported("get_perf_state", path))
    }

    /// Sets the performance state index.
    async fn set_perf_state(&self, path: &ResourcePath, state: u32) -> Result<(), ArbiterError> {
        let _ = state;
        Err(not_supported("set_perf_state", path))
    }
}
