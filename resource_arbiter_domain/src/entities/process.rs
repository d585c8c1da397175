// /////////////////////////////////////////////////////////////////////////////
// Resource Arbiter RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Process
//!
//! A plain OS process under management. Processes are not paired over the
//! workload-agent channel: the process manager learns about them from
//! start/stop notifications matched against a table of managed executable
//! names, and their resource demand is a single *fluid* request (CPU
//! cores, accelerator cores, memory) instead of a recipe catalogue.
//!
//! At scheduling time the fluid request is lowered into an ordinary
//! working mode, so downstream machinery (binder, accounter, platform
//! mapping) sees processes and applications uniformly.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::entities::schedulable::{Pid, Priority, Schedulable, SchedUid, State};
use crate::entities::working_mode::WorkingMode;
use crate::error::ArbiterError;
use crate::value_objects::{FillPolicy, ResourceRequest};

/// Processing-element quota granted per requested core (percent).
pub const QUOTA_PER_CORE: u64 = 100;

/// Default priority of managed processes.
pub const DEFAULT_PROCESS_PRIORITY: Priority = 14;

/// Fluid resource demand of a managed process.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleRequest {
    /// CPU cores (each worth a 100% processing-element quota)
    pub cpu_cores: u32,
    /// Accelerator cores
    pub acc_cores: u32,
    /// Memory in mebibytes
    pub memory_mb: u32,
}

impl ScheduleRequest {
    /// Lowers the fluid demand into resource requests.
    pub fn to_resource_requests(&self) -> Result<Vec<ResourceRequest>, ArbiterError> {
        let mut requests = Vec::new();
        if self.cpu_cores > 0 {
            requests.push(ResourceRequest::new(
                "sys.cpu.pe".parse()?,
                u64::from(self.cpu_cores) * QUOTA_PER_CORE,
                FillPolicy::Balanced,
            ));
        }
        if self.acc_cores > 0 {
            requests.push(ResourceRequest::new(
                "sys.acc.pe".parse()?,
                u64::from(self.acc_cores) * QUOTA_PER_CORE,
                FillPolicy::Balanced,
            ));
        }
        if self.memory_mb > 0 {
            requests.push(ResourceRequest::new(
                "sys.mem".parse()?,
                u64::from(self.memory_mb) * 1024 * 1024,
                FillPolicy::Sequential,
            ));
        }
        Ok(requests)
    }

    /// Whether the request asks for anything at all.
    pub fn is_empty(&self) -> bool {
        self.cpu_cores == 0 && self.acc_cores == 0 && self.memory_mb == 0
    }
}

impl fmt::Display for ScheduleRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "cpus={} accs={} mem={}Mb",
            self.cpu_cores, self.acc_cores, self.memory_mb
        )
    }
}

/// A plain OS process under management.
#[derive(Debug, Clone)]
pub struct Process {
    sched: Schedulable,
    request: ScheduleRequest,
}

impl Process {
    /// Folds a pid into the registry-wide unique id. The high bit keeps
    /// process uids disjoint from application uids.
    pub fn uid_for(pid: Pid) -> SchedUid {
        (1u64 << 63) | u64::from(pid)
    }

    /// Creates a managed process with its fluid demand.
    pub fn new(
        name: impl Into<String>,
        pid: Pid,
        priority: Priority,
        request: ScheduleRequest,
    ) -> Self {
        Self {
            sched: Schedulable::new(Self::uid_for(pid), pid, name, priority),
            request,
        }
    }

    pub fn uid(&self) -> SchedUid {
        self.sched.uid()
    }

    pub fn pid(&self) -> Pid {
        self.sched.pid()
    }

    pub fn name(&self) -> &str {
        self.sched.name()
    }

    pub fn state(&self) -> State {
        self.sched.state()
    }

    /// The shared workload model.
    pub fn schedulable(&self) -> &Schedulable {
        &self.sched
    }

    /// Mutable access to the shared workload model.
    pub fn schedulable_mut(&mut self) -> &mut Schedulable {
        &mut self.sched
    }

    /// The fluid resource demand.
    pub fn sched_request(&self) -> ScheduleRequest {
        self.request
    }

    /// Replaces the fluid resource demand (picked up at the next
    /// scheduling cycle).
    pub fn set_sched_request(&mut self, request: ScheduleRequest) {
        self.request = request;
    }

    /// Lowers the fluid demand into a single-mode catalogue entry.
    ///
    /// # Errors
    /// Returns `AwmNotSchedulable` when the request is empty.
    pub fn to_working_mode(&self) -> Result<WorkingMode, ArbiterError> {
        if self.request.is_empty() {
            return Err(ArbiterError::AwmNotSchedulable(format!(
                "{}: empty scheduling request",
                self.sched
            )));
        }
        WorkingMode::new(0, "fluid", 1.0, self.request.to_resource_requests()?)
    }
}

impl fmt::Display for Process {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{:05}", self.name(), self.pid())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uid_disjoint_from_applications() {
        use crate::entities::application::Application;
        assert_ne!(Process::uid_for(100), Application::uid_for(100, 0));
    }

    /// Tests lowering the fluid request into resource requests.
    #[test]
    fn test_request_lowering() {
        let request = ScheduleRequest {
            cpu_cores: 2,
            acc_cores: 0,
            memory_mb: 128,
        };
        let lowered = request.to_resource_requests().unwrap();
        assert_eq!(lowered.len(), 2);
        assert_eq!(lowered[0].path.to_string(), "sys.cpu.pe");
        assert_eq!(lowered[0].amount, 200);
        assert_eq!(lowered[0].policy, FillPolicy::Balanced);
        assert_eq!(lowered[1].path.to_string(), "sys.mem");
        assert_eq!(lowered[1].amount, 128 * 1024 * 1024);
    }

    #[test]
    fn test_empty_request_not_schedulable() {
        let proc = Process::new("idle", 4242, DEFAULT_PROCESS_PRIORITY, ScheduleRequest::default());
        assert!(matches!(
            proc.to_working_mode(),
            Err(ArbiterError::AwmNotSchedulable(_))
        ));
    }

    #[test]
    fn test_working_mode_synthesis() {
        let proc = Process::new(
            "worker",
            4242,
            DEFAULT_PROCESS_PRIORITY,
            ScheduleRequest {
                cpu_cores: 1,
                acc_cores: 1,
                memory_mb: 0,
            },
        );
        let awm = proc.to_working_mode().unwrap();
        assert_eq!(awm.id(), 0);
        assert_eq!(awm.requests().len(), 2);
    }
}
