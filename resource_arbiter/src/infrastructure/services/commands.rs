// /////////////////////////////////////////////////////////////////////////////
// Resource Arbiter RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Predefined Commands
//!
//! Registration of the operator commands served over the FIFO:
//!
//! - `bq.rm.*` — control-loop commands: status dumps and `opt_force`;
//! - `bq.prm.*` — process-manager commands: `add`, `remove`, `setsched`;
//! - `bq.pm.*` — power-manager commands: `fanspeed_set`.
//!
//! Reply codes: 0 on success, 1 for argument errors, 2 for refused
//! operations; unknown commands answer -1 at the dispatch layer.

use std::sync::Arc;

use tracing::info;

use resource_arbiter_domain::{
    ArbiterError, Pid, PlatformService, ResourcePath, ScheduleRequest,
};

use crate::application::services::{System, WorkloadSnapshot};
use crate::infrastructure::logging::{
    report_resources, report_sync_queues, report_workloads, WorkloadStatusRow,
};
use crate::infrastructure::runtime::control_loop::{ControlEvent, EventBus};
use crate::infrastructure::services::command_server::CommandManager;

fn to_rows(snapshot: Vec<WorkloadSnapshot>) -> Vec<WorkloadStatusRow> {
    snapshot
        .into_iter()
        .map(|s| WorkloadStatusRow {
            id: s.id,
            priority: s.priority,
            state: s.state.to_string(),
            current_awm: s.current_awm.unwrap_or_else(|| "-".to_string()),
            next_awm: s.next_awm.unwrap_or_else(|| "-".to_string()),
        })
        .collect()
}

/// Registers every predefined command on the manager.
pub fn register_core_commands(
    commands: &CommandManager,
    system: Arc<System>,
    bus: Arc<EventBus>,
    platform: Arc<dyn PlatformService>,
) {
    // ------------------------------------------------------------------
    // bq.rm.* — control loop
    // ------------------------------------------------------------------
    {
        let system = Arc::clone(&system);
        commands.register_command(
            "bq.rm.exc_status",
            "Dump the status of every managed workload",
            Arc::new(move |_args| {
                let system = Arc::clone(&system);
                Box::pin(async move {
                    report_workloads("Applications", &to_rows(system.applications().snapshot()));
                    report_workloads("Processes", &to_rows(system.processes().snapshot()));
                    0
                })
            }),
        );
    }
    {
        let system = Arc::clone(&system);
        commands.register_command(
            "bq.rm.que_status",
            "Dump the scheduler status queues",
            Arc::new(move |_args| {
                let system = Arc::clone(&system);
                Box::pin(async move {
                    let queues: Vec<(String, usize)> = [
                        resource_arbiter_domain::State::New,
                        resource_arbiter_domain::State::Ready,
                        resource_arbiter_domain::State::Running,
                        resource_arbiter_domain::State::Finished,
                    ]
                    .into_iter()
                    .map(|state| {
                        (
                            state.to_string(),
                            system.applications().count(state) + system.processes().count(state),
                        )
                    })
                    .collect();
                    report_sync_queues(&queues);
                    0
                })
            }),
        );
    }
    {
        let system = Arc::clone(&system);
        commands.register_command(
            "bq.rm.res_status",
            "Dump the per-resource accounting of the system view",
            Arc::new(move |_args| {
                let system = Arc::clone(&system);
                Box::pin(async move {
                    report_resources(&system.accounter().lock().status_report());
                    0
                })
            }),
        );
    }
    {
        let system = Arc::clone(&system);
        commands.register_command(
            "bq.rm.syn_status",
            "Dump the synchronisation queues and session state",
            Arc::new(move |_args| {
                let system = Arc::clone(&system);
                Box::pin(async move {
                    let mut queues: Vec<(String, usize)> = system
                        .applications()
                        .sync_queue_counts()
                        .into_iter()
                        .map(|(flavour, count)| (flavour.to_string(), count))
                        .collect();
                    let (active, session) = {
                        let accounter = system.accounter().lock();
                        (accounter.sync_active(), accounter.sync_session_id())
                    };
                    queues.push(("SESSION".to_string(), session as usize));
                    info!(session, active, "Synchronisation session state");
                    report_sync_queues(&queues);
                    0
                })
            }),
        );
    }
    {
        let bus = Arc::clone(&bus);
        commands.register_command(
            "bq.rm.opt_force",
            "Force an optimisation run",
            Arc::new(move |_args| {
                let bus = Arc::clone(&bus);
                Box::pin(async move {
                    bus.notify_event(ControlEvent::OptRequest);
                    0
                })
            }),
        );
    }

    // ------------------------------------------------------------------
    // bq.prm.* — process manager
    // ------------------------------------------------------------------
    {
        let system = Arc::clone(&system);
        commands.register_command(
            "bq.prm.add",
            "Add a process to manage (by executable name)",
            Arc::new(move |args| {
                let system = Arc::clone(&system);
                Box::pin(async move {
                    match args.first() {
                        Some(name) => {
                            system.processes().add(name);
                            0
                        }
                        None => 1,
                    }
                })
            }),
        );
    }
    {
        let system = Arc::clone(&system);
        commands.register_command(
            "bq.prm.remove",
            "Remove a managed process (by executable name)",
            Arc::new(move |args| {
                let system = Arc::clone(&system);
                Box::pin(async move {
                    match args.first() {
                        Some(name) => {
                            system.processes().remove(name);
                            0
                        }
                        None => 1,
                    }
                })
            }),
        );
    }
    {
        let system = Arc::clone(&system);
        commands.register_command(
            "bq.prm.setsched",
            "Set a resource allocation request: -n<name> [-p<pid>] -c<cpu_cores> [-a<acc_cores>] [-m<memory_mb>]",
            Arc::new(move |args| {
                let system = Arc::clone(&system);
                Box::pin(async move {
                    match parse_setsched(&args) {
                        Ok((name, pid, request)) => {
                            system.processes().add(&name);
                            system.processes().set_sched_request(&name, pid, request);
                            0
                        }
                        Err(e) => {
                            info!(error = %e, "setsched: invalid arguments");
                            1
                        }
                    }
                })
            }),
        );
    }

    // ------------------------------------------------------------------
    // bq.pm.* — power manager
    // ------------------------------------------------------------------
    {
        let platform = Arc::clone(&platform);
        commands.register_command(
            "bq.pm.fanspeed_set",
            "Set a fan speed: <resource_path> <0..100>",
            Arc::new(move |args| {
                let platform = Arc::clone(&platform);
                Box::pin(async move {
                    let (path, percent) = match (args.first(), args.get(1)) {
                        (Some(path), Some(percent)) => (path.clone(), percent.clone()),
                        _ => return 1,
                    };
                    let path: ResourcePath = match path.parse() {
                        Ok(path) => path,
                        Err(_) => return 1,
                    };
                    let percent: u8 = match percent.parse() {
                        Ok(percent) if percent <= 100 => percent,
                        _ => return 1,
                    };
                    match platform.set_fan_speed(&path, percent).await {
                        Ok(()) => 0,
                        Err(_) => 2,
                    }
                })
            }),
        );
    }
}

/// Parses `setsched` options, accepting both `-n<name>` and `-n <name>`.
fn parse_setsched(
    args: &[String],
) -> Result<(String, Option<Pid>, ScheduleRequest), ArbiterError> {
    let mut name: Option<String> = None;
    let mut pid: Option<Pid> = None;
    let mut request = ScheduleRequest::default();

    let mut iter = args.iter().peekable();
    while let Some(arg) = iter.next() {
        let (flag, inline) = match arg.strip_prefix('-') {
            Some(rest) if !rest.is_empty() => {
                let (flag, value) = rest.split_at(1);
                (flag.to_string(), value.to_string())
            }
            _ => {
                return Err(ArbiterError::InvalidConfiguration(format!(
                    "unexpected argument '{}'",
                    arg
                )));
            }
        };
        let value = if inline.is_empty() {
            iter.next().cloned().ok_or_else(|| {
                ArbiterError::InvalidConfiguration(format!("-{} requires a value", flag))
            })?
        } else {
            inline
        };

        let numeric = || {
            value.parse::<u32>().map_err(|_| {
                ArbiterError::InvalidConfiguration(format!("-{}: '{}' is not a number", flag, value))
            })
        };
        match flag.as_str() {
            "n" => name = Some(value),
            "p" => pid = Some(numeric()?),
            "c" => request.cpu_cores = numeric()?,
            "a" => request.acc_cores = numeric()?,
            "m" => request.memory_mb = numeric()?,
            other => {
                return Err(ArbiterError::InvalidConfiguration(format!(
                    "unknown option -{}",
                    other
                )));
            }
        }
    }

    let name =
        name.ok_or_else(|| ArbiterError::InvalidConfiguration("-n<name> is required".into()))?;
    if request.cpu_cores == 0 {
        return Err(ArbiterError::InvalidConfiguration(
            "-c<cpu_cores> is required".into(),
        ));
    }
    Ok((name, pid, request))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_setsched_attached_values() {
        let (name, pid, request) =
            parse_setsched(&args(&["-nfoo", "-p4242", "-c2", "-a1", "-m128"])).unwrap();
        assert_eq!(name, "foo");
        assert_eq!(pid, Some(4242));
        assert_eq!(request.cpu_cores, 2);
        assert_eq!(request.acc_cores, 1);
        assert_eq!(request.memory_mb, 128);
    }

    #[test]
    fn test_setsched_detached_values() {
        let (name, pid, request) = parse_setsched(&args(&["-n", "foo", "-c", "4"])).unwrap();
        assert_eq!(name, "foo");
        assert_eq!(pid, None);
        assert_eq!(request.cpu_cores, 4);
        assert_eq!(request.memory_mb, 0);
    }

    #[test]
    fn test_setsched_validation() {
        // Name and cpu cores are mandatory
        assert!(parse_setsched(&args(&["-c2"])).is_err());
        assert!(parse_setsched(&args(&["-nfoo"])).is_err());
        assert!(parse_setsched(&args(&["-nfoo", "-cx"])).is_err());
        assert!(parse_setsched(&args(&["-nfoo", "-c2", "-zbad"])).is_err());
        assert!(parse_setsched(&args(&["-nfoo", "-c2", "orphan"])).is_err());
    }
}
