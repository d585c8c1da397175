//! # Managed Process Scenarios
//!
//! The process-manager flow: manage a name, observe a start, schedule
//! the fluid request and commit the session.

mod common;

use common::{FnPolicy, Harness};
use resource_arbiter::application::services::SchedulingResult;
use resource_arbiter::SyncResult;
use resource_arbiter_domain::{ScheduleRequest, State, SyncState};

fn process_policy() -> std::sync::Arc<
    FnPolicy<
        impl Fn(
                &resource_arbiter::System,
            ) -> Result<resource_arbiter_domain::ViewToken, resource_arbiter_domain::ArbiterError>
            + Send
            + Sync,
    >,
> {
    FnPolicy::new("test.procs", |system| {
        let view = system.get_view("test.procs")?;
        for handle in system.ready_processes() {
            let uid = handle.read().uid();
            system.process_schedule_request(uid, view)?;
        }
        Ok(view)
    })
}

/// S5 — process flow.
///
/// `add("foo")`, an external start notification for pid 4242, one
/// scheduling cycle: the process runs with its 2-core / 128 Mb request
/// charged and stays reachable by pid.
#[tokio::test]
async fn test_process_schedule_cycle() {
    let harness = Harness::new(
        &[
            ("sys0.cpu0.pe0", 100),
            ("sys0.cpu0.pe1", 100),
            ("sys0.cpu0.pe2", 100),
            ("sys0.cpu0.pe3", 100),
        ],
        process_policy(),
    );
    let procs = harness.system.processes();

    procs.add("foo");
    procs.set_sched_request(
        "foo",
        None,
        ScheduleRequest {
            cpu_cores: 2,
            acc_cores: 0,
            memory_mb: 128,
        },
    );
    procs.notify_start("foo", 4242).unwrap();
    assert_eq!(procs.count(State::Ready), 1);

    assert!(matches!(
        harness.scheduler.schedule(),
        SchedulingResult::Done { .. }
    ));
    {
        let proc = procs.get_by_pid(4242).unwrap();
        assert_eq!(proc.read().state(), State::Sync(SyncState::Starting));
    }

    assert_eq!(harness.synchronizer.sync_schedule().await, SyncResult::Ok);

    let proc = procs.get_by_pid(4242).unwrap();
    assert_eq!(proc.read().state(), State::Running);
    assert_eq!(harness.used("sys.cpu.pe"), 200);
    assert_eq!(harness.used("sys0.mem0"), 128 * 1024 * 1024);
    harness.accounter.lock().audit().unwrap();
}

/// A start notification for an unmanaged name is refused, and exits
/// release everything the instance held.
#[tokio::test]
async fn test_process_exit_releases_resources() {
    let harness = Harness::new(&[("sys0.cpu0.pe0", 100)], process_policy());
    let procs = harness.system.processes();

    assert!(procs.notify_start("bar", 1000).is_err());

    procs.add("foo");
    procs.set_sched_request(
        "foo",
        None,
        ScheduleRequest {
            cpu_cores: 1,
            acc_cores: 0,
            memory_mb: 0,
        },
    );
    procs.notify_start("foo", 1000).unwrap();

    assert!(matches!(
        harness.scheduler.schedule(),
        SchedulingResult::Done { .. }
    ));
    assert_eq!(harness.synchronizer.sync_schedule().await, SyncResult::Ok);
    assert_eq!(harness.used("sys0.cpu0.pe0"), 100);

    procs.notify_exit(1000).unwrap();
    assert!(procs.get_by_pid(1000).is_none());
    assert_eq!(harness.used("sys0.cpu0.pe0"), 0);
    harness.accounter.lock().audit().unwrap();
}
