//! # Synchronisation Failure Scenarios
//!
//! Agent misbehaviour during the protocol: an unresponsive agent is
//! disabled, the session still commits, and the committed view stays
//! untouched.

mod common;

use common::{FnPolicy, Harness, ScriptedAgent};
use resource_arbiter::application::services::SchedulingResult;
use resource_arbiter::SyncResult;
use resource_arbiter_domain::{State, SyncState};

fn pinned_policy() -> std::sync::Arc<
    FnPolicy<
        impl Fn(
                &resource_arbiter::System,
            ) -> Result<resource_arbiter_domain::ViewToken, resource_arbiter_domain::ArbiterError>
            + Send
            + Sync,
    >,
> {
    FnPolicy::new("test.pinned", |system| {
        let view = system.get_view("test.pinned")?;
        for handle in system.apps_by_priority() {
            let uid = handle.read().uid();
            system.schedule_request(uid, 0, view, 0)?;
        }
        Ok(view)
    })
}

/// S4 — agent timeout during PreChange.
///
/// The cold-start scenario, but the agent never answers: the workload
/// is disabled and a miss accounted, the session commits empty and the
/// committed view is unchanged.
#[tokio::test]
async fn test_agent_timeout_disables_and_commits_empty() {
    let harness = Harness::new(
        &[
            ("sys0.cpu0.pe0", 100),
            ("sys0.cpu0.pe1", 100),
            ("sys0.cpu0.pe2", 100),
            ("sys0.cpu0.pe3", 100),
        ],
        pinned_policy(),
    );
    let uid = harness.ready_app(std::process::id(), "deaf", 1, &[(0, 200)]);
    harness
        .system
        .applications()
        .attach_agent(uid, ScriptedAgent::unresponsive());

    assert!(matches!(
        harness.scheduler.schedule(),
        SchedulingResult::Done { .. }
    ));

    // The session survives the unresponsive agent
    assert_eq!(harness.synchronizer.sync_schedule().await, SyncResult::Ok);

    let app = harness.system.applications().get(uid).unwrap();
    assert_eq!(app.read().state(), State::Sync(SyncState::Disabled));
    assert!(app.read().schedulable().current_awm().is_none());

    // Nothing was committed for the disabled workload
    assert_eq!(harness.used("sys0.cpu0.pe0"), 0);
    assert_eq!(harness.used("sys0.cpu0.pe1"), 0);
    assert_eq!(harness.metrics.sync_misses.get(), 1);
    assert_eq!(harness.metrics.sync_completed.get(), 1);
    harness.accounter.lock().audit().unwrap();
}

/// A disabled workload stays out of later cycles until re-enabled.
#[tokio::test]
async fn test_disabled_workload_is_skipped_until_reenabled() {
    let harness = Harness::new(&[("sys0.cpu0.pe0", 100)], pinned_policy());
    let uid = harness.ready_app(std::process::id(), "flaky", 1, &[(0, 100)]);
    harness
        .system
        .applications()
        .attach_agent(uid, ScriptedAgent::unresponsive());

    assert!(matches!(
        harness.scheduler.schedule(),
        SchedulingResult::Done { .. }
    ));
    assert_eq!(harness.synchronizer.sync_schedule().await, SyncResult::Ok);
    assert!(harness
        .system
        .applications()
        .get(uid)
        .unwrap()
        .read()
        .schedulable()
        .is_disabled());

    // Nothing left to schedule
    assert_eq!(harness.scheduler.schedule(), SchedulingResult::NoOp);

    // Re-enable with a responsive agent and run a full cycle
    harness
        .system
        .applications()
        .attach_agent(uid, ScriptedAgent::responsive(5));
    harness.system.applications().enable_exc(uid).unwrap();
    assert!(matches!(
        harness.scheduler.schedule(),
        SchedulingResult::Done { .. }
    ));
    assert_eq!(harness.synchronizer.sync_schedule().await, SyncResult::Ok);
    assert_eq!(
        harness.system.applications().get(uid).unwrap().read().state(),
        State::Running
    );
    assert_eq!(harness.used("sys0.cpu0.pe0"), 100);
}
