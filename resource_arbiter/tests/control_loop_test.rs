//! # Control Loop Scenarios
//!
//! Event debouncing and coalescing over the real control loop with
//! paused time: a burst of optimisation requests costs one scheduler
//! run, and every posted event leads to at least one later run.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{FnPolicy, Harness};
use resource_arbiter::{ControlEvent, ControlLoop};
use resource_arbiter_bootstrap::shutdown::CancellationToken;

struct LoopHarness {
    policy: std::sync::Arc<
        FnPolicy<
            Box<
                dyn Fn(
                        &resource_arbiter::System,
                    ) -> Result<
                        resource_arbiter_domain::ViewToken,
                        resource_arbiter_domain::ArbiterError,
                    > + Send
                    + Sync,
            >,
        >,
    >,
    control: Arc<ControlLoop>,
    token: CancellationToken,
}

fn loop_harness() -> LoopHarness {
    let policy = FnPolicy::new(
        "test.counting",
        Box::new(|system: &resource_arbiter::System| system.get_view("test.counting"))
            as Box<
                dyn Fn(
                        &resource_arbiter::System,
                    ) -> Result<
                        resource_arbiter_domain::ViewToken,
                        resource_arbiter_domain::ArbiterError,
                    > + Send
                    + Sync,
            >,
    );
    let harness = Harness::new(&[("sys0.cpu0.pe0", 100)], policy.clone());
    // One ready application keeps the loop's optimisation path active
    harness.ready_app(std::process::id(), "idle", 1, &[(0, 100)]);

    let token = CancellationToken::new();
    let control = ControlLoop::new(
        Arc::clone(&harness.system),
        Arc::clone(&harness.scheduler),
        Arc::clone(&harness.synchronizer),
        Arc::clone(&harness.metrics),
        None,
        token.clone(),
    );
    LoopHarness {
        policy,
        control,
        token,
    }
}

/// S6 — event debouncing.
///
/// Ten optimisation requests within 50 ms with a ready application:
/// exactly one scheduler run happens before 300 ms have elapsed.
#[tokio::test(start_paused = true)]
async fn test_opt_request_burst_runs_scheduler_once() {
    let harness = loop_harness();
    let bus = harness.control.bus();
    let control = Arc::clone(&harness.control);
    tokio::spawn(async move {
        control.run().await;
    });

    for _ in 0..10 {
        bus.notify_event(ControlEvent::OptRequest);
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    tokio::time::sleep(Duration::from_millis(250)).await;

    assert_eq!(harness.policy.runs(), 1);
    harness.token.cancel();
}

/// Event coalescing preserves at-least-once semantics: a second burst
/// after the first settles triggers another run.
#[tokio::test(start_paused = true)]
async fn test_every_burst_triggers_a_run() {
    let harness = loop_harness();
    let bus = harness.control.bus();
    let control = Arc::clone(&harness.control);
    tokio::spawn(async move {
        control.run().await;
    });

    bus.notify_event(ControlEvent::OptRequest);
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(harness.policy.runs(), 1);

    bus.notify_event(ControlEvent::ExcStart);
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(harness.policy.runs(), 2);

    harness.token.cancel();
}

/// The exit event ends the loop without further scheduler runs.
#[tokio::test(start_paused = true)]
async fn test_exit_event_stops_the_loop() {
    let harness = loop_harness();
    let bus = harness.control.bus();
    let control = Arc::clone(&harness.control);
    let runner = tokio::spawn(async move { control.run().await });

    bus.notify_event(ControlEvent::OptRequest);
    bus.notify_event(ControlEvent::Exit);
    let outcome = runner.await.unwrap();
    assert_eq!(outcome, resource_arbiter::LoopOutcome::Exit);
    assert_eq!(harness.policy.runs(), 0);
}
