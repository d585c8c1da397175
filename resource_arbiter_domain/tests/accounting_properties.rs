//! # Accounting Property Tests
//!
//! Property-based tests over the resource accounter:
//!
//! - **Conservation**: after any sequence of bookings and releases, on
//!   every view and node, `used + available = total - reserved` and no
//!   node is ever charged past its capacity.
//! - **Abort purity**: a sync session that is aborted leaves every
//!   observable query exactly as before `sync_start`.
//! - **Commit idempotence**: a session with no reconfiguring workload
//!   commits to an unchanged system ledger.

use proptest::prelude::*;

use resource_arbiter_domain::{
    Binding, DeclaredUnit, FillPolicy, ResourceAccounter, ResourcePath, ResourceRequest,
    SYSTEM_VIEW,
};

fn path(s: &str) -> ResourcePath {
    s.parse().unwrap()
}

/// Builds a platform with `cpus` CPUs of `pes` processing elements each.
fn platform(cpus: u32, pes: u32) -> ResourceAccounter {
    let mut ra = ResourceAccounter::new();
    for cpu in 0..cpus {
        for pe in 0..pes {
            ra.register(&format!("sys0.cpu{}.pe{}", cpu, pe), DeclaredUnit::Count, 100)
                .unwrap();
        }
    }
    ra
}

/// One step of the accounting workload exercised by the properties.
#[derive(Debug, Clone)]
enum Step {
    Book { uid: u64, amount: u64, balanced: bool },
    Release { uid: u64 },
}

fn step_strategy() -> impl Strategy<Value = Step> {
    prop_oneof![
        (1u64..8, 1u64..500, any::<bool>()).prop_map(|(uid, amount, balanced)| Step::Book {
            uid,
            amount,
            balanced
        }),
        (1u64..8).prop_map(|uid| Step::Release { uid }),
    ]
}

fn apply_steps(ra: &mut ResourceAccounter, steps: &[Step]) {
    for step in steps {
        match step {
            Step::Book { uid, amount, balanced } => {
                let policy = if *balanced {
                    FillPolicy::Balanced
                } else {
                    FillPolicy::Sequential
                };
                let requests = vec![ResourceRequest::new(path("sys.cpu.pe"), *amount, policy)];
                // Overbooking and double-booking rejections are part of
                // normal operation here
                let _ = ra.book_resources(*uid, &requests, &Binding::new(), SYSTEM_VIEW, true);
            }
            Step::Release { uid } => {
                let _ = ra.release_resources(*uid, SYSTEM_VIEW);
            }
        }
    }
}

proptest! {
    /// Conservation holds after any step sequence.
    #[test]
    fn prop_conservation(steps in proptest::collection::vec(step_strategy(), 1..40)) {
        let mut ra = platform(2, 4);
        apply_steps(&mut ra, &steps);

        ra.audit().unwrap();
        let total = ra.total(&path("sys.cpu.pe"));
        let used = ra.used(&path("sys.cpu.pe"), SYSTEM_VIEW).unwrap();
        let available = ra.available(&path("sys.cpu.pe"), SYSTEM_VIEW, None).unwrap();
        prop_assert_eq!(used + available, total);
    }

    /// Aborting a sync session restores every observable query.
    #[test]
    fn prop_abort_purity(
        steps in proptest::collection::vec(step_strategy(), 1..25),
        extra in 1u64..300,
    ) {
        let mut ra = platform(2, 4);
        apply_steps(&mut ra, &steps);

        let running: Vec<u64> = ra.holders(SYSTEM_VIEW);
        let before_used = ra.used(&path("sys.cpu.pe"), SYSTEM_VIEW).unwrap();
        let before_views = ra.view_count();
        let mut before_holders = ra.holders(SYSTEM_VIEW);
        before_holders.sort_unstable();

        if ra.sync_start(&running).is_ok() {
            let requests = vec![ResourceRequest::new(
                path("sys.cpu.pe"),
                extra,
                FillPolicy::Sequential,
            )];
            let _ = ra.sync_acquire(99, &requests, &Binding::new(), None);
            ra.sync_abort();
        }

        prop_assert_eq!(ra.used(&path("sys.cpu.pe"), SYSTEM_VIEW).unwrap(), before_used);
        prop_assert_eq!(ra.view_count(), before_views);
        let mut after_holders = ra.holders(SYSTEM_VIEW);
        after_holders.sort_unstable();
        prop_assert_eq!(after_holders, before_holders);
        ra.audit().unwrap();
    }

    /// A sync session with no reconfiguration commits to the same ledger.
    #[test]
    fn prop_empty_commit_idempotent(steps in proptest::collection::vec(step_strategy(), 1..25)) {
        let mut ra = platform(2, 4);
        apply_steps(&mut ra, &steps);

        let running: Vec<u64> = ra.holders(SYSTEM_VIEW);
        let before: Vec<(String, u64)> = ra
            .status_report()
            .into_iter()
            .map(|row| (row.path.to_string(), row.used))
            .collect();

        ra.sync_start(&running).unwrap();
        ra.sync_commit().unwrap();

        let after: Vec<(String, u64)> = ra
            .status_report()
            .into_iter()
            .map(|row| (row.path.to_string(), row.used))
            .collect();
        prop_assert_eq!(before, after);
        ra.audit().unwrap();
    }
}
