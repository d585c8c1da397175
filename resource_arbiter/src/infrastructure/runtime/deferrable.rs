// /////////////////////////////////////////////////////////////////////////////
// Resource Arbiter RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Deferrable
//!
//! A debounced, schedulable-at-a-deadline task. The control loop uses one
//! to coalesce bursts of optimisation triggers into a single scheduler
//! run:
//!
//! - `schedule_after(d)` arms the deferrable for `now + d`, but an
//!   already-armed **earlier** deadline wins — new requests only shorten
//!   the pending one, they never push it out;
//! - an optional period re-arms the deferrable after every firing
//!   (on-demand only when absent);
//! - firing invokes the deferred action on the deferrable's own task.

use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, trace};

use resource_arbiter_bootstrap::shutdown::CancellationToken;

/// The action a deferrable runs when its deadline expires.
pub type DeferredAction = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

#[derive(Debug)]
struct DeferState {
    /// The armed deadline, if any
    deadline: Option<Instant>,
    /// Re-arm interval; `None` means on-demand only
    period: Option<Duration>,
}

/// A coalescing deadline timer bound to one deferred action.
pub struct Deferrable {
    name: String,
    state: Arc<Mutex<DeferState>>,
    notify: Arc<Notify>,
    handle: JoinHandle<()>,
}

impl Deferrable {
    /// Spawns the deferrable's timer task.
    ///
    /// With a period the deferrable starts armed for `now + period`;
    /// without one it sleeps until the first `schedule_after`.
    pub fn start(
        name: impl Into<String>,
        period: Option<Duration>,
        token: CancellationToken,
        action: DeferredAction,
    ) -> Self {
        let name = name.into();
        let state = Arc::new(Mutex::new(DeferState {
            deadline: period.map(|p| Instant::now() + p),
            period,
        }));
        let notify = Arc::new(Notify::new());

        let task_name = name.clone();
        let task_state = Arc::clone(&state);
        let task_notify = Arc::clone(&notify);
        let handle = tokio::spawn(async move {
            debug!(deferrable = %task_name, periodic = period.is_some(), "Deferrable started");
            loop {
                let deadline = task_state.lock().deadline;
                match deadline {
                    None => {
                        tokio::select! {
                            _ = token.cancelled() => break,
                            _ = task_notify.notified() => continue,
                        }
                    }
                    Some(at) => {
                        tokio::select! {
                            _ = token.cancelled() => break,
                            _ = task_notify.notified() => continue,
                            _ = tokio::time::sleep_until(at) => {
                                {
                                    let mut st = task_state.lock();
                                    st.deadline = st.period.map(|p| Instant::now() + p);
                                }
                                trace!(deferrable = %task_name, "Deferrable firing");
                                action().await;
                            }
                        }
                    }
                }
            }
            debug!(deferrable = %task_name, "Deferrable terminated");
        });

        Self {
            name,
            state,
            notify,
            handle,
        }
    }

    /// Arms the deferrable for `now + delay`, unless an earlier deadline
    /// is already pending.
    pub fn schedule_after(&self, delay: Duration) {
        let at = Instant::now() + delay;
        let mut st = self.state.lock();
        match st.deadline {
            Some(pending) if pending <= at => {
                trace!(deferrable = %self.name, "Nearer schedule already pending");
            }
            _ => {
                st.deadline = Some(at);
                self.notify.notify_one();
            }
        }
    }

    /// Arms the deferrable for immediate firing.
    pub fn schedule_now(&self) {
        self.schedule_after(Duration::ZERO);
    }

    /// Switches to periodic mode.
    pub fn set_periodic(&self, period: Duration) {
        let mut st = self.state.lock();
        st.period = Some(period);
        if st.deadline.is_none() {
            st.deadline = Some(Instant::now() + period);
        }
        self.notify.notify_one();
    }

    /// Switches to on-demand mode (pending deadline stays armed).
    pub fn set_on_demand(&self) {
        self.state.lock().period = None;
        self.notify.notify_one();
    }

    /// Aborts the timer task.
    pub fn stop(&self) {
        self.handle.abort();
    }
}
