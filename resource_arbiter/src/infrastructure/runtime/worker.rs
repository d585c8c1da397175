// /////////////////////////////////////////////////////////////////////////////
// Resource Arbiter RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Worker Contract
//!
//! Long-running services of the daemon (command FIFO server, workload
//! agent dispatcher, power monitor, deferrable timers) implement one
//! contract: a setup phase that may fail the boot, then a task loop that
//! runs until its cancellation token fires.
//!
//! The pool tracks every spawned worker. A worker that ends with an error
//! while the daemon is not shutting down is fatal: the pool reports it to
//! the composition root, which raises the control loop's abort event.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use resource_arbiter_bootstrap::shutdown::CancellationToken;
use resource_arbiter_domain::ArbiterError;

/// Callback used to report a fatal worker failure.
pub type FatalHandler = Arc<dyn Fn(&str) + Send + Sync>;

/// A long-running service with cooperative shutdown.
#[async_trait]
pub trait Worker: Send + Sync + 'static {
    /// Stable worker name for logs and the pool ledger.
    fn name(&self) -> &str;

    /// One-shot initialisation; a failure here fails the daemon boot.
    async fn setup(&self) -> Result<(), ArbiterError> {
        Ok(())
    }

    /// The worker loop. Implementations check `done` on every iteration
    /// and at every wake, returning `Ok(())` once cancelled.
    async fn run(&self, done: CancellationToken) -> Result<(), ArbiterError>;
}

/// Tracks spawned workers and joins them at shutdown.
pub struct WorkerPool {
    token: CancellationToken,
    on_fatal: FatalHandler,
    handles: Mutex<Vec<(String, JoinHandle<()>)>>,
}

impl WorkerPool {
    /// Creates a pool whose workers observe `token`.
    pub fn new(token: CancellationToken, on_fatal: FatalHandler) -> Self {
        Self {
            token,
            on_fatal,
            handles: Mutex::new(Vec::new()),
        }
    }

    /// Runs a worker's setup and spawns its task loop.
    ///
    /// # Errors
    /// Propagates the setup failure; the worker is not spawned.
    pub async fn start(&self, worker: Arc<dyn Worker>) -> Result<(), ArbiterError> {
        let name = worker.name().to_string();
        worker.setup().await?;
        info!(worker = %name, "Worker started");

        let token = self.token.clone();
        let on_fatal = Arc::clone(&self.on_fatal);
        let task_name = name.clone();
        let handle = tokio::spawn(async move {
            match worker.run(token.clone()).await {
                Ok(()) => debug!(worker = %task_name, "Worker terminated"),
                Err(e) => {
                    error!(worker = %task_name, error = %e, "Worker failed");
                    if !token.is_cancelled() {
                        on_fatal(&task_name);
                    }
                }
            }
        });
        self.handles.lock().push((name, handle));
        Ok(())
    }

    /// Waits for every worker to terminate, up to `grace` each.
    pub async fn terminate(&self, grace: Duration) {
        let handles: Vec<(String, JoinHandle<()>)> = self.handles.lock().drain(..).collect();
        for (name, handle) in handles {
            match tokio::time::timeout(grace, handle).await {
                Ok(_) => debug!(worker = %name, "Worker joined"),
                Err(_) => {
                    error!(worker = %name, "Worker did not terminate in time, aborting it");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct TickWorker {
        ran: Arc<AtomicBool>,
    }

    #[async_trait]
    impl Worker for TickWorker {
        fn name(&self) -> &str {
            "test.tick"
        }

        async fn run(&self, done: CancellationToken) -> Result<(), ArbiterError> {
            self.ran.store(true, Ordering::SeqCst);
            done.cancelled().await;
            Ok(())
        }
    }

    struct FailingWorker;

    #[async_trait]
    impl Worker for FailingWorker {
        fn name(&self) -> &str {
            "test.failing"
        }

        async fn run(&self, _done: CancellationToken) -> Result<(), ArbiterError> {
            Err(ArbiterError::IoError("broken pipe".into()))
        }
    }

    #[tokio::test]
    async fn test_worker_runs_until_cancelled() {
        let token = CancellationToken::new();
        let pool = WorkerPool::new(token.clone(), Arc::new(|_| {}));
        let ran = Arc::new(AtomicBool::new(false));
        pool.start(Arc::new(TickWorker { ran: ran.clone() }))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(ran.load(Ordering::SeqCst));

        token.cancel();
        pool.terminate(Duration::from_millis(200)).await;
    }

    #[tokio::test]
    async fn test_fatal_worker_reports() {
        let token = CancellationToken::new();
        let fatal = Arc::new(AtomicBool::new(false));
        let fatal_flag = fatal.clone();
        let pool = WorkerPool::new(
            token.clone(),
            Arc::new(move |_| fatal_flag.store(true, Ordering::SeqCst)),
        );
        pool.start(Arc::new(FailingWorker)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(fatal.load(Ordering::SeqCst));
        pool.terminate(Duration::from_millis(200)).await;
    }
}
