//! Shared harness for the end-to-end scenarios: an in-memory platform,
//! scripted workload agents and closure-driven allocation policies over
//! the real managers.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use resource_arbiter_domain::{
    ArbiterError, Assignment, DeclaredUnit, FillPolicy, PlatformService, ResourceAccounter,
    ResourceRequest, SyncLatencyMs, ViewToken, WorkingMode, WorkloadAgent, WorkloadDescriptor,
};

use resource_arbiter::application::services::{
    ApplicationManager, ProcessManager, SchedulerManager, SynchronizationManager, System,
};
use resource_arbiter::infrastructure::policies::OrderedSyncPolicy;
use resource_arbiter::{ArbiterMetrics, SchedulerPolicy};

/// The wired core, sans workers.
pub struct Harness {
    pub accounter: Arc<Mutex<ResourceAccounter>>,
    pub system: Arc<System>,
    pub scheduler: Arc<SchedulerManager>,
    pub synchronizer: Arc<SynchronizationManager>,
    pub metrics: Arc<ArbiterMetrics>,
}

impl Harness {
    /// Builds the core over a platform layout and a policy.
    pub fn new(layout: &[(&str, u64)], policy: Arc<dyn SchedulerPolicy>) -> Self {
        let mut ra = ResourceAccounter::new();
        for (path, amount) in layout {
            ra.register(path, DeclaredUnit::Count, *amount).unwrap();
        }
        ra.register("sys0.mem0", DeclaredUnit::Mb, 1024).unwrap();
        let accounter = Arc::new(Mutex::new(ra));

        let apps = Arc::new(ApplicationManager::new(Arc::clone(&accounter)));
        let procs = Arc::new(ProcessManager::new(Arc::clone(&accounter)));
        let system = Arc::new(System::new(
            Arc::clone(&accounter),
            Arc::clone(&apps),
            Arc::clone(&procs),
        ));
        let metrics = Arc::new(ArbiterMetrics::new().unwrap());

        let scheduler = Arc::new(SchedulerManager::new(
            Arc::clone(&system),
            policy,
            Arc::clone(&metrics),
        ));
        let sync_policy = Arc::new(OrderedSyncPolicy::new(Duration::from_millis(100), 1000));
        let synchronizer = Arc::new(SynchronizationManager::new(
            Arc::clone(&system),
            sync_policy,
            Arc::new(NullPlatform),
            Arc::clone(&metrics),
            false,
        ));

        Self {
            accounter,
            system,
            scheduler,
            synchronizer,
            metrics,
        }
    }

    /// Registers and enables an application with one single-request AWM
    /// per `(id, amount)` entry, all on `sys.cpu.pe` balanced.
    pub fn ready_app(
        &self,
        pid: u32,
        name: &str,
        priority: u16,
        awms: &[(u32, u64)],
    ) -> resource_arbiter_domain::SchedUid {
        let catalogue: Vec<WorkingMode> = awms
            .iter()
            .map(|(id, amount)| {
                WorkingMode::new(
                    *id,
                    format!("awm{}", id),
                    1.0,
                    vec![ResourceRequest::new(
                        "sys.cpu.pe".parse().unwrap(),
                        *amount,
                        FillPolicy::Balanced,
                    )],
                )
                .unwrap()
            })
            .collect();
        let uid = self
            .system
            .applications()
            .create_exc(pid, 0, name, priority, "test", catalogue)
            .unwrap();
        self.system.applications().enable_exc(uid).unwrap();
        uid
    }

    /// Committed usage under a path.
    pub fn used(&self, path: &str) -> u64 {
        self.accounter
            .lock()
            .used(
                &path.parse().unwrap(),
                resource_arbiter_domain::SYSTEM_VIEW,
            )
            .unwrap()
    }
}

/// Platform adapter that accepts every mapping.
pub struct NullPlatform;

#[async_trait]
impl PlatformService for NullPlatform {
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
    async fn reclaim_resources(&self, _workload: &WorkloadDescriptor) -> Result<(), ArbiterError> {
        Ok(())
    }
}

/// Scripted agent: answers every phase immediately, or never.
pub struct ScriptedAgent {
    pub latency_ms: SyncLatencyMs,
    pub responsive: bool,
}

impl ScriptedAgent {
    pub fn responsive(latency_ms: SyncLatencyMs) -> Arc<Self> {
        Arc::new(Self {
            latency_ms,
            responsive: true,
        })
    }

    pub fn unresponsive() -> Arc<Self> {
        Arc::new(Self {
            latency_ms: 0,
            responsive: false,
        })
    }

    fn answer(&self, phase: &str) -> Result<(), ArbiterError> {
        if self.responsive {
            Ok(())
        } else {
            Err(ArbiterError::AgentTimeout(format!("scripted {}", phase)))
        }
    }
}

#[async_trait]
impl WorkloadAgent for ScriptedAgent {
    async fn pre_change(&self, _deadline: Duration) -> Result<SyncLatencyMs, ArbiterError> {
        self.answer("pre_change")?;
        Ok(self.latency_ms)
    }
    async fn sync_change(&self, _deadline: Duration) -> Result<(), ArbiterError> {
        self.answer("sync_change")
    }
    async fn do_change(&self, _deadline: Duration) -> Result<(), ArbiterError> {
        self.answer("do_change")
    }
    async fn stop_execution(&self, _deadline: Duration) -> Result<(), ArbiterError> {
        self.answer("stop_execution")
    }
}

/// Allocation policy driven by a closure, with an invocation counter.
pub struct FnPolicy<F> {
    name: String,
    runs: AtomicUsize,
    body: F,
}

impl<F> FnPolicy<F>
where
    F: Fn(&System) -> Result<ViewToken, ArbiterError> + Send + Sync,
{
    pub fn new(name: &str, body: F) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            runs: AtomicUsize::new(0),
            body,
        })
    }

    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }
}

impl<F> SchedulerPolicy for FnPolicy<F>
where
    F: Fn(&System) -> Result<ViewToken, ArbiterError> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn schedule(&self, system: &System) -> Result<ViewToken, ArbiterError> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        (self.body)(system)
    }
}
