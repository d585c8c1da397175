// /////////////////////////////////////////////////////////////////////////////
// Resource Arbiter RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Resource Arbiter Daemon
//!
//! The composition root: parses the CLI, loads the layered
//! configuration, wires the domain, application and infrastructure
//! components, spawns the workers and runs the control loop until an
//! exit or abort event.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info, warn};

use resource_arbiter_bootstrap::cli::{Arguments, LogFormat};
use resource_arbiter_bootstrap::exit_code::ExitCode;
use resource_arbiter_bootstrap::platform::create_platform;
use resource_arbiter_bootstrap::shutdown::ShutdownCoordinator;
use resource_arbiter_bootstrap::signals::{SignalEvent, SystemSignals, UnixSignalHandler};

use resource_arbiter_domain::{PlatformService, ResourceAccounter};

use resource_arbiter::application::services::{
    ApplicationManager, ProcessManager, SchedulerManager, SynchronizationManager, System,
};
use resource_arbiter::infrastructure::adapters::LocalPlatformAdapter;
use resource_arbiter::infrastructure::config::ArbiterSettings;
use resource_arbiter::infrastructure::logging::init_logging;
use resource_arbiter::infrastructure::metrics::ArbiterMetrics;
use resource_arbiter::infrastructure::policies::{default_registry, OrderedSyncPolicy};
use resource_arbiter::infrastructure::runtime::{ControlEvent, ControlLoop, LoopOutcome, WorkerPool};
use resource_arbiter::infrastructure::services::{
    register_core_commands, AgentServer, CommandManager, PowerMonitor, RecipeLoader,
};

#[tokio::main]
async fn main() {
    let code = run().await;
    std::process::exit(code.as_i32());
}

async fn run() -> ExitCode {
    let args = Arguments::parse();

    // Layered configuration plus CLI overrides
    let mut settings = match ArbiterSettings::load(args.config.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("resource_arbiter: configuration error: {}", e);
            return ExitCode::Config;
        }
    };
    if let Some(policy) = args.policy {
        settings.scheduler.policy = policy;
    }
    if let Some(var_dir) = args.var_dir {
        settings.general.var_dir = var_dir;
    }
    if let Some(level) = args.log_level {
        settings.general.log_level = level;
    }
    if let Some(format) = args.log_format {
        settings.general.log_format = match format {
            LogFormat::Pretty => "pretty".to_string(),
            LogFormat::Json => "json".to_string(),
        };
    }
    if let Err(e) = settings.validate() {
        eprintln!("resource_arbiter: configuration error: {}", e);
        return ExitCode::Config;
    }
    if args.check_config {
        println!("configuration OK");
        return ExitCode::Success;
    }

    if let Err(e) = init_logging(&settings.general.log_level, &settings.general.log_format) {
        eprintln!("resource_arbiter: logging setup failed: {}", e);
        return ExitCode::Software;
    }
    info!(
        policy = settings.scheduler.policy,
        var_dir = %settings.general.var_dir.display(),
        "Resource arbiter starting"
    );

    match boot(settings).await {
        Ok(outcome) => match outcome {
            LoopOutcome::Exit => {
                info!("Resource arbiter terminated");
                ExitCode::Success
            }
            LoopOutcome::Abort => {
                error!("Resource arbiter aborted");
                ExitCode::Software
            }
        },
        Err(e) => {
            error!(error = %e, "Resource arbiter failed to start");
            ExitCode::Unavailable
        }
    }
}

async fn boot(settings: ArbiterSettings) -> anyhow::Result<LoopOutcome> {
    // ------------------------------------------------------------------
    // Domain and application services
    // ------------------------------------------------------------------
    let accounter = Arc::new(parking_lot::Mutex::new(ResourceAccounter::new()));
    let apps = Arc::new(ApplicationManager::new(Arc::clone(&accounter)));
    let procs = Arc::new(ProcessManager::new(Arc::clone(&accounter)));
    let system = Arc::new(System::new(
        Arc::clone(&accounter),
        Arc::clone(&apps),
        Arc::clone(&procs),
    ));
    let metrics = Arc::new(ArbiterMetrics::new().context("metrics registration")?);

    // ------------------------------------------------------------------
    // Platform discovery
    // ------------------------------------------------------------------
    let host = create_platform();
    let platform: Arc<dyn PlatformService> = Arc::new(LocalPlatformAdapter::new(
        Arc::clone(&accounter),
        settings.platform.layout.clone(),
        host.cpu_count(),
        host.total_memory_mb(),
    ));
    platform
        .load_platform_data()
        .await
        .context("platform discovery")?;
    platform.start().await.context("platform adapter start")?;

    // ------------------------------------------------------------------
    // Policies and managers
    // ------------------------------------------------------------------
    let registry = default_registry();
    let policy = registry
        .get(&settings.scheduler.policy)
        .context("policy selection")?;
    let sync_policy = Arc::new(OrderedSyncPolicy::new(
        Duration::from_millis(settings.sync.agent_deadline_ms),
        settings.sync.max_latency_ms,
    ));
    let scheduler = Arc::new(SchedulerManager::new(
        Arc::clone(&system),
        policy,
        Arc::clone(&metrics),
    ));
    let synchronizer = Arc::new(SynchronizationManager::new(
        Arc::clone(&system),
        sync_policy,
        Arc::clone(&platform),
        Arc::clone(&metrics),
        settings.sync.force_sync,
    ));

    // ------------------------------------------------------------------
    // Control loop and workers
    // ------------------------------------------------------------------
    let coordinator = ShutdownCoordinator::default();
    let opt_interval = match settings.scheduler.opt_interval_ms {
        0 => None,
        ms => Some(Duration::from_millis(ms)),
    };
    let control = ControlLoop::new(
        Arc::clone(&system),
        scheduler,
        synchronizer,
        Arc::clone(&metrics),
        opt_interval,
        coordinator.token(),
    );
    let bus = control.bus();

    let fatal_bus = control.bus();
    let pool = WorkerPool::new(
        coordinator.token(),
        Arc::new(move |worker| {
            error!(worker, "Fatal worker failure");
            fatal_bus.notify_event(ControlEvent::Abort);
        }),
    );

    let commands = CommandManager::new(settings.fifo_path());
    register_core_commands(
        &commands,
        Arc::clone(&system),
        control.bus(),
        Arc::clone(&platform),
    );
    pool.start(commands).await.context("command FIFO server")?;

    let recipes = Arc::new(RecipeLoader::new(settings.recipe_dir()));
    let agent_server = Arc::new(AgentServer::new(
        settings.agent_socket_path(),
        (settings.agent.major, settings.agent.minor),
        Arc::clone(&apps),
        recipes,
        control.bus(),
    ));
    pool.start(agent_server).await.context("agent server")?;

    let monitor = Arc::new(PowerMonitor::new(
        Arc::clone(&accounter),
        Arc::clone(&platform),
        Duration::from_millis(settings.monitor.period_ms),
    ));
    pool.start(monitor).await.context("power monitor")?;

    // ------------------------------------------------------------------
    // Signal bridge
    // ------------------------------------------------------------------
    let mut signals = UnixSignalHandler::new().context("signal handlers")?;
    let signal_bus = Arc::clone(&bus);
    tokio::spawn(async move {
        while let Some(event) = signals.next_signal().await {
            match event {
                SignalEvent::Shutdown => {
                    signal_bus.notify_event(ControlEvent::Exit);
                    break;
                }
                SignalEvent::User1 => signal_bus.notify_event(ControlEvent::Usr1),
                SignalEvent::User2 => signal_bus.notify_event(ControlEvent::Usr2),
            }
        }
    });

    // ------------------------------------------------------------------
    // Run until exit, then wind down
    // ------------------------------------------------------------------
    let outcome = control.run().await;

    coordinator.initiate_shutdown();
    if let Err(e) = platform.stop().await {
        warn!(error = %e, "Platform adapter stop failed");
    }
    pool.terminate(Duration::from_millis(500)).await;
    coordinator.complete_shutdown();
    Ok(outcome)
}
