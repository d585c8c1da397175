// /////////////////////////////////////////////////////////////////////////////
// Resource Arbiter RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Workload-Agent Server
//!
//! The dispatcher worker behind the agent channel: accepts Unix-socket
//! connections from in-workload agents, negotiates the protocol version,
//! and drives registrations, start/stop notifications and exit handling
//! into the application manager — raising the matching control events so
//! the loop reschedules.
//!
//! A lost channel is handled as an implicit `AppExit`: every execution
//! context of the hosting process is disabled and unregistered, and a
//! stop event fires. Synchronisation requests travelling the other
//! direction are correlated by the per-connection
//! [`AgentChannel`](crate::infrastructure::adapters::agent_proxy::AgentChannel).

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tracing::{debug, info, warn};

use resource_arbiter_bootstrap::shutdown::CancellationToken;
use resource_arbiter_domain::{Application, ArbiterError, Pid};

use crate::application::services::ApplicationManager;
use crate::infrastructure::adapters::agent_proxy::{AgentChannel, AgentProxy};
use crate::infrastructure::runtime::control_loop::{ControlEvent, EventBus};
use crate::infrastructure::runtime::worker::Worker;
use crate::infrastructure::services::agent_protocol::{
    result_code, version_compatible, AgentMessage,
};
use crate::infrastructure::services::recipe_loader::RecipeLoader;

/// Accept-loop worker for the workload-agent channel.
pub struct AgentServer {
    socket_path: PathBuf,
    core_version: (u8, u8),
    apps: Arc<ApplicationManager>,
    recipes: Arc<RecipeLoader>,
    bus: Arc<EventBus>,
    listener: tokio::sync::Mutex<Option<UnixListener>>,
}

impl AgentServer {
    pub fn new(
        socket_path: PathBuf,
        core_version: (u8, u8),
        apps: Arc<ApplicationManager>,
        recipes: Arc<RecipeLoader>,
        bus: Arc<EventBus>,
    ) -> Self {
        Self {
            socket_path,
            core_version,
            apps,
            recipes,
            bus,
            listener: tokio::sync::Mutex::new(None),
        }
    }
}

#[async_trait]
impl Worker for AgentServer {
    fn name(&self) -> &str {
        "bq.agent"
    }

    async fn setup(&self) -> Result<(), ArbiterError> {
        if let Some(dir) = self.socket_path.parent() {
            std::fs::create_dir_all(dir)
                .map_err(|e| ArbiterError::IoError(format!("{}: {}", dir.display(), e)))?;
        }
        // A stale socket from a previous run refuses the bind
        let _ = std::fs::remove_file(&self.socket_path);
        let listener = UnixListener::bind(&self.socket_path)
            .map_err(|e| ArbiterError::IoError(format!("{}: {}", self.socket_path.display(), e)))?;
        *self.listener.lock().await = Some(listener);
        info!(socket = %self.socket_path.display(), "Agent channel listening");
        Ok(())
    }

    async fn run(&self, done: CancellationToken) -> Result<(), ArbiterError> {
        let listener = self
            .listener
            .lock()
            .await
            .take()
            .ok_or_else(|| ArbiterError::InternalError("agent socket not set up".into()))?;
        loop {
            tokio::select! {
                _ = done.cancelled() => return Ok(()),
                accepted = listener.accept() => {
                    let (stream, _addr) = accepted
                        .map_err(|e| ArbiterError::IoError(e.to_string()))?;
                    let connection = Connection {
                        core_version: self.core_version,
                        apps: Arc::clone(&self.apps),
                        recipes: Arc::clone(&self.recipes),
                        bus: Arc::clone(&self.bus),
                    };
                    let token = done.clone();
                    tokio::spawn(async move {
                        connection.serve(stream, token).await;
                    });
                }
            }
        }
    }
}

/// Per-connection protocol state.
struct Connection {
    core_version: (u8, u8),
    apps: Arc<ApplicationManager>,
    recipes: Arc<RecipeLoader>,
    bus: Arc<EventBus>,
}

impl Connection {
    async fn serve(&self, stream: UnixStream, done: CancellationToken) {
        let (read_half, write_half) = stream.into_split();
        let channel = Arc::new(AgentChannel::new("agent:?", write_half));
        let mut lines = BufReader::new(read_half).lines();
        let mut paired: Option<Pid> = None;

        loop {
            let line = tokio::select! {
                _ = done.cancelled() => break,
                line = lines.next_line() => line,
            };
            let line = match line {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, "Agent channel read failed");
                    break;
                }
            };
            if line.trim().is_empty() {
                continue;
            }
            let msg: AgentMessage = match serde_json::from_str(&line) {
                Ok(msg) => msg,
                Err(e) => {
                    warn!(error = %e, "Malformed agent message dropped");
                    continue;
                }
            };
            if !self.handle(&channel, &mut paired, msg).await {
                break;
            }
        }

        channel.disconnect();
        if let Some(pid) = paired {
            // Open question (b): agent death means disable and continue
            let dropped = self.apps.destroy_all_for_pid(pid);
            if !dropped.is_empty() {
                warn!(pid, contexts = dropped.len(), "Agent channel lost, contexts dropped");
                self.bus.notify_event(ControlEvent::ExcStop);
            }
        }
    }

    /// Serves one message; false ends the connection.
    async fn handle(
        &self,
        channel: &Arc<AgentChannel>,
        paired: &mut Option<Pid>,
        msg: AgentMessage,
    ) -> bool {
        match msg {
            AgentMessage::AppPair {
                seq,
                pid,
                name,
                major,
                minor,
            } => {
                if !version_compatible(self.core_version, (major, minor)) {
                    warn!(
                        name,
                        pid,
                        agent = format!("{}.{}", major, minor),
                        core = format!("{}.{}", self.core_version.0, self.core_version.1),
                        "Pairing refused: version mismatch"
                    );
                    self.respond(channel, seq, result_code::VERSION_MISMATCH).await;
                    return false;
                }
                info!(name, pid, "Agent paired");
                *paired = Some(pid);
                self.respond(channel, seq, result_code::OK).await;
                true
            }

            AgentMessage::ExcRegister {
                seq,
                pid,
                exc_id,
                name,
                recipe,
            } => {
                if paired.is_none() {
                    self.respond(channel, seq, result_code::PROTOCOL).await;
                    return true;
                }
                let code = match self.recipes.load(&recipe) {
                    Ok(loaded) => match self.apps.create_exc(
                        pid,
                        exc_id,
                        &name,
                        loaded.priority,
                        &recipe,
                        loaded.awms,
                    ) {
                        Ok(uid) => {
                            self.apps
                                .attach_agent(uid, Arc::new(AgentProxy::new(Arc::clone(channel), exc_id)));
                            result_code::OK
                        }
                        Err(e) => {
                            warn!(name, error = %e, "EXC registration failed");
                            result_code::ERROR
                        }
                    },
                    Err(e) => {
                        warn!(name, recipe, error = %e, "Recipe rejected");
                        result_code::BAD_RECIPE
                    }
                };
                self.respond(channel, seq, code).await;
                true
            }

            AgentMessage::ExcUnregister { seq, pid, exc_id } => {
                let uid = Application::uid_for(pid, exc_id);
                let code = match self.apps.destroy_exc(uid) {
                    Ok(()) => result_code::OK,
                    Err(_) => result_code::NOT_REGISTERED,
                };
                self.respond(channel, seq, code).await;
                true
            }

            AgentMessage::ExcStart { seq, pid, exc_id } => {
                let uid = Application::uid_for(pid, exc_id);
                let code = match self.apps.enable_exc(uid) {
                    Ok(()) => {
                        self.bus.notify_event(ControlEvent::ExcStart);
                        result_code::OK
                    }
                    Err(e) => {
                        debug!(uid, error = %e, "ExcStart refused");
                        result_code::NOT_REGISTERED
                    }
                };
                self.respond(channel, seq, code).await;
                true
            }

            AgentMessage::ExcStop { seq, pid, exc_id } => {
                let uid = Application::uid_for(pid, exc_id);
                let code = match self.apps.disable_exc(uid) {
                    Ok(()) => {
                        self.bus.notify_event(ControlEvent::ExcStop);
                        result_code::OK
                    }
                    Err(_) => result_code::NOT_REGISTERED,
                };
                self.respond(channel, seq, code).await;
                true
            }

            AgentMessage::AppExit { seq, pid } => {
                let dropped = self.apps.destroy_all_for_pid(pid);
                info!(pid, contexts = dropped.len(), "Application exited");
                if !dropped.is_empty() {
                    self.bus.notify_event(ControlEvent::ExcStop);
                }
                self.respond(channel, seq, result_code::OK).await;
                *paired = None;
                true
            }

            AgentMessage::Resp {
                seq,
                result,
                latency_ms,
            } => {
                channel.resolve(seq, result, latency_ms);
                true
            }

            // Core-originated requests are never valid inbound
            other => {
                warn!(seq = other.seq(), "Protocol violation from agent");
                self.respond(channel, other.seq(), result_code::PROTOCOL).await;
                true
            }
        }
    }

    async fn respond(&self, channel: &Arc<AgentChannel>, seq: u64, result: i32) {
        let resp = AgentMessage::Resp {
            seq,
            result,
            latency_ms: None,
        };
        if let Err(e) = channel.send(&resp).await {
            warn!(error = %e, "Failed to answer agent");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::runtime::worker::WorkerPool;
    use parking_lot::Mutex as PlMutex;
    use resource_arbiter_domain::ResourceAccounter;
    use std::io::Write;
    use tokio::io::AsyncWriteExt;

    async fn start_server(dir: &std::path::Path) -> (Arc<ApplicationManager>, PathBuf, CancellationToken) {
        let accounter = Arc::new(PlMutex::new(ResourceAccounter::new()));
        let apps = Arc::new(ApplicationManager::new(accounter));
        let recipes = Arc::new(RecipeLoader::new(dir.join("recipes")));
        std::fs::create_dir_all(dir.join("recipes")).unwrap();
        let mut recipe = std::fs::File::create(dir.join("recipes/video.toml")).unwrap();
        recipe
            .write_all(
                b"[[awm]]\nid = 0\nname = \"base\"\nvalue = 1.0\n\n  [[awm.request]]\n  path = \"sys.cpu.pe\"\n  amount = 100\n",
            )
            .unwrap();

        let socket = dir.join("agent.sock");
        let bus = Arc::new(EventBus::new());
        let server = Arc::new(AgentServer::new(
            socket.clone(),
            (1, 3),
            Arc::clone(&apps),
            recipes,
            bus,
        ));
        let token = CancellationToken::new();
        let pool = WorkerPool::new(token.clone(), Arc::new(|_| {}));
        pool.start(server).await.unwrap();
        (apps, socket, token)
    }

    async fn send(stream: &mut UnixStream, msg: &AgentMessage) {
        let mut line = serde_json::to_string(msg).unwrap();
        line.push('\n');
        stream.write_all(line.as_bytes()).await.unwrap();
    }

    async fn recv(lines: &mut tokio::io::Lines<BufReader<tokio::net::unix::OwnedReadHalf>>) -> AgentMessage {
        let line = lines.next_line().await.unwrap().unwrap();
        serde_json::from_str(&line).unwrap()
    }

    #[tokio::test]
    async fn test_version_mismatch_closes_channel() {
        let dir = tempfile::tempdir().unwrap();
        let (_apps, socket, token) = start_server(dir.path()).await;

        let stream = UnixStream::connect(&socket).await.unwrap();
        let (read_half, write_half) = stream.into_split();
        let mut lines = BufReader::new(read_half).lines();
        let mut write_half = write_half;
        let pair = AgentMessage::AppPair {
            seq: 1,
            pid: 100,
            name: "demo".into(),
            major: 2,
            minor: 0,
        };
        let mut line = serde_json::to_string(&pair).unwrap();
        line.push('\n');
        write_half.write_all(line.as_bytes()).await.unwrap();

        match recv(&mut lines).await {
            AgentMessage::Resp { result, .. } => {
                assert_eq!(result, result_code::VERSION_MISMATCH);
            }
            other => panic!("unexpected message {:?}", other),
        }
        // The server closes its end after the refusal
        assert!(lines.next_line().await.unwrap().is_none());
        token.cancel();
    }

    #[tokio::test]
    async fn test_pair_register_start_flow() {
        let dir = tempfile::tempdir().unwrap();
        let (apps, socket, token) = start_server(dir.path()).await;

        let mut stream = UnixStream::connect(&socket).await.unwrap();
        send(
            &mut stream,
            &AgentMessage::AppPair {
                seq: 1,
                pid: 100,
                name: "demo".into(),
                major: 1,
                minor: 0,
            },
        )
        .await;
        send(
            &mut stream,
            &AgentMessage::ExcRegister {
                seq: 2,
                pid: 100,
                exc_id: 0,
                name: "demo".into(),
                recipe: "video".into(),
            },
        )
        .await;
        send(
            &mut stream,
            &AgentMessage::ExcStart {
                seq: 3,
                pid: 100,
                exc_id: 0,
            },
        )
        .await;

        let (read_half, _write_half) = stream.into_split();
        let mut lines = BufReader::new(read_half).lines();
        for _ in 0..3 {
            match recv(&mut lines).await {
                AgentMessage::Resp { result, .. } => assert_eq!(result, result_code::OK),
                other => panic!("unexpected message {:?}", other),
            }
        }

        let uid = Application::uid_for(100, 0);
        let app = apps.get(uid).unwrap();
        assert!(app.read().schedulable().is_ready());
        assert!(apps.agent_of(uid).is_some());
        token.cancel();
    }
}
