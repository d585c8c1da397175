// /////////////////////////////////////////////////////////////////////////////
// Resource Arbiter RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Agent Proxy
//!
//! The core-side endpoint of one workload-agent channel and the
//! [`WorkloadAgent`] implementation handed to the synchronisation
//! manager.
//!
//! One channel serves every execution context of a hosting process. The
//! channel correlates outgoing synchronisation requests with incoming
//! `Resp` lines by sequence number; the connection's reader task feeds
//! responses back through [`AgentChannel::resolve`]. Deadlines convert
//! into `AgentTimeout`, broken pipes into `AgentWriteError` — exactly
//! the two failure modes that disable a workload without failing the
//! session.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::oneshot;
use tracing::{debug, warn};

use resource_arbiter_domain::{ArbiterError, SyncLatencyMs, WorkloadAgent};

use crate::infrastructure::services::agent_protocol::{result_code, AgentMessage};

type PendingResponse = oneshot::Sender<(i32, Option<u32>)>;

/// The core-side half of one agent connection.
pub struct AgentChannel {
    peer: String,
    writer: tokio::sync::Mutex<Box<dyn AsyncWrite + Send + Unpin>>,
    pending: Mutex<HashMap<u64, PendingResponse>>,
    seq: AtomicU64,
}

impl AgentChannel {
    pub fn new(peer: impl Into<String>, writer: impl AsyncWrite + Send + Unpin + 'static) -> Self {
        Self {
            peer: peer.into(),
            writer: tokio::sync::Mutex::new(Box::new(writer)),
            pending: Mutex::new(HashMap::new()),
            seq: AtomicU64::new(1),
        }
    }

    /// The peer label for logs.
    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Allocates the next outgoing sequence number.
    pub fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::Relaxed)
    }

    /// Writes one message as a JSON line.
    ///
    /// # Errors
    /// Returns `AgentWriteError` when the channel is broken.
    pub async fn send(&self, msg: &AgentMessage) -> Result<(), ArbiterError> {
        let mut line = serde_json::to_string(msg)?;
        line.push('\n');
        let mut writer = self.writer.lock().await;
        writer
            .write_all(line.as_bytes())
            .await
            .map_err(|e| ArbiterError::AgentWriteError(format!("{}: {}", self.peer, e)))?;
        writer
            .flush()
            .await
            .map_err(|e| ArbiterError::AgentWriteError(format!("{}: {}", self.peer, e)))
    }

    /// Sends a request and waits for its `Resp` under a deadline.
    ///
    /// # Errors
    /// - `AgentTimeout` when the deadline expires
    /// - `AgentWriteError` when the channel breaks before the answer
    pub async fn request(
        &self,
        make: impl FnOnce(u64) -> AgentMessage,
        deadline: Duration,
    ) -> Result<(i32, Option<u32>), ArbiterError> {
        let seq = self.next_seq();
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(seq, tx);

        if let Err(e) = self.send(&make(seq)).await {
            self.pending.lock().remove(&seq);
            return Err(e);
        }

        match tokio::time::timeout(deadline, rx).await {
            Ok(Ok(answer)) => Ok(answer),
            Ok(Err(_)) => Err(ArbiterError::AgentWriteError(format!(
                "{}: channel closed while waiting for seq {}",
                self.peer, seq
            ))),
            Err(_) => {
                self.pending.lock().remove(&seq);
                Err(ArbiterError::AgentTimeout(format!(
                    "{}: no answer to seq {} within {:?}",
                    self.peer, seq, deadline
                )))
            }
        }
    }

    /// Routes an incoming `Resp` to its waiting request.
    pub fn resolve(&self, seq: u64, result: i32, latency_ms: Option<u32>) -> bool {
        match self.pending.lock().remove(&seq) {
            Some(tx) => tx.send((result, latency_ms)).is_ok(),
            None => {
                debug!(peer = %self.peer, seq, "Unmatched response dropped");
                false
            }
        }
    }

    /// Fails every outstanding request (connection lost).
    pub fn disconnect(&self) {
        let outstanding = self.pending.lock().len();
        if outstanding > 0 {
            warn!(peer = %self.peer, outstanding, "Dropping outstanding agent requests");
        }
        self.pending.lock().clear();
    }
}

/// [`WorkloadAgent`] for one execution context behind a channel.
pub struct AgentProxy {
    channel: Arc<AgentChannel>,
    exc_id: u32,
}

impl AgentProxy {
    pub fn new(channel: Arc<AgentChannel>, exc_id: u32) -> Self {
        Self { channel, exc_id }
    }

    fn check(&self, phase: &str, result: i32) -> Result<(), ArbiterError> {
        if result == result_code::OK {
            Ok(())
        } else {
            Err(ArbiterError::AgentWriteError(format!(
                "{} exc{:02}: {} answered {}",
                self.channel.peer(),
                self.exc_id,
                phase,
                result
            )))
        }
    }
}

#[async_trait]
impl WorkloadAgent for AgentProxy {
    async fn pre_change(&self, deadline: Duration) -> Result<SyncLatencyMs, ArbiterError> {
        let exc_id = self.exc_id;
        let (result, latency) = self
            .channel
            .request(|seq| AgentMessage::PreChange { seq, exc_id }, deadline)
            .await?;
        self.check("preChange", result)?;
        Ok(latency.unwrap_or(0))
    }

    async fn sync_change(&self, deadline: Duration) -> Result<(), ArbiterError> {
        let exc_id = self.exc_id;
        let (result, _) = self
            .channel
            .request(|seq| AgentMessage::SyncChange { seq, exc_id }, deadline)
            .await?;
        self.check("syncChange", result)
    }

    async fn do_change(&self, deadline: Duration) -> Result<(), ArbiterError> {
        let exc_id = self.exc_id;
        let (result, _) = self
            .channel
            .request(|seq| AgentMessage::DoChange { seq, exc_id }, deadline)
            .await?;
        self.check("doChange", result)
    }

    async fn stop_execution(&self, deadline: Duration) -> Result<(), ArbiterError> {
        let exc_id = self.exc_id;
        let (result, _) = self
            .channel
            .request(|seq| AgentMessage::StopExecution { seq, exc_id }, deadline)
            .await?;
        self.check("stopExecution", result)
    }
}
