// /////////////////////////////////////////////////////////////////////////////
// Resource Arbiter RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # System Signal Handling
//!
//! Signal handling for the arbiter daemon.
//!
//! ## Supported Signals
//!
//! - **SIGTERM** (15) - Graceful shutdown request
//! - **SIGINT** (2) - User interrupt (Ctrl+C)
//! - **SIGHUP** (1) - Hangup (terminal closed), treated as shutdown
//! - **SIGUSR1** (10) - Status-dump request, forwarded to the control loop
//! - **SIGUSR2** (12) - Extended status-dump request
//!
//! ## Design Pattern
//!
//! The handler exposes a pull interface: the signal bridge task asks for
//! the next [`SignalEvent`] and forwards it to the control loop. A trait
//! abstracts the OS so tests can inject scripted signal sources.

use std::future::Future;
use std::pin::Pin;

/// A signal translated into the event the control loop understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalEvent {
    /// SIGTERM / SIGINT / SIGHUP: shut down
    Shutdown,
    /// SIGUSR1: dump status queues
    User1,
    /// SIGUSR2: dump extended status
    User2,
}

/// System signal source.
pub trait SystemSignals: Send {
    /// Waits for the next signal of interest.
    ///
    /// Returns `None` when the signal streams are closed and no further
    /// signal can ever be delivered.
    fn next_signal(&mut self) -> Pin<Box<dyn Future<Output = Option<SignalEvent>> + Send + '_>>;
}

/// Unix signal source backed by `tokio::signal`.
#[cfg(unix)]
pub struct UnixSignalHandler {
    sigterm: tokio::signal::unix::Signal,
    sigint: tokio::signal::unix::Signal,
    sighup: tokio::signal::unix::Signal,
    sigusr1: tokio::signal::unix::Signal,
    sigusr2: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl UnixSignalHandler {
    /// Registers the signal streams.
    ///
    /// # Errors
    /// Propagates the OS error when a handler cannot be installed.
    pub fn new() -> std::io::Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};
        Ok(Self {
            sigterm: signal(SignalKind::terminate())?,
            sigint: signal(SignalKind::interrupt())?,
            sighup: signal(SignalKind::hangup())?,
            sigusr1: signal(SignalKind::user_defined1())?,
            sigusr2: signal(SignalKind::user_defined2())?,
        })
    }
}

#[cfg(unix)]
impl SystemSignals for UnixSignalHandler {
    fn next_signal(&mut self) -> Pin<Box<dyn Future<Output = Option<SignalEvent>> + Send + '_>> {
        Box::pin(async move {
            tokio::select! {
                r = self.sigterm.recv() => {
                    r?;
                    tracing::info!("Received SIGTERM, initiating graceful shutdown");
                    Some(SignalEvent::Shutdown)
                }
                r = self.sigint.recv() => {
                    r?;
                    tracing::info!("Received SIGINT (Ctrl+C), initiating graceful shutdown");
                    Some(SignalEvent::Shutdown)
                }
                r = self.sighup.recv() => {
                    r?;
                    tracing::info!("Received SIGHUP, initiating graceful shutdown");
                    Some(SignalEvent::Shutdown)
                }
                r = self.sigusr1.recv() => {
                    r?;
                    tracing::debug!("Received SIGUSR1, status dump requested");
                    Some(SignalEvent::User1)
                }
                r = self.sigusr2.recv() => {
                    r?;
                    tracing::debug!("Received SIGUSR2, extended status dump requested");
                    Some(SignalEvent::User2)
                }
            }
        })
    }
}
