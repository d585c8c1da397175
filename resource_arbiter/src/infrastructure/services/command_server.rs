// /////////////////////////////////////////////////////////////////////////////
// Resource Arbiter RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Command FIFO Server
//!
//! The operator command channel: a named FIFO at `<var_dir>/bbque_cmds`,
//! created mode 0666 and kept open read-write so writers never see a
//! closed pipe between commands. Each line is a shell-quoted argv,
//! dispatched by exact command name to the handlers registered at boot.
//!
//! Reserved prefixes: `bq.cm.` (this module), `bq.rm.` (control loop),
//! `bq.prm.` (process manager), `bq.pm.` (power manager).
//!
//! Reply codes follow the command contract: 0 for success, positive
//! values for per-command errors, negative values reserved (unknown
//! command answers -1). Codes are surfaced through the log — the FIFO
//! is one-way.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::unix::pipe;
use tracing::{debug, error, info, warn};

use resource_arbiter_bootstrap::platform::create_fifo;
use resource_arbiter_bootstrap::shutdown::CancellationToken;
use resource_arbiter_domain::ArbiterError;

use crate::infrastructure::runtime::worker::Worker;

/// Handler invoked with the command's arguments (argv[1..]).
pub type CommandHandler = Arc<dyn Fn(Vec<String>) -> BoxFuture<'static, i32> + Send + Sync>;

struct CommandEntry {
    description: String,
    handler: CommandHandler,
}

/// Registry and FIFO worker for operator commands.
pub struct CommandManager {
    fifo_path: PathBuf,
    handlers: Mutex<BTreeMap<String, CommandEntry>>,
    receiver: tokio::sync::Mutex<Option<pipe::Receiver>>,
}

impl CommandManager {
    pub fn new(fifo_path: PathBuf) -> Arc<Self> {
        let manager = Arc::new(Self {
            fifo_path,
            handlers: Mutex::new(BTreeMap::new()),
            receiver: tokio::sync::Mutex::new(None),
        });
        // Weak: the help handler must not keep its own manager alive
        let help_target = Arc::downgrade(&manager);
        manager.register_command(
            "bq.cm.help",
            "List all the supported commands",
            Arc::new(move |_args| {
                let manager = help_target.upgrade();
                Box::pin(async move {
                    match manager {
                        Some(manager) => {
                            manager.print_help();
                            0
                        }
                        None => 1,
                    }
                })
            }),
        );
        manager
    }

    /// Registers a handler under an exact command name.
    pub fn register_command(&self, name: &str, description: &str, handler: CommandHandler) {
        debug!(command = name, "Command registered");
        self.handlers.lock().insert(
            name.to_string(),
            CommandEntry {
                description: description.to_string(),
                handler,
            },
        );
    }

    fn print_help(&self) {
        info!("========== Supported commands =================================");
        for (name, entry) in self.handlers.lock().iter() {
            info!("| {:<24} | {:<40} |", name, entry.description);
        }
        info!("===============================================================");
    }

    /// Parses and dispatches one command line, returning its exit code.
    pub async fn dispatch_line(&self, line: &str) -> i32 {
        let argv = match split_command_line(line) {
            Ok(argv) => argv,
            Err(e) => {
                warn!(line, error = %e, "Malformed command line");
                return -1;
            }
        };
        let (name, args) = match argv.split_first() {
            Some((name, args)) => (name.clone(), args.to_vec()),
            None => return -1,
        };

        let handler = self.handlers.lock().get(&name).map(|e| Arc::clone(&e.handler));
        match handler {
            Some(handler) => {
                let code = handler(args).await;
                if code == 0 {
                    debug!(command = %name, "Command OK");
                } else {
                    warn!(command = %name, code, "Command failed");
                }
                code
            }
            None => {
                warn!(command = %name, "Unknown command");
                -1
            }
        }
    }
}

#[async_trait]
impl Worker for CommandManager {
    fn name(&self) -> &str {
        "bq.cm"
    }

    async fn setup(&self) -> Result<(), ArbiterError> {
        if let Some(dir) = self.fifo_path.parent() {
            std::fs::create_dir_all(dir)
                .map_err(|e| ArbiterError::IoError(format!("{}: {}", dir.display(), e)))?;
        }
        create_fifo(&self.fifo_path, 0o666)
            .map_err(|e| ArbiterError::IoError(format!("{}: {}", self.fifo_path.display(), e)))?;

        // Read-write keeps the FIFO open across writers
        let receiver = pipe::OpenOptions::new()
            .read_write(true)
            .open_receiver(&self.fifo_path)
            .map_err(|e| ArbiterError::IoError(format!("{}: {}", self.fifo_path.display(), e)))?;
        *self.receiver.lock().await = Some(receiver);
        info!(fifo = %self.fifo_path.display(), "Command FIFO ready");
        Ok(())
    }

    async fn run(&self, done: CancellationToken) -> Result<(), ArbiterError> {
        let receiver = self
            .receiver
            .lock()
            .await
            .take()
            .ok_or_else(|| ArbiterError::InternalError("command FIFO not set up".into()))?;
        let mut lines = BufReader::new(receiver).lines();
        loop {
            tokio::select! {
                _ = done.cancelled() => return Ok(()),
                line = lines.next_line() => match line {
                    Ok(Some(line)) => {
                        let line = line.trim();
                        if line.is_empty() {
                            continue;
                        }
                        info!(line, "Command received");
                        self.dispatch_line(line).await;
                    }
                    Ok(None) => {
                        // Never happens while we hold the write end open
                        error!("Command FIFO closed");
                        return Ok(());
                    }
                    Err(e) => return Err(ArbiterError::IoError(e.to_string())),
                },
            }
        }
    }
}

/// Splits a shell-quoted command line into its argv.
///
/// Supports single and double quotes plus backslash escapes outside
/// single quotes.
///
/// # Errors
/// Returns `InvalidConfiguration` on unbalanced quotes or a dangling
/// escape.
pub fn split_command_line(line: &str) -> Result<Vec<String>, ArbiterError> {
    let mut argv = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut chars = line.chars();

    #[derive(PartialEq)]
    enum Quote {
        None,
        Single,
        Double,
    }
    let mut quote = Quote::None;

    while let Some(c) = chars.next() {
        match quote {
            Quote::Single => {
                if c == '\'' {
                    quote = Quote::None;
                } else {
                    current.push(c);
                }
            }
            Quote::Double => match c {
                '"' => quote = Quote::None,
                '\\' => match chars.next() {
                    Some(escaped) => current.push(escaped),
                    None => {
                        return Err(ArbiterError::InvalidConfiguration(
                            "dangling escape".into(),
                        ));
                    }
                },
                _ => current.push(c),
            },
            Quote::None => match c {
                '\'' => {
                    quote = Quote::Single;
                    in_word = true;
                }
                '"' => {
                    quote = Quote::Double;
                    in_word = true;
                }
                '\\' => match chars.next() {
                    Some(escaped) => {
                        current.push(escaped);
                        in_word = true;
                    }
                    None => {
                        return Err(ArbiterError::InvalidConfiguration(
                            "dangling escape".into(),
                        ));
                    }
                },
                c if c.is_whitespace() => {
                    if in_word {
                        argv.push(std::mem::take(&mut current));
                        in_word = false;
                    }
                }
                _ => {
                    current.push(c);
                    in_word = true;
                }
            },
        }
    }
    if quote != Quote::None {
        return Err(ArbiterError::InvalidConfiguration(
            "unbalanced quotes".into(),
        ));
    }
    if in_word {
        argv.push(current);
    }
    Ok(argv)
}
