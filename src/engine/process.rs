//! Subprocess Engine Transport
//!
//! Runs the rules engine as a child process and talks to it over
//! stdin/stdout using the JSON-lines protocol. The process is started on
//! first use and restarted on the next request after it dies.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};

use super::protocol::{parse_response, EngineCommand, EngineRequest};
use super::{EngineError, GameEngine};
use crate::config::EngineConfig;
use crate::game::GameState;
use crate::log_book::LogEntry;

/// A running engine process.
struct EngineProcess {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

/// Rules engine backed by a child process.
pub struct ProcessEngine {
    command: Vec<String>,
    timeout: Duration,
    process: Mutex<Option<EngineProcess>>,
}

impl ProcessEngine {
    /// Create an engine that will launch `command` on first use.
    pub fn new(command: Vec<String>, timeout: Duration) -> Self {
        Self {
            command,
            timeout,
            process: Mutex::new(None),
        }
    }

    /// Create an engine from configuration, locating the jar if needed.
    pub fn from_config(config: &EngineConfig) -> Result<Self, EngineError> {
        let command = config.resolve_command().ok_or(EngineError::NotConfigured)?;
        Ok(Self::new(command, config.timeout))
    }

    /// Whether the child process is currently running.
    pub async fn is_running(&self) -> bool {
        self.process.lock().await.is_some()
    }

    /// Current board state as the engine sees it.
    pub async fn board_state(&self) -> Result<GameState, EngineError> {
        self.request(EngineRequest::Command(EngineCommand::Display)).await
    }

    fn spawn(&self) -> Result<EngineProcess, EngineError> {
        let (program, args) = self
            .command
            .split_first()
            .ok_or(EngineError::NotConfigured)?;

        debug!(command = %self.command.join(" "), "Starting tank game engine");

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stdin = child.stdin.take().ok_or(EngineError::Exited)?;
        let stdout = child.stdout.take().ok_or(EngineError::Exited)?;

        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    info!(output = %line, "Tank game engine stderr");
                }
            });
        }

        Ok(EngineProcess {
            child,
            stdin,
            stdout: BufReader::new(stdout),
        })
    }

    /// Send one request and wait for its response line.
    async fn request(&self, request: EngineRequest<'_>) -> Result<Value, EngineError> {
        let line = request.to_line()?;
        let mut guard = self.process.lock().await;

        if guard.is_none() {
            *guard = Some(self.spawn()?);
        }
        let Some(process) = guard.as_mut() else {
            return Err(EngineError::Exited);
        };

        #[cfg(feature = "debug-tracing")]
        debug!(request = %line.trim_end(), "Send data to tank game engine");

        let sent = async {
            process.stdin.write_all(line.as_bytes()).await?;
            process.stdin.flush().await
        }
        .await;

        if let Err(e) = sent {
            warn!(kind = request.kind(), "Failed to write to tank game engine: {}", e);
            Self::reap(guard.take()).await;
            return Err(EngineError::Io(e));
        }

        let mut response = String::new();
        let read = tokio::time::timeout(self.timeout, process.stdout.read_line(&mut response)).await;
        match read {
            Err(_) => {
                error!(
                    kind = request.kind(),
                    timeout = ?self.timeout,
                    "Tank game engine took too long to respond with valid json"
                );
                if let Some(mut process) = guard.take() {
                    let _ = process.child.kill().await;
                }
                Err(EngineError::Timeout(self.timeout))
            }
            Ok(Err(e)) => {
                Self::reap(guard.take()).await;
                Err(EngineError::Io(e))
            }
            Ok(Ok(0)) => {
                Self::reap(guard.take()).await;
                Err(EngineError::Exited)
            }
            Ok(Ok(_)) => {
                #[cfg(feature = "debug-tracing")]
                debug!(response = %response.trim_end(), "Receive data from tank game engine");

                parse_response(&response)
            }
        }
    }

    /// Log how a dead engine exited.
    async fn reap(process: Option<EngineProcess>) {
        let Some(mut process) = process else {
            return;
        };

        drop(process.stdin);
        match tokio::time::timeout(Duration::from_secs(1), process.child.wait()).await {
            Ok(Ok(status)) if status.success() => debug!("Tank game engine exited with {}", status),
            Ok(Ok(status)) => warn!("Tank game engine exited with {}", status),
            Ok(Err(e)) => warn!("Failed to collect tank game engine status: {}", e),
            Err(_) => {
                warn!("Tank game engine did not exit, killing it");
                let _ = process.child.kill().await;
            }
        }
    }
}

#[async_trait]
impl GameEngine for ProcessEngine {
    async fn set_game_version(&self, version: &str) -> Result<(), EngineError> {
        self.request(EngineRequest::Version(version)).await.map(drop)
    }

    async fn set_board_state(&self, state: &GameState) -> Result<(), EngineError> {
        self.request(EngineRequest::State(state)).await.map(drop)
    }

    #[instrument(skip(self, entry), fields(id = entry.id, entry_type = %entry.entry_type))]
    async fn process_action(&self, entry: &LogEntry) -> Result<GameState, EngineError> {
        self.request(EngineRequest::Action(&entry.raw)).await?;
        self.board_state().await
    }

    async fn can_process_action(&self, entry: &LogEntry) -> Result<bool, EngineError> {
        match self.request(EngineRequest::Action(&entry.raw)).await {
            Ok(_) => Ok(true),
            Err(EngineError::Rejected(reason)) => {
                debug!(entry_type = %entry.entry_type, %reason, "Engine rejected action check");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    async fn shutdown(&self) -> Result<(), EngineError> {
        if !self.is_running().await {
            return Ok(());
        }

        let result = match self.request(EngineRequest::Command(EngineCommand::Exit)).await {
            // Exiting before answering is still a clean shutdown.
            Ok(_) | Err(EngineError::Exited) => Ok(()),
            Err(e) => Err(e),
        };

        let process = self.process.lock().await.take();
        Self::reap(process).await;
        result
    }
}
