//! Rules Engine Interface
//!
//! The interactor never computes game state itself; it drives an external
//! rules engine through this trait. Implementations:
//!
//! - `process`: JSON-lines subprocess transport
//! - `mock` (tests only): recording in-memory engine
//!
//! Every call may fail. The interactor does not distinguish a rejected
//! action from a broken transport; both come back as [`EngineError`].

use std::time::Duration;

use async_trait::async_trait;

use crate::game::GameState;
use crate::log_book::LogEntry;

pub mod process;
pub mod protocol;

#[cfg(test)]
pub mod mock;

pub use process::ProcessEngine;
pub use protocol::{EngineCommand, EngineRequest};

/// Engine errors.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The engine refused the request (invalid action, bad state).
    #[error("EngineError: {0}")]
    Rejected(String),

    /// Pipe or process I/O failed.
    #[error("engine I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The engine answered with something that is not JSON.
    #[error("malformed engine response: {0}")]
    Protocol(#[from] serde_json::Error),

    /// A request could not be encoded.
    #[error("invalid engine request: {0}")]
    InvalidRequest(String),

    /// No response within the configured timeout.
    #[error("engine took longer than {0:?} to respond with valid json")]
    Timeout(Duration),

    /// The engine process closed its output.
    #[error("engine exited")]
    Exited,

    /// No engine command could be determined.
    #[error("no tank game engine is configured")]
    NotConfigured,
}

impl EngineError {
    /// Whether the engine itself refused the request.
    pub fn is_rejection(&self) -> bool {
        matches!(self, EngineError::Rejected(_))
    }
}

/// Capability exposed by a rules engine.
///
/// Calls are stateful on the engine side (version, then board state, then
/// actions); callers must not interleave sequences from different tasks.
#[async_trait]
pub trait GameEngine: Send + Sync {
    /// Select the rule set.
    async fn set_game_version(&self, version: &str) -> Result<(), EngineError>;

    /// Replace the engine's board with `state`.
    async fn set_board_state(&self, state: &GameState) -> Result<(), EngineError>;

    /// Apply an action and return the resulting state.
    async fn process_action(&self, entry: &LogEntry) -> Result<GameState, EngineError>;

    /// Check whether an action would be accepted.
    async fn can_process_action(&self, entry: &LogEntry) -> Result<bool, EngineError>;

    /// Stop the engine.
    async fn shutdown(&self) -> Result<(), EngineError>;
}
