//! # Tank Game Server
//!
//! Log book replay and action submission for Tank Game, backed by an
//! external rules engine.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    TANK GAME SERVER                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/           - Shared primitives                         │
//! │  ├── queue.rs    - Single-worker serialization queue         │
//! │  └── hash.rs     - State hashing for comparison              │
//! │                                                              │
//! │  log_book/       - Authoritative action record               │
//! │  ├── entry.rs    - Log entries and raw payloads              │
//! │  ├── book.rs     - Day-indexed, append-only log book         │
//! │  └── formatter.rs- Per-version entry messages                │
//! │                                                              │
//! │  engine/         - Rules engine access                       │
//! │  ├── protocol.rs - JSON-lines request/response format        │
//! │  └── process.rs  - Subprocess transport                      │
//! │                                                              │
//! │  game/           - One running game                          │
//! │  ├── interactor.rs - Replay and ordered submissions          │
//! │  ├── file.rs     - Game file load/save                       │
//! │  └── open_hours.rs - Schedules and automatic start of day    │
//! │                                                              │
//! │  config.rs       - Environment configuration                 │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Ordering Guarantee
//!
//! The rules engine is stateful: every action is applied to whatever board
//! it was last given. The interactor therefore runs every engine sequence
//! (replay, add, check) through one FIFO queue, and state `i` is always the
//! result of applying entry `i` to state `i - 1`.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod config;
pub mod core;
pub mod engine;
pub mod game;
pub mod log_book;

// Re-export commonly used types
pub use config::{ConfigError, EngineConfig, ServerConfig};
pub use crate::core::hash::{state_hash, StateHash};
pub use engine::{EngineError, GameEngine, ProcessEngine};
pub use game::{GameFile, GameSnapshot, GameState, Interactor, InteractorError, OpenHours};
pub use log_book::{LogBook, LogEntry, RawLogEntry};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
