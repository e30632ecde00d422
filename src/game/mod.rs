//! Game Module
//!
//! Drives a single game: replays its log book through the rules engine,
//! accepts new entries one at a time, and keeps the game file current.
//!
//! ## Module Structure
//!
//! - `interactor`: Replay, submission queue, and state queries
//! - `file`: Game file loading and saving
//! - `open_hours`: Weekly schedules and automatic start of day

pub mod file;
pub mod interactor;
pub mod open_hours;

/// Board state as produced by the rules engine. Opaque to this crate.
pub type GameState = serde_json::Value;

// Re-export key types
pub use file::{GameFile, GameFileError, FILE_FORMAT_VERSION};
pub use interactor::{GameSnapshot, Interactor, InteractorError, SaveHandler, SaveSnapshot, SharedLogBook};
pub use open_hours::{OpenHours, OpenHoursError, Schedule};
