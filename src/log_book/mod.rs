//! Log Book Module
//!
//! The authoritative record of every action taken in a game.
//!
//! ## Module Structure
//!
//! - `entry`: Single log entries and their raw payloads
//! - `book`: The append-only, day-indexed log book
//! - `formatter`: Per-version message templates

pub mod book;
pub mod entry;
pub mod formatter;

// Re-export key types
pub use book::{LogBook, LogBookError, SerializedLogBook, Clock, system_clock};
pub use entry::{LogEntry, RawLogEntry, START_OF_DAY};
pub use formatter::{GameConfig, VersionConfig, LogEntryFormatter};
