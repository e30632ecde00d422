//! Log entries.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use super::formatter::{default_message, VersionConfig};

/// Opaque action payload as recorded in a game file.
pub type RawLogEntry = Map<String, Value>;

/// Entry type used when the raw payload has no `action` field.
pub const START_OF_DAY: &str = "start_of_day";

/// One recorded action.
#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    /// Position in the log book.
    pub id: usize,
    /// Day this entry belongs to.
    pub day: u32,
    /// Action discriminator.
    pub entry_type: String,
    /// Raw payload sent to the engine.
    pub raw: RawLogEntry,
    /// Human readable description.
    pub message: String,
}

impl LogEntry {
    /// Build an entry, formatting its message with `config` when available.
    pub fn new(id: usize, day: u32, raw: RawLogEntry, config: Option<&VersionConfig>) -> Self {
        let entry_type = entry_type_of(&raw);

        let message = config
            .and_then(|c| c.formatter(&entry_type))
            .map(|formatter| formatter.format(&raw))
            .unwrap_or_else(|| default_message(&entry_type));

        Self {
            id,
            day,
            entry_type,
            raw,
            message,
        }
    }

    /// Build an entry from a stored payload; the day carries over from the
    /// previous entry unless the payload sets one.
    pub fn from_raw(id: usize, previous_day: u32, raw: RawLogEntry, config: Option<&VersionConfig>) -> Self {
        let day = explicit_day(&raw).unwrap_or(previous_day);
        Self::new(id, day, raw, config)
    }

    /// Payload to store.
    pub fn to_raw(&self) -> RawLogEntry {
        self.raw.clone()
    }

    /// Unix timestamp (seconds) recorded on the payload.
    pub fn timestamp_secs(&self) -> Option<i64> {
        self.raw.get("timestamp").and_then(Value::as_i64)
    }

    /// Recorded timestamp as a date.
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.timestamp_secs().and_then(|secs| DateTime::from_timestamp(secs, 0))
    }

    /// Whether this entry starts a new day.
    pub fn is_start_of_day(&self) -> bool {
        self.entry_type == START_OF_DAY
    }
}

/// The payload's `day` field, if set to a positive day.
pub fn explicit_day(raw: &RawLogEntry) -> Option<u32> {
    raw.get("day")
        .and_then(Value::as_u64)
        .filter(|day| *day > 0)
        .and_then(|day| u32::try_from(day).ok())
}

fn entry_type_of(raw: &RawLogEntry) -> String {
    raw.get("action")
        .and_then(Value::as_str)
        .unwrap_or(START_OF_DAY)
        .to_string()
}
