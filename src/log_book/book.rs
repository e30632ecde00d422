//! The log book: an append-only record of actions grouped by day.
//!
//! Entry ids are dense and match positions. Days never decrease, so the
//! first entry of each day is enough to answer every day-boundary query.

use std::collections::BTreeMap;
use std::ops::Bound::{Excluded, Unbounded};

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use super::entry::{explicit_day, LogEntry, RawLogEntry};
use super::formatter::{GameConfig, VersionConfig};

/// Spacing given to entries stored without a timestamp (20 minutes).
pub const DEFAULT_TIME_INTERVAL: i64 = 20 * 60;

/// Source of unix timestamps (seconds) for new entries.
pub type Clock = fn() -> i64;

/// Wall clock used unless a log book is given another.
pub fn system_clock() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Log book errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LogBookError {
    /// Entry id is not the next position.
    #[error("entry id {found} is not the next id ({expected})")]
    NonSequentialId {
        /// Id the log book expected.
        expected: usize,
        /// Id on the entry.
        found: usize,
    },

    /// Entry would move the log book back in time.
    #[error("entry {id} is on day {day} but the log book is already on day {max_day}")]
    DayRegression {
        /// Offending entry.
        id: usize,
        /// Its day.
        day: u32,
        /// Latest day already recorded.
        max_day: u32,
    },

    /// Stored timestamps go backwards.
    #[error("entry timestamps must be ascending {index}: {timestamp} and {previous_index}: {previous}")]
    TimestampOrder {
        /// Offending entry.
        index: usize,
        /// Its timestamp.
        timestamp: i64,
        /// Entry before it.
        previous_index: usize,
        /// Timestamp of the entry before it.
        previous: i64,
    },

    /// Stored timestamp is not a whole number of seconds, or a filled in
    /// one would not fit.
    #[error("entry {index} has an invalid timestamp: {value}")]
    InvalidTimestamp {
        /// Offending entry.
        index: usize,
        /// Timestamp as stored (or the one before a missing timestamp).
        value: String,
    },
}

/// Log book as stored in a game file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SerializedLogBook {
    /// Game version the entries were recorded under.
    #[serde(deserialize_with = "version_string")]
    pub game_version: String,
    /// Raw payloads in order.
    #[serde(default)]
    pub raw_entries: Vec<RawLogEntry>,
}

/// Game versions have been written both as numbers and as strings.
pub(crate) fn version_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "game version must be a string or number, got {}",
            other
        ))),
    }
}

/// Append-only, day-indexed sequence of log entries.
#[derive(Debug, Clone)]
pub struct LogBook {
    /// Game version the entries are processed under.
    pub game_version: String,
    entries: Vec<LogEntry>,
    version_config: Option<VersionConfig>,
    clock: Clock,
    /// Day -> id of that day's first entry.
    day_index: BTreeMap<u32, usize>,
}

impl LogBook {
    /// Build a log book from already constructed entries.
    pub fn new(
        game_version: impl Into<String>,
        entries: Vec<LogEntry>,
        version_config: Option<VersionConfig>,
    ) -> Result<Self, LogBookError> {
        let mut book = Self {
            game_version: game_version.into(),
            entries: Vec::with_capacity(entries.len()),
            version_config,
            clock: system_clock,
            day_index: BTreeMap::new(),
        };

        for entry in entries {
            book.add_entry(entry)?;
        }

        Ok(book)
    }

    /// Use `clock` to stamp entries made by [`LogBook::make_entry_from_raw`].
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Current time according to this log book's clock.
    pub fn now(&self) -> i64 {
        (self.clock)()
    }

    /// Rebuild a log book from its stored form.
    ///
    /// A log book is never empty: with no stored entries a single
    /// start-of-day entry for day 1 is synthesized.
    pub fn deserialize(raw: SerializedLogBook, config: Option<&GameConfig>) -> Result<Self, LogBookError> {
        let SerializedLogBook { game_version, mut raw_entries } = raw;
        let version_config = config.and_then(|c| c.version(&game_version)).cloned();

        if raw_entries.is_empty() {
            debug!("Empty log book, starting on day 1");
            raw_entries.push(synthetic_first_entry());
        }

        let mut entries = Vec::with_capacity(raw_entries.len());
        let mut previous_day = 0;
        let mut previous_time: i64 = 0;

        for (idx, mut raw_entry) in raw_entries.into_iter().enumerate() {
            let timestamp = match raw_entry.get("timestamp") {
                None | Some(Value::Null) => {
                    let filled = previous_time.checked_add(DEFAULT_TIME_INTERVAL).ok_or_else(|| {
                        LogBookError::InvalidTimestamp {
                            index: idx,
                            value: format!("{} + {}", previous_time, DEFAULT_TIME_INTERVAL),
                        }
                    })?;
                    raw_entry.insert("timestamp".into(), json!(filled));
                    filled
                }
                Some(stored) => stored.as_i64().ok_or_else(|| LogBookError::InvalidTimestamp {
                    index: idx,
                    value: stored.to_string(),
                })?,
            };

            if idx > 0 && previous_time > timestamp {
                return Err(LogBookError::TimestampOrder {
                    index: idx,
                    timestamp,
                    previous_index: idx - 1,
                    previous: previous_time,
                });
            }
            previous_time = timestamp;

            let entry = LogEntry::from_raw(idx, previous_day, raw_entry, version_config.as_ref());
            previous_day = entry.day;
            entries.push(entry);
        }

        Self::new(game_version, entries, version_config)
    }

    /// Stored form of this log book.
    pub fn serialize(&self) -> SerializedLogBook {
        SerializedLogBook {
            game_version: self.game_version.clone(),
            raw_entries: self.entries.iter().map(LogEntry::to_raw).collect(),
        }
    }

    /// Entry by id.
    pub fn entry(&self, id: usize) -> Option<&LogEntry> {
        self.entries.get(id)
    }

    /// Build (but do not add) the next entry from a raw payload.
    ///
    /// Without an explicit day the entry belongs to the current day.
    pub fn make_entry_from_raw(&self, mut raw: RawLogEntry) -> LogEntry {
        let day = explicit_day(&raw).or_else(|| self.max_day()).unwrap_or(1);
        raw.insert("timestamp".into(), json!(self.now()));

        LogEntry::new(self.entries.len(), day, raw, self.version_config.as_ref())
    }

    /// Check that `entry` could be appended next.
    pub fn validate_next(&self, entry: &LogEntry) -> Result<(), LogBookError> {
        let expected = self.entries.len();
        if entry.id != expected {
            return Err(LogBookError::NonSequentialId {
                expected,
                found: entry.id,
            });
        }

        if let Some(max_day) = self.max_day() {
            if entry.day < max_day {
                return Err(LogBookError::DayRegression {
                    id: entry.id,
                    day: entry.day,
                    max_day,
                });
            }
        }

        Ok(())
    }

    /// Append an entry built for the next position. Returns its id.
    pub fn add_entry(&mut self, entry: LogEntry) -> Result<usize, LogBookError> {
        self.validate_next(&entry)?;

        let id = entry.id;
        self.day_index.entry(entry.day).or_insert(id);
        self.entries.push(entry);

        Ok(id)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether there are no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Id of the first entry.
    pub fn first_entry_id(&self) -> usize {
        0
    }

    /// Id of the last entry, `None` when empty.
    pub fn last_entry_id(&self) -> Option<usize> {
        self.entries.len().checked_sub(1)
    }

    /// Earliest recorded day.
    pub fn min_day(&self) -> Option<u32> {
        self.entries.first().map(|e| e.day)
    }

    /// Latest recorded day.
    pub fn max_day(&self) -> Option<u32> {
        self.entries.last().map(|e| e.day)
    }

    /// First entry recorded on `day`.
    pub fn first_entry_of_day(&self, day: u32) -> Option<&LogEntry> {
        self.day_index.get(&day).and_then(|id| self.entry(*id))
    }

    /// Last entry recorded on `day`.
    pub fn last_entry_of_day(&self, day: u32) -> Option<&LogEntry> {
        let first = *self.day_index.get(&day)?;

        let last = match self.day_index.range((Excluded(day), Unbounded)).next() {
            Some((_, next_first)) => next_first - 1,
            None => self.last_entry_id()?,
        };

        debug_assert!(last >= first);
        self.entry(last)
    }

    /// Every entry recorded on `day` (empty for unknown days).
    pub fn entries_on_day(&self, day: u32) -> &[LogEntry] {
        match (self.first_entry_of_day(day), self.last_entry_of_day(day)) {
            (Some(first), Some(last)) => &self.entries[first.id..=last.id],
            _ => &[],
        }
    }

    /// Days that have at least one entry, ascending.
    pub fn days(&self) -> Vec<u32> {
        self.day_index.keys().copied().collect()
    }

    /// Entries from first to last. Restartable.
    pub fn iter(&self) -> std::slice::Iter<'_, LogEntry> {
        self.entries.iter()
    }
}

impl<'a> IntoIterator for &'a LogBook {
    type Item = &'a LogEntry;
    type IntoIter = std::slice::Iter<'a, LogEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

fn synthetic_first_entry() -> RawLogEntry {
    let mut raw = RawLogEntry::new();
    raw.insert("type".into(), json!("action"));
    raw.insert("day".into(), json!(1));
    raw
}
