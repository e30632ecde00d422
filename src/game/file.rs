//! Game Files
//!
//! A game is stored as one JSON document:
//!
//! ```text
//! {
//!     "versions": { "fileFormat": 2, "game": "3" },
//!     "logBook": [ <raw entry>, ... ],
//!     "initialState": { ... }
//! }
//! ```
//!
//! Only the current file format is accepted. `GameFile` is also the usual
//! save handler for an interactor: every commit rewrites the file.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::interactor::{GameSnapshot, SaveHandler, SaveSnapshot};
use super::open_hours::OpenHours;
use super::GameState;
use crate::log_book::book::version_string;
use crate::log_book::{GameConfig, LogBook, LogBookError, RawLogEntry, SerializedLogBook};

/// File format written by this crate.
pub const FILE_FORMAT_VERSION: u64 = 2;

/// Game file errors.
#[derive(Debug, thiserror::Error)]
pub enum GameFileError {
    /// Reading or writing the file failed.
    #[error("game file I/O error on {path}: {source}")]
    Io {
        /// File involved.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// File content is not a valid game file.
    #[error("invalid game file: {0}")]
    Parse(#[from] serde_json::Error),

    /// File was written by a different format version.
    #[error("File version {0} is not supported")]
    UnsupportedFormat(u64),

    /// The stored log book is inconsistent.
    #[error("invalid log book: {0}")]
    LogBook(#[from] LogBookError),
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileVersions {
    file_format: u64,
    #[serde(deserialize_with = "version_string")]
    game: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileContents {
    versions: FileVersions,
    #[serde(default)]
    log_book: Vec<RawLogEntry>,
    initial_state: GameState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    open_hours: Option<OpenHours>,
}

/// A game stored on disk.
pub struct GameFile {
    path: PathBuf,
    /// Serializes concurrent writers of the same file.
    write_lock: Mutex<()>,
}

impl GameFile {
    /// Handle for `path` (nothing is read until [`GameFile::load`]).
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Path of the file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write a new game with an empty log book.
    pub async fn create(
        path: impl Into<PathBuf>,
        game_version: &str,
        initial_state: GameState,
    ) -> Result<Self, GameFileError> {
        let file = Self::new(path);
        let contents = FileContents {
            versions: FileVersions {
                file_format: FILE_FORMAT_VERSION,
                game: game_version.to_string(),
            },
            log_book: Vec::new(),
            initial_state,
            open_hours: None,
        };
        file.write(&contents).await?;
        Ok(file)
    }

    /// Read the log book, initial state and open hours.
    pub async fn load(&self, config: Option<&GameConfig>) -> Result<GameSnapshot, GameFileError> {
        let text = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|source| self.io_error(source))?;

        let document: Value = serde_json::from_str(&text)?;
        let file_format = document
            .pointer("/versions/fileFormat")
            .and_then(Value::as_u64)
            .unwrap_or(0);

        if file_format != FILE_FORMAT_VERSION {
            return Err(GameFileError::UnsupportedFormat(file_format));
        }

        let contents: FileContents = serde_json::from_value(document)?;
        let log_book = LogBook::deserialize(
            SerializedLogBook {
                game_version: contents.versions.game,
                raw_entries: contents.log_book,
            },
            config,
        )?;

        info!(
            path = %self.path.display(),
            game_version = %log_book.game_version,
            entries = log_book.len(),
            schedules = contents.open_hours.as_ref().map_or(0, |h| h.schedules.len()),
            "Loaded game file"
        );

        Ok(GameSnapshot {
            log_book,
            initial_game_state: contents.initial_state,
            open_hours: contents.open_hours,
        })
    }

    /// Overwrite the file with `initial_game_state`, `log_book` and
    /// `open_hours`.
    pub async fn store(
        &self,
        initial_game_state: &GameState,
        log_book: &LogBook,
        open_hours: Option<&OpenHours>,
    ) -> Result<(), GameFileError> {
        let serialized = log_book.serialize();
        let contents = FileContents {
            versions: FileVersions {
                file_format: FILE_FORMAT_VERSION,
                game: serialized.game_version,
            },
            log_book: serialized.raw_entries,
            initial_state: initial_game_state.clone(),
            open_hours: open_hours.cloned(),
        };
        self.write(&contents).await
    }

    async fn write(&self, contents: &FileContents) -> Result<(), GameFileError> {
        let mut buf = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
        contents.serialize(&mut serializer)?;

        let _guard = self.write_lock.lock().await;

        // Write beside the target and rename so readers never see a partial file.
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &buf).await.map_err(|source| self.io_error(source))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|source| self.io_error(source))?;

        debug!(path = %self.path.display(), bytes = buf.len(), "Saved game file");
        Ok(())
    }

    fn io_error(&self, source: std::io::Error) -> GameFileError {
        GameFileError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

#[async_trait]
impl SaveHandler for GameFile {
    async fn save(&self, snapshot: SaveSnapshot<'_>) -> Result<(), GameFileError> {
        self.store(snapshot.initial_game_state, snapshot.log_book, snapshot.open_hours)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_create_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("game.json");

        let file = GameFile::create(&path, "3", json!({ "v": 1 })).await.unwrap();
        let snapshot = file.load(None).await.unwrap();

        assert_eq!(snapshot.initial_game_state, json!({ "v": 1 }));
        assert_eq!(snapshot.log_book.game_version, "3");
        // Empty log books load with their day 1 anchor
        assert_eq!(snapshot.log_book.len(), 1);
        assert_eq!(snapshot.log_book.entry(0).unwrap().day, 1);
    }

    #[tokio::test]
    async fn test_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("game.json");
        std::fs::write(
            &path,
            serde_json::to_string(&json!({
                "versions": { "fileFormat": 2, "game": 3 },
                "logBook": [
                    { "type": "action", "day": 1, "timestamp": 1200 },
                    { "type": "action", "action": "shoot", "subject": "Corey", "timestamp": 2400 }
                ],
                "initialState": { "v": 1 }
            }))
            .unwrap(),
        )
        .unwrap();

        let file = GameFile::new(&path);
        let mut snapshot = file.load(None).await.unwrap();
        assert_eq!(snapshot.log_book.len(), 2);

        let entry = snapshot.log_book.make_entry_from_raw(
            json!({ "action": "move", "subject": "Corey" }).as_object().cloned().unwrap(),
        );
        snapshot.log_book.add_entry(entry).unwrap();
        file.store(&snapshot.initial_game_state, &snapshot.log_book, None).await.unwrap();

        let reloaded = file.load(None).await.unwrap();
        assert_eq!(reloaded.log_book.serialize(), snapshot.log_book.serialize());
        assert_eq!(reloaded.initial_game_state, snapshot.initial_game_state);

        let written: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written["versions"]["fileFormat"], json!(2));
        assert_eq!(written["logBook"].as_array().unwrap().len(), 3);
        assert!(written.get("openHours").is_none());
    }

    #[tokio::test]
    async fn test_open_hours_kept() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("game.json");
        std::fs::write(
            &path,
            serde_json::to_string(&json!({
                "versions": { "fileFormat": 2, "game": "3" },
                "logBook": [],
                "initialState": {},
                "openHours": {
                    "schedules": [{
                        "daysOfWeek": ["m", "f"],
                        "startTime": "6:00pm",
                        "endTime": "10:00pm",
                        "autoStartOfDay": true,
                        "holidays": ["12/25"]
                    }]
                }
            }))
            .unwrap(),
        )
        .unwrap();

        let file = GameFile::new(&path);
        let snapshot = file.load(None).await.unwrap();
        let open_hours = snapshot.open_hours.clone().unwrap();
        assert!(open_hours.has_automatic_start_of_day());
        assert_eq!(open_hours.schedules[0].start_time(), "6:00pm");

        file.store(&snapshot.initial_game_state, &snapshot.log_book, Some(&open_hours))
            .await
            .unwrap();
        assert_eq!(file.load(None).await.unwrap().open_hours, Some(open_hours));

        let written: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written["openHours"]["schedules"][0]["holidays"], json!(["12/25"]));
    }

    #[tokio::test]
    async fn test_invalid_open_hours() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("game.json");
        std::fs::write(
            &path,
            serde_json::to_string(&json!({
                "versions": { "fileFormat": 2, "game": "3" },
                "initialState": {},
                "openHours": [{ "daysOfWeek": ["m"], "startTime": "5:00pm", "endTime": "9:00am" }]
            }))
            .unwrap(),
        )
        .unwrap();

        let err = GameFile::new(&path).load(None).await.unwrap_err();
        assert!(matches!(err, GameFileError::Parse(_)));
    }

    #[tokio::test]
    async fn test_rejects_other_formats() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("game.json");

        for format in [1, 3] {
            std::fs::write(
                &path,
                serde_json::to_string(&json!({
                    "versions": { "fileFormat": format, "game": 3 },
                    "gameStates": [{}],
                    "initialState": {}
                }))
                .unwrap(),
            )
            .unwrap();

            let err = GameFile::new(&path).load(None).await.unwrap_err();
            assert!(matches!(err, GameFileError::UnsupportedFormat(f) if f == format));
        }
    }

    #[tokio::test]
    async fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = GameFile::new(dir.path().join("nope.json")).load(None).await.unwrap_err();
        assert!(matches!(err, GameFileError::Io { .. }));
    }

    #[tokio::test]
    async fn test_bad_timestamps_surface() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("game.json");
        std::fs::write(
            &path,
            serde_json::to_string(&json!({
                "versions": { "fileFormat": 2, "game": "3" },
                "logBook": [{ "day": 1, "timestamp": 50 }, { "action": "move", "timestamp": 10 }],
                "initialState": {}
            }))
            .unwrap(),
        )
        .unwrap();

        let err = GameFile::new(&path).load(None).await.unwrap_err();
        assert!(matches!(err, GameFileError::LogBook(LogBookError::TimestampOrder { .. })));
    }
}
