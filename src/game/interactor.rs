//! Game Interactor
//!
//! Owns the log book and the game state produced by every entry, and is the
//! only thing that talks to the rules engine. Every operation that touches
//! the engine (the initial replay, catch-up replays, new entries and
//! action checks) runs through one [`SerialQueue`], so the engine never sees two
//! interleaved version/state/action sequences.
//!
//! ## Invariants
//!
//! - After a successful replay `game_states.len() == log_book.len()` and
//!   `game_states[i]` is the state after applying entry `i`.
//! - A failed submission leaves both the log book and the states untouched.
//! - Readers take short lock guards that are never held across engine calls.
//!
//! ## Open Hours
//!
//! When the game has open hours, new entries and action checks are refused while
//! it is closed. Schedules with automatic start of day get a background
//! task that adds a `start_of_day` entry the first time the game is open
//! on each real-world day.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde_json::json;
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use super::file::GameFileError;
use super::open_hours::{self, OpenHours};
use super::GameState;
use crate::core::{state_hash, QueueError, SerialQueue, StateHash};
use crate::engine::{EngineError, GameEngine};
use crate::log_book::{LogBook, LogBookError, RawLogEntry};

/// Log book shared between the interactor and its readers.
pub type SharedLogBook = Arc<RwLock<LogBook>>;

/// Longest sleep between automatic start of day checks.
const MAX_START_OF_DAY_WAIT: Duration = Duration::from_secs(60 * 60);

const MIN_START_OF_DAY_WAIT: Duration = Duration::from_secs(1);

/// Everything needed to start an interactor.
#[derive(Debug, Clone)]
pub struct GameSnapshot {
    /// Recorded entries.
    pub log_book: LogBook,
    /// Board before the first entry.
    pub initial_game_state: GameState,
    /// When new entries are accepted. `None` means always.
    pub open_hours: Option<OpenHours>,
}

/// What a save handler persists after each commit.
#[derive(Debug, Clone, Copy)]
pub struct SaveSnapshot<'a> {
    /// Board before the first entry.
    pub initial_game_state: &'a GameState,
    /// Log book including the entry just committed.
    pub log_book: &'a LogBook,
    /// The game's open hours, if it has any.
    pub open_hours: Option<&'a OpenHours>,
}

/// Persists the game after every committed entry.
#[async_trait]
pub trait SaveHandler: Send + Sync {
    /// Store `snapshot`. Awaited before the commit resolves.
    async fn save(&self, snapshot: SaveSnapshot<'_>) -> Result<(), GameFileError>;
}

/// Interactor errors.
#[derive(Debug, thiserror::Error)]
pub enum InteractorError {
    /// The engine rejected a request or its transport failed.
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// The entry cannot be appended to the log book.
    #[error("log book rejected entry: {0}")]
    LogBook(#[from] LogBookError),

    /// The entry was committed but saving the game failed.
    #[error("failed to save game: {0}")]
    Save(#[from] GameFileError),

    /// The operation never ran to completion.
    #[error(transparent)]
    Queue(#[from] QueueError),

    /// The initial replay did not complete.
    #[error("failed to replay log book: {0}")]
    LoadFailed(String),

    /// New entries are refused outside the game's open hours.
    #[error("You're currently outside this games open hours.  New actions will be blocked until the game opens back up.")]
    GameClosed,

    /// Internal consistency is broken.
    #[error("interactor invariant violated: {0}")]
    Invariant(String),
}

impl InteractorError {
    /// Whether the interactor can no longer be trusted to make progress.
    pub fn is_fatal(&self) -> bool {
        matches!(self, InteractorError::Invariant(_) | InteractorError::Queue(_))
    }
}

/// Progress of the most recent replay.
#[derive(Debug, Clone, PartialEq, Eq)]
enum LoadStatus {
    Replaying,
    Ready,
    Failed(String),
}

/// State shared with queued operations.
struct Shared {
    engine: Arc<dyn GameEngine>,
    log_book: SharedLogBook,
    initial_game_state: GameState,
    open_hours: Option<OpenHours>,
    game_states: RwLock<Vec<GameState>>,
    save_handler: Option<Arc<dyn SaveHandler>>,
    status: watch::Sender<LoadStatus>,
}

impl Shared {
    /// Point the engine at the game version and the state before entry `id`.
    async fn seed_engine(&self, id: usize) -> Result<(), InteractorError> {
        let previous = if id == 0 {
            self.initial_game_state.clone()
        } else {
            self.game_states
                .read()
                .await
                .get(id - 1)
                .cloned()
                .ok_or_else(|| InteractorError::Invariant(format!("no game state before entry {}", id)))?
        };

        let version = self.log_book.read().await.game_version.clone();
        self.engine.set_game_version(&version).await?;
        self.engine.set_board_state(&previous).await?;
        Ok(())
    }

    /// Process every entry that has no state yet. Returns how many were
    /// processed.
    ///
    /// States computed before a failure are kept, so calling this again
    /// resumes at the failing entry.
    #[instrument(skip(self))]
    async fn replay_pending(&self) -> Result<usize, InteractorError> {
        let start = self.game_states.read().await.len();
        let end = self.log_book.read().await.len();

        if start == end {
            debug!(entries = end, "Game states are up to date");
            return Ok(0);
        }
        if start > end {
            return Err(InteractorError::Invariant(format!(
                "{} game states for {} log book entries",
                start, end
            )));
        }

        self.seed_engine(start).await?;
        self.game_states.write().await.truncate(start);

        for id in start..end {
            let entry = self
                .log_book
                .read()
                .await
                .entry(id)
                .cloned()
                .ok_or_else(|| InteractorError::Invariant(format!("log book has no entry {}", id)))?;

            let state = match self.engine.process_action(&entry).await {
                Ok(state) => state,
                Err(e) => {
                    warn!(id, entry_type = %entry.entry_type, "Replay stopped: {}", e);
                    return Err(e.into());
                }
            };
            self.game_states.write().await.push(state);
        }

        info!(from = start, to = end, "Replayed log book");
        Ok(end - start)
    }

    async fn replay_and_report(&self) -> Result<usize, InteractorError> {
        let result = self.replay_pending().await;

        let status = match &result {
            Ok(_) => LoadStatus::Ready,
            Err(e) => LoadStatus::Failed(e.to_string()),
        };
        self.status.send_replace(status);

        result
    }

    async fn ensure_in_lockstep(&self) -> Result<(), InteractorError> {
        let states = self.game_states.read().await.len();
        let entries = self.log_book.read().await.len();

        if states != entries {
            error!(states, entries, "Game states are out of sync with the log book");
            return Err(InteractorError::Invariant(format!(
                "{} game states for {} log book entries",
                states, entries
            )));
        }
        Ok(())
    }

    /// Local time according to the log book's clock.
    async fn local_now(&self) -> Option<NaiveDateTime> {
        open_hours::local_time(self.log_book.read().await.now())
    }

    async fn is_game_open(&self) -> bool {
        match &self.open_hours {
            None => true,
            Some(hours) => self.local_now().await.is_some_and(|now| hours.is_game_open(now)),
        }
    }

    async fn ensure_open(&self) -> Result<(), InteractorError> {
        if self.is_game_open().await {
            Ok(())
        } else {
            Err(InteractorError::GameClosed)
        }
    }

    #[instrument(skip(self, raw))]
    async fn commit(&self, raw: RawLogEntry) -> Result<usize, InteractorError> {
        self.ensure_open().await?;
        let entry = self.log_book.read().await.make_entry_from_raw(raw);
        self.ensure_in_lockstep().await?;
        self.log_book.read().await.validate_next(&entry)?;

        self.seed_engine(entry.id).await?;
        let state = self.engine.process_action(&entry).await?;

        let day = entry.day;
        let message = entry.message.clone();
        let id = self.log_book.write().await.add_entry(entry)?;
        self.game_states.write().await.push(state);

        info!(id, day, %message, "Added log book entry");

        if let Some(handler) = &self.save_handler {
            let log_book = self.log_book.read().await;
            handler
                .save(SaveSnapshot {
                    initial_game_state: &self.initial_game_state,
                    log_book: &log_book,
                    open_hours: self.open_hours.as_ref(),
                })
                .await?;
        }

        Ok(id)
    }

    async fn check_action(&self, raw: RawLogEntry) -> Result<bool, InteractorError> {
        self.ensure_open().await?;
        let entry = self.log_book.read().await.make_entry_from_raw(raw);
        self.ensure_in_lockstep().await?;

        self.seed_engine(entry.id).await?;
        let accepted = self.engine.can_process_action(&entry).await?;

        debug!(entry_type = %entry.entry_type, accepted, "Checked action");
        Ok(accepted)
    }

    /// Start of day entry for the next game day, unless the latest day was
    /// already started today.
    async fn pending_start_of_day(&self) -> Option<RawLogEntry> {
        let book = self.log_book.read().await;
        let today = open_hours::local_time(book.now())?.date();

        match open_hours::game_day_started_on(&book, today) {
            Ok(true) => None,
            Ok(false) => {
                let mut raw = RawLogEntry::new();
                raw.insert("type".into(), json!("action"));
                raw.insert("action".into(), json!("start_of_day"));
                raw.insert("day".into(), json!(book.max_day().unwrap_or(0).saturating_add(1)));
                Some(raw)
            }
            Err(e) => {
                warn!("Unable to check the current game day: {}", e);
                None
            }
        }
    }

    /// Time until the next automatic start of day check.
    async fn until_next_open(&self) -> Duration {
        let Some(hours) = &self.open_hours else {
            return MAX_START_OF_DAY_WAIT;
        };

        self.local_now()
            .await
            .and_then(|now| hours.next_open_hours_start(now).map(|next| next - now))
            .and_then(|wait| wait.to_std().ok())
            .unwrap_or(MAX_START_OF_DAY_WAIT)
            .clamp(MIN_START_OF_DAY_WAIT, MAX_START_OF_DAY_WAIT)
    }
}

fn settle<T>(queued: Result<Result<T, InteractorError>, QueueError>) -> Result<T, InteractorError> {
    queued?
}

fn submit_commit(
    shared: &Arc<Shared>,
    queue: &SerialQueue,
    raw: RawLogEntry,
) -> impl Future<Output = Result<usize, InteractorError>> + Send + 'static {
    let shared = shared.clone();
    let pending = queue.submit(async move { shared.commit(raw).await });
    async move { settle(pending.await) }
}

/// Starts a new game day the first time the game is open each day.
async fn run_automatic_start_of_day(shared: Arc<Shared>, queue: SerialQueue) {
    let mut status = shared.status.subscribe();
    let ready = matches!(
        status.wait_for(|s| *s != LoadStatus::Replaying).await.as_deref(),
        Ok(LoadStatus::Ready)
    );
    if !ready {
        warn!("Log book did not load, automatic start of day is off");
        return;
    }

    loop {
        if let Some(raw) = shared.pending_start_of_day().await {
            match submit_commit(&shared, &queue, raw).await {
                Ok(id) => info!(id, "Started game day"),
                Err(InteractorError::GameClosed) => debug!("Game is closed, day not started"),
                Err(e) => warn!("Automatic start of day failed: {}", e),
            }
        }

        let wait = shared.until_next_open().await;
        debug!(?wait, "Next start of day check");
        tokio::time::sleep(wait).await;
    }
}

/// Serializes every engine interaction for one game.
pub struct Interactor {
    shared: Arc<Shared>,
    queue: SerialQueue,
    start_of_day: Option<JoinHandle<()>>,
}

impl Interactor {
    /// Create an interactor and schedule the replay of `snapshot`.
    ///
    /// Must be called inside a tokio runtime. Use [`Interactor::loaded`] to
    /// wait for the replay.
    pub fn new(
        engine: Arc<dyn GameEngine>,
        snapshot: GameSnapshot,
        save_handler: Option<Arc<dyn SaveHandler>>,
    ) -> Self {
        let (status, _) = watch::channel(LoadStatus::Replaying);

        info!(
            game_version = %snapshot.log_book.game_version,
            entries = snapshot.log_book.len(),
            "Starting game interactor"
        );

        let shared = Arc::new(Shared {
            engine,
            log_book: Arc::new(RwLock::new(snapshot.log_book)),
            initial_game_state: snapshot.initial_game_state,
            open_hours: snapshot.open_hours,
            game_states: RwLock::new(Vec::new()),
            save_handler,
            status,
        });

        let mut interactor = Self {
            shared,
            queue: SerialQueue::new("interactor"),
            start_of_day: None,
        };

        // Runs on the queue whether or not anyone waits for it.
        let _ = interactor.catch_up();

        if interactor.has_automatic_start_of_day() {
            info!("Automatic start of day is on");
            interactor.start_of_day = Some(tokio::spawn(run_automatic_start_of_day(
                interactor.shared.clone(),
                interactor.queue.clone(),
            )));
        }

        interactor
    }

    /// Resolves once the initial replay has finished.
    pub async fn loaded(&self) -> Result<(), InteractorError> {
        let mut status = self.shared.status.subscribe();
        let outcome = status
            .wait_for(|s| *s != LoadStatus::Replaying)
            .await
            .map(|s| (*s).clone())
            .map_err(|_| QueueError::Closed)?;

        match outcome {
            LoadStatus::Failed(reason) => Err(InteractorError::LoadFailed(reason)),
            _ => Ok(()),
        }
    }

    /// Replay every entry that has no state yet (after a failed replay).
    pub fn catch_up(&self) -> impl Future<Output = Result<usize, InteractorError>> + Send + 'static {
        let shared = self.shared.clone();
        let pending = self.queue.submit(async move { shared.replay_and_report().await });
        async move { settle(pending.await) }
    }

    /// Process `raw` and append it to the log book. Resolves to the new
    /// entry's id.
    ///
    /// Queued when called: entries are committed in call order even if the
    /// returned futures are awaited in another order, or not at all.
    pub fn add_log_book_entry(
        &self,
        raw: RawLogEntry,
    ) -> impl Future<Output = Result<usize, InteractorError>> + Send + 'static {
        submit_commit(&self.shared, &self.queue, raw)
    }

    /// Ask the engine whether `raw` would be accepted. Changes nothing.
    pub fn can_process_action(
        &self,
        raw: RawLogEntry,
    ) -> impl Future<Output = Result<bool, InteractorError>> + Send + 'static {
        let shared = self.shared.clone();
        let pending = self.queue.submit(async move { shared.check_action(raw).await });
        async move { settle(pending.await) }
    }

    /// State after entry `id`, if it has been computed.
    pub async fn game_state_by_id(&self, id: usize) -> Option<GameState> {
        self.shared.game_states.read().await.get(id).cloned()
    }

    /// Number of computed states.
    pub async fn state_count(&self) -> usize {
        self.shared.game_states.read().await.len()
    }

    /// Hash of the state after entry `id`.
    pub async fn state_hash(&self, id: usize) -> Option<StateHash> {
        self.shared.game_states.read().await.get(id).map(state_hash)
    }

    /// The live log book.
    pub fn log_book(&self) -> SharedLogBook {
        self.shared.log_book.clone()
    }

    /// Board before the first entry.
    pub fn initial_game_state(&self) -> &GameState {
        &self.shared.initial_game_state
    }

    /// The game's open hours, if it has any.
    pub fn open_hours(&self) -> Option<&OpenHours> {
        self.shared.open_hours.as_ref()
    }

    /// Whether new entries are accepted right now.
    pub async fn is_game_open(&self) -> bool {
        self.shared.is_game_open().await
    }

    /// Whether days are started automatically.
    pub fn has_automatic_start_of_day(&self) -> bool {
        self.open_hours().is_some_and(OpenHours::has_automatic_start_of_day)
    }

    /// Stop automatic start of day and the engine. Queued operations are
    /// not waited for.
    pub async fn shutdown(&self) -> Result<(), InteractorError> {
        if let Some(task) = &self.start_of_day {
            task.abort();
        }

        info!(queue = self.queue.name(), "Shutting down game engine");
        self.shared.engine.shutdown().await?;
        Ok(())
    }
}

impl Drop for Interactor {
    fn drop(&mut self) {
        if let Some(task) = &self.start_of_day {
            task.abort();
        }
    }
}
