//! Recording engine for tests.
//!
//! Board state is `{"v": n}`; every processed action produces
//! `{"v": n + 1}` from whatever board was last set. Each call is recorded
//! after its optional artificial delay, so the recorded order is the order
//! calls actually completed.

use std::collections::{BTreeSet, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use super::{EngineError, GameEngine};
use crate::game::GameState;
use crate::log_book::LogEntry;

/// A recorded engine call.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineOp {
    /// `set_game_version`
    SetVersion(String),
    /// `set_board_state`
    SetState(GameState),
    /// `process_action` that succeeded
    ProcessAction(LogEntry),
    /// `can_process_action`
    CanProcess(LogEntry),
    /// `shutdown`
    Shutdown,
}

#[derive(Default)]
struct MockInner {
    ops: Vec<EngineOp>,
    board: Option<GameState>,
    delays: VecDeque<Duration>,
    reject_next: bool,
    rejected_types: BTreeSet<String>,
}

/// In-memory engine that records every call.
#[derive(Default)]
pub struct MockEngine {
    inner: Mutex<MockInner>,
}

impl MockEngine {
    /// Engine with no delays and no rejections.
    pub fn new() -> Self {
        Self::default()
    }

    /// Delays applied to the next calls, one per call, in order.
    pub fn with_delays(self, delays: &[u64]) -> Self {
        self.inner.lock().unwrap().delays = delays.iter().map(|ms| Duration::from_millis(*ms)).collect();
        self
    }

    /// Calls recorded so far.
    pub fn ops(&self) -> Vec<EngineOp> {
        self.inner.lock().unwrap().ops.clone()
    }

    /// Forget recorded calls.
    pub fn clear_ops(&self) {
        self.inner.lock().unwrap().ops.clear();
    }

    /// Whether every configured delay has been used.
    pub fn all_delays_applied(&self) -> bool {
        self.inner.lock().unwrap().delays.is_empty()
    }

    /// Fail the next `process_action` call.
    pub fn reject_next(&self) {
        self.inner.lock().unwrap().reject_next = true;
    }

    /// Always reject actions of this type.
    pub fn reject_type(&self, entry_type: &str) {
        self.inner.lock().unwrap().rejected_types.insert(entry_type.to_string());
    }

    /// Accept every action type again.
    pub fn clear_rejections(&self) {
        self.inner.lock().unwrap().rejected_types.clear();
    }

    async fn delay(&self) {
        let delay = self.inner.lock().unwrap().delays.pop_front();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    fn record(&self, op: EngineOp) {
        self.inner.lock().unwrap().ops.push(op);
    }
}

#[async_trait]
impl GameEngine for MockEngine {
    async fn set_game_version(&self, version: &str) -> Result<(), EngineError> {
        self.delay().await;
        self.record(EngineOp::SetVersion(version.to_string()));
        Ok(())
    }

    async fn set_board_state(&self, state: &GameState) -> Result<(), EngineError> {
        self.delay().await;
        let mut inner = self.inner.lock().unwrap();
        inner.board = Some(state.clone());
        inner.ops.push(EngineOp::SetState(state.clone()));
        Ok(())
    }

    async fn process_action(&self, entry: &LogEntry) -> Result<GameState, EngineError> {
        {
            let mut inner = self.inner.lock().unwrap();
            if std::mem::take(&mut inner.reject_next) || inner.rejected_types.contains(&entry.entry_type) {
                return Err(EngineError::Rejected("Oops".to_string()));
            }
        }

        self.delay().await;

        let mut inner = self.inner.lock().unwrap();
        let current = inner
            .board
            .as_ref()
            .and_then(|board| board["v"].as_u64())
            .ok_or_else(|| EngineError::Rejected("no board state".to_string()))?;

        let next = json!({ "v": current + 1 });
        inner.board = Some(next.clone());
        inner.ops.push(EngineOp::ProcessAction(entry.clone()));
        Ok(next)
    }

    async fn can_process_action(&self, entry: &LogEntry) -> Result<bool, EngineError> {
        self.delay().await;
        let mut inner = self.inner.lock().unwrap();
        inner.ops.push(EngineOp::CanProcess(entry.clone()));
        Ok(!inner.rejected_types.contains(&entry.entry_type))
    }

    async fn shutdown(&self) -> Result<(), EngineError> {
        self.record(EngineOp::Shutdown);
        Ok(())
    }
}
