use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use quiz_core::model::{ResultRecord, SessionId, StatsDelta, UserId, UserStats};

use super::RemoteResultStore;
use crate::error::RemoteError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Operation {
    AppendHistory,
    UpdateStats,
}

#[derive(Default)]
struct RemoteState {
    history: HashMap<UserId, Vec<ResultRecord>>,
    stats: HashMap<UserId, UserStats>,
    applied: HashSet<(Operation, SessionId)>,
    fail_next: u32,
    calls: u32,
}

/// In-process stand-in for the remote store, for tests and offline runs.
///
/// Deduplicates by idempotency key and can be told to fail upcoming calls.
#[derive(Clone, Default)]
pub struct InMemoryRemoteStore {
    state: Arc<Mutex<RemoteState>>,
}

impl InMemoryRemoteStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` calls fail with a transient error.
    pub fn fail_next(&self, n: u32) {
        if let Ok(mut state) = self.state.lock() {
            state.fail_next = n;
        }
    }

    #[must_use]
    pub fn stats(&self, user_id: UserId) -> UserStats {
        self.state
            .lock()
            .ok()
            .and_then(|state| state.stats.get(&user_id).copied())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn history(&self, user_id: UserId) -> Vec<ResultRecord> {
        self.state
            .lock()
            .ok()
            .and_then(|state| state.history.get(&user_id).cloned())
            .unwrap_or_default()
    }

    /// Total calls received, including failed ones.
    #[must_use]
    pub fn calls(&self) -> u32 {
        self.state.lock().map(|state| state.calls).unwrap_or(0)
    }

    fn apply(
        &self,
        op: Operation,
        key: SessionId,
        f: impl FnOnce(&mut RemoteState),
    ) -> Result<(), RemoteError> {
        let mut state = self
            .state
            .lock()
            .map_err(|e| RemoteError::Unavailable(e.to_string()))?;
        state.calls += 1;
        if state.fail_next > 0 {
            state.fail_next -= 1;
            return Err(RemoteError::Unavailable("injected failure".into()));
        }
        if state.applied.insert((op, key)) {
            f(&mut state);
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteResultStore for InMemoryRemoteStore {
    async fn append_history(
        &self,
        user_id: UserId,
        key: SessionId,
        record: &ResultRecord,
    ) -> Result<(), RemoteError> {
        self.apply(Operation::AppendHistory, key, |state| {
            state
                .history
                .entry(user_id)
                .or_default()
                .push(record.clone());
        })
    }

    async fn update_stats(
        &self,
        user_id: UserId,
        key: SessionId,
        delta: StatsDelta,
    ) -> Result<(), RemoteError> {
        self.apply(Operation::UpdateStats, key, |state| {
            state.stats.entry(user_id).or_default().apply(delta);
        })
    }
}
