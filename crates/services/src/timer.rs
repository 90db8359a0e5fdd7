//! Countdown for a single quiz session.
//!
//! Ticks once per second while running. Suspension drops the ticker and
//! records a wall-clock snapshot, and resumption subtracts the real elapsed
//! time instead of counting missed ticks.

use std::time::Duration;

use quiz_core::Clock;
use quiz_core::model::{BackgroundSnapshot, SessionId};
use tokio::time::{Instant, Interval, interval_at};
use tracing::{debug, warn};

use crate::persistence::PersistenceAdapter;

const TICK: Duration = Duration::from_secs(1);

/// Signals raised by the countdown. Each fires at most once per session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerSignal {
    /// Remaining time dropped below a tenth of the duration.
    LowTime { remaining_seconds: u32 },
    /// Remaining time reached zero.
    Expired,
}

pub struct TimerService {
    clock: Clock,
    persistence: PersistenceAdapter,
    session_id: SessionId,
    duration_seconds: u32,
    remaining_seconds: u32,
    low_time_fired: bool,
    expired_fired: bool,
    ticker: Option<Interval>,
    suspended: bool,
    // Kept in case the persisted copy cannot be written or read back.
    pending: Option<BackgroundSnapshot>,
}

impl TimerService {
    #[must_use]
    pub fn new(clock: Clock, persistence: PersistenceAdapter, session_id: SessionId) -> Self {
        Self {
            clock,
            persistence,
            session_id,
            duration_seconds: 0,
            remaining_seconds: 0,
            low_time_fired: false,
            expired_fired: false,
            ticker: None,
            suspended: false,
            pending: None,
        }
    }

    /// Reset the countdown to `duration_seconds` and start ticking.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(&mut self, duration_seconds: u32) {
        self.duration_seconds = duration_seconds;
        self.remaining_seconds = duration_seconds;
        self.low_time_fired = false;
        self.expired_fired = false;
        self.suspended = false;
        self.pending = None;
        self.ticker = None;
        if duration_seconds > 0 {
            self.start_ticker();
        }
    }

    fn start_ticker(&mut self) {
        self.ticker = Some(interval_at(Instant::now() + TICK, TICK));
    }

    /// Wait for the next one-second tick and apply it.
    ///
    /// Never completes while the timer is stopped, suspended or expired, so it
    /// can sit in a `tokio::select!` branch. Cancel-safe.
    pub async fn next_tick(&mut self) -> Vec<TimerSignal> {
        match self.ticker.as_mut() {
            Some(ticker) => {
                ticker.tick().await;
            }
            None => std::future::pending::<()>().await,
        }
        self.tick()
    }

    /// Apply one second of countdown.
    pub fn tick(&mut self) -> Vec<TimerSignal> {
        if self.ticker.is_none() || self.remaining_seconds == 0 {
            return Vec::new();
        }
        self.remaining_seconds -= 1;
        debug!(session_id = %self.session_id, remaining = self.remaining_seconds, "tick");
        self.evaluate()
    }

    fn evaluate(&mut self) -> Vec<TimerSignal> {
        let mut signals = Vec::new();
        if !self.low_time_fired
            && u64::from(self.remaining_seconds) * 10 < u64::from(self.duration_seconds)
        {
            self.low_time_fired = true;
            signals.push(TimerSignal::LowTime {
                remaining_seconds: self.remaining_seconds,
            });
        }
        if self.remaining_seconds == 0 {
            self.ticker = None;
            if !self.expired_fired {
                self.expired_fired = true;
                signals.push(TimerSignal::Expired);
            }
        }
        signals
    }

    /// Pause the countdown and record a snapshot of the remaining time.
    ///
    /// Does nothing if the timer is not running.
    pub async fn on_suspend(&mut self) {
        if self.suspended || self.ticker.is_none() {
            return;
        }
        self.ticker = None;
        self.suspended = true;

        let snapshot = BackgroundSnapshot::new(self.clock.epoch_millis(), self.remaining_seconds);
        self.pending = Some(snapshot);
        if let Err(err) = self.persistence.save_snapshot(self.session_id, &snapshot).await {
            warn!(session_id = %self.session_id, error = %err, "failed to persist snapshot, keeping it in memory");
        }
    }

    /// Restore the countdown from the snapshot taken on suspend.
    ///
    /// Returns `None` when there was nothing to resume. Otherwise returns the
    /// signals caused by the time spent suspended.
    pub async fn on_resume(&mut self) -> Option<Vec<TimerSignal>> {
        if !self.suspended {
            return None;
        }
        let stored = match self.persistence.take_snapshot(self.session_id).await {
            Ok(stored) => stored,
            Err(err) => {
                warn!(session_id = %self.session_id, error = %err, "failed to read snapshot, using in-memory copy");
                None
            }
        };
        let snapshot = stored.or(self.pending.take())?;
        self.pending = None;
        self.suspended = false;

        let now = self.clock.epoch_millis();
        self.remaining_seconds = snapshot.remaining_after(now);
        debug!(
            session_id = %self.session_id,
            elapsed = snapshot.elapsed_seconds(now),
            remaining = self.remaining_seconds,
            "resumed"
        );

        let signals = self.evaluate();
        if self.remaining_seconds > 0 {
            self.start_ticker();
        }
        Some(signals)
    }

    /// Stop ticking. Any pending snapshot is left untouched.
    pub fn stop(&mut self) {
        self.ticker = None;
    }

    /// Stop ticking and drop any snapshot for this session.
    pub async fn cancel(&mut self) {
        self.stop();
        self.pending = None;
        if self.suspended {
            self.suspended = false;
            if let Err(err) = self.persistence.discard_snapshot(self.session_id).await {
                warn!(session_id = %self.session_id, error = %err, "failed to discard snapshot");
            }
        }
    }

    #[must_use]
    pub fn remaining_seconds(&self) -> u32 {
        self.remaining_seconds
    }

    #[must_use]
    pub fn duration_seconds(&self) -> u32 {
        self.duration_seconds
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.ticker.is_some()
    }

    #[must_use]
    pub fn is_suspended(&self) -> bool {
        self.suspended
    }

    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.expired_fired
    }
}
