//! Remote result submission with retry and idempotency.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use quiz_core::model::{ResultRecord, SessionId, StatsDelta, UserId};
use rand::Rng;
use tracing::{debug, info, warn};

use crate::error::{RemoteError, SubmitError};
use crate::remote::RemoteResultStore;

/// Exponential backoff settings for remote submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    /// Retry without sleeping between attempts.
    #[must_use]
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Delay before the attempt following `failed_attempts` failures.
    fn delay_after(&self, failed_attempts: u32) -> Duration {
        if self.base_delay.is_zero() {
            return Duration::ZERO;
        }
        let factor = 1u32 << failed_attempts.saturating_sub(1).min(4);
        let backoff = self.base_delay.saturating_mul(factor).min(self.max_delay);
        let jitter_cap = u64::try_from(backoff.as_millis() / 4).unwrap_or(u64::MAX);
        let jitter = if jitter_cap == 0 {
            0
        } else {
            rand::rng().random_range(0..=jitter_cap)
        };
        backoff + Duration::from_millis(jitter)
    }
}

/// Outcome of a successful submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmissionReceipt {
    pub session_id: SessionId,
    pub attempts: u32,
    /// The key had already been submitted by this submitter; nothing was sent.
    pub deduplicated: bool,
}

/// Sends finalized results to the remote store.
///
/// Each record is keyed by its session id. The remote store applies each
/// operation at most once per key and this submitter skips keys it has
/// already completed, so calling `submit` twice never double counts.
#[derive(Clone)]
pub struct ResultSubmitter {
    remote: Arc<dyn RemoteResultStore>,
    policy: RetryPolicy,
    completed: Arc<Mutex<HashSet<SessionId>>>,
}

impl ResultSubmitter {
    #[must_use]
    pub fn new(remote: Arc<dyn RemoteResultStore>) -> Self {
        Self {
            remote,
            policy: RetryPolicy::default(),
            completed: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    #[must_use]
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    #[must_use]
    pub fn is_completed(&self, session_id: SessionId) -> bool {
        self.completed
            .lock()
            .map(|done| done.contains(&session_id))
            .unwrap_or(false)
    }

    /// Append the record to remote history and fold it into the user's stats.
    ///
    /// Transient failures are retried with exponential backoff and jitter.
    ///
    /// # Errors
    ///
    /// Returns `SubmitError::Rejected` on a permanent remote error and
    /// `SubmitError::Exhausted` once every attempt failed.
    pub async fn submit(
        &self,
        user_id: UserId,
        record: &ResultRecord,
    ) -> Result<SubmissionReceipt, SubmitError> {
        let session_id = record.session_id();
        if self.is_completed(session_id) {
            debug!(%session_id, "submission already completed, skipping");
            return Ok(SubmissionReceipt {
                session_id,
                attempts: 0,
                deduplicated: true,
            });
        }

        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempts = 0;
        loop {
            attempts += 1;
            match self.send(user_id, record).await {
                Ok(()) => {
                    if let Ok(mut done) = self.completed.lock() {
                        done.insert(session_id);
                    }
                    info!(%session_id, attempts, "result submitted");
                    return Ok(SubmissionReceipt {
                        session_id,
                        attempts,
                        deduplicated: false,
                    });
                }
                Err(err) if !err.is_transient() => {
                    warn!(%session_id, error = %err, "result submission rejected");
                    return Err(SubmitError::Rejected(err));
                }
                Err(err) if attempts >= max_attempts => {
                    warn!(%session_id, attempts, error = %err, "result submission exhausted retries");
                    return Err(SubmitError::Exhausted {
                        attempts,
                        source: err,
                    });
                }
                Err(err) => {
                    let delay = self.policy.delay_after(attempts);
                    warn!(
                        %session_id,
                        attempts,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %err,
                        "result submission failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// Manual retry of a persisted record after an earlier failure.
    ///
    /// # Errors
    ///
    /// Same as [`ResultSubmitter::submit`].
    pub async fn retry(
        &self,
        user_id: UserId,
        record: &ResultRecord,
    ) -> Result<SubmissionReceipt, SubmitError> {
        info!(session_id = %record.session_id(), "manual result resubmission");
        self.submit(user_id, record).await
    }

    async fn send(&self, user_id: UserId, record: &ResultRecord) -> Result<(), RemoteError> {
        let key = record.session_id();
        self.remote.append_history(user_id, key, record).await?;
        self.remote
            .update_stats(user_id, key, StatsDelta::from_result(record))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::InMemoryRemoteStore;
    use quiz_core::model::{AnswerStore, CategoryId, ScoreBreakdown, TestId};
    use quiz_core::time::fixed_now;

    fn record(score: u32, remaining: u32) -> ResultRecord {
        let breakdown = ScoreBreakdown {
            score,
            correct_count: score,
            incorrect_count: 0,
            unattempted_count: 10 - score,
            total_questions: 10,
        };
        ResultRecord::new(
            SessionId::new_v4(),
            CategoryId::new(1),
            TestId::new(2),
            breakdown,
            300,
            remaining,
            AnswerStore::new(),
            fixed_now(),
        )
        .unwrap()
    }

    fn submitter(remote: &InMemoryRemoteStore, attempts: u32) -> ResultSubmitter {
        ResultSubmitter::new(Arc::new(remote.clone()))
            .with_retry_policy(RetryPolicy::immediate(attempts))
    }

    #[tokio::test]
    async fn submitting_twice_counts_once() {
        let remote = InMemoryRemoteStore::new();
        let submitter = submitter(&remote, 3);
        let user = UserId::new(5);
        let record = record(7, 120);

        let first = submitter.submit(user, &record).await.unwrap();
        let second = submitter.submit(user, &record).await.unwrap();
        assert!(!first.deduplicated);
        assert!(second.deduplicated);

        let stats = remote.stats(user);
        assert_eq!(stats.tests_taken, 1);
        assert_eq!(stats.total_score, 7);
        assert_eq!(stats.total_time_seconds, 180);
        assert_eq!(stats.highest_score, 7);
        assert_eq!(remote.history(user).len(), 1);
        assert_eq!(remote.calls(), 2);
    }

    #[tokio::test]
    async fn fresh_submitter_is_still_deduplicated_by_remote_key() {
        let remote = InMemoryRemoteStore::new();
        let user = UserId::new(5);
        let record = record(4, 0);

        submitter(&remote, 1).submit(user, &record).await.unwrap();
        submitter(&remote, 1).retry(user, &record).await.unwrap();

        assert_eq!(remote.stats(user).tests_taken, 1);
        assert_eq!(remote.history(user).len(), 1);
    }

    #[tokio::test]
    async fn transient_failures_are_retried() {
        let remote = InMemoryRemoteStore::new();
        remote.fail_next(2);
        let submitter = submitter(&remote, 4);
        let user = UserId::new(1);

        let receipt = submitter.submit(user, &record(3, 10)).await.unwrap();
        assert_eq!(receipt.attempts, 3);
        assert_eq!(remote.stats(user).tests_taken, 1);
    }

    #[tokio::test]
    async fn exhausted_retries_report_the_last_error() {
        let remote = InMemoryRemoteStore::new();
        remote.fail_next(10);
        let submitter = submitter(&remote, 3);
        let record = record(3, 10);

        let err = submitter.submit(UserId::new(1), &record).await.unwrap_err();
        assert!(matches!(err, SubmitError::Exhausted { attempts: 3, .. }));
        assert!(!submitter.is_completed(record.session_id()));
        assert_eq!(remote.calls(), 3);
    }

    #[tokio::test]
    async fn manual_retry_succeeds_after_failure() {
        let remote = InMemoryRemoteStore::new();
        remote.fail_next(2);
        let submitter = submitter(&remote, 2);
        let user = UserId::new(8);
        let record = record(6, 60);

        assert!(submitter.submit(user, &record).await.is_err());
        submitter.retry(user, &record).await.unwrap();

        assert_eq!(remote.stats(user).total_score, 6);
        assert_eq!(remote.stats(user).tests_taken, 1);
    }

    #[test]
    fn backoff_grows_and_is_capped() {
        let policy = RetryPolicy {
            max_attempts: 10,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(1_000),
        };
        let first = policy.delay_after(1);
        assert!(first >= Duration::from_millis(100) && first <= Duration::from_millis(125));
        let third = policy.delay_after(3);
        assert!(third >= Duration::from_millis(400) && third <= Duration::from_millis(500));
        let late = policy.delay_after(9);
        assert!(late >= Duration::from_millis(1_000) && late <= Duration::from_millis(1_250));
        assert_eq!(RetryPolicy::immediate(3).delay_after(2), Duration::ZERO);
    }
}
