use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use quiz_core::model::{
    AnswerStore, CategoryId, Question, ResultRecord, SessionId, TestId, UserId,
};
use quiz_core::{Clock, scoring};
use storage::repository::QuestionSetLoader;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::events::SessionEvent;
use super::progress::{SessionProgress, SessionStatus};
use crate::error::{SessionError, SubmitError, UnavailableReason};
use crate::persistence::PersistenceAdapter;
use crate::submitter::{ResultSubmitter, SubmissionReceipt};
use crate::timer::{TimerService, TimerSignal};

const EVENT_CAPACITY: usize = 64;

//
// ─── NAVIGATION ────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Next,
    Previous,
    /// Go straight to a question index, clamped to the valid range.
    Jump(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigateOutcome {
    At(usize),
    /// Already on the last question; the index did not move.
    ReadyToSubmit,
}

//
// ─── SUBMISSION ────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitTrigger {
    Manual,
    Expiry,
}

/// Handle on the background remote submission of a completed session.
#[derive(Debug)]
pub struct RemoteSubmission {
    session_id: SessionId,
    handle: JoinHandle<Result<SubmissionReceipt, SubmitError>>,
}

impl RemoteSubmission {
    #[must_use]
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the remote submission to finish.
    ///
    /// # Errors
    ///
    /// Returns the submitter's error, or `SubmitError::Aborted` if the task
    /// panicked or was cancelled.
    pub async fn outcome(self) -> Result<SubmissionReceipt, SubmitError> {
        self.handle
            .await
            .map_err(|err| SubmitError::Aborted(err.to_string()))?
    }
}

#[derive(Debug)]
pub enum SubmitOutcome {
    Submitted {
        record: ResultRecord,
        remote: RemoteSubmission,
    },
    /// Another trigger already submitted this session.
    Ignored,
}

/// First caller wins; every later attempt is refused.
#[derive(Debug, Default)]
struct SubmitGuard(AtomicBool);

impl SubmitGuard {
    fn try_acquire(&self) -> bool {
        self.0
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

//
// ─── ENGINE ────────────────────────────────────────────────────────────────────
//

/// Shared dependencies for creating quiz sessions.
#[derive(Clone)]
pub struct QuizEngine {
    clock: Clock,
    loader: Arc<dyn QuestionSetLoader>,
    persistence: PersistenceAdapter,
    submitter: ResultSubmitter,
}

impl QuizEngine {
    #[must_use]
    pub fn new(
        loader: Arc<dyn QuestionSetLoader>,
        persistence: PersistenceAdapter,
        submitter: ResultSubmitter,
    ) -> Self {
        Self {
            clock: Clock::default_clock(),
            loader,
            persistence,
            submitter,
        }
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn persistence(&self) -> &PersistenceAdapter {
        &self.persistence
    }

    #[must_use]
    pub fn submitter(&self) -> &ResultSubmitter {
        &self.submitter
    }

    /// Create a controller for a fresh attempt, in `Loading` state.
    #[must_use]
    pub fn new_session(&self, user_id: UserId) -> QuizSessionController {
        let session_id = SessionId::new_v4();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        QuizSessionController {
            session_id,
            user_id,
            clock: self.clock.clone(),
            loader: Arc::clone(&self.loader),
            persistence: self.persistence.clone(),
            submitter: self.submitter.clone(),
            status: SessionStatus::Loading,
            quiz: None,
            timer: TimerService::new(self.clock.clone(), self.persistence.clone(), session_id),
            guard: SubmitGuard::default(),
            result: None,
            events,
        }
    }
}

//
// ─── CONTROLLER ────────────────────────────────────────────────────────────────
//

struct ActiveQuiz {
    category_id: CategoryId,
    test_id: TestId,
    title: String,
    questions: Vec<Question>,
    current_index: usize,
    answers: AnswerStore,
}

/// State machine for one timed quiz attempt.
///
/// `Loading → InProgress → Submitting → Completed`, with `Error` reachable
/// from `Loading` and `Submitting` and `Discarded` after an explicit quit.
/// Suspension pauses the countdown without leaving `InProgress`.
pub struct QuizSessionController {
    session_id: SessionId,
    user_id: UserId,
    clock: Clock,
    loader: Arc<dyn QuestionSetLoader>,
    persistence: PersistenceAdapter,
    submitter: ResultSubmitter,
    status: SessionStatus,
    quiz: Option<ActiveQuiz>,
    timer: TimerService,
    guard: SubmitGuard,
    result: Option<ResultRecord>,
    events: broadcast::Sender<SessionEvent>,
}

impl QuizSessionController {
    #[must_use]
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    #[must_use]
    pub fn status(&self) -> SessionStatus {
        self.status
    }

    /// Finalized record, once the session has completed.
    #[must_use]
    pub fn result(&self) -> Option<&ResultRecord> {
        self.result.as_ref()
    }

    #[must_use]
    pub fn title(&self) -> Option<&str> {
        self.quiz.as_ref().map(|quiz| quiz.title.as_str())
    }

    /// Loaded questions; empty before start and after the session ends.
    #[must_use]
    pub fn questions(&self) -> &[Question] {
        match &self.quiz {
            Some(quiz) => quiz.questions.as_slice(),
            None => &[],
        }
    }

    #[must_use]
    pub fn current_index(&self) -> Option<usize> {
        self.quiz.as_ref().map(|quiz| quiz.current_index)
    }

    #[must_use]
    pub fn current_question(&self) -> Option<&Question> {
        self.quiz
            .as_ref()
            .and_then(|quiz| quiz.questions.get(quiz.current_index))
    }

    #[must_use]
    pub fn answers(&self) -> Option<&AnswerStore> {
        self.quiz.as_ref().map(|quiz| &quiz.answers)
    }

    #[must_use]
    pub fn remaining_seconds(&self) -> u32 {
        self.timer.remaining_seconds()
    }

    #[must_use]
    pub fn is_suspended(&self) -> bool {
        self.timer.is_suspended()
    }

    #[must_use]
    pub fn progress(&self) -> SessionProgress {
        let (total, answered, current_index) = self.quiz.as_ref().map_or((0, 0, 0), |quiz| {
            (
                quiz.questions.len(),
                quiz.answers.answered_count(),
                quiz.current_index,
            )
        });
        SessionProgress {
            status: self.status,
            total,
            answered,
            current_index,
            remaining_seconds: self.timer.remaining_seconds(),
            duration_seconds: self.timer.duration_seconds(),
            suspended: self.timer.is_suspended(),
        }
    }

    /// Observe session events. Receivers only see events sent after subscribing.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub(crate) fn emit(&self, event: SessionEvent) {
        // no receivers is fine
        let _ = self.events.send(event);
    }

    pub(crate) fn ensure_in_progress(&self) -> Result<(), SessionError> {
        match self.status {
            SessionStatus::InProgress => Ok(()),
            status if status.is_terminal() => Err(SessionError::Finished),
            status => Err(SessionError::NotInProgress(status)),
        }
    }

    fn fail(&mut self, message: String) {
        warn!(session_id = %self.session_id, %message, "session failed");
        self.status = SessionStatus::Error;
        self.emit(SessionEvent::Error { message });
    }

    /// Load the questions for a test and start the countdown.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::AlreadyStarted` unless the session is still
    /// loading, and `SessionError::QuestionsUnavailable` (leaving the session
    /// in `Error`) if the test is missing, empty, or has no duration.
    pub async fn start(
        &mut self,
        category_id: CategoryId,
        test_id: TestId,
    ) -> Result<(), SessionError> {
        if self.status != SessionStatus::Loading || self.quiz.is_some() {
            return Err(SessionError::AlreadyStarted);
        }

        if let Err(err) = self.persistence.discard_stale_snapshots().await {
            warn!(error = %err, "failed to discard stale snapshots");
        }

        let set = match self.loader.load(category_id, test_id).await {
            Ok(set) => set,
            Err(err) => {
                self.fail(format!("questions unavailable: {err}"));
                return Err(SessionError::QuestionsUnavailable(
                    UnavailableReason::Storage(err),
                ));
            }
        };
        if let Err(err) = set.ensure_playable() {
            self.fail(format!("questions unavailable: {err}"));
            return Err(SessionError::QuestionsUnavailable(
                UnavailableReason::Question(err),
            ));
        }

        let total_questions = set.questions.len();
        let duration_seconds = set.duration_seconds;
        let title = set.title;
        self.quiz = Some(ActiveQuiz {
            category_id,
            test_id,
            title: title.clone(),
            questions: set.questions,
            current_index: 0,
            answers: AnswerStore::new(),
        });
        self.timer.start(duration_seconds);
        self.status = SessionStatus::InProgress;

        info!(
            session_id = %self.session_id,
            %category_id,
            %test_id,
            total_questions,
            duration_seconds,
            "session started"
        );
        self.emit(SessionEvent::Started {
            session_id: self.session_id,
            title,
            total_questions,
            duration_seconds,
        });
        Ok(())
    }

    /// Record an answer, replacing any earlier choice for the question.
    ///
    /// # Errors
    ///
    /// Returns an error if the session is not in progress or either index is
    /// out of range.
    pub fn select_answer(
        &mut self,
        question_index: usize,
        option_index: usize,
    ) -> Result<(), SessionError> {
        self.ensure_in_progress()?;
        let quiz = self.quiz.as_mut().ok_or(SessionError::Finished)?;
        let total = quiz.questions.len();
        let question = quiz
            .questions
            .get(question_index)
            .ok_or(SessionError::QuestionOutOfRange {
                index: question_index,
                total,
            })?;
        if option_index >= question.option_count() {
            return Err(SessionError::OptionOutOfRange {
                question: question_index,
                option: option_index,
                count: question.option_count(),
            });
        }
        quiz.answers.select(question_index, option_index);
        self.emit(SessionEvent::AnswerSelected {
            question_index,
            option_index,
        });
        Ok(())
    }

    /// Move between questions, clamped to the question range.
    ///
    /// # Errors
    ///
    /// Returns an error if the session is not in progress.
    pub fn navigate(&mut self, direction: Direction) -> Result<NavigateOutcome, SessionError> {
        self.ensure_in_progress()?;
        let quiz = self.quiz.as_mut().ok_or(SessionError::Finished)?;
        let last = quiz.questions.len().saturating_sub(1);
        let target = match direction {
            Direction::Next if quiz.current_index >= last => {
                self.emit(SessionEvent::ReadyToSubmit);
                return Ok(NavigateOutcome::ReadyToSubmit);
            }
            Direction::Next => quiz.current_index + 1,
            Direction::Previous => quiz.current_index.saturating_sub(1),
            Direction::Jump(index) => index.min(last),
        };
        quiz.current_index = target;
        self.emit(SessionEvent::Navigated { index: target });
        Ok(NavigateOutcome::At(target))
    }

    /// Finalize the attempt on the user's request.
    ///
    /// # Errors
    ///
    /// See [`QuizSessionController::finalize`].
    pub async fn submit(&mut self) -> Result<SubmitOutcome, SessionError> {
        self.finalize(SubmitTrigger::Manual).await
    }

    /// Score the attempt, write it to local history and hand it to the
    /// submitter in the background.
    ///
    /// Only the first trigger submits; later ones get `SubmitOutcome::Ignored`.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Persistence` (leaving the session in `Error`)
    /// if the local history write fails, and `NotInProgress`/`Finished` if
    /// there is nothing to submit.
    pub async fn finalize(&mut self, trigger: SubmitTrigger) -> Result<SubmitOutcome, SessionError> {
        match self.status {
            SessionStatus::InProgress => {}
            SessionStatus::Submitting | SessionStatus::Completed => {
                debug!(session_id = %self.session_id, ?trigger, "submission already done");
                return Ok(SubmitOutcome::Ignored);
            }
            SessionStatus::Loading => {
                return Err(SessionError::NotInProgress(SessionStatus::Loading));
            }
            SessionStatus::Error | SessionStatus::Discarded => return Err(SessionError::Finished),
        }
        if !self.guard.try_acquire() {
            debug!(session_id = %self.session_id, ?trigger, "submission already claimed");
            return Ok(SubmitOutcome::Ignored);
        }

        self.status = SessionStatus::Submitting;
        self.timer.cancel().await;
        let Some(quiz) = self.quiz.take() else {
            self.fail("no active quiz to submit".to_owned());
            return Err(SessionError::Finished);
        };

        let record = match scoring::score(&quiz.questions, &quiz.answers).and_then(|breakdown| {
            ResultRecord::new(
                self.session_id,
                quiz.category_id,
                quiz.test_id,
                breakdown,
                self.timer.duration_seconds(),
                self.timer.remaining_seconds(),
                quiz.answers.clone(),
                self.clock.now(),
            )
        }) {
            Ok(record) => record,
            Err(err) => {
                self.fail(format!("failed to build result: {err}"));
                self.quiz = Some(quiz);
                return Err(SessionError::Result(err));
            }
        };

        // Local history is the point of no return: once written, the session is complete.
        match self.persistence.record_result(&record).await {
            Ok(true) => {}
            Ok(false) => debug!(session_id = %self.session_id, "result already in history"),
            Err(err) => {
                self.fail(format!("failed to persist result locally: {err}"));
                self.quiz = Some(quiz);
                return Err(SessionError::Persistence(err));
            }
        }

        self.status = SessionStatus::Completed;
        self.result = Some(record.clone());
        info!(
            session_id = %self.session_id,
            ?trigger,
            score = record.score(),
            total = record.total_questions(),
            time_taken = record.time_taken_seconds(),
            "session completed"
        );
        self.emit(SessionEvent::Completed {
            record: record.clone(),
        });

        let remote = self.spawn_remote_submission(record.clone());
        Ok(SubmitOutcome::Submitted { record, remote })
    }

    fn spawn_remote_submission(&self, record: ResultRecord) -> RemoteSubmission {
        let submitter = self.submitter.clone();
        let events = self.events.clone();
        let user_id = self.user_id;
        let session_id = self.session_id;
        let handle = tokio::spawn(async move {
            let outcome = submitter.submit(user_id, &record).await;
            let event = match &outcome {
                Ok(_) => SessionEvent::RemoteSynced { session_id },
                Err(err) => SessionEvent::RemoteSyncFailed {
                    session_id,
                    message: err.to_string(),
                },
            };
            let _ = events.send(event);
            outcome
        });
        RemoteSubmission { session_id, handle }
    }

    /// Abandon the attempt without recording a result.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Finished` if the session already ended.
    pub async fn quit(&mut self) -> Result<(), SessionError> {
        if self.status.is_terminal() {
            return Err(SessionError::Finished);
        }
        self.timer.cancel().await;
        self.quiz = None;
        self.status = SessionStatus::Discarded;
        info!(session_id = %self.session_id, "session quit");
        self.emit(SessionEvent::Quit);
        Ok(())
    }

    /// The app moved to the background: pause and snapshot the countdown.
    pub async fn on_suspend(&mut self) {
        if self.status != SessionStatus::InProgress || self.timer.is_suspended() {
            return;
        }
        self.timer.on_suspend().await;
        if self.timer.is_suspended() {
            self.emit(SessionEvent::Suspended {
                remaining_seconds: self.timer.remaining_seconds(),
            });
        }
    }

    /// The app returned to the foreground.
    ///
    /// Applies the wall-clock time spent suspended; if that exhausted the
    /// countdown the session is submitted and the outcome returned.
    ///
    /// # Errors
    ///
    /// Propagates errors from an expiry-triggered submission.
    pub async fn on_resume(&mut self) -> Result<Option<SubmitOutcome>, SessionError> {
        if self.status != SessionStatus::InProgress {
            return Ok(None);
        }
        let Some(signals) = self.timer.on_resume().await else {
            return Ok(None);
        };
        self.emit(SessionEvent::Resumed {
            remaining_seconds: self.timer.remaining_seconds(),
        });
        self.apply_timer_signals(signals).await
    }

    /// Wait for the next countdown tick. Pending forever when not ticking.
    ///
    /// Cancel-safe, for use in `tokio::select!`.
    pub async fn wait_tick(&mut self) -> Vec<TimerSignal> {
        if self.status != SessionStatus::InProgress {
            return std::future::pending().await;
        }
        let signals = self.timer.next_tick().await;
        self.emit(SessionEvent::Tick {
            remaining_seconds: self.timer.remaining_seconds(),
        });
        signals
    }

    /// React to timer signals, submitting on expiry.
    ///
    /// # Errors
    ///
    /// Propagates errors from an expiry-triggered submission.
    pub async fn apply_timer_signals(
        &mut self,
        signals: Vec<TimerSignal>,
    ) -> Result<Option<SubmitOutcome>, SessionError> {
        let mut expired = false;
        for signal in signals {
            match signal {
                TimerSignal::LowTime { remaining_seconds } => {
                    info!(session_id = %self.session_id, remaining_seconds, "low time");
                    self.emit(SessionEvent::LowTime { remaining_seconds });
                }
                TimerSignal::Expired => {
                    info!(session_id = %self.session_id, "time expired");
                    self.emit(SessionEvent::Expired);
                    expired = true;
                }
            }
        }
        if expired {
            return self.finalize(SubmitTrigger::Expiry).await.map(Some);
        }
        Ok(None)
    }

    /// Wait for the next tick and apply it.
    ///
    /// # Errors
    ///
    /// Propagates errors from an expiry-triggered submission.
    pub async fn next_tick(&mut self) -> Result<Option<SubmitOutcome>, SessionError> {
        let signals = self.wait_tick().await;
        self.apply_timer_signals(signals).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::InMemoryRemoteStore;
    use crate::submitter::RetryPolicy;
    use async_trait::async_trait;
    use quiz_core::model::{QuestionId, QuestionSet};
    use quiz_core::time::manual_clock;
    use storage::repository::{
        InMemoryRepository, ResultHistoryRepository, SnapshotRepository, Storage, StorageError,
    };

    fn question_set(count: usize, duration_seconds: u32) -> QuestionSet {
        let questions = (0..count)
            .map(|i| {
                Question::new(
                    QuestionId::new(i as u64 + 1),
                    format!("question {i}"),
                    vec!["a".into(), "b".into(), "c".into(), "d".into()],
                    0,
                )
                .unwrap()
            })
            .collect();
        QuestionSet::new("Sample", duration_seconds, questions)
    }

    struct Fixture {
        engine: QuizEngine,
        remote: InMemoryRemoteStore,
        clock: Clock,
    }

    fn fixture_with(set: QuestionSet, persistence: PersistenceAdapter) -> Fixture {
        let loader = InMemoryRepository::new();
        loader
            .insert_question_set(CategoryId::new(1), TestId::new(1), set)
            .unwrap();
        let remote = InMemoryRemoteStore::new();
        let submitter = ResultSubmitter::new(Arc::new(remote.clone()))
            .with_retry_policy(RetryPolicy::immediate(1));
        let clock = manual_clock();
        let engine =
            QuizEngine::new(Arc::new(loader), persistence, submitter).with_clock(clock.clone());
        Fixture {
            engine,
            remote,
            clock,
        }
    }

    fn fixture(set: QuestionSet) -> Fixture {
        fixture_with(set, PersistenceAdapter::new(&Storage::in_memory()))
    }

    async fn started(fixture: &Fixture) -> QuizSessionController {
        let mut session = fixture.engine.new_session(UserId::new(7));
        session
            .start(CategoryId::new(1), TestId::new(1))
            .await
            .unwrap();
        session
    }

    #[tokio::test]
    async fn start_moves_to_in_progress() {
        let fixture = fixture(question_set(3, 90));
        let session = started(&fixture).await;

        assert_eq!(session.status(), SessionStatus::InProgress);
        assert_eq!(session.title(), Some("Sample"));
        assert_eq!(session.remaining_seconds(), 90);
        assert_eq!(session.current_index(), Some(0));
    }

    #[tokio::test]
    async fn missing_test_leaves_session_in_error() {
        let fixture = fixture(question_set(3, 90));
        let mut session = fixture.engine.new_session(UserId::new(7));

        let err = session
            .start(CategoryId::new(1), TestId::new(99))
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::QuestionsUnavailable(_)));
        assert_eq!(session.status(), SessionStatus::Error);
        assert!(session.select_answer(0, 0).is_err());
    }

    #[tokio::test]
    async fn zero_duration_is_unavailable() {
        let fixture = fixture(question_set(3, 0));
        let mut session = fixture.engine.new_session(UserId::new(7));

        let err = session
            .start(CategoryId::new(1), TestId::new(1))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SessionError::QuestionsUnavailable(UnavailableReason::Question(_))
        ));
    }

    #[tokio::test]
    async fn start_twice_is_rejected() {
        let fixture = fixture(question_set(2, 30));
        let mut session = started(&fixture).await;
        assert!(matches!(
            session.start(CategoryId::new(1), TestId::new(1)).await,
            Err(SessionError::AlreadyStarted)
        ));
    }

    #[tokio::test]
    async fn select_answer_overwrites_and_validates_bounds() {
        let fixture = fixture(question_set(2, 30));
        let mut session = started(&fixture).await;

        session.select_answer(1, 2).unwrap();
        session.select_answer(1, 3).unwrap();
        assert_eq!(session.answers().unwrap().get(1), Some(3));

        assert!(matches!(
            session.select_answer(2, 0),
            Err(SessionError::QuestionOutOfRange { index: 2, total: 2 })
        ));
        assert!(matches!(
            session.select_answer(0, 4),
            Err(SessionError::OptionOutOfRange { option: 4, count: 4, .. })
        ));
    }

    #[tokio::test]
    async fn navigation_clamps_and_signals_ready_to_submit() {
        let fixture = fixture(question_set(3, 30));
        let mut session = started(&fixture).await;
        let mut events = session.subscribe();

        assert_eq!(session.navigate(Direction::Previous).unwrap(), NavigateOutcome::At(0));
        assert_eq!(session.navigate(Direction::Next).unwrap(), NavigateOutcome::At(1));
        assert_eq!(session.navigate(Direction::Jump(10)).unwrap(), NavigateOutcome::At(2));
        assert_eq!(
            session.navigate(Direction::Next).unwrap(),
            NavigateOutcome::ReadyToSubmit
        );
        assert_eq!(session.current_index(), Some(2));

        let mut seen = Vec::new();
        while let Ok(event) = events.try_recv() {
            seen.push(event);
        }
        assert_eq!(seen.last(), Some(&SessionEvent::ReadyToSubmit));
    }

    #[tokio::test]
    async fn ten_question_attempt_scores_and_records_history() {
        let fixture = fixture(question_set(10, 300));
        let mut session = started(&fixture).await;

        for q in 0..7 {
            session.select_answer(q, 0).unwrap();
        }
        session.select_answer(7, 1).unwrap();
        session.select_answer(8, 2).unwrap();
        for _ in 0..180 {
            assert!(session.timer.tick().is_empty());
        }

        let SubmitOutcome::Submitted { record, remote } = session.submit().await.unwrap() else {
            panic!("expected submission");
        };
        assert_eq!(record.score(), 7);
        assert_eq!(record.correct_count(), 7);
        assert_eq!(record.incorrect_count(), 2);
        assert_eq!(record.unattempted_count(), 1);
        assert_eq!(record.time_taken_seconds(), 180);
        assert_eq!(session.status(), SessionStatus::Completed);
        assert!(session.answers().is_none());

        remote.outcome().await.unwrap();
        let stats = fixture.remote.stats(UserId::new(7));
        assert_eq!(stats.tests_taken, 1);
        assert_eq!(stats.total_score, 7);

        let history = fixture
            .engine
            .persistence()
            .history(CategoryId::new(1), TestId::new(1))
            .await
            .unwrap();
        assert_eq!(history, vec![record]);
    }

    #[tokio::test]
    async fn second_trigger_is_ignored() {
        let fixture = fixture(question_set(2, 30));
        let mut session = started(&fixture).await;

        let first = session.submit().await.unwrap();
        let second = session.finalize(SubmitTrigger::Expiry).await.unwrap();
        assert!(matches!(first, SubmitOutcome::Submitted { .. }));
        assert!(matches!(second, SubmitOutcome::Ignored));

        if let SubmitOutcome::Submitted { remote, .. } = first {
            remote.outcome().await.unwrap();
        }
        assert_eq!(fixture.remote.history(UserId::new(7)).len(), 1);
        let history = fixture
            .engine
            .persistence()
            .history(CategoryId::new(1), TestId::new(1))
            .await
            .unwrap();
        assert_eq!(history.len(), 1);
    }

    #[tokio::test]
    async fn quit_records_nothing() {
        let fixture = fixture(question_set(2, 30));
        let mut session = started(&fixture).await;
        session.select_answer(0, 0).unwrap();
        session.on_suspend().await;

        session.quit().await.unwrap();
        assert_eq!(session.status(), SessionStatus::Discarded);
        assert!(session.result().is_none());
        assert!(matches!(session.submit().await, Err(SessionError::Finished)));
        assert!(matches!(session.quit().await, Err(SessionError::Finished)));

        let history = fixture
            .engine
            .persistence()
            .history(CategoryId::new(1), TestId::new(1))
            .await
            .unwrap();
        assert!(history.is_empty());
        assert_eq!(
            fixture
                .engine
                .persistence()
                .take_snapshot(session.session_id())
                .await
                .unwrap(),
            None
        );
        assert_eq!(fixture.remote.calls(), 0);
    }

    #[tokio::test]
    async fn progress_reports_answers_position_and_suspension() {
        let fixture = fixture(question_set(5, 100));
        let mut session = started(&fixture).await;
        session.select_answer(0, 1).unwrap();
        session.select_answer(3, 2).unwrap();
        session.select_answer(3, 0).unwrap();
        session.navigate(Direction::Jump(2)).unwrap();
        for _ in 0..15 {
            session.timer.tick();
        }

        let progress = session.progress();
        assert_eq!(progress.status, SessionStatus::InProgress);
        assert_eq!(progress.total, 5);
        assert_eq!(progress.answered, 2);
        assert_eq!(progress.unattempted(), 3);
        assert_eq!(progress.current_index, 2);
        assert_eq!(progress.remaining_seconds, 85);
        assert_eq!(progress.duration_seconds, 100);
        assert!(!progress.suspended);
        assert!(!progress.is_complete());

        session.on_suspend().await;
        let progress = session.progress();
        assert!(progress.suspended);
        assert_eq!(progress.remaining_seconds, 85);
    }

    #[tokio::test]
    async fn resume_after_long_suspend_auto_submits() {
        let mut fixture = fixture(question_set(4, 60));
        let mut session = started(&fixture).await;
        session.select_answer(0, 0).unwrap();
        for _ in 0..10 {
            session.timer.tick();
        }
        session.on_suspend().await;
        assert!(session.is_suspended());

        fixture.clock.advance(chrono::Duration::seconds(55));
        let outcome = session.on_resume().await.unwrap();
        let Some(SubmitOutcome::Submitted { record, .. }) = outcome else {
            panic!("expected expiry submission");
        };
        assert_eq!(record.time_taken_seconds(), 60);
        assert_eq!(record.score(), 1);
        assert_eq!(session.status(), SessionStatus::Completed);
        assert!(session.on_resume().await.unwrap().is_none());
    }

    struct FailingHistory;

    #[async_trait]
    impl ResultHistoryRepository for FailingHistory {
        async fn append_result(
            &self,
            _record: &ResultRecord,
            _keep: usize,
        ) -> Result<bool, StorageError> {
            Err(StorageError::Connection("disk full".into()))
        }

        async fn list_results(
            &self,
            _category_id: CategoryId,
            _test_id: TestId,
        ) -> Result<Vec<ResultRecord>, StorageError> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn local_write_failure_moves_to_error() {
        let snapshots: Arc<dyn SnapshotRepository> = Arc::new(InMemoryRepository::new());
        let persistence = PersistenceAdapter::from_parts(snapshots, Arc::new(FailingHistory));
        let fixture = fixture_with(question_set(2, 30), persistence);
        let mut session = started(&fixture).await;
        let mut events = session.subscribe();

        let err = session.submit().await.unwrap_err();
        assert!(matches!(err, SessionError::Persistence(_)));
        assert_eq!(session.status(), SessionStatus::Error);
        assert!(matches!(events.try_recv(), Ok(SessionEvent::Error { .. })));
        assert_eq!(fixture.remote.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn countdown_expiry_submits_automatically() {
        let fixture = fixture(question_set(2, 5));
        let mut session = started(&fixture).await;
        let mut events = session.subscribe();

        let mut outcome = None;
        while outcome.is_none() {
            outcome = session.next_tick().await.unwrap();
        }
        let Some(SubmitOutcome::Submitted { record, .. }) = outcome else {
            panic!("expected submission");
        };
        assert_eq!(record.time_taken_seconds(), 5);
        assert_eq!(record.unattempted_count(), 2);

        let mut seen = Vec::new();
        while let Ok(event) = events.try_recv() {
            seen.push(event);
        }
        let low = seen
            .iter()
            .position(|e| matches!(e, SessionEvent::LowTime { .. }))
            .unwrap();
        let expired = seen.iter().position(|e| *e == SessionEvent::Expired).unwrap();
        assert!(low < expired);
        assert_eq!(
            seen.iter().filter(|e| matches!(e, SessionEvent::Tick { .. })).count(),
            5
        );
    }
}
