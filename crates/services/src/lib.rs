#![forbid(unsafe_code)]

pub mod error;
pub mod persistence;
pub mod remote;
pub mod sessions;
pub mod submitter;
pub mod timer;

pub use quiz_core::Clock;
pub use sessions as session;

pub use error::{RemoteError, SessionError, SubmitError, UnavailableReason};
pub use persistence::PersistenceAdapter;
pub use remote::{HttpRemoteConfig, HttpRemoteStore, InMemoryRemoteStore, RemoteResultStore};
pub use sessions::{
    Direction, DriverHandle, LifecycleEvent, NavigateOutcome, QuizEngine, QuizSessionController,
    RemoteSubmission, SessionCommand, SessionDriver, SessionEnd, SessionEvent, SessionProgress,
    SessionStatus, SubmitOutcome,
};
pub use submitter::{ResultSubmitter, RetryPolicy, SubmissionReceipt};
pub use timer::{TimerService, TimerSignal};
