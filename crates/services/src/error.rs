//! Shared error types for the services crate.

use thiserror::Error;

use quiz_core::model::{QuestionError, ResultError};
use storage::repository::StorageError;

use crate::sessions::SessionStatus;

/// Why a question set could not start a session.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum UnavailableReason {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Question(#[from] QuestionError),
}

/// Errors emitted by the quiz session controller.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SessionError {
    #[error("questions unavailable: {0}")]
    QuestionsUnavailable(#[source] UnavailableReason),
    #[error("failed to persist result locally: {0}")]
    Persistence(#[source] StorageError),
    #[error("session has already been started")]
    AlreadyStarted,
    #[error("session is not in progress (status: {0:?})")]
    NotInProgress(SessionStatus),
    #[error("session already finished")]
    Finished,
    #[error("question {index} out of range for {total} questions")]
    QuestionOutOfRange { index: usize, total: usize },
    #[error("option {option} out of range for question {question} ({count} options)")]
    OptionOutOfRange {
        question: usize,
        option: usize,
        count: usize,
    },
    #[error(transparent)]
    Result(#[from] ResultError),
}

/// Errors reported by a remote result store.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RemoteError {
    #[error("remote unavailable: {0}")]
    Unavailable(String),
    #[error("remote request failed with status {0}")]
    HttpStatus(reqwest::StatusCode),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error("remote rejected request: {0}")]
    Rejected(String),
}

impl RemoteError {
    /// Whether retrying the same request may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            RemoteError::Unavailable(_) => true,
            RemoteError::HttpStatus(status) => {
                status.is_server_error() || *status == reqwest::StatusCode::TOO_MANY_REQUESTS
            }
            RemoteError::Http(err) => err.is_timeout() || err.is_connect() || err.is_request(),
            RemoteError::Rejected(_) => false,
        }
    }
}

/// Errors emitted by `ResultSubmitter`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SubmitError {
    #[error("remote submission failed after {attempts} attempts: {source}")]
    Exhausted {
        attempts: u32,
        #[source]
        source: RemoteError,
    },
    #[error("remote submission rejected: {0}")]
    Rejected(#[source] RemoteError),
    #[error("remote submission task aborted: {0}")]
    Aborted(String),
}
