mod controller;
mod driver;
mod events;
mod progress;

// Public API of the session subsystem.
pub use crate::error::SessionError;
pub use controller::{
    Direction, NavigateOutcome, QuizEngine, QuizSessionController, RemoteSubmission,
    SubmitOutcome, SubmitTrigger,
};
pub use driver::{DriverHandle, LifecycleEvent, SessionCommand, SessionDriver, SessionEnd};
pub use events::SessionEvent;
pub use progress::{SessionProgress, SessionStatus};
