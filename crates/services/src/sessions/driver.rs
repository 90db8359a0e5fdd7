use quiz_core::model::ResultRecord;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::controller::{Direction, QuizSessionController, RemoteSubmission, SubmitOutcome};
use super::events::SessionEvent;
use crate::error::SessionError;

/// User input forwarded to a running session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionCommand {
    Select { question: usize, option: usize },
    Navigate(Direction),
    Submit,
    Quit,
}

/// Process lifecycle transitions injected by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    Suspended,
    Resumed,
}

/// How a driven session ended.
#[derive(Debug)]
pub enum SessionEnd {
    Completed {
        record: ResultRecord,
        remote: RemoteSubmission,
    },
    Quit,
    Failed(SessionError),
}

/// Sending side for commands and lifecycle events.
#[derive(Debug, Clone)]
pub struct DriverHandle {
    commands: mpsc::Sender<SessionCommand>,
    lifecycle: mpsc::Sender<LifecycleEvent>,
}

impl DriverHandle {
    /// Returns `false` once the driver has stopped.
    pub async fn send(&self, command: SessionCommand) -> bool {
        self.commands.send(command).await.is_ok()
    }

    /// Returns `false` once the driver has stopped.
    pub async fn lifecycle(&self, event: LifecycleEvent) -> bool {
        self.lifecycle.send(event).await.is_ok()
    }

    /// Blocking variant of [`DriverHandle::send`] for plain threads.
    ///
    /// Must not be called from async code.
    #[must_use]
    pub fn send_blocking(&self, command: SessionCommand) -> bool {
        self.commands.blocking_send(command).is_ok()
    }

    /// Blocking variant of [`DriverHandle::lifecycle`] for plain threads.
    #[must_use]
    pub fn lifecycle_blocking(&self, event: LifecycleEvent) -> bool {
        self.lifecycle.blocking_send(event).is_ok()
    }
}

/// Runs a started session: multiplexes commands, lifecycle events and the
/// countdown until the session completes, fails or is quit.
pub struct SessionDriver {
    controller: QuizSessionController,
    commands: mpsc::Receiver<SessionCommand>,
    lifecycle: mpsc::Receiver<LifecycleEvent>,
}

impl SessionDriver {
    #[must_use]
    pub fn new(controller: QuizSessionController, capacity: usize) -> (Self, DriverHandle) {
        let (command_tx, commands) = mpsc::channel(capacity.max(1));
        let (lifecycle_tx, lifecycle) = mpsc::channel(capacity.max(1));
        (
            Self {
                controller,
                commands,
                lifecycle,
            },
            DriverHandle {
                commands: command_tx,
                lifecycle: lifecycle_tx,
            },
        )
    }

    #[must_use]
    pub fn controller(&self) -> &QuizSessionController {
        &self.controller
    }

    #[must_use]
    pub fn into_controller(self) -> QuizSessionController {
        self.controller
    }

    /// Drive the session to its end.
    ///
    /// With every sender dropped the session keeps counting down and is
    /// submitted on expiry. A session still suspended when the lifecycle
    /// channel closes is resumed first, since no `Resumed` can arrive.
    pub async fn run(&mut self) -> SessionEnd {
        if let Err(err) = self.controller.ensure_in_progress() {
            return SessionEnd::Failed(err);
        }

        let mut lifecycle_open = true;
        loop {
            let step = tokio::select! {
                signals = self.controller.wait_tick() => {
                    self.controller.apply_timer_signals(signals).await
                }
                Some(command) = self.commands.recv() => self.handle_command(command).await,
                event = self.lifecycle.recv(), if lifecycle_open => match event {
                    Some(event) => self.handle_lifecycle(event).await,
                    None => {
                        lifecycle_open = false;
                        self.handle_lifecycle_closed().await
                    }
                },
            };

            match step {
                Ok(Some(SubmitOutcome::Submitted { record, remote })) => {
                    return SessionEnd::Completed { record, remote };
                }
                Ok(Some(SubmitOutcome::Ignored) | None) => {}
                Err(err) if self.controller.status().is_terminal() => {
                    return SessionEnd::Failed(err);
                }
                Err(err) => {
                    warn!(error = %err, "session command rejected");
                    self.controller.emit(SessionEvent::CommandRejected {
                        reason: err.to_string(),
                    });
                }
            }

            if self.controller.status().is_terminal() {
                return SessionEnd::Quit;
            }
        }
    }

    async fn handle_command(
        &mut self,
        command: SessionCommand,
    ) -> Result<Option<SubmitOutcome>, SessionError> {
        debug!(?command, "session command");
        match command {
            SessionCommand::Select { question, option } => {
                self.controller.select_answer(question, option)?;
                Ok(None)
            }
            SessionCommand::Navigate(direction) => {
                self.controller.navigate(direction)?;
                Ok(None)
            }
            SessionCommand::Submit => self.controller.submit().await.map(Some),
            SessionCommand::Quit => {
                self.controller.quit().await?;
                Ok(None)
            }
        }
    }

    async fn handle_lifecycle(
        &mut self,
        event: LifecycleEvent,
    ) -> Result<Option<SubmitOutcome>, SessionError> {
        debug!(?event, "lifecycle event");
        match event {
            LifecycleEvent::Suspended => {
                self.controller.on_suspend().await;
                Ok(None)
            }
            LifecycleEvent::Resumed => self.controller.on_resume().await,
        }
    }

    async fn handle_lifecycle_closed(&mut self) -> Result<Option<SubmitOutcome>, SessionError> {
        if !self.controller.is_suspended() {
            return Ok(None);
        }
        debug!("lifecycle channel closed while suspended, resuming");
        self.controller.on_resume().await
    }
}
