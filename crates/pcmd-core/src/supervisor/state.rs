//! Supervision state machine

use std::fmt;
use std::process::ExitStatus;

/// Which way bytes flow through a copy task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// External input to the child's stdin
    Input,
    /// The child's stdout to external output
    Output,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Input => write!(f, "input"),
            Direction::Output => write!(f, "output"),
        }
    }
}

/// What moved a session into cleanup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupTrigger {
    /// A copy direction reached end-of-stream or failed
    StreamClosed(Direction),
    /// The stop signal fired
    Stopped,
}

/// How the child ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// Exited on its own before cleanup was requested
    NaturalExit(ExitStatus),
    /// Exited within the grace period
    ExitedDuringGrace(ExitStatus),
    /// Outlived the grace period and was sent SIGKILL. The status is
    /// `None` when the child could not be reaped afterwards.
    Killed(Option<ExitStatus>),
}

impl Termination {
    /// Whether SIGKILL was sent
    pub fn was_killed(&self) -> bool {
        matches!(self, Termination::Killed(_))
    }

    /// Exit status, when known
    pub fn status(&self) -> Option<ExitStatus> {
        match self {
            Termination::NaturalExit(status) | Termination::ExitedDuringGrace(status) => {
                Some(*status)
            }
            Termination::Killed(status) => *status,
        }
    }
}

/// Supervision lifecycle: `Spawned → Running → CleanupRequested → Terminated`,
/// with a direct `Running → Terminated` edge for a natural exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Process started, stdio not yet being copied
    Spawned,
    /// Copy tasks running
    Running,
    /// Pipes closed, grace timer running
    CleanupRequested(CleanupTrigger),
    /// Child gone
    Terminated(Termination),
}

impl SessionState {
    /// `Spawned → Running`
    pub fn start(self) -> Self {
        match self {
            SessionState::Spawned => SessionState::Running,
            other => other.rejected("start"),
        }
    }

    /// `Running → CleanupRequested`
    pub fn request_cleanup(self, trigger: CleanupTrigger) -> Self {
        match self {
            SessionState::Running => SessionState::CleanupRequested(trigger),
            other => other.rejected("request cleanup"),
        }
    }

    /// `Running → Terminated(NaturalExit)` or `CleanupRequested → Terminated`.
    ///
    /// A natural exit is only accepted from `Running`; exits observed
    /// during cleanup must be `ExitedDuringGrace` or `Killed`.
    pub fn terminate(self, termination: Termination) -> Self {
        match (self, termination) {
            (SessionState::Running, Termination::NaturalExit(_)) => {
                SessionState::Terminated(termination)
            }
            (SessionState::CleanupRequested(_), Termination::ExitedDuringGrace(_))
            | (SessionState::CleanupRequested(_), Termination::Killed(_)) => {
                SessionState::Terminated(termination)
            }
            (other, _) => other.rejected("terminate"),
        }
    }

    /// Whether the session has ended
    pub fn is_terminated(&self) -> bool {
        matches!(self, SessionState::Terminated(_))
    }

    fn rejected(self, transition: &str) -> Self {
        tracing::debug!("Ignoring {} in state {:?}", transition, self);
        self
    }
}
