//! Poll state machine for a single analysis job.
//!
//! ```text
//! Submitting --Submitted--> Polling{0}
//! Polling{n} --StatusReceived(PENDING|RUNNING)--> Polling{n+1} | TimedOut (n+1 == max)
//! Polling{n} --StatusReceived(COMPLETED)--> Completed
//! Polling{n} --StatusReceived(FAILED)--> Failed
//! Polling{n} --TransportError--> Failed
//! Polling{n} --DeadlineReached--> TimedOut
//! Submitting|Polling --Cancelled--> Cancelled
//! ```
//!
//! Terminal states accept no events.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::service::JobStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PollState {
    Submitting,
    Polling { attempts: u32 },
    Completed,
    Failed,
    TimedOut,
    /// Stopped by the caller; never reconciled.
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollEvent {
    Submitted,
    StatusReceived(JobStatus),
    TransportError,
    /// The loop ran past `max_attempts * interval` of wall-clock time.
    DeadlineReached,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("event {event:?} is not valid in state {state:?}")]
pub struct IllegalTransition {
    pub state: PollState,
    pub event: PollEvent,
}

impl PollState {
    pub fn is_terminal(&self) -> bool {
        match self {
            PollState::Submitting | PollState::Polling { .. } => false,
            PollState::Completed
            | PollState::Failed
            | PollState::TimedOut
            | PollState::Cancelled => true,
        }
    }

    /// Number of non-terminal responses seen so far.
    pub fn attempts(&self) -> Option<u32> {
        match self {
            PollState::Polling { attempts } => Some(*attempts),
            _ => None,
        }
    }

    /// The status persisted for this state once it is terminal.
    /// `TimedOut` is recorded as `FAILED`; `Cancelled` records nothing.
    pub fn persisted_status(&self) -> Option<JobStatus> {
        match self {
            PollState::Completed => Some(JobStatus::Completed),
            PollState::Failed | PollState::TimedOut => Some(JobStatus::Failed),
            PollState::Submitting | PollState::Polling { .. } | PollState::Cancelled => None,
        }
    }

    /// Applies `event`. A non-terminal response that uses up the last of
    /// `max_attempts` moves straight to `TimedOut`.
    pub fn apply(self, event: PollEvent, max_attempts: u32) -> Result<PollState, IllegalTransition> {
        let illegal = IllegalTransition { state: self, event };
        match (self, event) {
            (PollState::Submitting, PollEvent::Submitted) => Ok(PollState::Polling { attempts: 0 }),
            (PollState::Submitting, PollEvent::Cancelled) => Ok(PollState::Cancelled),
            (PollState::Submitting, PollEvent::StatusReceived(_))
            | (PollState::Submitting, PollEvent::TransportError)
            | (PollState::Submitting, PollEvent::DeadlineReached) => Err(illegal),

            (PollState::Polling { attempts }, PollEvent::StatusReceived(status)) => match status {
                JobStatus::Pending | JobStatus::Running => {
                    let attempts = attempts.saturating_add(1);
                    if attempts >= max_attempts {
                        Ok(PollState::TimedOut)
                    } else {
                        Ok(PollState::Polling { attempts })
                    }
                }
                JobStatus::Completed => Ok(PollState::Completed),
                JobStatus::Failed => Ok(PollState::Failed),
            },
            (PollState::Polling { .. }, PollEvent::TransportError) => Ok(PollState::Failed),
            (PollState::Polling { .. }, PollEvent::DeadlineReached) => Ok(PollState::TimedOut),
            (PollState::Polling { .. }, PollEvent::Cancelled) => Ok(PollState::Cancelled),
            (PollState::Polling { .. }, PollEvent::Submitted) => Err(illegal),

            (PollState::Completed, _)
            | (PollState::Failed, _)
            | (PollState::TimedOut, _)
            | (PollState::Cancelled, _) => Err(illegal),
        }
    }
}

impl std::fmt::Display for PollState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PollState::Submitting => write!(f, "Submitting"),
            PollState::Polling { attempts } => write!(f, "Polling (attempt {})", attempts + 1),
            PollState::Completed => write!(f, "Completed"),
            PollState::Failed => write!(f, "Failed"),
            PollState::TimedOut => write!(f, "Timed out"),
            PollState::Cancelled => write!(f, "Cancelled"),
        }
    }
}
