//! Upload lifecycle states and the legal transitions between them

use std::fmt;

use crate::{CoreError, Result};

/// Lifecycle of one upload attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UploadState {
    Idle,
    SessionOpening,
    Authorizing,
    Transferring,
    Finalizing,
    Completed,
    Aborting,
    Aborted,
    Failed,
}

impl UploadState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            UploadState::Completed | UploadState::Aborted | UploadState::Failed
        )
    }

    /// Whether a session may exist in this state and must be aborted on failure
    pub fn holds_session(self) -> bool {
        matches!(
            self,
            UploadState::Authorizing | UploadState::Transferring | UploadState::Finalizing
        )
    }

    pub fn can_transition_to(self, next: UploadState) -> bool {
        use UploadState::*;

        matches!(
            (self, next),
            (Idle, SessionOpening)
                | (Idle, Failed)
                | (SessionOpening, Authorizing)
                | (SessionOpening, Failed)
                | (Authorizing, Transferring)
                | (Authorizing, Aborting)
                | (Transferring, Finalizing)
                | (Transferring, Aborting)
                | (Finalizing, Completed)
                | (Finalizing, Aborting)
                | (Aborting, Aborted)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            UploadState::Idle => "idle",
            UploadState::SessionOpening => "session-opening",
            UploadState::Authorizing => "authorizing",
            UploadState::Transferring => "transferring",
            UploadState::Finalizing => "finalizing",
            UploadState::Completed => "completed",
            UploadState::Aborting => "aborting",
            UploadState::Aborted => "aborted",
            UploadState::Failed => "failed",
        }
    }
}

impl fmt::Display for UploadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tracks the current state and refuses illegal moves
#[derive(Debug, Clone)]
pub struct StateMachine {
    state: UploadState,
}

impl StateMachine {
    pub fn new() -> Self {
        StateMachine {
            state: UploadState::Idle,
        }
    }

    pub fn current(&self) -> UploadState {
        self.state
    }

    /// Move to `next`, returning the state that was left
    pub fn advance(&mut self, next: UploadState) -> Result<UploadState> {
        if !self.state.can_transition_to(next) {
            return Err(CoreError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }

        let previous = self.state;
        self.state = next;
        Ok(previous)
    }
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}
