//! Submit/browse state machine
//!
//! ```text
//! Idle -> Uploaded -> Previewing -> Analyzing -> Ready -> Idle (reset)
//!            ^                          |
//!            +------ failed settle -----+
//! ```
//!
//! Every transition consumes the state and returns the next one, so the
//! controller owns exactly one `ClientState` at a time.

use std::path::PathBuf;

use thiserror::Error;

use super::Session;
use crate::analysis::Category;
use crate::images::normalize_result_url;

/// Rejected transition
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    /// Submission or selection while an analysis is in flight
    #[error("an analysis is already in progress")]
    Busy,

    #[error("cannot {action} while {phase}")]
    Invalid {
        action: &'static str,
        phase: &'static str,
    },
}

/// Position within a session's steps, always in `[0, max(0, len - 1)]`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cursor {
    index: usize,
    len: usize,
}

impl Cursor {
    pub fn new(len: usize) -> Self {
        Self { index: 0, len }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn next(self) -> Self {
        self.jump(self.index.saturating_add(1))
    }

    pub fn previous(self) -> Self {
        self.jump(self.index.saturating_sub(1))
    }

    /// Move to `index`, clamped into range
    pub fn jump(self, index: usize) -> Self {
        Self {
            index: index.min(self.len.saturating_sub(1)),
            len: self.len,
        }
    }

    pub fn is_last(&self) -> bool {
        self.index + 1 >= self.len
    }
}

/// Controller phase
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Phase {
    Idle,
    /// A file is chosen; its preview is not shown yet
    Uploaded { file: PathBuf },
    Previewing { file: PathBuf },
    /// Submission disabled until the result settles
    Analyzing { file: PathBuf },
    Ready { session: Box<Session>, cursor: Cursor },
}

impl Phase {
    fn name(&self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::Uploaded { .. } => "uploaded",
            Phase::Previewing { .. } => "previewing",
            Phase::Analyzing { .. } => "analyzing",
            Phase::Ready { .. } => "ready",
        }
    }
}

/// Client controller state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientState {
    phase: Phase,
    /// Message of the last failed submission
    error: Option<String>,
    /// Cache-bust counter; grows on every cursor move
    refresh: u64,
}

impl Default for ClientState {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientState {
    pub fn new() -> Self {
        Self {
            phase: Phase::Idle,
            error: None,
            refresh: 0,
        }
    }

    pub fn phase(&self) -> &Phase {
        &self.phase
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn session(&self) -> Option<&Session> {
        match &self.phase {
            Phase::Ready { session, .. } => Some(&**session),
            _ => None,
        }
    }

    pub fn cursor(&self) -> Option<Cursor> {
        match &self.phase {
            Phase::Ready { cursor, .. } => Some(*cursor),
            _ => None,
        }
    }

    /// The chosen file, in any phase that has one
    pub fn file(&self) -> Option<&PathBuf> {
        match &self.phase {
            Phase::Uploaded { file } | Phase::Previewing { file } | Phase::Analyzing { file } => {
                Some(file)
            }
            _ => None,
        }
    }

    pub fn can_submit(&self) -> bool {
        matches!(
            self.phase,
            Phase::Uploaded { .. } | Phase::Previewing { .. }
        )
    }

    /// URL of the image under the cursor, with a fresh `?t=` token
    pub fn active_image_url(&self) -> Option<String> {
        match &self.phase {
            Phase::Ready { session, cursor } => Some(format!(
                "{}?t={}",
                normalize_result_url(&session.image_at(cursor.index()).url()),
                self.refresh
            )),
            _ => None,
        }
    }

    fn invalid(&self, action: &'static str) -> TransitionError {
        TransitionError::Invalid {
            action,
            phase: self.phase.name(),
        }
    }

    /// Choose a new file; any previous result is dropped
    pub fn select(self, file: PathBuf) -> Result<Self, TransitionError> {
        if matches!(self.phase, Phase::Analyzing { .. }) {
            return Err(TransitionError::Busy);
        }
        Ok(Self {
            phase: Phase::Uploaded { file },
            error: None,
            refresh: self.refresh,
        })
    }

    pub fn preview_loaded(self) -> Result<Self, TransitionError> {
        match self.phase {
            Phase::Uploaded { file } => Ok(Self {
                phase: Phase::Previewing { file },
                ..self
            }),
            _ => Err(self.invalid("show a preview")),
        }
    }

    pub fn submit(self) -> Result<Self, TransitionError> {
        match self.phase {
            Phase::Uploaded { file } | Phase::Previewing { file } => Ok(Self {
                phase: Phase::Analyzing { file },
                error: None,
                refresh: self.refresh,
            }),
            Phase::Analyzing { .. } => Err(TransitionError::Busy),
            _ => Err(self.invalid("submit")),
        }
    }

    /// Apply the outcome of the in-flight analysis
    ///
    /// Failure returns to `Uploaded` with the chosen file kept and the
    /// message recorded.
    pub fn settle(self, result: Result<Session, String>) -> Result<Self, TransitionError> {
        let file = match self.phase {
            Phase::Analyzing { file } => file,
            _ => return Err(self.invalid("settle an analysis")),
        };

        match result {
            Ok(session) => {
                let cursor = Cursor::new(session.steps.len());
                Ok(Self {
                    phase: Phase::Ready {
                        session: Box::new(session),
                        cursor,
                    },
                    error: None,
                    refresh: self.refresh + 1,
                })
            }
            Err(message) => Ok(Self {
                phase: Phase::Uploaded { file },
                error: Some(message),
                refresh: self.refresh,
            }),
        }
    }

    pub fn next(self) -> Result<Self, TransitionError> {
        self.move_cursor("go to the next step", Cursor::next)
    }

    pub fn previous(self) -> Result<Self, TransitionError> {
        self.move_cursor("go to the previous step", Cursor::previous)
    }

    /// Move to the first step in `category`; unchanged when there is none
    pub fn jump_to_category(self, category: Category) -> Result<Self, TransitionError> {
        let target = match &self.phase {
            Phase::Ready { session, .. } => session.step_for(category),
            _ => return Err(self.invalid("jump to a category")),
        };
        match target {
            Some(index) => self.move_cursor("jump to a category", |c| c.jump(index)),
            None => Ok(self),
        }
    }

    /// Show a stored session
    pub fn load_from_history(self, session: Session) -> Result<Self, TransitionError> {
        if matches!(self.phase, Phase::Analyzing { .. }) {
            return Err(TransitionError::Busy);
        }
        let cursor = Cursor::new(session.steps.len());
        Ok(Self {
            phase: Phase::Ready {
                session: Box::new(session),
                cursor,
            },
            error: None,
            refresh: self.refresh + 1,
        })
    }

    pub fn reset(self) -> Result<Self, TransitionError> {
        Ok(Self {
            refresh: self.refresh,
            ..Self::new()
        })
    }

    fn move_cursor(
        self,
        action: &'static str,
        step: impl FnOnce(Cursor) -> Cursor,
    ) -> Result<Self, TransitionError> {
        match self.phase {
            Phase::Ready { session, cursor } => Ok(Self {
                phase: Phase::Ready {
                    session,
                    cursor: step(cursor),
                },
                error: None,
                refresh: self.refresh + 1,
            }),
            phase => Err(TransitionError::Invalid {
                action,
                phase: phase.name(),
            }),
        }
    }
}
