//! Exploration error types.

use crate::state::StateIndex;
use thiserror::Error;

/// Failure raised by an external collaborator: the next-state generator while
/// enumerating successors, or the comparator while ranking priorities.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct GeneratorError {
    message: String,
}

impl GeneratorError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// State space exploration error.
#[derive(Debug, Error)]
pub enum ExploreError {
    #[error("invalid exploration configuration: {reason}")]
    InvalidConfig { reason: String },

    #[error("cannot compute the initial state: {0}")]
    InitialState(#[source] GeneratorError),

    /// The generator failed while expanding `state`. `error_trace` names the
    /// trace saved for that state, if error traces are enabled and the save
    /// succeeded.
    #[error("error while exploring state {state}: {source}")]
    Generator {
        state: StateIndex,
        #[source]
        source: GeneratorError,
        error_trace: Option<String>,
    },

    /// Backpointers say `to` was first reached from `from`, but no transition
    /// of `from` leads there. Indicates corrupted store bookkeeping.
    #[error("inconsistent backpointers: no transition from state {from} reaches state {to}")]
    Inconsistent { from: StateIndex, to: StateIndex },

    /// A backpointer names a state the store cannot give back.
    #[error("state {0} is not in the store")]
    UnknownState(StateIndex),

    #[error("exploration has already been run")]
    AlreadyRun,
}

impl ExploreError {
    pub(crate) fn invalid_config(reason: impl Into<String>) -> Self {
        ExploreError::InvalidConfig {
            reason: reason.into(),
        }
    }
}

/// Result type for exploration operations.
pub type ExploreResult<T> = Result<T, ExploreError>;
