//! Error taxonomy for the conversation core
//!
//! `Validation`, `Forbidden`, `StateConflict` and `NotFound` are always raised
//! before any durable write. `ServiceUnavailable` may be raised after the
//! submission has already committed (dispatch failure). `TransientBusy` is the
//! only retryable variant.

use crate::db::DbError;
use crate::state_machine::TransitionError;
use thiserror::Error;

/// A committed submission whose reply job could not be enqueued
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnscheduledReply {
    pub conversation_id: String,
    pub message_id: String,
    pub reason: String,
}

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("Invalid input: {0}")]
    Validation(String),
    #[error("Access denied: {0}")]
    Forbidden(String),
    #[error("{0}")]
    StateConflict(#[from] TransitionError),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error(
        "Service unavailable: message accepted but reply could not be scheduled for conversation {}: {}",
        .0.conversation_id,
        .0.reason
    )]
    ServiceUnavailable(UnscheduledReply),
    #[error("Conversation {0} is busy, retry shortly")]
    TransientBusy(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ChatError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TransientBusy(_))
    }
}

impl From<DbError> for ChatError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::ConversationNotFound(_)
            | DbError::MessageNotFound(_)
            | DbError::ScenarioNotFound(_)
            | DbError::ModelNotFound(_)
            | DbError::PrincipalNotFound(_) => ChatError::NotFound(err.to_string()),
            DbError::InvalidScenarioConfig(msg) => ChatError::Validation(msg),
            DbError::ScenarioExists(_) => ChatError::Validation(err.to_string()),
            DbError::Sqlite(_) | DbError::Serde(_) | DbError::Poisoned => {
                ChatError::Internal(err.to_string())
            }
        }
    }
}

pub type ChatResult<T> = Result<T, ChatError>;
