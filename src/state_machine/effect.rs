//! Effects produced by state transitions

use crate::db::Role;

/// Effects to be applied inside the transition's atomic unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Persist a message with a freshly allocated order number
    PersistMessage {
        role: Role,
        content: String,
        reply_to: Option<String>,
    },

    /// Persist the new status and bump `last_activity_at`
    PersistStatus,

    /// Wake pollers waiting on this conversation (after commit)
    WakePollers,
}

impl Effect {
    pub fn persist_user_message(content: impl Into<String>) -> Self {
        Effect::PersistMessage {
            role: Role::User,
            content: content.into(),
            reply_to: None,
        }
    }

    pub fn persist_reply(content: impl Into<String>, reply_to: impl Into<String>) -> Self {
        Effect::PersistMessage {
            role: Role::Assistant,
            content: content.into(),
            reply_to: Some(reply_to.into()),
        }
    }
}
