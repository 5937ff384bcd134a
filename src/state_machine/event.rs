//! Events that can occur in a conversation

/// Events that trigger status transitions
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A principal submits new input
    SubmitMessage { content: String },

    /// The reply worker produced a reply for `user_message_id`
    ReplyCompleted {
        user_message_id: String,
        reply: String,
    },

    /// Collaborator-triggered closure
    Close,
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::SubmitMessage { .. } => "submit_message",
            Event::ReplyCompleted { .. } => "reply_completed",
            Event::Close => "close",
        }
    }
}
