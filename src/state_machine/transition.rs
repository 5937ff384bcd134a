//! Pure state transition function
//!
//! Given the same snapshot and event it always produces the same result and
//! performs no I/O. Rejections happen here, before anything is written.

use super::{ConvContext, ConvStatus, Effect, Event};
use thiserror::Error;

/// Result of a state transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionResult {
    pub new_status: ConvStatus,
    pub effects: Vec<Effect>,
}

impl TransitionResult {
    pub fn new(status: ConvStatus) -> Self {
        Self {
            new_status: status,
            effects: vec![],
        }
    }

    /// Accepted event that changes nothing (idempotent redelivery)
    pub fn unchanged(status: ConvStatus) -> Self {
        Self::new(status)
    }

    #[must_use]
    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }

    pub fn is_noop(&self) -> bool {
        self.effects.is_empty()
    }
}

/// Errors that can occur during transition. All of them are state conflicts.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("Conversation is awaiting a reply and cannot accept a new message")]
    AwaitingReply,
    #[error("Conversation is closed")]
    Closed,
    #[error("Conversation has no message awaiting a reply")]
    NothingPending,
}

/// Pure transition function
pub fn transition(context: &ConvContext, event: Event) -> Result<TransitionResult, TransitionError> {
    match (context.status, event) {
        // Closed is terminal, for every event
        (status, _) if status.is_terminal() => Err(TransitionError::Closed),

        // ============================================================
        // User input
        // ============================================================
        (status, Event::SubmitMessage { content }) if status.accepts_input() => {
            Ok(TransitionResult::new(ConvStatus::Pending)
                .with_effect(Effect::persist_user_message(content))
                .with_effect(Effect::PersistStatus))
        }

        (_, Event::SubmitMessage { .. }) => Err(TransitionError::AwaitingReply),

        // ============================================================
        // Reply completion
        // ============================================================
        (
            ConvStatus::Pending,
            Event::ReplyCompleted {
                user_message_id,
                reply,
            },
        ) => {
            if context.unanswered_message_id.as_deref() == Some(user_message_id.as_str()) {
                Ok(TransitionResult::new(ConvStatus::Answered)
                    .with_effect(Effect::persist_reply(reply, user_message_id))
                    .with_effect(Effect::PersistStatus)
                    .with_effect(Effect::WakePollers))
            } else {
                // Stale delivery for an earlier exchange; the newer question stays pending
                Ok(TransitionResult::unchanged(ConvStatus::Pending))
            }
        }

        (ConvStatus::Answered, Event::ReplyCompleted { .. }) => {
            Ok(TransitionResult::unchanged(ConvStatus::Answered))
        }

        (_, Event::ReplyCompleted { .. }) => Err(TransitionError::NothingPending),

        // ============================================================
        // Closure
        // ============================================================
        (_, Event::Close) => Ok(TransitionResult::new(ConvStatus::Closed)
            .with_effect(Effect::PersistStatus)
            .with_effect(Effect::WakePollers)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Role;

    fn submit(text: &str) -> Event {
        Event::SubmitMessage {
            content: text.to_string(),
        }
    }

    fn reply(user_message_id: &str, text: &str) -> Event {
        Event::ReplyCompleted {
            user_message_id: user_message_id.to_string(),
            reply: text.to_string(),
        }
    }

    #[test]
    fn test_submit_from_open_goes_pending() {
        let ctx = ConvContext::new("c1", ConvStatus::Open);
        let result = transition(&ctx, submit("hello")).unwrap();

        assert_eq!(result.new_status, ConvStatus::Pending);
        assert_eq!(
            result.effects,
            vec![Effect::persist_user_message("hello"), Effect::PersistStatus]
        );
    }

    #[test]
    fn test_submit_from_answered_goes_pending() {
        let ctx = ConvContext::new("c1", ConvStatus::Answered);
        let result = transition(&ctx, submit("again")).unwrap();
        assert_eq!(result.new_status, ConvStatus::Pending);
    }

    #[test]
    fn test_submit_while_pending_is_rejected() {
        let ctx = ConvContext::new("c1", ConvStatus::Pending).with_unanswered("m1");
        assert_eq!(
            transition(&ctx, submit("too soon")),
            Err(TransitionError::AwaitingReply)
        );
    }

    #[test]
    fn test_reply_answers_pending_message() {
        let ctx = ConvContext::new("c1", ConvStatus::Pending).with_unanswered("m1");
        let result = transition(&ctx, reply("m1", "r1")).unwrap();

        assert_eq!(result.new_status, ConvStatus::Answered);
        match &result.effects[0] {
            Effect::PersistMessage {
                role,
                content,
                reply_to,
            } => {
                assert_eq!(*role, Role::Assistant);
                assert_eq!(content, "r1");
                assert_eq!(reply_to.as_deref(), Some("m1"));
            }
            other => panic!("Expected PersistMessage, got {other:?}"),
        }
        assert!(result.effects.contains(&Effect::WakePollers));
    }

    #[test]
    fn test_duplicate_reply_is_noop() {
        let ctx = ConvContext::new("c1", ConvStatus::Answered);
        let result = transition(&ctx, reply("m1", "r1 again")).unwrap();
        assert_eq!(result.new_status, ConvStatus::Answered);
        assert!(result.is_noop());
    }

    #[test]
    fn test_stale_reply_does_not_answer_newer_message() {
        let ctx = ConvContext::new("c1", ConvStatus::Pending).with_unanswered("m3");
        let result = transition(&ctx, reply("m1", "late")).unwrap();
        assert_eq!(result.new_status, ConvStatus::Pending);
        assert!(result.is_noop());
    }

    #[test]
    fn test_reply_without_pending_message_is_rejected() {
        let ctx = ConvContext::new("c1", ConvStatus::Open);
        assert_eq!(
            transition(&ctx, reply("m1", "r")),
            Err(TransitionError::NothingPending)
        );
    }

    #[test]
    fn test_closed_rejects_everything() {
        let ctx = ConvContext::new("c1", ConvStatus::Closed).with_unanswered("m1");
        for event in [submit("x"), reply("m1", "r"), Event::Close] {
            assert_eq!(transition(&ctx, event), Err(TransitionError::Closed));
        }
    }

    #[test]
    fn test_close_from_any_live_status() {
        for status in [ConvStatus::Open, ConvStatus::Pending, ConvStatus::Answered] {
            let ctx = ConvContext::new("c1", status);
            let result = transition(&ctx, Event::Close).unwrap();
            assert_eq!(result.new_status, ConvStatus::Closed);
            assert!(result.effects.contains(&Effect::PersistStatus));
        }
    }
}
