//! Applies state machine transitions atomically
//!
//! Every entry point takes the conversation's critical section, reads a
//! snapshot, runs the pure `transition`, and applies its effects inside one
//! SQLite transaction. Either the message, its order number and the new
//! status are all committed, or none of them are.

use crate::db::{self, Conversation, Database, Message};
use crate::error::{ChatError, ChatResult};
use crate::sequence::{ConversationLocks, SequenceAllocator};
use crate::state_machine::{transition, ConvContext, ConvStatus, Effect, Event, TransitionResult};
use chrono::Utc;
use rusqlite::Transaction;
use std::sync::Arc;
use tokio::sync::Notify;

const MAX_TITLE_LENGTH: usize = 60;

/// A committed user submission
#[derive(Debug, Clone)]
pub struct Submission {
    pub conversation: Conversation,
    pub message: Message,
}

/// Outcome of `complete_reply`
#[derive(Debug, Clone)]
pub enum ReplyOutcome {
    /// The reply was stored and the conversation is now `Answered`
    Committed(Message),
    /// Already answered (or superseded); nothing written
    Duplicate,
}

struct Applied {
    result: TransitionResult,
    persisted: Vec<Message>,
    conversation: Conversation,
}

pub struct Lifecycle {
    db: Database,
    locks: ConversationLocks,
    allocator: SequenceAllocator,
    replies: Arc<Notify>,
}

impl Lifecycle {
    pub fn new(db: Database, locks: ConversationLocks) -> Self {
        Self {
            db,
            locks,
            allocator: SequenceAllocator,
            replies: Arc::new(Notify::new()),
        }
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    /// Signalled after every committed reply or closure
    pub fn reply_signal(&self) -> Arc<Notify> {
        Arc::clone(&self.replies)
    }

    /// Create a conversation for `principal_id` and submit its first message
    /// in the same atomic unit.
    pub async fn start_conversation(
        &self,
        principal_id: &str,
        scenario_id: &str,
        content: &str,
        model: Option<&str>,
    ) -> ChatResult<Submission> {
        let conversation_id = uuid::Uuid::new_v4().to_string();
        let title = derive_title(content);
        let applied = self
            .apply(
                &conversation_id,
                Event::SubmitMessage {
                    content: content.to_string(),
                },
                |tx| {
                    db::insert_conversation(
                        tx,
                        &conversation_id,
                        principal_id,
                        scenario_id,
                        &title,
                        model,
                        Utc::now(),
                    )?;
                    Ok(())
                },
            )
            .await?;
        into_submission(applied)
    }

    /// Submit a user message to an existing conversation. Rejected with a
    /// state conflict unless the conversation is `Open` or `Answered`.
    pub async fn submit_message(
        &self,
        conversation_id: &str,
        content: &str,
        model: Option<&str>,
    ) -> ChatResult<Submission> {
        let applied = self
            .apply(
                conversation_id,
                Event::SubmitMessage {
                    content: content.to_string(),
                },
                |tx| {
                    if let Some(model) = model {
                        db::set_conversation_model(tx, conversation_id, model)?;
                    }
                    Ok(())
                },
            )
            .await?;
        into_submission(applied)
    }

    /// Store the reply for `user_message_id` and mark the conversation
    /// `Answered`. Safe to call repeatedly for the same pair.
    pub async fn complete_reply(
        &self,
        conversation_id: &str,
        user_message_id: &str,
        reply: &str,
    ) -> ChatResult<ReplyOutcome> {
        let applied = self
            .apply(
                conversation_id,
                Event::ReplyCompleted {
                    user_message_id: user_message_id.to_string(),
                    reply: reply.to_string(),
                },
                |_| Ok(()),
            )
            .await?;

        Ok(match applied.persisted.into_iter().next() {
            Some(message) => ReplyOutcome::Committed(message),
            None => ReplyOutcome::Duplicate,
        })
    }

    /// Terminal transition
    pub async fn close(&self, conversation_id: &str) -> ChatResult<Conversation> {
        let applied = self.apply(conversation_id, Event::Close, |_| Ok(())).await?;
        Ok(applied.conversation)
    }

    async fn apply(
        &self,
        conversation_id: &str,
        event: Event,
        prepare: impl FnOnce(&Transaction<'_>) -> ChatResult<()>,
    ) -> ChatResult<Applied> {
        let event_name = event.name();
        let guard = self.locks.acquire(conversation_id).await?;

        let applied = self.db.with_transaction(|tx| {
            prepare(tx)?;

            let conversation = db::load_conversation(tx, conversation_id)?;
            let mut context = ConvContext::new(conversation_id, conversation.status);
            if conversation.status == ConvStatus::Pending {
                context.unanswered_message_id = db::unanswered_user_message(tx, conversation_id)?;
            }

            let result = transition(&context, event).inspect_err(|e| {
                tracing::debug!(
                    conv_id = %conversation_id,
                    event = event_name,
                    status = %conversation.status,
                    error = %e,
                    "Transition rejected"
                );
            })?;

            let now = Utc::now();
            let mut persisted = Vec::new();
            for effect in &result.effects {
                match effect {
                    Effect::PersistMessage {
                        role,
                        content,
                        reply_to,
                    } => {
                        let order_number =
                            self.allocator.allocate(&guard, tx, conversation_id)?;
                        let message = Message {
                            id: uuid::Uuid::new_v4().to_string(),
                            conversation_id: conversation_id.to_string(),
                            role: *role,
                            content: content.clone(),
                            order_number,
                            reply_to: reply_to.clone(),
                            created_at: now,
                        };
                        db::insert_message(tx, &message)?;
                        persisted.push(message);
                    }
                    Effect::PersistStatus => {
                        db::update_status(tx, conversation_id, result.new_status, now)?;
                    }
                    Effect::WakePollers => {}
                }
            }

            let conversation = if result.is_noop() {
                conversation
            } else {
                db::load_conversation(tx, conversation_id)?
            };

            Ok::<_, ChatError>(Applied {
                result,
                persisted,
                conversation,
            })
        })?;
        drop(guard);

        if applied.result.effects.contains(&Effect::WakePollers) {
            self.replies.notify_waiters();
        }

        if applied.result.is_noop() {
            tracing::info!(
                conv_id = %conversation_id,
                event = event_name,
                status = %applied.result.new_status,
                "Transition was a no-op"
            );
        } else {
            tracing::info!(
                conv_id = %conversation_id,
                event = event_name,
                status = %applied.result.new_status,
                messages = applied.persisted.len(),
                "Transition committed"
            );
        }

        Ok(applied)
    }
}

fn into_submission(applied: Applied) -> ChatResult<Submission> {
    let message = applied
        .persisted
        .into_iter()
        .next()
        .ok_or_else(|| ChatError::Internal("submission persisted no message".to_string()))?;
    Ok(Submission {
        conversation: applied.conversation,
        message,
    })
}

/// First line of the opening message, cut at a char boundary
fn derive_title(content: &str) -> String {
    let first_line = content.lines().next().unwrap_or_default().trim();
    if first_line.chars().count() <= MAX_TITLE_LENGTH {
        first_line.to_string()
    } else {
        let cut: String = first_line.chars().take(MAX_TITLE_LENGTH - 3).collect();
        format!("{}...", cut.trim_end())
    }
}
