//! Reply worker pool

use super::{JobQueue, ReplyJob};
use crate::db::{ConvStatus, Conversation, DbError, Message, Role};
use crate::error::{ChatError, ChatResult};
use crate::lifecycle::{Lifecycle, ReplyOutcome};
use crate::reply::ReplyGenerator;
use crate::state_machine::TransitionError;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_BACKOFF: Duration = Duration::from_secs(5);

/// Bounded retry with a fixed delay between attempts
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff: DEFAULT_BACKOFF,
        }
    }
}

/// What happened to a job
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    /// Reply committed; carries the assistant message id
    Replied(String),
    /// Another delivery already answered it
    Duplicate,
    /// Conversation closed or deleted meanwhile
    Aborted,
    /// Retries exhausted or a permanent failure; conversation stays `Pending`
    GaveUp,
}

pub struct ReplyWorker {
    lifecycle: Arc<Lifecycle>,
    generator: Arc<dyn ReplyGenerator>,
    retry: RetryPolicy,
}

impl ReplyWorker {
    pub fn new(
        lifecycle: Arc<Lifecycle>,
        generator: Arc<dyn ReplyGenerator>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            lifecycle,
            generator,
            retry,
        }
    }

    /// Generate and commit the reply for one job
    pub async fn handle(&self, job: &ReplyJob) -> JobOutcome {
        let (conversation, user_message) = match self.admit(job) {
            Ok(loaded) => loaded,
            Err(outcome) => return outcome,
        };
        let ReplyJob {
            conversation_id,
            user_message_id,
        } = job;
        let db = self.lifecycle.db();

        let mut attempt = 1;
        let reply = loop {
            match self.generator.generate(&conversation, &user_message).await {
                Ok(text) => break text,
                Err(e) if e.is_retryable() && attempt < self.retry.max_attempts => {
                    tracing::warn!(
                        conv_id = %conversation_id,
                        message_id = %user_message_id,
                        attempt,
                        error = %e,
                        "Reply generation failed, retrying"
                    );
                    tokio::time::sleep(self.retry.backoff).await;
                    attempt += 1;
                    // Give up early if the conversation moved on while we slept
                    if !matches!(db.get_status(conversation_id), Ok(ConvStatus::Pending)) {
                        tracing::info!(conv_id = %conversation_id, "Conversation no longer pending, dropping job");
                        return JobOutcome::Aborted;
                    }
                }
                Err(e) => {
                    tracing::error!(
                        conv_id = %conversation_id,
                        message_id = %user_message_id,
                        attempt,
                        retryable = e.is_retryable(),
                        error = %e,
                        "Reply generation gave up, conversation stays pending"
                    );
                    return JobOutcome::GaveUp;
                }
            }
        };

        match self.complete(conversation_id, user_message_id, &reply).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(
                    conv_id = %conversation_id,
                    message_id = %user_message_id,
                    error = %e,
                    "Failed to commit reply"
                );
                JobOutcome::GaveUp
            }
        }
    }

    /// Load the job's conversation and user message, or the outcome that
    /// ends the job before any generator call
    fn admit(&self, job: &ReplyJob) -> Result<(Conversation, Message), JobOutcome> {
        let ReplyJob {
            conversation_id,
            user_message_id,
        } = job;

        let db = self.lifecycle.db();
        let conversation = match db.get_conversation(conversation_id) {
            Ok(conv) => conv,
            Err(DbError::ConversationNotFound(_)) => {
                tracing::info!(conv_id = %conversation_id, "Conversation deleted before reply, dropping job");
                return Err(JobOutcome::Aborted);
            }
            Err(e) => {
                tracing::error!(conv_id = %conversation_id, error = %e, "Failed to load conversation");
                return Err(JobOutcome::GaveUp);
            }
        };
        match conversation.status {
            ConvStatus::Pending => {}
            ConvStatus::Closed => {
                tracing::info!(conv_id = %conversation_id, "Conversation closed before reply, dropping job");
                return Err(JobOutcome::Aborted);
            }
            status => {
                tracing::debug!(conv_id = %conversation_id, status = %status, "Nothing pending, skipping job");
                return Err(JobOutcome::Duplicate);
            }
        }
        let user_message = match db.get_message(user_message_id) {
            Ok(msg) => msg,
            Err(e) => {
                tracing::info!(conv_id = %conversation_id, message_id = %user_message_id, error = %e, "User message gone, dropping job");
                return Err(JobOutcome::Aborted);
            }
        };
        if user_message.conversation_id != *conversation_id || user_message.role != Role::User {
            tracing::warn!(
                conv_id = %conversation_id,
                message_id = %user_message_id,
                role = %user_message.role,
                "Job names a message that is not a user message of this conversation, dropping job"
            );
            return Err(JobOutcome::Aborted);
        }
        // A newer question may be pending; this message was answered already
        match db.unanswered_user_message(conversation_id) {
            Ok(Some(pending)) if pending == *user_message_id => Ok((conversation, user_message)),
            Ok(_) => {
                tracing::debug!(conv_id = %conversation_id, message_id = %user_message_id, "Message already answered, skipping job");
                Err(JobOutcome::Duplicate)
            }
            Err(e) => {
                tracing::error!(conv_id = %conversation_id, error = %e, "Failed to read pending message");
                Err(JobOutcome::GaveUp)
            }
        }
    }

    /// Commit `reply` for `user_message_id`. Closed or deleted conversations
    /// are dropped silently; a busy conversation is retried under the same
    /// policy as generation.
    pub async fn complete(
        &self,
        conversation_id: &str,
        user_message_id: &str,
        reply: &str,
    ) -> ChatResult<JobOutcome> {
        let mut attempt = 1;
        loop {
            match self
                .lifecycle
                .complete_reply(conversation_id, user_message_id, reply)
                .await
            {
                Ok(ReplyOutcome::Committed(message)) => {
                    tracing::info!(
                        conv_id = %conversation_id,
                        message_id = %message.id,
                        order_number = message.order_number,
                        "Reply committed"
                    );
                    return Ok(JobOutcome::Replied(message.id));
                }
                Ok(ReplyOutcome::Duplicate) => return Ok(JobOutcome::Duplicate),
                Err(ChatError::NotFound(_) | ChatError::StateConflict(TransitionError::Closed)) => {
                    tracing::info!(
                        conv_id = %conversation_id,
                        message_id = %user_message_id,
                        "Conversation closed or deleted, discarding reply"
                    );
                    return Ok(JobOutcome::Aborted);
                }
                Err(e) if e.is_retryable() && attempt < self.retry.max_attempts => {
                    tracing::warn!(conv_id = %conversation_id, attempt, error = %e, "Commit busy, retrying");
                    tokio::time::sleep(self.retry.backoff).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Start `count` workers consuming `queue` until `cancel` fires or the queue
/// closes.
pub fn spawn_workers(
    count: usize,
    queue: Arc<dyn JobQueue>,
    worker: Arc<ReplyWorker>,
    cancel: CancellationToken,
) -> Vec<JoinHandle<()>> {
    (0..count.max(1))
        .map(|worker_id| {
            let queue = Arc::clone(&queue);
            let worker = Arc::clone(&worker);
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tracing::info!(worker_id, "Reply worker started");
                loop {
                    let job = tokio::select! {
                        biased;
                        () = cancel.cancelled() => break,
                        job = queue.consume() => match job {
                            Some(job) => job,
                            None => break,
                        },
                    };
                    let outcome = worker.handle(&job).await;
                    tracing::debug!(
                        worker_id,
                        conv_id = %job.conversation_id,
                        outcome = ?outcome,
                        "Reply job finished"
                    );
                }
                tracing::info!(worker_id, "Reply worker stopped");
            })
        })
        .collect()
}
