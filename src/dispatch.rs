//! Hand-off from the request path to the reply worker pool
//!
//! `ReplyDispatcher::dispatch` runs after the submission has committed and
//! only reports whether the enqueue worked. Delivery to workers is
//! at-least-once; the worker side relies on idempotent completion.

mod queue;
mod worker;

pub use queue::ChannelJobQueue;
pub use worker::{spawn_workers, ReplyWorker, RetryPolicy};

use crate::error::{ChatError, ChatResult, UnscheduledReply};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// A committed user message awaiting its reply
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyJob {
    pub conversation_id: String,
    pub user_message_id: String,
}

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("job queue is full")]
    Full,
    #[error("job queue is closed")]
    Closed,
}

/// Transport between the dispatcher and the workers
#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue(&self, job: ReplyJob) -> Result<(), QueueError>;

    /// Next job, or `None` once the queue is closed and drained
    async fn consume(&self) -> Option<ReplyJob>;
}

#[async_trait]
impl<T: JobQueue + ?Sized> JobQueue for Arc<T> {
    async fn enqueue(&self, job: ReplyJob) -> Result<(), QueueError> {
        (**self).enqueue(job).await
    }

    async fn consume(&self) -> Option<ReplyJob> {
        (**self).consume().await
    }
}

#[derive(Clone)]
pub struct ReplyDispatcher {
    queue: Arc<dyn JobQueue>,
}

impl ReplyDispatcher {
    pub fn new(queue: Arc<dyn JobQueue>) -> Self {
        Self { queue }
    }

    /// Enqueue reply generation for a committed user message. A failure here
    /// does not undo the submission.
    pub async fn dispatch(&self, conversation_id: &str, user_message_id: &str) -> ChatResult<()> {
        let job = ReplyJob {
            conversation_id: conversation_id.to_string(),
            user_message_id: user_message_id.to_string(),
        };
        match self.queue.enqueue(job).await {
            Ok(()) => {
                tracing::debug!(
                    conv_id = %conversation_id,
                    message_id = %user_message_id,
                    "Reply job enqueued"
                );
                Ok(())
            }
            Err(e) => {
                tracing::error!(
                    conv_id = %conversation_id,
                    message_id = %user_message_id,
                    error = %e,
                    "Failed to enqueue reply job"
                );
                Err(ChatError::ServiceUnavailable(UnscheduledReply {
                    conversation_id: conversation_id.to_string(),
                    message_id: user_message_id.to_string(),
                    reason: e.to_string(),
                }))
            }
        }
    }
}
