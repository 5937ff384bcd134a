//! Bounded wait for an asynchronously produced reply
//!
//! Pollers only do cheap status reads and never enter a conversation's
//! critical section. Between reads they sleep one interval, or less when a
//! committed reply signals the shared `Notify`.

use crate::db::{ConvStatus, Database, Message};
use crate::error::ChatResult;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy)]
pub struct PollConfig {
    pub interval: Duration,
    pub min_timeout: Duration,
    pub max_timeout: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            min_timeout: Duration::from_secs(1),
            max_timeout: Duration::from_secs(60),
        }
    }
}

impl PollConfig {
    /// Clamp a requested timeout into `[min_timeout, max_timeout]`
    pub fn clamp_timeout(&self, requested: Duration) -> Duration {
        requested.max(self.min_timeout).min(self.max_timeout)
    }
}

#[derive(Clone)]
pub struct PollWaiter {
    db: Database,
    replies: Arc<Notify>,
    config: PollConfig,
}

impl PollWaiter {
    pub fn new(db: Database, replies: Arc<Notify>, config: PollConfig) -> Self {
        Self {
            db,
            replies,
            config,
        }
    }

    /// Wait until the conversation is `Answered` and return its latest
    /// assistant message. `None` on timeout, closure or cancellation.
    pub async fn wait_for_reply(
        &self,
        conversation_id: &str,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> ChatResult<Option<Message>> {
        let timeout = self.config.clamp_timeout(timeout);
        let deadline = Instant::now() + timeout;

        loop {
            // Register before reading so a commit between the read and the
            // wait still wakes us
            let notified = self.replies.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            match self.db.get_status(conversation_id)? {
                ConvStatus::Answered => {
                    if let Some(reply) = self.db.latest_assistant_message(conversation_id)? {
                        return Ok(Some(reply));
                    }
                }
                ConvStatus::Closed => {
                    tracing::debug!(conv_id = %conversation_id, "Conversation closed while polling");
                    return Ok(None);
                }
                ConvStatus::Open | ConvStatus::Pending => {}
            }

            let now = Instant::now();
            if now >= deadline {
                tracing::debug!(
                    conv_id = %conversation_id,
                    timeout_secs = timeout.as_secs(),
                    "Poll timed out"
                );
                return Ok(None);
            }
            let wait = self.config.interval.min(deadline - now);

            tokio::select! {
                () = cancel.cancelled() => return Ok(None),
                () = &mut notified => {}
                () = tokio::time::sleep(wait) => {}
            }
        }
    }
}
