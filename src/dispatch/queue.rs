//! In-process bounded job queue

use super::{JobQueue, QueueError, ReplyJob};
use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};

/// Bounded mpsc channel shared by every worker. Enqueue never waits: a full
/// queue is reported to the submitter instead of stalling the request.
pub struct ChannelJobQueue {
    tx: mpsc::Sender<ReplyJob>,
    rx: Mutex<mpsc::Receiver<ReplyJob>>,
}

impl ChannelJobQueue {
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        Self {
            tx,
            rx: Mutex::new(rx),
        }
    }

    /// Stop accepting jobs. Workers drain what is already queued.
    pub async fn close(&self) {
        self.rx.lock().await.close();
    }
}

#[async_trait]
impl JobQueue for ChannelJobQueue {
    async fn enqueue(&self, job: ReplyJob) -> Result<(), QueueError> {
        self.tx.try_send(job).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => QueueError::Full,
            mpsc::error::TrySendError::Closed(_) => QueueError::Closed,
        })
    }

    async fn consume(&self) -> Option<ReplyJob> {
        self.rx.lock().await.recv().await
    }
}
