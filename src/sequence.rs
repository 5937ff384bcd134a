//! Per-conversation sequencing
//!
//! `ConversationLocks` is a mutex table keyed by conversation id: holding a
//! `ConversationGuard` is the critical section inside which the current max
//! order number is read and the new message written. Different conversations
//! never contend. Entries are pruned when their last holder lets go.

use crate::db;
use crate::error::{ChatError, ChatResult};
use rusqlite::Connection;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type LockTable = Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>;

/// Default bounded wait before a caller is told the conversation is busy
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Clone)]
pub struct ConversationLocks {
    table: LockTable,
    timeout: Duration,
}

impl ConversationLocks {
    pub fn new(timeout: Duration) -> Self {
        Self {
            table: Arc::new(Mutex::new(HashMap::new())),
            timeout,
        }
    }

    /// Enter the critical section for `conversation_id`.
    ///
    /// Fails with `TransientBusy` if the section is not free within the
    /// configured timeout.
    pub async fn acquire(&self, conversation_id: &str) -> ChatResult<ConversationGuard> {
        let slot = {
            let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(
                table
                    .entry(conversation_id.to_string())
                    .or_insert_with(|| Arc::new(AsyncMutex::new(()))),
            )
        };

        match tokio::time::timeout(self.timeout, Arc::clone(&slot).lock_owned()).await {
            Ok(permit) => Ok(ConversationGuard {
                conversation_id: conversation_id.to_string(),
                permit: Some(permit),
                slot,
                table: Arc::clone(&self.table),
            }),
            Err(_) => {
                tracing::warn!(
                    conv_id = %conversation_id,
                    timeout_ms = %self.timeout.as_millis(),
                    "Timed out waiting for conversation lock"
                );
                prune(&self.table, conversation_id, &slot);
                Err(ChatError::TransientBusy(conversation_id.to_string()))
            }
        }
    }

    #[cfg(test)]
    pub fn tracked(&self) -> usize {
        self.table.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

impl Default for ConversationLocks {
    fn default() -> Self {
        Self::new(DEFAULT_LOCK_TIMEOUT)
    }
}

/// Proof of holding a conversation's critical section. Released on drop.
pub struct ConversationGuard {
    conversation_id: String,
    permit: Option<OwnedMutexGuard<()>>,
    slot: Arc<AsyncMutex<()>>,
    table: LockTable,
}

impl ConversationGuard {
    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }
}

impl Drop for ConversationGuard {
    fn drop(&mut self) {
        // Release before pruning so the strong count reflects only waiters
        drop(self.permit.take());
        prune(&self.table, &self.conversation_id, &self.slot);
    }
}

// Remove the table entry when nobody but the table and the caller holds it.
// Waiters hold their own clone, so they keep the entry alive.
fn prune(table: &LockTable, conversation_id: &str, slot: &Arc<AsyncMutex<()>>) {
    let mut table = table.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(entry) = table.get(conversation_id) {
        if Arc::ptr_eq(entry, slot) && Arc::strong_count(slot) <= 2 {
            table.remove(conversation_id);
        }
    }
}

/// Assigns per-conversation order numbers
#[derive(Debug, Default, Clone, Copy)]
pub struct SequenceAllocator;

impl SequenceAllocator {
    /// Next order number for `conversation_id`: current max plus one.
    ///
    /// Must run inside the caller's transaction while holding the
    /// conversation's guard; the insert that consumes the number has to happen
    /// before the guard is released.
    pub fn allocate(
        self,
        guard: &ConversationGuard,
        conn: &Connection,
        conversation_id: &str,
    ) -> ChatResult<i64> {
        if guard.conversation_id() != conversation_id {
            return Err(ChatError::Internal(format!(
                "allocation for {conversation_id} attempted under the lock of {}",
                guard.conversation_id()
            )));
        }
        Ok(db::next_order_number(conn, conversation_id)?)
    }
}
