//! Test fixtures and mock collaborators

use crate::access::AccessGate;
use crate::db::{Conversation, Database, Message, Principal, PrincipalRole};
use crate::dispatch::{JobQueue, QueueError, ReplyJob};
use crate::error::ChatResult;
use crate::llm::LlmError;
use crate::reply::ReplyGenerator;
use async_trait::async_trait;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

pub const ADMIN: &str = "admin-1";
pub const SUPERVISOR: &str = "supervisor-1";
pub const EMPLOYEE: &str = "employee-1";
/// Employee of a group without access to `SCENARIO`
pub const OUTSIDER: &str = "employee-2";

pub const SCENARIO: &str = "scenario-1";
/// Scenario no group has been granted
pub const OTHER_SCENARIO: &str = "scenario-2";
pub const MODEL: &str = "model-1";

pub const SUPPORT_PROMPT: &str = "You are a helpful support agent.";

/// In-memory database with principals, groups, scenarios and one model
pub fn seeded_db() -> Database {
    let db = Database::open_in_memory().unwrap();
    db.create_group("g-support", "support").unwrap();
    db.create_group("g-sales", "sales").unwrap();

    db.create_principal(ADMIN, "Ada", PrincipalRole::Admin, None)
        .unwrap();
    db.create_principal(SUPERVISOR, "Sam", PrincipalRole::Supervisor, Some("g-support"))
        .unwrap();
    db.create_principal(EMPLOYEE, "Eve", PrincipalRole::Employee, Some("g-support"))
        .unwrap();
    db.create_principal(OUTSIDER, "Oscar", PrincipalRole::Employee, Some("g-sales"))
        .unwrap();

    db.create_scenario(
        SCENARIO,
        "support",
        &json!({"prompt": SUPPORT_PROMPT, "llm": {"temperature": 0.2}, "memory": {"window": 10}}),
    )
    .unwrap();
    db.create_scenario(
        OTHER_SCENARIO,
        "internal",
        &json!({"prompt": "", "llm": {}, "memory": {}}),
    )
    .unwrap();
    db.grant_scenario_access("g-support", SCENARIO).unwrap();

    db.create_llm_model(MODEL, "anthropic", "claude-4.5-haiku", &json!({}))
        .unwrap();
    db
}

/// Scripted reply generator. Falls back to a fixed reply once the script
/// runs out.
pub struct MockReplyGenerator {
    script: Mutex<VecDeque<Result<String, LlmError>>>,
    calls: AtomicUsize,
}

impl MockReplyGenerator {
    pub const DEFAULT_REPLY: &'static str = "mock reply";

    pub fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn queue_reply(&self, text: &str) {
        self.script.lock().unwrap().push_back(Ok(text.to_string()));
    }

    pub fn queue_error(&self, error: LlmError) {
        self.script.lock().unwrap().push_back(Err(error));
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReplyGenerator for MockReplyGenerator {
    async fn generate(&self, _: &Conversation, _: &Message) -> Result<String, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(Self::DEFAULT_REPLY.to_string()))
    }
}

/// Queue that rejects every job
pub struct FailingJobQueue;

#[async_trait]
impl JobQueue for FailingJobQueue {
    async fn enqueue(&self, _: ReplyJob) -> Result<(), QueueError> {
        Err(QueueError::Closed)
    }

    async fn consume(&self) -> Option<ReplyJob> {
        None
    }
}

pub struct AllowAllGate;

#[async_trait]
impl AccessGate for AllowAllGate {
    async fn can_view(&self, _: &Principal, _: &Conversation) -> ChatResult<bool> {
        Ok(true)
    }

    async fn can_submit(&self, _: &Principal, _: &str) -> ChatResult<bool> {
        Ok(true)
    }

    async fn can_create_scenario(&self, _: &Principal) -> ChatResult<bool> {
        Ok(true)
    }

    async fn can_modify_scenario(&self, _: &Principal, _: &str) -> ChatResult<bool> {
        Ok(true)
    }
}
