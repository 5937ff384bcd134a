//! Caller-facing operations
//!
//! Every operation resolves the target, asks the access gate, and only then
//! enters the state machine. Dispatch happens after the submission commits.

mod paging;

pub use paging::{
    ConversationDetail, ConversationPage, MessagePagination, MessageWindow, PageRequest, Pagination,
};

use crate::access::AccessGate;
use crate::db::{
    Conversation, ConversationFilter, Database, Message, Principal, Scenario, ScenarioModel,
};
use crate::dispatch::ReplyDispatcher;
use crate::error::{ChatError, ChatResult};
use crate::lifecycle::{Lifecycle, Submission};
use crate::poll::PollWaiter;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub const MAX_CONTENT_CHARS: usize = 32_000;
pub const MAX_SCENARIO_NAME_CHARS: usize = 200;

/// Where a submission goes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitTarget {
    /// Existing conversation
    Conversation(String),
    /// New conversation under this scenario
    Scenario(String),
}

pub struct ChatService {
    lifecycle: Arc<Lifecycle>,
    dispatcher: ReplyDispatcher,
    poller: PollWaiter,
    gate: Arc<dyn AccessGate>,
}

impl ChatService {
    pub fn new(
        lifecycle: Arc<Lifecycle>,
        dispatcher: ReplyDispatcher,
        poller: PollWaiter,
        gate: Arc<dyn AccessGate>,
    ) -> Self {
        Self {
            lifecycle,
            dispatcher,
            poller,
            gate,
        }
    }

    fn db(&self) -> &Database {
        self.lifecycle.db()
    }

    /// Submit user input. On `ServiceUnavailable` the message and the
    /// `Pending` status are already committed.
    pub async fn submit(
        &self,
        principal: &Principal,
        target: SubmitTarget,
        content: &str,
        llm_model_id: Option<&str>,
    ) -> ChatResult<Submission> {
        let content = validate_content(content)?;
        if let Some(model_id) = llm_model_id {
            self.db().get_llm_model(model_id)?;
        }

        let submission = match target {
            SubmitTarget::Scenario(scenario_id) => {
                self.db().get_scenario(&scenario_id)?;
                self.require_submit(principal, &scenario_id).await?;
                self.lifecycle
                    .start_conversation(&principal.id, &scenario_id, content, llm_model_id)
                    .await?
            }
            SubmitTarget::Conversation(conversation_id) => {
                let conversation = self.visible_conversation(principal, &conversation_id).await?;
                self.require_submit(principal, &conversation.scenario_id).await?;
                self.lifecycle
                    .submit_message(&conversation_id, content, llm_model_id)
                    .await?
            }
        };

        tracing::info!(
            conv_id = %submission.conversation.id,
            message_id = %submission.message.id,
            order_number = submission.message.order_number,
            principal = %principal.id,
            "Message submitted"
        );

        self.dispatcher
            .dispatch(&submission.conversation.id, &submission.message.id)
            .await?;
        Ok(submission)
    }

    /// Wait up to `timeout` (clamped) for the conversation's reply
    pub async fn poll(
        &self,
        principal: &Principal,
        conversation_id: &str,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> ChatResult<Option<Message>> {
        self.visible_conversation(principal, conversation_id).await?;
        self.poller
            .wait_for_reply(conversation_id, timeout, cancel)
            .await
    }

    pub async fn close(&self, principal: &Principal, conversation_id: &str) -> ChatResult<Conversation> {
        self.visible_conversation(principal, conversation_id).await?;
        let conversation = self.lifecycle.close(conversation_id).await?;
        tracing::info!(conv_id = %conversation_id, principal = %principal.id, "Conversation closed");
        Ok(conversation)
    }

    /// One page of the conversations visible to `principal`. Visibility is
    /// applied before paging so totals count only what the caller may see.
    pub async fn list(
        &self,
        principal: &Principal,
        filter: &ConversationFilter,
        page: PageRequest,
    ) -> ChatResult<ConversationPage> {
        let mut visible = Vec::new();
        for conversation in self.db().list_conversations(filter)? {
            if self.gate.can_view(principal, &conversation).await? {
                visible.push(conversation);
            }
        }
        let (conversations, pagination) = page.apply(visible)?;
        Ok(ConversationPage {
            conversations,
            pagination,
        })
    }

    /// The conversation, plus a window of its messages unless `window` is None
    pub async fn get(
        &self,
        principal: &Principal,
        conversation_id: &str,
        window: Option<MessageWindow>,
    ) -> ChatResult<ConversationDetail> {
        let conversation = self.visible_conversation(principal, conversation_id).await?;
        let Some(window) = window else {
            return Ok(ConversationDetail {
                conversation,
                messages: None,
            });
        };

        let messages = self
            .db()
            .get_messages_page(conversation_id, window.limit, window.offset)?;
        let total_count = usize::try_from(conversation.message_count).unwrap_or_default();
        let pagination = MessagePagination {
            offset: window.offset,
            limit: window.limit,
            total_count,
            has_more: window.offset + messages.len() < total_count,
        };
        Ok(ConversationDetail {
            conversation,
            messages: Some((messages, pagination)),
        })
    }

    /// Remove a conversation and its messages. In-flight replies for it are
    /// discarded by the worker.
    pub async fn delete(&self, principal: &Principal, conversation_id: &str) -> ChatResult<usize> {
        self.visible_conversation(principal, conversation_id).await?;
        let removed = self.db().delete_conversation(conversation_id)?;
        tracing::info!(
            conv_id = %conversation_id,
            principal = %principal.id,
            messages = removed,
            "Conversation deleted"
        );
        Ok(removed)
    }

    /// Create a scenario; `id` defaults to a fresh UUID
    pub async fn create_scenario(
        &self,
        principal: &Principal,
        id: Option<&str>,
        name: &str,
        config: &Value,
    ) -> ChatResult<Scenario> {
        if !self.gate.can_create_scenario(principal).await? {
            return Err(ChatError::Forbidden("only admins create scenarios".to_string()));
        }
        let name = name.trim();
        if name.is_empty() || name.chars().count() > MAX_SCENARIO_NAME_CHARS {
            return Err(ChatError::Validation(format!(
                "name must be 1 to {MAX_SCENARIO_NAME_CHARS} characters"
            )));
        }
        let id = match id.map(str::trim) {
            Some("") => return Err(ChatError::Validation("id must not be empty".to_string())),
            Some(id) => id.to_string(),
            None => uuid::Uuid::new_v4().to_string(),
        };

        let scenario = self.db().create_scenario(&id, name, config)?;
        tracing::info!(scenario_id = %scenario.id, name = %scenario.name, principal = %principal.id, "Scenario created");
        Ok(scenario)
    }

    /// Make `llm_model_id` the scenario's default model
    pub async fn set_scenario_model(
        &self,
        principal: &Principal,
        scenario_id: &str,
        llm_model_id: &str,
    ) -> ChatResult<(Scenario, ScenarioModel)> {
        let scenario = self.db().get_scenario(scenario_id)?;
        if !self.gate.can_modify_scenario(principal, scenario_id).await? {
            return Err(ChatError::Forbidden(format!("no access to scenario {scenario_id}")));
        }
        self.db().get_llm_model(llm_model_id)?;
        self.db().set_default_scenario_model(scenario_id, llm_model_id)?;

        let model = self
            .db()
            .scenario_models(scenario_id)?
            .into_iter()
            .find(|m| m.id == llm_model_id)
            .ok_or_else(|| ChatError::Internal(format!("model {llm_model_id} not bound after update")))?;
        tracing::info!(
            scenario_id = %scenario_id,
            model_id = %llm_model_id,
            principal = %principal.id,
            "Scenario default model changed"
        );
        Ok((scenario, model))
    }

    /// Models bound to the scenario, default first
    pub fn scenario_models(&self, scenario_id: &str) -> ChatResult<(Scenario, Vec<ScenarioModel>)> {
        let scenario = self.db().get_scenario(scenario_id)?;
        let models = self.db().scenario_models(scenario_id)?;
        Ok((scenario, models))
    }

    async fn visible_conversation(
        &self,
        principal: &Principal,
        conversation_id: &str,
    ) -> ChatResult<Conversation> {
        let conversation = self.db().get_conversation(conversation_id)?;
        if !self.gate.can_view(principal, &conversation).await? {
            return Err(ChatError::Forbidden(format!(
                "no access to conversation {conversation_id}"
            )));
        }
        Ok(conversation)
    }

    async fn require_submit(&self, principal: &Principal, scenario_id: &str) -> ChatResult<()> {
        if self.gate.can_submit(principal, scenario_id).await? {
            Ok(())
        } else {
            Err(ChatError::Forbidden(format!("no access to scenario {scenario_id}")))
        }
    }
}

/// Trimmed content, rejected when empty or longer than `MAX_CONTENT_CHARS`
pub fn validate_content(content: &str) -> ChatResult<&str> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Err(ChatError::Validation("content must not be empty".to_string()));
    }
    if trimmed.chars().count() > MAX_CONTENT_CHARS {
        return Err(ChatError::Validation(format!(
            "content exceeds {MAX_CONTENT_CHARS} characters"
        )));
    }
    Ok(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::RoleAccessGate;
    use crate::db::{ConvStatus, Role};
    use crate::dispatch::{ChannelJobQueue, JobQueue, ReplyJob};
    use crate::poll::PollConfig;
    use crate::sequence::ConversationLocks;
    use crate::state_machine::TransitionError;
    use crate::testing::{
        seeded_db, AllowAllGate, FailingJobQueue, ADMIN, EMPLOYEE, MODEL, OTHER_SCENARIO, OUTSIDER,
        SCENARIO, SUPERVISOR,
    };

    struct Fixture {
        service: ChatService,
        lifecycle: Arc<Lifecycle>,
        queue: Arc<ChannelJobQueue>,
    }

    fn fixture_with(queue: Arc<dyn JobQueue>, gate: Option<Arc<dyn AccessGate>>) -> (ChatService, Arc<Lifecycle>) {
        let db = seeded_db();
        let lifecycle = Arc::new(Lifecycle::new(db.clone(), ConversationLocks::default()));
        let poller = PollWaiter::new(
            db.clone(),
            lifecycle.reply_signal(),
            PollConfig {
                interval: Duration::from_millis(10),
                min_timeout: Duration::from_millis(20),
                max_timeout: Duration::from_secs(1),
            },
        );
        let gate: Arc<dyn AccessGate> = match gate {
            Some(gate) => gate,
            None => Arc::new(RoleAccessGate::new(db)),
        };
        let service = ChatService::new(
            Arc::clone(&lifecycle),
            ReplyDispatcher::new(queue),
            poller,
            gate,
        );
        (service, lifecycle)
    }

    fn fixture() -> Fixture {
        let queue = Arc::new(ChannelJobQueue::new(16));
        let (service, lifecycle) = fixture_with(queue.clone(), None);
        Fixture {
            service,
            lifecycle,
            queue,
        }
    }

    fn principal(fx: &Fixture, id: &str) -> Principal {
        fx.lifecycle.db().get_principal(id).unwrap()
    }

    #[tokio::test]
    async fn test_submit_new_conversation_enqueues_job() {
        let fx = fixture();
        let employee = principal(&fx, EMPLOYEE);

        let sub = fx
            .service
            .submit(&employee, SubmitTarget::Scenario(SCENARIO.into()), "  hello  ", None)
            .await
            .unwrap();
        assert_eq!(sub.message.content, "hello");
        assert_eq!(sub.conversation.principal_id, EMPLOYEE);
        assert_eq!(sub.conversation.title, "hello");
        assert_eq!(
            fx.queue.consume().await,
            Some(ReplyJob {
                conversation_id: sub.conversation.id.clone(),
                user_message_id: sub.message.id.clone(),
            })
        );
    }

    #[tokio::test]
    async fn test_validation_happens_before_writes() {
        let fx = fixture();
        let admin = principal(&fx, ADMIN);

        let empty = fx
            .service
            .submit(&admin, SubmitTarget::Scenario(SCENARIO.into()), "   ", None)
            .await;
        assert!(matches!(empty, Err(ChatError::Validation(_))));

        let long = "x".repeat(MAX_CONTENT_CHARS + 1);
        let too_long = fx
            .service
            .submit(&admin, SubmitTarget::Scenario(SCENARIO.into()), &long, None)
            .await;
        assert!(matches!(too_long, Err(ChatError::Validation(_))));

        let bad_model = fx
            .service
            .submit(&admin, SubmitTarget::Scenario(SCENARIO.into()), "hi", Some("nope"))
            .await;
        assert!(matches!(bad_model, Err(ChatError::NotFound(_))));

        let bad_scenario = fx
            .service
            .submit(&admin, SubmitTarget::Scenario("nope".into()), "hi", None)
            .await;
        assert!(matches!(bad_scenario, Err(ChatError::NotFound(_))));

        let all = fx
            .service
            .list(&admin, &ConversationFilter::default(), PageRequest::default())
            .await
            .unwrap();
        assert!(all.conversations.is_empty());
        assert_eq!(all.pagination.total_count, 0);
    }

    #[tokio::test]
    async fn test_model_is_pinned_on_conversation() {
        let fx = fixture();
        let admin = principal(&fx, ADMIN);
        let sub = fx
            .service
            .submit(&admin, SubmitTarget::Scenario(SCENARIO.into()), "hi", Some(MODEL))
            .await
            .unwrap();
        assert_eq!(sub.conversation.model.as_deref(), Some(MODEL));
    }

    #[tokio::test]
    async fn test_gate_refusal_is_forbidden_without_writes() {
        let fx = fixture();
        let employee = principal(&fx, EMPLOYEE);
        let outsider = principal(&fx, OUTSIDER);

        let denied = fx
            .service
            .submit(&employee, SubmitTarget::Scenario(OTHER_SCENARIO.into()), "hi", None)
            .await;
        assert!(matches!(denied, Err(ChatError::Forbidden(_))));

        let sub = fx
            .service
            .submit(&employee, SubmitTarget::Scenario(SCENARIO.into()), "hi", None)
            .await
            .unwrap();
        let conv_id = sub.conversation.id;
        fx.lifecycle
            .complete_reply(&conv_id, &sub.message.id, "r1")
            .await
            .unwrap();

        let intruder = fx
            .service
            .submit(&outsider, SubmitTarget::Conversation(conv_id.clone()), "hi", None)
            .await;
        assert!(matches!(intruder, Err(ChatError::Forbidden(_))));
        assert_eq!(fx.lifecycle.db().message_count(&conv_id).unwrap(), 2);

        let poll = fx
            .service
            .poll(&outsider, &conv_id, Duration::from_secs(1), &CancellationToken::new())
            .await;
        assert!(matches!(poll, Err(ChatError::Forbidden(_))));
        assert!(fx.service.close(&outsider, &conv_id).await.is_err());
        assert!(fx.service.delete(&outsider, &conv_id).await.is_err());
    }

    #[tokio::test]
    async fn test_submit_to_pending_conversation_conflicts() {
        let fx = fixture();
        let admin = principal(&fx, ADMIN);
        let sub = fx
            .service
            .submit(&admin, SubmitTarget::Scenario(SCENARIO.into()), "a", None)
            .await
            .unwrap();

        let err = fx
            .service
            .submit(&admin, SubmitTarget::Conversation(sub.conversation.id.clone()), "b", None)
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::StateConflict(TransitionError::AwaitingReply)));

        let missing = fx
            .service
            .submit(&admin, SubmitTarget::Conversation("missing".into()), "b", None)
            .await;
        assert!(matches!(missing, Err(ChatError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_dispatch_failure_keeps_submission() {
        let (service, lifecycle) = fixture_with(Arc::new(FailingJobQueue), Some(Arc::new(AllowAllGate)));
        let admin = lifecycle.db().get_principal(ADMIN).unwrap();

        let err = service
            .submit(&admin, SubmitTarget::Scenario(SCENARIO.into()), "hello", None)
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::ServiceUnavailable(_)));

        let listed = service
            .list(&admin, &ConversationFilter::default(), PageRequest::default())
            .await
            .unwrap();
        assert_eq!(listed.conversations.len(), 1);
        assert_eq!(listed.conversations[0].status, ConvStatus::Pending);
        let detail = service
            .get(&admin, &listed.conversations[0].id, Some(MessageWindow::default()))
            .await
            .unwrap();
        let (messages, _) = detail.messages.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].role, Role::User);
        assert_eq!(messages[0].content, "hello");
    }

    #[tokio::test]
    async fn test_poll_returns_reply_and_list_filters_visibility() {
        let fx = fixture();
        let employee = principal(&fx, EMPLOYEE);
        let outsider = principal(&fx, OUTSIDER);
        let admin = principal(&fx, ADMIN);

        let sub = fx
            .service
            .submit(&employee, SubmitTarget::Scenario(SCENARIO.into()), "a", None)
            .await
            .unwrap();
        let conv_id = sub.conversation.id.clone();

        let none = fx
            .service
            .poll(&employee, &conv_id, Duration::ZERO, &CancellationToken::new())
            .await
            .unwrap();
        assert!(none.is_none());

        fx.lifecycle
            .complete_reply(&conv_id, &sub.message.id, "r1")
            .await
            .unwrap();
        let reply = fx
            .service
            .poll(&employee, &conv_id, Duration::from_secs(1), &CancellationToken::new())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reply.content, "r1");

        let filter = ConversationFilter {
            status: Some(ConvStatus::Answered),
            ..ConversationFilter::default()
        };
        let visible = |page: ConversationPage| page.conversations.len();
        let page = PageRequest::default();
        assert_eq!(visible(fx.service.list(&employee, &filter, page).await.unwrap()), 1);
        assert_eq!(visible(fx.service.list(&outsider, &filter, page).await.unwrap()), 0);
        assert_eq!(visible(fx.service.list(&admin, &filter, page).await.unwrap()), 1);
    }

    #[tokio::test]
    async fn test_close_and_delete() {
        let fx = fixture();
        let admin = principal(&fx, ADMIN);
        let sub = fx
            .service
            .submit(&admin, SubmitTarget::Scenario(SCENARIO.into()), "a", None)
            .await
            .unwrap();
        let conv_id = sub.conversation.id;

        let closed = fx.service.close(&admin, &conv_id).await.unwrap();
        assert_eq!(closed.status, ConvStatus::Closed);
        let again = fx.service.close(&admin, &conv_id).await;
        assert!(matches!(again, Err(ChatError::StateConflict(TransitionError::Closed))));

        assert_eq!(fx.service.delete(&admin, &conv_id).await.unwrap(), 1);
        assert!(matches!(
            fx.service.get(&admin, &conv_id, None).await,
            Err(ChatError::NotFound(_))
        ));
    }

    // `turns` answered exchanges, two messages each
    async fn conversation_with_turns(fx: &Fixture, principal: &Principal, turns: usize) -> String {
        let first = fx
            .service
            .submit(principal, SubmitTarget::Scenario(SCENARIO.into()), "q0", None)
            .await
            .unwrap();
        let conv_id = first.conversation.id.clone();
        let mut message_id = first.message.id;
        for turn in 0..turns {
            fx.lifecycle
                .complete_reply(&conv_id, &message_id, &format!("a{turn}"))
                .await
                .unwrap();
            if turn + 1 < turns {
                let next = fx
                    .service
                    .submit(
                        principal,
                        SubmitTarget::Conversation(conv_id.clone()),
                        &format!("q{}", turn + 1),
                        None,
                    )
                    .await
                    .unwrap();
                message_id = next.message.id;
            }
        }
        conv_id
    }

    #[tokio::test]
    async fn test_get_windows_messages() {
        let fx = fixture();
        let admin = principal(&fx, ADMIN);
        let conv_id = conversation_with_turns(&fx, &admin, 3).await;

        let detail = fx
            .service
            .get(&admin, &conv_id, Some(MessageWindow { limit: 2, offset: 1 }))
            .await
            .unwrap();
        let (messages, pagination) = detail.messages.unwrap();
        let contents: Vec<_> = messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, ["a0", "q1"]);
        assert_eq!(
            pagination,
            MessagePagination {
                offset: 1,
                limit: 2,
                total_count: 6,
                has_more: true
            }
        );

        let tail = fx
            .service
            .get(&admin, &conv_id, Some(MessageWindow { limit: 10, offset: 4 }))
            .await
            .unwrap();
        let (messages, pagination) = tail.messages.unwrap();
        assert_eq!(messages.len(), 2);
        assert!(!pagination.has_more);

        let bare = fx.service.get(&admin, &conv_id, None).await.unwrap();
        assert!(bare.messages.is_none());
        assert_eq!(bare.conversation.message_count, 6);
    }

    #[tokio::test]
    async fn test_list_pages_after_visibility() {
        let fx = fixture();
        let employee = principal(&fx, EMPLOYEE);
        let outsider = principal(&fx, OUTSIDER);
        let admin = principal(&fx, ADMIN);

        // Admin-owned conversations are invisible to the employee
        for _ in 0..3 {
            fx.service
                .submit(&admin, SubmitTarget::Scenario(SCENARIO.into()), "admin", None)
                .await
                .unwrap();
        }
        for _ in 0..3 {
            fx.service
                .submit(&employee, SubmitTarget::Scenario(SCENARIO.into()), "mine", None)
                .await
                .unwrap();
        }

        let filter = ConversationFilter::default();
        let first = fx
            .service
            .list(&employee, &filter, PageRequest { page: 1, page_size: 2 })
            .await
            .unwrap();
        assert_eq!(first.conversations.len(), 2);
        assert_eq!(
            first.pagination,
            Pagination {
                current_page: 1,
                page_size: 2,
                total_pages: 2,
                total_count: 3
            }
        );
        assert!(first.conversations.iter().all(|c| c.principal_id == EMPLOYEE));

        let second = fx
            .service
            .list(&employee, &filter, PageRequest { page: 2, page_size: 2 })
            .await
            .unwrap();
        assert_eq!(second.conversations.len(), 1);

        let past = fx
            .service
            .list(&employee, &filter, PageRequest { page: 3, page_size: 2 })
            .await;
        assert!(matches!(past, Err(ChatError::NotFound(_))));

        let none = fx
            .service
            .list(&outsider, &filter, PageRequest::default())
            .await
            .unwrap();
        assert!(none.conversations.is_empty());
        assert_eq!(none.pagination.total_pages, 1);
    }

    #[tokio::test]
    async fn test_scenario_management() {
        let fx = fixture();
        let admin = principal(&fx, ADMIN);
        let supervisor = principal(&fx, SUPERVISOR);
        let employee = principal(&fx, EMPLOYEE);
        let config = serde_json::json!({"prompt": "p", "llm": {}, "memory": {}});

        let denied = fx
            .service
            .create_scenario(&supervisor, None, "faq", &config)
            .await;
        assert!(matches!(denied, Err(ChatError::Forbidden(_))));

        let created = fx
            .service
            .create_scenario(&admin, None, "  faq  ", &config)
            .await
            .unwrap();
        assert_eq!(created.name, "faq");
        assert!(uuid::Uuid::parse_str(&created.id).is_ok());

        let duplicate = fx
            .service
            .create_scenario(&admin, Some(created.id.as_str()), "faq", &config)
            .await;
        assert!(matches!(duplicate, Err(ChatError::Validation(_))));
        let blank = fx.service.create_scenario(&admin, None, "  ", &config).await;
        assert!(matches!(blank, Err(ChatError::Validation(_))));

        // Supervisor may rebind only scenarios granted to the group
        let (_, model) = fx
            .service
            .set_scenario_model(&supervisor, SCENARIO, MODEL)
            .await
            .unwrap();
        assert!(model.is_default);
        let other = fx
            .service
            .set_scenario_model(&supervisor, OTHER_SCENARIO, MODEL)
            .await;
        assert!(matches!(other, Err(ChatError::Forbidden(_))));
        let by_employee = fx.service.set_scenario_model(&employee, SCENARIO, MODEL).await;
        assert!(matches!(by_employee, Err(ChatError::Forbidden(_))));
        let missing_model = fx.service.set_scenario_model(&admin, SCENARIO, "nope").await;
        assert!(matches!(missing_model, Err(ChatError::NotFound(_))));
        let missing_scenario = fx.service.set_scenario_model(&admin, "nope", MODEL).await;
        assert!(matches!(missing_scenario, Err(ChatError::NotFound(_))));

        let (scenario, models) = fx.service.scenario_models(SCENARIO).unwrap();
        assert_eq!(scenario.id, SCENARIO);
        assert_eq!(models.len(), 1);
        assert_eq!(models[0].id, MODEL);
        assert!(models[0].is_default);
    }

    #[test]
    fn test_validate_content_counts_chars() {
        let exact = "é".repeat(MAX_CONTENT_CHARS);
        assert!(validate_content(&exact).is_ok());
        assert_eq!(validate_content("\n hi \t").unwrap(), "hi");
    }
}
