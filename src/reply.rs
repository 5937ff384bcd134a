//! Reply generation collaborators
//!
//! The worker pool calls a `ReplyGenerator` for every dispatched user
//! message. Retryable failures feed the worker's bounded retry loop.

use crate::db::{Conversation, Database, DbError, Message, Role};
use crate::llm::{LlmError, LlmMessage, LlmRequest, LlmService, ModelRegistry};
use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use std::sync::Arc;

const REPLY_MAX_TOKENS: u32 = 1024;

/// Produces the assistant reply for one user message
#[async_trait]
pub trait ReplyGenerator: Send + Sync {
    async fn generate(
        &self,
        conversation: &Conversation,
        user_message: &Message,
    ) -> Result<String, LlmError>;
}

#[async_trait]
impl<T: ReplyGenerator + ?Sized> ReplyGenerator for Arc<T> {
    async fn generate(
        &self,
        conversation: &Conversation,
        user_message: &Message,
    ) -> Result<String, LlmError> {
        (**self).generate(conversation, user_message).await
    }
}

/// Acknowledges receipt without calling a model
#[derive(Debug, Default, Clone, Copy)]
pub struct AutoReplyGenerator;

#[async_trait]
impl ReplyGenerator for AutoReplyGenerator {
    async fn generate(&self, _: &Conversation, _: &Message) -> Result<String, LlmError> {
        Ok(format!(
            "[auto-reply] received at {}",
            Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
        ))
    }
}

/// Replies through an LLM using the scenario prompt and the conversation
/// history up to the user message.
pub struct LlmReplyGenerator {
    db: Database,
    registry: Arc<ModelRegistry>,
}

impl LlmReplyGenerator {
    pub fn new(db: Database, registry: Arc<ModelRegistry>) -> Self {
        Self { db, registry }
    }

    // Pinned model first, then the scenario's default model, then the
    // registry default
    fn service_for(&self, conversation: &Conversation) -> Result<Arc<dyn LlmService>, LlmError> {
        if let Some(model_id) = &conversation.model {
            if let Some(service) = self.model_service(conversation, model_id, "pinned")? {
                return Ok(service);
            }
        }
        let scenario_default = self
            .db
            .default_scenario_model(&conversation.scenario_id)
            .map_err(|e| storage_error(&e))?;
        if let Some(model_id) = scenario_default {
            if let Some(service) = self.model_service(conversation, &model_id, "scenario default")? {
                return Ok(service);
            }
        }
        self.registry.default().ok_or_else(|| {
            LlmError::invalid_request(format!(
                "No LLM model available (default {})",
                self.registry.default_model_id()
            ))
        })
    }

    // Resolve an llm_models row to a registered service, None when either is gone
    fn model_service(
        &self,
        conversation: &Conversation,
        model_id: &str,
        source: &'static str,
    ) -> Result<Option<Arc<dyn LlmService>>, LlmError> {
        match self.db.get_llm_model(model_id) {
            Ok(model) => {
                let service = self.registry.get(&model.name);
                if service.is_none() {
                    tracing::warn!(
                        conv_id = %conversation.id,
                        model = %model.name,
                        source,
                        "Model not available, falling back"
                    );
                }
                Ok(service)
            }
            Err(DbError::ModelNotFound(_)) => {
                tracing::warn!(conv_id = %conversation.id, model_id = %model_id, source, "Model was removed");
                Ok(None)
            }
            Err(e) => Err(storage_error(&e)),
        }
    }

    fn build_request(
        &self,
        conversation: &Conversation,
        user_message: &Message,
    ) -> Result<LlmRequest, LlmError> {
        let scenario = self
            .db
            .get_scenario(&conversation.scenario_id)
            .map_err(|e| storage_error(&e))?;
        let history = self
            .db
            .get_messages(&conversation.id)
            .map_err(|e| storage_error(&e))?;

        let messages = history
            .into_iter()
            .take_while(|m| m.order_number <= user_message.order_number)
            .map(|m| match m.role {
                Role::User => LlmMessage::user(m.content),
                Role::Assistant => LlmMessage::assistant(m.content),
            })
            .collect();

        Ok(LlmRequest {
            system: scenario.prompt().map(String::from),
            messages,
            max_tokens: Some(REPLY_MAX_TOKENS),
        })
    }
}

// Storage hiccups (busy database) are worth another attempt
fn storage_error(err: &DbError) -> LlmError {
    match err {
        DbError::Sqlite(_) | DbError::Poisoned => LlmError::server_error(format!("storage: {err}")),
        _ => LlmError::invalid_request(err.to_string()),
    }
}

#[async_trait]
impl ReplyGenerator for LlmReplyGenerator {
    async fn generate(
        &self,
        conversation: &Conversation,
        user_message: &Message,
    ) -> Result<String, LlmError> {
        let service = self.service_for(conversation)?;
        let request = self.build_request(conversation, user_message)?;
        let response = service.complete(&request).await?;
        if response.text.trim().is_empty() {
            return Err(LlmError::server_error("Model returned an empty reply"));
        }
        Ok(response.text)
    }
}
