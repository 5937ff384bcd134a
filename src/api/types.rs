//! API request and response types

use crate::db::{ConvStatus, Conversation, ConversationFilter, Message, Scenario, ScenarioModel};
use crate::error::{ChatError, ChatResult};
use crate::service::{MessagePagination, MessageWindow, PageRequest, Pagination};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Submit to an existing conversation (`conversation_id`, alias `session_id`)
/// or start one under `scenario_id`
#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    pub content: String,
    #[serde(default, alias = "session_id")]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub scenario_id: Option<String>,
    #[serde(default)]
    pub llm_model_id: Option<String>,
}

/// Submit to the conversation named in the path
#[derive(Debug, Deserialize)]
pub struct MessageRequest {
    pub content: String,
    #[serde(default)]
    pub llm_model_id: Option<String>,
}

/// Listing filters and paging. Kept as strings so malformed values come
/// back as JSON 400s.
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub status: Option<String>,
    pub scenario_id: Option<String>,
    pub page: Option<String>,
    pub page_size: Option<String>,
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
}

impl ListQuery {
    pub fn filter(&self) -> ChatResult<ConversationFilter> {
        Ok(ConversationFilter {
            status: parse_opt::<ConvStatus>(self.status.as_deref())?,
            scenario_id: self.scenario_id.clone(),
            sort_by: parse_opt(self.sort_by.as_deref())?.unwrap_or_default(),
            sort_order: parse_opt(self.sort_order.as_deref())?.unwrap_or_default(),
        })
    }

    pub fn page(&self) -> ChatResult<PageRequest> {
        PageRequest::new(
            parse_int("page", self.page.as_deref())?,
            parse_int("page_size", self.page_size.as_deref())?,
        )
    }
}

/// Retrieval options; messages are included unless `include_messages=false`
#[derive(Debug, Default, Deserialize)]
pub struct ConversationQuery {
    pub include_messages: Option<String>,
    pub message_limit: Option<String>,
    pub message_offset: Option<String>,
}

impl ConversationQuery {
    pub fn window(&self) -> ChatResult<Option<MessageWindow>> {
        let include = match self.include_messages.as_deref() {
            None => true,
            Some(v) if v.eq_ignore_ascii_case("true") => true,
            Some(v) if v.eq_ignore_ascii_case("false") => false,
            Some(_) => {
                return Err(ChatError::Validation(
                    "include_messages must be true or false".to_string(),
                ))
            }
        };
        let window = MessageWindow::new(
            parse_int("message_limit", self.message_limit.as_deref())?,
            parse_int("message_offset", self.message_offset.as_deref())?,
        )?;
        Ok(include.then_some(window))
    }
}

fn parse_opt<T>(value: Option<&str>) -> ChatResult<Option<T>>
where
    T: std::str::FromStr<Err = String>,
{
    value.map(str::parse).transpose().map_err(ChatError::Validation)
}

fn parse_int(name: &str, value: Option<&str>) -> ChatResult<Option<i64>> {
    value
        .map(|v| v.trim().parse::<i64>())
        .transpose()
        .map_err(|_| ChatError::Validation(format!("{name} must be an integer")))
}

#[derive(Debug, Deserialize)]
pub struct PollQuery {
    /// Seconds; clamped server-side
    pub timeout: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub conversation_id: String,
    pub message: Message,
}

#[derive(Debug, Serialize)]
pub struct ConversationListResponse {
    pub conversations: Vec<Conversation>,
    pub pagination: Pagination,
}

#[derive(Debug, Serialize)]
pub struct ConversationResponse {
    pub conversation: Conversation,
}

#[derive(Debug, Serialize)]
pub struct ConversationWithMessagesResponse {
    pub conversation: Conversation,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub messages: Option<Vec<Message>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_pagination: Option<MessagePagination>,
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub deleted_messages: usize,
}

#[derive(Debug, Deserialize)]
pub struct CreateScenarioRequest {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    pub config: Value,
}

#[derive(Debug, Deserialize)]
pub struct UpdateScenarioRequest {
    pub model_id: String,
}

#[derive(Debug, Serialize)]
pub struct ScenarioResponse {
    pub scenario: Scenario,
}

#[derive(Debug, Serialize)]
pub struct ScenarioModelUpdateResponse {
    pub scenario_id: String,
    pub scenario_name: String,
    pub updated_model: ScenarioModel,
}

#[derive(Debug, Serialize)]
pub struct ScenarioModelsResponse {
    pub scenario_id: String,
    pub scenario_name: String,
    pub models: Vec<ScenarioModel>,
}

/// Error response. A 503 after a committed submission also names the
/// conversation and message so the caller can poll or resubmit.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
            conversation_id: None,
            message_id: None,
        }
    }
}
