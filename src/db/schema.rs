//! Database schema and types

pub use crate::state_machine::ConvStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// SQL schema for initialization
pub const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS groups (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS principals (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    role TEXT NOT NULL DEFAULT 'employee',
    group_id TEXT,

    FOREIGN KEY (group_id) REFERENCES groups(id) ON DELETE SET NULL
);

CREATE TABLE IF NOT EXISTS scenarios (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    config_json TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS llm_models (
    id TEXT PRIMARY KEY,
    provider TEXT NOT NULL,
    name TEXT NOT NULL,
    params TEXT NOT NULL DEFAULT '{}',
    created_at TEXT NOT NULL,

    UNIQUE (provider, name)
);

CREATE TABLE IF NOT EXISTS group_scenario_access (
    group_id TEXT NOT NULL,
    scenario_id TEXT NOT NULL,

    PRIMARY KEY (group_id, scenario_id),
    FOREIGN KEY (group_id) REFERENCES groups(id) ON DELETE CASCADE,
    FOREIGN KEY (scenario_id) REFERENCES scenarios(id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS scenario_models (
    scenario_id TEXT NOT NULL,
    llm_model_id TEXT NOT NULL,
    is_default INTEGER NOT NULL DEFAULT 0,

    PRIMARY KEY (scenario_id, llm_model_id),
    FOREIGN KEY (scenario_id) REFERENCES scenarios(id) ON DELETE CASCADE,
    FOREIGN KEY (llm_model_id) REFERENCES llm_models(id)
);

CREATE INDEX IF NOT EXISTS idx_scenario_models_default ON scenario_models(scenario_id, is_default);

CREATE TABLE IF NOT EXISTS conversations (
    id TEXT PRIMARY KEY,
    principal_id TEXT NOT NULL,
    scenario_id TEXT NOT NULL,
    title TEXT NOT NULL DEFAULT '',
    status TEXT NOT NULL DEFAULT 'open',
    model TEXT,
    last_activity_at TEXT NOT NULL,
    created_at TEXT NOT NULL,

    FOREIGN KEY (principal_id) REFERENCES principals(id) ON DELETE CASCADE,
    FOREIGN KEY (scenario_id) REFERENCES scenarios(id)
);

CREATE INDEX IF NOT EXISTS idx_conversations_principal ON conversations(principal_id, last_activity_at DESC);
CREATE INDEX IF NOT EXISTS idx_conversations_scenario ON conversations(scenario_id, status);

CREATE TABLE IF NOT EXISTS messages (
    id TEXT PRIMARY KEY,
    conversation_id TEXT NOT NULL,
    role TEXT NOT NULL,
    content TEXT NOT NULL,
    order_number INTEGER NOT NULL,
    reply_to TEXT,
    created_at TEXT NOT NULL,

    UNIQUE (conversation_id, order_number),
    FOREIGN KEY (conversation_id) REFERENCES conversations(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_messages_reply_to ON messages(reply_to);
";

/// Keys every scenario `config_json` must carry
pub const REQUIRED_SCENARIO_KEYS: [&str; 3] = ["llm", "memory", "prompt"];

/// Conversation record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub principal_id: String,
    pub scenario_id: String,
    pub title: String,
    pub status: ConvStatus,
    pub model: Option<String>,
    pub last_activity_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub message_count: i64,
}

/// Message author
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Message record. `order_number` is assigned once at insert and never changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub conversation_id: String,
    pub role: Role,
    pub content: String,
    pub order_number: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Scenario a conversation is created against
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    pub id: String,
    pub name: String,
    pub config_json: Value,
    pub created_at: DateTime<Utc>,
}

impl Scenario {
    /// System prompt configured for this scenario, if any
    pub fn prompt(&self) -> Option<&str> {
        match self.config_json.get("prompt")? {
            Value::String(s) => Some(s.as_str()),
            other => other.get("system").and_then(Value::as_str),
        }
    }
}

/// LLM model a submission may pin
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmModel {
    pub id: String,
    pub provider: String,
    pub name: String,
    pub params: Value,
    pub created_at: DateTime<Utc>,
}

/// A model bound to a scenario
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioModel {
    pub id: String,
    pub provider: String,
    pub name: String,
    pub display_name: String,
    pub is_default: bool,
    pub params: Value,
}

impl ScenarioModel {
    pub fn new(id: String, provider: String, name: String, params: Value, is_default: bool) -> Self {
        let display_name = format!("{} {name}", capitalize(&provider));
        Self {
            id,
            provider,
            name,
            display_name,
            is_default,
            params,
        }
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Access role of a principal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PrincipalRole {
    Admin,
    Supervisor,
    #[default]
    Employee,
}

impl PrincipalRole {
    pub fn as_str(self) -> &'static str {
        match self {
            PrincipalRole::Admin => "admin",
            PrincipalRole::Supervisor => "supervisor",
            PrincipalRole::Employee => "employee",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "admin" => PrincipalRole::Admin,
            "supervisor" => PrincipalRole::Supervisor,
            _ => PrincipalRole::Employee,
        }
    }
}

/// Caller identity as seen by the access gate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Principal {
    pub id: String,
    pub name: String,
    pub role: PrincipalRole,
    pub group_id: Option<String>,
}

/// Filter and ordering for conversation listing
#[derive(Debug, Clone, Default)]
pub struct ConversationFilter {
    pub status: Option<ConvStatus>,
    pub scenario_id: Option<String>,
    pub sort_by: ConversationSort,
    pub sort_order: SortOrder,
}

/// Column a conversation listing is ordered by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConversationSort {
    StartedAt,
    #[default]
    LastActivityAt,
    Status,
}

impl ConversationSort {
    pub const ALL: [ConversationSort; 3] = [
        ConversationSort::StartedAt,
        ConversationSort::LastActivityAt,
        ConversationSort::Status,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ConversationSort::StartedAt => "started_at",
            ConversationSort::LastActivityAt => "last_activity_at",
            ConversationSort::Status => "status",
        }
    }

    pub(crate) fn column(self) -> &'static str {
        match self {
            ConversationSort::StartedAt => "c.created_at",
            ConversationSort::LastActivityAt => "c.last_activity_at",
            ConversationSort::Status => "c.status",
        }
    }
}

impl FromStr for ConversationSort {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ConversationSort::ALL
            .into_iter()
            .find(|sort| sort.as_str() == s)
            .ok_or_else(|| {
                let valid: Vec<&str> = ConversationSort::ALL.iter().map(|s| s.as_str()).collect();
                format!("sort_by must be one of: {}", valid.join(", "))
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub(crate) fn keyword(self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

impl FromStr for SortOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "asc" => Ok(SortOrder::Asc),
            "desc" => Ok(SortOrder::Desc),
            _ => Err("sort_order must be asc or desc".to_string()),
        }
    }
}

/// Check that a scenario config is an object carrying every required key.
pub fn validate_scenario_config(config: &Value) -> Result<(), String> {
    let Value::Object(map) = config else {
        return Err("config_json must be an object".to_string());
    };
    let missing: Vec<&str> = REQUIRED_SCENARIO_KEYS
        .iter()
        .copied()
        .filter(|key| !map.contains_key(*key))
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(format!("config_json missing required keys: {}", missing.join(", ")))
    }
}
