//! Database module for the chat relay
//!
//! Provides persistence for conversations, messages and the collaborator
//! records (principals, groups, scenarios, models) the core consults.

mod schema;

pub use schema::*;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use std::path::Path;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("Database connection lock poisoned")]
    Poisoned,
    #[error("Conversation not found: {0}")]
    ConversationNotFound(String),
    #[error("Message not found: {0}")]
    MessageNotFound(String),
    #[error("Scenario not found: {0}")]
    ScenarioNotFound(String),
    #[error("LLM model not found: {0}")]
    ModelNotFound(String),
    #[error("Principal not found: {0}")]
    PrincipalNotFound(String),
    #[error("Scenario already exists: {0}")]
    ScenarioExists(String),
    #[error("Invalid scenario config: {0}")]
    InvalidScenarioConfig(String),
}

pub type DbResult<T> = Result<T, DbError>;

const CONVERSATION_COLUMNS: &str = "c.id, c.principal_id, c.scenario_id, c.title, c.status, c.model,
    c.last_activity_at, c.created_at,
    (SELECT COUNT(*) FROM messages m WHERE m.conversation_id = c.id) AS message_count";

const MESSAGE_COLUMNS: &str = "id, conversation_id, role, content, order_number, reply_to, created_at";

/// Thread-safe database handle
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create database at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    /// Open an in-memory database (for testing)
    #[cfg(test)]
    pub fn open_in_memory() -> DbResult<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    fn lock(&self) -> DbResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| DbError::Poisoned)
    }

    fn run_migrations(&self) -> DbResult<()> {
        let conn = self.lock()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    /// Run `f` inside a single transaction. Commits on `Ok`, rolls back on `Err`.
    pub fn with_transaction<T, E>(
        &self,
        f: impl FnOnce(&Transaction<'_>) -> Result<T, E>,
    ) -> Result<T, E>
    where
        E: From<DbError>,
    {
        let mut conn = self.lock()?;
        let tx = conn.transaction().map_err(DbError::from)?;
        let value = f(&tx)?;
        tx.commit().map_err(DbError::from)?;
        Ok(value)
    }

    // ==================== Principal Operations ====================

    pub fn create_group(&self, id: &str, name: &str) -> DbResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR IGNORE INTO groups (id, name, created_at) VALUES (?1, ?2, ?3)",
            params![id, name, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    pub fn create_principal(
        &self,
        id: &str,
        name: &str,
        role: PrincipalRole,
        group_id: Option<&str>,
    ) -> DbResult<Principal> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO principals (id, name, role, group_id) VALUES (?1, ?2, ?3, ?4)",
            params![id, name, role.as_str(), group_id],
        )?;
        Ok(Principal {
            id: id.to_string(),
            name: name.to_string(),
            role,
            group_id: group_id.map(String::from),
        })
    }

    pub fn get_principal(&self, id: &str) -> DbResult<Principal> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT id, name, role, group_id FROM principals WHERE id = ?1",
            params![id],
            |row| {
                Ok(Principal {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    role: PrincipalRole::parse(&row.get::<_, String>(2)?),
                    group_id: row.get(3)?,
                })
            },
        )
        .optional()?
        .ok_or_else(|| DbError::PrincipalNotFound(id.to_string()))
    }

    /// Grant every member of `group_id` the right to submit to `scenario_id`
    pub fn grant_scenario_access(&self, group_id: &str, scenario_id: &str) -> DbResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR IGNORE INTO group_scenario_access (group_id, scenario_id) VALUES (?1, ?2)",
            params![group_id, scenario_id],
        )?;
        Ok(())
    }

    pub fn has_scenario_access(&self, group_id: &str, scenario_id: &str) -> DbResult<bool> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM group_scenario_access WHERE group_id = ?1 AND scenario_id = ?2",
            params![group_id, scenario_id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    // ==================== Scenario / Model Operations ====================

    pub fn create_scenario(
        &self,
        id: &str,
        name: &str,
        config: &serde_json::Value,
    ) -> DbResult<Scenario> {
        validate_scenario_config(config).map_err(DbError::InvalidScenarioConfig)?;
        let conn = self.lock()?;
        let now = Utc::now();
        conn.execute(
            "INSERT INTO scenarios (id, name, config_json, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![id, name, serde_json::to_string(config)?, now.to_rfc3339()],
        )
        .map_err(|e| match e {
            rusqlite::Error::SqliteFailure(ref err, _)
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                DbError::ScenarioExists(format!("{id} / {name}"))
            }
            other => DbError::Sqlite(other),
        })?;
        Ok(Scenario {
            id: id.to_string(),
            name: name.to_string(),
            config_json: config.clone(),
            created_at: now,
        })
    }

    pub fn get_scenario(&self, id: &str) -> DbResult<Scenario> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT id, name, config_json, created_at FROM scenarios WHERE id = ?1",
            params![id],
            |row| {
                let config: String = row.get(2)?;
                Ok(Scenario {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    config_json: serde_json::from_str(&config).unwrap_or_default(),
                    created_at: parse_datetime(&row.get::<_, String>(3)?),
                })
            },
        )
        .optional()?
        .ok_or_else(|| DbError::ScenarioNotFound(id.to_string()))
    }

    pub fn create_llm_model(
        &self,
        id: &str,
        provider: &str,
        name: &str,
        params: &serde_json::Value,
    ) -> DbResult<LlmModel> {
        let conn = self.lock()?;
        let now = Utc::now();
        conn.execute(
            "INSERT INTO llm_models (id, provider, name, params, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![id, provider, name, serde_json::to_string(params)?, now.to_rfc3339()],
        )?;
        Ok(LlmModel {
            id: id.to_string(),
            provider: provider.to_string(),
            name: name.to_string(),
            params: params.clone(),
            created_at: now,
        })
    }

    pub fn get_llm_model(&self, id: &str) -> DbResult<LlmModel> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT id, provider, name, params, created_at FROM llm_models WHERE id = ?1",
            params![id],
            |row| {
                let params: String = row.get(3)?;
                Ok(LlmModel {
                    id: row.get(0)?,
                    provider: row.get(1)?,
                    name: row.get(2)?,
                    params: serde_json::from_str(&params).unwrap_or_default(),
                    created_at: parse_datetime(&row.get::<_, String>(4)?),
                })
            },
        )
        .optional()?
        .ok_or_else(|| DbError::ModelNotFound(id.to_string()))
    }

    /// Bind `llm_model_id` to the scenario without changing its default
    pub fn attach_scenario_model(&self, scenario_id: &str, llm_model_id: &str) -> DbResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR IGNORE INTO scenario_models (scenario_id, llm_model_id, is_default)
             VALUES (?1, ?2, 0)",
            params![scenario_id, llm_model_id],
        )?;
        Ok(())
    }

    /// Make `llm_model_id` the scenario's only default, binding it if needed
    pub fn set_default_scenario_model(&self, scenario_id: &str, llm_model_id: &str) -> DbResult<()> {
        self.with_transaction(|tx| {
            tx.execute(
                "UPDATE scenario_models SET is_default = 0 WHERE scenario_id = ?1",
                params![scenario_id],
            )?;
            tx.execute(
                "INSERT INTO scenario_models (scenario_id, llm_model_id, is_default)
                 VALUES (?1, ?2, 1)
                 ON CONFLICT (scenario_id, llm_model_id) DO UPDATE SET is_default = 1",
                params![scenario_id, llm_model_id],
            )?;
            Ok::<_, DbError>(())
        })
    }

    /// Models bound to a scenario, default first, then by provider and name
    pub fn scenario_models(&self, scenario_id: &str) -> DbResult<Vec<ScenarioModel>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT m.id, m.provider, m.name, m.params, sm.is_default
             FROM scenario_models sm JOIN llm_models m ON m.id = sm.llm_model_id
             WHERE sm.scenario_id = ?1
             ORDER BY sm.is_default DESC, m.provider ASC, m.name ASC",
        )?;
        let rows = stmt.query_map(params![scenario_id], |row| {
            let params: String = row.get(3)?;
            Ok(ScenarioModel::new(
                row.get(0)?,
                row.get(1)?,
                row.get(2)?,
                serde_json::from_str(&params).unwrap_or_default(),
                row.get(4)?,
            ))
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(DbError::from)
    }

    /// The scenario's default model id, if one is set
    pub fn default_scenario_model(&self, scenario_id: &str) -> DbResult<Option<String>> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT llm_model_id FROM scenario_models WHERE scenario_id = ?1 AND is_default = 1",
            params![scenario_id],
            |row| row.get(0),
        )
        .optional()
        .map_err(DbError::from)
    }

    // ==================== Conversation Operations ====================

    /// Get conversation by ID
    pub fn get_conversation(&self, id: &str) -> DbResult<Conversation> {
        let conn = self.lock()?;
        load_conversation(&conn, id)
    }

    /// Current status only. Never touches the per-conversation critical section.
    pub fn get_status(&self, id: &str) -> DbResult<ConvStatus> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT status FROM conversations WHERE id = ?1",
            params![id],
            |row| row.get::<_, String>(0),
        )
        .optional()?
        .map(|s| parse_status(&s))
        .ok_or_else(|| DbError::ConversationNotFound(id.to_string()))
    }

    /// List conversations matching `filter` in its sort order
    pub fn list_conversations(&self, filter: &ConversationFilter) -> DbResult<Vec<Conversation>> {
        let conn = self.lock()?;
        let column = filter.sort_by.column();
        let direction = filter.sort_order.keyword();
        let sql = format!(
            "SELECT {CONVERSATION_COLUMNS} FROM conversations c
             WHERE (?1 IS NULL OR c.status = ?1) AND (?2 IS NULL OR c.scenario_id = ?2)
             ORDER BY {column} {direction}, c.id {direction}"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(
            params![filter.status.map(ConvStatus::as_str), filter.scenario_id],
            parse_conversation_row,
        )?;
        rows.collect::<Result<Vec<_>, _>>().map_err(DbError::from)
    }

    /// Delete a conversation and its messages. Returns the number of messages removed.
    pub fn delete_conversation(&self, id: &str) -> DbResult<usize> {
        let conn = self.lock()?;
        let removed = conn.execute("DELETE FROM messages WHERE conversation_id = ?1", params![id])?;
        let deleted = conn.execute("DELETE FROM conversations WHERE id = ?1", params![id])?;
        if deleted == 0 {
            return Err(DbError::ConversationNotFound(id.to_string()));
        }
        Ok(removed)
    }

    // ==================== Message Operations ====================

    /// Get messages for a conversation ordered by `order_number`
    pub fn get_messages(&self, conversation_id: &str) -> DbResult<Vec<Message>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages WHERE conversation_id = ?1 ORDER BY order_number ASC"
        ))?;
        let rows = stmt.query_map(params![conversation_id], parse_message_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(DbError::from)
    }

    /// A window of the conversation's messages in `order_number` order
    pub fn get_messages_page(
        &self,
        conversation_id: &str,
        limit: usize,
        offset: usize,
    ) -> DbResult<Vec<Message>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages WHERE conversation_id = ?1
             ORDER BY order_number ASC LIMIT ?2 OFFSET ?3"
        ))?;
        let rows = stmt.query_map(
            params![
                conversation_id,
                i64::try_from(limit).unwrap_or(i64::MAX),
                i64::try_from(offset).unwrap_or(i64::MAX)
            ],
            parse_message_row,
        )?;
        rows.collect::<Result<Vec<_>, _>>().map_err(DbError::from)
    }

    pub fn get_message(&self, message_id: &str) -> DbResult<Message> {
        let conn = self.lock()?;
        conn.query_row(
            &format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?1"),
            params![message_id],
            parse_message_row,
        )
        .optional()?
        .ok_or_else(|| DbError::MessageNotFound(message_id.to_string()))
    }

    /// The assistant message with the highest order number, if any
    pub fn latest_assistant_message(&self, conversation_id: &str) -> DbResult<Option<Message>> {
        let conn = self.lock()?;
        conn.query_row(
            &format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages
                 WHERE conversation_id = ?1 AND role = 'assistant'
                 ORDER BY order_number DESC LIMIT 1"
            ),
            params![conversation_id],
            parse_message_row,
        )
        .optional()
        .map_err(DbError::from)
    }

    /// Latest user message without a reply. Read without the critical
    /// section; callers treat the answer as advisory.
    pub fn unanswered_user_message(&self, conversation_id: &str) -> DbResult<Option<String>> {
        let conn = self.lock()?;
        unanswered_user_message(&conn, conversation_id)
    }

    #[cfg(test)]
    pub fn message_count(&self, conversation_id: &str) -> DbResult<i64> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT COUNT(*) FROM messages WHERE conversation_id = ?1",
            params![conversation_id],
            |row| row.get(0),
        )
        .map_err(DbError::from)
    }
}

// ==================== In-transaction helpers ====================
//
// These take a `&Connection` so they run against an open `Transaction`
// (which derefs to `Connection`). Callers own the critical section.

pub(crate) fn insert_conversation(
    conn: &Connection,
    id: &str,
    principal_id: &str,
    scenario_id: &str,
    title: &str,
    model: Option<&str>,
    now: DateTime<Utc>,
) -> DbResult<()> {
    conn.execute(
        "INSERT INTO conversations (id, principal_id, scenario_id, title, status, model, last_activity_at, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
        params![
            id,
            principal_id,
            scenario_id,
            title,
            ConvStatus::Open.as_str(),
            model,
            now.to_rfc3339()
        ],
    )?;
    Ok(())
}

pub(crate) fn load_conversation(conn: &Connection, id: &str) -> DbResult<Conversation> {
    conn.query_row(
        &format!("SELECT {CONVERSATION_COLUMNS} FROM conversations c WHERE c.id = ?1"),
        params![id],
        parse_conversation_row,
    )
    .optional()?
    .ok_or_else(|| DbError::ConversationNotFound(id.to_string()))
}

/// Latest user message that no assistant message answers yet
pub(crate) fn unanswered_user_message(
    conn: &Connection,
    conversation_id: &str,
) -> DbResult<Option<String>> {
    conn.query_row(
        "SELECT u.id FROM messages u
         WHERE u.conversation_id = ?1 AND u.role = 'user'
           AND NOT EXISTS (SELECT 1 FROM messages a WHERE a.reply_to = u.id)
         ORDER BY u.order_number DESC LIMIT 1",
        params![conversation_id],
        |row| row.get(0),
    )
    .optional()
    .map_err(DbError::from)
}

/// Current maximum order number plus one. Only meaningful inside the
/// conversation's critical section.
pub(crate) fn next_order_number(conn: &Connection, conversation_id: &str) -> DbResult<i64> {
    conn.query_row(
        "SELECT COALESCE(MAX(order_number), 0) + 1 FROM messages WHERE conversation_id = ?1",
        params![conversation_id],
        |row| row.get(0),
    )
    .map_err(DbError::from)
}

pub(crate) fn insert_message(conn: &Connection, message: &Message) -> DbResult<()> {
    conn.execute(
        &format!("INSERT INTO messages ({MESSAGE_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"),
        params![
            message.id,
            message.conversation_id,
            message.role.as_str(),
            message.content,
            message.order_number,
            message.reply_to,
            message.created_at.to_rfc3339(),
        ],
    )?;
    Ok(())
}

pub(crate) fn update_status(
    conn: &Connection,
    id: &str,
    status: ConvStatus,
    now: DateTime<Utc>,
) -> DbResult<()> {
    let updated = conn.execute(
        "UPDATE conversations SET status = ?1, last_activity_at = ?2 WHERE id = ?3",
        params![status.as_str(), now.to_rfc3339(), id],
    )?;
    if updated == 0 {
        return Err(DbError::ConversationNotFound(id.to_string()));
    }
    Ok(())
}

pub(crate) fn set_conversation_model(conn: &Connection, id: &str, model: &str) -> DbResult<()> {
    conn.execute(
        "UPDATE conversations SET model = ?1 WHERE id = ?2",
        params![model, id],
    )?;
    Ok(())
}

fn parse_conversation_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Conversation> {
    Ok(Conversation {
        id: row.get(0)?,
        principal_id: row.get(1)?,
        scenario_id: row.get(2)?,
        title: row.get(3)?,
        status: parse_status(&row.get::<_, String>(4)?),
        model: row.get(5)?,
        last_activity_at: parse_datetime(&row.get::<_, String>(6)?),
        created_at: parse_datetime(&row.get::<_, String>(7)?),
        message_count: row.get(8)?,
    })
}

fn parse_message_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    let role = match row.get::<_, String>(2)?.as_str() {
        "assistant" => Role::Assistant,
        _ => Role::User,
    };
    Ok(Message {
        id: row.get(0)?,
        conversation_id: row.get(1)?,
        role,
        content: row.get(3)?,
        order_number: row.get(4)?,
        reply_to: row.get(5)?,
        created_at: parse_datetime(&row.get::<_, String>(6)?),
    })
}

// Unknown values can only come from manual edits; treat them as terminal.
fn parse_status(s: &str) -> ConvStatus {
    ConvStatus::from_str(s).unwrap_or(ConvStatus::Closed)
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).map_or_else(|_| Utc::now(), |dt| dt.with_timezone(&Utc))
}
