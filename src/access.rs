//! Access control collaborators
//!
//! The gate is consulted before every entry into the state machine; a
//! refusal means nothing is written.

use crate::db::{Conversation, Database, DbError, Principal, PrincipalRole};
use crate::error::ChatResult;
use async_trait::async_trait;

#[async_trait]
pub trait AccessGate: Send + Sync {
    /// May `principal` see (and poll, close, delete) this conversation?
    async fn can_view(&self, principal: &Principal, conversation: &Conversation) -> ChatResult<bool>;

    /// May `principal` submit messages under this scenario?
    async fn can_submit(&self, principal: &Principal, scenario_id: &str) -> ChatResult<bool>;

    /// May `principal` create scenarios?
    async fn can_create_scenario(&self, principal: &Principal) -> ChatResult<bool>;

    /// May `principal` change this scenario's model binding?
    async fn can_modify_scenario(&self, principal: &Principal, scenario_id: &str) -> ChatResult<bool>;
}

/// Role and group based rules:
/// - admins see everything and may use any scenario
/// - supervisors see conversations of principals in their group
/// - employees see their own conversations
/// - non-admins submit only to scenarios granted to their group
/// - only admins create scenarios; supervisors modify scenarios granted to
///   their group
pub struct RoleAccessGate {
    db: Database,
}

impl RoleAccessGate {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    fn group_has_access(&self, principal: &Principal, scenario_id: &str) -> ChatResult<bool> {
        match &principal.group_id {
            Some(group_id) => Ok(self.db.has_scenario_access(group_id, scenario_id)?),
            None => Ok(false),
        }
    }
}

#[async_trait]
impl AccessGate for RoleAccessGate {
    async fn can_view(&self, principal: &Principal, conversation: &Conversation) -> ChatResult<bool> {
        if principal.role == PrincipalRole::Admin || conversation.principal_id == principal.id {
            return Ok(true);
        }
        let (PrincipalRole::Supervisor, Some(group_id)) = (principal.role, &principal.group_id) else {
            return Ok(false);
        };
        match self.db.get_principal(&conversation.principal_id) {
            Ok(owner) => Ok(owner.group_id.as_ref() == Some(group_id)),
            Err(DbError::PrincipalNotFound(_)) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn can_submit(&self, principal: &Principal, scenario_id: &str) -> ChatResult<bool> {
        if principal.role == PrincipalRole::Admin {
            return Ok(true);
        }
        self.group_has_access(principal, scenario_id)
    }

    async fn can_create_scenario(&self, principal: &Principal) -> ChatResult<bool> {
        Ok(principal.role == PrincipalRole::Admin)
    }

    async fn can_modify_scenario(&self, principal: &Principal, scenario_id: &str) -> ChatResult<bool> {
        match principal.role {
            PrincipalRole::Admin => Ok(true),
            PrincipalRole::Supervisor => self.group_has_access(principal, scenario_id),
            PrincipalRole::Employee => Ok(false),
        }
    }
}
