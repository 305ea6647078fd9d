//! Caller access scope — tenant, role, and the agent ids the caller owns.
//!
//! RULE: The scope is applied inside every engine operation, never at a
//! transport layer. Agent-role reads are filtered through the allocation
//! join; the engine never scopes by matching agent codes in free text.

use crate::error::{LedgerError, LedgerResult};
use crate::types::{EntityId, TenantId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Admin,
    Agent,
}

/// Supplied by the tenant/role context provider on every call. The engine
/// trusts it and performs no authentication of its own.
#[derive(Debug, Clone)]
pub struct AccessScope {
    pub tenant_id: TenantId,
    pub role: Role,
    /// Agent ids the caller owns. Empty for admins.
    pub agent_ids: Vec<EntityId>,
}

impl AccessScope {
    pub fn admin(tenant_id: &str) -> Self {
        Self {
            tenant_id: tenant_id.to_string(),
            role: Role::Admin,
            agent_ids: Vec::new(),
        }
    }

    pub fn agent(tenant_id: &str, agent_ids: &[&str]) -> Self {
        Self {
            tenant_id: tenant_id.to_string(),
            role: Role::Agent,
            agent_ids: agent_ids.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn owns_agent(&self, agent_id: &str) -> bool {
        self.agent_ids.iter().any(|a| a == agent_id)
    }

    /// Mutations and operator-facing reads require the admin role.
    pub fn require_admin(&self, action: &str) -> LedgerResult<()> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(LedgerError::Authorization(format!(
                "{action} requires the admin role"
            )))
        }
    }

    /// Admins read any agent's records; agents read only their own.
    pub fn require_agent_visibility(&self, agent_id: &str) -> LedgerResult<()> {
        if self.is_admin() || self.owns_agent(agent_id) {
            Ok(())
        } else {
            Err(LedgerError::Authorization(format!(
                "agent '{agent_id}' is outside the caller's scope"
            )))
        }
    }

    /// Actor string recorded in the audit log.
    pub fn actor(&self) -> String {
        match self.role {
            Role::Admin => "admin".to_string(),
            Role::Agent => format!("agent:{}", self.agent_ids.join(",")),
        }
    }
}
