//! SQLite persistence layer.
//!
//! RULE: Only the store talks to the database.
//! Components call store methods — they never execute SQL directly.
//!
//! Every table is tenant-scoped. Unique constraints enforce the dedup
//! key, alias uniqueness, and the one-open-anomaly-per-rule invariant;
//! `unchecked_transaction` provides the atomic unit for allocation
//! replacement.

mod allocation;
mod anomaly;
mod draw;
mod import;
mod reconciliation;

pub use allocation::{AgentAllocationLine, AllocationRow};
pub use anomaly::AnomalyRow;
pub use draw::DrawPaymentRow;
pub use import::{ImportBatchRow, TxnInsert, TxnRow};
pub use reconciliation::ReconciliationRow;

use crate::error::{LedgerError, LedgerResult};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

pub struct CommissionStore {
    conn: Connection,
}

impl CommissionStore {
    pub fn open(path: &str) -> LedgerResult<Self> {
        let conn = Connection::open_with_flags(
            path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                | rusqlite::OpenFlags::SQLITE_OPEN_URI,
        )?;
        // WAL mode only for real files (shared-memory and :memory: ignore it).
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> LedgerResult<Self> {
        let conn = Connection::open(":memory:")?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    /// Apply all schema migrations in order.
    pub fn migrate(&self) -> LedgerResult<()> {
        self.conn
            .execute_batch(include_str!("../../../migrations/001_foundation.sql"))?;
        self.conn
            .execute_batch(include_str!("../../../migrations/002_draws_anomalies.sql"))?;
        self.conn
            .execute_batch(include_str!("../../../migrations/003_reconciliation_audit.sql"))?;
        Ok(())
    }

    // ── Carrier ────────────────────────────────────────────────

    pub fn insert_carrier(&self, c: &CarrierRow) -> LedgerResult<()> {
        let result = self.conn.execute(
            "INSERT INTO carrier
             (carrier_id, tenant_id, name, code, new_business_rate, renewal_rate, is_active)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                c.carrier_id,
                c.tenant_id,
                c.name,
                c.code,
                c.new_business_rate,
                c.renewal_rate,
                c.is_active as i64,
            ],
        );
        match result {
            Ok(_) => Ok(()),
            Err(e) if is_constraint_violation(&e) => Err(LedgerError::Conflict(format!(
                "carrier '{}' already exists for this tenant",
                c.name
            ))),
            Err(e) => Err(e.into()),
        }
    }

    pub fn carrier_by_id(&self, tenant_id: &str, carrier_id: &str) -> LedgerResult<Option<CarrierRow>> {
        let row = self
            .conn
            .query_row(
                "SELECT carrier_id, tenant_id, name, code, new_business_rate, renewal_rate, is_active
                 FROM carrier WHERE tenant_id = ?1 AND carrier_id = ?2",
                params![tenant_id, carrier_id],
                map_carrier_row,
            )
            .optional()?;
        Ok(row)
    }

    /// Case-insensitive exact match against carrier name or code.
    pub fn find_carrier_by_name_or_code(
        &self,
        tenant_id: &str,
        needle: &str,
    ) -> LedgerResult<Option<String>> {
        let id = self
            .conn
            .query_row(
                "SELECT carrier_id FROM carrier
                 WHERE tenant_id = ?1
                   AND (lower(name) = lower(?2) OR lower(code) = lower(?2))",
                params![tenant_id, needle],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id)
    }

    // ── Carrier alias ──────────────────────────────────────────

    /// Which carrier, if any, the alias string already resolves to.
    pub fn carrier_id_for_alias(&self, tenant_id: &str, alias: &str) -> LedgerResult<Option<String>> {
        let id = self
            .conn
            .query_row(
                "SELECT carrier_id FROM carrier_alias
                 WHERE tenant_id = ?1 AND lower(alias) = lower(?2)",
                params![tenant_id, alias],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id)
    }

    /// Insert an alias. A unique index on (tenant, lower(alias)) makes a
    /// second registration — to any carrier — a Conflict at creation time,
    /// so resolution never has to report ambiguity.
    pub fn insert_alias(&self, a: &CarrierAliasRow) -> LedgerResult<()> {
        let result = self.conn.execute(
            "INSERT INTO carrier_alias (alias_id, tenant_id, carrier_id, alias)
             VALUES (?1, ?2, ?3, ?4)",
            params![a.alias_id, a.tenant_id, a.carrier_id, a.alias],
        );
        match result {
            Ok(_) => Ok(()),
            Err(e) if is_constraint_violation(&e) => Err(LedgerError::Conflict(format!(
                "alias '{}' is already registered for this tenant",
                a.alias
            ))),
            Err(e) => Err(e.into()),
        }
    }

    // ── Agent ──────────────────────────────────────────────────

    pub fn insert_agent(&self, a: &AgentRow) -> LedgerResult<()> {
        self.conn.execute(
            "INSERT INTO agent
             (agent_id, tenant_id, first_name, last_name, email, role, is_active,
              has_draw_account, monthly_draw_cents, default_split_percent, user_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                a.agent_id,
                a.tenant_id,
                a.first_name,
                a.last_name,
                a.email,
                a.role,
                a.is_active as i64,
                a.has_draw_account as i64,
                a.monthly_draw_cents,
                a.default_split_percent,
                a.user_id,
            ],
        )?;
        Ok(())
    }

    pub fn agent_by_id(&self, tenant_id: &str, agent_id: &str) -> LedgerResult<Option<AgentRow>> {
        let row = self
            .conn
            .query_row(
                "SELECT agent_id, tenant_id, first_name, last_name, email, role, is_active,
                        has_draw_account, monthly_draw_cents, default_split_percent, user_id
                 FROM agent WHERE tenant_id = ?1 AND agent_id = ?2",
                params![tenant_id, agent_id],
                map_agent_row,
            )
            .optional()?;
        Ok(row)
    }

    /// Admin correction: activate or deactivate an agent.
    pub fn set_agent_active(&self, tenant_id: &str, agent_id: &str, active: bool) -> LedgerResult<()> {
        self.conn.execute(
            "UPDATE agent SET is_active = ?1 WHERE tenant_id = ?2 AND agent_id = ?3",
            params![active as i64, tenant_id, agent_id],
        )?;
        Ok(())
    }

    /// Active agents with a draw account and a positive standing amount —
    /// the population for the monthly draw posting run.
    pub fn active_draw_agents(&self, tenant_id: &str) -> LedgerResult<Vec<AgentRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT agent_id, tenant_id, first_name, last_name, email, role, is_active,
                    has_draw_account, monthly_draw_cents, default_split_percent, user_id
             FROM agent
             WHERE tenant_id = ?1 AND is_active = 1
               AND has_draw_account = 1 AND monthly_draw_cents > 0
             ORDER BY last_name ASC, first_name ASC",
        )?;
        let rows = stmt
            .query_map(params![tenant_id], map_agent_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    // ── Audit log ──────────────────────────────────────────────

    pub fn append_audit(
        &self,
        tenant_id: &str,
        actor: &str,
        event_type: &str,
        payload: &str,
        created_at: &str,
    ) -> LedgerResult<()> {
        self.conn.execute(
            "INSERT INTO audit_log (tenant_id, actor, event_type, payload, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![tenant_id, actor, event_type, payload, created_at],
        )?;
        Ok(())
    }

    /// Event types in append order, for tests and operator inspection.
    pub fn audit_event_types(&self, tenant_id: &str) -> LedgerResult<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT event_type FROM audit_log WHERE tenant_id = ?1 ORDER BY id ASC",
        )?;
        let rows = stmt
            .query_map(params![tenant_id], |row| row.get(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

/// True when an execute failed on a UNIQUE or other constraint.
pub(crate) fn is_constraint_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _)
            if err.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

// ── Row structs ────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CarrierRow {
    pub carrier_id: String,
    pub tenant_id: String,
    pub name: String,
    pub code: Option<String>,
    pub new_business_rate: Option<f64>,
    pub renewal_rate: Option<f64>,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CarrierAliasRow {
    pub alias_id: String,
    pub tenant_id: String,
    pub carrier_id: String,
    pub alias: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRow {
    pub agent_id: String,
    pub tenant_id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub role: String,
    pub is_active: bool,
    pub has_draw_account: bool,
    pub monthly_draw_cents: i64,
    pub default_split_percent: f64,
    pub user_id: Option<String>,
}

fn map_carrier_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<CarrierRow> {
    Ok(CarrierRow {
        carrier_id: row.get(0)?,
        tenant_id: row.get(1)?,
        name: row.get(2)?,
        code: row.get(3)?,
        new_business_rate: row.get(4)?,
        renewal_rate: row.get(5)?,
        is_active: row.get::<_, i64>(6)? != 0,
    })
}

fn map_agent_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<AgentRow> {
    Ok(AgentRow {
        agent_id: row.get(0)?,
        tenant_id: row.get(1)?,
        first_name: row.get(2)?,
        last_name: row.get(3)?,
        email: row.get(4)?,
        role: row.get(5)?,
        is_active: row.get::<_, i64>(6)? != 0,
        has_draw_account: row.get::<_, i64>(7)? != 0,
        monthly_draw_cents: row.get(8)?,
        default_split_percent: row.get(9)?,
        user_id: row.get(10)?,
    })
}
