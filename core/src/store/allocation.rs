use super::CommissionStore;
use crate::error::LedgerResult;
use rusqlite::params;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocationRow {
    pub allocation_id: String,
    pub tenant_id: String,
    pub txn_id: String,
    pub agent_id: String,
    pub split_percent: f64,
    pub split_cents: i64,
    pub created_at: String,
}

/// One allocation joined to its parent transaction, as it appears on an
/// agent statement.
#[derive(Debug, Clone, Serialize)]
pub struct AgentAllocationLine {
    pub txn_id: String,
    pub policy_number: String,
    pub carrier_name: String,
    pub insured_name: Option<String>,
    pub transaction_type: String,
    pub commission_cents: i64,
    pub split_percent: f64,
    pub split_cents: i64,
}

impl CommissionStore {
    /// Replace the full allocation set for a transaction as one atomic
    /// unit. A failure partway rolls back, leaving the old set intact; a
    /// reader never observes a partial set.
    pub fn replace_allocations_for_txn(
        &self,
        tenant_id: &str,
        txn_id: &str,
        rows: &[AllocationRow],
    ) -> LedgerResult<()> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "DELETE FROM allocation WHERE tenant_id = ?1 AND txn_id = ?2",
            params![tenant_id, txn_id],
        )?;
        for r in rows {
            tx.execute(
                "INSERT INTO allocation
                 (allocation_id, tenant_id, txn_id, agent_id, split_percent, split_cents, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    r.allocation_id,
                    r.tenant_id,
                    r.txn_id,
                    r.agent_id,
                    r.split_percent,
                    r.split_cents,
                    r.created_at,
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Insert a single allocation row outside the replace path. Used only
    /// to stage legacy-shaped data in tests and backfills.
    pub fn insert_allocation(&self, r: &AllocationRow) -> LedgerResult<()> {
        self.conn.execute(
            "INSERT INTO allocation
             (allocation_id, tenant_id, txn_id, agent_id, split_percent, split_cents, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                r.allocation_id,
                r.tenant_id,
                r.txn_id,
                r.agent_id,
                r.split_percent,
                r.split_cents,
                r.created_at,
            ],
        )?;
        Ok(())
    }

    pub fn allocations_for_txn(&self, tenant_id: &str, txn_id: &str) -> LedgerResult<Vec<AllocationRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT allocation_id, tenant_id, txn_id, agent_id, split_percent, split_cents, created_at
             FROM allocation
             WHERE tenant_id = ?1 AND txn_id = ?2
             ORDER BY split_cents DESC, allocation_id ASC",
        )?;
        let rows = stmt
            .query_map(params![tenant_id, txn_id], map_allocation_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Statement lines: allocations joined to their transactions for one
    /// agent and one reporting month.
    pub fn agent_lines_for_month(
        &self,
        tenant_id: &str,
        agent_id: &str,
        month: &str,
    ) -> LedgerResult<Vec<AgentAllocationLine>> {
        let mut stmt = self.conn.prepare(
            "SELECT a.txn_id, t.policy_number, t.carrier_name, t.insured_name,
                    t.transaction_type, t.commission_cents, a.split_percent, a.split_cents
             FROM allocation a
             JOIN txn t ON t.tenant_id = a.tenant_id AND t.txn_id = a.txn_id
             WHERE a.tenant_id = ?1 AND a.agent_id = ?2 AND t.reporting_month = ?3
             ORDER BY t.policy_number ASC, a.txn_id ASC",
        )?;
        let rows = stmt
            .query_map(params![tenant_id, agent_id, month], |row| {
                Ok(AgentAllocationLine {
                    txn_id: row.get(0)?,
                    policy_number: row.get(1)?,
                    carrier_name: row.get(2)?,
                    insured_name: row.get(3)?,
                    transaction_type: row.get(4)?,
                    commission_cents: row.get(5)?,
                    split_percent: row.get(6)?,
                    split_cents: row.get(7)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Transactions in the month with no allocation at all.
    pub fn unallocated_txn_ids(&self, tenant_id: &str, month: &str) -> LedgerResult<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT t.txn_id
             FROM txn t
             LEFT JOIN allocation a
               ON a.tenant_id = t.tenant_id AND a.txn_id = t.txn_id
             WHERE t.tenant_id = ?1 AND t.reporting_month = ?2
               AND a.allocation_id IS NULL
             ORDER BY t.txn_id ASC",
        )?;
        let rows = stmt
            .query_map(params![tenant_id, month], |row| row.get(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Distinct agent ids holding allocations in the month.
    pub fn allocation_agent_ids_for_month(
        &self,
        tenant_id: &str,
        month: &str,
    ) -> LedgerResult<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT DISTINCT a.agent_id
             FROM allocation a
             JOIN txn t ON t.tenant_id = a.tenant_id AND t.txn_id = a.txn_id
             WHERE a.tenant_id = ?1 AND t.reporting_month = ?2
             ORDER BY a.agent_id ASC",
        )?;
        let rows = stmt
            .query_map(params![tenant_id, month], |row| row.get(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

fn map_allocation_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<AllocationRow> {
    Ok(AllocationRow {
        allocation_id: row.get(0)?,
        tenant_id: row.get(1)?,
        txn_id: row.get(2)?,
        agent_id: row.get(3)?,
        split_percent: row.get(4)?,
        split_cents: row.get(5)?,
        created_at: row.get(6)?,
    })
}
