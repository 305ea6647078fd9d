use super::CommissionStore;
use crate::error::LedgerResult;
use rusqlite::params;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DrawPaymentRow {
    pub draw_id: String,
    pub tenant_id: String,
    pub agent_id: String,
    pub payment_date: String,
    pub amount_cents: i64,
    pub reporting_month: String,
    pub notes: Option<String>,
    pub created_at: String,
}

impl CommissionStore {
    /// Append one draw ledger entry. There is no uniqueness constraint
    /// across entries — an agent may receive several draws in one month.
    pub fn insert_draw(&self, d: &DrawPaymentRow) -> LedgerResult<()> {
        self.conn.execute(
            "INSERT INTO draw_payment
             (draw_id, tenant_id, agent_id, payment_date, amount_cents,
              reporting_month, notes, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                d.draw_id,
                d.tenant_id,
                d.agent_id,
                d.payment_date,
                d.amount_cents,
                d.reporting_month,
                d.notes,
                d.created_at,
            ],
        )?;
        Ok(())
    }

    pub fn draws_for_agent_month(
        &self,
        tenant_id: &str,
        agent_id: &str,
        month: &str,
    ) -> LedgerResult<Vec<DrawPaymentRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT draw_id, tenant_id, agent_id, payment_date, amount_cents,
                    reporting_month, notes, created_at
             FROM draw_payment
             WHERE tenant_id = ?1 AND agent_id = ?2 AND reporting_month = ?3
             ORDER BY payment_date ASC, draw_id ASC",
        )?;
        let rows = stmt
            .query_map(params![tenant_id, agent_id, month], map_draw_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Whether the agent already has any draw recorded for the month.
    /// The monthly posting run checks this to stay idempotent.
    pub fn agent_has_draw_in_month(
        &self,
        tenant_id: &str,
        agent_id: &str,
        month: &str,
    ) -> LedgerResult<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM draw_payment
             WHERE tenant_id = ?1 AND agent_id = ?2 AND reporting_month = ?3",
            params![tenant_id, agent_id, month],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }
}

fn map_draw_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<DrawPaymentRow> {
    Ok(DrawPaymentRow {
        draw_id: row.get(0)?,
        tenant_id: row.get(1)?,
        agent_id: row.get(2)?,
        payment_date: row.get(3)?,
        amount_cents: row.get(4)?,
        reporting_month: row.get(5)?,
        notes: row.get(6)?,
        created_at: row.get(7)?,
    })
}
