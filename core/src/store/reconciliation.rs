use super::CommissionStore;
use crate::error::LedgerResult;
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconciliationRow {
    pub tenant_id: String,
    pub carrier_id: String,
    pub reporting_month: String,
    pub status: String,
    pub reported_total_cents: Option<i64>,
    pub internal_total_cents: Option<i64>,
    pub delta_cents: Option<i64>,
    pub checked_at: Option<String>,
    pub notes: Option<String>,
}

impl CommissionStore {
    pub fn upsert_reconciliation(&self, r: &ReconciliationRow) -> LedgerResult<()> {
        self.conn.execute(
            "INSERT INTO reconciliation_record
             (tenant_id, carrier_id, reporting_month, status,
              reported_total_cents, internal_total_cents, delta_cents, checked_at, notes)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT (tenant_id, carrier_id, reporting_month)
             DO UPDATE SET status = excluded.status,
                           reported_total_cents = excluded.reported_total_cents,
                           internal_total_cents = excluded.internal_total_cents,
                           delta_cents = excluded.delta_cents,
                           checked_at = excluded.checked_at,
                           notes = excluded.notes",
            params![
                r.tenant_id,
                r.carrier_id,
                r.reporting_month,
                r.status,
                r.reported_total_cents,
                r.internal_total_cents,
                r.delta_cents,
                r.checked_at,
                r.notes,
            ],
        )?;
        Ok(())
    }

    /// Flag a record disputed, keeping whatever totals were last computed.
    /// Creates the record when the carrier has not been reconciled yet.
    pub fn set_reconciliation_disputed(
        &self,
        tenant_id: &str,
        carrier_id: &str,
        month: &str,
        notes: &str,
        checked_at: &str,
    ) -> LedgerResult<()> {
        self.conn.execute(
            "INSERT INTO reconciliation_record
             (tenant_id, carrier_id, reporting_month, status, notes, checked_at)
             VALUES (?1, ?2, ?3, 'disputed', ?4, ?5)
             ON CONFLICT (tenant_id, carrier_id, reporting_month)
             DO UPDATE SET status = 'disputed',
                           notes = excluded.notes,
                           checked_at = excluded.checked_at",
            params![tenant_id, carrier_id, month, notes, checked_at],
        )?;
        Ok(())
    }

    pub fn reconciliation_for(
        &self,
        tenant_id: &str,
        carrier_id: &str,
        month: &str,
    ) -> LedgerResult<Option<ReconciliationRow>> {
        let row = self
            .conn
            .query_row(
                "SELECT tenant_id, carrier_id, reporting_month, status,
                        reported_total_cents, internal_total_cents, delta_cents, checked_at, notes
                 FROM reconciliation_record
                 WHERE tenant_id = ?1 AND carrier_id = ?2 AND reporting_month = ?3",
                params![tenant_id, carrier_id, month],
                map_reconciliation_row,
            )
            .optional()?;
        Ok(row)
    }

    /// Internal total: the sum of commission over the month's transactions
    /// resolved to this carrier.
    pub fn sum_commission_for_carrier_month(
        &self,
        tenant_id: &str,
        carrier_id: &str,
        month: &str,
    ) -> LedgerResult<i64> {
        let total: i64 = self.conn.query_row(
            "SELECT COALESCE(SUM(commission_cents), 0)
             FROM txn
             WHERE tenant_id = ?1 AND carrier_id = ?2 AND reporting_month = ?3",
            params![tenant_id, carrier_id, month],
            |row| row.get(0),
        )?;
        Ok(total)
    }

    /// Carriers with resolved transaction activity in the month — the
    /// population the month-close reconciliation check walks.
    pub fn carriers_with_activity(&self, tenant_id: &str, month: &str) -> LedgerResult<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT DISTINCT carrier_id FROM txn
             WHERE tenant_id = ?1 AND reporting_month = ?2 AND carrier_id IS NOT NULL
             ORDER BY carrier_id ASC",
        )?;
        let rows = stmt
            .query_map(params![tenant_id, month], |row| row.get(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

fn map_reconciliation_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ReconciliationRow> {
    Ok(ReconciliationRow {
        tenant_id: row.get(0)?,
        carrier_id: row.get(1)?,
        reporting_month: row.get(2)?,
        status: row.get(3)?,
        reported_total_cents: row.get(4)?,
        internal_total_cents: row.get(5)?,
        delta_cents: row.get(6)?,
        checked_at: row.get(7)?,
        notes: row.get(8)?,
    })
}
