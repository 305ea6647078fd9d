use super::{is_constraint_violation, CommissionStore};
use crate::error::{LedgerError, LedgerResult};
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnomalyRow {
    pub anomaly_id: String,
    pub tenant_id: String,
    pub rule: String,
    pub severity: String,
    pub txn_id: Option<String>,
    pub agent_id: Option<String>,
    pub reporting_month: String,
    pub message: String,
    pub detected_at: String,
    pub is_resolved: bool,
    pub resolved_at: Option<String>,
    pub resolution_notes: Option<String>,
}

impl CommissionStore {
    /// Record a violation. The partial unique index on
    /// (tenant, rule, txn) WHERE is_resolved = 0 makes re-detection
    /// refresh the existing open record instead of stacking a second one.
    pub fn upsert_open_anomaly(&self, a: &AnomalyRow) -> LedgerResult<()> {
        self.conn.execute(
            "INSERT INTO anomaly
             (anomaly_id, tenant_id, rule, severity, txn_id, agent_id,
              reporting_month, message, detected_at, is_resolved, resolved_at, resolution_notes)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 0, NULL, NULL)
             ON CONFLICT (tenant_id, rule, txn_id) WHERE is_resolved = 0
             DO UPDATE SET severity = excluded.severity,
                           agent_id = excluded.agent_id,
                           message = excluded.message,
                           detected_at = excluded.detected_at",
            params![
                a.anomaly_id,
                a.tenant_id,
                a.rule,
                a.severity,
                a.txn_id,
                a.agent_id,
                a.reporting_month,
                a.message,
                a.detected_at,
            ],
        )?;
        Ok(())
    }

    pub fn anomaly_by_id(&self, tenant_id: &str, anomaly_id: &str) -> LedgerResult<Option<AnomalyRow>> {
        let row = self
            .conn
            .query_row(
                &format!("{ANOMALY_SELECT} WHERE tenant_id = ?1 AND anomaly_id = ?2"),
                params![tenant_id, anomaly_id],
                map_anomaly_row,
            )
            .optional()?;
        Ok(row)
    }

    /// One-way resolution. Returns false when the record was already
    /// resolved (zero rows updated).
    pub fn resolve_anomaly(
        &self,
        tenant_id: &str,
        anomaly_id: &str,
        resolved_at: &str,
        notes: &str,
    ) -> LedgerResult<bool> {
        let updated = self.conn.execute(
            "UPDATE anomaly
             SET is_resolved = 1, resolved_at = ?1, resolution_notes = ?2
             WHERE tenant_id = ?3 AND anomaly_id = ?4 AND is_resolved = 0",
            params![resolved_at, notes, tenant_id, anomaly_id],
        )?;
        Ok(updated > 0)
    }

    /// Clear resolution fields — the explicit admin reopen action. Fails
    /// with Conflict when another open anomaly already covers the same
    /// rule and transaction.
    pub fn reopen_anomaly(&self, tenant_id: &str, anomaly_id: &str) -> LedgerResult<()> {
        let result = self.conn.execute(
            "UPDATE anomaly
             SET is_resolved = 0, resolved_at = NULL, resolution_notes = NULL
             WHERE tenant_id = ?1 AND anomaly_id = ?2",
            params![tenant_id, anomaly_id],
        );
        match result {
            Ok(_) => Ok(()),
            Err(e) if is_constraint_violation(&e) => Err(LedgerError::Conflict(
                "an open anomaly already exists for this rule and transaction".to_string(),
            )),
            Err(e) => Err(e.into()),
        }
    }

    pub fn open_anomalies(
        &self,
        tenant_id: &str,
        month: Option<&str>,
    ) -> LedgerResult<Vec<AnomalyRow>> {
        match month {
            Some(m) => {
                let mut stmt = self.conn.prepare(&format!(
                    "{ANOMALY_SELECT}
                     WHERE tenant_id = ?1 AND is_resolved = 0 AND reporting_month = ?2
                     ORDER BY detected_at ASC, anomaly_id ASC"
                ))?;
                let rows = stmt
                    .query_map(params![tenant_id, m], map_anomaly_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            }
            None => {
                let mut stmt = self.conn.prepare(&format!(
                    "{ANOMALY_SELECT}
                     WHERE tenant_id = ?1 AND is_resolved = 0
                     ORDER BY detected_at ASC, anomaly_id ASC"
                ))?;
                let rows = stmt
                    .query_map(params![tenant_id], map_anomaly_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            }
        }
    }
}

const ANOMALY_SELECT: &str = "SELECT anomaly_id, tenant_id, rule, severity, txn_id, agent_id,
     reporting_month, message, detected_at, is_resolved, resolved_at, resolution_notes
     FROM anomaly";

fn map_anomaly_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<AnomalyRow> {
    Ok(AnomalyRow {
        anomaly_id: row.get(0)?,
        tenant_id: row.get(1)?,
        rule: row.get(2)?,
        severity: row.get(3)?,
        txn_id: row.get(4)?,
        agent_id: row.get(5)?,
        reporting_month: row.get(6)?,
        message: row.get(7)?,
        detected_at: row.get(8)?,
        is_resolved: row.get::<_, i64>(9)? != 0,
        resolved_at: row.get(10)?,
        resolution_notes: row.get(11)?,
    })
}
