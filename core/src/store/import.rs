use super::{is_constraint_violation, CommissionStore};
use crate::error::{LedgerError, LedgerResult};
use rusqlite::{params, params_from_iter, OptionalExtension};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportBatchRow {
    pub batch_id: String,
    pub tenant_id: String,
    pub file_name: String,
    pub status: String,
    pub total_rows: i64,
    pub imported_rows: i64,
    pub skipped_rows: i64,
    pub error_rows: i64,
    pub duplicate_rows: i64,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TxnRow {
    pub txn_id: String,
    pub tenant_id: String,
    pub batch_id: Option<String>,
    pub policy_number: String,
    /// Carrier name exactly as reported on the statement.
    pub carrier_name: String,
    /// Canonical carrier id when the name resolved, else None.
    pub carrier_id: Option<String>,
    pub insured_name: Option<String>,
    pub transaction_type: String,
    pub line_of_business: Option<String>,
    pub effective_date: Option<String>,
    pub reporting_month: String,
    pub gross_premium_cents: Option<i64>,
    pub commission_rate: Option<f64>,
    pub commission_cents: i64,
    pub notes: Option<String>,
    pub dedup_key: String,
    pub created_at: String,
    pub updated_at: String,
}

/// Outcome of a transaction insert. A dedup-key collision — whether a
/// pre-existing row or a lost concurrent race — is data, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxnInsert {
    Inserted,
    Duplicate,
}

impl CommissionStore {
    // ── Import batch ───────────────────────────────────────────

    pub fn insert_batch(&self, b: &ImportBatchRow) -> LedgerResult<()> {
        self.conn.execute(
            "INSERT INTO import_batch
             (batch_id, tenant_id, file_name, status, total_rows,
              imported_rows, skipped_rows, error_rows, duplicate_rows, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                b.batch_id,
                b.tenant_id,
                b.file_name,
                b.status,
                b.total_rows,
                b.imported_rows,
                b.skipped_rows,
                b.error_rows,
                b.duplicate_rows,
                b.created_at,
            ],
        )?;
        Ok(())
    }

    pub fn set_batch_status(&self, tenant_id: &str, batch_id: &str, status: &str) -> LedgerResult<()> {
        self.conn.execute(
            "UPDATE import_batch SET status = ?1 WHERE tenant_id = ?2 AND batch_id = ?3",
            params![status, tenant_id, batch_id],
        )?;
        Ok(())
    }

    /// Increment one batch counter by one. Counters are durable job state:
    /// they are bumped in the row as processing proceeds and never
    /// decremented. The column name is whitelisted, never interpolated
    /// from caller input.
    pub fn bump_batch_counter(
        &self,
        tenant_id: &str,
        batch_id: &str,
        counter: &str,
    ) -> LedgerResult<()> {
        let sql = match counter {
            "imported_rows" => {
                "UPDATE import_batch SET imported_rows = imported_rows + 1
                 WHERE tenant_id = ?1 AND batch_id = ?2"
            }
            "skipped_rows" => {
                "UPDATE import_batch SET skipped_rows = skipped_rows + 1
                 WHERE tenant_id = ?1 AND batch_id = ?2"
            }
            "error_rows" => {
                "UPDATE import_batch SET error_rows = error_rows + 1
                 WHERE tenant_id = ?1 AND batch_id = ?2"
            }
            "duplicate_rows" => {
                "UPDATE import_batch SET duplicate_rows = duplicate_rows + 1
                 WHERE tenant_id = ?1 AND batch_id = ?2"
            }
            other => {
                return Err(LedgerError::Validation(format!(
                    "unknown batch counter '{other}'"
                )))
            }
        };
        self.conn.execute(sql, params![tenant_id, batch_id])?;
        Ok(())
    }

    pub fn batch_by_id(&self, tenant_id: &str, batch_id: &str) -> LedgerResult<Option<ImportBatchRow>> {
        let row = self
            .conn
            .query_row(
                "SELECT batch_id, tenant_id, file_name, status, total_rows,
                        imported_rows, skipped_rows, error_rows, duplicate_rows, created_at
                 FROM import_batch WHERE tenant_id = ?1 AND batch_id = ?2",
                params![tenant_id, batch_id],
                map_batch_row,
            )
            .optional()?;
        Ok(row)
    }

    // ── Transactions ───────────────────────────────────────────

    /// Insert a transaction. The unique index on (tenant_id, dedup_key)
    /// is the concurrency enforcement point: a constraint violation means
    /// this statement line is already on the books.
    pub fn insert_txn(&self, t: &TxnRow) -> LedgerResult<TxnInsert> {
        let result = self.conn.execute(
            "INSERT INTO txn
             (txn_id, tenant_id, batch_id, policy_number, carrier_name, carrier_id,
              insured_name, transaction_type, line_of_business, effective_date,
              reporting_month, gross_premium_cents, commission_rate, commission_cents,
              notes, dedup_key, created_at, updated_at)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17,?18)",
            params![
                t.txn_id,
                t.tenant_id,
                t.batch_id,
                t.policy_number,
                t.carrier_name,
                t.carrier_id,
                t.insured_name,
                t.transaction_type,
                t.line_of_business,
                t.effective_date,
                t.reporting_month,
                t.gross_premium_cents,
                t.commission_rate,
                t.commission_cents,
                t.notes,
                t.dedup_key,
                t.created_at,
                t.updated_at,
            ],
        );
        match result {
            Ok(_) => Ok(TxnInsert::Inserted),
            Err(e) if is_constraint_violation(&e) => Ok(TxnInsert::Duplicate),
            Err(e) => Err(e.into()),
        }
    }

    pub fn txn_by_id(&self, tenant_id: &str, txn_id: &str) -> LedgerResult<Option<TxnRow>> {
        let row = self
            .conn
            .query_row(
                &format!("{TXN_SELECT} WHERE tenant_id = ?1 AND txn_id = ?2"),
                params![tenant_id, txn_id],
                map_txn_row,
            )
            .optional()?;
        Ok(row)
    }

    /// All of a tenant's transactions, optionally narrowed to one month.
    /// Admin-scope read.
    pub fn txns_for_tenant(&self, tenant_id: &str, month: Option<&str>) -> LedgerResult<Vec<TxnRow>> {
        match month {
            Some(m) => {
                let mut stmt = self.conn.prepare(&format!(
                    "{TXN_SELECT} WHERE tenant_id = ?1 AND reporting_month = ?2
                     ORDER BY created_at ASC, txn_id ASC"
                ))?;
                let rows = stmt
                    .query_map(params![tenant_id, m], map_txn_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            }
            None => {
                let mut stmt = self.conn.prepare(&format!(
                    "{TXN_SELECT} WHERE tenant_id = ?1 ORDER BY created_at ASC, txn_id ASC"
                ))?;
                let rows = stmt
                    .query_map(params![tenant_id], map_txn_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            }
        }
    }

    /// Transactions visible to an agent-role caller: only those carrying
    /// an allocation for one of the caller's agent ids. The scope filter
    /// is this join — never free-text matching.
    pub fn txns_for_agents(
        &self,
        tenant_id: &str,
        agent_ids: &[String],
        month: Option<&str>,
    ) -> LedgerResult<Vec<TxnRow>> {
        if agent_ids.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = agent_ids
            .iter()
            .enumerate()
            .map(|(i, _)| format!("?{}", i + 2))
            .collect::<Vec<_>>()
            .join(",");
        let month_clause = if month.is_some() {
            format!(" AND t.reporting_month = ?{}", agent_ids.len() + 2)
        } else {
            String::new()
        };
        let sql = format!(
            "SELECT DISTINCT {TXN_COLUMNS_T}
             FROM txn t
             JOIN allocation a
               ON a.tenant_id = t.tenant_id AND a.txn_id = t.txn_id
             WHERE t.tenant_id = ?1 AND a.agent_id IN ({placeholders}){month_clause}
             ORDER BY t.created_at ASC, t.txn_id ASC"
        );
        let mut values: Vec<String> = Vec::with_capacity(agent_ids.len() + 2);
        values.push(tenant_id.to_string());
        values.extend(agent_ids.iter().cloned());
        if let Some(m) = month {
            values.push(m.to_string());
        }
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(values.iter()), map_txn_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Whether any transaction already carries this dedup key. The
    /// ingestor probes the free-text-name form of a key here before
    /// inserting under a newly canonical carrier id.
    pub fn txn_exists_by_dedup_key(&self, tenant_id: &str, dedup_key: &str) -> LedgerResult<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM txn WHERE tenant_id = ?1 AND dedup_key = ?2",
            params![tenant_id, dedup_key],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    pub fn txn_count(&self, tenant_id: &str) -> LedgerResult<i64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM txn WHERE tenant_id = ?1",
            params![tenant_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

const TXN_COLUMNS_T: &str = "t.txn_id, t.tenant_id, t.batch_id, t.policy_number, t.carrier_name,
     t.carrier_id, t.insured_name, t.transaction_type, t.line_of_business,
     t.effective_date, t.reporting_month, t.gross_premium_cents, t.commission_rate,
     t.commission_cents, t.notes, t.dedup_key, t.created_at, t.updated_at";

const TXN_SELECT: &str = "SELECT txn_id, tenant_id, batch_id, policy_number, carrier_name, carrier_id,
     insured_name, transaction_type, line_of_business, effective_date,
     reporting_month, gross_premium_cents, commission_rate, commission_cents,
     notes, dedup_key, created_at, updated_at FROM txn";

fn map_batch_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ImportBatchRow> {
    Ok(ImportBatchRow {
        batch_id: row.get(0)?,
        tenant_id: row.get(1)?,
        file_name: row.get(2)?,
        status: row.get(3)?,
        total_rows: row.get(4)?,
        imported_rows: row.get(5)?,
        skipped_rows: row.get(6)?,
        error_rows: row.get(7)?,
        duplicate_rows: row.get(8)?,
        created_at: row.get(9)?,
    })
}

pub(super) fn map_txn_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<TxnRow> {
    Ok(TxnRow {
        txn_id: row.get(0)?,
        tenant_id: row.get(1)?,
        batch_id: row.get(2)?,
        policy_number: row.get(3)?,
        carrier_name: row.get(4)?,
        carrier_id: row.get(5)?,
        insured_name: row.get(6)?,
        transaction_type: row.get(7)?,
        line_of_business: row.get(8)?,
        effective_date: row.get(9)?,
        reporting_month: row.get(10)?,
        gross_premium_cents: row.get(11)?,
        commission_rate: row.get(12)?,
        commission_cents: row.get(13)?,
        notes: row.get(14)?,
        dedup_key: row.get(15)?,
        created_at: row.get(16)?,
        updated_at: row.get(17)?,
    })
}
