//! Import ingestor — batch ingestion of carrier statement rows.
//!
//! Per-row failures are counted, never fatal: a batch fails only when the
//! store itself does. Counters live in the batch row and are bumped as
//! processing proceeds, so progress is durable and a concurrent reader
//! observes a consistent view. Invariant on completion:
//! total = imported + skipped + error + duplicate.

use crate::error::LedgerResult;
use crate::money::Cents;
use crate::resolver::{self, Resolution};
use crate::scope::AccessScope;
use crate::store::{CommissionStore, ImportBatchRow, TxnInsert, TxnRow};
use crate::types::ReportingMonth;
use chrono::Utc;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One parsed statement row as handed over by the raw statement source.
/// File-format parsing happens upstream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawStatementRow {
    pub carrier: String,
    pub policy_number: String,
    #[serde(default)]
    pub transaction_type: String,
    pub reporting_month: String,
    #[serde(default)]
    pub insured_name: Option<String>,
    #[serde(default)]
    pub line_of_business: Option<String>,
    #[serde(default)]
    pub effective_date: Option<String>,
    #[serde(default)]
    pub gross_premium_cents: Option<Cents>,
    #[serde(default)]
    pub commission_rate: Option<f64>,
    #[serde(default)]
    pub commission_cents: Option<Cents>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone)]
pub struct BatchDescriptor {
    pub file_name: String,
}

/// Ingest a batch of raw rows. Admin only. Returns the completed batch
/// record with exact counters.
pub fn import_batch(
    store: &CommissionStore,
    scope: &AccessScope,
    descriptor: &BatchDescriptor,
    rows: &[RawStatementRow],
) -> LedgerResult<ImportBatchRow> {
    scope.require_admin("import_batch")?;
    let tenant = scope.tenant_id.as_str();
    let batch_id = Uuid::new_v4().to_string();
    let now = Utc::now().to_rfc3339();

    store.insert_batch(&ImportBatchRow {
        batch_id: batch_id.clone(),
        tenant_id: tenant.to_string(),
        file_name: descriptor.file_name.clone(),
        status: "pending".to_string(),
        total_rows: rows.len() as i64,
        imported_rows: 0,
        skipped_rows: 0,
        error_rows: 0,
        duplicate_rows: 0,
        created_at: now,
    })?;
    store.set_batch_status(tenant, &batch_id, "processing")?;

    for (index, row) in rows.iter().enumerate() {
        let counter = match process_row(store, tenant, &batch_id, row) {
            Ok(outcome) => {
                match outcome {
                    RowOutcome::Imported => "imported_rows",
                    RowOutcome::Skipped => {
                        debug!("batch {batch_id}: row {index} carries zero commission, skipped");
                        "skipped_rows"
                    }
                    RowOutcome::Duplicate => {
                        debug!("batch {batch_id}: row {index} is a duplicate statement line");
                        "duplicate_rows"
                    }
                    RowOutcome::Invalid(reason) => {
                        debug!("batch {batch_id}: row {index} rejected: {reason}");
                        "error_rows"
                    }
                }
            }
            Err(e) => {
                // The store itself failed — the one condition that fails
                // the whole batch.
                if let Err(status_err) = store.set_batch_status(tenant, &batch_id, "failed") {
                    warn!("batch {batch_id}: could not mark batch failed: {status_err}");
                }
                return Err(e);
            }
        };
        store.bump_batch_counter(tenant, &batch_id, counter)?;
    }

    store.set_batch_status(tenant, &batch_id, "completed")?;
    let batch = store
        .batch_by_id(tenant, &batch_id)?
        .ok_or_else(|| crate::error::LedgerError::not_found("import batch", &batch_id))?;
    info!(
        "batch {batch_id} completed: {} imported, {} skipped, {} errors, {} duplicates of {} rows",
        batch.imported_rows, batch.skipped_rows, batch.error_rows, batch.duplicate_rows, batch.total_rows
    );
    Ok(batch)
}

enum RowOutcome {
    Imported,
    Skipped,
    Duplicate,
    Invalid(String),
}

fn process_row(
    store: &CommissionStore,
    tenant: &str,
    batch_id: &str,
    row: &RawStatementRow,
) -> LedgerResult<RowOutcome> {
    let carrier_name = row.carrier.trim();
    if carrier_name.is_empty() {
        return Ok(RowOutcome::Invalid("missing carrier".into()));
    }
    let policy = row.policy_number.trim();
    if policy.is_empty() {
        return Ok(RowOutcome::Invalid("missing policy number".into()));
    }
    let month = match ReportingMonth::parse(&row.reporting_month) {
        Ok(m) => m,
        Err(e) => return Ok(RowOutcome::Invalid(e.to_string())),
    };
    let commission = match row.commission_cents {
        Some(c) => c,
        None => return Ok(RowOutcome::Invalid("missing commission amount".into())),
    };
    // Informational $0 statement lines carry nothing to allocate.
    if commission == 0 {
        return Ok(RowOutcome::Skipped);
    }

    // Statements abbreviate types inconsistently; a blank one still has to
    // participate in the dedup key.
    let txn_type = {
        let t = row.transaction_type.trim();
        if t.is_empty() { "unknown" } else { t }
    };

    let carrier_id = match resolver::resolve(store, tenant, carrier_name)? {
        Resolution::Carrier(id) => Some(id),
        Resolution::Unresolved => None,
    };
    let carrier_key = carrier_id.as_deref().unwrap_or(carrier_name);
    let key = dedup_key(carrier_key, policy, txn_type, month.as_str());

    // A line first imported while its carrier was unresolved sits on the
    // books under the free-text-name key. Once the carrier or an alias is
    // registered the same line keys on the canonical id, so the unique
    // index alone would let it in twice. Probe the legacy key first.
    if carrier_id.is_some() {
        let legacy_key = dedup_key(carrier_name, policy, txn_type, month.as_str());
        if legacy_key != key && store.txn_exists_by_dedup_key(tenant, &legacy_key)? {
            return Ok(RowOutcome::Duplicate);
        }
    }

    let now = Utc::now().to_rfc3339();
    let txn = TxnRow {
        txn_id: Uuid::new_v4().to_string(),
        tenant_id: tenant.to_string(),
        batch_id: Some(batch_id.to_string()),
        policy_number: policy.to_string(),
        carrier_name: carrier_name.to_string(),
        carrier_id,
        insured_name: row.insured_name.clone(),
        transaction_type: txn_type.to_string(),
        line_of_business: row.line_of_business.clone(),
        effective_date: row.effective_date.clone(),
        reporting_month: month.as_str().to_string(),
        gross_premium_cents: row.gross_premium_cents,
        commission_rate: row.commission_rate,
        commission_cents: commission,
        notes: row.notes.clone(),
        dedup_key: key,
        created_at: now.clone(),
        updated_at: now,
    };
    match store.insert_txn(&txn)? {
        TxnInsert::Inserted => Ok(RowOutcome::Imported),
        TxnInsert::Duplicate => Ok(RowOutcome::Duplicate),
    }
}

/// The tuple identifying a unique carrier statement line. Two rows naming
/// the same canonical carrier through different aliases produce the same
/// key; unresolved carriers fall back to the normalized free-text name.
fn dedup_key(carrier_key: &str, policy: &str, txn_type: &str, month: &str) -> String {
    format!(
        "{}|{}|{}|{}",
        carrier_key.to_lowercase(),
        policy.to_uppercase(),
        txn_type.to_lowercase(),
        month
    )
}
