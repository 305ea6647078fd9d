//! Anomaly detector — a rule battery over transactions and allocations.
//!
//! Detection is idempotent: each violation upserts against the open-anomaly
//! unique index, so re-running on an unchanged transaction refreshes the
//! existing record instead of stacking a second one. A rule failure is
//! logged and never suppresses the other rules. Resolution is a one-way
//! transition; reopening is a distinct, explicit admin action.

use crate::config::EngineConfig;
use crate::error::{LedgerError, LedgerResult};
use crate::scope::AccessScope;
use crate::store::{AllocationRow, AnomalyRow, CommissionStore, TxnRow};
use crate::types::ReportingMonth;
use chrono::Utc;
use log::warn;
use uuid::Uuid;

pub const RULE_SPLIT_TOTAL_MISMATCH: &str = "split-total-mismatch";
pub const RULE_UNALLOCATED_TRANSACTION: &str = "unallocated-transaction";
pub const RULE_RATE_MISMATCH: &str = "rate-mismatch";
pub const RULE_ORPHANED_ALLOCATION: &str = "orphaned-allocation";

pub const SEVERITY_ERROR: &str = "error";
pub const SEVERITY_WARNING: &str = "warning";

#[derive(Debug, Default, Clone, Copy)]
pub struct DetectionSummary {
    pub examined: usize,
    pub flagged: usize,
}

/// Run all rules against one transaction. Admin only.
pub fn detect_transaction(
    store: &CommissionStore,
    config: &EngineConfig,
    scope: &AccessScope,
    txn_id: &str,
) -> LedgerResult<DetectionSummary> {
    scope.require_admin("detect_transaction")?;
    let tenant = scope.tenant_id.as_str();
    let txn = store
        .txn_by_id(tenant, txn_id)?
        .ok_or_else(|| LedgerError::not_found("transaction", txn_id))?;
    Ok(DetectionSummary {
        examined: 1,
        flagged: detect_one(store, config, tenant, &txn),
    })
}

/// Run all rules against every transaction in a reporting month.
pub fn detect_month(
    store: &CommissionStore,
    config: &EngineConfig,
    scope: &AccessScope,
    month: &ReportingMonth,
) -> LedgerResult<DetectionSummary> {
    scope.require_admin("detect_month")?;
    let tenant = scope.tenant_id.as_str();
    let txns = store.txns_for_tenant(tenant, Some(month.as_str()))?;
    let mut summary = DetectionSummary::default();
    for txn in &txns {
        summary.examined += 1;
        summary.flagged += detect_one(store, config, tenant, txn);
    }
    Ok(summary)
}

/// Apply every rule to one transaction, counting flagged violations.
/// Each rule runs even when an earlier one fails.
fn detect_one(store: &CommissionStore, config: &EngineConfig, tenant: &str, txn: &TxnRow) -> usize {
    let allocations = match store.allocations_for_txn(tenant, &txn.txn_id) {
        Ok(a) => a,
        Err(e) => {
            warn!("anomaly detection: cannot load allocations for txn {}: {e}", txn.txn_id);
            return 0;
        }
    };

    let rules: [(&str, LedgerResult<bool>); 4] = [
        (
            RULE_SPLIT_TOTAL_MISMATCH,
            check_split_total(store, config, tenant, txn, &allocations),
        ),
        (
            RULE_UNALLOCATED_TRANSACTION,
            check_unallocated(store, tenant, txn, &allocations),
        ),
        (
            RULE_RATE_MISMATCH,
            check_rate_mismatch(store, config, tenant, txn),
        ),
        (
            RULE_ORPHANED_ALLOCATION,
            check_orphaned_allocations(store, tenant, txn, &allocations),
        ),
    ];

    let mut flagged = 0;
    for (rule, result) in rules {
        match result {
            Ok(true) => flagged += 1,
            Ok(false) => {}
            Err(e) => warn!("anomaly rule {rule} failed for txn {}: {e}", txn.txn_id),
        }
    }
    flagged
}

fn check_split_total(
    store: &CommissionStore,
    config: &EngineConfig,
    tenant: &str,
    txn: &TxnRow,
    allocations: &[AllocationRow],
) -> LedgerResult<bool> {
    if allocations.is_empty() {
        return Ok(false);
    }
    let total: f64 = allocations.iter().map(|a| a.split_percent).sum();
    if (total - 100.0).abs() <= config.split_total_epsilon {
        return Ok(false);
    }
    flag(
        store,
        tenant,
        txn,
        RULE_SPLIT_TOTAL_MISMATCH,
        SEVERITY_ERROR,
        None,
        format!(
            "allocation percents sum to {total:.2} on policy {}, expected 100",
            txn.policy_number
        ),
    )?;
    Ok(true)
}

fn check_unallocated(
    store: &CommissionStore,
    tenant: &str,
    txn: &TxnRow,
    allocations: &[AllocationRow],
) -> LedgerResult<bool> {
    if txn.commission_cents == 0 || !allocations.is_empty() {
        return Ok(false);
    }
    flag(
        store,
        tenant,
        txn,
        RULE_UNALLOCATED_TRANSACTION,
        SEVERITY_WARNING,
        None,
        format!(
            "transaction on policy {} has commission but no allocations",
            txn.policy_number
        ),
    )?;
    Ok(true)
}

fn check_rate_mismatch(
    store: &CommissionStore,
    config: &EngineConfig,
    tenant: &str,
    txn: &TxnRow,
) -> LedgerResult<bool> {
    let (Some(carrier_id), Some(rate)) = (txn.carrier_id.as_deref(), txn.commission_rate) else {
        return Ok(false);
    };
    let Some(carrier) = store.carrier_by_id(tenant, carrier_id)? else {
        return Ok(false);
    };
    let default_rate = match txn.transaction_type.to_lowercase().as_str() {
        "new" | "new_business" | "new business" => carrier.new_business_rate,
        "renewal" => carrier.renewal_rate,
        _ => None,
    };
    let Some(expected) = default_rate else {
        return Ok(false);
    };
    if (rate - expected).abs() <= config.rate_tolerance {
        return Ok(false);
    }
    flag(
        store,
        tenant,
        txn,
        RULE_RATE_MISMATCH,
        SEVERITY_WARNING,
        None,
        format!(
            "commission rate {rate:.2} deviates from carrier default {expected:.2} for {} business",
            txn.transaction_type
        ),
    )?;
    Ok(true)
}

fn check_orphaned_allocations(
    store: &CommissionStore,
    tenant: &str,
    txn: &TxnRow,
    allocations: &[AllocationRow],
) -> LedgerResult<bool> {
    let mut missing: Vec<&str> = Vec::new();
    for a in allocations {
        if store.agent_by_id(tenant, &a.agent_id)?.is_none() {
            missing.push(&a.agent_id);
        }
    }
    if missing.is_empty() {
        return Ok(false);
    }
    let first = missing[0].to_string();
    flag(
        store,
        tenant,
        txn,
        RULE_ORPHANED_ALLOCATION,
        SEVERITY_ERROR,
        Some(first),
        format!(
            "allocations reference unknown agent(s): {}",
            missing.join(", ")
        ),
    )?;
    Ok(true)
}

fn flag(
    store: &CommissionStore,
    tenant: &str,
    txn: &TxnRow,
    rule: &str,
    severity: &str,
    agent_id: Option<String>,
    message: String,
) -> LedgerResult<()> {
    store.upsert_open_anomaly(&AnomalyRow {
        anomaly_id: Uuid::new_v4().to_string(),
        tenant_id: tenant.to_string(),
        rule: rule.to_string(),
        severity: severity.to_string(),
        txn_id: Some(txn.txn_id.clone()),
        agent_id,
        reporting_month: txn.reporting_month.clone(),
        message,
        detected_at: Utc::now().to_rfc3339(),
        is_resolved: false,
        resolved_at: None,
        resolution_notes: None,
    })
}

// ── Lifecycle operations ───────────────────────────────────────

/// Resolve an open anomaly. Admin only; notes are required; resolving an
/// already-resolved record fails (the transition is one-way).
pub fn resolve_anomaly(
    store: &CommissionStore,
    scope: &AccessScope,
    anomaly_id: &str,
    notes: &str,
) -> LedgerResult<()> {
    scope.require_admin("resolve_anomaly")?;
    let tenant = scope.tenant_id.as_str();
    if notes.trim().is_empty() {
        return Err(LedgerError::Validation(
            "resolution notes are required".to_string(),
        ));
    }
    let row = store
        .anomaly_by_id(tenant, anomaly_id)?
        .ok_or_else(|| LedgerError::not_found("anomaly", anomaly_id))?;
    if row.is_resolved {
        return Err(LedgerError::Validation(format!(
            "anomaly '{anomaly_id}' is already resolved"
        )));
    }
    store.resolve_anomaly(tenant, anomaly_id, &Utc::now().to_rfc3339(), notes.trim())?;
    Ok(())
}

/// Clear a resolution — the deliberate admin action that re-opens a
/// record. Never happens automatically.
pub fn reopen_anomaly(
    store: &CommissionStore,
    scope: &AccessScope,
    anomaly_id: &str,
) -> LedgerResult<()> {
    scope.require_admin("reopen_anomaly")?;
    let tenant = scope.tenant_id.as_str();
    let row = store
        .anomaly_by_id(tenant, anomaly_id)?
        .ok_or_else(|| LedgerError::not_found("anomaly", anomaly_id))?;
    if !row.is_resolved {
        return Err(LedgerError::Validation(format!(
            "anomaly '{anomaly_id}' is already open"
        )));
    }
    store.reopen_anomaly(tenant, anomaly_id)
}

/// Open anomalies for the reporting layer, optionally narrowed to one
/// month. Operator-facing, admin only.
pub fn open_anomalies(
    store: &CommissionStore,
    scope: &AccessScope,
    month: Option<&ReportingMonth>,
) -> LedgerResult<Vec<AnomalyRow>> {
    scope.require_admin("open_anomalies")?;
    store.open_anomalies(scope.tenant_id.as_str(), month.map(|m| m.as_str()))
}
