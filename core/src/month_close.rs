//! Month-close validator — a fixed battery of consistency checks over a
//! reporting month.
//!
//! The validator never mutates state and never blocks a close: every
//! check always runs and the battery always returns results, failures
//! included. A check whose own queries fail reports as failed with the
//! error text rather than aborting the battery.

use crate::error::LedgerResult;
use crate::scope::AccessScope;
use crate::store::CommissionStore;
use crate::types::ReportingMonth;
use serde::Serialize;

pub const CHECK_NO_UNRESOLVED_ANOMALIES: &str = "no-unresolved-anomalies";
pub const CHECK_ALL_TRANSACTIONS_ALLOCATED: &str = "all-transactions-allocated";
pub const CHECK_ALLOCATION_AGENTS_ACTIVE: &str = "allocation-agents-active";
pub const CHECK_CARRIER_RECONCILIATION_MATCHED: &str = "carrier-reconciliation-matched";

#[derive(Debug, Clone, Serialize)]
pub struct CheckResult {
    pub name: &'static str,
    pub passed: bool,
    pub message: Option<String>,
}

pub fn all_passed(checks: &[CheckResult]) -> bool {
    checks.iter().all(|c| c.passed)
}

/// Run the full battery. Admin only.
pub fn validate_month_close(
    store: &CommissionStore,
    scope: &AccessScope,
    month: &ReportingMonth,
) -> LedgerResult<Vec<CheckResult>> {
    scope.require_admin("validate_month_close")?;
    let tenant = scope.tenant_id.as_str();
    let m = month.as_str();

    Ok(vec![
        run_check(CHECK_NO_UNRESOLVED_ANOMALIES, || {
            check_no_unresolved_anomalies(store, tenant, m)
        }),
        run_check(CHECK_ALL_TRANSACTIONS_ALLOCATED, || {
            check_all_transactions_allocated(store, tenant, m)
        }),
        run_check(CHECK_ALLOCATION_AGENTS_ACTIVE, || {
            check_allocation_agents_active(store, tenant, m)
        }),
        run_check(CHECK_CARRIER_RECONCILIATION_MATCHED, || {
            check_carrier_reconciliation_matched(store, tenant, m)
        }),
    ])
}

/// A check returns None to pass, Some(message) naming the offenders to
/// fail. A query error becomes a failing result, never an aborted battery.
fn run_check(
    name: &'static str,
    check: impl FnOnce() -> LedgerResult<Option<String>>,
) -> CheckResult {
    match check() {
        Ok(None) => CheckResult {
            name,
            passed: true,
            message: None,
        },
        Ok(Some(message)) => CheckResult {
            name,
            passed: false,
            message: Some(message),
        },
        Err(e) => CheckResult {
            name,
            passed: false,
            message: Some(format!("check could not run: {e}")),
        },
    }
}

fn check_no_unresolved_anomalies(
    store: &CommissionStore,
    tenant: &str,
    month: &str,
) -> LedgerResult<Option<String>> {
    let open = store.open_anomalies(tenant, Some(month))?;
    if open.is_empty() {
        return Ok(None);
    }
    let names: Vec<String> = open
        .iter()
        .map(|a| format!("{} ({})", a.anomaly_id, a.rule))
        .collect();
    Ok(Some(format!(
        "{} unresolved anomalies in {month}: {}",
        open.len(),
        names.join(", ")
    )))
}

fn check_all_transactions_allocated(
    store: &CommissionStore,
    tenant: &str,
    month: &str,
) -> LedgerResult<Option<String>> {
    let unallocated = store.unallocated_txn_ids(tenant, month)?;
    if unallocated.is_empty() {
        return Ok(None);
    }
    Ok(Some(format!(
        "{} transactions without allocations: {}",
        unallocated.len(),
        unallocated.join(", ")
    )))
}

fn check_allocation_agents_active(
    store: &CommissionStore,
    tenant: &str,
    month: &str,
) -> LedgerResult<Option<String>> {
    let mut offenders = Vec::new();
    for agent_id in store.allocation_agent_ids_for_month(tenant, month)? {
        match store.agent_by_id(tenant, &agent_id)? {
            Some(agent) if agent.is_active => {}
            Some(_) => offenders.push(format!("{agent_id} (inactive)")),
            None => offenders.push(format!("{agent_id} (missing)")),
        }
    }
    if offenders.is_empty() {
        return Ok(None);
    }
    Ok(Some(format!(
        "allocations reference {} non-active agents: {}",
        offenders.len(),
        offenders.join(", ")
    )))
}

fn check_carrier_reconciliation_matched(
    store: &CommissionStore,
    tenant: &str,
    month: &str,
) -> LedgerResult<Option<String>> {
    let mut offenders = Vec::new();
    for carrier_id in store.carriers_with_activity(tenant, month)? {
        // A carrier with activity but no record has not been compared yet.
        let status = store
            .reconciliation_for(tenant, &carrier_id, month)?
            .map(|r| r.status)
            .unwrap_or_else(|| "pending".to_string());
        if status != "matched" {
            offenders.push(format!("{carrier_id} ({status})"));
        }
    }
    if offenders.is_empty() {
        return Ok(None);
    }
    Ok(Some(format!(
        "{} carriers not reconciled for {month}: {}",
        offenders.len(),
        offenders.join(", ")
    )))
}
