//! Allocation engine — splits a transaction's commission across agents
//! by percentage, replacing any prior allocation set atomically.
//!
//! Percent totals that do not sum to 100 are deliberately NOT rejected
//! here; the anomaly detector flags them. Allocation replacement must
//! never be blocked by a late-arriving correction workflow.

use crate::config::EngineConfig;
use crate::error::{LedgerError, LedgerResult};
use crate::money;
use crate::scope::AccessScope;
use crate::store::{AllocationRow, CommissionStore};
use crate::types::EntityId;
use chrono::Utc;
use log::info;
use serde::Deserialize;
use std::collections::HashSet;
use uuid::Uuid;

#[derive(Debug, Clone, Deserialize)]
pub struct AllocationInput {
    pub agent_id: EntityId,
    pub split_percent: f64,
}

/// Replace the full allocation set for a transaction. Admin only.
///
/// When the percents sum to 100 within the configured epsilon, the cent
/// remainder is assigned by the explicit `remainder_index` policy so the
/// amounts sum exactly to the transaction's commission.
pub fn replace_allocations(
    store: &CommissionStore,
    config: &EngineConfig,
    scope: &AccessScope,
    txn_id: &str,
    inputs: &[AllocationInput],
) -> LedgerResult<Vec<AllocationRow>> {
    scope.require_admin("replace_allocations")?;
    let tenant = scope.tenant_id.as_str();

    if inputs.is_empty() {
        return Err(LedgerError::Validation(
            "allocation set must not be empty".to_string(),
        ));
    }
    let mut seen = HashSet::new();
    for input in inputs {
        if !input.split_percent.is_finite() || input.split_percent <= 0.0 {
            return Err(LedgerError::Validation(format!(
                "split percent {} for agent '{}' must be a positive number",
                input.split_percent, input.agent_id
            )));
        }
        if !seen.insert(input.agent_id.as_str()) {
            return Err(LedgerError::Validation(format!(
                "agent '{}' appears more than once in the allocation set",
                input.agent_id
            )));
        }
    }

    let txn = store
        .txn_by_id(tenant, txn_id)?
        .ok_or_else(|| LedgerError::not_found("transaction", txn_id))?;
    for input in inputs {
        if store.agent_by_id(tenant, &input.agent_id)?.is_none() {
            return Err(LedgerError::not_found("agent", &input.agent_id));
        }
    }

    let mut amounts: Vec<i64> = inputs
        .iter()
        .map(|i| money::split_cents(txn.commission_cents, i.split_percent))
        .collect();
    let percent_total: f64 = inputs.iter().map(|i| i.split_percent).sum();
    if (percent_total - 100.0).abs() <= config.split_total_epsilon {
        let remainder = txn.commission_cents - amounts.iter().sum::<i64>();
        if remainder != 0 {
            let idx = money::remainder_index(&amounts);
            amounts[idx] += remainder;
        }
    }

    let now = Utc::now().to_rfc3339();
    let rows: Vec<AllocationRow> = inputs
        .iter()
        .zip(amounts)
        .map(|(input, split_cents)| AllocationRow {
            allocation_id: Uuid::new_v4().to_string(),
            tenant_id: tenant.to_string(),
            txn_id: txn.txn_id.clone(),
            agent_id: input.agent_id.clone(),
            split_percent: input.split_percent,
            split_cents,
            created_at: now.clone(),
        })
        .collect();

    store.replace_allocations_for_txn(tenant, &txn.txn_id, &rows)?;
    info!(
        "replaced allocations for txn {}: {} agents over {} cents",
        txn.txn_id,
        rows.len(),
        txn.commission_cents
    );
    Ok(rows)
}
