//! Draw ledger — append-only cash advances to agents, netted against
//! earned commission by the statement generator. No allocation or
//! resolution logic lives here.

use crate::error::{LedgerError, LedgerResult};
use crate::money::Cents;
use crate::scope::AccessScope;
use crate::store::{CommissionStore, DrawPaymentRow};
use crate::types::ReportingMonth;
use chrono::{NaiveDate, Utc};
use log::info;
use uuid::Uuid;

/// Record one draw payment. Admin only; the amount must be positive.
/// An agent may receive multiple draws in one month.
pub fn record_draw(
    store: &CommissionStore,
    scope: &AccessScope,
    agent_id: &str,
    amount_cents: Cents,
    payment_date: NaiveDate,
    month: &ReportingMonth,
    notes: Option<&str>,
) -> LedgerResult<DrawPaymentRow> {
    scope.require_admin("record_draw")?;
    let tenant = scope.tenant_id.as_str();
    if amount_cents <= 0 {
        return Err(LedgerError::Validation(format!(
            "draw amount must be positive, got {amount_cents} cents"
        )));
    }
    if store.agent_by_id(tenant, agent_id)?.is_none() {
        return Err(LedgerError::not_found("agent", agent_id));
    }

    let row = DrawPaymentRow {
        draw_id: Uuid::new_v4().to_string(),
        tenant_id: tenant.to_string(),
        agent_id: agent_id.to_string(),
        payment_date: payment_date.format("%Y-%m-%d").to_string(),
        amount_cents,
        reporting_month: month.as_str().to_string(),
        notes: notes.map(|n| n.to_string()),
        created_at: Utc::now().to_rfc3339(),
    };
    store.insert_draw(&row)?;
    Ok(row)
}

/// Post each eligible agent's standing monthly draw for the month: active
/// agents with a draw account and a positive standing amount, unless the
/// agent already has a draw recorded in the month. A re-run posts nothing.
/// Returns the number of draws posted.
pub fn post_monthly_draws(
    store: &CommissionStore,
    scope: &AccessScope,
    month: &ReportingMonth,
) -> LedgerResult<usize> {
    scope.require_admin("post_monthly_draws")?;
    let tenant = scope.tenant_id.as_str();
    let mut posted = 0;
    for agent in store.active_draw_agents(tenant)? {
        if store.agent_has_draw_in_month(tenant, &agent.agent_id, month.as_str())? {
            continue;
        }
        let row = DrawPaymentRow {
            draw_id: Uuid::new_v4().to_string(),
            tenant_id: tenant.to_string(),
            agent_id: agent.agent_id.clone(),
            payment_date: month.first_day().format("%Y-%m-%d").to_string(),
            amount_cents: agent.monthly_draw_cents,
            reporting_month: month.as_str().to_string(),
            notes: Some("standing monthly draw".to_string()),
            created_at: Utc::now().to_rfc3339(),
        };
        store.insert_draw(&row)?;
        posted += 1;
    }
    info!("posted {posted} standing draws for {month}");
    Ok(posted)
}
