//! Statement generator — one agent, one reporting month: allocation
//! totals netted against draw totals. Read-only, no side effects.

use crate::error::{LedgerError, LedgerResult};
use crate::money::Cents;
use crate::scope::AccessScope;
use crate::store::{AgentAllocationLine, CommissionStore, DrawPaymentRow};
use crate::types::{EntityId, ReportingMonth};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct Statement {
    pub agent_id: EntityId,
    pub reporting_month: String,
    pub lines: Vec<AgentAllocationLine>,
    pub total_commission: Cents,
    pub draw_payments: Vec<DrawPaymentRow>,
    pub total_draws: Cents,
    /// May be negative: an over-advance to recover in a future period.
    /// Never clamped to zero.
    pub net_payable: Cents,
}

/// Generate the statement. Visible to admins and to the agent itself.
pub fn generate_statement(
    store: &CommissionStore,
    scope: &AccessScope,
    agent_id: &str,
    month: &ReportingMonth,
) -> LedgerResult<Statement> {
    scope.require_agent_visibility(agent_id)?;
    let tenant = scope.tenant_id.as_str();
    if store.agent_by_id(tenant, agent_id)?.is_none() {
        return Err(LedgerError::not_found("agent", agent_id));
    }

    let lines = store.agent_lines_for_month(tenant, agent_id, month.as_str())?;
    let draw_payments = store.draws_for_agent_month(tenant, agent_id, month.as_str())?;

    let total_commission: Cents = lines.iter().map(|l| l.split_cents).sum();
    let total_draws: Cents = draw_payments.iter().map(|d| d.amount_cents).sum();

    Ok(Statement {
        agent_id: agent_id.to_string(),
        reporting_month: month.as_str().to_string(),
        lines,
        total_commission,
        draw_payments,
        total_draws,
        net_payable: total_commission - total_draws,
    })
}
