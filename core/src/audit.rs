//! The operation audit log — every mutating engine operation appends
//! exactly one entry. Variants are added per feature, never removed or
//! reordered.

use crate::types::EntityId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditEvent {
    // ── Metadata seeding ───────────────────────────────────────
    CarrierCreated {
        carrier_id: EntityId,
        name: String,
    },
    AliasCreated {
        alias_id: EntityId,
        carrier_id: EntityId,
        alias: String,
    },
    AgentCreated {
        agent_id: EntityId,
        last_name: String,
    },

    // ── Ingestion ──────────────────────────────────────────────
    BatchImported {
        batch_id: EntityId,
        file_name: String,
        total: i64,
        imported: i64,
        skipped: i64,
        errors: i64,
        duplicates: i64,
    },

    // ── Allocation ─────────────────────────────────────────────
    AllocationsReplaced {
        txn_id: EntityId,
        count: usize,
    },

    // ── Anomalies ──────────────────────────────────────────────
    AnomalyResolved {
        anomaly_id: EntityId,
    },
    AnomalyReopened {
        anomaly_id: EntityId,
    },

    // ── Draw ledger ────────────────────────────────────────────
    DrawRecorded {
        draw_id: EntityId,
        agent_id: EntityId,
        amount_cents: i64,
    },
    MonthlyDrawsPosted {
        reporting_month: String,
        posted: usize,
    },

    // ── Reconciliation ─────────────────────────────────────────
    CarrierReconciled {
        carrier_id: EntityId,
        reporting_month: String,
        status: String,
    },
    ReconciliationDisputed {
        carrier_id: EntityId,
        reporting_month: String,
    },
}

pub fn event_type_name(event: &AuditEvent) -> &'static str {
    match event {
        AuditEvent::CarrierCreated { .. } => "carrier_created",
        AuditEvent::AliasCreated { .. } => "alias_created",
        AuditEvent::AgentCreated { .. } => "agent_created",
        AuditEvent::BatchImported { .. } => "batch_imported",
        AuditEvent::AllocationsReplaced { .. } => "allocations_replaced",
        AuditEvent::AnomalyResolved { .. } => "anomaly_resolved",
        AuditEvent::AnomalyReopened { .. } => "anomaly_reopened",
        AuditEvent::DrawRecorded { .. } => "draw_recorded",
        AuditEvent::MonthlyDrawsPosted { .. } => "monthly_draws_posted",
        AuditEvent::CarrierReconciled { .. } => "carrier_reconciled",
        AuditEvent::ReconciliationDisputed { .. } => "reconciliation_disputed",
    }
}
