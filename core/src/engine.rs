//! CommissionEngine — the facade over the store and components.
//!
//! One method per operation; every method takes the caller's AccessScope
//! and every mutating method appends an audit event. The engine holds no
//! state between calls beyond the store connection and config.

use crate::{
    allocation::{self, AllocationInput},
    anomaly::{self, DetectionSummary},
    audit::{event_type_name, AuditEvent},
    config::EngineConfig,
    draw,
    error::{LedgerError, LedgerResult},
    ingest::{self, BatchDescriptor, RawStatementRow},
    money::Cents,
    month_close::{self, CheckResult},
    resolver::{self, Resolution},
    scope::AccessScope,
    statement::{self, Statement},
    store::{
        AgentRow, AllocationRow, AnomalyRow, CarrierAliasRow, CarrierRow, CommissionStore,
        DrawPaymentRow, ImportBatchRow, ReconciliationRow, TxnRow,
    },
    types::ReportingMonth,
};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use uuid::Uuid;

/// Carrier metadata at creation. CRUD itself carries no invariants beyond
/// name uniqueness; the defaults feed the rate-mismatch rule.
#[derive(Debug, Clone, Deserialize)]
pub struct NewCarrier {
    pub name: String,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub new_business_rate: Option<f64>,
    #[serde(default)]
    pub renewal_rate: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewAgent {
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub has_draw_account: bool,
    #[serde(default)]
    pub monthly_draw_cents: i64,
    #[serde(default = "default_split_percent")]
    pub default_split_percent: f64,
    #[serde(default)]
    pub user_id: Option<String>,
}

fn default_split_percent() -> f64 {
    100.0
}

pub struct CommissionEngine {
    pub store: CommissionStore,
    pub config: EngineConfig,
}

impl CommissionEngine {
    pub fn open(path: &str, config: EngineConfig) -> LedgerResult<Self> {
        let store = CommissionStore::open(path)?;
        store.migrate()?;
        Ok(Self { store, config })
    }

    /// In-memory engine, used in tests and for dry runs.
    pub fn in_memory(config: EngineConfig) -> LedgerResult<Self> {
        let store = CommissionStore::in_memory()?;
        store.migrate()?;
        Ok(Self { store, config })
    }

    // ── Metadata seeding ───────────────────────────────────────

    pub fn create_carrier(&self, scope: &AccessScope, new: &NewCarrier) -> LedgerResult<CarrierRow> {
        scope.require_admin("create_carrier")?;
        if new.name.trim().is_empty() {
            return Err(LedgerError::Validation("carrier name is required".into()));
        }
        let row = CarrierRow {
            carrier_id: Uuid::new_v4().to_string(),
            tenant_id: scope.tenant_id.clone(),
            name: new.name.trim().to_string(),
            code: new.code.clone(),
            new_business_rate: new.new_business_rate,
            renewal_rate: new.renewal_rate,
            is_active: true,
        };
        self.store.insert_carrier(&row)?;
        self.audit(
            scope,
            &AuditEvent::CarrierCreated {
                carrier_id: row.carrier_id.clone(),
                name: row.name.clone(),
            },
        )?;
        Ok(row)
    }

    /// Register an alias for a carrier. An alias already registered — to
    /// any carrier in the tenant — is a Conflict here, at creation time.
    pub fn create_alias(
        &self,
        scope: &AccessScope,
        carrier_id: &str,
        alias: &str,
    ) -> LedgerResult<CarrierAliasRow> {
        scope.require_admin("create_alias")?;
        let tenant = scope.tenant_id.as_str();
        let alias = alias.trim();
        if alias.is_empty() {
            return Err(LedgerError::Validation("alias must not be blank".into()));
        }
        if self.store.carrier_by_id(tenant, carrier_id)?.is_none() {
            return Err(LedgerError::not_found("carrier", carrier_id));
        }
        if self.store.carrier_id_for_alias(tenant, alias)?.is_some() {
            return Err(LedgerError::Conflict(format!(
                "alias '{alias}' is already registered for this tenant"
            )));
        }
        let row = CarrierAliasRow {
            alias_id: Uuid::new_v4().to_string(),
            tenant_id: tenant.to_string(),
            carrier_id: carrier_id.to_string(),
            alias: alias.to_string(),
        };
        self.store.insert_alias(&row)?;
        self.audit(
            scope,
            &AuditEvent::AliasCreated {
                alias_id: row.alias_id.clone(),
                carrier_id: row.carrier_id.clone(),
                alias: row.alias.clone(),
            },
        )?;
        Ok(row)
    }

    pub fn create_agent(&self, scope: &AccessScope, new: &NewAgent) -> LedgerResult<AgentRow> {
        scope.require_admin("create_agent")?;
        if new.last_name.trim().is_empty() {
            return Err(LedgerError::Validation("agent last name is required".into()));
        }
        let row = AgentRow {
            agent_id: Uuid::new_v4().to_string(),
            tenant_id: scope.tenant_id.clone(),
            first_name: new.first_name.trim().to_string(),
            last_name: new.last_name.trim().to_string(),
            email: new.email.clone(),
            role: "agent".to_string(),
            is_active: true,
            has_draw_account: new.has_draw_account,
            monthly_draw_cents: new.monthly_draw_cents,
            default_split_percent: new.default_split_percent,
            user_id: new.user_id.clone(),
        };
        self.store.insert_agent(&row)?;
        self.audit(
            scope,
            &AuditEvent::AgentCreated {
                agent_id: row.agent_id.clone(),
                last_name: row.last_name.clone(),
            },
        )?;
        Ok(row)
    }

    // ── Resolution & scoped reads ──────────────────────────────

    pub fn resolve_carrier(&self, scope: &AccessScope, raw: &str) -> LedgerResult<Resolution> {
        resolver::resolve(&self.store, scope.tenant_id.as_str(), raw)
    }

    /// Transactions visible to the caller: the whole tenant for admins,
    /// only allocation-joined transactions for agent-role callers.
    pub fn transactions_for(
        &self,
        scope: &AccessScope,
        month: Option<&ReportingMonth>,
    ) -> LedgerResult<Vec<TxnRow>> {
        let tenant = scope.tenant_id.as_str();
        let month = month.map(|m| m.as_str());
        if scope.is_admin() {
            self.store.txns_for_tenant(tenant, month)
        } else {
            self.store.txns_for_agents(tenant, &scope.agent_ids, month)
        }
    }

    /// Allocations for one transaction. Agent-role callers must hold one
    /// of the transaction's allocations to see any of them.
    pub fn allocations_for(&self, scope: &AccessScope, txn_id: &str) -> LedgerResult<Vec<AllocationRow>> {
        let tenant = scope.tenant_id.as_str();
        let rows = self.store.allocations_for_txn(tenant, txn_id)?;
        if scope.is_admin() {
            return Ok(rows);
        }
        if rows.iter().any(|a| scope.owns_agent(&a.agent_id)) {
            Ok(rows)
        } else {
            Err(LedgerError::Authorization(format!(
                "transaction '{txn_id}' is outside the caller's scope"
            )))
        }
    }

    // ── Ingestion ──────────────────────────────────────────────

    pub fn import_batch(
        &self,
        scope: &AccessScope,
        descriptor: &BatchDescriptor,
        rows: &[RawStatementRow],
    ) -> LedgerResult<ImportBatchRow> {
        let batch = ingest::import_batch(&self.store, scope, descriptor, rows)?;
        self.audit(
            scope,
            &AuditEvent::BatchImported {
                batch_id: batch.batch_id.clone(),
                file_name: batch.file_name.clone(),
                total: batch.total_rows,
                imported: batch.imported_rows,
                skipped: batch.skipped_rows,
                errors: batch.error_rows,
                duplicates: batch.duplicate_rows,
            },
        )?;
        Ok(batch)
    }

    // ── Allocation ─────────────────────────────────────────────

    pub fn replace_allocations(
        &self,
        scope: &AccessScope,
        txn_id: &str,
        inputs: &[AllocationInput],
    ) -> LedgerResult<Vec<AllocationRow>> {
        let rows = allocation::replace_allocations(&self.store, &self.config, scope, txn_id, inputs)?;
        self.audit(
            scope,
            &AuditEvent::AllocationsReplaced {
                txn_id: txn_id.to_string(),
                count: rows.len(),
            },
        )?;
        Ok(rows)
    }

    // ── Anomalies ──────────────────────────────────────────────

    pub fn detect_transaction(&self, scope: &AccessScope, txn_id: &str) -> LedgerResult<DetectionSummary> {
        anomaly::detect_transaction(&self.store, &self.config, scope, txn_id)
    }

    pub fn detect_month(&self, scope: &AccessScope, month: &ReportingMonth) -> LedgerResult<DetectionSummary> {
        anomaly::detect_month(&self.store, &self.config, scope, month)
    }

    pub fn resolve_anomaly(&self, scope: &AccessScope, anomaly_id: &str, notes: &str) -> LedgerResult<()> {
        anomaly::resolve_anomaly(&self.store, scope, anomaly_id, notes)?;
        self.audit(
            scope,
            &AuditEvent::AnomalyResolved {
                anomaly_id: anomaly_id.to_string(),
            },
        )
    }

    pub fn reopen_anomaly(&self, scope: &AccessScope, anomaly_id: &str) -> LedgerResult<()> {
        anomaly::reopen_anomaly(&self.store, scope, anomaly_id)?;
        self.audit(
            scope,
            &AuditEvent::AnomalyReopened {
                anomaly_id: anomaly_id.to_string(),
            },
        )
    }

    pub fn open_anomalies(
        &self,
        scope: &AccessScope,
        month: Option<&ReportingMonth>,
    ) -> LedgerResult<Vec<AnomalyRow>> {
        anomaly::open_anomalies(&self.store, scope, month)
    }

    // ── Draw ledger ────────────────────────────────────────────

    pub fn record_draw(
        &self,
        scope: &AccessScope,
        agent_id: &str,
        amount_cents: Cents,
        payment_date: NaiveDate,
        month: &ReportingMonth,
        notes: Option<&str>,
    ) -> LedgerResult<DrawPaymentRow> {
        let row = draw::record_draw(&self.store, scope, agent_id, amount_cents, payment_date, month, notes)?;
        self.audit(
            scope,
            &AuditEvent::DrawRecorded {
                draw_id: row.draw_id.clone(),
                agent_id: row.agent_id.clone(),
                amount_cents: row.amount_cents,
            },
        )?;
        Ok(row)
    }

    pub fn post_monthly_draws(&self, scope: &AccessScope, month: &ReportingMonth) -> LedgerResult<usize> {
        let posted = draw::post_monthly_draws(&self.store, scope, month)?;
        self.audit(
            scope,
            &AuditEvent::MonthlyDrawsPosted {
                reporting_month: month.as_str().to_string(),
                posted,
            },
        )?;
        Ok(posted)
    }

    // ── Statements & month close ───────────────────────────────

    pub fn generate_statement(
        &self,
        scope: &AccessScope,
        agent_id: &str,
        month: &ReportingMonth,
    ) -> LedgerResult<Statement> {
        statement::generate_statement(&self.store, scope, agent_id, month)
    }

    pub fn validate_month_close(
        &self,
        scope: &AccessScope,
        month: &ReportingMonth,
    ) -> LedgerResult<Vec<CheckResult>> {
        month_close::validate_month_close(&self.store, scope, month)
    }

    // ── Carrier reconciliation ─────────────────────────────────

    /// Compare a carrier's reported total for the month against the sum
    /// of the month's transactions resolved to that carrier. Within the
    /// configured tolerance the record is matched, otherwise unmatched.
    pub fn reconcile_carrier(
        &self,
        scope: &AccessScope,
        carrier_id: &str,
        month: &ReportingMonth,
        reported_total_cents: Cents,
    ) -> LedgerResult<ReconciliationRow> {
        scope.require_admin("reconcile_carrier")?;
        let tenant = scope.tenant_id.as_str();
        if self.store.carrier_by_id(tenant, carrier_id)?.is_none() {
            return Err(LedgerError::not_found("carrier", carrier_id));
        }
        let internal =
            self.store
                .sum_commission_for_carrier_month(tenant, carrier_id, month.as_str())?;
        let delta = reported_total_cents - internal;
        let status = if delta.abs() <= self.config.recon_tolerance_cents {
            "matched"
        } else {
            "unmatched"
        };
        let row = ReconciliationRow {
            tenant_id: tenant.to_string(),
            carrier_id: carrier_id.to_string(),
            reporting_month: month.as_str().to_string(),
            status: status.to_string(),
            reported_total_cents: Some(reported_total_cents),
            internal_total_cents: Some(internal),
            delta_cents: Some(delta),
            checked_at: Some(Utc::now().to_rfc3339()),
            notes: None,
        };
        self.store.upsert_reconciliation(&row)?;
        self.audit(
            scope,
            &AuditEvent::CarrierReconciled {
                carrier_id: carrier_id.to_string(),
                reporting_month: month.as_str().to_string(),
                status: status.to_string(),
            },
        )?;
        Ok(row)
    }

    /// Flag a carrier-month discrepancy as under investigation. Records
    /// never leave disputed automatically — a later reconcile run must be
    /// issued deliberately.
    pub fn dispute_reconciliation(
        &self,
        scope: &AccessScope,
        carrier_id: &str,
        month: &ReportingMonth,
        notes: &str,
    ) -> LedgerResult<ReconciliationRow> {
        scope.require_admin("dispute_reconciliation")?;
        let tenant = scope.tenant_id.as_str();
        if self.store.carrier_by_id(tenant, carrier_id)?.is_none() {
            return Err(LedgerError::not_found("carrier", carrier_id));
        }
        self.store.set_reconciliation_disputed(
            tenant,
            carrier_id,
            month.as_str(),
            notes,
            &Utc::now().to_rfc3339(),
        )?;
        self.audit(
            scope,
            &AuditEvent::ReconciliationDisputed {
                carrier_id: carrier_id.to_string(),
                reporting_month: month.as_str().to_string(),
            },
        )?;
        self.store
            .reconciliation_for(tenant, carrier_id, month.as_str())?
            .ok_or_else(|| LedgerError::not_found("reconciliation record", carrier_id))
    }

    // ── Audit ──────────────────────────────────────────────────

    fn audit(&self, scope: &AccessScope, event: &AuditEvent) -> LedgerResult<()> {
        self.store.append_audit(
            scope.tenant_id.as_str(),
            &scope.actor(),
            event_type_name(event),
            &serde_json::to_string(event)?,
            &Utc::now().to_rfc3339(),
        )
    }
}
