//! Integration tests for the anomaly detector and its lifecycle.
//!
//! Behaviours verified:
//! 1. Each of the four rules fires on the condition it guards
//! 2. Re-running detection on unchanged data refreshes the open record
//!    instead of stacking duplicates
//! 3. Resolution requires notes, is one-way, and reopening is explicit
//! 4. A zero-commission transaction is not flagged as unallocated

use chrono::Utc;
use commission_core::{
    allocation::AllocationInput,
    anomaly::{
        RULE_ORPHANED_ALLOCATION, RULE_RATE_MISMATCH, RULE_SPLIT_TOTAL_MISMATCH,
        RULE_UNALLOCATED_TRANSACTION, SEVERITY_ERROR, SEVERITY_WARNING,
    },
    config::EngineConfig,
    engine::{CommissionEngine, NewAgent, NewCarrier},
    error::LedgerError,
    ingest::{BatchDescriptor, RawStatementRow},
    scope::AccessScope,
    store::{AllocationRow, TxnRow},
    types::ReportingMonth,
};

const TENANT: &str = "agency-1";
const MONTH: &str = "2025-01";

fn engine() -> CommissionEngine {
    CommissionEngine::in_memory(EngineConfig::default()).expect("in-memory engine")
}

fn admin() -> AccessScope {
    AccessScope::admin(TENANT)
}

fn month() -> ReportingMonth {
    ReportingMonth::parse(MONTH).unwrap()
}

fn seed_agent(engine: &CommissionEngine, last_name: &str) -> String {
    engine
        .create_agent(
            &admin(),
            &NewAgent {
                first_name: "Test".into(),
                last_name: last_name.into(),
                email: None,
                has_draw_account: false,
                monthly_draw_cents: 0,
                default_split_percent: 100.0,
                user_id: None,
            },
        )
        .unwrap()
        .agent_id
}

fn import_row(engine: &CommissionEngine, mut row: RawStatementRow) -> String {
    let policy = row.policy_number.clone();
    row.reporting_month = MONTH.into();
    let batch = engine
        .import_batch(
            &admin(),
            &BatchDescriptor {
                file_name: "statement.csv".into(),
            },
            &[row],
        )
        .unwrap();
    assert_eq!(batch.imported_rows, 1, "seed row failed to import");
    engine
        .transactions_for(&admin(), None)
        .unwrap()
        .into_iter()
        .find(|t| t.policy_number == policy)
        .expect("seeded txn")
        .txn_id
}

fn plain_row(policy: &str, cents: i64) -> RawStatementRow {
    RawStatementRow {
        carrier: "Acme".into(),
        policy_number: policy.into(),
        transaction_type: "new".into(),
        reporting_month: MONTH.into(),
        insured_name: None,
        line_of_business: None,
        effective_date: None,
        gross_premium_cents: None,
        commission_rate: None,
        commission_cents: Some(cents),
        notes: None,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 1: the four rules
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn unallocated_transaction_is_flagged_as_warning() {
    let engine = engine();
    import_row(&engine, plain_row("P1", 10_000));

    let summary = engine.detect_month(&admin(), &month()).unwrap();
    assert_eq!(summary.examined, 1);
    assert_eq!(summary.flagged, 1);

    let open = engine.open_anomalies(&admin(), Some(&month())).unwrap();
    assert_eq!(open.len(), 1);
    assert_eq!(open[0].rule, RULE_UNALLOCATED_TRANSACTION);
    assert_eq!(open[0].severity, SEVERITY_WARNING);
}

#[test]
fn zero_commission_transaction_is_never_flagged_as_unallocated() {
    let engine = engine();
    // Zero-commission rows are skipped at import, so stage one directly
    // at the store level the way a backfill would.
    let now = Utc::now().to_rfc3339();
    engine
        .store
        .insert_txn(&TxnRow {
            txn_id: "txn-zero".into(),
            tenant_id: TENANT.into(),
            batch_id: None,
            policy_number: "P1".into(),
            carrier_name: "Acme".into(),
            carrier_id: None,
            insured_name: None,
            transaction_type: "endorsement".into(),
            line_of_business: None,
            effective_date: None,
            reporting_month: MONTH.into(),
            gross_premium_cents: None,
            commission_rate: None,
            commission_cents: 0,
            notes: None,
            dedup_key: "acme|P1|endorsement|2025-01".into(),
            created_at: now.clone(),
            updated_at: now,
        })
        .unwrap();

    let summary = engine.detect_month(&admin(), &month()).unwrap();
    assert_eq!(summary.examined, 1);
    assert_eq!(summary.flagged, 0);
    assert!(engine.open_anomalies(&admin(), None).unwrap().is_empty());
}

#[test]
fn split_total_mismatch_is_flagged_as_error() {
    let engine = engine();
    let txn = import_row(&engine, plain_row("P1", 10_000));
    let a = seed_agent(&engine, "Alpha");
    engine
        .replace_allocations(
            &admin(),
            &txn,
            &[AllocationInput {
                agent_id: a,
                split_percent: 60.0,
            }],
        )
        .unwrap();

    engine.detect_transaction(&admin(), &txn).unwrap();
    let open = engine.open_anomalies(&admin(), None).unwrap();
    assert_eq!(open.len(), 1);
    assert_eq!(open[0].rule, RULE_SPLIT_TOTAL_MISMATCH);
    assert_eq!(open[0].severity, SEVERITY_ERROR);
    assert_eq!(open[0].txn_id.as_deref(), Some(txn.as_str()));
}

#[test]
fn rate_deviation_beyond_tolerance_is_flagged() {
    let engine = engine();
    engine
        .create_carrier(
            &admin(),
            &NewCarrier {
                name: "Acme".into(),
                code: None,
                new_business_rate: Some(10.0),
                renewal_rate: Some(5.0),
            },
        )
        .unwrap();

    let mut row = plain_row("P1", 10_000);
    row.commission_rate = Some(15.0); // default is 10.0, tolerance 0.5
    let txn = import_row(&engine, row);
    let a = seed_agent(&engine, "Alpha");
    engine
        .replace_allocations(
            &admin(),
            &txn,
            &[AllocationInput {
                agent_id: a,
                split_percent: 100.0,
            }],
        )
        .unwrap();

    engine.detect_transaction(&admin(), &txn).unwrap();
    let open = engine.open_anomalies(&admin(), None).unwrap();
    assert_eq!(open.len(), 1);
    assert_eq!(open[0].rule, RULE_RATE_MISMATCH);
}

#[test]
fn rate_within_tolerance_is_not_flagged() {
    let engine = engine();
    engine
        .create_carrier(
            &admin(),
            &NewCarrier {
                name: "Acme".into(),
                code: None,
                new_business_rate: Some(10.0),
                renewal_rate: None,
            },
        )
        .unwrap();

    let mut row = plain_row("P1", 10_000);
    row.commission_rate = Some(10.4);
    let txn = import_row(&engine, row);
    let a = seed_agent(&engine, "Alpha");
    engine
        .replace_allocations(
            &admin(),
            &txn,
            &[AllocationInput {
                agent_id: a,
                split_percent: 100.0,
            }],
        )
        .unwrap();

    let summary = engine.detect_transaction(&admin(), &txn).unwrap();
    assert_eq!(summary.flagged, 0);
}

#[test]
fn allocation_to_unknown_agent_is_flagged_as_orphaned() {
    let engine = engine();
    let txn = import_row(&engine, plain_row("P1", 10_000));
    // Stage a legacy-shaped allocation pointing at an agent that was
    // never created (the allocation table carries no agent FK).
    engine
        .store
        .insert_allocation(&AllocationRow {
            allocation_id: "legacy-1".into(),
            tenant_id: TENANT.into(),
            txn_id: txn.clone(),
            agent_id: "ghost-agent".into(),
            split_percent: 100.0,
            split_cents: 10_000,
            created_at: Utc::now().to_rfc3339(),
        })
        .unwrap();

    engine.detect_transaction(&admin(), &txn).unwrap();
    let open = engine.open_anomalies(&admin(), None).unwrap();
    assert_eq!(open.len(), 1);
    assert_eq!(open[0].rule, RULE_ORPHANED_ALLOCATION);
    assert_eq!(open[0].severity, SEVERITY_ERROR);
    assert_eq!(open[0].agent_id.as_deref(), Some("ghost-agent"));
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 2: detection is idempotent
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn repeated_detection_keeps_one_open_record_per_rule() {
    let engine = engine();
    import_row(&engine, plain_row("P1", 10_000));

    for _ in 0..3 {
        engine.detect_month(&admin(), &month()).unwrap();
    }
    let open = engine.open_anomalies(&admin(), None).unwrap();
    assert_eq!(open.len(), 1);
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 3: resolution lifecycle
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn resolution_requires_notes_and_is_one_way() {
    let engine = engine();
    import_row(&engine, plain_row("P1", 10_000));
    engine.detect_month(&admin(), &month()).unwrap();
    let id = engine.open_anomalies(&admin(), None).unwrap()[0]
        .anomaly_id
        .clone();

    let no_notes = engine.resolve_anomaly(&admin(), &id, "   ");
    assert!(matches!(no_notes, Err(LedgerError::Validation(_))));

    engine
        .resolve_anomaly(&admin(), &id, "allocated out of band")
        .unwrap();
    assert!(engine.open_anomalies(&admin(), None).unwrap().is_empty());

    // Resolving again is an error, not a silent no-op.
    let twice = engine.resolve_anomaly(&admin(), &id, "again");
    assert!(matches!(twice, Err(LedgerError::Validation(_))));
}

#[test]
fn redetection_after_resolution_opens_a_fresh_record() {
    let engine = engine();
    import_row(&engine, plain_row("P1", 10_000));
    engine.detect_month(&admin(), &month()).unwrap();
    let first = engine.open_anomalies(&admin(), None).unwrap()[0]
        .anomaly_id
        .clone();
    engine
        .resolve_anomaly(&admin(), &first, "reviewed, still pending allocation")
        .unwrap();

    // The violation still exists, so the next run opens a new record;
    // the resolved one stays resolved.
    engine.detect_month(&admin(), &month()).unwrap();
    let open = engine.open_anomalies(&admin(), None).unwrap();
    assert_eq!(open.len(), 1);
    assert_ne!(open[0].anomaly_id, first);
}

#[test]
fn reopen_is_explicit_and_rejects_open_records() {
    let engine = engine();
    import_row(&engine, plain_row("P1", 10_000));
    engine.detect_month(&admin(), &month()).unwrap();
    let id = engine.open_anomalies(&admin(), None).unwrap()[0]
        .anomaly_id
        .clone();

    // Reopening something still open is a validation error.
    let premature = engine.reopen_anomaly(&admin(), &id);
    assert!(matches!(premature, Err(LedgerError::Validation(_))));

    engine.resolve_anomaly(&admin(), &id, "mistake").unwrap();
    engine.reopen_anomaly(&admin(), &id).unwrap();

    let open = engine.open_anomalies(&admin(), None).unwrap();
    assert_eq!(open.len(), 1);
    assert_eq!(open[0].anomaly_id, id);
    assert!(open[0].resolved_at.is_none());
    assert!(open[0].resolution_notes.is_none());
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 4: role enforcement
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn agent_role_cannot_run_detection_or_list_anomalies() {
    let engine = engine();
    let agent_scope = AccessScope::agent(TENANT, &["a-1"]);
    assert!(matches!(
        engine.detect_month(&agent_scope, &month()),
        Err(LedgerError::Authorization(_))
    ));
    assert!(matches!(
        engine.open_anomalies(&agent_scope, None),
        Err(LedgerError::Authorization(_))
    ));
}
