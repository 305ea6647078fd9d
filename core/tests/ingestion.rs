//! Integration tests for the import ingestor.
//!
//! Behaviours verified:
//! 1. Batch counters reconcile exactly: total = imported + skipped + error + duplicate
//! 2. Re-running an identical batch is idempotent (all rows counted duplicate)
//! 3. Bad rows are counted, never fatal — the batch still completes
//! 4. Rows naming the same carrier through a registered alias dedup
//!    together, even when the alias is registered between imports
//! 5. Only admins may import

use commission_core::{
    config::EngineConfig,
    engine::{CommissionEngine, NewCarrier},
    error::LedgerError,
    ingest::{BatchDescriptor, RawStatementRow},
    scope::AccessScope,
    store::ImportBatchRow,
};

const TENANT: &str = "agency-1";

fn engine() -> CommissionEngine {
    CommissionEngine::in_memory(EngineConfig::default()).expect("in-memory engine")
}

fn admin() -> AccessScope {
    AccessScope::admin(TENANT)
}

fn row(carrier: &str, policy: &str, txn_type: &str, month: &str, cents: i64) -> RawStatementRow {
    RawStatementRow {
        carrier: carrier.into(),
        policy_number: policy.into(),
        transaction_type: txn_type.into(),
        reporting_month: month.into(),
        insured_name: None,
        line_of_business: None,
        effective_date: None,
        gross_premium_cents: None,
        commission_rate: None,
        commission_cents: Some(cents),
        notes: None,
    }
}

fn import(engine: &CommissionEngine, rows: &[RawStatementRow]) -> ImportBatchRow {
    engine
        .import_batch(
            &admin(),
            &BatchDescriptor {
                file_name: "statement.csv".into(),
            },
            rows,
        )
        .expect("import_batch failed")
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 1: counters reconcile to the total
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn counters_reconcile_to_total() {
    let engine = engine();
    let mut zero_row = row("Acme", "P3", "new", "2025-01", 0);
    zero_row.commission_cents = Some(0);
    let mut missing_amount = row("Acme", "P4", "new", "2025-01", 0);
    missing_amount.commission_cents = None;

    let rows = vec![
        row("Acme", "P1", "new", "2025-01", 10_000),
        row("Acme", "P2", "renewal", "2025-01", 5_000),
        row("", "P5", "new", "2025-01", 1_000),          // missing carrier
        row("Acme", "", "new", "2025-01", 1_000),        // missing policy
        row("Acme", "P6", "new", "2025-13", 1_000),      // bad month
        zero_row,                                        // informational $0 line
        missing_amount,                                  // missing amount
        row("Acme", "P1", "new", "2025-01", 10_000),     // dup within the batch
    ];
    let batch = import(&engine, &rows);

    assert_eq!(batch.status, "completed");
    assert_eq!(batch.total_rows, 8);
    assert_eq!(batch.imported_rows, 2);
    assert_eq!(batch.skipped_rows, 1);
    assert_eq!(batch.error_rows, 4);
    assert_eq!(batch.duplicate_rows, 1);
    assert_eq!(
        batch.total_rows,
        batch.imported_rows + batch.skipped_rows + batch.error_rows + batch.duplicate_rows
    );
    assert_eq!(engine.store.txn_count(TENANT).unwrap(), 2);
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 2: re-running the identical batch is idempotent
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn reimport_is_idempotent() {
    let engine = engine();
    let rows = vec![
        row("Acme", "P1", "new", "2025-01", 10_000),
        row("Acme", "P2", "new", "2025-01", 20_000),
        row("Zenith", "P1", "renewal", "2025-01", 3_000),
    ];

    let first = import(&engine, &rows);
    assert_eq!(first.imported_rows, 3);

    let second = import(&engine, &rows);
    assert_eq!(second.imported_rows, 0);
    assert_eq!(second.duplicate_rows, first.imported_rows);
    assert_eq!(engine.store.txn_count(TENANT).unwrap(), 3);
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 3: a batch of nothing but bad rows still completes
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn bad_rows_never_fail_the_batch() {
    let engine = engine();
    let rows = vec![
        row("", "P1", "new", "2025-01", 1_000),
        row("Acme", "P2", "new", "not-a-month", 1_000),
    ];
    let batch = import(&engine, &rows);
    assert_eq!(batch.status, "completed");
    assert_eq!(batch.error_rows, 2);
    assert_eq!(batch.imported_rows, 0);
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 4: alias resolution feeds the dedup key
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn alias_rows_dedup_to_the_same_statement_line() {
    let engine = engine();
    let scope = admin();
    let carrier = engine
        .create_carrier(
            &scope,
            &NewCarrier {
                name: "Acme".into(),
                code: None,
                new_business_rate: None,
                renewal_rate: None,
            },
        )
        .unwrap();
    engine
        .create_alias(&scope, &carrier.carrier_id, "ACME INC")
        .unwrap();

    let batch = import(
        &engine,
        &[
            row("Acme", "P1", "new", "2025-01", 10_000),
            row("ACME INC", "P1", "new", "2025-01", 10_000),
        ],
    );
    assert_eq!(batch.imported_rows, 1);
    assert_eq!(batch.duplicate_rows, 1);

    // The surviving transaction carries the canonical carrier id.
    let txns = engine.transactions_for(&scope, None).unwrap();
    assert_eq!(txns.len(), 1);
    assert_eq!(txns[0].carrier_id.as_deref(), Some(carrier.carrier_id.as_str()));
}

#[test]
fn reimport_stays_idempotent_after_late_alias_registration() {
    let engine = engine();
    let scope = admin();

    // First import happens before anyone registers the carrier, so the
    // line is keyed on the free-text statement name.
    let first = import(&engine, &[row("ACME INC", "P1", "new", "2025-01", 10_000)]);
    assert_eq!(first.imported_rows, 1);

    // The natural correction workflow: register the carrier and point an
    // alias at the statement spelling.
    let carrier = engine
        .create_carrier(
            &scope,
            &NewCarrier {
                name: "Acme".into(),
                code: None,
                new_business_rate: None,
                renewal_rate: None,
            },
        )
        .unwrap();
    engine
        .create_alias(&scope, &carrier.carrier_id, "ACME INC")
        .unwrap();

    // Re-running the identical file now resolves the carrier, but the
    // line is already on the books under its old key — still a duplicate,
    // never a second transaction.
    let second = import(&engine, &[row("ACME INC", "P1", "new", "2025-01", 10_000)]);
    assert_eq!(second.imported_rows, 0);
    assert_eq!(second.duplicate_rows, 1);
    assert_eq!(engine.store.txn_count(TENANT).unwrap(), 1);
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 5: only admins may import; the audit trail records the batch
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn agent_role_cannot_import() {
    let engine = engine();
    let agent_scope = AccessScope::agent(TENANT, &["a-1"]);
    let result = engine.import_batch(
        &agent_scope,
        &BatchDescriptor {
            file_name: "statement.csv".into(),
        },
        &[row("Acme", "P1", "new", "2025-01", 1_000)],
    );
    assert!(matches!(result, Err(LedgerError::Authorization(_))));
}

#[test]
fn import_appends_an_audit_event() {
    let engine = engine();
    import(&engine, &[row("Acme", "P1", "new", "2025-01", 1_000)]);
    let events = engine.store.audit_event_types(TENANT).unwrap();
    assert_eq!(events, vec!["batch_imported".to_string()]);
}
