//! Integration tests for access scoping.
//!
//! Behaviours verified:
//! 1. Agent-role reads see only allocation-joined transactions
//! 2. Admins see the whole tenant
//! 3. Allocation detail is visible only to admins and participants
//! 4. Every mutating operation rejects the agent role
//! 5. Tenants never see each other's data

use chrono::NaiveDate;
use commission_core::{
    allocation::AllocationInput,
    config::EngineConfig,
    engine::{CommissionEngine, NewAgent, NewCarrier},
    error::LedgerError,
    ingest::{BatchDescriptor, RawStatementRow},
    scope::AccessScope,
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

fn seed_agent(engine: &CommissionEngine, scope: &AccessScope, last_name: &str) -> String {
    engine
        .create_agent(
            scope,
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

fn row(policy: &str, cents: i64) -> RawStatementRow {
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

fn import(engine: &CommissionEngine, scope: &AccessScope, rows: &[RawStatementRow]) {
    let batch = engine
        .import_batch(
            scope,
            &BatchDescriptor {
                file_name: "statement.csv".into(),
            },
            rows,
        )
        .unwrap();
    assert_eq!(batch.imported_rows as usize, rows.len());
}

fn txn_id_for(engine: &CommissionEngine, scope: &AccessScope, policy: &str) -> String {
    engine
        .transactions_for(scope, None)
        .unwrap()
        .into_iter()
        .find(|t| t.policy_number == policy)
        .expect("seeded txn")
        .txn_id
}

fn allocate(engine: &CommissionEngine, scope: &AccessScope, txn_id: &str, agent_id: &str) {
    engine
        .replace_allocations(
            scope,
            txn_id,
            &[AllocationInput {
                agent_id: agent_id.into(),
                split_percent: 100.0,
            }],
        )
        .unwrap();
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 1 & 2: transaction visibility
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn agent_sees_only_allocation_joined_transactions() {
    let engine = engine();
    let alpha = seed_agent(&engine, &admin(), "Alpha");
    let beta = seed_agent(&engine, &admin(), "Beta");
    import(
        &engine,
        &admin(),
        &[row("P1", 10_000), row("P2", 20_000), row("P3", 30_000)],
    );
    let p1 = txn_id_for(&engine, &admin(), "P1");
    let p2 = txn_id_for(&engine, &admin(), "P2");
    allocate(&engine, &admin(), &p1, &alpha);
    allocate(&engine, &admin(), &p2, &beta);
    // P3 stays unallocated.

    let alpha_scope = AccessScope::agent(TENANT, &[alpha.as_str()]);
    let visible = engine.transactions_for(&alpha_scope, Some(&month())).unwrap();
    assert_eq!(visible.len(), 1);
    assert_eq!(visible[0].policy_number, "P1");

    let all = engine.transactions_for(&admin(), Some(&month())).unwrap();
    assert_eq!(all.len(), 3);
}

#[test]
fn agent_scope_with_no_agent_ids_sees_nothing() {
    let engine = engine();
    import(&engine, &admin(), &[row("P1", 10_000)]);
    let empty_scope = AccessScope::agent(TENANT, &[]);
    let visible = engine.transactions_for(&empty_scope, None).unwrap();
    assert!(visible.is_empty());
}

#[test]
fn multi_agent_scope_sees_the_union_without_duplicates() {
    let engine = engine();
    let alpha = seed_agent(&engine, &admin(), "Alpha");
    let beta = seed_agent(&engine, &admin(), "Beta");
    import(&engine, &admin(), &[row("P1", 10_000)]);
    let p1 = txn_id_for(&engine, &admin(), "P1");
    // Both agents split the same transaction.
    engine
        .replace_allocations(
            &admin(),
            &p1,
            &[
                AllocationInput {
                    agent_id: alpha.clone(),
                    split_percent: 50.0,
                },
                AllocationInput {
                    agent_id: beta.clone(),
                    split_percent: 50.0,
                },
            ],
        )
        .unwrap();

    let both = AccessScope::agent(TENANT, &[alpha.as_str(), beta.as_str()]);
    let visible = engine.transactions_for(&both, None).unwrap();
    assert_eq!(visible.len(), 1);
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 3: allocation detail visibility
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn allocation_detail_requires_participation() {
    let engine = engine();
    let alpha = seed_agent(&engine, &admin(), "Alpha");
    let beta = seed_agent(&engine, &admin(), "Beta");
    import(&engine, &admin(), &[row("P1", 10_000)]);
    let p1 = txn_id_for(&engine, &admin(), "P1");
    allocate(&engine, &admin(), &p1, &alpha);

    // A participant sees the full set.
    let alpha_scope = AccessScope::agent(TENANT, &[alpha.as_str()]);
    let rows = engine.allocations_for(&alpha_scope, &p1).unwrap();
    assert_eq!(rows.len(), 1);

    // A non-participant is refused even though the txn exists.
    let beta_scope = AccessScope::agent(TENANT, &[beta.as_str()]);
    let refused = engine.allocations_for(&beta_scope, &p1);
    assert!(matches!(refused, Err(LedgerError::Authorization(_))));
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 4: mutation paths reject the agent role
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn every_mutating_operation_rejects_the_agent_role() {
    let engine = engine();
    let alpha = seed_agent(&engine, &admin(), "Alpha");
    import(&engine, &admin(), &[row("P1", 10_000)]);
    let p1 = txn_id_for(&engine, &admin(), "P1");
    let carrier = engine
        .create_carrier(
            &admin(),
            &NewCarrier {
                name: "Acme".into(),
                code: None,
                new_business_rate: None,
                renewal_rate: None,
            },
        )
        .unwrap();

    let scope = AccessScope::agent(TENANT, &[alpha.as_str()]);
    let date = NaiveDate::from_ymd_opt(2025, 1, 15).unwrap();

    let attempts: Vec<(&str, LedgerResultAny)> = vec![
        (
            "create_carrier",
            engine
                .create_carrier(
                    &scope,
                    &NewCarrier {
                        name: "Other".into(),
                        code: None,
                        new_business_rate: None,
                        renewal_rate: None,
                    },
                )
                .map(|_| ()),
        ),
        (
            "create_alias",
            engine
                .create_alias(&scope, &carrier.carrier_id, "ACME")
                .map(|_| ()),
        ),
        (
            "create_agent",
            engine
                .create_agent(
                    &scope,
                    &NewAgent {
                        first_name: "X".into(),
                        last_name: "Y".into(),
                        email: None,
                        has_draw_account: false,
                        monthly_draw_cents: 0,
                        default_split_percent: 100.0,
                        user_id: None,
                    },
                )
                .map(|_| ()),
        ),
        (
            "replace_allocations",
            engine
                .replace_allocations(
                    &scope,
                    &p1,
                    &[AllocationInput {
                        agent_id: alpha.clone(),
                        split_percent: 100.0,
                    }],
                )
                .map(|_| ()),
        ),
        (
            "detect_transaction",
            engine.detect_transaction(&scope, &p1).map(|_| ()),
        ),
        (
            "record_draw",
            engine
                .record_draw(&scope, &alpha, 1_000, date, &month(), None)
                .map(|_| ()),
        ),
        (
            "post_monthly_draws",
            engine.post_monthly_draws(&scope, &month()).map(|_| ()),
        ),
        (
            "validate_month_close",
            engine.validate_month_close(&scope, &month()).map(|_| ()),
        ),
        (
            "reconcile_carrier",
            engine
                .reconcile_carrier(&scope, &carrier.carrier_id, &month(), 10_000)
                .map(|_| ()),
        ),
        (
            "dispute_reconciliation",
            engine
                .dispute_reconciliation(&scope, &carrier.carrier_id, &month(), "why")
                .map(|_| ()),
        ),
    ];
    for (name, result) in attempts {
        assert!(
            matches!(result, Err(LedgerError::Authorization(_))),
            "{name} did not reject the agent role"
        );
    }
}

type LedgerResultAny = Result<(), LedgerError>;

// ─────────────────────────────────────────────────────────────────────────────
// Test 5: tenant isolation
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn tenants_never_see_each_others_data() {
    let engine = engine();
    import(&engine, &admin(), &[row("P1", 10_000)]);

    let other_admin = AccessScope::admin("agency-2");
    assert!(engine.transactions_for(&other_admin, None).unwrap().is_empty());

    // The same statement line imports cleanly under the other tenant —
    // dedup keys are tenant-scoped.
    import(&engine, &other_admin, &[row("P1", 10_000)]);
    assert_eq!(engine.transactions_for(&other_admin, None).unwrap().len(), 1);
    assert_eq!(engine.transactions_for(&admin(), None).unwrap().len(), 1);
}
