//! recon-runner: headless operator tool for the commission engine.
//!
//! Usage:
//!   recon-runner --tenant acme-agency --seed seed.json --rows statement.json --month 2025-01
//!   recon-runner --db books.db --tenant t1 --rows rows.json --month 2025-01 \
//!       --reconcile "Acme Insurance=12345.67,Zenith=890.00"
//!
//! Sequence: seed metadata, import the statement rows, run anomaly
//! detection over the month, optionally reconcile carrier totals, run the
//! month-close battery, and print a summary with per-agent statements.

use anyhow::{anyhow, Result};
use commission_core::{
    allocation::AllocationInput,
    config::EngineConfig,
    engine::{CommissionEngine, NewAgent, NewCarrier},
    ingest::{BatchDescriptor, RawStatementRow},
    money::{cents_from_dollars, format_cents},
    month_close,
    resolver::Resolution,
    scope::AccessScope,
    types::ReportingMonth,
};
use std::env;

/// Seed file shape: carriers with optional aliases, agents with an
/// optional split percent used to auto-allocate imported transactions.
#[derive(serde::Deserialize)]
struct SeedFile {
    #[serde(default)]
    carriers: Vec<SeedCarrier>,
    #[serde(default)]
    agents: Vec<SeedAgent>,
}

#[derive(serde::Deserialize)]
struct SeedCarrier {
    #[serde(flatten)]
    carrier: NewCarrier,
    #[serde(default)]
    aliases: Vec<String>,
}

#[derive(serde::Deserialize)]
struct SeedAgent {
    #[serde(flatten)]
    agent: NewAgent,
    #[serde(default)]
    split_percent: Option<f64>,
}

/// Statement rows come in as dollars; the engine works in cents.
#[derive(serde::Deserialize)]
struct DollarRow {
    carrier: String,
    policy_number: String,
    #[serde(default)]
    transaction_type: String,
    #[serde(default)]
    reporting_month: Option<String>,
    #[serde(default)]
    insured_name: Option<String>,
    #[serde(default)]
    line_of_business: Option<String>,
    #[serde(default)]
    effective_date: Option<String>,
    #[serde(default)]
    gross_premium: Option<f64>,
    #[serde(default)]
    commission_rate: Option<f64>,
    #[serde(default)]
    commission: Option<f64>,
    #[serde(default)]
    notes: Option<String>,
}

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let db = str_arg(&args, "--db").unwrap_or(":memory:");
    let tenant = str_arg(&args, "--tenant").unwrap_or("default");
    let month_raw = str_arg(&args, "--month")
        .map(|s| s.to_string())
        .unwrap_or_else(|| chrono::Utc::now().format("%Y-%m").to_string());
    let month = ReportingMonth::parse(&month_raw).map_err(|e| anyhow!("{e}"))?;

    let config = match str_arg(&args, "--config") {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };

    println!("recon-runner");
    println!("  db:     {db}");
    println!("  tenant: {tenant}");
    println!("  month:  {month}");
    println!();

    let engine = if db == ":memory:" {
        CommissionEngine::in_memory(config)?
    } else {
        CommissionEngine::open(db, config)?
    };
    let scope = AccessScope::admin(tenant);

    // ── Seed ───────────────────────────────────────────────────
    let mut statement_agents: Vec<(String, String, Option<f64>)> = Vec::new();
    if let Some(path) = str_arg(&args, "--seed") {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow!("Cannot read {path}: {e}"))?;
        let seed: SeedFile = serde_json::from_str(&content)?;
        for sc in &seed.carriers {
            let carrier = engine.create_carrier(&scope, &sc.carrier)?;
            for alias in &sc.aliases {
                engine.create_alias(&scope, &carrier.carrier_id, alias)?;
            }
        }
        for sa in &seed.agents {
            let agent = engine.create_agent(&scope, &sa.agent)?;
            let label = format!("{} {}", agent.first_name, agent.last_name);
            statement_agents.push((agent.agent_id, label, sa.split_percent));
        }
        println!(
            "seeded {} carriers, {} agents",
            seed.carriers.len(),
            seed.agents.len()
        );
    }

    // ── Import ─────────────────────────────────────────────────
    if let Some(path) = str_arg(&args, "--rows") {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow!("Cannot read {path}: {e}"))?;
        let dollar_rows: Vec<DollarRow> = serde_json::from_str(&content)?;
        let rows: Vec<RawStatementRow> = dollar_rows
            .into_iter()
            .map(|r| RawStatementRow {
                carrier: r.carrier,
                policy_number: r.policy_number,
                transaction_type: r.transaction_type,
                reporting_month: r.reporting_month.unwrap_or_else(|| month_raw.clone()),
                insured_name: r.insured_name,
                line_of_business: r.line_of_business,
                effective_date: r.effective_date,
                gross_premium_cents: r.gross_premium.map(cents_from_dollars),
                commission_rate: r.commission_rate,
                commission_cents: r.commission.map(cents_from_dollars),
                notes: r.notes,
            })
            .collect();

        let descriptor = BatchDescriptor {
            file_name: path.to_string(),
        };
        let batch = engine.import_batch(&scope, &descriptor, &rows)?;
        println!("=== IMPORT ===");
        println!("  batch:      {}", batch.batch_id);
        println!("  status:     {}", batch.status);
        println!("  total:      {}", batch.total_rows);
        println!("  imported:   {}", batch.imported_rows);
        println!("  skipped:    {}", batch.skipped_rows);
        println!("  errors:     {}", batch.error_rows);
        println!("  duplicates: {}", batch.duplicate_rows);
        println!();
    }

    // ── Auto-allocate to seeded agents ─────────────────────────
    let splits: Vec<AllocationInput> = statement_agents
        .iter()
        .filter_map(|(id, _, pct)| {
            pct.map(|split_percent| AllocationInput {
                agent_id: id.clone(),
                split_percent,
            })
        })
        .collect();
    if !splits.is_empty() {
        let mut allocated = 0;
        for txn in engine.transactions_for(&scope, Some(&month))? {
            if engine.allocations_for(&scope, &txn.txn_id)?.is_empty() {
                engine.replace_allocations(&scope, &txn.txn_id, &splits)?;
                allocated += 1;
            }
        }
        println!("allocated {allocated} transactions across {} agents", splits.len());
        println!();
    }

    // ── Detect ─────────────────────────────────────────────────
    let summary = engine.detect_month(&scope, &month)?;
    println!("=== ANOMALY DETECTION ===");
    println!("  examined: {}", summary.examined);
    println!("  flagged:  {}", summary.flagged);
    for a in engine.open_anomalies(&scope, Some(&month))? {
        println!("  [{}] {} — {}", a.severity, a.rule, a.message);
    }
    println!();

    // ── Reconcile ──────────────────────────────────────────────
    if let Some(pairs) = str_arg(&args, "--reconcile") {
        println!("=== RECONCILIATION ===");
        for pair in pairs.split(',').filter(|p| !p.trim().is_empty()) {
            let (name, dollars) = pair
                .split_once('=')
                .ok_or_else(|| anyhow!("bad --reconcile entry '{pair}', expected name=dollars"))?;
            let reported = cents_from_dollars(dollars.trim().parse::<f64>()?);
            match engine.resolve_carrier(&scope, name.trim())? {
                Resolution::Carrier(carrier_id) => {
                    let record = engine.reconcile_carrier(&scope, &carrier_id, &month, reported)?;
                    println!(
                        "  {}: {} (reported {}, internal {}, delta {})",
                        name.trim(),
                        record.status,
                        format_cents(record.reported_total_cents.unwrap_or(0)),
                        format_cents(record.internal_total_cents.unwrap_or(0)),
                        format_cents(record.delta_cents.unwrap_or(0)),
                    );
                }
                Resolution::Unresolved => {
                    log::warn!("carrier '{}' did not resolve, skipping", name.trim());
                }
            }
        }
        println!();
    }

    // ── Month close ────────────────────────────────────────────
    let checks = engine.validate_month_close(&scope, &month)?;
    println!("=== MONTH-CLOSE CHECKS ({month}) ===");
    for check in &checks {
        let mark = if check.passed { "PASS" } else { "FAIL" };
        match &check.message {
            Some(msg) => println!("  [{mark}] {} — {msg}", check.name),
            None => println!("  [{mark}] {}", check.name),
        }
    }
    println!(
        "  all passed: {}",
        month_close::all_passed(&checks)
    );
    println!();

    // ── Statements ─────────────────────────────────────────────
    if !statement_agents.is_empty() {
        println!("=== AGENT STATEMENTS ({month}) ===");
        for (agent_id, label, _) in &statement_agents {
            let stmt = engine.generate_statement(&scope, agent_id, &month)?;
            println!(
                "  {label}: commission {} − draws {} = net {}",
                format_cents(stmt.total_commission),
                format_cents(stmt.total_draws),
                format_cents(stmt.net_payable),
            );
        }
    }

    Ok(())
}

fn str_arg<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2)
        .find(|w| w[0] == flag)
        .map(|w| w[1].as_str())
}
