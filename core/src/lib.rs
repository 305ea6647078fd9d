//! commission-core — the commission reconciliation & allocation engine of
//! an insurance agency back office.
//!
//! The engine ingests carrier-reported statement rows, splits each
//! transaction's commission across agents by percentage, detects rule
//! violations over those allocations, nets draw advances in per-agent
//! statements, and gates month close behind a battery of consistency
//! checks.
//!
//! RULES:
//!   - Only the store talks to SQLite. Components call store methods.
//!   - Every operation takes an AccessScope and is tenant-scoped.
//!   - Monetary amounts are integer cents end to end — never floats.

pub mod allocation;
pub mod anomaly;
pub mod audit;
pub mod config;
pub mod draw;
pub mod engine;
pub mod error;
pub mod ingest;
pub mod money;
pub mod month_close;
pub mod resolver;
pub mod scope;
pub mod statement;
pub mod store;
pub mod types;
