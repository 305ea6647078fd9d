//! Engine tolerances. Deployments load these from a JSON file; tests use
//! the defaults.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Allowed deviation of a transaction's split-percent total from 100
    /// before the split-total rule fires.
    #[serde(default = "default_split_total_epsilon")]
    pub split_total_epsilon: f64,

    /// Allowed deviation (percent points) of a transaction's commission
    /// rate from the carrier's default for its transaction type.
    #[serde(default = "default_rate_tolerance")]
    pub rate_tolerance: f64,

    /// Allowed difference between a carrier-reported total and the
    /// internal total before a reconciliation is marked unmatched.
    #[serde(default)]
    pub recon_tolerance_cents: i64,
}

fn default_split_total_epsilon() -> f64 {
    0.01
}

fn default_rate_tolerance() -> f64 {
    0.5
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            split_total_epsilon: default_split_total_epsilon(),
            rate_tolerance: default_rate_tolerance(),
            recon_tolerance_cents: 0,
        }
    }
}

impl EngineConfig {
    /// Load from a JSON file. Missing fields fall back to defaults.
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        Ok(serde_json::from_str(&content)?)
    }
}
