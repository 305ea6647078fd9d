//! Shared primitive types used across the entire engine.

use crate::error::{LedgerError, LedgerResult};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A stable, unique identifier for any entity (uuid v4 string).
pub type EntityId = String;

/// The canonical tenant identifier. Every persisted row carries one.
pub type TenantId = String;

/// A validated `YYYY-MM` reporting month.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ReportingMonth(String);

impl ReportingMonth {
    pub fn parse(raw: &str) -> LedgerResult<Self> {
        let s = raw.trim();
        // The first of the month must be a real calendar date.
        if s.len() == 7 && NaiveDate::parse_from_str(&format!("{s}-01"), "%Y-%m-%d").is_ok() {
            Ok(Self(s.to_string()))
        } else {
            Err(LedgerError::Validation(format!(
                "invalid reporting month '{raw}', expected YYYY-MM"
            )))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First calendar day of the month. Used as the payment date when
    /// posting standing monthly draws.
    pub fn first_day(&self) -> NaiveDate {
        // Infallible: the string was validated on construction.
        NaiveDate::parse_from_str(&format!("{}-01", self.0), "%Y-%m-%d").unwrap_or_default()
    }
}

impl fmt::Display for ReportingMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ReportingMonth {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value).map_err(|e| e.to_string())
    }
}

impl From<ReportingMonth> for String {
    fn from(month: ReportingMonth) -> Self {
        month.0
    }
}
