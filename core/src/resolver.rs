//! Carrier resolver — maps free-text statement carrier names to a
//! canonical carrier identity.
//!
//! Matching is case-insensitive and exact, against the carrier's own name,
//! then its code, then any registered alias. No side effects. Ambiguity
//! cannot occur at resolution time: alias uniqueness is enforced when the
//! alias is created.

use crate::error::LedgerResult;
use crate::store::CommissionStore;
use crate::types::EntityId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Carrier(EntityId),
    /// No match. The caller decides whether to create a carrier or leave
    /// the transaction's carrier field as free text.
    Unresolved,
}

pub fn resolve(store: &CommissionStore, tenant_id: &str, raw: &str) -> LedgerResult<Resolution> {
    let needle = raw.trim();
    if needle.is_empty() {
        return Ok(Resolution::Unresolved);
    }
    if let Some(id) = store.find_carrier_by_name_or_code(tenant_id, needle)? {
        return Ok(Resolution::Carrier(id));
    }
    if let Some(id) = store.carrier_id_for_alias(tenant_id, needle)? {
        return Ok(Resolution::Carrier(id));
    }
    Ok(Resolution::Unresolved)
}
