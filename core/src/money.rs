//! Fixed-point money. All monetary values are integer cents; percentages
//! and rates are REAL percent points (15.0 = 15%).

pub type Cents = i64;

/// One agent's share of a commission at `percent`, rounded half away
/// from zero to whole cents.
pub fn split_cents(commission: Cents, percent: f64) -> Cents {
    let raw = commission as f64 * percent / 100.0;
    if raw >= 0.0 {
        (raw + 0.5).floor() as Cents
    } else {
        (raw - 0.5).ceil() as Cents
    }
}

/// Which allocation absorbs the cent remainder when splits are adjusted
/// to sum exactly to the commission: the largest split, first on ties.
/// An explicit function so the selection policy is testable.
pub fn remainder_index(split_amounts: &[Cents]) -> usize {
    let mut idx = 0;
    for (i, amount) in split_amounts.iter().enumerate() {
        if amount.abs() > split_amounts[idx].abs() {
            idx = i;
        }
    }
    idx
}

/// Convert a dollar amount from an input file to cents.
pub fn cents_from_dollars(dollars: f64) -> Cents {
    (dollars * 100.0).round() as Cents
}

/// Render cents as a plain dollar string for reports.
pub fn format_cents(cents: Cents) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.abs();
    format!("{sign}{}.{:02}", abs / 100, abs % 100)
}
