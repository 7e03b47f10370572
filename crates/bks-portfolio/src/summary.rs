//! Plain-text account summary.

use std::collections::BTreeMap;

use bks_schemas::AccountValue;
use chrono::{DateTime, Utc};

/// (candidate tags in priority order, printed label).
pub const SUMMARY_FIELDS: &[(&[&str], &str)] = &[
    (&["NetLiquidation"], "NetLiquidation"),
    (&["AvailableFunds"], "AvailableFunds"),
    (&["BuyingPower"], "BuyingPower"),
    (&["EquityWithLoanValue"], "EquityWithLoanValue"),
    (&["InitMarginReq"], "InitMarginReq"),
    (&["MaintMarginReq"], "MaintMarginReq"),
    (&["ExcessLiquidity"], "ExcessLiquidity"),
    (
        &["TotalCashBalance", "TotalCashValue", "CashBalance", "SettledCash"],
        "CashBalance",
    ),
];

const PREFERRED_CURRENCY: &str = "BASE";

/// Render the summary block for `account`. Rows for other accounts are
/// ignored; rows with an empty account are kept.
pub fn format_account_summary(values: &[AccountValue], account: &str, now: DateTime<Utc>) -> String {
    let mut by_tag: BTreeMap<&str, Vec<&AccountValue>> = BTreeMap::new();
    for v in values {
        if !v.account.is_empty() && v.account != account {
            continue;
        }
        by_tag.entry(v.tag.as_str()).or_default().push(v);
    }

    let mut lines = vec![
        format!("Account: {account}"),
        format!("Updated: {}", now.to_rfc3339()),
        String::new(),
    ];

    for (tags, label) in SUMMARY_FIELDS {
        match pick(&by_tag, tags) {
            Some(entry) if !entry.value.trim().is_empty() => {
                let currency = if entry.currency.is_empty() {
                    String::new()
                } else {
                    format!(" {}", entry.currency)
                };
                lines.push(format!("{label}: {}{currency}", format_value(&entry.value)));
            }
            _ => lines.push(format!("{label}: N/A")),
        }
    }

    lines.join("\n")
}

fn pick<'a>(by_tag: &BTreeMap<&str, Vec<&'a AccountValue>>, tags: &[&str]) -> Option<&'a AccountValue> {
    for tag in tags {
        let Some(entries) = by_tag.get(tag) else {
            continue;
        };
        if let Some(base) = entries.iter().find(|e| e.currency == PREFERRED_CURRENCY) {
            return Some(*base);
        }
        if let Some(first) = entries.first() {
            return Some(*first);
        }
    }
    None
}

/// `"1234567.891"` → `"1,234,567.89"`; non-numeric input is returned unchanged.
pub fn format_value(raw: &str) -> String {
    let Ok(v) = raw.trim().parse::<f64>() else {
        return raw.to_string();
    };
    if !v.is_finite() {
        return raw.to_string();
    }
    let fixed = format!("{:.2}", v.abs());
    let (int_part, frac_part) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    let sign = if v < 0.0 && fixed.bytes().any(|b| b.is_ascii_digit() && b != b'0') {
        "-"
    } else {
        ""
    };
    format!("{sign}{grouped}.{frac_part}")
}
