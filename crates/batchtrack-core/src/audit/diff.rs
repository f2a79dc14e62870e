//! Before/after field diffing for audit log events
//!
//! Values are normalized before comparison so cosmetic differences
//! (whitespace, numeric formatting, time-of-day on dates) do not show
//! up as changes in the audit trail.

use chrono::NaiveDate;
use serde_json::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Grouped raw field values of one record, keyed group -> field -> value
pub type Snapshot = BTreeMap<&'static str, BTreeMap<&'static str, Value>>;

/// Raw before/after pair of one changed field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldChange {
    pub before: Value,
    pub after: Value,
}

/// Changed fields keyed `"<group>.<field>"`
pub type ChangeMap = BTreeMap<String, FieldChange>;

/// Canonical form a raw value is reduced to before comparison
#[derive(Debug, Clone, PartialEq, Eq)]
enum Normalized {
    Absent,
    Number(String),
    Day(NaiveDate),
    Text(String),
}

fn normalize(value: &Value) -> Normalized {
    match value {
        Value::Null => Normalized::Absent,
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                Normalized::Absent
            } else if let Some(day) = parse_day(trimmed) {
                Normalized::Day(day)
            } else if let Some(number) = canonical_number(trimmed) {
                Normalized::Number(number)
            } else {
                Normalized::Text(trimmed.to_string())
            }
        }
        Value::Number(n) => {
            canonical_number(&n.to_string()).map_or_else(|| Normalized::Text(n.to_string()), Normalized::Number)
        }
        Value::Bool(b) => Normalized::Text(b.to_string()),
        other => Normalized::Text(other.to_string()),
    }
}

/// Calendar date at day granularity, accepting bare dates and RFC 3339
/// timestamps
fn parse_day(text: &str) -> Option<NaiveDate> {
    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return Some(date);
    }
    if let Ok(stamp) = chrono::DateTime::parse_from_rfc3339(text) {
        return Some(stamp.date_naive());
    }
    None
}

/// Canonical numeric string, so "012", "12" and "12.0" compare equal
fn canonical_number(text: &str) -> Option<String> {
    let number: f64 = text.parse().ok()?;
    if !number.is_finite() {
        return None;
    }
    if number.fract() == 0.0 && number.abs() < 9_007_199_254_740_992.0 {
        Some(format!("{}", number as i64))
    } else {
        Some(number.to_string())
    }
}

/// Compute the changed fields between two snapshots of the same shaped
/// record. Only fields whose normalized forms differ are reported; raw
/// values are kept in the output.
pub fn diff_snapshots(before: &Snapshot, after: &Snapshot) -> ChangeMap {
    let mut changes = ChangeMap::new();

    let groups: std::collections::BTreeSet<&&str> = before.keys().chain(after.keys()).collect();
    for group in groups {
        let empty = BTreeMap::new();
        let before_fields = before.get(*group).unwrap_or(&empty);
        let after_fields = after.get(*group).unwrap_or(&empty);

        let fields: std::collections::BTreeSet<&&str> =
            before_fields.keys().chain(after_fields.keys()).collect();
        for field in fields {
            let raw_before = before_fields.get(*field).cloned().unwrap_or(Value::Null);
            let raw_after = after_fields.get(*field).cloned().unwrap_or(Value::Null);

            if normalize(&raw_before) != normalize(&raw_after) {
                changes.insert(
                    format!("{}.{}", group, field),
                    FieldChange {
                        before: raw_before,
                        after: raw_after,
                    },
                );
            }
        }
    }

    changes
}
