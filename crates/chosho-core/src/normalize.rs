//! Coercion of model output into [`Record`]s.
//!
//! The extraction model is not trusted to produce well-typed JSON: amounts
//! arrive as integers, floats, formatted strings (`"100,000"`, `"¥10,210"`)
//! or not at all. Deserialization accepts all of these; normalization then
//! fills the gaps with zero.

use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::{RawRecord, Record};

/// Fill missing amounts with zero. Text fields pass through untouched.
pub fn normalize(raw: RawRecord) -> Record {
    Record {
        category: raw.category,
        detail: raw.detail,
        payment_amount: raw.payment_amount.unwrap_or(0),
        withholding_tax: raw.withholding_tax.unwrap_or(0),
        payer_address: raw.payer_address,
        payer_name: raw.payer_name,
        payer_tel: raw.payer_tel,
    }
}

/// Normalize every record, preserving order and count.
pub fn normalize_all(raw: Vec<RawRecord>) -> Vec<Record> {
    raw.into_iter().map(normalize).collect()
}

/// Interpret a JSON value as a yen amount.
pub fn amount_from_value(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.trunc() as i64)),
        Value::String(s) => parse_amount_text(s),
        _ => None,
    }
}

fn parse_amount_text(s: &str) -> Option<i64> {
    let cleaned: String = s
        .chars()
        .filter(|c| !matches!(c, ',' | '，' | '¥' | '￥' | '円' | ' ' | '\u{3000}'))
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<i64>().ok().or_else(|| {
        cleaned
            .parse::<f64>()
            .ok()
            .filter(|f| f.is_finite())
            .map(|f| f.trunc() as i64)
    })
}

pub(crate) fn deserialize_amount<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(amount_from_value))
}

pub(crate) fn deserialize_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s,
        Some(other) => other.to_string(),
    })
}
