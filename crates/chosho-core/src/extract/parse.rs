//! Reading records out of free-form model output.
//!
//! The model usually answers with bare JSON but sometimes wraps it in a
//! fenced code block, with or without a language tag. Parsing happens in
//! two stages: the whole (trimmed) response first, then every fenced block
//! in order until one parses.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use thiserror::Error;

use crate::RawRecord;

static FENCED_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```[A-Za-z0-9_-]*[ \t]*\r?\n?(.*?)```").unwrap());

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseFailure {
    #[error("response is empty")]
    Empty,
    #[error("invalid JSON: {0}")]
    InvalidJson(String),
    #[error("JSON object has no `records` field")]
    MissingRecords,
    #[error("expected a JSON object or array, got {0}")]
    UnexpectedShape(&'static str),
}

/// Parse a model response into raw records.
///
/// Accepts `{"records": [...]}` (a null `records` counts as empty) or a
/// bare array of records.
pub fn parse_response(text: &str) -> Result<Vec<RawRecord>, ParseFailure> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(ParseFailure::Empty);
    }

    let direct_err = match serde_json::from_str::<Value>(trimmed) {
        Ok(value) => return records_from_value(value),
        Err(e) => e,
    };

    // The first block that yields records wins; otherwise report the last failure.
    let mut last_err = None;
    for block in fenced_blocks(trimmed) {
        let parsed = serde_json::from_str::<Value>(block.trim())
            .map_err(|e| ParseFailure::InvalidJson(e.to_string()))
            .and_then(records_from_value);
        match parsed {
            Ok(records) => return Ok(records),
            Err(e) => last_err = Some(e),
        }
    }

    Err(last_err.unwrap_or_else(|| ParseFailure::InvalidJson(direct_err.to_string())))
}

/// Inner contents of each fenced block, in order of appearance.
fn fenced_blocks(text: &str) -> impl Iterator<Item = &str> {
    FENCED_BLOCK
        .captures_iter(text)
        .filter_map(|caps| caps.get(1).map(|m| m.as_str()))
}

fn records_from_value(value: Value) -> Result<Vec<RawRecord>, ParseFailure> {
    let records = match value {
        Value::Object(mut map) => match map.remove("records") {
            Some(Value::Null) => return Ok(Vec::new()),
            Some(records) => records,
            None => return Err(ParseFailure::MissingRecords),
        },
        array @ Value::Array(_) => array,
        other => return Err(ParseFailure::UnexpectedShape(value_kind(&other))),
    };

    serde_json::from_value::<Vec<RawRecord>>(records)
        .map_err(|e| ParseFailure::InvalidJson(e.to_string()))
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
