use log::{debug, warn};
use serde_json::Value;

use crate::error::{RatioEngineError, Result};
use crate::schema::{FinancialRecord, YearRecord};

/// Confidence assigned when the payload parses cleanly but does not report one.
pub const DEFAULT_CONFIDENCE: f64 = 0.9;

/// Confidence assigned when the JSON had to be cut out of surrounding text.
pub const RECOVERED_CONFIDENCE: f64 = 0.85;

const YEAR_FIELDS: [&str; 8] = [
    "year",
    "current_assets",
    "non_current_assets",
    "current_liabilities",
    "non_current_liabilities",
    "equity",
    "income_statement",
    "totals",
];

/// One parsed extraction response.
#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    pub record: FinancialRecord,
    pub confidence: f64,
}

impl Extraction {
    pub fn into_source(self) -> (FinancialRecord, f64) {
        (self.record, self.confidence)
    }
}

/// Removes a surrounding markdown code fence, with or without a `json` tag.
pub fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let opened = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```JSON"))
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    let closed = opened.trim_end().strip_suffix("```").unwrap_or(opened);
    closed.trim()
}

fn embedded_json(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    (start < end).then(|| &raw[start..=end])
}

/// Parses a raw extraction response into a record and a confidence.
///
/// Accepts fenced or bare JSON. When the body is not valid JSON on its own,
/// the outermost `{...}` slice is tried before giving up.
pub fn parse_extraction(raw: &str) -> Result<Extraction> {
    let body = strip_code_fences(raw);

    match serde_json::from_str::<Value>(body) {
        Ok(value) => extraction_from_value(value, DEFAULT_CONFIDENCE),
        Err(err) => {
            let Some(slice) = embedded_json(body) else {
                return Err(err.into());
            };
            warn!("Extraction response was not clean JSON ({}), recovering embedded object", err);
            let value = serde_json::from_str::<Value>(slice)?;
            extraction_from_value(value, RECOVERED_CONFIDENCE)
        }
    }
}

/// Builds an [`Extraction`] from an already-parsed JSON value.
///
/// Recognized shapes: `{"years": [...]}`, a top-level array of years,
/// `{"current_year": ..., "previous_year": ...}`, or a single bare year.
/// A top-level `confidence` overrides `default_confidence`; both are clamped to `[0, 1]`.
pub fn extraction_from_value(mut value: Value, default_confidence: f64) -> Result<Extraction> {
    let reported = value
        .as_object_mut()
        .and_then(|obj| obj.remove("confidence"))
        .and_then(|c| crate::schema::amount_from_value(&c));
    let confidence = reported.unwrap_or(default_confidence).clamp(0.0, 1.0);

    let record = record_from_value(value)?;
    debug!(
        "Parsed extraction: year {:?}, multi-year: {}, confidence {:.2}",
        record.current_year.year,
        record.is_multi_year(),
        confidence
    );
    Ok(Extraction { record, confidence })
}

fn record_from_value(value: Value) -> Result<FinancialRecord> {
    match value {
        Value::Array(years) => record_from_years(years),
        Value::Object(mut obj) => {
            if let Some(years) = obj.remove("years") {
                return match years {
                    Value::Array(years) => record_from_years(years),
                    other => Err(RatioEngineError::InvalidExtraction(format!(
                        "'years' must be an array, found {}",
                        json_kind(&other)
                    ))),
                };
            }
            if obj.contains_key("current_year") {
                let record: FinancialRecord = serde_json::from_value(Value::Object(obj))?;
                // Route through the constructor so an empty previous year is dropped.
                return Ok(FinancialRecord {
                    all_years: record.all_years,
                    ..FinancialRecord::new(record.current_year, record.previous_year)
                });
            }
            if YEAR_FIELDS.iter().any(|field| obj.contains_key(*field)) {
                let year: YearRecord = serde_json::from_value(Value::Object(obj))?;
                return Ok(FinancialRecord::new(year, None));
            }
            Err(RatioEngineError::InvalidExtraction(
                "object has no recognizable financial fields".to_string(),
            ))
        }
        other => Err(RatioEngineError::InvalidExtraction(format!(
            "expected an object or array, found {}",
            json_kind(&other)
        ))),
    }
}

/// First entry is the current year, the second (when it has data) the previous one.
fn record_from_years(years: Vec<Value>) -> Result<FinancialRecord> {
    let years: Vec<YearRecord> = serde_json::from_value(Value::Array(years))?;
    let mut iter = years.iter().cloned();
    let Some(current) = iter.next() else {
        return Err(RatioEngineError::InvalidExtraction("'years' is empty".to_string()));
    };
    let previous = iter.next();

    Ok(FinancialRecord {
        all_years: years.into_iter().filter(YearRecord::has_data).collect(),
        ..FinancialRecord::new(current, previous)
    })
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
