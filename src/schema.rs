use schemars::JsonSchema;
use serde::de::Deserializer;
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::ValidationError;
use crate::normalizer::slugify;

/// Canonical variable name to value. Never holds nulls.
pub type VariableMap = BTreeMap<String, f64>;

/// Line items keyed by their extracted label; `None` means the value was unreadable.
pub type LineItems = BTreeMap<String, Option<f64>>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CategoryData {
    #[schemars(
        description = "Authoritative total for the category as printed on the statement. Null when not shown."
    )]
    #[serde(default, deserialize_with = "lenient_amount")]
    pub total: Option<f64>,

    #[schemars(
        description = "Supplemental line items (e.g. cash, inventories, accounts_receivable). Never replaces the total."
    )]
    #[serde(default, deserialize_with = "lenient_line_items")]
    pub breakdown: LineItems,
}

impl CategoryData {
    pub fn item(&self, key: &str) -> Option<f64> {
        self.breakdown.get(key).copied().flatten()
    }

    fn has_data(&self) -> bool {
        self.total.is_some() || self.breakdown.values().any(Option::is_some)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Totals {
    #[serde(default, deserialize_with = "lenient_amount")]
    pub total_assets: Option<f64>,
    #[serde(default, deserialize_with = "lenient_amount")]
    pub total_liabilities: Option<f64>,
    #[serde(default, deserialize_with = "lenient_amount")]
    pub total_equity: Option<f64>,
}

impl Totals {
    fn has_data(&self) -> bool {
        self.total_assets.is_some() || self.total_liabilities.is_some() || self.total_equity.is_some()
    }
}

/// One reporting year of balance-sheet and income-statement data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct YearRecord {
    #[schemars(description = "Fiscal year label (e.g. \"2023\" or \"FY2023\"). Null when unknown.")]
    #[serde(default, deserialize_with = "year_label")]
    pub year: Option<String>,

    #[serde(default, deserialize_with = "null_as_default")]
    pub current_assets: CategoryData,

    #[serde(default, deserialize_with = "null_as_default")]
    pub non_current_assets: CategoryData,

    #[serde(default, deserialize_with = "null_as_default")]
    pub current_liabilities: CategoryData,

    #[serde(default, deserialize_with = "null_as_default")]
    pub non_current_liabilities: CategoryData,

    #[serde(default, deserialize_with = "null_as_default")]
    pub equity: CategoryData,

    #[schemars(
        description = "Income statement lines in snake_case (revenue, cost_of_goods_sold, gross_profit, operating_expenses, operating_income, ebit, interest_expense, income_tax_expense, net_income)"
    )]
    #[serde(default, deserialize_with = "lenient_line_items")]
    pub income_statement: LineItems,

    #[serde(default, deserialize_with = "null_as_default")]
    pub totals: Totals,
}

impl YearRecord {
    pub fn with_year(year: impl Into<String>) -> Self {
        Self {
            year: Some(year.into()),
            ..Self::default()
        }
    }

    /// True when at least one value other than `year` is present.
    pub fn has_data(&self) -> bool {
        self.categories().iter().any(|c| c.has_data())
            || self.income_statement.values().any(Option::is_some)
            || self.totals.has_data()
    }

    pub fn income(&self, key: &str) -> Option<f64> {
        self.income_statement.get(key).copied().flatten()
    }

    pub fn categories(&self) -> [&CategoryData; 5] {
        [
            &self.current_assets,
            &self.non_current_assets,
            &self.current_liabilities,
            &self.non_current_liabilities,
            &self.equity,
        ]
    }
}

/// A merged, possibly multi-year set of statements.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FinancialRecord {
    #[serde(default, deserialize_with = "null_as_default")]
    pub current_year: YearRecord,

    #[schemars(description = "Comparative prior year. Null when the document shows a single year.")]
    #[serde(default, deserialize_with = "present_year")]
    pub previous_year: Option<YearRecord>,

    #[schemars(description = "Every year found, most recent first")]
    #[serde(default, deserialize_with = "null_as_default")]
    pub all_years: Vec<YearRecord>,
}

impl FinancialRecord {
    pub fn new(current_year: YearRecord, previous_year: Option<YearRecord>) -> Self {
        Self {
            current_year,
            previous_year: previous_year.filter(YearRecord::has_data),
            all_years: Vec::new(),
        }
    }

    pub fn is_multi_year(&self) -> bool {
        self.previous_year.is_some() || self.all_years.len() > 1
    }

    pub fn generate_json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(FinancialRecord)
    }

    pub fn schema_as_json() -> Result<String, serde_json::Error> {
        let schema = Self::generate_json_schema();
        serde_json::to_string_pretty(&schema)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum RatioUnit {
    #[serde(rename = "%")]
    Percent,
    #[serde(rename = "ratio")]
    Ratio,
    #[serde(rename = "times")]
    Times,
    #[serde(rename = "days")]
    Days,
    #[serde(rename = "number")]
    Number,
}

impl RatioUnit {
    pub const fn as_str(&self) -> &'static str {
        match self {
            RatioUnit::Percent => "%",
            RatioUnit::Ratio => "ratio",
            RatioUnit::Times => "times",
            RatioUnit::Days => "days",
            RatioUnit::Number => "number",
        }
    }
}

impl FromStr for RatioUnit {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "%" => Ok(RatioUnit::Percent),
            "ratio" => Ok(RatioUnit::Ratio),
            "times" => Ok(RatioUnit::Times),
            "days" => Ok(RatioUnit::Days),
            "number" => Ok(RatioUnit::Number),
            other => Err(ValidationError::InvalidUnit(other.to_string())),
        }
    }
}

impl fmt::Display for RatioUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct IdealRange {
    pub min: f64,
    pub max: f64,
    pub optimal: f64,
}

/// A base or user-authored ratio. The unit is kept as text so that an
/// invalid unit is reported per ratio rather than failing the whole payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RatioDefinition {
    #[serde(default, alias = "id", skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub category: String,

    #[schemars(
        description = "Arithmetic over named variables, e.g. \"(Current Assets - Inventories) / Current Liabilities\""
    )]
    #[serde(default)]
    pub formula: String,

    #[serde(default)]
    pub interpretation: String,

    #[schemars(description = "One of: %, ratio, times, days, number")]
    #[serde(default)]
    pub unit: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ideal_range: Option<IdealRange>,

    #[serde(default = "default_true")]
    pub higher_is_better: bool,

    #[serde(default)]
    pub is_base: bool,
}

impl RatioDefinition {
    pub fn new(
        name: impl Into<String>,
        category: impl Into<String>,
        formula: impl Into<String>,
        unit: RatioUnit,
    ) -> Self {
        Self {
            key: None,
            name: name.into(),
            category: category.into(),
            formula: formula.into(),
            interpretation: String::new(),
            unit: unit.as_str().to_string(),
            ideal_range: None,
            higher_is_better: true,
            is_base: false,
        }
    }

    /// Explicit key, or the slugified name.
    pub fn ratio_key(&self) -> String {
        match self.key.as_deref().map(str::trim) {
            Some(key) if !key.is_empty() => key.to_string(),
            _ => slugify(&self.name),
        }
    }

    /// Lowercased category, `custom` when blank.
    pub fn category_key(&self) -> String {
        let category = self.category.trim().to_lowercase();
        if category.is_empty() {
            "custom".to_string()
        } else {
            category
        }
    }

    pub fn parsed_unit(&self) -> Result<RatioUnit, ValidationError> {
        self.unit.parse()
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataQuality {
    Complete,
    Estimated,
    Incomplete,
    Error,
}

/// A computed ratio value, or the `"N/A"` marker when it could not be computed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RatioValue {
    Value(f64),
    NotAvailable,
}

impl RatioValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            RatioValue::Value(v) => Some(*v),
            RatioValue::NotAvailable => None,
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, RatioValue::Value(_))
    }
}

impl Serialize for RatioValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            RatioValue::Value(v) => serializer.serialize_f64(*v),
            RatioValue::NotAvailable => serializer.serialize_str("N/A"),
        }
    }
}

impl<'de> Deserialize<'de> for RatioValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = serde_json::Value::deserialize(deserializer)?;
        Ok(match raw.as_f64() {
            Some(v) => RatioValue::Value(v),
            None => RatioValue::NotAvailable,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatioResult {
    pub value: RatioValue,
    pub formula: String,
    pub interpretation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    pub data_quality: DataQuality,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub missing_fields: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_custom: bool,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn present_year<'de, D>(deserializer: D) -> Result<Option<YearRecord>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<YearRecord>::deserialize(deserializer)?.filter(YearRecord::has_data))
}

fn year_label<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match raw {
        None | Some(serde_json::Value::Null) => None,
        Some(serde_json::Value::String(s)) => {
            let s = s.trim();
            (!s.is_empty()).then(|| s.to_string())
        }
        Some(other) => Some(other.to_string()),
    })
}

/// Extracted amounts arrive as numbers, numeric strings ("1,250.00") or junk.
/// Anything that is not a readable number becomes `None`.
pub(crate) fn amount_from_value(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(n) => n.as_f64().filter(|v| v.is_finite()),
        serde_json::Value::String(s) => {
            let cleaned: String = s.chars().filter(|c| !matches!(c, ',' | ' ' | '$')).collect();
            cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
        }
        _ => None,
    }
}

fn lenient_amount<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(raw.as_ref().and_then(amount_from_value))
}

fn lenient_line_items<'de, D>(deserializer: D) -> Result<LineItems, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<BTreeMap<String, serde_json::Value>>::deserialize(deserializer)?;
    Ok(raw
        .unwrap_or_default()
        .into_iter()
        .map(|(key, value)| {
            let amount = amount_from_value(&value);
            (key, amount)
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_schema_generation() {
        let schema_json = FinancialRecord::schema_as_json().unwrap();
        assert!(schema_json.contains("current_year"));
        assert!(schema_json.contains("previous_year"));
        assert!(schema_json.contains("income_statement"));
    }

    #[test]
    fn test_null_groups_and_numeric_year() {
        let year: YearRecord = serde_json::from_value(json!({
            "year": 2023,
            "current_assets": null,
            "equity": { "total": 600000, "breakdown": null },
            "income_statement": { "revenue": "2,000,000", "other": "n/a" },
            "totals": null
        }))
        .unwrap();

        assert_eq!(year.year.as_deref(), Some("2023"));
        assert_eq!(year.current_assets, CategoryData::default());
        assert_eq!(year.equity.total, Some(600000.0));
        assert_eq!(year.income("revenue"), Some(2_000_000.0));
        assert_eq!(year.income_statement.get("other"), Some(&None));
        assert!(year.has_data());
    }

    #[test]
    fn test_empty_previous_year_is_absent() {
        let record: FinancialRecord = serde_json::from_value(json!({
            "current_year": { "year": "2023", "totals": { "total_assets": 100.0 } },
            "previous_year": { "year": "2022", "income_statement": { "revenue": null } }
        }))
        .unwrap();

        assert!(record.previous_year.is_none());
        assert!(record.all_years.is_empty());
        assert!(!YearRecord::with_year("2022").has_data());
    }

    #[test]
    fn test_ratio_value_serialization() {
        assert_eq!(serde_json::to_value(RatioValue::Value(2.5)).unwrap(), json!(2.5));
        assert_eq!(serde_json::to_value(RatioValue::NotAvailable).unwrap(), json!("N/A"));

        let back: RatioValue = serde_json::from_value(json!("N/A")).unwrap();
        assert_eq!(back, RatioValue::NotAvailable);
    }

    #[test]
    fn test_ratio_result_skips_empty_fields() {
        let result = RatioResult {
            value: RatioValue::Value(1.2),
            formula: "A / B".to_string(),
            interpretation: String::new(),
            unit: None,
            data_quality: DataQuality::Complete,
            missing_fields: Vec::new(),
            note: None,
            error: None,
            is_custom: false,
        };

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["data_quality"], "complete");
        assert!(json.get("missing_fields").is_none());
        assert!(json.get("is_custom").is_none());
        assert!(json.get("error").is_none());
    }

    #[test]
    fn test_ratio_definition_defaults() {
        let def: RatioDefinition = serde_json::from_value(json!({
            "id": "cash_cover",
            "name": "Cash Cover",
            "category": "  Liquidity ",
            "formula": "Cash / Current Liabilities",
            "unit": "ratio"
        }))
        .unwrap();

        assert_eq!(def.ratio_key(), "cash_cover");
        assert_eq!(def.category_key(), "liquidity");
        assert!(def.higher_is_better);
        assert_eq!(def.parsed_unit().unwrap(), RatioUnit::Ratio);

        let unnamed = RatioDefinition::new("Owner's Cash Share", "", "Cash", RatioUnit::Percent);
        assert_eq!(unnamed.ratio_key(), "owners_cash_share");
        assert_eq!(unnamed.category_key(), "custom");
    }

    #[test]
    fn test_unit_parsing() {
        assert_eq!("%".parse::<RatioUnit>().unwrap(), RatioUnit::Percent);
        assert_eq!(
            "percent".parse::<RatioUnit>(),
            Err(ValidationError::InvalidUnit("percent".to_string()))
        );
    }
}
