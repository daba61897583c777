//! Base and custom ratio computation.
//!
//! Every base ratio is always present in the report. A ratio whose inputs are
//! missing, or whose denominator is zero, is reported as `N/A` with
//! `incomplete` quality and the human labels of what was missing.

use log::{debug, info, warn};
use std::collections::BTreeMap;

use crate::error::RatioEngineError;
use crate::flatten::{average, flatten};
use crate::formula::{evaluate_formula, round_to, scale_percentage};
use crate::registry::{BaseRatio, BASE_RATIOS};
use crate::schema::{
    DataQuality, FinancialRecord, RatioDefinition, RatioResult, RatioUnit, RatioValue, VariableMap,
};
use crate::settings::EngineSettings;
use crate::validation::validate_custom_ratio;

pub type CategoryReport = BTreeMap<String, RatioResult>;

/// Category key to ratio key to result.
pub type RatioReport = BTreeMap<String, CategoryReport>;

const INSUFFICIENT_DATA: &str = "Insufficient data to calculate";

/// How a base ratio turned out before it is dressed up as a [`RatioResult`].
#[derive(Debug, Clone, PartialEq)]
enum Outcome {
    Computed {
        value: f64,
        quality: DataQuality,
        note: Option<&'static str>,
        formula: Option<&'static str>,
    },
    Missing(Vec<&'static str>),
}

impl Outcome {
    fn complete(value: f64) -> Self {
        Outcome::Computed {
            value,
            quality: DataQuality::Complete,
            note: None,
            formula: None,
        }
    }
}

/// A labelled input; the label is what ends up in `missing_fields`.
type Input = (&'static str, Option<f64>);

/// `numerator / denominator * scale`, treating a zero denominator as missing.
fn quotient(numerator: Input, denominator: Input, scale: f64) -> Outcome {
    let (num_label, num) = numerator;
    let (den_label, den) = denominator;
    let den = den.filter(|d| *d != 0.0);

    match (num, den) {
        (Some(n), Some(d)) => Outcome::complete(n / d * scale),
        _ => {
            let mut missing = Vec::new();
            if num.is_none() {
                missing.push(num_label);
            }
            if den.is_none() {
                missing.push(den_label);
            }
            Outcome::Missing(missing)
        }
    }
}

pub struct RatioCalculator<'a> {
    settings: &'a EngineSettings,
    current: VariableMap,
    averages: VariableMap,
    variables: VariableMap,
}

impl<'a> RatioCalculator<'a> {
    pub fn new(record: &FinancialRecord, settings: &'a EngineSettings) -> Self {
        let current = flatten(&record.current_year);
        let averages: VariableMap = average(&record.current_year, record.previous_year.as_ref())
            .into_iter()
            .filter_map(|(key, value)| value.map(|v| (key, v)))
            .collect();

        let mut variables = current.clone();
        variables.extend(averages.iter().map(|(k, v)| (k.clone(), *v)));

        Self {
            settings,
            current,
            averages,
            variables,
        }
    }

    /// Variables visible to custom formulas: the flattened current year plus `avg_*` keys.
    pub fn variables(&self) -> &VariableMap {
        &self.variables
    }

    fn cur(&self, key: &str) -> Option<f64> {
        self.current.get(key).copied()
    }

    fn avg(&self, key: &str) -> Option<f64> {
        self.averages.get(key).copied()
    }

    pub fn compute(&self, custom: Option<&[RatioDefinition]>) -> RatioReport {
        let mut report = RatioReport::new();

        for ratio in BASE_RATIOS.iter() {
            let result = self.assemble(ratio, self.base_outcome(ratio.key));
            report
                .entry(ratio.category.to_string())
                .or_default()
                .insert(ratio.key.to_string(), result);
        }

        let custom = custom.unwrap_or_default();
        if self.settings.dev_mode && !custom.is_empty() {
            info!("Computing {} custom ratios", custom.len());
            for definition in custom {
                let result = self.custom_ratio(definition);
                report
                    .entry(definition.category_key())
                    .or_default()
                    .insert(definition.ratio_key(), result);
            }
        } else if !custom.is_empty() {
            debug!("Ignoring {} custom ratios outside developer mode", custom.len());
        }

        info!(
            "Computed {} ratios across {} categories",
            report.values().map(BTreeMap::len).sum::<usize>(),
            report.len()
        );
        report
    }

    fn base_outcome(&self, key: &str) -> Outcome {
        let revenue = ("Revenue", self.cur("revenue"));
        let net_income = ("Net Income", self.cur("net_income"));

        match key {
            "current_ratio" => quotient(
                ("Current Assets", self.cur("current_assets")),
                ("Current Liabilities", self.cur("current_liabilities")),
                1.0,
            ),
            "quick_ratio" => self.quick_ratio(),
            "gross_profit_margin" => {
                let derived = match (self.cur("revenue"), self.cur("cost_of_goods_sold")) {
                    (Some(rev), Some(cogs)) => Some(rev - cogs),
                    _ => None,
                };
                let gross_profit = self.cur("gross_profit").or(derived);
                quotient(("Gross Profit", gross_profit), revenue, 100.0)
            }
            "net_profit_margin" => quotient(net_income, revenue, 100.0),
            "return_on_equity" => quotient(
                net_income,
                ("Total Equity", self.avg("avg_total_equity")),
                100.0,
            ),
            "return_on_assets" => quotient(
                net_income,
                ("Total Assets", self.avg("avg_total_assets")),
                100.0,
            ),
            "debt_to_equity" => self.debt_to_equity(),
            "debt_ratio" => quotient(
                ("Total Liabilities", self.cur("total_liabilities")),
                ("Total Assets", self.cur("total_assets")),
                100.0,
            ),
            "interest_coverage" => {
                let numerator = self
                    .cur("ebit")
                    .map(|ebit| ebit + self.cur("income_tax_expense").unwrap_or(0.0));
                quotient(
                    ("EBIT", numerator),
                    ("Interest Expense", self.cur("interest_expense")),
                    1.0,
                )
            }
            "asset_turnover" => quotient(revenue, ("Total Assets", self.avg("avg_total_assets")), 1.0),
            "fixed_asset_turnover" => {
                quotient(revenue, ("Fixed Assets", self.avg("avg_fixed_assets")), 1.0)
            }
            "inventory_turnover" => quotient(revenue, ("Inventory", self.avg("avg_inventories")), 1.0),
            "debtors_turnover" => quotient(
                revenue,
                ("Accounts Receivable", self.avg("avg_accounts_receivable")),
                1.0,
            ),
            other => {
                warn!("No computation registered for base ratio '{}'", other);
                Outcome::Missing(Vec::new())
            }
        }
    }

    /// Falls back to zero inventory when inventory is unknown.
    fn quick_ratio(&self) -> Outcome {
        let inventory = self.cur("inventories");
        let outcome = quotient(
            ("Current Assets", self.cur("current_assets").map(|ca| ca - inventory.unwrap_or(0.0))),
            ("Current Liabilities", self.cur("current_liabilities")),
            1.0,
        );
        match (outcome, inventory) {
            (Outcome::Computed { value, .. }, None) => Outcome::Computed {
                value,
                quality: DataQuality::Estimated,
                note: Some("Inventory assumed to be 0"),
                formula: None,
            },
            (outcome, _) => outcome,
        }
    }

    /// Falls back to summing the liability groups when the aggregate is absent.
    fn debt_to_equity(&self) -> Outcome {
        let equity = ("Total Equity", self.cur("total_equity"));
        if let Some(total) = self.cur("total_liabilities") {
            return quotient(("Total Liabilities", Some(total)), equity, 1.0);
        }

        let components = match (self.cur("current_liabilities"), self.cur("non_current_liabilities")) {
            (Some(cl), Some(ncl)) => Some(cl + ncl),
            _ => None,
        };
        match quotient(("Total Liabilities", components), equity, 1.0) {
            Outcome::Computed { value, .. } => Outcome::Computed {
                value,
                quality: DataQuality::Estimated,
                note: None,
                formula: Some("(Current Liabilities + Non-Current Liabilities) / Total Equity"),
            },
            Outcome::Missing(mut missing) => {
                // Report the absent fallback components as well.
                if components.is_none() {
                    if self.cur("current_liabilities").is_none() {
                        missing.push("Current Liabilities");
                    }
                    if self.cur("non_current_liabilities").is_none() {
                        missing.push("Non-Current Liabilities");
                    }
                }
                Outcome::Missing(missing)
            }
        }
    }

    fn assemble(&self, ratio: &BaseRatio, outcome: Outcome) -> RatioResult {
        let unit = Some(ratio.unit.as_str().to_string());
        match outcome {
            Outcome::Computed {
                value,
                quality,
                note,
                formula,
            } if value.is_finite() => RatioResult {
                value: RatioValue::Value(round_to(value, self.settings.decimal_places)),
                formula: formula.unwrap_or(ratio.formula).to_string(),
                interpretation: ratio.interpretation.to_string(),
                unit,
                data_quality: quality,
                missing_fields: Vec::new(),
                note: note.map(str::to_string),
                error: None,
                is_custom: false,
            },
            Outcome::Computed { .. } => RatioResult {
                value: RatioValue::NotAvailable,
                formula: ratio.formula.to_string(),
                interpretation: INSUFFICIENT_DATA.to_string(),
                unit,
                data_quality: DataQuality::Incomplete,
                missing_fields: Vec::new(),
                note: None,
                error: None,
                is_custom: false,
            },
            Outcome::Missing(fields) => RatioResult {
                value: RatioValue::NotAvailable,
                formula: ratio.formula.to_string(),
                interpretation: INSUFFICIENT_DATA.to_string(),
                unit,
                data_quality: DataQuality::Incomplete,
                missing_fields: fields.into_iter().map(str::to_string).collect(),
                note: None,
                error: None,
                is_custom: false,
            },
        }
    }

    fn evaluate_custom(&self, definition: &RatioDefinition) -> Result<f64, RatioEngineError> {
        validate_custom_ratio(definition)?;
        let data: BTreeMap<String, Option<f64>> = self
            .variables
            .iter()
            .map(|(k, v)| (k.clone(), Some(*v)))
            .collect();
        let raw = evaluate_formula(&definition.formula, &data, true)?;

        let scaled = match definition.parsed_unit()? {
            RatioUnit::Percent => scale_percentage(raw, self.settings.percent_fraction_threshold),
            _ => raw,
        };
        Ok(round_to(scaled, self.settings.decimal_places))
    }

    /// Validates and evaluates one custom ratio. Failures become an `error`
    /// result rather than aborting the report.
    pub fn custom_ratio(&self, definition: &RatioDefinition) -> RatioResult {
        let unit = (!definition.unit.trim().is_empty()).then(|| definition.unit.trim().to_string());

        match self.evaluate_custom(definition) {
            Ok(value) => {
                debug!("Custom ratio '{}' = {}", definition.name, value);
                RatioResult {
                    value: RatioValue::Value(value),
                    formula: definition.formula.clone(),
                    interpretation: definition.interpretation.clone(),
                    unit,
                    data_quality: DataQuality::Complete,
                    missing_fields: Vec::new(),
                    note: None,
                    error: None,
                    is_custom: true,
                }
            }
            Err(e) => {
                warn!("Custom ratio '{}' failed: {}", definition.name, e);
                RatioResult {
                    value: RatioValue::NotAvailable,
                    formula: definition.formula.clone(),
                    interpretation: definition.interpretation.clone(),
                    unit,
                    data_quality: DataQuality::Error,
                    missing_fields: Vec::new(),
                    note: None,
                    error: Some(e.to_string()),
                    is_custom: true,
                }
            }
        }
    }
}

/// Computes every base ratio, plus the custom ones when `dev_mode` is set.
pub fn compute_all_ratios(
    record: &FinancialRecord,
    custom: Option<&[RatioDefinition]>,
    dev_mode: bool,
) -> RatioReport {
    let settings = EngineSettings::default().with_dev_mode(dev_mode);
    compute_all_ratios_with(record, custom, &settings)
}

pub fn compute_all_ratios_with(
    record: &FinancialRecord,
    custom: Option<&[RatioDefinition]>,
    settings: &EngineSettings,
) -> RatioReport {
    RatioCalculator::new(record, settings).compute(custom)
}
