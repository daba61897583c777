//! # Financial Ratio Engine
//!
//! A library that turns noisy, partially extracted financial statements into a
//! categorized report of financial ratios, and lets users define their own
//! ratios as safe arithmetic formulas over named financial variables.
//!
//! ## Core Concepts
//!
//! - **Records**: one or two years of balance-sheet and income-statement data,
//!   as produced by document extraction. Unreadable values are `None`.
//! - **Merging**: several partial extractions of the same company are combined
//!   field by field into one record.
//! - **Base ratios**: thirteen built-in ratios in four categories, always
//!   reported, marked `incomplete` when inputs are missing.
//! - **Custom ratios**: user formulas such as `"Net Income / Revenue * 100"`,
//!   evaluated by a restricted arithmetic evaluator (no calls, attributes or imports).
//!
//! ## Example
//!
//! ```rust,ignore
//! use financial_ratio_engine::*;
//!
//! let extraction = parse_extraction(r#"{
//!     "current_year": {
//!         "year": "2023",
//!         "current_assets": {"total": 500000},
//!         "current_liabilities": {"total": 200000}
//!     }
//! }"#)?;
//!
//! let analyzer = FinancialAnalyzer::new(EngineSettings::default());
//! let report = analyzer.analyze(&[extraction.into_source()], None);
//!
//! let current = &report.ratios["liquidity"]["current_ratio"];
//! assert_eq!(current.value.as_f64(), Some(2.5));
//! ```

pub mod catalog;
pub mod dupont;
pub mod error;
pub mod flatten;
pub mod formula;
pub mod ingestion;
pub mod merger;
pub mod normalizer;
pub mod ratios;
pub mod registry;
pub mod schema;
pub mod settings;
pub mod storage;
pub mod validation;

pub use catalog::{variable_catalog, VariableCatalog, VariableInfo};
pub use dupont::{dupont_analysis, DupontAnalysis};
pub use error::{FormulaError, RatioEngineError, Result, ValidationError};
pub use flatten::{calculate_average, flatten, formula_variables};
pub use formula::{
    evaluate_formula, parse_and_validate, round_to, sample_variables, test_formula, Expr,
    FormulaTest,
};
pub use ingestion::{parse_extraction, Extraction};
pub use merger::merge_sources;
pub use normalizer::{
    check_formula_variables, extract_variables_from_formula, formula_dependencies,
    normalize_variable_name, substitute_formula_variables, FormulaDependencies, VariableCheck,
};
pub use ratios::{
    compute_all_ratios, compute_all_ratios_with, CategoryReport, RatioCalculator, RatioReport,
};
pub use registry::{merged_categories, merged_ratios_config, CategoryInfo, BASE_RATIOS};
pub use schema::*;
pub use settings::EngineSettings;
pub use storage::{CustomRatioRepository, CustomRatioStore, InMemoryStore, JsonFileStore};
pub use validation::{validate_custom_ratio, validate_formula_syntax};

use log::{debug, info};
use serde::Serialize;
use std::collections::BTreeSet;

/// Merged record, ratio report and diagnostics for one analysis request.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub record: FinancialRecord,
    pub ratios: RatioReport,
    pub confidence: f64,
    pub warnings: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dupont: Option<DupontAnalysis>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecalculationReport {
    pub ratios: RatioReport,
    pub custom_ratios_calculated: usize,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

/// Balance-sheet fields whose absence makes most of the report meaningless.
const CRITICAL_FIELDS: [(&str, fn(&YearRecord) -> Option<f64>); 3] = [
    ("Current Assets", |y| y.current_assets.total),
    ("Current Liabilities", |y| y.current_liabilities.total),
    ("Total Assets", |y| y.totals.total_assets),
];

pub struct FinancialAnalyzer {
    settings: EngineSettings,
}

impl Default for FinancialAnalyzer {
    fn default() -> Self {
        Self::new(EngineSettings::default())
    }
}

impl FinancialAnalyzer {
    pub fn new(settings: EngineSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Merges every `(record, confidence)` source and computes the full report.
    /// Custom ratios are only applied when the settings enable developer mode.
    pub fn analyze(
        &self,
        sources: &[(FinancialRecord, f64)],
        custom: Option<&[RatioDefinition]>,
    ) -> AnalysisReport {
        info!("Analyzing {} extracted source(s)", sources.len());

        let (record, confidence) = merge_sources(sources);
        let mut warnings = Vec::new();

        if sources.len() > 1 {
            warnings.push(format!("Merged data from {} image(s)", sources.len()));
        }
        if !sources.is_empty() && confidence < self.settings.low_confidence_threshold {
            warnings.push(format!(
                "Average OCR confidence: {:.0}% - please verify extracted values",
                confidence * 100.0
            ));
        }
        for (label, read) in CRITICAL_FIELDS.iter() {
            if read(&record.current_year).is_none() {
                warnings.push(format!("Missing critical field: {}", label));
            }
        }
        if record.previous_year.is_some() {
            warnings.push("Multi-year data detected - using averages for ratio calculations".to_string());
        }

        let ratios = compute_all_ratios_with(&record, custom, &self.settings);
        let dupont = dupont_analysis(&record);
        debug!("Analysis produced {} warning(s)", warnings.len());

        AnalysisReport {
            record,
            ratios,
            confidence,
            warnings,
            dupont,
        }
    }

    /// Parses raw extraction responses and analyzes them together.
    pub fn analyze_responses(
        &self,
        responses: &[&str],
        custom: Option<&[RatioDefinition]>,
    ) -> Result<AnalysisReport> {
        let sources = responses
            .iter()
            .map(|raw| parse_extraction(raw).map(Extraction::into_source))
            .collect::<Result<Vec<_>>>()?;
        Ok(self.analyze(&sources, custom))
    }

    /// Recomputes the report for an already merged record with a new set of
    /// custom ratios. Invalid definitions are reported and skipped.
    pub fn recalculate(
        &self,
        record: &FinancialRecord,
        custom: &[RatioDefinition],
    ) -> RecalculationReport {
        let calculator = RatioCalculator::new(record, &self.settings);
        let mut warnings = Vec::new();
        let mut errors = Vec::new();
        let mut valid = Vec::new();

        for definition in custom {
            match validate_custom_ratio(definition) {
                Ok(()) => valid.push(definition.clone()),
                Err(e) => errors.push(format!("Invalid ratio '{}': {}", definition.name, e)),
            }
        }

        for definition in &valid {
            let check = check_formula_variables(&definition.formula, calculator.variables());
            if !check.all_found {
                warnings.push(format!(
                    "Ratio '{}' references missing variables: {}",
                    definition.name,
                    check.missing.join(", ")
                ));
            }
        }

        let variables = calculator.variables();
        if !variables.contains_key("current_assets") {
            warnings.push("Current assets data missing - some ratios may be unavailable".to_string());
        }
        if !variables.contains_key("revenue") {
            warnings.push("Revenue data missing - profitability ratios may be unavailable".to_string());
        }

        if !self.settings.dev_mode && !valid.is_empty() {
            warnings.push("Developer mode is disabled - custom ratios were not calculated".to_string());
        }

        let ratios = calculator.compute(Some(valid.as_slice()));
        let calculated: BTreeSet<(String, String)> = valid
            .iter()
            .map(|d| (d.category_key(), d.ratio_key()))
            .filter(|(category, key)| {
                ratios
                    .get(category)
                    .and_then(|c| c.get(key))
                    .is_some_and(|r| r.is_custom && r.data_quality != DataQuality::Error)
            })
            .collect();
        let custom_ratios_calculated = calculated.len();
        info!(
            "Recalculated ratios with {} custom definition(s), {} rejected",
            custom_ratios_calculated,
            errors.len()
        );

        RecalculationReport {
            ratios,
            custom_ratios_calculated,
            warnings,
            errors,
        }
    }
}

pub fn analyze_financials(
    sources: &[(FinancialRecord, f64)],
    settings: &EngineSettings,
) -> AnalysisReport {
    FinancialAnalyzer::new(settings.clone()).analyze(sources, None)
}

pub fn recalculate_ratios(
    record: &FinancialRecord,
    custom: &[RatioDefinition],
    settings: &EngineSettings,
) -> RecalculationReport {
    FinancialAnalyzer::new(settings.clone()).recalculate(record, custom)
}
