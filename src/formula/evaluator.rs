use log::debug;
use serde::Serialize;
use std::collections::BTreeMap;

use super::{parse_and_validate, BinaryOp, Expr, UnaryOp};
use crate::error::FormulaError;
use crate::normalizer::substitute_formula_variables;
use crate::schema::VariableMap;

/// Evaluates a validated expression. Errors from nested operands propagate unchanged.
pub fn evaluate(expr: &Expr, vars: &VariableMap) -> Result<f64, FormulaError> {
    let value = eval_node(expr, vars)?;
    if value.is_nan() {
        return Err(FormulaError::InvalidResult("NaN".to_string()));
    }
    if value.is_infinite() {
        return Err(FormulaError::InvalidResult("infinity".to_string()));
    }
    Ok(value)
}

fn eval_node(expr: &Expr, vars: &VariableMap) -> Result<f64, FormulaError> {
    match expr {
        Expr::Literal(value) => Ok(*value),
        Expr::Variable(name) => vars
            .get(name)
            .copied()
            .ok_or_else(|| FormulaError::UnknownVariable(name.clone())),
        Expr::Unary { op, operand } => {
            let value = eval_node(operand, vars)?;
            Ok(match op {
                UnaryOp::Neg => -value,
                UnaryOp::Pos => value,
            })
        }
        Expr::Binary { op, left, right } => {
            let l = eval_node(left, vars)?;
            let r = eval_node(right, vars)?;
            apply(*op, l, r)
        }
    }
}

fn apply(op: BinaryOp, l: f64, r: f64) -> Result<f64, FormulaError> {
    match op {
        BinaryOp::Add => Ok(l + r),
        BinaryOp::Sub => Ok(l - r),
        BinaryOp::Mul => Ok(l * r),
        BinaryOp::Div | BinaryOp::FloorDiv | BinaryOp::Mod if r == 0.0 => {
            Err(FormulaError::DivisionByZero)
        }
        BinaryOp::Div => Ok(l / r),
        BinaryOp::FloorDiv => Ok((l / r).floor()),
        BinaryOp::Mod => {
            // Result takes the sign of the divisor.
            let m = l % r;
            if m != 0.0 && (m < 0.0) != (r < 0.0) {
                Ok(m + r)
            } else {
                Ok(m)
            }
        }
        BinaryOp::Pow if l == 0.0 && r < 0.0 => Err(FormulaError::DivisionByZero),
        BinaryOp::Pow => Ok(l.powf(r)),
    }
}

/// Evaluates a free-text formula against raw data.
///
/// Keys are lowercased with spaces turned into `_`; null entries are dropped so
/// an unknown value surfaces as [`FormulaError::UnknownVariable`] instead of zero.
pub fn evaluate_formula(
    formula: &str,
    data: &BTreeMap<String, Option<f64>>,
    normalize: bool,
) -> Result<f64, FormulaError> {
    let vars: VariableMap = data
        .iter()
        .filter_map(|(key, value)| {
            let value = value.filter(|v| v.is_finite())?;
            Some((key.trim().to_lowercase().replace(' ', "_"), value))
        })
        .collect();

    let prepared = if normalize {
        substitute_formula_variables(formula, &vars)
    } else {
        formula.to_string()
    };
    debug!("Evaluating formula '{}' as '{}'", formula, prepared);

    let expr = parse_and_validate(&prepared)?;
    evaluate(&expr, &vars)
}

/// Values below `threshold` are taken to be fractions and scaled to percent.
///
/// This misreads legitimately small percentages (a 4% margin already entered as
/// `4.0` becomes `400.0`); callers that know their scale should skip it.
pub fn scale_percentage(value: f64, threshold: f64) -> f64 {
    if value < threshold {
        value * 100.0
    } else {
        value
    }
}

pub fn round_to(value: f64, places: u32) -> f64 {
    let factor = 10f64.powi(places as i32);
    (value * factor).round() / factor
}

/// Representative figures for trying out a formula before real data exists.
pub fn sample_variables() -> VariableMap {
    [
        ("total_assets", 1_000_000.0),
        ("total_liabilities", 400_000.0),
        ("total_equity", 600_000.0),
        ("current_assets", 500_000.0),
        ("current_liabilities", 200_000.0),
        ("revenue", 2_000_000.0),
        ("net_income", 150_000.0),
        ("cost_of_goods_sold", 1_200_000.0),
        ("inventories", 100_000.0),
        ("accounts_receivable", 150_000.0),
        ("fixed_assets", 500_000.0),
        ("ebit", 200_000.0),
        ("interest_expense", 20_000.0),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FormulaTest {
    pub formula: String,
    pub success: bool,
    pub result: Option<f64>,
    pub error: Option<String>,
}

/// Dry run of `formula` against `sample`, or [`sample_variables`] when absent.
pub fn test_formula(formula: &str, sample: Option<&VariableMap>) -> FormulaTest {
    let defaults;
    let vars = match sample {
        Some(vars) => vars,
        None => {
            defaults = sample_variables();
            &defaults
        }
    };
    let data: BTreeMap<String, Option<f64>> =
        vars.iter().map(|(k, v)| (k.clone(), Some(*v))).collect();

    match evaluate_formula(formula, &data, true) {
        Ok(value) => FormulaTest {
            formula: formula.to_string(),
            success: true,
            result: Some(value),
            error: None,
        },
        Err(e) => FormulaTest {
            formula: formula.to_string(),
            success: false,
            result: None,
            error: Some(e.to_string()),
        },
    }
}
