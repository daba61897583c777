//! Maps free-form financial variable names onto canonical snake_case identifiers.
//!
//! Resolution order for a single name:
//! 1. exact lookup in [`VARIABLE_ALIASES`] (canonical identifiers resolve to themselves)
//! 2. substring overlap with an alias key, longest key first, ties to the first declared
//! 3. a mechanical slug of the input

use log::debug;
use regex::{NoExpand, Regex};
use serde::Serialize;
use std::cmp::Reverse;
use std::collections::BTreeSet;

use crate::formula::parse_and_validate;
use crate::schema::VariableMap;

/// Alias table, in declaration order. Keys are lowercase and space separated.
pub static VARIABLE_ALIASES: &[(&str, &str)] = &[
    // Balance sheet aggregates
    ("total assets", "total_assets"),
    ("totalassets", "total_assets"),
    ("assets", "total_assets"),
    ("total liabilities", "total_liabilities"),
    ("totalliabilities", "total_liabilities"),
    ("liabilities", "total_liabilities"),
    ("total debt", "total_liabilities"),
    ("total equity", "total_equity"),
    ("totalequity", "total_equity"),
    ("equity", "total_equity"),
    ("shareholders equity", "total_equity"),
    ("shareholders' equity", "total_equity"),
    ("stockholders equity", "total_equity"),
    ("stockholders' equity", "total_equity"),
    ("net worth", "total_equity"),
    // Current / non-current groups
    ("current assets", "current_assets"),
    ("currentassets", "current_assets"),
    ("total current assets", "current_assets"),
    ("current liabilities", "current_liabilities"),
    ("currentliabilities", "current_liabilities"),
    ("total current liabilities", "current_liabilities"),
    ("non-current assets", "non_current_assets"),
    ("non current assets", "non_current_assets"),
    ("noncurrent assets", "non_current_assets"),
    ("long term assets", "non_current_assets"),
    ("non-current liabilities", "non_current_liabilities"),
    ("non current liabilities", "non_current_liabilities"),
    ("noncurrent liabilities", "non_current_liabilities"),
    ("long term liabilities", "non_current_liabilities"),
    // Balance sheet detail
    ("cash", "cash"),
    ("cash and cash equivalents", "cash"),
    ("cash and equivalents", "cash"),
    ("inventory", "inventories"),
    ("inventories", "inventories"),
    ("stock", "inventories"),
    ("accounts receivable", "accounts_receivable"),
    ("receivables", "accounts_receivable"),
    ("trade receivables", "accounts_receivable"),
    ("debtors", "accounts_receivable"),
    ("trade debtors", "accounts_receivable"),
    ("fixed assets", "fixed_assets"),
    ("property plant and equipment", "fixed_assets"),
    ("property, plant and equipment", "fixed_assets"),
    ("ppe", "fixed_assets"),
    ("share capital", "share_capital"),
    ("common stock", "share_capital"),
    ("retained earnings", "retained_earnings"),
    // Income statement
    ("revenue", "revenue"),
    ("revenues", "revenue"),
    ("sales", "revenue"),
    ("total revenue", "revenue"),
    ("net sales", "revenue"),
    ("turnover", "revenue"),
    ("cost of goods sold", "cost_of_goods_sold"),
    ("cost of sales", "cost_of_goods_sold"),
    ("cogs", "cost_of_goods_sold"),
    ("gross profit", "gross_profit"),
    ("operating expenses", "operating_expenses"),
    ("opex", "operating_expenses"),
    ("operating income", "operating_income"),
    ("operating profit", "operating_income"),
    ("ebit", "ebit"),
    ("earnings before interest and taxes", "ebit"),
    ("interest expense", "interest_expense"),
    ("interest", "interest_expense"),
    ("finance costs", "interest_expense"),
    ("income tax expense", "income_tax_expense"),
    ("income tax", "income_tax_expense"),
    ("tax expense", "income_tax_expense"),
    ("net income", "net_income"),
    ("net profit", "net_income"),
    ("profit", "net_income"),
    ("net earnings", "net_income"),
    ("profit after tax", "net_income"),
    // Averaged balances
    ("average total assets", "avg_total_assets"),
    ("average assets", "avg_total_assets"),
    ("average total equity", "avg_total_equity"),
    ("average equity", "avg_total_equity"),
    ("average fixed assets", "avg_fixed_assets"),
    ("average inventory", "avg_inventories"),
    ("average inventories", "avg_inventories"),
    ("average accounts receivable", "avg_accounts_receivable"),
    ("average receivables", "avg_accounts_receivable"),
];

/// Mechanical identifier: lowercase, spaces and hyphens to `_`, apostrophes dropped.
pub fn slugify(name: &str) -> String {
    name.trim()
        .to_lowercase()
        .chars()
        .filter(|c| !matches!(c, '\'' | '\u{2019}'))
        .map(|c| if c.is_whitespace() || c == '-' { '_' } else { c })
        .collect()
}

fn is_canonical(name: &str) -> bool {
    VARIABLE_ALIASES.iter().any(|(_, canonical)| *canonical == name)
}

fn exact_alias(key: &str) -> Option<&'static str> {
    VARIABLE_ALIASES
        .iter()
        .find(|(alias, _)| *alias == key)
        .map(|(_, canonical)| *canonical)
}

/// Longest alias key overlapping `key`; ties go to the first declared entry.
fn partial_alias(key: &str) -> Option<&'static str> {
    VARIABLE_ALIASES
        .iter()
        .filter(|(alias, _)| alias.contains(key) || key.contains(alias))
        .min_by_key(|(alias, _)| Reverse(alias.len()))
        .map(|(_, canonical)| *canonical)
}

/// Resolves a human-readable variable name to its canonical identifier. Never fails.
pub fn normalize_variable_name(name: &str) -> String {
    let key = name.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase();
    if key.is_empty() {
        return String::new();
    }
    if is_canonical(&key) {
        return key;
    }

    // Lookups run on the slug's spoken form, so a name and its own slug
    // always take the same path and the result is a fixed point.
    let slug = slugify(&key);
    if is_canonical(&slug) {
        return slug;
    }
    let spoken = slug.replace('_', " ");
    if let Some(canonical) = exact_alias(&key).or_else(|| exact_alias(&spoken)) {
        return canonical.to_string();
    }
    if let Some(canonical) = partial_alias(&spoken) {
        debug!("Variable '{}' resolved by partial match to '{}'", name, canonical);
        return canonical.to_string();
    }
    slug
}

fn candidate_names(available: &VariableMap) -> Vec<String> {
    let mut names: BTreeSet<String> = BTreeSet::new();
    for key in available.keys() {
        names.insert(key.to_lowercase());
        names.insert(key.to_lowercase().replace('_', " "));
        if key.contains("non_") {
            names.insert(key.to_lowercase().replace("non_", "non-").replace('_', " "));
        }
    }
    names.extend(VARIABLE_ALIASES.iter().map(|(alias, _)| alias.to_string()));

    let mut names: Vec<String> = names.into_iter().filter(|n| !n.is_empty()).collect();
    names.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
    names
}

fn resolve_candidate(candidate: &str, available: &VariableMap) -> String {
    let slug = slugify(candidate);
    if available.contains_key(&slug) {
        return slug;
    }
    match exact_alias(candidate) {
        Some(canonical) => canonical.to_string(),
        None => slug,
    }
}

/// Rewrites human-readable names in `formula` into canonical identifiers.
///
/// Candidates are tried longest first so that "Current Assets" is consumed
/// before "Assets" can match. Matching is case-insensitive and only on word
/// boundaries; text that is already an identifier is left alone.
pub fn substitute_formula_variables(formula: &str, available: &VariableMap) -> String {
    let mut result = formula.to_string();

    for candidate in candidate_names(available) {
        if !result.to_lowercase().contains(&candidate) {
            continue;
        }
        let pattern = format!(r"(?i)\b{}\b", regex::escape(&candidate));
        let Ok(re) = Regex::new(&pattern) else {
            continue;
        };
        let target = resolve_candidate(&candidate, available);
        let replaced = re.replace_all(&result, NoExpand(&target)).into_owned();
        if replaced != result {
            debug!("Substituted '{}' -> '{}'", candidate, target);
            result = replaced;
        }
    }

    result
}

/// Splits a formula into the human-readable names it mentions, in order of
/// first appearance. Numeric literals are skipped.
pub fn extract_variables_from_formula(formula: &str) -> Vec<String> {
    let chars: Vec<char> = formula.chars().collect();
    let mut phrases: Vec<String> = Vec::new();
    let mut current = String::new();

    for (i, &c) in chars.iter().enumerate() {
        let joins_words = c == '-'
            && i > 0
            && chars[i - 1].is_alphabetic()
            && chars.get(i + 1).is_some_and(|n| n.is_alphabetic());
        let separator = !joins_words && matches!(c, '+' | '-' | '*' | '/' | '%' | '(' | ')' | '×' | '÷' | ',');
        if separator {
            phrases.push(std::mem::take(&mut current));
        } else {
            current.push(c);
        }
    }
    phrases.push(current);

    let mut seen = BTreeSet::new();
    phrases
        .into_iter()
        .map(|p| p.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|p| !p.is_empty() && p.parse::<f64>().is_err())
        .filter(|p| seen.insert(p.to_lowercase()))
        .collect()
}

/// Which identifiers a formula needs and whether `available` supplies them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VariableCheck {
    pub formula_variables: Vec<String>,
    pub available: Vec<String>,
    pub missing: Vec<String>,
    pub all_found: bool,
}

pub fn check_formula_variables(formula: &str, available: &VariableMap) -> VariableCheck {
    let substituted = substitute_formula_variables(formula, available);
    let formula_variables = match parse_and_validate(&substituted) {
        Ok(expr) => expr.variables(),
        Err(_) => {
            let mut names: Vec<String> = Vec::new();
            for phrase in extract_variables_from_formula(formula) {
                let name = normalize_variable_name(&phrase);
                if !names.contains(&name) {
                    names.push(name);
                }
            }
            names
        }
    };

    let (present, missing): (Vec<String>, Vec<String>) = formula_variables
        .iter()
        .cloned()
        .partition(|name| available.contains_key(name));

    VariableCheck {
        all_found: missing.is_empty(),
        formula_variables,
        available: present,
        missing,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FormulaDependencies {
    pub variables: Vec<String>,
    pub normalized_variables: Vec<String>,
    pub unique_variables: Vec<String>,
    pub syntax_valid: bool,
    pub syntax_error: Option<String>,
    pub formula_cleaned: String,
}

/// Dependency report for formula authoring tools.
pub fn formula_dependencies(formula: &str) -> FormulaDependencies {
    let variables = extract_variables_from_formula(formula);
    let normalized_variables: Vec<String> =
        variables.iter().map(|v| normalize_variable_name(v)).collect();

    let mut unique_variables: Vec<String> = Vec::new();
    for name in &normalized_variables {
        if !unique_variables.contains(name) {
            unique_variables.push(name.clone());
        }
    }

    let formula_cleaned = substitute_formula_variables(formula, &VariableMap::new());
    let syntax_error = parse_and_validate(&formula_cleaned)
        .err()
        .map(|e| e.to_string());

    FormulaDependencies {
        variables,
        normalized_variables,
        unique_variables,
        syntax_valid: syntax_error.is_none(),
        syntax_error,
        formula_cleaned,
    }
}
