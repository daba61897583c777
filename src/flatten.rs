use std::collections::BTreeMap;

use crate::normalizer::slugify;
use crate::schema::{VariableMap, YearRecord};

/// Averaged balance-sheet keys and the point-in-time key each one is built from.
pub const AVERAGED_KEYS: [(&str, &str); 5] = [
    ("avg_total_assets", "total_assets"),
    ("avg_total_equity", "total_equity"),
    ("avg_fixed_assets", "fixed_assets"),
    ("avg_inventories", "inventories"),
    ("avg_accounts_receivable", "accounts_receivable"),
];

/// Canonical income-statement lines and the alternative labels accepted for them.
const INCOME_LINES: [(&str, &[&str]); 9] = [
    ("revenue", &["sales", "total_revenue", "net_sales"]),
    ("cost_of_goods_sold", &["cogs", "cost_of_sales"]),
    ("gross_profit", &[]),
    ("operating_expenses", &[]),
    ("operating_income", &["operating_profit"]),
    ("ebit", &[]),
    ("interest_expense", &["finance_costs"]),
    ("income_tax_expense", &["tax", "income_tax"]),
    ("net_income", &["net_profit", "profit_after_tax"]),
];

fn first_of(values: impl IntoIterator<Item = Option<f64>>) -> Option<f64> {
    values.into_iter().flatten().next()
}

/// Projects one year onto the fixed set of canonical formula variables.
///
/// Category totals are authoritative. Breakdown items only feed their own
/// keys (`cash`, `inventories`, ...) and never stand in for a missing total.
pub fn flatten(year: &YearRecord) -> VariableMap {
    let ca = &year.current_assets;
    let nca = &year.non_current_assets;
    let equity = &year.equity;

    let fixed: [(&str, Option<f64>); 13] = [
        ("current_assets", ca.total),
        ("inventories", first_of([ca.item("inventories"), ca.item("inventory")])),
        ("accounts_receivable", first_of([ca.item("accounts_receivable"), ca.item("trade_receivables")])),
        ("cash", first_of([ca.item("cash"), ca.item("cash_and_cash_equivalents")])),
        ("non_current_assets", nca.total),
        ("fixed_assets", first_of([nca.item("fixed_assets"), nca.item("property_plant_equipment")])),
        ("current_liabilities", year.current_liabilities.total),
        ("non_current_liabilities", year.non_current_liabilities.total),
        ("total_assets", year.totals.total_assets),
        ("total_liabilities", year.totals.total_liabilities),
        ("total_equity", first_of([equity.total, year.totals.total_equity])),
        ("share_capital", equity.item("share_capital")),
        ("retained_earnings", equity.item("retained_earnings")),
    ];

    let mut vars: VariableMap = fixed
        .into_iter()
        .filter_map(|(key, value)| value.map(|v| (key.to_string(), v)))
        .collect();

    for (key, alternatives) in INCOME_LINES {
        let value = first_of(
            std::iter::once(year.income(key)).chain(alternatives.iter().map(|alt| year.income(alt))),
        );
        if let Some(v) = value {
            vars.insert(key.to_string(), v);
        }
    }

    for (label, value) in &year.income_statement {
        if let Some(v) = value {
            vars.entry(slugify(label)).or_insert(*v);
        }
    }

    vars
}

/// Mean of both years when both are known, otherwise the current value alone.
pub fn calculate_average(current: Option<f64>, previous: Option<f64>) -> Option<f64> {
    match (current, previous) {
        (Some(c), Some(p)) => Some((c + p) / 2.0),
        (current, _) => current,
    }
}

/// The `avg_*` balance-sheet values. A previous-only value is never used.
pub fn average(current: &YearRecord, previous: Option<&YearRecord>) -> BTreeMap<String, Option<f64>> {
    let cur = flatten(current);
    let prev = previous.map(flatten).unwrap_or_default();

    AVERAGED_KEYS
        .iter()
        .map(|(avg_key, key)| {
            let value = calculate_average(cur.get(*key).copied(), prev.get(*key).copied());
            (avg_key.to_string(), value)
        })
        .collect()
}

/// Flattened current year plus the averaged keys, as seen by custom formulas.
pub fn formula_variables(current: &YearRecord, previous: Option<&YearRecord>) -> VariableMap {
    let mut vars = flatten(current);
    for (key, value) in average(current, previous) {
        if let Some(v) = value {
            vars.insert(key, v);
        }
    }
    vars
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::CategoryData;

    fn year(total_assets: f64, inventories: Option<f64>) -> YearRecord {
        let mut y = YearRecord::with_year("2023");
        y.totals.total_assets = Some(total_assets);
        y.current_assets = CategoryData {
            total: Some(500.0),
            breakdown: [("inventories".to_string(), inventories), ("cash".to_string(), Some(50.0))].into(),
        };
        y.equity.total = Some(300.0);
        y.income_statement.insert("revenue".to_string(), Some(1000.0));
        y.income_statement.insert("Other Income".to_string(), Some(12.0));
        y.income_statement.insert("tax".to_string(), Some(30.0));
        y
    }

    #[test]
    fn test_flatten_fixed_keys() {
        let vars = flatten(&year(1000.0, Some(80.0)));
        assert_eq!(vars["current_assets"], 500.0);
        assert_eq!(vars["inventories"], 80.0);
        assert_eq!(vars["cash"], 50.0);
        assert_eq!(vars["total_assets"], 1000.0);
        assert_eq!(vars["total_equity"], 300.0);
        assert_eq!(vars["revenue"], 1000.0);
        assert_eq!(vars["income_tax_expense"], 30.0);
        assert_eq!(vars["other_income"], 12.0);
        assert!(!vars.contains_key("current_liabilities"));
    }

    #[test]
    fn test_breakdown_never_replaces_total() {
        let mut y = YearRecord::default();
        y.current_liabilities.breakdown.insert("trade_payables".to_string(), Some(40.0));
        let vars = flatten(&y);
        assert!(!vars.contains_key("current_liabilities"));
        assert!(!vars.contains_key("trade_payables"));
    }

    #[test]
    fn test_equity_falls_back_to_totals() {
        let mut y = YearRecord::default();
        y.totals.total_equity = Some(75.0);
        assert_eq!(flatten(&y)["total_equity"], 75.0);
    }

    #[test]
    fn test_calculate_average() {
        assert_eq!(calculate_average(Some(10.0), Some(20.0)), Some(15.0));
        assert_eq!(calculate_average(Some(10.0), None), Some(10.0));
        assert_eq!(calculate_average(None, Some(20.0)), None);
    }

    #[test]
    fn test_average_keys() {
        let current = year(1000.0, Some(80.0));
        let previous = year(800.0, None);
        let avg = average(&current, Some(&previous));

        assert_eq!(avg["avg_total_assets"], Some(900.0));
        assert_eq!(avg["avg_total_equity"], Some(300.0));
        assert_eq!(avg["avg_inventories"], Some(80.0));
        assert_eq!(avg["avg_fixed_assets"], None);
        assert_eq!(avg.len(), 5);
    }

    #[test]
    fn test_formula_variables_include_averages() {
        let vars = formula_variables(&year(1000.0, None), None);
        assert_eq!(vars["avg_total_assets"], 1000.0);
        assert!(!vars.contains_key("avg_inventories"));
    }
}
