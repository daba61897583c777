use serde::Serialize;
use std::collections::BTreeMap;

use crate::schema::{IdealRange, RatioDefinition, RatioUnit};

/// A fixed ratio definition. The table below is the only source of base ratios.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BaseRatio {
    pub key: &'static str,
    pub name: &'static str,
    pub category: &'static str,
    pub formula: &'static str,
    pub interpretation: &'static str,
    pub unit: RatioUnit,
    pub ideal_range: IdealRange,
    pub higher_is_better: bool,
}

impl BaseRatio {
    pub fn to_definition(&self) -> RatioDefinition {
        RatioDefinition {
            key: Some(self.key.to_string()),
            name: self.name.to_string(),
            category: self.category.to_string(),
            formula: self.formula.to_string(),
            interpretation: self.interpretation.to_string(),
            unit: self.unit.as_str().to_string(),
            ideal_range: Some(self.ideal_range),
            higher_is_better: self.higher_is_better,
            is_base: true,
        }
    }
}

const fn range(min: f64, max: f64, optimal: f64) -> IdealRange {
    IdealRange { min, max, optimal }
}

pub static BASE_RATIOS: [BaseRatio; 13] = [
    BaseRatio {
        key: "current_ratio",
        name: "Current Ratio",
        category: "liquidity",
        formula: "Current Assets / Current Liabilities",
        interpretation: "Measures ability to pay short-term obligations",
        unit: RatioUnit::Ratio,
        ideal_range: range(1.5, 3.0, 2.0),
        higher_is_better: true,
    },
    BaseRatio {
        key: "quick_ratio",
        name: "Quick Ratio (Acid Test)",
        category: "liquidity",
        formula: "(Current Assets - Inventory) / Current Liabilities",
        interpretation: "Measures ability to pay short-term obligations without selling inventory",
        unit: RatioUnit::Ratio,
        ideal_range: range(1.0, 2.0, 1.5),
        higher_is_better: true,
    },
    BaseRatio {
        key: "gross_profit_margin",
        name: "Gross Profit Margin",
        category: "profitability",
        formula: "(Gross Profit / Revenue) × 100",
        interpretation: "Percentage of revenue remaining after deducting cost of goods sold",
        unit: RatioUnit::Percent,
        ideal_range: range(20.0, 50.0, 30.0),
        higher_is_better: true,
    },
    BaseRatio {
        key: "net_profit_margin",
        name: "Net Profit Margin",
        category: "profitability",
        formula: "(Net Income / Revenue) × 100",
        interpretation: "Percentage of revenue that translates to profit",
        unit: RatioUnit::Percent,
        ideal_range: range(5.0, 20.0, 10.0),
        higher_is_better: true,
    },
    BaseRatio {
        key: "return_on_equity",
        name: "Return on Equity (ROE)",
        category: "profitability",
        formula: "(Net Income / Average Total Equity) × 100",
        interpretation: "How efficiently the company generates profit from shareholders' equity",
        unit: RatioUnit::Percent,
        ideal_range: range(10.0, 25.0, 15.0),
        higher_is_better: true,
    },
    BaseRatio {
        key: "return_on_assets",
        name: "Return on Assets (ROA)",
        category: "profitability",
        formula: "(Net Income / Average Total Assets) × 100",
        interpretation: "How efficiently the company uses its assets to generate profit",
        unit: RatioUnit::Percent,
        ideal_range: range(5.0, 20.0, 10.0),
        higher_is_better: true,
    },
    BaseRatio {
        key: "debt_to_equity",
        name: "Debt to Equity Ratio",
        category: "solvency",
        formula: "Total Liabilities / Total Equity",
        interpretation: "Indicates the relative proportion of debt and equity used to finance assets",
        unit: RatioUnit::Ratio,
        ideal_range: range(0.0, 1.5, 0.5),
        higher_is_better: false,
    },
    BaseRatio {
        key: "debt_ratio",
        name: "Debt Ratio",
        category: "solvency",
        formula: "(Total Liabilities / Total Assets) × 100",
        interpretation: "Percentage of assets financed by debt",
        unit: RatioUnit::Percent,
        ideal_range: range(0.0, 60.0, 40.0),
        higher_is_better: false,
    },
    BaseRatio {
        key: "interest_coverage",
        name: "Interest Coverage Ratio",
        category: "solvency",
        formula: "(EBIT + Income Tax Expense) / Interest Expense",
        interpretation: "Ability to pay interest on outstanding debt",
        unit: RatioUnit::Times,
        ideal_range: range(2.5, 10.0, 5.0),
        higher_is_better: true,
    },
    BaseRatio {
        key: "asset_turnover",
        name: "Asset Turnover Ratio",
        category: "efficiency",
        formula: "Revenue / Average Total Assets",
        interpretation: "How efficiently assets are used to generate revenue",
        unit: RatioUnit::Times,
        ideal_range: range(0.5, 2.0, 1.0),
        higher_is_better: true,
    },
    BaseRatio {
        key: "fixed_asset_turnover",
        name: "Fixed Asset Turnover",
        category: "efficiency",
        formula: "Revenue / Average Fixed Assets",
        interpretation: "How efficiently fixed assets generate revenue",
        unit: RatioUnit::Times,
        ideal_range: range(1.0, 5.0, 2.0),
        higher_is_better: true,
    },
    BaseRatio {
        key: "inventory_turnover",
        name: "Inventory Turnover Ratio",
        category: "efficiency",
        formula: "Revenue / Average Inventory",
        interpretation: "How many times inventory is sold and replaced in a period",
        unit: RatioUnit::Times,
        ideal_range: range(4.0, 12.0, 6.0),
        higher_is_better: true,
    },
    BaseRatio {
        key: "debtors_turnover",
        name: "Debtors Turnover Ratio",
        category: "efficiency",
        formula: "Revenue / Average Accounts Receivable",
        interpretation: "How quickly the company collects payments from customers",
        unit: RatioUnit::Times,
        ideal_range: range(6.0, 12.0, 8.0),
        higher_is_better: true,
    },
];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryInfo {
    pub name: String,
    pub description: String,
    pub is_base: bool,
}

pub static BASE_CATEGORIES: [(&str, &str, &str); 4] = [
    (
        "liquidity",
        "Liquidity Ratios",
        "Measure the company's ability to pay short-term obligations",
    ),
    (
        "profitability",
        "Profitability Ratios",
        "Measure the company's ability to generate profit",
    ),
    (
        "solvency",
        "Solvency Ratios",
        "Measure the company's ability to meet long-term obligations",
    ),
    (
        "efficiency",
        "Efficiency Ratios",
        "Measure how efficiently the company uses its assets",
    ),
];

pub fn base_ratio(key: &str) -> Option<&'static BaseRatio> {
    BASE_RATIOS.iter().find(|r| r.key == key)
}

pub fn is_base_ratio(key: &str) -> bool {
    base_ratio(key).is_some()
}

/// Base definitions overlaid with custom ones (developer mode only).
/// A custom definition whose key matches a base ratio replaces it in the
/// returned map; the static table is untouched.
pub fn merged_ratios_config(
    custom: &[RatioDefinition],
    dev_mode: bool,
) -> BTreeMap<String, RatioDefinition> {
    let mut config: BTreeMap<String, RatioDefinition> = BASE_RATIOS
        .iter()
        .map(|r| (r.key.to_string(), r.to_definition()))
        .collect();

    if dev_mode {
        for definition in custom {
            let key = definition.ratio_key();
            let mut overlay = definition.clone();
            overlay.key = Some(key.clone());
            overlay.category = definition.category_key();
            overlay.is_base = false;
            config.insert(key, overlay);
        }
    }
    config
}

fn title_case(word: &str) -> String {
    word.split(['_', ' '])
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn merged_categories(
    custom: &[RatioDefinition],
    dev_mode: bool,
) -> BTreeMap<String, CategoryInfo> {
    let mut categories: BTreeMap<String, CategoryInfo> = BASE_CATEGORIES
        .iter()
        .map(|(key, name, description)| {
            (
                key.to_string(),
                CategoryInfo {
                    name: name.to_string(),
                    description: description.to_string(),
                    is_base: true,
                },
            )
        })
        .collect();

    if dev_mode {
        for definition in custom {
            let key = definition.category_key();
            categories.entry(key.clone()).or_insert_with(|| CategoryInfo {
                name: title_case(&key),
                description: format!("Custom {} ratios", key.replace('_', " ")),
                is_base: false,
            });
        }
    }
    categories
}
