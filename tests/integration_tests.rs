use financial_ratio_engine::*;
use pretty_assertions::assert_eq;
use std::collections::BTreeMap;

const PAGE_ONE: &str = r#"```json
{
    "current_year": {
        "year": "2023",
        "current_assets": {"total": 500000, "breakdown": {"cash": 120000, "inventories": 100000}},
        "non_current_assets": {"total": 500000, "breakdown": {"fixed_assets": 400000}},
        "current_liabilities": {"total": 200000},
        "equity": {"total": 600000},
        "totals": {"total_assets": 1000000}
    },
    "previous_year": {
        "year": "2022",
        "current_assets": {"total": 450000},
        "equity": {"total": 500000},
        "totals": {"total_assets": 900000}
    },
    "confidence": 0.8
}
```"#;

const PAGE_TWO: &str = r#"{
    "current_year": {
        "year": "2023",
        "non_current_liabilities": {"total": 200000},
        "income_statement": {
            "revenue": "2,000,000",
            "cost_of_goods_sold": 1200000,
            "ebit": 150000,
            "interest_expense": 20000,
            "income_tax_expense": 80000,
            "net_income": 110000
        },
        "totals": {"total_liabilities": 400000}
    },
    "confidence": 0.7
}"#;

fn amounts(pairs: &[(&str, f64)]) -> BTreeMap<String, Option<f64>> {
    pairs.iter().map(|(k, v)| (k.to_string(), Some(*v))).collect()
}

fn value(report: &RatioReport, category: &str, key: &str) -> Option<f64> {
    report[category][key].value.as_f64()
}

#[test]
fn test_extraction_to_report_pipeline() -> anyhow::Result<()> {
    let analyzer = FinancialAnalyzer::default();
    let report = analyzer.analyze_responses(&[PAGE_ONE, PAGE_TWO], None)?;

    assert!((report.confidence - 0.75).abs() < 1e-9);
    assert!(report.warnings.contains(&"Merged data from 2 image(s)".to_string()));
    assert!(report.warnings.iter().any(|w| w.starts_with("Average OCR confidence")));

    let current = &report.record.current_year;
    assert_eq!(current.current_assets.total, Some(500_000.0));
    assert_eq!(current.non_current_liabilities.total, Some(200_000.0));
    assert_eq!(current.income("revenue"), Some(2_000_000.0));

    let ratios = &report.ratios;
    assert_eq!(value(ratios, "liquidity", "current_ratio"), Some(2.5));
    assert_eq!(value(ratios, "liquidity", "quick_ratio"), Some(2.0));
    assert_eq!(value(ratios, "profitability", "gross_profit_margin"), Some(40.0));
    assert_eq!(value(ratios, "solvency", "debt_to_equity"), Some(0.67));
    assert_eq!(value(ratios, "solvency", "interest_coverage"), Some(11.5));
    // Averaged equity: (600000 + 500000) / 2
    assert_eq!(value(ratios, "profitability", "return_on_equity"), Some(20.0));

    let json = serde_json::to_value(&report)?;
    assert_eq!(json["ratios"]["liquidity"]["current_ratio"]["data_quality"], "complete");
    Ok(())
}

#[test]
fn test_evaluate_formula_is_arithmetic() -> anyhow::Result<()> {
    let data = amounts(&[("current_assets", 500_000.0), ("current_liabilities", 200_000.0)]);
    assert_eq!(evaluate_formula("Current Assets / Current Liabilities", &data, true)?, 2.5);

    let vars = amounts(&[("a", 7.0), ("b", 2.0)]);
    assert_eq!(evaluate_formula("a // b", &vars, false)?, 3.0);
    assert_eq!(evaluate_formula("a % b", &vars, false)?, 1.0);
    assert_eq!(evaluate_formula("b ** 3 - -a", &vars, false)?, 15.0);
    assert_eq!(evaluate_formula("(a + b) * 2 / 3", &vars, false)?, 6.0);
    Ok(())
}

#[test]
fn test_unsafe_constructs_are_rejected() {
    for formula in [
        "max(A, B)",
        "__import__('os')",
        "import os",
        "a.b",
        "a[0]",
        "lambda: 1",
    ] {
        assert!(
            matches!(parse_and_validate(formula), Err(FormulaError::UnsafeConstruct(_))),
            "{} should be rejected",
            formula
        );
    }
}

#[test]
fn test_division_by_zero_never_leaks_infinity() {
    let data = amounts(&[("revenue", 100.0), ("zero", 0.0)]);
    for formula in ["revenue / zero", "revenue // zero", "revenue % zero", "revenue / (zero * 5)"] {
        assert_eq!(
            evaluate_formula(formula, &data, false),
            Err(FormulaError::DivisionByZero),
            "{}",
            formula
        );
    }
}

#[test]
fn test_normalization_is_case_insensitive_and_idempotent() {
    let expected = "total_assets";
    for input in ["Total Assets", "total assets", "TOTAL ASSETS", "total_assets"] {
        let once = normalize_variable_name(input);
        assert_eq!(once, expected);
        assert_eq!(normalize_variable_name(&once), once);
    }
}

#[test]
fn test_normalization_is_a_fixed_point_for_varied_names() {
    let mut inputs: Vec<String> = [
        "tax-expense",
        "Finance-Costs",
        "Non-Current Assets",
        "non-current-liabilities",
        "Shareholders' Equity",
        "shareholders\u{2019} equity",
        "Owner's Draw",
        "  Net   Income ",
        "Cost-of-Goods-Sold",
        "EBITDA",
        "Average Inventory",
        "avg_total_assets",
        "retained_earnings",
        "Some Unknown-Line Item",
        "R&D Spend",
        "",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    inputs.extend(normalizer::VARIABLE_ALIASES.iter().map(|(alias, _)| alias.to_string()));
    inputs.extend(catalog::all_variables().map(|v| v.label.to_string()));

    for input in &inputs {
        let once = normalize_variable_name(input);
        assert_eq!(normalize_variable_name(&once), once, "input {:?}", input);
        assert_eq!(normalize_variable_name(&input.to_uppercase()), once, "input {:?}", input);
        assert_eq!(normalize_variable_name(&input.to_lowercase()), once, "input {:?}", input);
    }
}

#[test]
fn test_evaluator_matches_native_arithmetic() -> anyhow::Result<()> {
    let cases: [(&str, fn(f64, f64) -> f64); 7] = [
        ("a + b", |a, b| a + b),
        ("a - b * 2", |a, b| a - b * 2.0),
        ("(a - b) / b", |a, b| (a - b) / b),
        ("a ** 2 + b", |a, b| a.powi(2) + b),
        ("-a / (b + 1)", |a, b| -a / (b + 1.0)),
        ("a // b", |a, b| (a / b).floor()),
        ("a % b", |a, b| a - b * (a / b).floor()),
    ];
    let values = [1.0, 2.5, 7.0, 120_000.0, -3.0, 0.125];

    for (formula, native) in cases {
        for a in values {
            for b in values {
                let data = amounts(&[("a", a), ("b", b)]);
                let got = evaluate_formula(formula, &data, false)?;
                let want = native(a, b);
                assert!(
                    (got - want).abs() <= 1e-9 * want.abs().max(1.0),
                    "{} with a={}, b={}: {} != {}",
                    formula,
                    a,
                    b,
                    got,
                    want
                );
            }
        }
    }
    Ok(())
}

#[test]
fn test_oversized_formulas_fail_cleanly() {
    let data = amounts(&[("revenue", 1.0)]);
    for terms in [5_000, 20_000] {
        let chain = vec!["revenue"; terms].join(" + ");
        assert!(
            matches!(evaluate_formula(&chain, &data, false), Err(FormulaError::Syntax(_))),
            "{} terms",
            terms
        );
    }
    let nested = format!("{}revenue{}", "(".repeat(5_000), ")".repeat(5_000));
    assert!(evaluate_formula(&nested, &data, false).is_err());

    let mut year = YearRecord::with_year("2023");
    year.income_statement.insert("revenue".to_string(), Some(1.0));
    let custom = vec![RatioDefinition::new(
        "Huge",
        "custom",
        &vec!["Revenue"; 5_000].join(" + "),
        RatioUnit::Number,
    )];
    let report = compute_all_ratios(&FinancialRecord::new(year, None), Some(custom.as_slice()), true);
    assert_eq!(report["custom"]["huge"].data_quality, DataQuality::Error);
}

#[test]
fn test_single_source_merge_only_fills_all_years() {
    let mut year = YearRecord::with_year("2023");
    year.equity.total = Some(10.0);
    let record = FinancialRecord::new(year.clone(), None);

    let (merged, confidence) = merge_sources(&[(record.clone(), 0.9)]);
    assert_eq!(confidence, 0.9);
    assert_eq!(merged.current_year, record.current_year);
    assert_eq!(merged.previous_year, None);
    assert_eq!(merged.all_years, vec![year]);
}

#[test]
fn test_two_source_merge_takes_union_and_max() {
    let mut a = YearRecord::with_year("2023");
    a.current_assets.total = Some(100.0);
    a.equity.total = Some(50.0);
    let mut b = YearRecord::with_year("2023");
    b.current_liabilities.total = Some(40.0);
    b.equity.total = Some(70.0);

    let (merged, confidence) = merge_sources(&[
        (FinancialRecord::new(a, None), 0.8),
        (FinancialRecord::new(b, None), 0.7),
    ]);
    assert!((confidence - 0.75).abs() < 1e-9);
    assert_eq!(merged.current_year.current_assets.total, Some(100.0));
    assert_eq!(merged.current_year.current_liabilities.total, Some(40.0));
    assert_eq!(merged.current_year.equity.total, Some(70.0));
}

#[test]
fn test_missing_inputs_keep_ratio_entries() {
    let mut year = YearRecord::with_year("2023");
    year.current_assets.total = Some(500_000.0);
    let report = compute_all_ratios(&FinancialRecord::new(year, None), None, false);

    let current = &report["liquidity"]["current_ratio"];
    assert_eq!(current.value, RatioValue::NotAvailable);
    assert_eq!(current.data_quality, DataQuality::Incomplete);
    assert!(current.missing_fields.contains(&"Current Liabilities".to_string()));
    assert_eq!(report.values().map(BTreeMap::len).sum::<usize>(), 13);

    let json = serde_json::to_value(current).unwrap();
    assert_eq!(json["value"], "N/A");
}

#[test]
fn test_literal_zero_divisor_rejected_before_evaluation() {
    let definition = RatioDefinition::new("Broken", "custom", "Revenue / 0", RatioUnit::Ratio);
    assert_eq!(validate_custom_ratio(&definition), Err(ValidationError::LiteralDivByZero));

    let mut year = YearRecord::with_year("2023");
    year.income_statement.insert("revenue".to_string(), Some(100.0));
    let custom = vec![definition];
    let report = compute_all_ratios(&FinancialRecord::new(year, None), Some(custom.as_slice()), true);
    let broken = &report["custom"]["broken"];
    assert_eq!(broken.data_quality, DataQuality::Error);
    assert_eq!(broken.error.as_deref(), Some("Division by zero detected"));
}

#[test]
fn test_quick_ratio_estimates_missing_inventory() {
    let mut year = YearRecord::with_year("2023");
    year.current_assets.total = Some(300.0);
    year.current_liabilities.total = Some(100.0);
    let report = compute_all_ratios(&FinancialRecord::new(year, None), None, false);

    let quick = &report["liquidity"]["quick_ratio"];
    assert_eq!(quick.value, RatioValue::Value(3.0));
    assert_eq!(quick.data_quality, DataQuality::Estimated);
    assert!(quick.note.as_deref().unwrap_or_default().contains("Inventory assumed to be 0"));
}

#[test]
fn test_custom_ratio_lifecycle_with_file_storage() -> anyhow::Result<()> {
    let dir = std::env::temp_dir().join(format!("ratio-engine-it-{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    let settings = EngineSettings {
        dev_mode: true,
        storage_dir: dir.clone(),
        ..EngineSettings::default()
    };
    let repository = CustomRatioRepository::from_settings(&settings);

    repository.add(
        "analyst",
        &RatioDefinition::new("Cash Ratio", "Liquidity", "Cash / Current Liabilities", RatioUnit::Ratio),
    )?;
    repository.add(
        "analyst",
        &RatioDefinition::new("Net Margin Pct", "Returns", "Net Income / Revenue", RatioUnit::Percent),
    )?;
    let stored = repository.list("analyst")?;
    assert_eq!(stored.len(), 2);

    assert!(dir.join("analyst_ratios.json").exists());

    let analyzer = FinancialAnalyzer::new(settings);
    let sources = vec![parse_extraction(PAGE_ONE)?.into_source(), parse_extraction(PAGE_TWO)?.into_source()];
    let report = analyzer.analyze(&sources, Some(stored.as_slice()));

    assert_eq!(value(&report.ratios, "liquidity", "cash_ratio"), Some(0.6));
    // 0.055 is below the fraction threshold, so it is reported as 5.5%.
    assert_eq!(value(&report.ratios, "returns", "net_margin_pct"), Some(5.5));
    assert!(report.ratios["returns"]["net_margin_pct"].is_custom);

    let exported = repository.export_json("analyst")?;
    repository.clear("analyst")?;
    assert!(repository.list("analyst")?.is_empty());
    assert_eq!(repository.import_json("analyst", &exported, true)?, 2);

    std::fs::remove_dir_all(&dir)?;
    Ok(())
}

#[test]
fn test_merged_configuration_and_catalog() {
    let custom = vec![RatioDefinition::new("Cash Share", "Custom", "Cash / Total Assets", RatioUnit::Ratio)];

    let production = merged_ratios_config(&custom, false);
    assert_eq!(production.len(), 13);
    assert!(!production.contains_key("cash_share"));

    let dev = merged_ratios_config(&custom, true);
    assert_eq!(dev.len(), 14);
    assert!(dev.contains_key("cash_share"));
    assert!(merged_categories(&custom, true).contains_key("custom"));
    assert!(!merged_categories(&custom, false).contains_key("custom"));

    let catalog = variable_catalog();
    assert_eq!(catalog.total_count, 27);
    for info in catalog.balance_sheet.assets {
        assert_eq!(normalize_variable_name(info.label), info.name);
    }

    let check = check_formula_variables("Gross Profit / Revenue", &sample_variables());
    assert!(!check.all_found);
    assert_eq!(check.missing, vec!["gross_profit".to_string()]);
}

#[test]
fn test_formula_tester_and_settings() -> anyhow::Result<()> {
    let ok = test_formula("Net Income / Revenue * 100", None);
    assert!(ok.success);
    assert!(ok.error.is_none());

    let failed = test_formula("max(Revenue, 1)", None);
    assert!(!failed.success);

    let settings = EngineSettings::from_json_str(r#"{"dev_mode": true, "decimal_places": 4}"#)?;
    assert!(settings.dev_mode);
    assert_eq!(settings.decimal_places, 4);
    assert_eq!(settings.low_confidence_threshold, 0.8);
    assert!(EngineSettings::from_json_str(r#"{"low_confidence_threshold": 2.0}"#).is_err());
    Ok(())
}
