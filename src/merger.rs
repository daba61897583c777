//! Combines several partial extractions (typically one per scanned page) into a
//! single multi-year record.
//!
//! Merging is total: it never fails and prefers keeping data over discarding it.
//! The per-value policy lives in [`prefer_larger`].

use log::{debug, info};

use crate::schema::{CategoryData, FinancialRecord, LineItems, Totals, YearRecord};

/// Numeric conflict policy: keep whichever value is present, the larger one if both are.
///
/// A source that reports the bigger total is assumed to have summed more line
/// items. This is a heuristic, not an accounting rule.
pub fn prefer_larger(current: Option<f64>, incoming: Option<f64>) -> Option<f64> {
    match (current, incoming) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, b) => a.or(b),
    }
}

/// Field-by-field merge of `incoming` into `self`.
pub trait DeepMerge {
    fn deep_merge(&mut self, incoming: &Self);
}

impl DeepMerge for Option<f64> {
    fn deep_merge(&mut self, incoming: &Self) {
        *self = prefer_larger(*self, *incoming);
    }
}

impl DeepMerge for LineItems {
    fn deep_merge(&mut self, incoming: &Self) {
        for (key, value) in incoming {
            self.entry(key.clone()).or_insert(None).deep_merge(value);
        }
    }
}

impl DeepMerge for CategoryData {
    fn deep_merge(&mut self, incoming: &Self) {
        self.total.deep_merge(&incoming.total);
        self.breakdown.deep_merge(&incoming.breakdown);
    }
}

impl DeepMerge for Totals {
    fn deep_merge(&mut self, incoming: &Self) {
        self.total_assets.deep_merge(&incoming.total_assets);
        self.total_liabilities.deep_merge(&incoming.total_liabilities);
        self.total_equity.deep_merge(&incoming.total_equity);
    }
}

impl DeepMerge for YearRecord {
    fn deep_merge(&mut self, incoming: &Self) {
        if self.year.is_none() {
            self.year = incoming.year.clone();
        }
        self.current_assets.deep_merge(&incoming.current_assets);
        self.non_current_assets.deep_merge(&incoming.non_current_assets);
        self.current_liabilities.deep_merge(&incoming.current_liabilities);
        self.non_current_liabilities.deep_merge(&incoming.non_current_liabilities);
        self.equity.deep_merge(&incoming.equity);
        self.income_statement.deep_merge(&incoming.income_statement);
        self.totals.deep_merge(&incoming.totals);
    }
}

/// `current_year` followed by `previous_year` when it carries data.
fn synthesize_all_years(record: &FinancialRecord) -> Vec<YearRecord> {
    let mut years = Vec::new();
    if record.current_year.year.is_some() || record.current_year.has_data() {
        years.push(record.current_year.clone());
    }
    if let Some(previous) = record.previous_year.as_ref().filter(|p| p.has_data()) {
        years.push(previous.clone());
    }
    years
}

fn same_year(a: &YearRecord, b: &YearRecord) -> bool {
    matches!((&a.year, &b.year), (Some(x), Some(y)) if x == y)
}

/// Merges `(record, confidence)` pairs into one record and the mean confidence.
pub fn merge_sources(sources: &[(FinancialRecord, f64)]) -> (FinancialRecord, f64) {
    let Some((first, first_confidence)) = sources.first() else {
        return (FinancialRecord::default(), 0.0);
    };

    if sources.len() == 1 {
        let mut record = first.clone();
        if record.all_years.is_empty() {
            record.all_years = synthesize_all_years(&record);
        }
        return (record, *first_confidence);
    }

    info!("Merging financial data from {} sources", sources.len());

    let mut current = YearRecord::default();
    let mut previous = YearRecord::default();
    for (index, (record, confidence)) in sources.iter().enumerate() {
        debug!(
            "Source {}: year {:?}, confidence {:.2}",
            index + 1,
            record.current_year.year,
            confidence
        );
        current.deep_merge(&record.current_year);
        if let Some(prev) = &record.previous_year {
            previous.deep_merge(prev);
        }
    }

    let mut all_years: Vec<YearRecord> = Vec::new();
    let mut base_index: Option<usize> = None;
    for (index, (record, _)) in sources.iter().enumerate() {
        if !record.all_years.is_empty() {
            all_years = record.all_years.clone();
            base_index = Some(index);
            break;
        }
    }

    if let Some(base_index) = base_index {
        for (index, (record, _)) in sources.iter().enumerate() {
            if index == base_index {
                continue;
            }
            for supplemental in &record.all_years {
                match all_years.iter_mut().find(|y| same_year(y, supplemental)) {
                    Some(existing) => existing.deep_merge(supplemental),
                    None => debug!(
                        "Skipping supplemental year {:?} with no match in the base sequence",
                        supplemental.year
                    ),
                }
            }
        }
    }

    let merged = FinancialRecord::new(current, Some(previous));
    let all_years = if all_years.is_empty() {
        synthesize_all_years(&merged)
    } else {
        all_years
    };

    let average_confidence =
        sources.iter().map(|(_, confidence)| confidence).sum::<f64>() / sources.len() as f64;

    (
        FinancialRecord {
            all_years,
            ..merged
        },
        average_confidence,
    )
}
