use serde::Serialize;

use crate::flatten::flatten;
use crate::formula::round_to;
use crate::schema::FinancialRecord;

/// ROE split into margin, turnover and leverage.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DupontAnalysis {
    pub net_profit_margin: f64,
    pub asset_turnover: f64,
    pub equity_multiplier: f64,
    pub roe: f64,
    pub interpretation: String,
}

/// Current-year DuPont decomposition; `None` when an input is missing or zero.
pub fn dupont_analysis(record: &FinancialRecord) -> Option<DupontAnalysis> {
    let vars = flatten(&record.current_year);
    let non_zero = |key: &str| vars.get(key).copied().filter(|v| *v != 0.0);

    let net_income = vars.get("net_income").copied()?;
    let revenue = non_zero("revenue")?;
    let total_assets = non_zero("total_assets")?;
    let total_equity = non_zero("total_equity")?;

    let net_profit_margin = net_income / revenue * 100.0;
    let asset_turnover = revenue / total_assets;
    let equity_multiplier = total_assets / total_equity;
    let roe = net_income / total_equity * 100.0;

    let margin_note = if net_profit_margin < 5.0 {
        "Low profit margin"
    } else if net_profit_margin > 15.0 {
        "Strong profit margin"
    } else {
        "Moderate profit margin"
    };
    let leverage_note = if equity_multiplier > 3.0 {
        "high financial leverage"
    } else {
        "moderate financial leverage"
    };

    Some(DupontAnalysis {
        net_profit_margin: round_to(net_profit_margin, 2),
        asset_turnover: round_to(asset_turnover, 2),
        equity_multiplier: round_to(equity_multiplier, 2),
        roe: round_to(roe, 2),
        interpretation: format!("{} with {}", margin_note, leverage_note),
    })
}
