use serde::Serialize;

/// A variable users can reference in custom formulas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct VariableInfo {
    pub name: &'static str,
    pub label: &'static str,
    pub description: &'static str,
}

const fn var(name: &'static str, label: &'static str, description: &'static str) -> VariableInfo {
    VariableInfo {
        name,
        label,
        description,
    }
}

pub static ASSET_VARIABLES: [VariableInfo; 7] = [
    var("current_assets", "Current Assets", "Total current assets"),
    var("cash", "Cash", "Cash and cash equivalents"),
    var("accounts_receivable", "Accounts Receivable", "Amounts owed by customers"),
    var("inventories", "Inventories", "Inventory and stock on hand"),
    var("non_current_assets", "Non-Current Assets", "Total non-current assets"),
    var("fixed_assets", "Fixed Assets", "Property, plant and equipment"),
    var("total_assets", "Total Assets", "Sum of current and non-current assets"),
];

pub static LIABILITY_VARIABLES: [VariableInfo; 3] = [
    var("current_liabilities", "Current Liabilities", "Obligations due within one year"),
    var("non_current_liabilities", "Non-Current Liabilities", "Obligations due after one year"),
    var("total_liabilities", "Total Liabilities", "Sum of current and non-current liabilities"),
];

pub static EQUITY_VARIABLES: [VariableInfo; 3] = [
    var("total_equity", "Total Equity", "Shareholders' equity"),
    var("share_capital", "Share Capital", "Issued share capital"),
    var("retained_earnings", "Retained Earnings", "Accumulated undistributed profits"),
];

pub static INCOME_VARIABLES: [VariableInfo; 9] = [
    var("revenue", "Revenue", "Total revenue or sales"),
    var("cost_of_goods_sold", "Cost of Goods Sold", "Direct costs of goods or services sold"),
    var("gross_profit", "Gross Profit", "Revenue less cost of goods sold"),
    var("operating_expenses", "Operating Expenses", "Selling, general and administrative costs"),
    var("operating_income", "Operating Income", "Profit from core operations"),
    var("ebit", "EBIT", "Earnings before interest and taxes"),
    var("interest_expense", "Interest Expense", "Interest paid on borrowings"),
    var("income_tax_expense", "Income Tax Expense", "Tax charged on profit"),
    var("net_income", "Net Income", "Profit after all expenses and taxes"),
];

pub static AVERAGED_VARIABLES: [VariableInfo; 5] = [
    var("avg_total_assets", "Average Total Assets", "Mean of current and previous year total assets"),
    var("avg_total_equity", "Average Total Equity", "Mean of current and previous year total equity"),
    var("avg_fixed_assets", "Average Fixed Assets", "Mean of current and previous year fixed assets"),
    var("avg_inventories", "Average Inventories", "Mean of current and previous year inventories"),
    var(
        "avg_accounts_receivable",
        "Average Accounts Receivable",
        "Mean of current and previous year accounts receivable",
    ),
];

#[derive(Debug, Clone, Serialize)]
pub struct BalanceSheetVariables {
    pub assets: &'static [VariableInfo],
    pub liabilities: &'static [VariableInfo],
    pub equity: &'static [VariableInfo],
}

/// Static listing of every formula variable, grouped the way the UI shows them.
#[derive(Debug, Clone, Serialize)]
pub struct VariableCatalog {
    pub balance_sheet: BalanceSheetVariables,
    pub income_statement: &'static [VariableInfo],
    pub averaged_values: &'static [VariableInfo],
    pub total_count: usize,
}

pub fn variable_catalog() -> VariableCatalog {
    VariableCatalog {
        balance_sheet: BalanceSheetVariables {
            assets: &ASSET_VARIABLES,
            liabilities: &LIABILITY_VARIABLES,
            equity: &EQUITY_VARIABLES,
        },
        income_statement: &INCOME_VARIABLES,
        averaged_values: &AVERAGED_VARIABLES,
        total_count: total_count(),
    }
}

pub fn all_variables() -> impl Iterator<Item = &'static VariableInfo> {
    ASSET_VARIABLES
        .iter()
        .chain(LIABILITY_VARIABLES.iter())
        .chain(EQUITY_VARIABLES.iter())
        .chain(INCOME_VARIABLES.iter())
        .chain(AVERAGED_VARIABLES.iter())
}

pub fn total_count() -> usize {
    all_variables().count()
}
