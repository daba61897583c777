//! Cheap structural checks on custom ratio definitions, run before a formula
//! is handed to the parser.

use crate::error::ValidationError;
use crate::schema::RatioDefinition;

const OPERATORS: [char; 4] = ['+', '-', '*', '/'];

pub fn validate_formula_syntax(formula: &str) -> Result<(), ValidationError> {
    let trimmed = formula.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::MissingField("formula"));
    }

    let mut depth: i64 = 0;
    for c in trimmed.chars() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth < 0 {
                    return Err(ValidationError::UnbalancedParens);
                }
            }
            _ => {}
        }
    }
    if depth != 0 {
        return Err(ValidationError::UnbalancedParens);
    }

    let compact: String = trimmed.chars().filter(|c| !c.is_whitespace()).collect();
    if compact.contains("()") {
        return Err(ValidationError::EmptyParens);
    }

    if let Some(run) = consecutive_operators(&trimmed.replace("**", "")) {
        return Err(ValidationError::ConsecutiveOperators(run));
    }

    let starts = trimmed.starts_with(OPERATORS);
    let ends = trimmed.ends_with(OPERATORS);
    if starts || ends {
        return Err(ValidationError::LeadingTrailingOperator);
    }

    if divides_by_literal_zero(&compact) {
        return Err(ValidationError::LiteralDivByZero);
    }

    Ok(())
}

/// First run of two or more adjacent arithmetic operators.
fn consecutive_operators(formula: &str) -> Option<String> {
    let mut run = String::new();
    for c in formula.chars() {
        if OPERATORS.contains(&c) {
            run.push(c);
        } else if run.len() >= 2 {
            return Some(run);
        } else {
            run.clear();
        }
    }
    (run.len() >= 2).then_some(run)
}

/// `/` (or `//`) followed by a numeric literal equal to zero, e.g. `/0`, `/0.00`.
fn divides_by_literal_zero(compact: &str) -> bool {
    let chars: Vec<char> = compact.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        if chars[i] != '/' {
            i += 1;
            continue;
        }
        let mut j = i + 1;
        if chars.get(j) == Some(&'/') {
            j += 1;
        }
        let start = j;
        while j < chars.len() && (chars[j].is_ascii_digit() || chars[j] == '.') {
            j += 1;
        }
        let followed_by_name = chars
            .get(j)
            .is_some_and(|c| c.is_alphanumeric() || *c == '_');
        if j > start && !followed_by_name {
            let literal: String = chars[start..j].iter().collect();
            if literal.parse::<f64>().is_ok_and(|v| v == 0.0) {
                return true;
            }
        }
        i = j.max(i + 1);
    }
    false
}

pub fn validate_custom_ratio(definition: &RatioDefinition) -> Result<(), ValidationError> {
    if definition.name.trim().is_empty() {
        return Err(ValidationError::MissingField("name"));
    }
    if definition.category.is_empty() {
        return Err(ValidationError::MissingField("category"));
    }
    if definition.category.trim().is_empty() {
        return Err(ValidationError::EmptyCategory);
    }
    if definition.formula.trim().is_empty() {
        return Err(ValidationError::MissingField("formula"));
    }
    if definition.unit.trim().is_empty() {
        return Err(ValidationError::MissingField("unit"));
    }
    definition.parsed_unit()?;
    validate_formula_syntax(&definition.formula)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::RatioUnit;

    #[test]
    fn test_valid_formulas() {
        assert_eq!(validate_formula_syntax("Current Assets / Current Liabilities"), Ok(()));
        assert_eq!(validate_formula_syntax("(Revenue - COGS) / Revenue * 100"), Ok(()));
        assert_eq!(validate_formula_syntax("Revenue ** 2 / Assets"), Ok(()));
        assert_eq!(validate_formula_syntax("Revenue / 0.5"), Ok(()));
        assert_eq!(validate_formula_syntax("Revenue / 10"), Ok(()));
        assert_eq!(validate_formula_syntax("Non-Current Assets / Total Assets"), Ok(()));
    }

    #[test]
    fn test_literal_division_by_zero() {
        assert_eq!(validate_formula_syntax("Revenue / 0"), Err(ValidationError::LiteralDivByZero));
        assert_eq!(validate_formula_syntax("Revenue/0.00"), Err(ValidationError::LiteralDivByZero));
        assert_eq!(validate_formula_syntax("(A / 0) + B"), Err(ValidationError::LiteralDivByZero));
    }

    #[test]
    fn test_parentheses() {
        assert_eq!(validate_formula_syntax("(A + B"), Err(ValidationError::UnbalancedParens));
        assert_eq!(validate_formula_syntax("A + B)("), Err(ValidationError::UnbalancedParens));
        assert_eq!(validate_formula_syntax("A * ( ) + B"), Err(ValidationError::EmptyParens));
    }

    #[test]
    fn test_operators() {
        assert_eq!(
            validate_formula_syntax("A +* B"),
            Err(ValidationError::ConsecutiveOperators("+*".to_string()))
        );
        assert_eq!(
            validate_formula_syntax("A // B"),
            Err(ValidationError::ConsecutiveOperators("//".to_string()))
        );
        assert_eq!(validate_formula_syntax("A + B -"), Err(ValidationError::LeadingTrailingOperator));
        assert_eq!(validate_formula_syntax("* A"), Err(ValidationError::LeadingTrailingOperator));
    }

    #[test]
    fn test_custom_ratio_fields() {
        let mut def = RatioDefinition::new("Cash Cover", "liquidity", "Cash / Current Liabilities", RatioUnit::Ratio);
        assert_eq!(validate_custom_ratio(&def), Ok(()));

        def.category = "   ".to_string();
        assert_eq!(validate_custom_ratio(&def), Err(ValidationError::EmptyCategory));

        def.category = String::new();
        assert_eq!(validate_custom_ratio(&def), Err(ValidationError::MissingField("category")));

        def.category = "liquidity".to_string();
        def.unit = "percent".to_string();
        assert_eq!(
            validate_custom_ratio(&def),
            Err(ValidationError::InvalidUnit("percent".to_string()))
        );

        def.unit = "%".to_string();
        def.name = " ".to_string();
        assert_eq!(validate_custom_ratio(&def), Err(ValidationError::MissingField("name")));
    }
}
