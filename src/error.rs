use thiserror::Error;

/// Failures raised while parsing or evaluating a single formula.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FormulaError {
    #[error("Formula cannot be empty")]
    EmptyFormula,

    #[error("Syntax error: {0}")]
    Syntax(String),

    #[error("{0}")]
    UnsafeConstruct(String),

    #[error("Variable '{0}' not found in data")]
    UnknownVariable(String),

    #[error("Division by zero")]
    DivisionByZero,

    #[error("Formula evaluation resulted in invalid value ({0})")]
    InvalidResult(String),
}

/// Failures raised by the cheap pre-validation of a custom ratio definition.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Invalid unit '{0}'. Must be one of: %, ratio, times, days, number")]
    InvalidUnit(String),

    #[error("Category cannot be empty")]
    EmptyCategory,

    #[error("Unbalanced parentheses")]
    UnbalancedParens,

    #[error("Empty parentheses")]
    EmptyParens,

    #[error("Consecutive operators '{0}'")]
    ConsecutiveOperators(String),

    #[error("Formula cannot start or end with an operator")]
    LeadingTrailingOperator,

    #[error("Division by zero detected")]
    LiteralDivByZero,
}

#[derive(Error, Debug)]
pub enum RatioEngineError {
    #[error(transparent)]
    Formula(#[from] FormulaError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Ratio not found: {0}")]
    RatioNotFound(String),

    #[error("Ratio already exists: {0}")]
    DuplicateRatio(String),

    #[error("Invalid user id '{0}': only letters, digits, '-' and '_' are allowed")]
    InvalidUserId(String),

    #[error("Invalid settings: {0}")]
    InvalidSettings(String),

    #[error("Unrecognized extraction payload: {0}")]
    InvalidExtraction(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, RatioEngineError>;
