//! Restricted arithmetic formulas.
//!
//! Formulas are parsed into an unrestricted [`parser::SyntaxNode`] tree and then
//! lowered into [`Expr`], which can only represent literals, variables and the
//! arithmetic operators. Lowering is an exhaustive match, so a syntax form that
//! is not explicitly mapped cannot reach the evaluator.

pub mod evaluator;
pub mod lexer;
pub mod parser;

pub use evaluator::{
    evaluate, evaluate_formula, round_to, sample_variables, scale_percentage, test_formula,
    FormulaTest,
};

use crate::error::FormulaError;
use parser::SyntaxNode;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    FloorDiv,
}

impl BinaryOp {
    fn from_symbol(symbol: &str) -> Option<Self> {
        Some(match symbol {
            "+" => BinaryOp::Add,
            "-" => BinaryOp::Sub,
            "*" => BinaryOp::Mul,
            "/" => BinaryOp::Div,
            "%" => BinaryOp::Mod,
            "**" => BinaryOp::Pow,
            "//" => BinaryOp::FloorDiv,
            _ => return None,
        })
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Pow => "**",
            BinaryOp::FloorDiv => "//",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Pos,
}

/// A validated arithmetic expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(f64),
    Variable(String),
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
}

impl Expr {
    /// Referenced variable names, in order of first appearance.
    pub fn variables(&self) -> Vec<String> {
        let mut names = Vec::new();
        self.collect_variables(&mut names);
        names
    }

    fn collect_variables(&self, names: &mut Vec<String>) {
        match self {
            Expr::Literal(_) => {}
            Expr::Variable(name) => {
                if !names.contains(name) {
                    names.push(name.clone());
                }
            }
            Expr::Binary { left, right, .. } => {
                left.collect_variables(names);
                right.collect_variables(names);
            }
            Expr::Unary { operand, .. } => operand.collect_variables(names),
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Literal(v) => write!(f, "{}", v),
            Expr::Variable(name) => f.write_str(name),
            Expr::Binary { op, left, right } => write!(f, "({} {} {})", left, op.symbol(), right),
            Expr::Unary { op: UnaryOp::Neg, operand } => write!(f, "-{}", operand),
            Expr::Unary { op: UnaryOp::Pos, operand } => write!(f, "+{}", operand),
        }
    }
}

/// Parses `formula` and rejects everything that is not plain arithmetic.
pub fn parse_and_validate(formula: &str) -> Result<Expr, FormulaError> {
    let trimmed = formula.trim();
    if trimmed.is_empty() {
        return Err(FormulaError::EmptyFormula);
    }
    let cleaned = trimmed.replace('×', "*").replace('÷', "/");
    let tree = parser::parse(&cleaned)?;
    lower(&tree)
}

fn unsafe_construct(message: impl Into<String>) -> FormulaError {
    FormulaError::UnsafeConstruct(message.into())
}

/// Whitelist lowering from the raw syntax tree. Outer nodes are checked before
/// their children, so the reported construct is the outermost offending one.
fn lower(node: &SyntaxNode) -> Result<Expr, FormulaError> {
    match node {
        SyntaxNode::Number(n) => Ok(Expr::Literal(*n)),
        SyntaxNode::Name(name) => Ok(Expr::Variable(name.clone())),
        SyntaxNode::Unary { op, operand } => {
            let op = match *op {
                "-" => UnaryOp::Neg,
                "+" => UnaryOp::Pos,
                other => return Err(unsafe_construct(format!("Unsupported operator '{}'", other))),
            };
            Ok(Expr::Unary {
                op,
                operand: Box::new(lower(operand)?),
            })
        }
        SyntaxNode::Binary { op, left, right } => {
            let op = BinaryOp::from_symbol(op)
                .ok_or_else(|| unsafe_construct(format!("Unsupported operator '{}'", op)))?;
            Ok(Expr::Binary {
                op,
                left: Box::new(lower(left)?),
                right: Box::new(lower(right)?),
            })
        }
        SyntaxNode::Call { .. } | SyntaxNode::Lambda { .. } | SyntaxNode::Definition => {
            Err(unsafe_construct("Function calls are not allowed in formulas"))
        }
        SyntaxNode::Import => Err(unsafe_construct("Import statements are not allowed")),
        SyntaxNode::Attribute { .. } | SyntaxNode::Subscript { .. } => {
            Err(unsafe_construct("Attribute access and subscripts are not allowed"))
        }
        SyntaxNode::Str(_) => Err(unsafe_construct("Text values are not allowed in formulas")),
        SyntaxNode::Constant(name) => Err(unsafe_construct(format!(
            "Constant '{}' is not allowed in formulas",
            name
        ))),
        SyntaxNode::Compare { .. } => Err(unsafe_construct("Comparisons are not allowed in formulas")),
        SyntaxNode::BoolOp { .. } => Err(unsafe_construct("Logical operators are not allowed in formulas")),
        SyntaxNode::Conditional { .. } => {
            Err(unsafe_construct("Conditional expressions are not allowed in formulas"))
        }
        SyntaxNode::Tuple(_) | SyntaxNode::List(_) => {
            Err(unsafe_construct("Formulas must be a single arithmetic expression"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unsafe_message(formula: &str) -> String {
        match parse_and_validate(formula) {
            Err(FormulaError::UnsafeConstruct(message)) => message,
            other => panic!("expected UnsafeConstruct for {formula:?}, got {other:?}"),
        }
    }

    #[test]
    fn test_arithmetic_is_accepted() {
        let expr = parse_and_validate("(a - b) / c ** 2 // 1 % 3").unwrap();
        assert_eq!(expr.variables(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_unicode_operators() {
        let expr = parse_and_validate("revenue × 2 ÷ assets").unwrap();
        assert_eq!(expr.to_string(), "((revenue * 2) / assets)");
    }

    #[test]
    fn test_empty_formula() {
        assert_eq!(parse_and_validate(""), Err(FormulaError::EmptyFormula));
        assert_eq!(parse_and_validate("   \t"), Err(FormulaError::EmptyFormula));
    }

    #[test]
    fn test_unsafe_constructs_are_rejected() {
        assert_eq!(unsafe_message("max(a, b)"), "Function calls are not allowed in formulas");
        assert_eq!(unsafe_message("a + abs(b)"), "Function calls are not allowed in formulas");
        assert_eq!(unsafe_message("lambda: 1"), "Function calls are not allowed in formulas");
        assert_eq!(unsafe_message("import os"), "Import statements are not allowed");
        assert_eq!(
            unsafe_message("revenue.real"),
            "Attribute access and subscripts are not allowed"
        );
        assert_eq!(
            unsafe_message("data[0] * 2"),
            "Attribute access and subscripts are not allowed"
        );
    }

    #[test]
    fn test_non_arithmetic_forms_are_rejected() {
        unsafe_message("a < b");
        unsafe_message("a and b");
        unsafe_message("not a");
        unsafe_message("~a");
        unsafe_message("a | b");
        unsafe_message("a if b else c");
        unsafe_message("'text'");
        unsafe_message("True");
        unsafe_message("a, b");
        unsafe_message("()");
    }

    #[test]
    fn test_syntax_error_message() {
        let err = parse_and_validate("a * (b + ").unwrap_err();
        assert!(matches!(err, FormulaError::Syntax(_)));
        assert!(err.to_string().starts_with("Syntax error:"));
    }
}
