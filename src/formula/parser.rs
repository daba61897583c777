//! Recursive-descent parser for the expression grammar users actually type.
//!
//! The grammar deliberately accepts more than is allowed (calls, attributes,
//! subscripts, comparisons, lambdas, imports) so that rejection happens in one
//! place, [`super::lower`], with a precise message instead of a vague syntax error.

use super::lexer::{tokenize, Spanned, Token};
use crate::error::FormulaError;

const MAX_DEPTH: usize = 100;

/// Caps the size of the tree. Operator chains are built without recursion in the
/// parser, but lowering, evaluation and drop all recurse once per operand.
pub const MAX_TOKENS: usize = 1_000;

#[derive(Debug, Clone, PartialEq)]
pub enum SyntaxNode {
    Number(f64),
    Name(String),
    Str(String),
    Constant(String),
    Unary {
        op: &'static str,
        operand: Box<SyntaxNode>,
    },
    Binary {
        op: &'static str,
        left: Box<SyntaxNode>,
        right: Box<SyntaxNode>,
    },
    Compare {
        op: &'static str,
        left: Box<SyntaxNode>,
        right: Box<SyntaxNode>,
    },
    BoolOp {
        op: &'static str,
        values: Vec<SyntaxNode>,
    },
    Conditional {
        test: Box<SyntaxNode>,
        body: Box<SyntaxNode>,
        orelse: Box<SyntaxNode>,
    },
    Call {
        func: Box<SyntaxNode>,
        args: Vec<SyntaxNode>,
    },
    Attribute {
        value: Box<SyntaxNode>,
        attr: String,
    },
    Subscript {
        value: Box<SyntaxNode>,
        index: Box<SyntaxNode>,
    },
    Tuple(Vec<SyntaxNode>),
    List(Vec<SyntaxNode>),
    Lambda {
        body: Box<SyntaxNode>,
    },
    Import,
    Definition,
}

pub fn parse(source: &str) -> Result<SyntaxNode, FormulaError> {
    let tokens = tokenize(source)?;
    if tokens.len() > MAX_TOKENS {
        return Err(FormulaError::Syntax(format!(
            "formula is too long ({} tokens, at most {} allowed)",
            tokens.len(),
            MAX_TOKENS
        )));
    }
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    parser.statement()
}

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|s| &s.token)
    }

    fn peek_punct(&self, punct: &str) -> bool {
        matches!(self.peek(), Some(Token::Punct(p)) if *p == punct)
    }

    fn peek_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek(), Some(Token::Name(n)) if n == keyword)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).map(|s| s.token.clone());
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    /// Consumes the next token if it is one of `options`.
    fn eat_punct(&mut self, options: &[&'static str]) -> Option<&'static str> {
        let found = match self.peek() {
            Some(Token::Punct(p)) => options.iter().copied().find(|o| o == p),
            _ => None,
        };
        if found.is_some() {
            self.pos += 1;
        }
        found
    }

    fn expect_punct(&mut self, punct: &'static str) -> Result<(), FormulaError> {
        if self.eat_punct(&[punct]).is_some() {
            Ok(())
        } else {
            Err(self.unexpected(&format!("expected '{}'", punct)))
        }
    }

    fn unexpected(&self, context: &str) -> FormulaError {
        match self.tokens.get(self.pos) {
            Some(spanned) => FormulaError::Syntax(format!(
                "{}, found '{}' at position {}",
                context,
                spanned.token.describe(),
                spanned.offset
            )),
            None => FormulaError::Syntax(format!("{}, found end of formula", context)),
        }
    }

    fn enter(&mut self) -> Result<(), FormulaError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(FormulaError::Syntax("formula is nested too deeply".to_string()));
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    fn statement(&mut self) -> Result<SyntaxNode, FormulaError> {
        if self.peek_keyword("import") || self.peek_keyword("from") {
            return Ok(SyntaxNode::Import);
        }
        if self.peek_keyword("def") || self.peek_keyword("class") {
            return Ok(SyntaxNode::Definition);
        }
        if self.peek().is_none() {
            return Err(FormulaError::Syntax("formula contains no expression".to_string()));
        }

        let first = self.expression()?;
        let node = if self.peek_punct(",") {
            let mut items = vec![first];
            while self.eat_punct(&[","]).is_some() && self.peek().is_some() {
                items.push(self.expression()?);
            }
            SyntaxNode::Tuple(items)
        } else {
            first
        };

        if self.peek().is_some() {
            return Err(self.unexpected("unexpected token"));
        }
        Ok(node)
    }

    fn expression(&mut self) -> Result<SyntaxNode, FormulaError> {
        self.enter()?;
        let node = self.expression_inner();
        self.leave();
        node
    }

    fn expression_inner(&mut self) -> Result<SyntaxNode, FormulaError> {
        if self.peek_keyword("lambda") {
            self.advance();
            while !self.peek_punct(":") {
                if self.advance().is_none() {
                    return Err(self.unexpected("expected ':' in lambda"));
                }
            }
            self.advance();
            let body = self.expression()?;
            return Ok(SyntaxNode::Lambda { body: Box::new(body) });
        }

        let body = self.or_test()?;
        if self.peek_keyword("if") {
            self.advance();
            let test = self.or_test()?;
            if !self.peek_keyword("else") {
                return Err(self.unexpected("expected 'else'"));
            }
            self.advance();
            let orelse = self.expression()?;
            return Ok(SyntaxNode::Conditional {
                test: Box::new(test),
                body: Box::new(body),
                orelse: Box::new(orelse),
            });
        }
        Ok(body)
    }

    fn or_test(&mut self) -> Result<SyntaxNode, FormulaError> {
        let first = self.and_test()?;
        if !self.peek_keyword("or") {
            return Ok(first);
        }
        let mut values = vec![first];
        while self.peek_keyword("or") {
            self.advance();
            values.push(self.and_test()?);
        }
        Ok(SyntaxNode::BoolOp { op: "or", values })
    }

    fn and_test(&mut self) -> Result<SyntaxNode, FormulaError> {
        let first = self.not_test()?;
        if !self.peek_keyword("and") {
            return Ok(first);
        }
        let mut values = vec![first];
        while self.peek_keyword("and") {
            self.advance();
            values.push(self.not_test()?);
        }
        Ok(SyntaxNode::BoolOp { op: "and", values })
    }

    fn not_test(&mut self) -> Result<SyntaxNode, FormulaError> {
        if self.peek_keyword("not") {
            self.advance();
            self.enter()?;
            let operand = self.not_test();
            self.leave();
            return Ok(SyntaxNode::Unary {
                op: "not",
                operand: Box::new(operand?),
            });
        }
        self.comparison()
    }

    fn comparison(&mut self) -> Result<SyntaxNode, FormulaError> {
        let mut left = self.bitwise()?;
        loop {
            let op = if let Some(op) = self.eat_punct(&["<", ">", "==", "!=", "<=", ">="]) {
                op
            } else if self.peek_keyword("in") {
                self.advance();
                "in"
            } else if self.peek_keyword("is") {
                self.advance();
                "is"
            } else {
                return Ok(left);
            };
            let right = self.bitwise()?;
            left = SyntaxNode::Compare {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
    }

    fn bitwise(&mut self) -> Result<SyntaxNode, FormulaError> {
        let mut left = self.arith()?;
        while let Some(op) = self.eat_punct(&["|", "^", "&", "<<", ">>"]) {
            let right = self.arith()?;
            left = SyntaxNode::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn arith(&mut self) -> Result<SyntaxNode, FormulaError> {
        let mut left = self.term()?;
        while let Some(op) = self.eat_punct(&["+", "-"]) {
            let right = self.term()?;
            left = SyntaxNode::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn term(&mut self) -> Result<SyntaxNode, FormulaError> {
        let mut left = self.factor()?;
        while let Some(op) = self.eat_punct(&["*", "/", "//", "%", "@"]) {
            let right = self.factor()?;
            left = SyntaxNode::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    /// Unary prefix operators bind looser than `**`, so `-2 ** 2` is `-(2 ** 2)`.
    fn factor(&mut self) -> Result<SyntaxNode, FormulaError> {
        if let Some(op) = self.eat_punct(&["-", "+", "~"]) {
            self.enter()?;
            let operand = self.factor();
            self.leave();
            return Ok(SyntaxNode::Unary {
                op,
                operand: Box::new(operand?),
            });
        }
        self.power()
    }

    fn power(&mut self) -> Result<SyntaxNode, FormulaError> {
        let base = self.postfix()?;
        if self.eat_punct(&["**"]).is_some() {
            self.enter()?;
            let exponent = self.factor();
            self.leave();
            return Ok(SyntaxNode::Binary {
                op: "**",
                left: Box::new(base),
                right: Box::new(exponent?),
            });
        }
        Ok(base)
    }

    fn postfix(&mut self) -> Result<SyntaxNode, FormulaError> {
        let mut node = self.atom()?;
        loop {
            if self.eat_punct(&["("]).is_some() {
                let args = self.sequence(")")?;
                node = SyntaxNode::Call {
                    func: Box::new(node),
                    args,
                };
            } else if self.eat_punct(&["."]).is_some() {
                match self.advance() {
                    Some(Token::Name(attr)) => {
                        node = SyntaxNode::Attribute {
                            value: Box::new(node),
                            attr,
                        };
                    }
                    _ => {
                        self.pos = self.pos.saturating_sub(1);
                        return Err(self.unexpected("expected attribute name"));
                    }
                }
            } else if self.eat_punct(&["["]).is_some() {
                let index = self.expression()?;
                self.expect_punct("]")?;
                node = SyntaxNode::Subscript {
                    value: Box::new(node),
                    index: Box::new(index),
                };
            } else {
                return Ok(node);
            }
        }
    }

    /// Comma separated expressions up to and including `close`.
    fn sequence(&mut self, close: &'static str) -> Result<Vec<SyntaxNode>, FormulaError> {
        let mut items = Vec::new();
        while !self.peek_punct(close) {
            items.push(self.expression()?);
            if self.eat_punct(&[","]).is_none() {
                break;
            }
        }
        self.expect_punct(close)?;
        Ok(items)
    }

    fn atom(&mut self) -> Result<SyntaxNode, FormulaError> {
        match self.peek().cloned() {
            Some(Token::Number(n)) => {
                self.advance();
                Ok(SyntaxNode::Number(n))
            }
            Some(Token::Str(s)) => {
                self.advance();
                Ok(SyntaxNode::Str(s))
            }
            Some(Token::Name(name)) => {
                if is_reserved(&name) {
                    return Err(self.unexpected("invalid syntax"));
                }
                self.advance();
                if matches!(name.as_str(), "True" | "False" | "None") {
                    Ok(SyntaxNode::Constant(name))
                } else {
                    Ok(SyntaxNode::Name(name))
                }
            }
            Some(Token::Punct("(")) => {
                self.advance();
                if self.eat_punct(&[")"]).is_some() {
                    return Ok(SyntaxNode::Tuple(Vec::new()));
                }
                let first = self.expression()?;
                if self.eat_punct(&[")"]).is_some() {
                    return Ok(first);
                }
                if !self.peek_punct(",") {
                    return Err(self.unexpected("expected ')'"));
                }
                self.advance();
                let mut items = vec![first];
                items.extend(self.sequence(")")?);
                Ok(SyntaxNode::Tuple(items))
            }
            Some(Token::Punct("[")) => {
                self.advance();
                Ok(SyntaxNode::List(self.sequence("]")?))
            }
            Some(_) => Err(self.unexpected("invalid syntax")),
            None => Err(self.unexpected("unexpected end of formula")),
        }
    }
}

fn is_reserved(name: &str) -> bool {
    matches!(
        name,
        "and" | "or" | "not" | "in" | "is" | "if" | "else" | "lambda" | "import" | "from" | "def"
            | "class" | "return" | "for" | "while" | "with" | "del" | "pass" | "yield" | "global"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn num(n: f64) -> Box<SyntaxNode> {
        Box::new(SyntaxNode::Number(n))
    }

    #[test]
    fn test_precedence() {
        let node = parse("1 + 2 * 3").unwrap();
        assert_eq!(
            node,
            SyntaxNode::Binary {
                op: "+",
                left: num(1.0),
                right: Box::new(SyntaxNode::Binary {
                    op: "*",
                    left: num(2.0),
                    right: num(3.0),
                }),
            }
        );
    }

    #[test]
    fn test_power_binds_tighter_than_unary_minus() {
        let node = parse("-2 ** 2").unwrap();
        assert_eq!(
            node,
            SyntaxNode::Unary {
                op: "-",
                operand: Box::new(SyntaxNode::Binary {
                    op: "**",
                    left: num(2.0),
                    right: num(2.0),
                }),
            }
        );
    }

    #[test]
    fn test_power_is_right_associative() {
        let node = parse("2 ** 3 ** 2").unwrap();
        assert_eq!(
            node,
            SyntaxNode::Binary {
                op: "**",
                left: num(2.0),
                right: Box::new(SyntaxNode::Binary {
                    op: "**",
                    left: num(3.0),
                    right: num(2.0),
                }),
            }
        );
    }

    #[test]
    fn test_unsafe_shapes_still_parse() {
        assert!(matches!(parse("max(a, b)").unwrap(), SyntaxNode::Call { .. }));
        assert!(matches!(parse("os.path").unwrap(), SyntaxNode::Attribute { .. }));
        assert!(matches!(parse("data['x']").unwrap(), SyntaxNode::Subscript { .. }));
        assert!(matches!(parse("lambda x: x").unwrap(), SyntaxNode::Lambda { .. }));
        assert_eq!(parse("import os").unwrap(), SyntaxNode::Import);
        assert!(matches!(parse("a if b else c").unwrap(), SyntaxNode::Conditional { .. }));
    }

    #[test]
    fn test_syntax_errors() {
        assert!(matches!(parse("a +"), Err(FormulaError::Syntax(_))));
        assert!(matches!(parse("(a + b"), Err(FormulaError::Syntax(_))));
        assert!(matches!(parse("a b"), Err(FormulaError::Syntax(_))));
        assert!(matches!(parse("a = 1"), Err(FormulaError::Syntax(_))));
    }

    #[test]
    fn test_long_operator_chains_are_bounded() {
        let fits = vec!["a"; 400].join(" + ");
        assert!(parse(&fits).is_ok());

        for terms in [600, 5_000, 50_000] {
            let chain = vec!["a"; terms].join(" + ");
            assert!(matches!(parse(&chain), Err(FormulaError::Syntax(_))), "{} terms", terms);
        }
        let product = vec!["2"; 2_000].join(" * ");
        assert!(matches!(parse(&product), Err(FormulaError::Syntax(_))));
    }

    #[test]
    fn test_deep_nesting_is_rejected() {
        let formula = format!("{}1{}", "(".repeat(500), ")".repeat(500));
        assert!(matches!(parse(&formula), Err(FormulaError::Syntax(_))));
    }
}
