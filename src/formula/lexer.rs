use crate::error::FormulaError;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Number(f64),
    Name(String),
    Str(String),
    Punct(&'static str),
}

impl Token {
    pub fn describe(&self) -> String {
        match self {
            Token::Number(n) => n.to_string(),
            Token::Name(name) => name.clone(),
            Token::Str(s) => format!("'{}'", s),
            Token::Punct(p) => (*p).to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub offset: usize,
}

const TWO_CHAR_PUNCT: &[&str] = &["**", "//", "==", "!=", "<=", ">=", "<<", ">>"];
const ONE_CHAR_PUNCT: &[&str] = &[
    "+", "-", "*", "/", "%", "(", ")", "[", "]", "{", "}", ",", ".", ":", "<", ">", "=", "@", "&",
    "|", "^", "~",
];

pub fn tokenize(source: &str) -> Result<Vec<Spanned>, FormulaError> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if c.is_whitespace() {
            i += 1;
            continue;
        }

        let starts_number =
            c.is_ascii_digit() || (c == '.' && chars.get(i + 1).is_some_and(|n| n.is_ascii_digit()));
        if starts_number {
            let (value, next) = lex_number(&chars, i)?;
            tokens.push(Spanned { token: Token::Number(value), offset: i });
            i = next;
            continue;
        }

        if c.is_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            let name: String = chars[start..i].iter().collect();
            tokens.push(Spanned { token: Token::Name(name), offset: start });
            continue;
        }

        if c == '"' || c == '\'' {
            let start = i;
            i += 1;
            while i < chars.len() && chars[i] != c {
                i += 1;
            }
            if i >= chars.len() {
                return Err(FormulaError::Syntax(format!(
                    "unterminated string literal at position {}",
                    start
                )));
            }
            let text: String = chars[start + 1..i].iter().collect();
            tokens.push(Spanned { token: Token::Str(text), offset: start });
            i += 1;
            continue;
        }

        let pair: String = chars[i..(i + 2).min(chars.len())].iter().collect();
        if let Some(p) = TWO_CHAR_PUNCT.iter().find(|p| **p == pair) {
            tokens.push(Spanned { token: Token::Punct(*p), offset: i });
            i += 2;
            continue;
        }
        let single = c.to_string();
        if let Some(p) = ONE_CHAR_PUNCT.iter().find(|p| **p == single) {
            tokens.push(Spanned { token: Token::Punct(*p), offset: i });
            i += 1;
            continue;
        }

        return Err(FormulaError::Syntax(format!(
            "invalid character '{}' at position {}",
            c, i
        )));
    }

    Ok(tokens)
}

/// Digits with optional `_` separators, fraction and exponent.
fn lex_number(chars: &[char], start: usize) -> Result<(f64, usize), FormulaError> {
    let mut i = start;
    let digits = |i: &mut usize| {
        while *i < chars.len() && (chars[*i].is_ascii_digit() || chars[*i] == '_') {
            *i += 1;
        }
    };

    digits(&mut i);
    if i < chars.len() && chars[i] == '.' {
        i += 1;
        digits(&mut i);
    }
    if i < chars.len() && matches!(chars[i], 'e' | 'E') {
        let mut j = i + 1;
        if j < chars.len() && matches!(chars[j], '+' | '-') {
            j += 1;
        }
        if j < chars.len() && chars[j].is_ascii_digit() {
            i = j;
            digits(&mut i);
        }
    }

    let literal: String = chars[start..i].iter().collect();
    if i < chars.len() && (chars[i].is_alphabetic() || chars[i] == '_') {
        return Err(FormulaError::Syntax(format!(
            "invalid decimal literal '{}{}' at position {}",
            literal, chars[i], start
        )));
    }

    let cleaned = literal.replace('_', "");
    cleaned
        .parse::<f64>()
        .map(|value| (value, i))
        .map_err(|_| FormulaError::Syntax(format!("invalid number literal '{}'", literal)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<Token> {
        tokenize(source).unwrap().into_iter().map(|s| s.token).collect()
    }

    #[test]
    fn test_tokenize_arithmetic() {
        assert_eq!(
            kinds("(a+1.5)**2 // b_c"),
            vec![
                Token::Punct("("),
                Token::Name("a".to_string()),
                Token::Punct("+"),
                Token::Number(1.5),
                Token::Punct(")"),
                Token::Punct("**"),
                Token::Number(2.0),
                Token::Punct("//"),
                Token::Name("b_c".to_string()),
            ]
        );
    }

    #[test]
    fn test_number_forms() {
        assert_eq!(kinds(".5"), vec![Token::Number(0.5)]);
        assert_eq!(kinds("1_000_000"), vec![Token::Number(1_000_000.0)]);
        assert_eq!(kinds("2.5e3"), vec![Token::Number(2500.0)]);
    }

    #[test]
    fn test_lex_errors() {
        assert!(matches!(tokenize("2x"), Err(FormulaError::Syntax(_))));
        assert!(matches!(tokenize("a $ b"), Err(FormulaError::Syntax(_))));
        assert!(matches!(tokenize("'open"), Err(FormulaError::Syntax(_))));
    }
}
