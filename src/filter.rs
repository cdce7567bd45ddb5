//! Query filter representation, parsing and evaluation.
//!
//! Filters arrive as strings, either from per-type configuration or from a
//! resolved filter template, and are parsed once into a [`Filter`] tree
//! before being handed to the backend. The grammar is the familiar
//! attribute/operator/literal form:
//!
//! ```text
//! filter     = and-expr ( "or" and-expr )*
//! and-expr   = not-expr ( "and" not-expr )*
//! not-expr   = [ "not" ] primary
//! primary    = "(" filter ")" | attr "pr" | attr op literal
//! op         = eq | ne | co | sw | ew | gt | ge | lt | le
//! literal    = quoted string | number | true | false | null
//! ```
//!
//! Keywords and operators are case-insensitive. Attribute paths use dot
//! notation into the record content tree.

use crate::error::RepoError;
use crate::record;
use serde_json::{Number, Value};
use std::cmp::Ordering;
use std::fmt;
use thiserror::Error;

/// Parsed filter expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// All sub-filters must match
    And(Vec<Filter>),
    /// At least one sub-filter must match
    Or(Vec<Filter>),
    /// The sub-filter must not match
    Not(Box<Filter>),
    /// The field is present and non-null
    Present(String),
    /// The field compares against a literal value
    Compare {
        field: String,
        op: CompareOp,
        value: Value,
    },
}

/// Comparison operators accepted by the filter grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Co,
    Sw,
    Ew,
    Gt,
    Ge,
    Lt,
    Le,
}

impl CompareOp {
    fn from_keyword(word: &str) -> Option<Self> {
        match word.to_ascii_lowercase().as_str() {
            "eq" => Some(Self::Eq),
            "ne" => Some(Self::Ne),
            "co" => Some(Self::Co),
            "sw" => Some(Self::Sw),
            "ew" => Some(Self::Ew),
            "gt" => Some(Self::Gt),
            "ge" => Some(Self::Ge),
            "lt" => Some(Self::Lt),
            "le" => Some(Self::Le),
            _ => None,
        }
    }

    fn keyword(self) -> &'static str {
        match self {
            Self::Eq => "eq",
            Self::Ne => "ne",
            Self::Co => "co",
            Self::Sw => "sw",
            Self::Ew => "ew",
            Self::Gt => "gt",
            Self::Ge => "ge",
            Self::Lt => "lt",
            Self::Le => "le",
        }
    }
}

/// Errors from [`Filter::parse`].
#[derive(Debug, Error)]
pub enum FilterParseError {
    #[error("unexpected end of filter")]
    UnexpectedEnd,

    #[error("unexpected input '{found}' at offset {offset}")]
    Unexpected { offset: usize, found: String },

    #[error("unterminated string literal at offset {offset}")]
    UnterminatedString { offset: usize },

    #[error("invalid number '{text}' at offset {offset}")]
    InvalidNumber { offset: usize, text: String },
}

impl From<FilterParseError> for RepoError {
    fn from(error: FilterParseError) -> Self {
        RepoError::bad_request(format!("invalid query filter: {error}"))
    }
}

impl Filter {
    /// Parse a filter string into its tree representation.
    pub fn parse(input: &str) -> Result<Self, FilterParseError> {
        let tokens = tokenize(input)?;
        let mut parser = Parser { tokens, pos: 0 };
        let filter = parser.parse_or()?;
        if let Some((offset, token)) = parser.peek() {
            return Err(FilterParseError::Unexpected {
                offset,
                found: token.describe(),
            });
        }
        Ok(filter)
    }

    /// Equality comparison on a single field.
    pub fn equals(field: impl Into<String>, value: Value) -> Self {
        Filter::Compare {
            field: field.into(),
            op: CompareOp::Eq,
            value,
        }
    }

    /// Conjunction, collapsing the trivial single-term case.
    pub fn all(mut terms: Vec<Filter>) -> Self {
        if terms.len() == 1 {
            terms.remove(0)
        } else {
            Filter::And(terms)
        }
    }

    /// Evaluate this filter against record content.
    pub fn matches(&self, content: &Value) -> bool {
        match self {
            Filter::And(terms) => terms.iter().all(|t| t.matches(content)),
            Filter::Or(terms) => terms.iter().any(|t| t.matches(content)),
            Filter::Not(inner) => !inner.matches(content),
            Filter::Present(field) => {
                record::field_value(content, field).is_some_and(|v| !v.is_null())
            }
            Filter::Compare { field, op, value } => match record::field_value(content, field) {
                Some(actual) => compare(actual, *op, value),
                None => false,
            },
        }
    }
}

fn compare(actual: &Value, op: CompareOp, expected: &Value) -> bool {
    match op {
        CompareOp::Eq => values_equal(actual, expected),
        CompareOp::Ne => !values_equal(actual, expected),
        CompareOp::Co => str_pair(actual, expected).is_some_and(|(a, e)| a.contains(e)),
        CompareOp::Sw => str_pair(actual, expected).is_some_and(|(a, e)| a.starts_with(e)),
        CompareOp::Ew => str_pair(actual, expected).is_some_and(|(a, e)| a.ends_with(e)),
        CompareOp::Gt => ordering(actual, expected).is_some_and(Ordering::is_gt),
        CompareOp::Ge => ordering(actual, expected).is_some_and(Ordering::is_ge),
        CompareOp::Lt => ordering(actual, expected).is_some_and(Ordering::is_lt),
        CompareOp::Le => ordering(actual, expected).is_some_and(Ordering::is_le),
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    // numbers compare numerically so 3 == 3.0
    if let (Some(m), Some(n)) = (a.as_f64(), b.as_f64()) {
        return m == n;
    }
    a == b
}

fn str_pair<'a>(a: &'a Value, b: &'a Value) -> Option<(&'a str, &'a str)> {
    Some((a.as_str()?, b.as_str()?))
}

fn ordering(a: &Value, b: &Value) -> Option<Ordering> {
    if let (Some(m), Some(n)) = (a.as_f64(), b.as_f64()) {
        return m.partial_cmp(&n);
    }
    if let (Some(s), Some(t)) = (a.as_str(), b.as_str()) {
        return Some(s.cmp(t));
    }
    None
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::And(terms) => {
                for (i, term) in terms.iter().enumerate() {
                    if i > 0 {
                        write!(f, " and ")?;
                    }
                    if matches!(term, Filter::Or(_)) {
                        write!(f, "({term})")?;
                    } else {
                        write!(f, "{term}")?;
                    }
                }
                Ok(())
            }
            Filter::Or(terms) => {
                for (i, term) in terms.iter().enumerate() {
                    if i > 0 {
                        write!(f, " or ")?;
                    }
                    write!(f, "{term}")?;
                }
                Ok(())
            }
            Filter::Not(inner) => write!(f, "not ({inner})"),
            Filter::Present(field) => write!(f, "{field} pr"),
            Filter::Compare { field, op, value } => {
                write!(f, "{field} {} {value}", op.keyword())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    LParen,
    RParen,
    Word(String),
    Literal(Value),
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::LParen => "(".to_string(),
            Token::RParen => ")".to_string(),
            Token::Word(w) => w.clone(),
            Token::Literal(v) => v.to_string(),
        }
    }
}

fn tokenize(input: &str) -> Result<Vec<(usize, Token)>, FilterParseError> {
    let bytes = input.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i] as char;
        if c.is_ascii_whitespace() {
            i += 1;
        } else if c == '(' {
            tokens.push((i, Token::LParen));
            i += 1;
        } else if c == ')' {
            tokens.push((i, Token::RParen));
            i += 1;
        } else if c == '"' {
            let (text, next) = read_string(input, i)?;
            tokens.push((i, Token::Literal(Value::String(text))));
            i = next;
        } else if c.is_ascii_digit() || (c == '-' && next_is_digit(bytes, i)) {
            let start = i;
            i += 1;
            while i < bytes.len() && is_number_char(bytes[i] as char) {
                i += 1;
            }
            let text = &input[start..i];
            tokens.push((start, Token::Literal(parse_number(text, start)?)));
        } else if c.is_ascii_alphabetic() || c == '_' {
            let start = i;
            while i < bytes.len() && is_word_char(bytes[i] as char) {
                i += 1;
            }
            tokens.push((start, Token::Word(input[start..i].to_string())));
        } else {
            return Err(FilterParseError::Unexpected {
                offset: i,
                found: c.to_string(),
            });
        }
    }
    Ok(tokens)
}

fn next_is_digit(bytes: &[u8], i: usize) -> bool {
    bytes.get(i + 1).is_some_and(|b| (*b as char).is_ascii_digit())
}

fn is_number_char(c: char) -> bool {
    c.is_ascii_digit() || c == '.' || c == 'e' || c == 'E' || c == '+' || c == '-'
}

fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == '-'
}

fn read_string(input: &str, open: usize) -> Result<(String, usize), FilterParseError> {
    let mut text = String::new();
    let mut chars = input[open + 1..].char_indices();
    while let Some((offset, c)) = chars.next() {
        match c {
            '"' => return Ok((text, open + 1 + offset + 1)),
            '\\' => match chars.next() {
                Some((_, escaped)) => text.push(escaped),
                None => return Err(FilterParseError::UnterminatedString { offset: open }),
            },
            _ => text.push(c),
        }
    }
    Err(FilterParseError::UnterminatedString { offset: open })
}

fn parse_number(text: &str, offset: usize) -> Result<Value, FilterParseError> {
    if let Ok(n) = text.parse::<i64>() {
        return Ok(Value::Number(Number::from(n)));
    }
    text.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Value::Number)
        .ok_or_else(|| FilterParseError::InvalidNumber {
            offset,
            text: text.to_string(),
        })
}

struct Parser {
    tokens: Vec<(usize, Token)>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<(usize, &Token)> {
        self.tokens.get(self.pos).map(|(o, t)| (*o, t))
    }

    fn next(&mut self) -> Option<(usize, Token)> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn peek_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek(), Some((_, Token::Word(w))) if w.eq_ignore_ascii_case(keyword))
    }

    fn parse_or(&mut self) -> Result<Filter, FilterParseError> {
        let mut terms = vec![self.parse_and()?];
        while self.peek_keyword("or") {
            self.pos += 1;
            terms.push(self.parse_and()?);
        }
        if terms.len() == 1 {
            Ok(terms.remove(0))
        } else {
            Ok(Filter::Or(terms))
        }
    }

    fn parse_and(&mut self) -> Result<Filter, FilterParseError> {
        let mut terms = vec![self.parse_not()?];
        while self.peek_keyword("and") {
            self.pos += 1;
            terms.push(self.parse_not()?);
        }
        if terms.len() == 1 {
            Ok(terms.remove(0))
        } else {
            Ok(Filter::And(terms))
        }
    }

    fn parse_not(&mut self) -> Result<Filter, FilterParseError> {
        if self.peek_keyword("not") {
            self.pos += 1;
            return Ok(Filter::Not(Box::new(self.parse_primary()?)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Filter, FilterParseError> {
        match self.next() {
            Some((_, Token::LParen)) => {
                let inner = self.parse_or()?;
                match self.next() {
                    Some((_, Token::RParen)) => Ok(inner),
                    Some((offset, token)) => Err(FilterParseError::Unexpected {
                        offset,
                        found: token.describe(),
                    }),
                    None => Err(FilterParseError::UnexpectedEnd),
                }
            }
            Some((_, Token::Word(field))) => self.parse_comparison(field),
            Some((offset, token)) => Err(FilterParseError::Unexpected {
                offset,
                found: token.describe(),
            }),
            None => Err(FilterParseError::UnexpectedEnd),
        }
    }

    fn parse_comparison(&mut self, field: String) -> Result<Filter, FilterParseError> {
        let (op_offset, op_word) = match self.next() {
            Some((offset, Token::Word(w))) => (offset, w),
            Some((offset, token)) => {
                return Err(FilterParseError::Unexpected {
                    offset,
                    found: token.describe(),
                });
            }
            None => return Err(FilterParseError::UnexpectedEnd),
        };
        if op_word.eq_ignore_ascii_case("pr") {
            return Ok(Filter::Present(field));
        }
        let op = CompareOp::from_keyword(&op_word).ok_or(FilterParseError::Unexpected {
            offset: op_offset,
            found: op_word,
        })?;
        let value = match self.next() {
            Some((_, Token::Literal(value))) => value,
            // bare words in literal position: true / false / null
            Some((offset, Token::Word(w))) => match w.to_ascii_lowercase().as_str() {
                "true" => Value::Bool(true),
                "false" => Value::Bool(false),
                "null" => Value::Null,
                _ => {
                    return Err(FilterParseError::Unexpected { offset, found: w });
                }
            },
            Some((offset, token)) => {
                return Err(FilterParseError::Unexpected {
                    offset,
                    found: token.describe(),
                });
            }
            None => return Err(FilterParseError::UnexpectedEnd),
        };
        Ok(Filter::Compare { field, op, value })
    }
}
