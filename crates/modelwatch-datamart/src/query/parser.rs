//! Recursive-descent parser for textual queries.
//!
//! Grammar, loosest binding first:
//!
//! ```text
//! or      := and (("or" | "||") and)*
//! and     := not (("and" | "&&") not)*
//! not     := ("not" | "!") not | cmp
//! cmp     := sum (cmp_op sum | ["not"] "in" list | "is" ["not"] "null")?
//! sum     := product (("+" | "-") product)*
//! product := unary (("*" | "/") unary)*
//! unary   := "-" unary | atom
//! atom    := number | string | "true" | "false" | "null"
//!          | identifier | `quoted identifier` | "(" or ")"
//! list    := ("[" | "(") [literal ("," literal)*] ("]" | ")")
//! ```
//!
//! Keywords are case-insensitive. Strings take single or double quotes.

use modelwatch_core::errors::QueryError;
use polars::prelude::*;

/// Parse `text` into a boolean predicate.
pub fn parse_query(text: &str) -> Result<Expr, QueryError> {
    let tokens = tokenize(text)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        end: text.len(),
    };
    let expr = parser.or()?;
    match parser.peek() {
        None => Ok(expr),
        Some(token) => Err(parser.error_at(token.offset, format!("unexpected {}", token.kind))),
    }
}

/// A literal value in query text.
#[derive(Debug, Clone, PartialEq)]
enum Literal {
    Bool(bool),
    Null,
    Str(String),
    Int(i64),
    Float(f64),
}

impl Literal {
    fn into_expr(self) -> Expr {
        match self {
            Literal::Bool(v) => lit(v),
            Literal::Null => lit(NULL),
            Literal::Str(v) => lit(v),
            Literal::Int(v) => lit(v),
            Literal::Float(v) => lit(v),
        }
    }
}

/// `left in values`. Text lists compare as text; numeric lists widen to
/// float when any member is fractional.
fn membership(left: Expr, values: Vec<Literal>) -> Result<Expr, String> {
    let name = PlSmallStr::from_static("values");
    let present: Vec<Literal> = values
        .into_iter()
        .filter(|v| *v != Literal::Null)
        .collect();
    if present.iter().all(|v| matches!(v, Literal::Str(_))) {
        let items: Vec<String> = present
            .into_iter()
            .filter_map(|v| match v {
                Literal::Str(s) => Some(s),
                _ => None,
            })
            .collect();
        return Ok(left
            .cast(DataType::String)
            .is_in(lit(Series::new(name, items))));
    }
    if present.iter().all(|v| matches!(v, Literal::Int(_))) {
        let items: Vec<i64> = present
            .iter()
            .filter_map(|v| match v {
                Literal::Int(i) => Some(*i),
                _ => None,
            })
            .collect();
        return Ok(left.is_in(lit(Series::new(name, items))));
    }
    if present
        .iter()
        .all(|v| matches!(v, Literal::Int(_) | Literal::Float(_)))
    {
        let items: Vec<f64> = present
            .iter()
            .filter_map(|v| match v {
                Literal::Int(i) => Some(*i as f64),
                Literal::Float(f) => Some(*f),
                _ => None,
            })
            .collect();
        return Ok(left
            .cast(DataType::Float64)
            .is_in(lit(Series::new(name, items))));
    }
    if present.iter().all(|v| matches!(v, Literal::Bool(_))) {
        let items: Vec<bool> = present
            .iter()
            .filter_map(|v| match v {
                Literal::Bool(b) => Some(*b),
                _ => None,
            })
            .collect();
        return Ok(left.is_in(lit(Series::new(name, items))));
    }
    Err("list mixes value types".to_string())
}

#[derive(Debug, Clone, PartialEq)]
enum Kind {
    Ident(String),
    Str(String),
    Int(i64),
    Float(f64),
    Symbol(&'static str),
}

impl std::fmt::Display for Kind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Kind::Ident(name) => write!(f, "identifier '{name}'"),
            Kind::Str(s) => write!(f, "string {s:?}"),
            Kind::Int(v) => write!(f, "number {v}"),
            Kind::Float(v) => write!(f, "number {v}"),
            Kind::Symbol(s) => write!(f, "'{s}'"),
        }
    }
}

#[derive(Debug, Clone)]
struct Token {
    kind: Kind,
    offset: usize,
    /// Back-quoted identifiers are never keywords.
    quoted: bool,
}

const SYMBOLS: &[&str] = &[
    "==", "!=", "<=", ">=", "&&", "||", "<", ">", "+", "-", "*", "/", "(", ")", "[", "]", ",", "!",
];

fn parse_error(position: usize, message: impl Into<String>) -> QueryError {
    QueryError::Parse {
        position,
        message: message.into(),
    }
}

fn tokenize(text: &str) -> Result<Vec<Token>, QueryError> {
    let bytes = text.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i];
        if c.is_ascii_whitespace() {
            i += 1;
            continue;
        }
        let start = i;

        if c == b'"' || c == b'\'' || c == b'`' {
            let close = text[i + 1..]
                .find(c as char)
                .ok_or_else(|| parse_error(start, "unterminated quote"))?;
            let body = text[i + 1..i + 1 + close].to_string();
            i += close + 2;
            let (kind, quoted) = if c == b'`' {
                (Kind::Ident(body), true)
            } else {
                (Kind::Str(body), false)
            };
            tokens.push(Token {
                kind,
                offset: start,
                quoted,
            });
            continue;
        }

        if c.is_ascii_digit() || (c == b'.' && bytes.get(i + 1).is_some_and(u8::is_ascii_digit)) {
            while i < bytes.len() && (bytes[i].is_ascii_digit() || bytes[i] == b'.') {
                i += 1;
            }
            if i < bytes.len() && (bytes[i] == b'e' || bytes[i] == b'E') {
                let mut j = i + 1;
                if j < bytes.len() && (bytes[j] == b'+' || bytes[j] == b'-') {
                    j += 1;
                }
                if j < bytes.len() && bytes[j].is_ascii_digit() {
                    i = j;
                    while i < bytes.len() && bytes[i].is_ascii_digit() {
                        i += 1;
                    }
                }
            }
            let literal = &text[start..i];
            let kind = match literal.parse::<i64>() {
                Ok(v) => Kind::Int(v),
                Err(_) => Kind::Float(
                    literal
                        .parse::<f64>()
                        .map_err(|_| parse_error(start, format!("invalid number '{literal}'")))?,
                ),
            };
            tokens.push(Token {
                kind,
                offset: start,
                quoted: false,
            });
            continue;
        }

        if c.is_ascii_alphabetic() || c == b'_' {
            while i < bytes.len() && is_identifier_byte(bytes[i]) {
                i += 1;
            }
            tokens.push(Token {
                kind: Kind::Ident(text[start..i].to_string()),
                offset: start,
                quoted: false,
            });
            continue;
        }

        match SYMBOLS.iter().find(|s| text[i..].starts_with(**s)) {
            Some(symbol) => {
                i += symbol.len();
                tokens.push(Token {
                    kind: Kind::Symbol(*symbol),
                    offset: start,
                    quoted: false,
                });
            }
            None => {
                let ch = text[i..].chars().next().unwrap_or('?');
                return Err(parse_error(start, format!("unexpected character '{ch}'")));
            }
        }
    }
    Ok(tokens)
}

fn is_identifier_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'.'
}

fn is_keyword(token: Option<&Token>, keyword: &str) -> bool {
    match token {
        Some(Token {
            kind: Kind::Ident(name),
            quoted: false,
            ..
        }) => name.eq_ignore_ascii_case(keyword),
        _ => false,
    }
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    end: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn error_at(&self, position: usize, message: impl Into<String>) -> QueryError {
        parse_error(position, message)
    }

    fn offset(&self) -> usize {
        self.peek().map_or(self.end, |t| t.offset)
    }

    fn at_symbol(&self, symbol: &str) -> bool {
        matches!(self.peek(), Some(Token { kind: Kind::Symbol(s), .. }) if *s == symbol)
    }

    fn at_keyword(&self, keyword: &str) -> bool {
        is_keyword(self.peek(), keyword)
    }

    fn eat_symbol(&mut self, symbol: &str) -> bool {
        let hit = self.at_symbol(symbol);
        if hit {
            self.pos += 1;
        }
        hit
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        let hit = self.at_keyword(keyword);
        if hit {
            self.pos += 1;
        }
        hit
    }

    fn expect_symbol(&mut self, symbol: &str) -> Result<(), QueryError> {
        if self.eat_symbol(symbol) {
            Ok(())
        } else {
            Err(self.error_at(self.offset(), format!("expected '{symbol}'")))
        }
    }

    fn or(&mut self) -> Result<Expr, QueryError> {
        let mut expr = self.and()?;
        while self.eat_keyword("or") || self.eat_symbol("||") {
            expr = expr.or(self.and()?);
        }
        Ok(expr)
    }

    fn and(&mut self) -> Result<Expr, QueryError> {
        let mut expr = self.not()?;
        while self.eat_keyword("and") || self.eat_symbol("&&") {
            expr = expr.and(self.not()?);
        }
        Ok(expr)
    }

    fn not(&mut self) -> Result<Expr, QueryError> {
        if self.eat_keyword("not") || self.eat_symbol("!") {
            return Ok(self.not()?.not());
        }
        self.comparison()
    }

    fn comparison(&mut self) -> Result<Expr, QueryError> {
        let left = self.sum()?;

        if self.eat_keyword("is") {
            let negated = self.eat_keyword("not");
            if !self.eat_keyword("null") {
                return Err(self.error_at(self.offset(), "expected 'null' after 'is'"));
            }
            return Ok(if negated { left.is_not_null() } else { left.is_null() });
        }
        if self.at_keyword("not") {
            let next_is_in = is_keyword(self.tokens.get(self.pos + 1), "in");
            if next_is_in {
                self.pos += 2;
                return Ok(self.membership(left)?.not());
            }
        }
        if self.eat_keyword("in") {
            return self.membership(left);
        }

        let op = match self.peek() {
            Some(Token { kind: Kind::Symbol(s), .. }) => *s,
            _ => return Ok(left),
        };
        let build: fn(Expr, Expr) -> Expr = match op {
            "==" => |a, b| a.eq(b),
            "!=" => |a, b| a.neq(b),
            "<" => |a, b| a.lt(b),
            "<=" => |a, b| a.lt_eq(b),
            ">" => |a, b| a.gt(b),
            ">=" => |a, b| a.gt_eq(b),
            _ => return Ok(left),
        };
        self.pos += 1;
        Ok(build(left, self.sum()?))
    }

    fn sum(&mut self) -> Result<Expr, QueryError> {
        let mut expr = self.product()?;
        loop {
            if self.eat_symbol("+") {
                expr = expr + self.product()?;
            } else if self.eat_symbol("-") {
                expr = expr - self.product()?;
            } else {
                return Ok(expr);
            }
        }
    }

    fn product(&mut self) -> Result<Expr, QueryError> {
        let mut expr = self.unary()?;
        loop {
            if self.eat_symbol("*") {
                expr = expr * self.unary()?;
            } else if self.eat_symbol("/") {
                expr = expr / self.unary()?;
            } else {
                return Ok(expr);
            }
        }
    }

    fn unary(&mut self) -> Result<Expr, QueryError> {
        if self.eat_symbol("-") {
            let negated = match self.peek() {
                Some(Token { kind: Kind::Int(v), .. }) => Some(lit(-*v)),
                Some(Token { kind: Kind::Float(v), .. }) => Some(lit(-*v)),
                _ => None,
            };
            if let Some(expr) = negated {
                self.pos += 1;
                return Ok(expr);
            }
            return Ok(lit(0) - self.unary()?);
        }
        self.atom()
    }

    fn atom(&mut self) -> Result<Expr, QueryError> {
        if self.eat_symbol("(") {
            let expr = self.or()?;
            self.expect_symbol(")")?;
            return Ok(expr);
        }
        if let Some(value) = self.literal()? {
            return Ok(value.into_expr());
        }
        let offset = self.offset();
        match self.peek().cloned() {
            Some(Token {
                kind: Kind::Ident(name),
                ..
            }) => {
                self.pos += 1;
                Ok(col(name))
            }
            Some(token) => Err(self.error_at(offset, format!("unexpected {}", token.kind))),
            None => Err(self.error_at(offset, "unexpected end of query")),
        }
    }

    /// A literal value, if the next token is one. Reserved words and strings
    /// count; bare identifiers do not.
    fn literal(&mut self) -> Result<Option<Literal>, QueryError> {
        if self.eat_keyword("true") {
            return Ok(Some(Literal::Bool(true)));
        }
        if self.eat_keyword("false") {
            return Ok(Some(Literal::Bool(false)));
        }
        if self.eat_keyword("null") {
            return Ok(Some(Literal::Null));
        }
        let value = match self.peek() {
            Some(Token { kind: Kind::Str(s), .. }) => Literal::Str(s.clone()),
            Some(Token { kind: Kind::Int(v), .. }) => Literal::Int(*v),
            Some(Token { kind: Kind::Float(v), .. }) => Literal::Float(*v),
            _ => return Ok(None),
        };
        self.pos += 1;
        Ok(Some(value))
    }

    fn membership(&mut self, left: Expr) -> Result<Expr, QueryError> {
        let offset = self.offset();
        let values = self.list()?;
        membership(left, values).map_err(|message| self.error_at(offset, message))
    }

    fn list(&mut self) -> Result<Vec<Literal>, QueryError> {
        let close = if self.eat_symbol("[") {
            "]"
        } else if self.eat_symbol("(") {
            ")"
        } else {
            return Err(self.error_at(self.offset(), "expected a list"));
        };
        let mut values = Vec::new();
        if self.eat_symbol(close) {
            return Ok(values);
        }
        loop {
            let negative = self.eat_symbol("-");
            let value = self
                .literal()?
                .ok_or_else(|| self.error_at(self.offset(), "expected a literal"))?;
            values.push(match (negative, value) {
                (true, Literal::Int(v)) => Literal::Int(-v),
                (true, Literal::Float(v)) => Literal::Float(-v),
                (true, _) => {
                    return Err(self.error_at(self.offset(), "only numbers can be negated"))
                }
                (false, value) => value,
            });
            if self.eat_symbol(close) {
                return Ok(values);
            }
            self.expect_symbol(",")?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use modelwatch_core::frame::referenced_columns;

    #[test]
    fn precedence_binds_and_tighter_than_or() {
        let expr = parse_query("a == 1 or b == 2 and c == 3").unwrap();
        let expected = col("a")
            .eq(lit(1))
            .or(col("b").eq(lit(2)).and(col("c").eq(lit(3))));
        assert_eq!(format!("{expr:?}"), format!("{expected:?}"));
    }

    #[test]
    fn membership_and_null_tests() {
        let expr = parse_query("Channel in ['Email', \"SMS\"] and Issue is not null").unwrap();
        assert_eq!(referenced_columns(&expr), vec!["Channel", "Issue"]);
        let expr = parse_query("Channel not in ('Web')").unwrap();
        assert_eq!(referenced_columns(&expr), vec!["Channel"]);
    }

    #[test]
    fn back_quoted_identifiers_are_columns() {
        let expr = parse_query("`not` > -1.5").unwrap();
        assert_eq!(referenced_columns(&expr), vec!["not"]);
    }

    #[test]
    fn reports_offset_of_bad_token() {
        match parse_query("Positives > ") {
            Err(QueryError::Parse { position, .. }) => assert_eq!(position, 12),
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(parse_query("a = 1"), Err(QueryError::Parse { position: 2, .. })));
        assert!(matches!(parse_query("'open"), Err(QueryError::Parse { position: 0, .. })));
    }

    #[test]
    fn mixed_lists_are_rejected_at_the_list() {
        assert!(matches!(
            parse_query("Channel in ['Web', 1]"),
            Err(QueryError::Parse { position: 11, .. })
        ));
    }

    #[test]
    fn parsed_filters_run_against_frames() {
        let df = polars::df![
            "Channel" => ["Web", "Email", "SMS"],
            "Positives" => [5i64, 0, 12],
        ]
        .unwrap();
        let out = df
            .lazy()
            .filter(parse_query("Channel in ('Web', 'SMS') and Positives >= -1 + 6").unwrap())
            .collect()
            .unwrap();
        assert_eq!(out.height(), 2);
    }
}
