//! Filter formula construction for equality lookups.
//!
//! [`conjunction`] builds the `filterByFormula` expression used by
//! `find_by`/`first`: one `{column} = literal` clause per field, joined with
//! `AND(...)` when there is more than one. Clauses are sorted by column name
//! so the text is the same whatever order the caller passed them in.
//!
//! | JSON value | Formula literal |
//! |------------|-----------------|
//! | string | `'text'` (`\` and `'` escaped) |
//! | number | as written |
//! | `true` / `false` | `TRUE()` / `FALSE()` |
//! | `null` | `BLANK()` |
//!
//! [`parse_conjunction`] reads back exactly the formulas this module writes;
//! the in-memory service uses it to evaluate filters.

use serde_json::{Number, Value};

use crate::error::{Error, Result};

/// Render a JSON value as a formula literal.
pub fn literal(field: &str, value: &Value) -> Result<String> {
    match value {
        Value::String(s) => Ok(quote(s)),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(true) => Ok("TRUE()".to_string()),
        Value::Bool(false) => Ok("FALSE()".to_string()),
        Value::Null => Ok("BLANK()".to_string()),
        Value::Array(_) | Value::Object(_) => Err(Error::validation(
            field,
            "only strings, numbers, booleans and null can be used in an equality filter",
        )),
    }
}

/// Single-quote a string, escaping backslashes and quotes.
pub fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for c in s.chars() {
        if c == '\\' || c == '\'' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('\'');
    out
}

/// `{column} = literal`.
pub fn equals(column: &str, value: &Value) -> Result<String> {
    Ok(format!("{{{}}} = {}", column, literal(column, value)?))
}

/// Conjoin one equality clause per `(column, value)` pair.
///
/// Returns `None` for an empty list (no filter).
pub fn conjunction(pairs: &[(String, Value)]) -> Result<Option<String>> {
    let mut sorted: Vec<&(String, Value)> = pairs.iter().collect();
    sorted.sort_by(|a, b| a.0.cmp(&b.0));

    let clauses = sorted
        .into_iter()
        .map(|(column, value)| equals(column, value))
        .collect::<Result<Vec<_>>>()?;

    Ok(match clauses.len() {
        0 => None,
        1 => clauses.into_iter().next(),
        _ => Some(format!("AND({})", clauses.join(", "))),
    })
}

/// Parse a formula produced by [`conjunction`] back into `(column, value)` pairs.
///
/// Returns `None` for anything else.
pub fn parse_conjunction(formula: &str) -> Option<Vec<(String, Value)>> {
    let formula = formula.trim();
    let body = match formula.strip_prefix("AND(") {
        Some(rest) => rest.strip_suffix(')')?,
        None => formula,
    };

    let mut parser = Parser {
        chars: body.chars().collect(),
        pos: 0,
    };
    let mut pairs = Vec::new();
    loop {
        parser.skip_ws();
        pairs.push(parser.clause()?);
        parser.skip_ws();
        if parser.at_end() {
            return Some(pairs);
        }
        parser.expect(',')?;
    }
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
}

impl Parser {
    fn at_end(&self) -> bool {
        self.pos >= self.chars.len()
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        Some(c)
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.pos += 1;
        }
    }

    fn expect(&mut self, c: char) -> Option<()> {
        (self.bump()? == c).then_some(())
    }

    fn eat(&mut self, s: &str) -> bool {
        let end = self.pos + s.chars().count();
        if end <= self.chars.len() && self.chars[self.pos..end].iter().copied().eq(s.chars()) {
            self.pos = end;
            true
        } else {
            false
        }
    }

    fn clause(&mut self) -> Option<(String, Value)> {
        self.expect('{')?;
        let mut column = String::new();
        loop {
            match self.bump()? {
                '}' => break,
                c => column.push(c),
            }
        }
        self.skip_ws();
        self.expect('=')?;
        self.skip_ws();
        Some((column, self.value()?))
    }

    fn value(&mut self) -> Option<Value> {
        if self.eat("TRUE()") {
            return Some(Value::Bool(true));
        }
        if self.eat("FALSE()") {
            return Some(Value::Bool(false));
        }
        if self.eat("BLANK()") {
            return Some(Value::Null);
        }
        if self.peek()? == '\'' {
            self.bump();
            let mut s = String::new();
            loop {
                match self.bump()? {
                    '\\' => s.push(self.bump()?),
                    '\'' => return Some(Value::String(s)),
                    c => s.push(c),
                }
            }
        }

        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_ascii_digit() || matches!(c, '-' | '+' | '.' | 'e' | 'E'))
        {
            self.pos += 1;
        }
        let text: String = self.chars[start..self.pos].iter().collect();
        if let Ok(i) = text.parse::<i64>() {
            return Some(Value::Number(i.into()));
        }
        let f = text.parse::<f64>().ok()?;
        Number::from_f64(f).map(Value::Number)
    }
}
