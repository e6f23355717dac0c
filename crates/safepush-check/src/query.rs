//! A small jq-like query language over JSON outputs.
//!
//! ```text
//! query  := and ("or" and)*
//! and    := clause ("and" clause)*
//! clause := path ("|" "length")? (op literal)?
//! path   := "." | segment+
//! segment:= "." ident | "." string | "[" int "]" | ".[" int "]"
//! op     := "==" | "!=" | "<" | "<=" | ">" | ">="
//! ```
//!
//! Missing keys and out-of-range indices yield `null`, like jq.

use std::cmp::Ordering;
use std::fmt;

use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("at offset {pos}: {message}")]
pub struct QueryError {
    pub pos: usize,
    pub message: String,
}

#[derive(Clone, Debug, PartialEq)]
enum Segment {
    Key(String),
    Index(i64),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Clone, Debug, PartialEq)]
struct Clause {
    path: Vec<Segment>,
    length: bool,
    comparison: Option<(CmpOp, Value)>,
}

/// A parsed query: a disjunction of conjunctions of clauses.
#[derive(Clone, Debug, PartialEq)]
pub struct Query {
    source: String,
    any_of: Vec<Vec<Clause>>,
}

impl Query {
    pub fn parse(source: &str) -> Result<Self, QueryError> {
        let mut p = Parser { src: source, pos: 0 };
        let any_of = p.query()?;
        p.skip_ws();
        if p.pos < source.len() {
            return Err(p.error("unexpected trailing input"));
        }
        Ok(Self {
            source: source.to_string(),
            any_of,
        })
    }

    /// Value the query produces for `input`. A bare path yields the selected
    /// value; anything with a comparison or boolean operator yields a bool.
    pub fn evaluate(&self, input: &Value) -> Value {
        if let [conj] = self.any_of.as_slice() {
            if let [clause] = conj.as_slice() {
                return clause.evaluate(input);
            }
        }
        let result = self
            .any_of
            .iter()
            .any(|conj| conj.iter().all(|clause| is_truthy(&clause.evaluate(input))));
        Value::Bool(result)
    }

    /// Passes iff the result is neither `null` nor `false`.
    pub fn matches(&self, input: &Value) -> bool {
        is_truthy(&self.evaluate(input))
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

pub fn is_truthy(v: &Value) -> bool {
    !matches!(v, Value::Null | Value::Bool(false))
}

impl Clause {
    fn evaluate(&self, input: &Value) -> Value {
        let mut current = select(input, &self.path);
        if self.length {
            current = length(&current);
        }
        match &self.comparison {
            Some((op, rhs)) => Value::Bool(compare(&current, *op, rhs)),
            None => current,
        }
    }
}

fn select(input: &Value, path: &[Segment]) -> Value {
    let mut current = input;
    for segment in path {
        let next = match (segment, current) {
            (Segment::Key(k), Value::Object(map)) => map.get(k),
            (Segment::Index(i), Value::Array(items)) => {
                let idx = if *i < 0 { items.len() as i64 + i } else { *i };
                usize::try_from(idx).ok().and_then(|idx| items.get(idx))
            }
            _ => None,
        };
        match next {
            Some(v) => current = v,
            None => return Value::Null,
        }
    }
    current.clone()
}

fn length(v: &Value) -> Value {
    match v {
        Value::Null => Value::from(0),
        Value::String(s) => Value::from(s.chars().count()),
        Value::Array(items) => Value::from(items.len()),
        Value::Object(map) => Value::from(map.len()),
        Value::Number(n) => n.as_f64().map(f64::abs).map_or(Value::Null, Value::from),
        Value::Bool(_) => Value::Null,
    }
}

fn compare(lhs: &Value, op: CmpOp, rhs: &Value) -> bool {
    let ordering = match (lhs, rhs) {
        (Value::Number(a), Value::Number(b)) => a.as_f64().zip(b.as_f64()).and_then(|(a, b)| a.partial_cmp(&b)),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (a, b) if a == b => Some(Ordering::Equal),
        _ => None,
    };
    match op {
        CmpOp::Eq => ordering == Some(Ordering::Equal),
        CmpOp::Ne => ordering != Some(Ordering::Equal),
        CmpOp::Lt => ordering == Some(Ordering::Less),
        CmpOp::Le => matches!(ordering, Some(Ordering::Less | Ordering::Equal)),
        CmpOp::Gt => ordering == Some(Ordering::Greater),
        CmpOp::Ge => matches!(ordering, Some(Ordering::Greater | Ordering::Equal)),
    }
}

struct Parser<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn error(&self, message: impl Into<String>) -> QueryError {
        QueryError {
            pos: self.pos,
            message: message.into(),
        }
    }

    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn skip_ws(&mut self) {
        let trimmed = self.rest().trim_start();
        self.pos = self.src.len() - trimmed.len();
    }

    fn eat(&mut self, token: &str) -> bool {
        if self.rest().starts_with(token) {
            self.pos += token.len();
            true
        } else {
            false
        }
    }

    /// Consumes a keyword only when it is not the prefix of a longer identifier.
    fn eat_keyword(&mut self, kw: &str) -> bool {
        let rest = self.rest();
        if !rest.starts_with(kw) {
            return false;
        }
        let boundary = rest[kw.len()..].chars().next().map_or(true, |c| !is_ident_char(c));
        if boundary {
            self.pos += kw.len();
        }
        boundary
    }

    fn query(&mut self) -> Result<Vec<Vec<Clause>>, QueryError> {
        let mut any_of = vec![self.conjunction()?];
        loop {
            self.skip_ws();
            if !self.eat_keyword("or") {
                return Ok(any_of);
            }
            any_of.push(self.conjunction()?);
        }
    }

    fn conjunction(&mut self) -> Result<Vec<Clause>, QueryError> {
        let mut all_of = vec![self.clause()?];
        loop {
            self.skip_ws();
            if !self.eat_keyword("and") {
                return Ok(all_of);
            }
            all_of.push(self.clause()?);
        }
    }

    fn clause(&mut self) -> Result<Clause, QueryError> {
        self.skip_ws();
        let path = self.path()?;

        self.skip_ws();
        let mut length = false;
        if self.eat("|") {
            self.skip_ws();
            if !self.eat_keyword("length") {
                return Err(self.error("expected `length` after `|`"));
            }
            length = true;
            self.skip_ws();
        }

        let op = if self.eat("==") {
            Some(CmpOp::Eq)
        } else if self.eat("!=") {
            Some(CmpOp::Ne)
        } else if self.eat("<=") {
            Some(CmpOp::Le)
        } else if self.eat(">=") {
            Some(CmpOp::Ge)
        } else if self.eat("<") {
            Some(CmpOp::Lt)
        } else if self.eat(">") {
            Some(CmpOp::Gt)
        } else {
            None
        };

        let comparison = match op {
            Some(op) => Some((op, self.literal()?)),
            None => None,
        };
        Ok(Clause {
            path,
            length,
            comparison,
        })
    }

    fn path(&mut self) -> Result<Vec<Segment>, QueryError> {
        if !matches!(self.peek(), Some('.') | Some('[')) {
            return Err(self.error("query must start with `.`"));
        }
        let mut segments = Vec::new();
        loop {
            match self.peek() {
                Some('.') => {
                    self.pos += 1;
                    match self.peek() {
                        Some('"') => segments.push(Segment::Key(self.quoted()?)),
                        Some('[') => {}
                        Some(c) if is_ident_start(c) => segments.push(Segment::Key(self.ident())),
                        // Bare `.` is identity; anything else ends the path.
                        _ if segments.is_empty() => return Ok(segments),
                        _ => return Err(self.error("expected key after `.`")),
                    }
                }
                Some('[') => {
                    self.pos += 1;
                    segments.push(Segment::Index(self.index()?));
                    if !self.eat("]") {
                        return Err(self.error("expected `]`"));
                    }
                }
                _ => return Ok(segments),
            }
        }
    }

    fn ident(&mut self) -> String {
        let len = self
            .rest()
            .char_indices()
            .find(|(_, c)| !is_ident_char(*c))
            .map_or(self.rest().len(), |(i, _)| i);
        let ident = self.rest()[..len].to_string();
        self.pos += len;
        ident
    }

    fn quoted(&mut self) -> Result<String, QueryError> {
        match self.json_value()? {
            Value::String(s) => Ok(s),
            _ => Err(self.error("expected quoted key")),
        }
    }

    fn index(&mut self) -> Result<i64, QueryError> {
        self.skip_ws();
        let len = self
            .rest()
            .char_indices()
            .find(|(i, c)| !(c.is_ascii_digit() || (*i == 0 && *c == '-')))
            .map_or(self.rest().len(), |(i, _)| i);
        let idx = self.rest()[..len]
            .parse::<i64>()
            .map_err(|_| self.error("expected integer index"))?;
        self.pos += len;
        self.skip_ws();
        Ok(idx)
    }

    fn literal(&mut self) -> Result<Value, QueryError> {
        self.skip_ws();
        self.json_value()
    }

    /// Reads one JSON value from the current position.
    fn json_value(&mut self) -> Result<Value, QueryError> {
        let mut stream = serde_json::Deserializer::from_str(self.rest()).into_iter::<Value>();
        match stream.next() {
            Some(Ok(v)) => {
                self.pos += stream.byte_offset();
                Ok(v)
            }
            Some(Err(e)) => Err(self.error(format!("invalid literal: {e}"))),
            None => Err(self.error("expected literal")),
        }
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn eval(q: &str, v: Value) -> Value {
        Query::parse(q).unwrap().evaluate(&v)
    }

    #[test]
    fn identity_and_paths() {
        assert_eq!(eval(".", json!({"a": 1})), json!({"a": 1}));
        assert_eq!(eval(".a.b", json!({"a": {"b": "x"}})), json!("x"));
        assert_eq!(eval(".items[1]", json!({"items": [1, 2, 3]})), json!(2));
        assert_eq!(eval(".items[-1]", json!({"items": [1, 2, 3]})), json!(3));
        assert_eq!(eval(".[0].name", json!([{"name": "n"}])), json!("n"));
        assert_eq!(eval(".\"odd key\"", json!({"odd key": true})), json!(true));
        assert_eq!(eval(".missing.deeper", json!({})), Value::Null);
    }

    #[test]
    fn length_and_comparisons() {
        assert_eq!(eval(".text | length > 3", json!({"text": "hello"})), json!(true));
        assert_eq!(eval(".items | length == 0", json!({"items": []})), json!(true));
        assert_eq!(eval(".score >= 0.5", json!({"score": 0.5})), json!(true));
        assert_eq!(eval(".n == 1.0", json!({"n": 1})), json!(true));
        assert_eq!(eval(".label != \"cat\"", json!({"label": "dog"})), json!(true));
        assert_eq!(eval(".label < 3", json!({"label": "dog"})), json!(false));
    }

    #[test]
    fn and_binds_tighter_than_or() {
        let q = Query::parse(".a == 1 or .b == 1 and .c == 1").unwrap();
        assert!(q.matches(&json!({"a": 1, "b": 0, "c": 0})));
        assert!(!q.matches(&json!({"a": 0, "b": 1, "c": 0})));
        assert!(q.matches(&json!({"a": 0, "b": 1, "c": 1})));
    }

    #[test]
    fn keywords_need_boundaries() {
        let q = Query::parse(".android and .orange").unwrap();
        assert!(q.matches(&json!({"android": 1, "orange": 2})));
        assert!(!q.matches(&json!({"android": 1})));
    }

    #[test]
    fn truthiness() {
        assert!(!Query::parse(".ok").unwrap().matches(&json!({"ok": false})));
        assert!(!Query::parse(".ok").unwrap().matches(&json!({})));
        assert!(Query::parse(".ok").unwrap().matches(&json!({"ok": 0})));
    }

    #[test]
    fn parse_errors() {
        assert!(Query::parse("a").is_err());
        assert!(Query::parse(".a ==").is_err());
        assert!(Query::parse(".a | keys").is_err());
        assert!(Query::parse(".a[x]").is_err());
        assert!(Query::parse(".a ) ").is_err());
        assert!(Query::parse(".a.").is_err());
    }
}
