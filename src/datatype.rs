// used for persistence
use rusqlite::types::{FromSql, FromSqlResult, ToSql, ToSqlOutput, ValueRef};

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

// custom made ordering for stored values
use std::cmp::Ordering;
use std::collections::BTreeMap;
// used to print out readable forms of a value
use std::fmt;

/// A row maps column names to scalar values. Ordered so that rows compare and
/// print the same way regardless of how they were assembled.
pub type Row = BTreeMap<String, Value>;

/// Builds a [`Row`] from `column => value` pairs.
///
/// ```
/// use tempora::{row, datatype::Value};
/// let r = row! { "name" => "Alice", "age" => 35 };
/// assert_eq!(r["age"], Value::Integer(35));
/// ```
#[macro_export]
macro_rules! row {
    () => { $crate::datatype::Row::new() };
    ($($column:expr => $value:expr),+ $(,)?) => {{
        let mut row = $crate::datatype::Row::new();
        $( row.insert(String::from($column), $crate::datatype::Value::from($value)); )+
        row
    }};
}

// ------------- Value -------------
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Integer(i64),
    Float(f64),
    Text(String),
    Null,
}

/// The numeric reading of a stored value.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Numeric {
    Int(i64),
    Real(f64),
}

lazy_static! {
    // the longest prefix that still reads as a number, the way SQLite casts text
    static ref NUMERIC_PREFIX: Regex =
        Regex::new(r"^[+-]?(\d+(\.\d*)?|\.\d+)([eE][+-]?\d+)?").unwrap();
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
    pub fn is_textual(&self) -> bool {
        matches!(self, Value::Text(_))
    }
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }
    /// Text form used for lexicographic comparisons; `None` for null.
    pub fn as_text(&self) -> Option<String> {
        match self {
            Value::Integer(i) => Some(i.to_string()),
            Value::Float(f) => Some(float_text(*f)),
            Value::Text(s) => Some(s.clone()),
            Value::Null => None,
        }
    }
    /// Numeric form used for ordinal comparisons; text that does not start
    /// with a number reads as zero. `None` for null.
    pub fn as_numeric(&self) -> Option<Numeric> {
        match self {
            Value::Integer(i) => Some(Numeric::Int(*i)),
            Value::Float(f) => Some(Numeric::Real(*f)),
            Value::Text(s) => Some(numeric_prefix(s)),
            Value::Null => None,
        }
    }
    /// Reads the value as an id: only positive integers (or integral text) qualify.
    pub fn as_id(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            Value::Text(s) => s.trim().parse::<i64>().ok(),
            Value::Float(f) if f.fract() == 0.0 && f.is_finite() => Some(*f as i64),
            _ => None,
        }
    }
}

/// Renders a float the way SQLite casts a real to text: fifteen significant
/// digits, trailing zeros dropped, and always a fractional part or exponent.
pub fn float_text(f: f64) -> String {
    if f.is_nan() {
        return "NaN".to_string();
    }
    if f.is_infinite() {
        return if f > 0.0 { "Inf" } else { "-Inf" }.to_string();
    }
    // rounded to 15 significant digits, e.g. "3.33333333333333e-1"
    let scientific = format!("{:.14e}", f.abs());
    let (mantissa, exponent) = scientific.split_once('e').unwrap_or((scientific.as_str(), "0"));
    let exponent: i32 = exponent.parse().unwrap_or(0);
    let digits: String = mantissa.chars().filter(char::is_ascii_digit).collect();
    let digits = digits.trim_end_matches('0');
    let digits = if digits.is_empty() { "0" } else { digits };
    let sign = if f.is_sign_negative() && f != 0.0 { "-" } else { "" };

    if !(-4..15).contains(&exponent) {
        let (lead, rest) = digits.split_at(1);
        let rest = if rest.is_empty() { "0" } else { rest };
        let exponent_sign = if exponent < 0 { '-' } else { '+' };
        return format!("{sign}{lead}.{rest}e{exponent_sign}{:02}", exponent.abs());
    }
    if exponent < 0 {
        let zeros = "0".repeat((-exponent - 1) as usize);
        return format!("{sign}0.{zeros}{digits}");
    }
    let whole = exponent as usize + 1;
    let padded = format!("{digits:0<whole$}");
    let (integral, fraction) = padded.split_at(whole);
    let fraction = if fraction.is_empty() { "0" } else { fraction };
    format!("{sign}{integral}.{fraction}")
}

fn numeric_prefix(s: &str) -> Numeric {
    let trimmed = s.trim_start();
    match NUMERIC_PREFIX.find(trimmed) {
        Some(m) => {
            let literal = m.as_str();
            let integral = !literal.contains(['.', 'e', 'E']);
            match (integral, literal.parse::<i64>()) {
                (true, Ok(i)) => Numeric::Int(i),
                _ => Numeric::Real(literal.parse::<f64>().unwrap_or(0.0)),
            }
        }
        None => Numeric::Int(0),
    }
}

impl Numeric {
    pub fn compare(&self, other: &Numeric) -> Option<Ordering> {
        match (self, other) {
            (Numeric::Int(a), Numeric::Int(b)) => Some(a.cmp(b)),
            (a, b) => a.as_f64().partial_cmp(&b.as_f64()),
        }
    }
    fn as_f64(&self) -> f64 {
        match self {
            Numeric::Int(i) => *i as f64,
            Numeric::Real(f) => *f,
        }
    }
    pub fn truncate(&self) -> i64 {
        match self {
            Numeric::Int(i) => *i,
            Numeric::Real(f) => *f as i64,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            other => write!(f, "{}", other.as_text().unwrap_or_default()),
        }
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}
impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Integer(i as i64)
    }
}
impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}
impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_owned())
    }
}
impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}
impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(o: Option<T>) -> Self {
        o.map(Into::into).unwrap_or(Value::Null)
    }
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Value::Integer(i) => ToSqlOutput::from(*i),
            Value::Float(f) => ToSqlOutput::from(*f),
            Value::Text(s) => ToSqlOutput::from(s.as_str()),
            Value::Null => ToSqlOutput::from(rusqlite::types::Null),
        })
    }
}
impl FromSql for Value {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        Ok(match value {
            ValueRef::Null => Value::Null,
            ValueRef::Integer(i) => Value::Integer(i),
            ValueRef::Real(f) => Value::Float(f),
            ValueRef::Text(t) | ValueRef::Blob(t) => {
                Value::Text(String::from_utf8_lossy(t).into_owned())
            }
        })
    }
}
