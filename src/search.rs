//! Declarative search specs.
//!
//! A spec is a flat list of `(column, operator, value)` conditions folded with
//! a single [`Combinator`]. The same spec evaluates in memory through
//! [`SearchSpec::matches`] and renders to a SQL `where` fragment through
//! [`SearchSpec::to_sql`]; both give the same match set:
//!
//! * a textual condition value compares the stored value's text form byte by byte,
//! * any other condition value compares the stored value numerically,
//! * a missing or null stored value never matches, not even `NE`.

use serde::Serialize;
use serde_json::Value as Json;
use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use crate::datatype::{Row, Value};
use crate::error::{ProblemCode, Result, SpecProblem, TemporaError};
use crate::sqlite::quote_identifier;

// ------------- Operator -------------
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum Operator {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl Operator {
    pub fn parse(s: &str) -> Option<Operator> {
        match s.trim().to_ascii_uppercase().as_str() {
            "EQ" | "=" | "==" => Some(Operator::Eq),
            "NE" | "!=" | "<>" => Some(Operator::Ne),
            "LT" | "<" => Some(Operator::Lt),
            "LE" | "<=" => Some(Operator::Le),
            "GT" | ">" => Some(Operator::Gt),
            "GE" | ">=" => Some(Operator::Ge),
            _ => None,
        }
    }
    pub fn sql(&self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::Ne => "<>",
            Operator::Lt => "<",
            Operator::Le => "<=",
            Operator::Gt => ">",
            Operator::Ge => ">=",
        }
    }
    pub fn holds(&self, ordering: Ordering) -> bool {
        match self {
            Operator::Eq => ordering == Ordering::Equal,
            Operator::Ne => ordering != Ordering::Equal,
            Operator::Lt => ordering == Ordering::Less,
            Operator::Le => ordering != Ordering::Greater,
            Operator::Gt => ordering == Ordering::Greater,
            Operator::Ge => ordering != Ordering::Less,
        }
    }
}

// ------------- Combinator -------------
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize)]
pub enum Combinator {
    /// Every condition must hold.
    #[default]
    And,
    /// At least one condition must hold. Plain disjunction, not a negated AND.
    Or,
}

impl Combinator {
    fn sql(&self) -> &'static str {
        match self {
            Combinator::And => " and ",
            Combinator::Or => " or ",
        }
    }
}
impl FromStr for Combinator {
    type Err = TemporaError;
    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "AND" => Ok(Combinator::And),
            "OR" => Ok(Combinator::Or),
            _ => Err(TemporaError::InvalidSearchType(s.to_owned())),
        }
    }
}
impl fmt::Display for Combinator {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Combinator::And => write!(f, "AND"),
            Combinator::Or => write!(f, "OR"),
        }
    }
}

// ------------- Condition -------------
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Condition {
    pub column: String,
    pub operator: Operator,
    pub value: Value,
}

impl Condition {
    pub fn new(column: impl Into<String>, operator: Operator, value: impl Into<Value>) -> Self {
        Self { column: column.into(), operator, value: value.into() }
    }
    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(column, Operator::Eq, value)
    }
    pub fn matches(&self, row: &Row) -> bool {
        let stored = match row.get(&self.column) {
            Some(v) if !v.is_null() => v,
            _ => return false,
        };
        let ordering = if self.value.is_textual() {
            match (stored.as_text(), self.value.as_text()) {
                (Some(a), Some(b)) => Some(a.as_bytes().cmp(b.as_bytes())),
                _ => None,
            }
        } else {
            match (stored.as_numeric(), self.value.as_numeric()) {
                (Some(a), Some(b)) => a.compare(&b),
                _ => None,
            }
        };
        ordering.is_some_and(|o| self.operator.holds(o))
    }
}

// ------------- Search spec -------------
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct SearchSpec {
    conditions: Vec<Condition>,
}

impl SearchSpec {
    pub fn new(conditions: Vec<Condition>) -> Self {
        Self { conditions }
    }
    /// One equality condition per column of `partial`, as used by `find_rows`.
    pub fn equalities(partial: &Row) -> Self {
        Self::new(
            partial
                .iter()
                .map(|(column, value)| Condition::eq(column.clone(), value.clone()))
                .collect(),
        )
    }
    pub fn push(&mut self, condition: Condition) {
        self.conditions.push(condition);
    }
    pub fn with(mut self, condition: Condition) -> Self {
        self.push(condition);
        self
    }
    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }
    pub fn len(&self) -> usize {
        self.conditions.len()
    }
    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Checks every condition and reports all problems at once.
    pub fn validate(&self) -> Result<()> {
        let mut problems = Vec::new();
        if self.conditions.is_empty() {
            problems.push(SpecProblem::new(None, ProblemCode::EmptySpec, "search spec is empty"));
        }
        for (i, condition) in self.conditions.iter().enumerate() {
            if condition.column.trim().is_empty() {
                problems.push(SpecProblem::new(Some(i), ProblemCode::MissingColumn, "column is missing"));
            }
            if condition.value.is_null() {
                problems.push(SpecProblem::new(Some(i), ProblemCode::MissingValue, "value is missing"));
            }
        }
        if problems.is_empty() {
            Ok(())
        } else {
            Err(TemporaError::InvalidSearchSpec { problems })
        }
    }

    /// Builds a spec from loosely typed input: an array of
    /// `{"column": .., "operator": .., "value": ..}` objects.
    pub fn from_json(json: &Json) -> Result<Self> {
        let elements = match json {
            Json::Array(elements) => elements,
            _ => {
                return Err(TemporaError::InvalidSearchSpec {
                    problems: vec![SpecProblem::new(None, ProblemCode::NotAnObject, "search spec must be a list of conditions")],
                });
            }
        };
        let mut problems = Vec::new();
        let mut conditions = Vec::new();
        if elements.is_empty() {
            problems.push(SpecProblem::new(None, ProblemCode::EmptySpec, "search spec is empty"));
        }
        for (i, element) in elements.iter().enumerate() {
            let Some(object) = element.as_object() else {
                problems.push(SpecProblem::new(Some(i), ProblemCode::NotAnObject, "condition must be an object"));
                continue;
            };
            let column = match object.get("column") {
                Some(Json::String(c)) if !c.trim().is_empty() => Some(c.clone()),
                _ => {
                    problems.push(SpecProblem::new(Some(i), ProblemCode::MissingColumn, "column must be a non-empty string"));
                    None
                }
            };
            let operator = match object.get("operator") {
                None | Some(Json::Null) => {
                    problems.push(SpecProblem::new(Some(i), ProblemCode::MissingOperator, "operator is missing"));
                    None
                }
                Some(Json::String(op)) => {
                    let parsed = Operator::parse(op);
                    if parsed.is_none() {
                        problems.push(SpecProblem::new(Some(i), ProblemCode::UnknownOperator, format!("unknown operator '{op}'")));
                    }
                    parsed
                }
                Some(other) => {
                    problems.push(SpecProblem::new(Some(i), ProblemCode::UnknownOperator, format!("unknown operator {other}")));
                    None
                }
            };
            let value = match object.get("value") {
                Some(Json::String(s)) => Some(Value::Text(s.clone())),
                Some(Json::Number(n)) => n.as_i64().map(Value::Integer).or_else(|| n.as_f64().map(Value::Float)),
                Some(Json::Bool(b)) => Some(Value::Integer(*b as i64)),
                _ => None,
            };
            if value.is_none() {
                problems.push(SpecProblem::new(Some(i), ProblemCode::MissingValue, "value must be a string or a number"));
            }
            if let (Some(column), Some(operator), Some(value)) = (column, operator, value) {
                conditions.push(Condition { column, operator, value });
            }
        }
        if problems.is_empty() {
            Ok(Self::new(conditions))
        } else {
            Err(TemporaError::InvalidSearchSpec { problems })
        }
    }

    /// The in-memory predicate.
    pub fn matches(&self, row: &Row, combinator: Combinator) -> bool {
        match combinator {
            Combinator::And => self.conditions.iter().all(|c| c.matches(row)),
            Combinator::Or => self.conditions.iter().any(|c| c.matches(row)),
        }
    }

    /// Renders a parenthesised `where` fragment and its parameters. Conditions
    /// on columns the table does not have can never hold and render as `0`.
    pub fn to_sql(&self, combinator: Combinator, columns: &HashSet<String>) -> (String, Vec<Value>) {
        let mut fragments = Vec::with_capacity(self.conditions.len());
        let mut parameters = Vec::new();
        for condition in &self.conditions {
            if !columns.iter().any(|c| c.eq_ignore_ascii_case(&condition.column)) {
                fragments.push(String::from("0"));
                continue;
            }
            let cast = if condition.value.is_textual() { "text" } else { "numeric" };
            fragments.push(format!(
                "cast({} as {}) {} ?",
                quote_identifier(&condition.column),
                cast,
                condition.operator.sql()
            ));
            parameters.push(condition.value.clone());
        }
        (format!("({})", fragments.join(combinator.sql())), parameters)
    }
}

impl From<Vec<Condition>> for SearchSpec {
    fn from(conditions: Vec<Condition>) -> Self {
        Self::new(conditions)
    }
}
