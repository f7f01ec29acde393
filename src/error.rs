use serde::Serialize;
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TemporaError {
    #[error("Row {id} already exists in '{table}'")]
    RowAlreadyExists { table: String, id: i64 },
    #[error("Row {id} does not exist in '{table}'")]
    RowDoesNotExist { table: String, id: i64 },
    #[error("Invalid id: {0}")]
    InvalidId(InvalidId),
    #[error("Invalid search spec: {}", describe(problems))]
    InvalidSearchSpec { problems: Vec<SpecProblem> },
    #[error("Invalid search type '{0}', expected AND or OR")]
    InvalidSearchType(String),
    #[error("Invalid time '{value}': {reason}")]
    InvalidTime { value: String, reason: String },
    #[error("Backend query failed ({context}): {message}")]
    BackendQuery { context: String, message: String },
    #[error("Id generator exhausted after {attempts} attempts in [{min}, {max}]")]
    IdGeneratorExhausted { attempts: u32, min: i64, max: i64 },
    #[error("Config error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, TemporaError>;

/// Stable error kinds, so callers can branch without matching on payloads.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorCode {
    RowAlreadyExists,
    RowDoesNotExist,
    InvalidIdNotSet,
    InvalidIdIsZero,
    InvalidIdNotInteger,
    InvalidSearchSpec,
    InvalidSearchType,
    InvalidTime,
    BackendQuery,
    IdGeneratorExhausted,
    Config,
}

impl TemporaError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::RowAlreadyExists { .. } => ErrorCode::RowAlreadyExists,
            Self::RowDoesNotExist { .. } => ErrorCode::RowDoesNotExist,
            Self::InvalidId(InvalidId::NotSet) => ErrorCode::InvalidIdNotSet,
            Self::InvalidId(InvalidId::IsZero) => ErrorCode::InvalidIdIsZero,
            Self::InvalidId(InvalidId::NotInteger) => ErrorCode::InvalidIdNotInteger,
            Self::InvalidSearchSpec { .. } => ErrorCode::InvalidSearchSpec,
            Self::InvalidSearchType(_) => ErrorCode::InvalidSearchType,
            Self::InvalidTime { .. } => ErrorCode::InvalidTime,
            Self::BackendQuery { .. } => ErrorCode::BackendQuery,
            Self::IdGeneratorExhausted { .. } => ErrorCode::IdGeneratorExhausted,
            Self::Config(_) => ErrorCode::Config,
        }
    }
    pub(crate) fn missing(table: &str, id: i64) -> Self {
        Self::RowDoesNotExist { table: table.to_owned(), id }
    }
    pub(crate) fn invalid_time(value: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidTime { value: value.into(), reason: reason.into() }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum InvalidId {
    NotSet,
    IsZero,
    NotInteger,
}
impl fmt::Display for InvalidId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            InvalidId::NotSet => write!(f, "id column is not set"),
            InvalidId::IsZero => write!(f, "id is zero"),
            InvalidId::NotInteger => write!(f, "id is not a positive integer"),
        }
    }
}

// ------------- Search spec problems -------------
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum ProblemCode {
    EmptySpec,
    NotAnObject,
    MissingColumn,
    MissingValue,
    MissingOperator,
    UnknownOperator,
    ReservedColumn,
}

/// One element's validation failure; `spec_index` is `None` for whole-spec problems.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SpecProblem {
    pub spec_index: Option<usize>,
    pub message: String,
    pub code: ProblemCode,
}
impl SpecProblem {
    pub fn new(spec_index: Option<usize>, code: ProblemCode, message: impl Into<String>) -> Self {
        Self { spec_index, message: message.into(), code }
    }
}
impl fmt::Display for SpecProblem {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.spec_index {
            Some(i) => write!(f, "[{}] {}", i, self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

fn describe(problems: &[SpecProblem]) -> String {
    problems.iter().map(|p| p.to_string()).collect::<Vec<_>>().join("; ")
}

// Backend failures always travel with the statement or table they came from.
pub(crate) trait QueryContext<T> {
    fn within(self, context: impl Into<String>) -> Result<T>;
}
impl<T> QueryContext<T> for rusqlite::Result<T> {
    fn within(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| TemporaError::BackendQuery {
            context: context.into(),
            message: e.to_string(),
        })
    }
}
