//! Tempora – id-addressed row tables with declarative search and valid-time
//! versioning.
//!
//! A *table* holds *rows*: mappings from column names to scalar values, one
//! column of which (the id column, `id` by default) holds a positive integer
//! that identifies the row. Tables come in two flavours behind the same
//! [`store::RowStore`] contract:
//! * [`memory::MemoryStore`] keeps rows in process memory and returns
//!   restartable result sequences.
//! * [`sqlite::SqliteStore`] keeps rows in an SQLite table, adding columns as
//!   they are first written, and returns forward-only result sequences.
//!
//! On top of either, [`bitemporal::BitemporalTable`] keeps every row as a
//! chain of versions, each valid over a half-open interval
//! `[validFrom, validUntil)`. Reads and searches can be asked "as of" any
//! point in time; updates close the current version and open a new one.
//!
//! ## Modules
//! * [`store`] – the row store contract shared by every backend.
//! * [`datatype`] – the [`datatype::Value`] scalar and the [`datatype::Row`] map.
//! * [`search`] – search specs, their validation, evaluation and SQL rendering.
//! * [`sequence`] – result sequences with a known count.
//! * [`generator`] – sequential and random id generation.
//! * [`time`] – fixed-width microsecond timestamps and [`time::END_OF_TIME`].
//! * [`bitemporal`] – the versioning layer and its consistency checker.
//! * [`settings`] / [`logging`] – layered configuration and tracing setup.
//!
//! ## Quick Start
//! ```
//! use tempora::{row, BitemporalTable, Combinator, Condition, Operator, SearchSpec, Value};
//! let mut people = BitemporalTable::in_memory("people").unwrap();
//! let id = people.create_row_with_time(row! { "name" => "Alice", "age" => 35 }, "2010-01-01").unwrap();
//! people.update_row_with_time(row! { "id" => id, "age" => 36 }, "2011-01-01").unwrap();
//!
//! let then = people.get_row_with_time(id, "2010-06-01").unwrap();
//! assert_eq!(then["age"], Value::Integer(35));
//!
//! let spec = SearchSpec::new(vec![Condition::new("age", Operator::Gt, 35)]);
//! let found = people.search_with_time(&spec, Combinator::And, 0, "2012-01-01").unwrap();
//! assert_eq!(found.len(), 1);
//! ```
//!
//! ## Errors and warnings
//! Every operation returns [`Result`]; [`TemporaError::code`] gives a stable
//! [`ErrorCode`] for matching. Conditions that do not stop an operation, such
//! as an id generator giving up and the sequential fallback taking over, are
//! collected per store and read through [`store::RowStore::warnings`].

pub mod bitemporal;
pub mod datatype;
pub mod diagnostics;
pub mod error;
pub mod generator;
pub mod logging;
pub mod memory;
pub mod search;
pub mod sequence;
pub mod settings;
pub mod sqlite;
pub mod store;
pub mod time;

pub use bitemporal::{BitemporalTable, ChainIssue, IssueKind, VALID_FROM, VALID_UNTIL};
pub use datatype::{Row, Value};
pub use diagnostics::{Warning, WarningCode};
pub use error::{ErrorCode, InvalidId, Result, TemporaError};
pub use generator::{Id, IdGenerator, RandomGenerator, SequentialGenerator, Strategy};
pub use memory::MemoryStore;
pub use search::{Combinator, Condition, Operator, SearchSpec};
pub use sequence::{ForwardRows, RestartableRows, Rows};
pub use settings::Settings;
pub use sqlite::SqliteStore;
pub use store::{RowStore, in_transaction};
pub use time::{END_OF_TIME, Timestamp};
