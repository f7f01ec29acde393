//! The row store contract.
//!
//! Every backend implements [`RowStore`] on its own; what they share (id
//! resolution, id assignment with fallback, the search evaluator) is reached
//! by composition through the free functions here and the [`crate::search`]
//! module.

use tracing::debug;

use crate::datatype::{Row, Value};
use crate::diagnostics::{Diagnostics, Warning, WarningCode};
use crate::error::{InvalidId, Result, TemporaError};
use crate::generator::{Id, IdGenerator, IdSpace, SequentialGenerator};
use crate::search::{Combinator, Condition, SearchSpec};
use crate::sequence::Rows;

pub const DEFAULT_ID_COLUMN: &str = "id";

pub trait RowStore {
    fn name(&self) -> &str;
    fn set_name(&mut self, name: &str) -> Result<()>;
    fn id_column(&self) -> &str;
    fn set_id_column(&mut self, column: &str) -> Result<()>;

    fn row_exists(&self, id: Id) -> Result<bool>;
    /// Uses the row's id when it is a positive integer, otherwise asks the
    /// id generator for one.
    fn create_row(&mut self, row: Row) -> Result<Id>;
    fn get_row(&self, id: Id) -> Result<Row>;
    /// Returns the number of rows removed, 0 or 1.
    fn delete_row(&mut self, id: Id) -> Result<usize>;
    /// Overwrites only the supplied columns; a null value clears its column.
    fn update_row(&mut self, row: Row) -> Result<()>;
    /// Rows ordered by id. `max_results == 0` means unbounded.
    fn search(&self, spec: &SearchSpec, combinator: Combinator, max_results: usize) -> Result<Rows<'_>>;
    fn get_max_value_in_column(&self, column: &str) -> Result<i64>;
    /// Ascending.
    fn get_unique_ids(&self) -> Result<Vec<Id>>;
    fn warnings(&self) -> &[Warning];
    fn take_warnings(&mut self) -> Vec<Warning>;

    fn find_rows(&self, partial: &Row, max_results: usize) -> Result<Rows<'_>> {
        self.search(&SearchSpec::equalities(partial), Combinator::And, max_results)
    }
    /// The id of the first row whose `column` equals `value`, if any.
    fn get_id_for_key_value(&self, column: &str, value: &Value) -> Result<Option<Id>> {
        if value.is_null() {
            return Ok(None);
        }
        let spec = SearchSpec::new(vec![Condition::eq(column, value.clone())]);
        let first = self.search(&spec, Combinator::And, 1)?.first();
        Ok(first.and_then(|row| row.get(self.id_column()).and_then(Value::as_id)))
    }
    fn get_max_id(&self) -> Result<Id> {
        self.get_max_value_in_column(self.id_column())
    }

    // Transactions pass straight through to the backend. Where the backend
    // shares a connection between tables, so does the transaction.
    fn begin(&mut self) -> Result<()> {
        Ok(())
    }
    fn commit(&mut self) -> Result<()> {
        Ok(())
    }
    fn rollback(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Runs `work` inside a store transaction, rolling back if it fails.
pub fn in_transaction<S, T, F>(store: &mut S, work: F) -> Result<T>
where
    S: RowStore + ?Sized,
    F: FnOnce(&mut S) -> Result<T>,
{
    store.begin()?;
    match work(store) {
        Ok(result) => {
            store.commit()?;
            Ok(result)
        }
        Err(e) => {
            store.rollback()?;
            Err(e)
        }
    }
}

// ------------- Shared id handling -------------

/// The explicit id a new row asks for, if it carries a usable one.
pub(crate) fn requested_id(row: &Row, id_column: &str) -> Option<Id> {
    row.get(id_column).and_then(Value::as_id).filter(|id| *id > 0)
}

/// The id an update targets, validated.
pub(crate) fn required_id(row: &Row, id_column: &str) -> Result<Id> {
    match row.get(id_column) {
        None | Some(Value::Null) => Err(TemporaError::InvalidId(InvalidId::NotSet)),
        Some(value) => match value.as_id() {
            Some(0) => Err(TemporaError::InvalidId(InvalidId::IsZero)),
            Some(id) if id > 0 => Ok(id),
            _ => Err(TemporaError::InvalidId(InvalidId::NotInteger)),
        },
    }
}

/// Asks the configured generator for an id. If it fails, the sequential
/// strategy is used instead and a warning is recorded.
pub(crate) fn assign_id(
    generator: &mut dyn IdGenerator,
    space: &dyn IdSpace,
    diagnostics: &mut Diagnostics,
    table: &str,
) -> Result<Id> {
    match generator.generate(space) {
        Ok(id) => Ok(id),
        Err(e) => {
            diagnostics.warn(
                table,
                WarningCode::GeneratorFallback,
                format!("{e}; falling back to sequential ids"),
            );
            let id = SequentialGenerator.generate(space)?;
            debug!(table, id, "sequential fallback id");
            Ok(id)
        }
    }
}

/// Column names compare without regard to ASCII case, as in SQL. A column
/// keeps the spelling it was first stored with.
pub(crate) fn stored_spelling<'k>(
    known: impl IntoIterator<Item = &'k String>,
    column: &str,
) -> Option<&'k String> {
    known.into_iter().find(|k| k.eq_ignore_ascii_case(column))
}

/// Renames the row's columns to their stored spellings.
pub(crate) fn respell<'k>(row: Row, known: impl IntoIterator<Item = &'k String> + Copy) -> Row {
    row.into_iter()
        .map(|(column, value)| match stored_spelling(known, &column) {
            Some(spelling) => (spelling.clone(), value),
            None => (column, value),
        })
        .collect()
}

/// Null columns are not stored.
pub(crate) fn without_nulls(row: Row) -> Row {
    row.into_iter().filter(|(_, v)| !v.is_null()).collect()
}
