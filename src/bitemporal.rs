//! Bitemporal versioning over any [`RowStore`].
//!
//! Every logical row is a chain of immutable versions. A version is a row in
//! the wrapped store, keyed there by [`VERSION_COLUMN`], carrying the logical
//! id in the table's id column and its valid-time interval in
//! [`VALID_FROM`] and [`VALID_UNTIL`]. The interval is half-open,
//! `[validFrom, validUntil)`, and the one open-ended version of a live row
//! has `validUntil = END_OF_TIME`.
//!
//! Versions of one id are ordered by `validFrom` and must form a chain with
//! no gaps or overlaps. [`BitemporalTable::check_consistency`] reports every
//! id that breaks this.
//!
//! There is no optimistic concurrency control: two writers updating the same
//! id must be serialised by the caller.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, info, warn};

use crate::datatype::{Row, Value};
use crate::diagnostics::{Diagnostics, Warning, WarningCode};
use crate::error::{ProblemCode, Result, SpecProblem, TemporaError};
use crate::generator::{Id, IdGenerator, IdSpace, SequentialGenerator};
use crate::memory::MemoryStore;
use crate::search::{Combinator, Condition, Operator, SearchSpec};
use crate::sequence::Rows;
use crate::sqlite::SqliteStore;
use crate::store::{self, DEFAULT_ID_COLUMN, RowStore, in_transaction};
use crate::time::{END_OF_TIME, IntoTimestamp, Timestamp};

pub const VALID_FROM: &str = "validFrom";
pub const VALID_UNTIL: &str = "validUntil";
/// Key of each version in the wrapped store; never shown to callers.
pub const VERSION_COLUMN: &str = "versionId";

const RESERVED: [&str; 3] = [VERSION_COLUMN, VALID_FROM, VALID_UNTIL];

// column names fold ASCII case in both backends
fn is_reserved(column: &str) -> bool {
    RESERVED.iter().any(|r| r.eq_ignore_ascii_case(column))
}

// ------------- Consistency issues -------------
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum IssueKind {
    /// `validFrom` is not before `validUntil`, or either is unreadable.
    InvalidInterval,
    /// A version starts after its predecessor ended.
    Gap,
    /// A version starts before its predecessor ended.
    Overlap,
    MultipleCurrent,
    /// The open-ended version is not the last one.
    CurrentNotLast,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ChainIssue {
    pub id: Id,
    pub kind: IssueKind,
    pub message: String,
}
impl fmt::Display for ChainIssue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "id {}: {:?}: {}", self.id, self.kind, self.message)
    }
}

// ------------- Logical id space -------------
// Ids stay taken once used, even after the row is deleted.
struct LogicalIds<'a, S: RowStore> {
    inner: &'a S,
    id_column: &'a str,
}

impl<S: RowStore> IdSpace for LogicalIds<'_, S> {
    fn contains_id(&self, id: Id) -> Result<bool> {
        let spec = SearchSpec::new(vec![Condition::eq(self.id_column, id)]);
        Ok(!self.inner.search(&spec, Combinator::And, 1)?.is_empty())
    }
    fn max_id(&self) -> Result<Id> {
        self.inner.get_max_value_in_column(self.id_column)
    }
}

// Which versions a search looks at.
#[derive(Clone, Copy, Debug)]
enum Window {
    At(Timestamp),
    Current,
}
impl Window {
    fn conditions(&self) -> Vec<Condition> {
        match self {
            Window::At(t) => vec![
                Condition::new(VALID_FROM, Operator::Le, t.to_string()),
                Condition::new(VALID_UNTIL, Operator::Gt, t.to_string()),
            ],
            Window::Current => vec![Condition::eq(VALID_UNTIL, END_OF_TIME)],
        }
    }
}

fn public(mut version: Row) -> Row {
    version.remove(VERSION_COLUMN);
    version
}

fn valid_from(version: &Row) -> Result<Timestamp> {
    match version.get(VALID_FROM) {
        Some(value) => Timestamp::try_from(value),
        None => Err(TemporaError::invalid_time("", "version has no validFrom")),
    }
}

// ------------- Table -------------
#[derive(Debug)]
pub struct BitemporalTable<S: RowStore> {
    inner: S,
    id_column: String,
    generator: Box<dyn IdGenerator>,
    diagnostics: Diagnostics,
}

impl BitemporalTable<MemoryStore> {
    pub fn in_memory(name: &str) -> Result<Self> {
        Self::new(MemoryStore::new(name))
    }
}

impl<'db> BitemporalTable<SqliteStore<'db>> {
    /// A versioned table in `db`, keyed by [`VERSION_COLUMN`].
    pub fn sqlite(db: &'db rusqlite::Connection, name: &str) -> Result<Self> {
        let inner = SqliteStore::with_id_column(db, name, VERSION_COLUMN, Box::new(SequentialGenerator))?;
        Self::new(inner)
    }
}

impl<S: RowStore> BitemporalTable<S> {
    /// Wraps `inner`, which from now on keys its rows by [`VERSION_COLUMN`].
    /// A store that cannot be re-keyed, such as an SQLite table whose primary
    /// key is the logical id column, is refused with [`TemporaError::Config`].
    pub fn new(inner: S) -> Result<Self> {
        Self::with_generator(inner, Box::new(SequentialGenerator))
    }
    /// `generator` assigns logical ids; the wrapped store assigns version keys.
    pub fn with_generator(mut inner: S, generator: Box<dyn IdGenerator>) -> Result<Self> {
        if inner.id_column() != VERSION_COLUMN {
            inner.set_id_column(VERSION_COLUMN)?;
        }
        Ok(Self {
            inner,
            id_column: DEFAULT_ID_COLUMN.to_string(),
            generator,
            diagnostics: Diagnostics::new(),
        })
    }
    pub fn inner(&self) -> &S {
        &self.inner
    }
    /// Direct access to the stored versions, bypassing the chain rules.
    pub fn inner_mut(&mut self) -> &mut S {
        &mut self.inner
    }
    pub fn into_inner(self) -> S {
        self.inner
    }

    fn logical_ids(&self) -> LogicalIds<'_, S> {
        LogicalIds { inner: &self.inner, id_column: &self.id_column }
    }

    // Reserved columns are the engine's to write.
    fn caller_columns(&mut self, row: Row) -> Row {
        let mut kept = Row::new();
        for (column, value) in row {
            if is_reserved(&column) {
                self.diagnostics.warn(
                    self.inner.name(),
                    WarningCode::ReservedColumnIgnored,
                    format!("column '{column}' is managed by the versioning layer"),
                );
            } else {
                kept.insert(column, value);
            }
        }
        kept
    }

    fn absorb_inner_warnings(&mut self) {
        let warnings = self.inner.take_warnings();
        self.diagnostics.absorb(warnings);
    }

    fn id_condition(&self, id: Id) -> Condition {
        Condition::eq(self.id_column.as_str(), id)
    }

    /// Every version of `id`, oldest first, with version keys.
    fn versions(&self, id: Id) -> Result<Vec<Row>> {
        let spec = SearchSpec::new(vec![self.id_condition(id)]);
        let mut versions: Vec<Row> = self.inner.search(&spec, Combinator::And, 0)?.collect();
        versions.sort_by_cached_key(|v| v.get(VALID_FROM).and_then(Value::as_text));
        Ok(versions)
    }

    fn current_version(&self, id: Id) -> Result<Option<Row>> {
        let mut conditions = vec![self.id_condition(id)];
        conditions.extend(Window::Current.conditions());
        let rows = self.inner.search(&SearchSpec::new(conditions), Combinator::And, 0)?;
        Ok(rows.last())
    }

    fn version_at(&self, id: Id, t: Timestamp) -> Result<Option<Row>> {
        let mut conditions = vec![self.id_condition(id)];
        conditions.extend(Window::At(t).conditions());
        let candidates = self.inner.search(&SearchSpec::new(conditions), Combinator::And, 0)?;
        // by construction there is one; should there be more, the latest start wins
        Ok(candidates.max_by_key(|v| v.get(VALID_FROM).and_then(Value::as_text)))
    }

    fn search_window(
        &self,
        spec: &SearchSpec,
        combinator: Combinator,
        max_results: usize,
        window: Window,
    ) -> Result<Rows<'_>> {
        spec.validate()?;
        let hidden: Vec<SpecProblem> = spec
            .conditions()
            .iter()
            .enumerate()
            .filter(|(_, condition)| condition.column.eq_ignore_ascii_case(VERSION_COLUMN))
            .map(|(i, _)| {
                let message = format!("'{VERSION_COLUMN}' cannot be searched");
                SpecProblem::new(Some(i), ProblemCode::ReservedColumn, message)
            })
            .collect();
        if !hidden.is_empty() {
            return Err(TemporaError::InvalidSearchSpec { problems: hidden });
        }
        let in_window: Vec<Row> = match combinator {
            Combinator::And => {
                let mut conditions = spec.conditions().to_vec();
                conditions.extend(window.conditions());
                self.inner.search(&SearchSpec::new(conditions), Combinator::And, 0)?.collect()
            }
            Combinator::Or => {
                let in_window = SearchSpec::new(window.conditions());
                self.inner
                    .search(spec, Combinator::Or, 0)?
                    .filter(|v| in_window.matches(v, Combinator::And))
                    .collect()
            }
        };
        // the wrapped store orders by version key; callers see logical id order
        let mut found: Vec<Row> = in_window.into_iter().map(public).collect();
        found.sort_by_cached_key(|v| v.get(&self.id_column).and_then(Value::as_id));
        if max_results > 0 {
            found.truncate(max_results);
        }
        debug!(table = %self.inner.name(), ?window, %combinator, found = found.len(), "versioned search");
        Ok(Rows::from(found))
    }

    // ------------- Point in time -------------

    pub fn create_row_with_time(&mut self, row: Row, t: impl IntoTimestamp) -> Result<Id> {
        let t = t.into_timestamp()?;
        if t.is_end_of_time() {
            return Err(TemporaError::invalid_time(END_OF_TIME, "a version cannot start at the end of time"));
        }
        let mut version = store::without_nulls(self.caller_columns(row));
        let id = match store::requested_id(&version, &self.id_column) {
            Some(id) if self.logical_ids().contains_id(id)? => {
                return Err(TemporaError::RowAlreadyExists { table: self.inner.name().to_string(), id });
            }
            Some(id) => id,
            None => {
                let space = LogicalIds { inner: &self.inner, id_column: &self.id_column };
                store::assign_id(self.generator.as_mut(), &space, &mut self.diagnostics, self.inner.name())?
            }
        };
        version.insert(self.id_column.clone(), Value::Integer(id));
        version.insert(VALID_FROM.to_string(), t.into());
        version.insert(VALID_UNTIL.to_string(), Timestamp::end_of_time().into());
        let version_id = self.inner.create_row(version)?;
        self.absorb_inner_warnings();
        info!(table = %self.inner.name(), id, version_id, valid_from = %t, "versioned row created");
        Ok(id)
    }

    pub fn row_exists_with_time(&self, id: Id, t: impl IntoTimestamp) -> Result<bool> {
        let t = t.into_timestamp()?;
        Ok(self.version_at(id, t)?.is_some())
    }

    /// The version of `id` whose interval contains `t`.
    pub fn get_row_with_time(&self, id: Id, t: impl IntoTimestamp) -> Result<Row> {
        let t = t.into_timestamp()?;
        self.version_at(id, t)?
            .map(public)
            .ok_or_else(|| TemporaError::missing(self.inner.name(), id))
    }

    pub fn find_rows_with_time(&self, partial: &Row, max_results: usize, t: impl IntoTimestamp) -> Result<Rows<'_>> {
        self.search_with_time(&SearchSpec::equalities(partial), Combinator::And, max_results, t)
    }

    /// Searches the versions valid at `t`; at most one per logical id.
    pub fn search_with_time(
        &self,
        spec: &SearchSpec,
        combinator: Combinator,
        max_results: usize,
        t: impl IntoTimestamp,
    ) -> Result<Rows<'_>> {
        let t = t.into_timestamp()?;
        self.search_window(spec, combinator, max_results, Window::At(t))
    }

    /// Closes the current version at `t` and opens a new one holding the
    /// current columns overlaid with the supplied ones.
    pub fn update_row_with_time(&mut self, row: Row, t: impl IntoTimestamp) -> Result<()> {
        let t = t.into_timestamp()?;
        let id = store::required_id(&row, &self.id_column)?;
        let current = self
            .current_version(id)?
            .ok_or_else(|| TemporaError::missing(self.inner.name(), id))?;
        let from = valid_from(&current)?;
        if t <= from || t.is_end_of_time() {
            return Err(TemporaError::invalid_time(
                t.to_string(),
                format!("must fall after the current version's validFrom {from}"),
            ));
        }
        let version_id = current
            .get(VERSION_COLUMN)
            .and_then(Value::as_id)
            .ok_or_else(|| TemporaError::missing(self.inner.name(), id))?;

        let mut successor: Row = current
            .into_iter()
            .filter(|(column, _)| !is_reserved(column))
            .collect();
        for (column, value) in self.caller_columns(row) {
            if value.is_null() {
                successor.remove(&column);
            } else {
                successor.insert(column, value);
            }
        }
        successor.insert(self.id_column.clone(), Value::Integer(id));
        successor.insert(VALID_FROM.to_string(), t.into());
        successor.insert(VALID_UNTIL.to_string(), Timestamp::end_of_time().into());

        let mut closing = Row::new();
        closing.insert(VERSION_COLUMN.to_string(), Value::Integer(version_id));
        closing.insert(VALID_UNTIL.to_string(), t.into());
        let successor_id = in_transaction(&mut self.inner, |inner| {
            inner.update_row(closing)?;
            inner.create_row(successor)
        })?;
        self.absorb_inner_warnings();
        info!(table = %self.inner.name(), id, closed = version_id, opened = successor_id, at = %t, "versioned row updated");
        Ok(())
    }

    /// Closes the current version at `t` without a successor. Returns 0 when
    /// `id` has no current version.
    pub fn delete_row_with_time(&mut self, id: Id, t: impl IntoTimestamp) -> Result<usize> {
        let t = t.into_timestamp()?;
        let Some(current) = self.current_version(id)? else {
            return Ok(0);
        };
        let from = valid_from(&current)?;
        if t <= from || t.is_end_of_time() {
            return Err(TemporaError::invalid_time(
                t.to_string(),
                format!("must fall after the current version's validFrom {from}"),
            ));
        }
        let version_id = current
            .get(VERSION_COLUMN)
            .and_then(Value::as_id)
            .ok_or_else(|| TemporaError::missing(self.inner.name(), id))?;
        let mut closing = Row::new();
        closing.insert(VERSION_COLUMN.to_string(), Value::Integer(version_id));
        closing.insert(VALID_UNTIL.to_string(), t.into());
        self.inner.update_row(closing)?;
        info!(table = %self.inner.name(), id, closed = version_id, at = %t, "versioned row deleted");
        Ok(1)
    }

    /// Every version of `id`, oldest first.
    pub fn get_row_history(&self, id: Id) -> Result<Vec<Row>> {
        let versions = self.versions(id)?;
        if versions.is_empty() {
            return Err(TemporaError::missing(self.inner.name(), id));
        }
        Ok(versions.into_iter().map(public).collect())
    }

    // Plain writes happen now, or just after the current version started
    // when the clock has not moved past it.
    fn write_time(&self, id: Id) -> Result<Timestamp> {
        let now = Timestamp::now();
        match self.current_version(id)? {
            Some(current) => {
                let from = valid_from(&current)?;
                Ok(if now > from { now } else { from.successor() })
            }
            None => Ok(now),
        }
    }

    // ------------- Consistency -------------

    /// Checks each id's version chain. Problems are reported, not raised.
    pub fn check_consistency(&self) -> Result<Vec<ChainIssue>> {
        let mut chains: BTreeMap<Id, Vec<Row>> = BTreeMap::new();
        for version_id in self.inner.get_unique_ids()? {
            let version = self.inner.get_row(version_id)?;
            match version.get(&self.id_column).and_then(Value::as_id) {
                Some(id) => chains.entry(id).or_default().push(version),
                None => warn!(table = %self.inner.name(), version_id, "version without a logical id"),
            }
        }
        let mut issues = Vec::new();
        for (id, versions) in chains {
            check_chain(id, versions, &mut issues);
        }
        for issue in &issues {
            warn!(table = %self.inner.name(), %issue, "inconsistent version chain");
        }
        Ok(issues)
    }
}

fn check_chain(id: Id, versions: Vec<Row>, issues: &mut Vec<ChainIssue>) {
    let mut intervals = Vec::with_capacity(versions.len());
    for version in &versions {
        let from = version.get(VALID_FROM).map(Timestamp::try_from);
        let until = version.get(VALID_UNTIL).map(Timestamp::try_from);
        match (from, until) {
            (Some(Ok(from)), Some(Ok(until))) if from < until => intervals.push((from, until)),
            (Some(Ok(from)), Some(Ok(until))) => issues.push(ChainIssue {
                id,
                kind: IssueKind::InvalidInterval,
                message: format!("validFrom {from} is not before validUntil {until}"),
            }),
            _ => issues.push(ChainIssue {
                id,
                kind: IssueKind::InvalidInterval,
                message: "missing or unreadable valid-time columns".to_string(),
            }),
        }
    }
    intervals.sort();
    for pair in intervals.windows(2) {
        let ((_, previous_until), (next_from, _)) = (pair[0], pair[1]);
        if next_from > previous_until {
            issues.push(ChainIssue {
                id,
                kind: IssueKind::Gap,
                message: format!("no version between {previous_until} and {next_from}"),
            });
        } else if next_from < previous_until {
            issues.push(ChainIssue {
                id,
                kind: IssueKind::Overlap,
                message: format!("version starting {next_from} overlaps one ending {previous_until}"),
            });
        }
    }
    let open: Vec<usize> = intervals
        .iter()
        .enumerate()
        .filter(|(_, (_, until))| until.is_end_of_time())
        .map(|(i, _)| i)
        .collect();
    if open.len() > 1 {
        issues.push(ChainIssue {
            id,
            kind: IssueKind::MultipleCurrent,
            message: format!("{} versions are open-ended", open.len()),
        });
    } else if let Some(&i) = open.first() {
        if i + 1 != intervals.len() {
            issues.push(ChainIssue {
                id,
                kind: IssueKind::CurrentNotLast,
                message: format!("open-ended version starting {} is followed by later versions", intervals[i].0),
            });
        }
    }
}

impl<S: RowStore> IdSpace for BitemporalTable<S> {
    fn contains_id(&self, id: Id) -> Result<bool> {
        self.logical_ids().contains_id(id)
    }
    fn max_id(&self) -> Result<Id> {
        self.logical_ids().max_id()
    }
}

/// The plain row-store view: reads see current versions, writes happen now.
/// A write never lands at or before the start of the version it closes.
impl<S: RowStore> RowStore for BitemporalTable<S> {
    fn name(&self) -> &str {
        self.inner.name()
    }
    fn set_name(&mut self, name: &str) -> Result<()> {
        self.inner.set_name(name)
    }
    fn id_column(&self) -> &str {
        &self.id_column
    }
    fn set_id_column(&mut self, column: &str) -> Result<()> {
        if is_reserved(column) {
            return Err(TemporaError::Config(format!("'{column}' is a reserved column")));
        }
        if !self.inner.get_unique_ids()?.is_empty() {
            return Err(TemporaError::Config(
                "the id column of a versioned table cannot change once it holds rows".to_string(),
            ));
        }
        self.id_column = column.to_string();
        Ok(())
    }

    fn row_exists(&self, id: Id) -> Result<bool> {
        Ok(self.current_version(id)?.is_some())
    }
    fn create_row(&mut self, row: Row) -> Result<Id> {
        self.create_row_with_time(row, Timestamp::now())
    }
    fn get_row(&self, id: Id) -> Result<Row> {
        self.current_version(id)?
            .map(public)
            .ok_or_else(|| TemporaError::missing(self.inner.name(), id))
    }
    fn delete_row(&mut self, id: Id) -> Result<usize> {
        let t = self.write_time(id)?;
        self.delete_row_with_time(id, t)
    }
    fn update_row(&mut self, row: Row) -> Result<()> {
        let t = self.write_time(store::required_id(&row, &self.id_column)?)?;
        self.update_row_with_time(row, t)
    }
    fn search(&self, spec: &SearchSpec, combinator: Combinator, max_results: usize) -> Result<Rows<'_>> {
        self.search_window(spec, combinator, max_results, Window::Current)
    }
    /// Over every version ever written, not only current ones.
    fn get_max_value_in_column(&self, column: &str) -> Result<i64> {
        self.inner.get_max_value_in_column(column)
    }
    fn get_unique_ids(&self) -> Result<Vec<Id>> {
        let current = self.inner.search(&SearchSpec::new(Window::Current.conditions()), Combinator::And, 0)?;
        let mut ids: Vec<Id> = current
            .filter_map(|v| v.get(&self.id_column).and_then(Value::as_id))
            .collect();
        ids.sort_unstable();
        ids.dedup();
        Ok(ids)
    }
    fn warnings(&self) -> &[Warning] {
        self.diagnostics.warnings()
    }
    fn take_warnings(&mut self) -> Vec<Warning> {
        self.absorb_inner_warnings();
        self.diagnostics.take()
    }
    fn begin(&mut self) -> Result<()> {
        self.inner.begin()
    }
    fn commit(&mut self) -> Result<()> {
        self.inner.commit()
    }
    fn rollback(&mut self) -> Result<()> {
        self.inner.rollback()
    }
}
