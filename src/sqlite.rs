//! Relational backend over SQLite.
//!
//! One SQL table per logical table. The id column is the integer primary key;
//! every other column is created on first use without a declared type, so a
//! column keeps whatever scalar was written to it.

// used for persistence
use rusqlite::{Connection, OptionalExtension, params, params_from_iter};
use std::collections::HashSet;
use tracing::{debug, info};

use crate::datatype::{Row, Value};
use crate::diagnostics::{Diagnostics, Warning};
use crate::error::{QueryContext, Result, TemporaError};
use crate::generator::{Id, IdGenerator, IdSpace, SequentialGenerator};
use crate::search::{Combinator, SearchSpec};
use crate::sequence::{ForwardRows, Rows};
use crate::store::{self, DEFAULT_ID_COLUMN, RowStore};

/// Quotes a table or column name for literal embedding in SQL.
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

// ------------- Table -------------
#[derive(Debug)]
struct SqliteTable<'db> {
    db: &'db Connection,
    name: String,
    id_column: String,
}

impl<'db> SqliteTable<'db> {
    fn quoted(&self) -> String {
        quote_identifier(&self.name)
    }
    fn quoted_id(&self) -> String {
        quote_identifier(&self.id_column)
    }
    fn ensure_table(&self) -> Result<()> {
        let sql = format!(
            "create table if not exists {} ({} integer not null primary key)",
            self.quoted(),
            self.quoted_id()
        );
        self.db.execute_batch(&sql).within(&sql)?;
        if let Some(key) = self.primary_key()? {
            if !key.eq_ignore_ascii_case(&self.id_column) {
                return Err(TemporaError::Config(format!(
                    "table '{}' is keyed by '{}' and cannot be keyed by '{}'",
                    self.name, key, self.id_column
                )));
            }
        }
        self.ensure_columns([self.id_column.as_str()])?;
        // covers id columns that were added after the table was created
        let sql = format!(
            "create unique index if not exists {} on {} ({})",
            quote_identifier(&format!("{}_{}_unique", self.name, self.id_column)),
            self.quoted(),
            self.quoted_id()
        );
        self.db.execute_batch(&sql).within(&sql)
    }
    fn columns(&self) -> Result<HashSet<String>> {
        let sql = format!("pragma table_info({})", self.quoted());
        let mut statement = self.db.prepare(&sql).within(&sql)?;
        let names = statement
            .query_map([], |r| r.get::<_, String>(1))
            .within(&sql)?
            .collect::<rusqlite::Result<HashSet<String>>>()
            .within(&sql)?;
        Ok(names)
    }
    fn primary_key(&self) -> Result<Option<String>> {
        let sql = format!("pragma table_info({})", self.quoted());
        let mut statement = self.db.prepare(&sql).within(&sql)?;
        let keys = statement
            .query_map([], |r| Ok((r.get::<_, String>(1)?, r.get::<_, i64>(5)?)))
            .within(&sql)?
            .collect::<rusqlite::Result<Vec<(String, i64)>>>()
            .within(&sql)?;
        Ok(keys.into_iter().find(|(_, pk)| *pk == 1).map(|(name, _)| name))
    }
    // SQLite folds ASCII case in column names
    fn ensure_columns<'c>(&self, wanted: impl IntoIterator<Item = &'c str>) -> Result<()> {
        let mut existing: HashSet<String> = self.columns()?.iter().map(|c| c.to_ascii_lowercase()).collect();
        for column in wanted {
            if existing.insert(column.to_ascii_lowercase()) {
                let sql = format!("alter table {} add column {}", self.quoted(), quote_identifier(column));
                self.db.execute_batch(&sql).within(&sql)?;
                debug!(table = %self.name, column, "column added");
            }
        }
        Ok(())
    }
    fn select_rows(&self, sql: &str, parameters: &[Value]) -> Result<Vec<Row>> {
        let mut statement = self.db.prepare(sql).within(sql)?;
        let names: Vec<String> = statement.column_names().into_iter().map(String::from).collect();
        let mut rows = statement.query(params_from_iter(parameters.iter())).within(sql)?;
        let mut found = Vec::new();
        while let Some(r) = rows.next().within(sql)? {
            let mut row = Row::new();
            for (i, name) in names.iter().enumerate() {
                let value: Value = r.get(i).within(sql)?;
                if !value.is_null() {
                    row.insert(name.clone(), value);
                }
            }
            found.push(row);
        }
        Ok(found)
    }
}

impl IdSpace for SqliteTable<'_> {
    fn contains_id(&self, id: Id) -> Result<bool> {
        let sql = format!("select 1 from {} where {} = ?", self.quoted(), self.quoted_id());
        let found = self
            .db
            .query_row(&sql, params![id], |r| r.get::<_, i64>(0))
            .optional()
            .within(&sql)?;
        Ok(found.is_some())
    }
    fn max_id(&self) -> Result<Id> {
        let sql = format!("select coalesce(max({}), 0) from {}", self.quoted_id(), self.quoted());
        self.db.query_row(&sql, [], |r| r.get(0)).within(&sql)
    }
}

// ------------- Store -------------
/// A table in an SQLite database. Searches hand back forward-only sequences.
///
/// Transactions are savepoints on the borrowed connection: they nest, and
/// they cover every table that shares the connection, not only this one.
#[derive(Debug)]
pub struct SqliteStore<'db> {
    table: SqliteTable<'db>,
    generator: Box<dyn IdGenerator>,
    diagnostics: Diagnostics,
    savepoints: usize,
}

impl<'db> SqliteStore<'db> {
    pub fn new(db: &'db Connection, name: impl Into<String>) -> Result<Self> {
        Self::with_generator(db, name, Box::new(SequentialGenerator))
    }
    pub fn with_generator(
        db: &'db Connection,
        name: impl Into<String>,
        generator: Box<dyn IdGenerator>,
    ) -> Result<Self> {
        Self::with_id_column(db, name, DEFAULT_ID_COLUMN, generator)
    }
    /// Opens (creating if needed) a table whose primary key is `id_column`.
    pub fn with_id_column(
        db: &'db Connection,
        name: impl Into<String>,
        id_column: &str,
        generator: Box<dyn IdGenerator>,
    ) -> Result<Self> {
        let table = SqliteTable {
            db,
            name: name.into(),
            id_column: id_column.to_string(),
        };
        table.ensure_table()?;
        Ok(Self {
            table,
            generator,
            diagnostics: Diagnostics::new(),
            savepoints: 0,
        })
    }
    pub fn connection(&self) -> &'db Connection {
        self.table.db
    }
    fn savepoint_name(&self) -> String {
        format!("tempora_{}", self.savepoints)
    }
}

impl IdSpace for SqliteStore<'_> {
    fn contains_id(&self, id: Id) -> Result<bool> {
        self.table.contains_id(id)
    }
    fn max_id(&self) -> Result<Id> {
        self.table.max_id()
    }
}

impl RowStore for SqliteStore<'_> {
    fn name(&self) -> &str {
        &self.table.name
    }
    fn set_name(&mut self, name: &str) -> Result<()> {
        let previous = std::mem::replace(&mut self.table.name, name.to_string());
        self.table.ensure_table().inspect_err(|_| self.table.name = previous)
    }
    fn id_column(&self) -> &str {
        &self.table.id_column
    }
    /// Fails with [`TemporaError::Config`] when the table's primary key is
    /// another column.
    fn set_id_column(&mut self, column: &str) -> Result<()> {
        let previous = std::mem::replace(&mut self.table.id_column, column.to_string());
        self.table.ensure_table().inspect_err(|_| self.table.id_column = previous)
    }

    fn row_exists(&self, id: Id) -> Result<bool> {
        self.table.contains_id(id)
    }

    fn create_row(&mut self, row: Row) -> Result<Id> {
        let mut row = store::respell(store::without_nulls(row), &self.table.columns()?);
        let id = match store::requested_id(&row, &self.table.id_column) {
            Some(id) if self.table.contains_id(id)? => {
                return Err(TemporaError::RowAlreadyExists { table: self.table.name.clone(), id });
            }
            Some(id) => id,
            None => store::assign_id(
                self.generator.as_mut(),
                &self.table,
                &mut self.diagnostics,
                &self.table.name,
            )?,
        };
        row.insert(self.table.id_column.clone(), Value::Integer(id));
        self.table.ensure_columns(row.keys().map(String::as_str))?;
        let columns: Vec<String> = row.keys().map(|c| quote_identifier(c)).collect();
        let placeholders = vec!["?"; columns.len()].join(", ");
        let sql = format!(
            "insert into {} ({}) values ({})",
            self.table.quoted(),
            columns.join(", "),
            placeholders
        );
        self.table
            .db
            .execute(&sql, params_from_iter(row.values()))
            .within(&sql)?;
        info!(table = %self.table.name, id, "row created");
        Ok(id)
    }

    fn get_row(&self, id: Id) -> Result<Row> {
        let sql = format!("select * from {} where {} = ?", self.table.quoted(), self.table.quoted_id());
        self.table
            .select_rows(&sql, &[Value::Integer(id)])?
            .into_iter()
            .next()
            .ok_or_else(|| TemporaError::missing(&self.table.name, id))
    }

    fn delete_row(&mut self, id: Id) -> Result<usize> {
        let sql = format!("delete from {} where {} = ?", self.table.quoted(), self.table.quoted_id());
        let removed = self.table.db.execute(&sql, params![id]).within(&sql)?;
        info!(table = %self.table.name, id, removed, "row deleted");
        Ok(removed)
    }

    fn update_row(&mut self, row: Row) -> Result<()> {
        let row = store::respell(row, &self.table.columns()?);
        let id = store::required_id(&row, &self.table.id_column)?;
        if !self.table.contains_id(id)? {
            return Err(TemporaError::missing(&self.table.name, id));
        }
        let changes: Vec<(&String, &Value)> = row
            .iter()
            .filter(|(column, _)| **column != self.table.id_column)
            .collect();
        if changes.is_empty() {
            return Ok(());
        }
        self.table.ensure_columns(changes.iter().map(|(c, _)| c.as_str()))?;
        let assignments: Vec<String> = changes
            .iter()
            .map(|(c, _)| format!("{} = ?", quote_identifier(c)))
            .collect();
        let sql = format!(
            "update {} set {} where {} = ?",
            self.table.quoted(),
            assignments.join(", "),
            self.table.quoted_id()
        );
        let mut parameters: Vec<Value> = changes.into_iter().map(|(_, v)| v.clone()).collect();
        parameters.push(Value::Integer(id));
        self.table
            .db
            .execute(&sql, params_from_iter(parameters.iter()))
            .within(&sql)?;
        info!(table = %self.table.name, id, "row updated");
        Ok(())
    }

    fn search(&self, spec: &SearchSpec, combinator: Combinator, max_results: usize) -> Result<Rows<'_>> {
        spec.validate()?;
        let (fragment, parameters) = spec.to_sql(combinator, &self.table.columns()?);
        let mut sql = format!(
            "select * from {} where {} order by {}",
            self.table.quoted(),
            fragment,
            self.table.quoted_id()
        );
        if max_results > 0 {
            sql.push_str(&format!(" limit {max_results}"));
        }
        // statements borrow the connection, so the cursor is drained here
        let found = self.table.select_rows(&sql, &parameters)?;
        debug!(table = %self.table.name, %combinator, conditions = spec.len(), found = found.len(), "search");
        Ok(Rows::Forward(ForwardRows::new(found.len(), found.into_iter())))
    }

    fn get_max_value_in_column(&self, column: &str) -> Result<i64> {
        if store::stored_spelling(&self.table.columns()?, column).is_none() {
            return Ok(0);
        }
        let sql = format!(
            "select coalesce(max(cast(cast({} as numeric) as integer)), 0) from {}",
            quote_identifier(column),
            self.table.quoted()
        );
        self.table.db.query_row(&sql, [], |r| r.get(0)).within(&sql)
    }

    fn get_unique_ids(&self) -> Result<Vec<Id>> {
        let sql = format!(
            "select {} from {} order by {}",
            self.table.quoted_id(),
            self.table.quoted(),
            self.table.quoted_id()
        );
        let mut statement = self.table.db.prepare(&sql).within(&sql)?;
        let ids = statement
            .query_map([], |r| r.get::<_, i64>(0))
            .within(&sql)?
            .collect::<rusqlite::Result<Vec<i64>>>()
            .within(&sql)?;
        Ok(ids)
    }

    fn warnings(&self) -> &[Warning] {
        self.diagnostics.warnings()
    }
    fn take_warnings(&mut self) -> Vec<Warning> {
        self.diagnostics.take()
    }

    fn begin(&mut self) -> Result<()> {
        self.savepoints += 1;
        let sql = format!("savepoint {}", self.savepoint_name());
        if let Err(e) = self.table.db.execute_batch(&sql).within(&sql) {
            self.savepoints -= 1;
            return Err(e);
        }
        Ok(())
    }
    fn commit(&mut self) -> Result<()> {
        if self.savepoints == 0 {
            return Ok(());
        }
        let sql = format!("release {}", self.savepoint_name());
        self.table.db.execute_batch(&sql).within(&sql)?;
        self.savepoints -= 1;
        Ok(())
    }
    fn rollback(&mut self) -> Result<()> {
        if self.savepoints == 0 {
            return Ok(());
        }
        let name = self.savepoint_name();
        let sql = format!("rollback to {name}; release {name}");
        self.table.db.execute_batch(&sql).within(&sql)?;
        self.savepoints -= 1;
        Ok(())
    }
}
