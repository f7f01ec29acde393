use std::collections::BTreeMap;
use tracing::{debug, info};

use crate::datatype::{Row, Value};
use crate::diagnostics::{Diagnostics, Warning};
use crate::error::{Result, TemporaError};
use crate::generator::{Id, IdGenerator, IdSpace, SequentialGenerator};
use crate::search::{Combinator, Condition, SearchSpec};
use crate::sequence::{RestartableRows, Rows};
use crate::store::{self, DEFAULT_ID_COLUMN, RowStore};

// ------------- Table -------------
#[derive(Debug, Default)]
struct MemoryTable {
    name: String,
    id_column: String,
    rows: BTreeMap<Id, Row>,
    // every column spelling ever stored, in first-seen order
    columns: Vec<String>,
}

impl MemoryTable {
    fn spelling(&self, column: &str) -> String {
        store::stored_spelling(&self.columns, column).map_or_else(|| column.to_string(), String::clone)
    }
    fn respell(&mut self, row: Row) -> Row {
        let row = store::respell(row, &self.columns);
        for column in row.keys() {
            if store::stored_spelling(&self.columns, column).is_none() {
                self.columns.push(column.clone());
            }
        }
        row
    }
    fn respell_spec(&self, spec: &SearchSpec) -> SearchSpec {
        let conditions = spec
            .conditions()
            .iter()
            .map(|c| Condition::new(self.spelling(&c.column), c.operator, c.value.clone()))
            .collect();
        SearchSpec::new(conditions)
    }
}

impl IdSpace for MemoryTable {
    fn contains_id(&self, id: Id) -> Result<bool> {
        Ok(self.rows.contains_key(&id))
    }
    fn max_id(&self) -> Result<Id> {
        Ok(self.rows.keys().next_back().copied().unwrap_or(0))
    }
}

// ------------- Store -------------
/// Rows kept in a map ordered by id. Searches hand back restartable sequences.
#[derive(Debug)]
pub struct MemoryStore {
    table: MemoryTable,
    generator: Box<dyn IdGenerator>,
    diagnostics: Diagnostics,
}

impl MemoryStore {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_generator(name, Box::new(SequentialGenerator))
    }
    pub fn with_generator(name: impl Into<String>, generator: Box<dyn IdGenerator>) -> Self {
        Self {
            table: MemoryTable {
                name: name.into(),
                id_column: DEFAULT_ID_COLUMN.to_string(),
                rows: BTreeMap::new(),
                columns: vec![DEFAULT_ID_COLUMN.to_string()],
            },
            generator,
            diagnostics: Diagnostics::new(),
        }
    }
    pub fn len(&self) -> usize {
        self.table.rows.len()
    }
    pub fn is_empty(&self) -> bool {
        self.table.rows.is_empty()
    }
}

impl IdSpace for MemoryStore {
    fn contains_id(&self, id: Id) -> Result<bool> {
        self.table.contains_id(id)
    }
    fn max_id(&self) -> Result<Id> {
        self.table.max_id()
    }
}

impl RowStore for MemoryStore {
    fn name(&self) -> &str {
        &self.table.name
    }
    fn set_name(&mut self, name: &str) -> Result<()> {
        self.table.name = name.to_string();
        Ok(())
    }
    fn id_column(&self) -> &str {
        &self.table.id_column
    }
    fn set_id_column(&mut self, column: &str) -> Result<()> {
        let column = self.table.spelling(column);
        if !self.table.columns.contains(&column) {
            self.table.columns.push(column.clone());
        }
        let previous = std::mem::replace(&mut self.table.id_column, column.clone());
        for (id, row) in self.table.rows.iter_mut() {
            row.remove(&previous);
            row.insert(column.to_string(), Value::Integer(*id));
        }
        Ok(())
    }

    fn row_exists(&self, id: Id) -> Result<bool> {
        self.table.contains_id(id)
    }

    fn create_row(&mut self, row: Row) -> Result<Id> {
        let mut row = self.table.respell(store::without_nulls(row));
        let id = match store::requested_id(&row, &self.table.id_column) {
            Some(id) if self.table.rows.contains_key(&id) => {
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
        self.table.rows.insert(id, row);
        info!(table = %self.table.name, id, "row created");
        Ok(id)
    }

    fn get_row(&self, id: Id) -> Result<Row> {
        self.table
            .rows
            .get(&id)
            .cloned()
            .ok_or_else(|| TemporaError::missing(&self.table.name, id))
    }

    fn delete_row(&mut self, id: Id) -> Result<usize> {
        let removed = self.table.rows.remove(&id).map_or(0, |_| 1);
        info!(table = %self.table.name, id, removed, "row deleted");
        Ok(removed)
    }

    fn update_row(&mut self, row: Row) -> Result<()> {
        let row = self.table.respell(row);
        let id = store::required_id(&row, &self.table.id_column)?;
        let stored = self
            .table
            .rows
            .get_mut(&id)
            .ok_or_else(|| TemporaError::missing(&self.table.name, id))?;
        for (column, value) in row {
            if column == self.table.id_column {
                continue;
            }
            if value.is_null() {
                stored.remove(&column);
            } else {
                stored.insert(column, value);
            }
        }
        info!(table = %self.table.name, id, "row updated");
        Ok(())
    }

    fn search(&self, spec: &SearchSpec, combinator: Combinator, max_results: usize) -> Result<Rows<'_>> {
        spec.validate()?;
        let spec = self.table.respell_spec(spec);
        let limit = if max_results == 0 { usize::MAX } else { max_results };
        let found: Vec<Row> = self
            .table
            .rows
            .values()
            .filter(|row| spec.matches(row, combinator))
            .take(limit)
            .cloned()
            .collect();
        debug!(table = %self.table.name, %combinator, conditions = spec.len(), found = found.len(), "search");
        Ok(Rows::Restartable(RestartableRows::new(found)))
    }

    fn get_max_value_in_column(&self, column: &str) -> Result<i64> {
        let column = self.table.spelling(column);
        Ok(self
            .table
            .rows
            .values()
            .filter_map(|row| row.get(&column).and_then(Value::as_numeric))
            .map(|n| n.truncate())
            .max()
            .unwrap_or(0))
    }

    fn get_unique_ids(&self) -> Result<Vec<Id>> {
        Ok(self.table.rows.keys().copied().collect())
    }

    fn warnings(&self) -> &[Warning] {
        self.diagnostics.warnings()
    }
    fn take_warnings(&mut self) -> Vec<Warning> {
        self.diagnostics.take()
    }
}
