//! Result sequences.
//!
//! Searches hand back rows lazily with their count known up front. Two
//! capabilities exist as separate types: [`RestartableRows`] is
//! array-backed and can be rewound, [`ForwardRows`] is cursor-backed and can
//! only move forward. [`Rows`] is whichever one a backend produced.

use std::fmt;
use std::iter::Peekable;

use crate::datatype::Row;

// ------------- Restartable -------------
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RestartableRows {
    rows: Vec<Row>,
    position: usize,
}

impl RestartableRows {
    pub fn new(rows: Vec<Row>) -> Self {
        Self { rows, position: 0 }
    }
    pub fn len(&self) -> usize {
        self.rows.len()
    }
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
    /// Key of the current row; keys run 0, 1, 2, ...
    pub fn key(&self) -> Option<usize> {
        self.valid().then_some(self.position)
    }
    pub fn valid(&self) -> bool {
        self.position < self.rows.len()
    }
    pub fn current(&self) -> Option<&Row> {
        self.rows.get(self.position)
    }
    pub fn advance(&mut self) {
        if self.valid() {
            self.position += 1;
        }
    }
    pub fn rewind(&mut self) {
        self.position = 0;
    }
    /// Does not disturb the iteration position.
    pub fn first(&self) -> Option<&Row> {
        self.rows.first()
    }
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }
    pub fn into_rows(self) -> Vec<Row> {
        self.rows
    }
}

impl Iterator for RestartableRows {
    type Item = Row;
    fn next(&mut self) -> Option<Row> {
        let row = self.current().cloned();
        self.advance();
        row
    }
    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.rows.len() - self.position.min(self.rows.len());
        (remaining, Some(remaining))
    }
}

// ------------- Forward only -------------
pub struct ForwardRows<'c> {
    count: usize,
    consumed: usize,
    cursor: Peekable<Box<dyn Iterator<Item = Row> + 'c>>,
}

impl<'c> ForwardRows<'c> {
    /// `count` is the number of rows the cursor will yield, as reported by the backend.
    pub fn new(count: usize, cursor: impl Iterator<Item = Row> + 'c) -> Self {
        let boxed: Box<dyn Iterator<Item = Row> + 'c> = Box::new(cursor);
        Self { count, consumed: 0, cursor: boxed.peekable() }
    }
    pub fn len(&self) -> usize {
        self.count
    }
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
    pub fn key(&mut self) -> Option<usize> {
        let consumed = self.consumed;
        self.valid().then_some(consumed)
    }
    pub fn valid(&mut self) -> bool {
        self.cursor.peek().is_some()
    }
    pub fn current(&mut self) -> Option<&Row> {
        self.cursor.peek()
    }
    pub fn advance(&mut self) {
        if self.cursor.next().is_some() {
            self.consumed += 1;
        }
    }
    /// The first row. A cursor cannot rewind, so once iteration has started
    /// there is no first row to give back.
    pub fn first(mut self) -> Option<Row> {
        if self.consumed > 0 {
            return None;
        }
        self.cursor.next()
    }
}

impl Iterator for ForwardRows<'_> {
    type Item = Row;
    fn next(&mut self) -> Option<Row> {
        let row = self.cursor.next();
        if row.is_some() {
            self.consumed += 1;
        }
        row
    }
    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.count.saturating_sub(self.consumed);
        (remaining, Some(remaining))
    }
}

impl fmt::Debug for ForwardRows<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ForwardRows")
            .field("count", &self.count)
            .field("consumed", &self.consumed)
            .finish()
    }
}

// ------------- Either -------------
#[derive(Debug)]
pub enum Rows<'c> {
    Restartable(RestartableRows),
    Forward(ForwardRows<'c>),
}

impl<'c> Rows<'c> {
    pub fn len(&self) -> usize {
        match self {
            Rows::Restartable(r) => r.len(),
            Rows::Forward(f) => f.len(),
        }
    }
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
    pub fn first(self) -> Option<Row> {
        match self {
            Rows::Restartable(r) => r.first().cloned(),
            Rows::Forward(f) => f.first(),
        }
    }
    pub fn is_restartable(&self) -> bool {
        matches!(self, Rows::Restartable(_))
    }
    /// Only array-backed sequences can rewind.
    pub fn restartable(&mut self) -> Option<&mut RestartableRows> {
        match self {
            Rows::Restartable(r) => Some(r),
            Rows::Forward(_) => None,
        }
    }
}

impl Iterator for Rows<'_> {
    type Item = Row;
    fn next(&mut self) -> Option<Row> {
        match self {
            Rows::Restartable(r) => r.next(),
            Rows::Forward(f) => f.next(),
        }
    }
    fn size_hint(&self) -> (usize, Option<usize>) {
        match self {
            Rows::Restartable(r) => r.size_hint(),
            Rows::Forward(f) => f.size_hint(),
        }
    }
}

impl From<Vec<Row>> for Rows<'_> {
    fn from(rows: Vec<Row>) -> Self {
        Rows::Restartable(RestartableRows::new(rows))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::row;

    #[test]
    fn restartable_rows_rewind() {
        let mut rows = RestartableRows::new(vec![row! { "id" => 1 }, row! { "id" => 2 }]);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows.key(), Some(0));
        rows.advance();
        assert_eq!(rows.key(), Some(1));
        assert_eq!(rows.first(), Some(&row! { "id" => 1 }));
        assert_eq!(rows.by_ref().count(), 1);
        assert!(!rows.valid());
        rows.rewind();
        assert_eq!(rows.current(), Some(&row! { "id" => 1 }));
    }

    #[test]
    fn forward_rows_cannot_rewind() {
        let source = vec![row! { "id" => 1 }, row! { "id" => 2 }];
        let mut rows = ForwardRows::new(2, source.into_iter());
        assert_eq!(rows.key(), Some(0));
        assert_eq!(rows.next(), Some(row! { "id" => 1 }));
        assert_eq!(rows.key(), Some(1));
        assert_eq!(rows.len(), 2);
        assert_eq!(rows.first(), None);
    }

    #[test]
    fn empty_sequences_have_no_first() {
        let rows: Rows = Vec::new().into();
        assert!(rows.is_empty());
        assert_eq!(rows.first(), None);
        let forward = ForwardRows::new(0, std::iter::empty());
        assert!(forward.first().is_none());
    }
}
