//! Fetched rows
//!
//! A query result is copied out of the store into a [`RowSet`] shared by
//! reference count. [`Rows`], [`Row`] and [`RowsIter`] are cheap handles into
//! it, so a row stays valid after the statement, the result set or even the
//! connection that produced it is gone.
//!
//! Typed getters return the type's default value when the column is NULL. Use
//! [`Row::get_opt`] or [`Row::is_null`] to tell NULL apart from a stored zero.

use std::iter::FusedIterator;
use std::sync::Arc;

use crate::{
    error::{Error, Result},
    types::FromCell,
    value::Cell,
};

/// Owned storage for every row of one result
#[derive(Debug, Default, PartialEq)]
pub(crate) struct RowSet {
    columns: Vec<String>,
    rows: Vec<Vec<Cell>>,
}

impl RowSet {
    pub(crate) fn new(columns: Vec<String>, rows: Vec<Vec<Cell>>) -> Self {
        Self { columns, rows }
    }
}

/// A way of addressing a column: by position or by name
pub trait ColumnIndex {
    /// Resolve to a position among `columns`
    fn position(&self, columns: &[String]) -> Option<usize>;

    /// Human readable form for error messages
    fn describe(&self) -> String;
}

impl ColumnIndex for usize {
    fn position(&self, columns: &[String]) -> Option<usize> {
        (*self < columns.len()).then_some(*self)
    }

    fn describe(&self) -> String {
        format!("#{}", self)
    }
}

impl ColumnIndex for str {
    fn position(&self, columns: &[String]) -> Option<usize> {
        columns.iter().position(|c| c == self)
    }

    fn describe(&self) -> String {
        format!("'{}'", self)
    }
}

impl ColumnIndex for String {
    fn position(&self, columns: &[String]) -> Option<usize> {
        self.as_str().position(columns)
    }

    fn describe(&self) -> String {
        self.as_str().describe()
    }
}

impl<T: ColumnIndex + ?Sized> ColumnIndex for &T {
    fn position(&self, columns: &[String]) -> Option<usize> {
        (**self).position(columns)
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

/// One row of a result
#[derive(Clone)]
pub struct Row {
    set: Arc<RowSet>,
    index: usize,
}

impl Row {
    fn cells(&self) -> &[Cell] {
        self.set.rows.get(self.index).map(Vec::as_slice).unwrap_or_default()
    }

    /// The raw cell stored in `column`
    pub fn cell<I: ColumnIndex>(&self, column: I) -> Result<&Cell> {
        column
            .position(&self.set.columns)
            .and_then(|i| self.cells().get(i))
            .ok_or_else(|| Error::database(format!("unknown column {}", column.describe())))
    }

    /// Read `column` as `T`, the type's default when NULL
    pub fn get<T: FromCell, I: ColumnIndex>(&self, column: I) -> Result<T> {
        let cell = self.cell(column)?;
        if cell.is_null() {
            Ok(T::default())
        } else {
            T::from_cell(cell)
        }
    }

    /// Read `column` into `out`
    ///
    /// Returns `false` and leaves `out` untouched when the column is NULL.
    pub fn get_into<T: FromCell, I: ColumnIndex>(&self, column: I, out: &mut T) -> Result<bool> {
        match self.get_opt(column)? {
            Some(value) => {
                *out = value;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Read `column` as `T`, `None` when NULL
    pub fn get_opt<T: FromCell, I: ColumnIndex>(&self, column: I) -> Result<Option<T>> {
        let cell = self.cell(column)?;
        if cell.is_null() {
            Ok(None)
        } else {
            T::from_cell(cell).map(Some)
        }
    }

    /// Check whether `column` holds NULL
    pub fn is_null<I: ColumnIndex>(&self, column: I) -> Result<bool> {
        self.cell(column).map(Cell::is_null)
    }

    /// Text value of `column`, empty when NULL
    pub fn get_string<I: ColumnIndex>(&self, column: I) -> Result<String> {
        self.get(column)
    }

    /// Boolean value of `column`, `false` when NULL
    pub fn get_bool<I: ColumnIndex>(&self, column: I) -> Result<bool> {
        self.get(column)
    }

    /// 8-bit signed value of `column`
    pub fn get_i8<I: ColumnIndex>(&self, column: I) -> Result<i8> {
        self.get(column)
    }

    /// 8-bit unsigned value of `column`
    pub fn get_u8<I: ColumnIndex>(&self, column: I) -> Result<u8> {
        self.get(column)
    }

    /// 16-bit signed value of `column`
    pub fn get_i16<I: ColumnIndex>(&self, column: I) -> Result<i16> {
        self.get(column)
    }

    /// 16-bit unsigned value of `column`
    pub fn get_u16<I: ColumnIndex>(&self, column: I) -> Result<u16> {
        self.get(column)
    }

    /// 32-bit signed value of `column`
    pub fn get_i32<I: ColumnIndex>(&self, column: I) -> Result<i32> {
        self.get(column)
    }

    /// 32-bit unsigned value of `column`
    pub fn get_u32<I: ColumnIndex>(&self, column: I) -> Result<u32> {
        self.get(column)
    }

    /// 64-bit signed value of `column`
    pub fn get_i64<I: ColumnIndex>(&self, column: I) -> Result<i64> {
        self.get(column)
    }

    /// 64-bit unsigned value of `column`
    pub fn get_u64<I: ColumnIndex>(&self, column: I) -> Result<u64> {
        self.get(column)
    }

    /// Single precision value of `column`
    pub fn get_f32<I: ColumnIndex>(&self, column: I) -> Result<f32> {
        self.get(column)
    }

    /// Double precision value of `column`
    pub fn get_f64<I: ColumnIndex>(&self, column: I) -> Result<f64> {
        self.get(column)
    }

    /// Binary value of `column`, empty when NULL
    pub fn get_blob<I: ColumnIndex>(&self, column: I) -> Result<Vec<u8>> {
        self.get(column)
    }

    /// Column names in result order
    pub fn columns(&self) -> &[String] {
        &self.set.columns
    }

    /// Number of columns
    pub fn len(&self) -> usize {
        self.cells().len()
    }

    /// Check if the row has no columns
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for Row {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map()
            .entries(self.set.columns.iter().zip(self.cells()))
            .finish()
    }
}

/// Every row of a result
#[derive(Clone, Debug, Default)]
pub struct Rows {
    set: Arc<RowSet>,
}

impl Rows {
    pub(crate) fn new(set: RowSet) -> Self {
        Self { set: Arc::new(set) }
    }

    /// Number of rows
    pub fn len(&self) -> usize {
        self.set.rows.len()
    }

    /// Check if the result has no rows
    pub fn is_empty(&self) -> bool {
        self.set.rows.is_empty()
    }

    /// The row at `index`
    pub fn get(&self, index: usize) -> Option<Row> {
        (index < self.len()).then(|| Row {
            set: Arc::clone(&self.set),
            index,
        })
    }

    /// The first row, if any
    pub fn first(&self) -> Option<Row> {
        self.get(0)
    }

    /// Column names in result order; empty when no row was returned
    pub fn columns(&self) -> &[String] {
        &self.set.columns
    }

    /// Iterate over the rows
    pub fn iter(&self) -> RowsIter {
        RowsIter {
            set: Arc::clone(&self.set),
            front: 0,
            back: self.len(),
        }
    }
}

impl IntoIterator for Rows {
    type Item = Row;
    type IntoIter = RowsIter;

    fn into_iter(self) -> RowsIter {
        let back = self.len();
        RowsIter {
            set: self.set,
            front: 0,
            back,
        }
    }
}

impl IntoIterator for &Rows {
    type Item = Row;
    type IntoIter = RowsIter;

    fn into_iter(self) -> RowsIter {
        self.iter()
    }
}

/// Cursor over a [`Rows`] result
///
/// Two iterators compare equal when they walk the same result and sit at the
/// same offsets.
#[derive(Clone, Debug)]
pub struct RowsIter {
    set: Arc<RowSet>,
    front: usize,
    back: usize,
}

impl RowsIter {
    /// Position of the next row yielded from the front
    pub fn offset(&self) -> usize {
        self.front
    }

    fn row(&self, index: usize) -> Row {
        Row {
            set: Arc::clone(&self.set),
            index,
        }
    }
}

impl Iterator for RowsIter {
    type Item = Row;

    fn next(&mut self) -> Option<Row> {
        if self.front >= self.back {
            return None;
        }
        let row = self.row(self.front);
        self.front += 1;
        Some(row)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.back - self.front;
        (remaining, Some(remaining))
    }

    fn nth(&mut self, n: usize) -> Option<Row> {
        self.front = self.front.saturating_add(n).min(self.back);
        self.next()
    }
}

impl DoubleEndedIterator for RowsIter {
    fn next_back(&mut self) -> Option<Row> {
        if self.front >= self.back {
            return None;
        }
        self.back -= 1;
        Some(self.row(self.back))
    }
}

impl ExactSizeIterator for RowsIter {}

impl FusedIterator for RowsIter {}

impl PartialEq for RowsIter {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.set, &other.set) && self.front == other.front && self.back == other.back
    }
}

impl Eq for RowsIter {}
