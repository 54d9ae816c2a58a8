//! Multi-row inserts
//!
//! [`MultiInsert`] collects rows for one table and writes them with a single
//! `INSERT ... VALUES (...), (...)` statement built from
//! [`multi_insert`](crate::multi_insert). Row `i` binds its values to the
//! placeholders `:<column>_i`.
//!
//! # Example
//!
//! ```
//! use fty_common_db::batch::MultiInsert;
//!
//! let mut insert = MultiInsert::new("t_attr", &["keytag", "value"]).or_ignore();
//! insert.add_row(["port", "auto"])?;
//! insert.add_row(["pollfreq", "30"])?;
//!
//! assert_eq!(insert.len(), 2);
//! assert_eq!(
//!     insert.sql(),
//!     "INSERT OR IGNORE INTO t_attr (keytag, value) VALUES (:keytag_0, :value_0), (:keytag_1, :value_1)"
//! );
//! # Ok::<(), fty_common_db::Error>(())
//! ```

use crate::{
    connection::Connection,
    error::{Error, Result},
    query_builder::multi_insert,
    types::ToBind,
    value::BindValue,
};

/// Builder for a single statement inserting many rows
#[derive(Debug, Clone)]
pub struct MultiInsert {
    table: String,
    columns: Vec<String>,
    rows: Vec<Vec<BindValue>>,
    or_ignore: bool,
}

impl MultiInsert {
    /// Start an insert into `table` over `columns`
    ///
    /// Column names double as placeholder names, so they must be plain
    /// identifiers.
    pub fn new(table: impl Into<String>, columns: &[&str]) -> Self {
        Self {
            table: table.into(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows: Vec::new(),
            or_ignore: false,
        }
    }

    /// Skip rows that would violate a uniqueness constraint
    pub fn or_ignore(mut self) -> Self {
        self.or_ignore = true;
        self
    }

    /// Append one row; values are matched to columns by position
    pub fn add_row<I, T>(&mut self, values: I) -> Result<&mut Self>
    where
        I: IntoIterator<Item = T>,
        T: ToBind,
    {
        let row: Vec<BindValue> = values.into_iter().map(|v| v.to_bind_value()).collect();
        if row.len() != self.columns.len() {
            return Err(Error::database(format!(
                "row has {} values for {} columns of {}",
                row.len(),
                self.columns.len(),
                self.table
            )));
        }
        self.rows.push(row);
        Ok(self)
    }

    /// Number of rows collected
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Check if no row was added
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Drop every collected row
    pub fn clear(&mut self) {
        self.rows.clear();
    }

    /// The statement text for the rows collected so far
    pub fn sql(&self) -> String {
        let columns: Vec<&str> = self.columns.iter().map(String::as_str).collect();
        format!(
            "INSERT {}INTO {} ({}) VALUES {}",
            if self.or_ignore { "OR IGNORE " } else { "" },
            self.table,
            columns.join(", "),
            multi_insert(&columns, self.rows.len())
        )
    }

    /// Insert every collected row, returning the number of rows written
    ///
    /// Nothing is sent to the store when no row was added.
    pub fn execute(&self, conn: &Connection) -> Result<usize> {
        if self.rows.is_empty() {
            return Ok(0);
        }

        let mut statement = conn.prepare(&self.sql())?;
        for (index, row) in self.rows.iter().enumerate() {
            for (column, value) in self.columns.iter().zip(row) {
                statement.bind_indexed(column, index, value);
            }
        }
        statement.execute()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::test_support::temp_connection;

    fn setup() -> (tempfile::TempDir, Connection) {
        let (dir, conn) = temp_connection();
        conn.batch_execute("CREATE TABLE attr (keytag TEXT PRIMARY KEY, value TEXT, n INTEGER)")
            .unwrap();
        (dir, conn)
    }

    #[test]
    fn test_sql_without_rows() {
        let insert = MultiInsert::new("attr", &["keytag", "value"]);
        assert!(insert.is_empty());
        assert_eq!(insert.sql(), "INSERT INTO attr (keytag, value) VALUES ");
    }

    #[test]
    fn test_add_row_arity_mismatch() {
        let mut insert = MultiInsert::new("attr", &["keytag", "value"]);
        let err = insert.add_row(["only-one"]).unwrap_err();
        assert!(err.message().contains("1 values for 2 columns"));
        assert!(insert.is_empty());
    }

    #[test]
    fn test_execute_inserts_all_rows() {
        let (_dir, conn) = setup();
        let mut insert = MultiInsert::new("attr", &["keytag", "value", "n"]);
        insert
            .add_row([BindValue::Text("a".into()), BindValue::Text("1".into()), BindValue::Integer(1)])
            .unwrap()
            .add_row([
                "b".to_bind_value(),
                BindValue::Null,
                2i32.to_bind_value(),
            ])
            .unwrap();

        assert_eq!(insert.execute(&conn).unwrap(), 2);

        let row = conn
            .select_row("SELECT value, n FROM attr WHERE keytag = 'b'", ())
            .unwrap();
        assert!(row.is_null("value").unwrap());
        assert_eq!(row.get_i32("n").unwrap(), 2);
    }

    #[test]
    fn test_execute_empty_is_noop() {
        let (_dir, conn) = setup();
        let insert = MultiInsert::new("no_such_table", &["x"]);
        assert_eq!(insert.execute(&conn).unwrap(), 0);
    }

    #[test]
    fn test_or_ignore_skips_duplicates() {
        let (_dir, conn) = setup();
        conn.batch_execute("INSERT INTO attr (keytag, value) VALUES ('a', 'old')")
            .unwrap();

        let mut insert = MultiInsert::new("attr", &["keytag", "value"]).or_ignore();
        insert.add_row(["a", "new"]).unwrap();
        insert.add_row(["b", "new"]).unwrap();

        assert_eq!(insert.execute(&conn).unwrap(), 1);
        let row = conn
            .select_row("SELECT value FROM attr WHERE keytag = 'a'", ())
            .unwrap();
        assert_eq!(row.get_string("value").unwrap(), "old");
    }

    #[test]
    fn test_plain_insert_fails_on_duplicate() {
        let (_dir, conn) = setup();
        let mut insert = MultiInsert::new("attr", &["keytag", "value"]);
        insert.add_row(["a", "1"]).unwrap();
        insert.add_row(["a", "2"]).unwrap();
        assert!(insert.execute(&conn).is_err());
    }
}
