//! Prepared statements
//!
//! A [`Statement`] pairs a compiled SQL text with the values bound to its
//! named placeholders. Binding returns the statement so calls chain; a
//! statement can be re-bound and executed any number of times.

use std::sync::Arc;

use diesel::connection::LoadConnection;
use diesel::row::{Field as _, Row as _};
use diesel::sqlite::Sqlite;
use diesel::{RunQueryDsl, SqliteConnection};

use crate::{
    bind_collector::{bind_values, indexed_name, BindArgs, BindCollector},
    error::{Error, Result},
    query_builder::CompiledSql,
    registry::Session,
    row::{Row, RowSet, Rows},
    tracing_support::{SpanOperation, SpanTimer, TracingConfig, LOG_TARGET},
    types::ToBind,
    value::{BindValue, Cell},
};

/// A prepared statement with its current bindings
pub struct Statement {
    session: Arc<Session>,
    compiled: Arc<CompiledSql>,
    binds: BindCollector,
    tracing: TracingConfig,
}

impl Statement {
    pub(crate) fn new(
        session: Arc<Session>,
        compiled: Arc<CompiledSql>,
        tracing: TracingConfig,
    ) -> Self {
        Self {
            session,
            compiled,
            binds: BindCollector::new(),
            tracing,
        }
    }

    /// The compiled form shared with every statement of the same text
    pub fn compiled(&self) -> &Arc<CompiledSql> {
        &self.compiled
    }

    /// The SQL text as written
    pub fn sql(&self) -> &str {
        self.compiled.sql()
    }

    /// Bind `value` to the placeholder `:name`
    ///
    /// Names the statement does not use are ignored.
    pub fn bind<T: ToBind>(&mut self, name: &str, value: T) -> &mut Self {
        self.set(name.to_string(), value.to_bind_value());
        self
    }

    /// Bind NULL to the placeholder `:name`
    pub fn bind_null(&mut self, name: &str) -> &mut Self {
        self.set(name.to_string(), BindValue::Null);
        self
    }

    /// Bind one or several [`Arg`](crate::Arg)s at once
    pub fn bind_args<A: BindArgs>(&mut self, args: A) -> &mut Self {
        let mut collected = BindCollector::new();
        args.bind_into(&mut collected, None);
        self.absorb(collected);
        self
    }

    /// Bind arguments for row `index` of a multi-row statement
    ///
    /// Each argument `name` binds the placeholder `:name_<index>`, matching
    /// the fragment produced by [`multi_insert`](crate::multi_insert).
    pub fn bind_multi<A: BindArgs>(&mut self, index: usize, args: A) -> &mut Self {
        let mut collected = BindCollector::new();
        args.bind_into(&mut collected, Some(index));
        self.absorb(collected);
        self
    }

    /// Bind a value to `:<name>_<index>`
    pub fn bind_indexed<T: ToBind>(&mut self, name: &str, index: usize, value: T) -> &mut Self {
        self.set(indexed_name(name, index), value.to_bind_value());
        self
    }

    /// Forget every bound value
    pub fn clear_bindings(&mut self) -> &mut Self {
        self.binds.clear();
        self
    }

    fn absorb(&mut self, collected: BindCollector) {
        for (name, value) in collected.into_entries() {
            self.set(name, value);
        }
    }

    fn set(&mut self, name: String, value: BindValue) {
        if self.compiled.has_placeholder(&name) {
            self.binds.set(name, value);
        } else {
            tracing::trace!(
                target: LOG_TARGET,
                name = name.as_str(),
                "ignoring bind for unknown parameter"
            );
        }
    }

    /// Execute the statement, returning the number of affected rows
    pub fn execute(&self) -> Result<usize> {
        let timer = SpanTimer::start(SpanOperation::Execute, &self.tracing, self.sql());
        let outcome = self.run_execute();
        timer.finish(outcome, |n| *n)
    }

    /// Fetch exactly one row
    ///
    /// Fails with [`Error::NotFound`] when the query returns no row. When it
    /// returns several, the first is kept.
    pub fn select_row(&self) -> Result<Row> {
        let timer = SpanTimer::start(SpanOperation::SelectRow, &self.tracing, self.sql());
        let outcome = self.load(Some(1)).and_then(|rows| {
            rows.first()
                .ok_or_else(|| Error::NotFound(format!("no row returned by: {}", self.sql())))
        });
        timer.finish(outcome, |_| 1)
    }

    /// Fetch every row
    pub fn select(&self) -> Result<Rows> {
        let timer = SpanTimer::start(SpanOperation::Select, &self.tracing, self.sql());
        let outcome = self.load(None);
        timer.finish(outcome, Rows::len)
    }

    fn run_execute(&self) -> Result<usize> {
        let values = self.binds.ordered(&self.compiled)?;
        let query = bind_values(
            diesel::sql_query(self.compiled.positional_sql()).into_boxed::<Sqlite>(),
            values,
        );
        let mut conn = self.session.lock()?;
        Ok(query.execute(&mut **conn)?)
    }

    /// Copy at most `limit` rows out of the cursor
    fn load(&self, limit: Option<usize>) -> Result<Rows> {
        let values = self.binds.ordered(&self.compiled)?;
        let query = bind_values(
            diesel::sql_query(self.compiled.positional_sql()).into_boxed::<Sqlite>(),
            values,
        );
        let mut conn = self.session.lock()?;
        let cursor = <SqliteConnection as LoadConnection>::load(&mut **conn, query)?;

        let mut columns = Vec::new();
        let mut rows = Vec::new();
        for row in cursor.take(limit.unwrap_or(usize::MAX)) {
            let row = row?;
            let mut cells = Vec::with_capacity(row.field_count());
            for idx in 0..row.field_count() {
                let field = row
                    .get(idx)
                    .ok_or_else(|| Error::database(format!("missing column #{}", idx)))?;
                if rows.is_empty() {
                    columns.push(field.field_name().unwrap_or_default().to_string());
                }
                cells.push(Cell::from_sqlite(field.value())?);
            }
            rows.push(cells);
        }
        Ok(Rows::new(RowSet::new(columns, rows)))
    }
}

impl std::fmt::Debug for Statement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Statement")
            .field("sql", &self.compiled.sql())
            .field("bound", &self.binds.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bind_collector::{arg, nullable};
    use crate::connection::test_support::temp_connection;
    use crate::types::FromCell;
    use crate::Connection;

    fn setup() -> (tempfile::TempDir, Connection) {
        let (dir, conn) = temp_connection();
        conn.batch_execute(
            "CREATE TABLE kv (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                k TEXT NOT NULL UNIQUE,
                v TEXT,
                n INTEGER,
                r REAL,
                b BLOB
            )",
        )
        .unwrap();
        (dir, conn)
    }

    #[test]
    fn test_bind_chaining_and_execute() {
        let (_dir, conn) = setup();
        let count = conn
            .prepare("INSERT INTO kv (k, v, n) VALUES (:k, :v, :n)")
            .unwrap()
            .bind("k", "a")
            .bind("v", String::from("alpha"))
            .bind("n", 7u8)
            .execute()
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_statement_reuse_with_rebind() {
        let (_dir, conn) = setup();
        let mut st = conn.prepare("INSERT INTO kv (k, n) VALUES (:k, :n)").unwrap();
        for (i, key) in ["a", "b", "c"].iter().enumerate() {
            st.bind("k", key).bind("n", i as i64);
            assert_eq!(st.execute().unwrap(), 1);
        }

        let rows = conn.select("SELECT k, n FROM kv ORDER BY n", ()).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows.get(2).unwrap().get_string("k").unwrap(), "c");
    }

    #[test]
    fn test_execute_count_for_update_and_delete() {
        let (_dir, conn) = setup();
        for key in ["a", "b", "c"] {
            conn.execute("INSERT INTO kv (k, n) VALUES (:k, 1)", arg("k", key))
                .unwrap();
        }

        let updated = conn
            .execute("UPDATE kv SET n = :n WHERE n = 1", arg("n", 2))
            .unwrap();
        assert_eq!(updated, 3);

        let deleted = conn
            .execute("DELETE FROM kv WHERE k = :k", arg("k", "missing"))
            .unwrap();
        assert_eq!(deleted, 0);
    }

    #[test]
    fn test_missing_binding_is_error() {
        let (_dir, conn) = setup();
        let err = conn
            .prepare("INSERT INTO kv (k, v) VALUES (:k, :v)")
            .unwrap()
            .bind("k", "a")
            .execute()
            .unwrap_err();
        assert!(matches!(err, Error::Database(_)));
        assert!(err.message().contains(":v"));
    }

    #[test]
    fn test_unknown_binding_is_ignored() {
        let (_dir, conn) = setup();
        let count = conn
            .prepare("INSERT INTO kv (k) VALUES (:k)")
            .unwrap()
            .bind("k", "a")
            .bind("extra", 1)
            .execute()
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_repeated_placeholder() {
        let (_dir, conn) = setup();
        conn.execute("INSERT INTO kv (k, v) VALUES (:x, :x)", arg("x", "same"))
            .unwrap();
        let row = conn
            .select_row("SELECT v FROM kv WHERE k = :x AND v = :x", arg("x", "same"))
            .unwrap();
        assert_eq!(row.get_string("v").unwrap(), "same");
    }

    #[test]
    fn test_value_types_round_trip() {
        let (_dir, conn) = setup();
        conn.execute(
            "INSERT INTO kv (k, v, n, r, b) VALUES (:k, :v, :n, :r, :b)",
            (
                arg("k", "types"),
                nullable(false, "v", "ignored"),
                arg("n", u64::MAX),
                arg("r", 2.5f64),
                arg("b", vec![0u8, 1, 2]),
            ),
        )
        .unwrap();

        let row = conn
            .select_row("SELECT v, n, r, b FROM kv WHERE k = :k", arg("k", "types"))
            .unwrap();
        assert!(row.is_null("v").unwrap());
        assert_eq!(row.get_string("v").unwrap(), "");
        assert_eq!(row.get_u64("n").unwrap(), u64::MAX);
        assert!((row.get_f64("r").unwrap() - 2.5).abs() < f64::EPSILON);
        assert_eq!(row.get_blob("b").unwrap(), vec![0u8, 1, 2]);
    }

    #[test]
    fn test_select_row_first_of_many() {
        let (_dir, conn) = setup();
        for key in ["a", "b"] {
            conn.execute("INSERT INTO kv (k) VALUES (:k)", arg("k", key))
                .unwrap();
        }
        let row = conn
            .select_row("SELECT k FROM kv ORDER BY k DESC", ())
            .unwrap();
        assert_eq!(row.get_string("k").unwrap(), "b");
    }

    #[test]
    fn test_select_row_not_found() {
        let (_dir, conn) = setup();
        let err = conn
            .prepare("SELECT k FROM kv WHERE k = :k")
            .unwrap()
            .bind("k", "nope")
            .select_row()
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_select_empty() {
        let (_dir, conn) = setup();
        let rows = conn.select("SELECT k FROM kv", ()).unwrap();
        assert!(rows.is_empty());
        assert!(rows.columns().is_empty());
    }

    #[test]
    fn test_bind_multi() {
        let (_dir, conn) = setup();
        let mut st = conn
            .prepare("INSERT INTO kv (k, v) VALUES (:k_0, :v_0), (:k_1, :v_1)")
            .unwrap();
        st.bind_multi(0, (arg("k", "a"), arg("v", "1")))
            .bind_multi(1, (arg("k", "b"), arg("v", "2")));
        assert_eq!(st.execute().unwrap(), 2);
    }

    #[test]
    fn test_constraint_violation_is_database_error() {
        let (_dir, conn) = setup();
        conn.execute("INSERT INTO kv (k) VALUES (:k)", arg("k", "dup"))
            .unwrap();
        let err = conn
            .execute("INSERT INTO kv (k) VALUES (:k)", arg("k", "dup"))
            .unwrap_err();
        assert!(err.message().contains("UNIQUE"));
    }

    #[test]
    fn test_clear_bindings() {
        let (_dir, conn) = setup();
        let mut st = conn.prepare("INSERT INTO kv (k) VALUES (:k)").unwrap();
        st.bind("k", "a").clear_bindings();
        assert!(st.execute().is_err());
    }

    fn read_back<T: ToBind + FromCell>(conn: &Connection, value: Option<T>) -> T {
        conn.select_row("SELECT :v AS v", arg("v", value))
            .unwrap()
            .get::<T, _>("v")
            .unwrap()
    }

    #[test]
    fn test_select_bound_literal() {
        let (_dir, conn) = setup();
        let row = conn.select_row("SELECT :x AS v", arg("x", 42)).unwrap();
        assert_eq!(row.get_i32("v").unwrap(), 42);
    }

    #[test]
    fn test_update_with_unset_nullable_reads_default() {
        let (_dir, conn) = setup();
        conn.execute("INSERT INTO kv (k, n) VALUES (:k, :n)", (arg("k", "a"), arg("n", 7)))
            .unwrap();

        let updated = conn
            .execute(
                "UPDATE kv SET n = :a WHERE k = :k",
                (nullable(false, "a", 5), arg("k", "a")),
            )
            .unwrap();
        assert_eq!(updated, 1);

        let row = conn
            .select_row("SELECT n FROM kv WHERE k = :k", arg("k", "a"))
            .unwrap();
        assert_eq!(row.get_i32("n").unwrap(), 0);
        assert!(row.is_null("n").unwrap());
    }

    #[test]
    fn test_scalar_round_trips() {
        let (_dir, conn) = setup();

        assert_eq!(read_back(&conn, Some(-100i8)), -100);
        assert_eq!(read_back(&conn, Some(-30_000i16)), -30_000);
        assert_eq!(read_back(&conn, Some(i32::MIN)), i32::MIN);
        assert_eq!(read_back(&conn, Some(250u8)), 250);
        assert_eq!(read_back(&conn, Some(60_000u16)), 60_000);
        assert_eq!(read_back(&conn, Some(4_000_000_000u32)), 4_000_000_000);
        assert_eq!(read_back(&conn, Some(1.5f32)), 1.5);
        assert!(read_back(&conn, Some(true)));
        assert!(!read_back(&conn, Some(false)));

        assert_eq!(read_back::<i8>(&conn, None), 0);
        assert_eq!(read_back::<i16>(&conn, None), 0);
        assert_eq!(read_back::<i32>(&conn, None), 0);
        assert_eq!(read_back::<u8>(&conn, None), 0);
        assert_eq!(read_back::<u16>(&conn, None), 0);
        assert_eq!(read_back::<u32>(&conn, None), 0);
        assert_eq!(read_back::<f32>(&conn, None), 0.0);
        assert!(!read_back::<bool>(&conn, None));
        assert_eq!(read_back::<String>(&conn, None), "");
    }

    #[test]
    fn test_rows_get_matches_nth() {
        let (_dir, conn) = setup();
        for i in 0..6 {
            conn.execute(
                "INSERT INTO kv (k, n) VALUES (:k, :n)",
                (arg("k", format!("k{}", i)), arg("n", i)),
            )
            .unwrap();
        }
        let rows = conn.select("SELECT n FROM kv ORDER BY n", ()).unwrap();
        assert_eq!(rows.len(), 6);

        for i in [0usize, 3, 5, 2] {
            let direct = rows.get(i).unwrap().get_i64("n").unwrap();
            let walked = rows.iter().nth(i).unwrap().get_i64("n").unwrap();
            assert_eq!(direct, walked);
            assert_eq!(direct, i as i64);
        }
        assert!(rows.get(6).is_none());
        assert!(rows.iter().nth(6).is_none());

        let mut it = rows.iter();
        it.nth(1);
        assert_eq!(it.offset(), 2);
        assert_eq!(
            it.nth(2).unwrap().get_i64("n").unwrap(),
            rows.get(4).unwrap().get_i64("n").unwrap()
        );
    }

    #[test]
    fn test_select_row_stops_after_first_row() {
        let (_dir, conn) = setup();
        for (k, n) in [("a", 1), ("b", i64::MIN)] {
            conn.execute("INSERT INTO kv (k, n) VALUES (:k, :n)", (arg("k", k), arg("n", n)))
                .unwrap();
        }
        // abs() of the second row overflows when it is stepped to
        let sql = "SELECT abs(n) AS v FROM kv ORDER BY id";

        assert!(conn.select(sql, ()).is_err());
        let row = conn.select_row(sql, ()).unwrap();
        assert_eq!(row.get_i64("v").unwrap(), 1);
    }
}
