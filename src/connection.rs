//! Database connection
//!
//! A [`Connection`] names a database by URL and prepares statements against
//! it. The URL comes from the `DBURL` environment variable when set, otherwise
//! from [`DEFAULT_DATABASE_URL`]. On first use a connection checks a session
//! out of the [`Registry`] pool for its URL and keeps it until dropped, so
//! connections are independent of each other.
//!
//! # Example
//!
//! ```
//! use fty_common_db::{arg, Connection};
//!
//! # fn main() -> fty_common_db::Result<()> {
//! # let dir = tempfile::TempDir::new().unwrap();
//! # let url = dir.path().join("doc.sqlite").to_string_lossy().into_owned();
//! let conn = Connection::with_url(url);
//! conn.batch_execute("CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT)")?;
//!
//! conn.execute("INSERT INTO t (name) VALUES (:name)", arg("name", "ups-1"))?;
//! let id = conn.last_insert_id()?;
//!
//! let row = conn.select_row("SELECT name FROM t WHERE id = :id", arg("id", id))?;
//! assert_eq!(row.get_string("name")?, "ups-1");
//! # Ok(())
//! # }
//! ```

use std::sync::{Arc, OnceLock};

use diesel::connection::SimpleConnection;

use crate::{
    bind_collector::BindArgs,
    error::Result,
    registry::{Registry, Session},
    row::{Row, Rows},
    statement::Statement,
    tracing_support::{SpanOperation, SpanTimer, TracingConfig, LOG_TARGET},
    transaction::Transaction,
};

/// Environment variable overriding the database URL
pub const DATABASE_URL_ENV: &str = "DBURL";

/// URL used when [`DATABASE_URL_ENV`] is not set
pub const DEFAULT_DATABASE_URL: &str = "/var/lib/fty/fty-common-db.sqlite";

/// Connection settings
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Location of the database
    pub url: String,
    /// How operations are logged
    pub tracing: TracingConfig,
}

impl DatabaseConfig {
    /// Settings for an explicit URL
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            tracing: TracingConfig::default(),
        }
    }

    /// Settings resolved from the environment
    ///
    /// An unset or blank `DBURL` falls back to [`DEFAULT_DATABASE_URL`].
    pub fn from_env() -> Self {
        Self::new(resolve_url(std::env::var(DATABASE_URL_ENV).ok()))
    }

    /// Replace the logging settings
    pub fn with_tracing(mut self, tracing: TracingConfig) -> Self {
        self.tracing = tracing;
        self
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

fn resolve_url(env_value: Option<String>) -> String {
    match env_value {
        Some(url) if !url.trim().is_empty() => url,
        _ => DEFAULT_DATABASE_URL.to_string(),
    }
}

/// A connection to one database
///
/// Cheap to create; nothing touches the store until the first statement.
/// Connections are `Send + Sync`; threads sharing one connection are
/// serialized on its session.
pub struct Connection {
    config: DatabaseConfig,
    registry: Arc<Registry>,
    session: OnceLock<Arc<Session>>,
}

impl Connection {
    /// Connect to the database named by the environment
    pub fn new() -> Self {
        Self::with_config(DatabaseConfig::from_env())
    }

    /// Connect to an explicit URL
    pub fn with_url(url: impl Into<String>) -> Self {
        Self::with_config(DatabaseConfig::new(url))
    }

    /// Connect with explicit settings through the process-wide registry
    pub fn with_config(config: DatabaseConfig) -> Self {
        Self::with_registry(config, Registry::global())
    }

    /// Connect through a specific registry
    pub fn with_registry(config: DatabaseConfig, registry: Arc<Registry>) -> Self {
        Self {
            config,
            registry,
            session: OnceLock::new(),
        }
    }

    /// The database URL
    pub fn url(&self) -> &str {
        &self.config.url
    }

    /// The connection settings
    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    pub(crate) fn session(&self) -> Result<Arc<Session>> {
        if let Some(session) = self.session.get() {
            return Ok(Arc::clone(session));
        }
        let session = Arc::new(self.registry.checkout(&self.config.url)?);
        Ok(Arc::clone(self.session.get_or_init(|| session)))
    }

    /// Prepare a statement
    ///
    /// Statements are compiled once per distinct SQL text and shared
    /// process-wide; preparing the same text again is a cache lookup.
    pub fn prepare(&self, sql: &str) -> Result<Statement> {
        let session = self.session()?;
        let compiled = self.registry.statements().get_or_compile(sql);
        tracing::trace!(
            target: LOG_TARGET,
            op = SpanOperation::Prepare.as_str(),
            params = compiled.placeholders().len(),
            "prepared statement"
        );
        Ok(Statement::new(session, compiled, self.config.tracing.clone()))
    }

    /// Prepare, bind `args` and fetch exactly one row
    ///
    /// Fails with [`Error::NotFound`](crate::Error::NotFound) when no row matches.
    pub fn select_row<A: BindArgs>(&self, sql: &str, args: A) -> Result<Row> {
        self.prepare(sql)?.bind_args(args).select_row()
    }

    /// Prepare, bind `args` and fetch every row
    pub fn select<A: BindArgs>(&self, sql: &str, args: A) -> Result<Rows> {
        self.prepare(sql)?.bind_args(args).select()
    }

    /// Prepare, bind `args` and execute, returning the affected row count
    pub fn execute<A: BindArgs>(&self, sql: &str, args: A) -> Result<usize> {
        self.prepare(sql)?.bind_args(args).execute()
    }

    /// Row id generated by the most recent insert on this connection
    pub fn last_insert_id(&self) -> Result<i64> {
        self.select_row("SELECT last_insert_rowid() AS id", ())?
            .get_i64("id")
    }

    /// Run a script of `;` separated statements without parameters
    pub fn batch_execute(&self, sql: &str) -> Result<()> {
        let session = self.session()?;
        let timer = SpanTimer::start(SpanOperation::Batch, &self.config.tracing, sql);
        let outcome = session
            .lock()
            .and_then(|mut conn| (**conn).batch_execute(sql).map_err(Into::into));
        timer.finish(outcome, |_| 0)
    }

    /// Open a transaction
    ///
    /// Fails when this connection already has a transaction open.
    pub fn transaction(&self) -> Result<Transaction<'_>> {
        Transaction::begin(self)
    }
}

impl Default for Connection {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("url", &self.config.url)
            .field("open", &self.session.get().is_some())
            .finish()
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::temp_connection;
    use super::*;
    use crate::bind_collector::{arg, nullable};
    use crate::cache::StatementCacheConfig;
    use crate::Error;

    fn setup() -> (tempfile::TempDir, Connection) {
        let (dir, conn) = temp_connection();
        conn.batch_execute(
            "CREATE TABLE t (id INTEGER PRIMARY KEY AUTOINCREMENT, name TEXT NOT NULL, parent INTEGER)",
        )
        .unwrap();
        (dir, conn)
    }

    #[test]
    fn test_resolve_url() {
        assert_eq!(resolve_url(Some("/tmp/x.sqlite".into())), "/tmp/x.sqlite");
        assert_eq!(resolve_url(Some("  ".into())), DEFAULT_DATABASE_URL);
        assert_eq!(resolve_url(None), DEFAULT_DATABASE_URL);
    }

    #[test]
    fn test_connection_is_lazy() {
        let registry = Arc::new(Registry::new(StatementCacheConfig::default()));
        let conn = Connection::with_registry(
            DatabaseConfig::new("/nonexistent/dir/db.sqlite"),
            Arc::clone(&registry),
        );
        assert_eq!(registry.open_pools(), 0);
        assert!(conn.prepare("SELECT 1").is_err());
    }

    #[test]
    fn test_execute_and_select_row() {
        let (_dir, conn) = setup();

        let inserted = conn
            .execute("INSERT INTO t (name) VALUES (:name)", arg("name", "ups-1"))
            .unwrap();
        assert_eq!(inserted, 1);
        let id = conn.last_insert_id().unwrap();
        assert!(id > 0);

        let row = conn
            .select_row("SELECT id, name FROM t WHERE id = :id", arg("id", id))
            .unwrap();
        assert_eq!(row.get_string("name").unwrap(), "ups-1");
    }

    #[test]
    fn test_select_row_not_found() {
        let (_dir, conn) = setup();
        let err = conn
            .select_row("SELECT id FROM t WHERE name = :name", arg("name", "none"))
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn test_select_many_with_nullable() {
        let (_dir, conn) = setup();
        for (name, parent) in [("a", 0u32), ("b", 1), ("c", 1)] {
            conn.execute(
                "INSERT INTO t (name, parent) VALUES (:name, :parent)",
                (arg("name", name), nullable(parent != 0, "parent", parent)),
            )
            .unwrap();
        }

        let rows = conn
            .select("SELECT name FROM t WHERE parent IS NULL", ())
            .unwrap();
        assert_eq!(rows.len(), 1);

        let rows = conn
            .select(
                "SELECT name FROM t WHERE parent = :parent ORDER BY name",
                arg("parent", 1),
            )
            .unwrap();
        let names: Vec<String> = rows.iter().map(|r| r.get_string("name").unwrap()).collect();
        assert_eq!(names, vec!["b", "c"]);
    }

    #[test]
    fn test_prepare_shares_compiled_statement() {
        let (_dir, conn) = setup();
        let a = conn.prepare("SELECT id FROM t WHERE id = :id").unwrap();
        let b = conn.prepare("SELECT id FROM t WHERE id = :id").unwrap();
        assert!(Arc::ptr_eq(a.compiled(), b.compiled()));
    }

    fn count(conn: &Connection) -> i64 {
        conn.select_row("SELECT COUNT(*) AS n FROM t", ())
            .unwrap()
            .get_i64("n")
            .unwrap()
    }

    #[test]
    fn test_connections_are_independent() {
        let (_dir, a) = setup();
        let b = Connection::with_registry(a.config().clone(), Arc::clone(&a.registry));

        let tx = a.transaction().unwrap();
        tx.execute("INSERT INTO t (name) VALUES (:name)", arg("name", "a-row"))
            .unwrap();

        // b runs its own transaction and does not see a's pending row
        let other = b.transaction().unwrap();
        assert_eq!(count(&other), 0);
        other.commit().unwrap();

        tx.rollback().unwrap();

        b.execute("INSERT INTO t (name) VALUES (:name)", arg("name", "b-row"))
            .unwrap();
        assert_eq!(count(&a), 1);

        let b_id = b.last_insert_id().unwrap();
        a.execute("INSERT INTO t (name) VALUES (:name)", arg("name", "a-row"))
            .unwrap();
        let a_id = a.last_insert_id().unwrap();
        assert_ne!(a_id, b_id);
        assert_eq!(b.last_insert_id().unwrap(), b_id);
    }

    #[test]
    fn test_dropped_connection_releases_session() {
        let (_dir, a) = setup();
        let url = a.url().to_string();
        {
            let b = Connection::with_registry(a.config().clone(), Arc::clone(&a.registry));
            b.execute("INSERT INTO t (name) VALUES (:name)", arg("name", "x"))
                .unwrap();
            assert_eq!(a.registry.sessions(&url), 2);
        }

        let c = Connection::with_registry(a.config().clone(), Arc::clone(&a.registry));
        assert_eq!(count(&c), 1);
        assert_eq!(a.registry.sessions(&url), 2);
    }

    #[test]
    fn test_connection_survives_shutdown() {
        let (_dir, conn) = setup();
        conn.registry.shutdown();

        conn.execute("INSERT INTO t (name) VALUES (:name)", arg("name", "late"))
            .unwrap();
        let count = conn
            .select_row("SELECT COUNT(*) AS n FROM t", ())
            .unwrap()
            .get_i64("n")
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_batch_execute_error() {
        let (_dir, conn) = setup();
        let err = conn.batch_execute("CREATE TABL broken").unwrap_err();
        assert!(matches!(err, Error::Database(_)));
    }
}
