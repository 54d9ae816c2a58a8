//! # fty-common-db
//!
//! Typed access to the shared SQLite database: named-parameter statements,
//! rows read with per-type getters, transactions, multi-row inserts, and the
//! discovery configuration queries built on top of them.
//!
//! ## Features
//!
//! - `bundled` (default) - Compile SQLite into the crate instead of linking
//!   the system library
//!
//! ## Usage
//!
//! ```toml
//! [dependencies]
//! fty-common-db = "0.1"
//! ```
//!
//! The database is named by the `DBURL` environment variable, or
//! [`DEFAULT_DATABASE_URL`] when it is unset. Session pools and compiled
//! statements are shared process-wide until [`shutdown`] is called. Each
//! connection holds its own session.
//!
//! ```
//! use fty_common_db::{arg, nullable, Connection};
//!
//! # fn main() -> fty_common_db::Result<()> {
//! # let dir = tempfile::TempDir::new().unwrap();
//! # let conn = Connection::with_url(dir.path().join("lib.sqlite").to_string_lossy());
//! conn.batch_execute("CREATE TABLE asset (id INTEGER PRIMARY KEY, name TEXT, parent INTEGER)")?;
//!
//! let parent = 0u32;
//! conn.execute(
//!     "INSERT INTO asset (name, parent) VALUES (:name, :parent)",
//!     (arg("name", "rack-1"), nullable(parent != 0, "parent", parent)),
//! )?;
//!
//! for row in &conn.select("SELECT name, parent FROM asset", ())? {
//!     assert_eq!(row.get_string("name")?, "rack-1");
//!     // NULL reads as the default value
//!     assert_eq!(row.get_u32("parent")?, 0);
//! }
//! # Ok(())
//! # }
//! ```

pub mod batch;
mod bind_collector;
pub mod cache;
mod connection;
pub mod discovery;
mod error;
mod query_builder;
mod registry;
mod row;
mod statement;
pub mod tracing_support;
mod transaction;
mod types;
mod value;

// Re-exports
pub use batch::MultiInsert;
pub use bind_collector::{arg, indexed_name, nullable, Arg, BindArgs, BindCollector};
pub use connection::{Connection, DatabaseConfig, DATABASE_URL_ENV, DEFAULT_DATABASE_URL};
pub use error::{Error, Result};
pub use query_builder::{multi_insert, CompiledSql};
pub use registry::{shutdown, Registry};
pub use row::{ColumnIndex, Row, Rows, RowsIter};
pub use statement::Statement;
pub use transaction::{Transaction, TransactionState};
pub use types::{FromCell, ToBind};
pub use value::{BindValue, Cell};
