//! Transactions
//!
//! A [`Transaction`] is opened from a [`Connection`] and ends exactly once,
//! through [`Transaction::commit`] or [`Transaction::rollback`]. Transactions
//! do not nest: opening a second one while the first is active fails. A
//! transaction dropped while still active is rolled back and a warning is
//! logged.
//!
//! The transaction scope is the connection's own session: other connections
//! to the same URL are not part of it and see its changes only once committed.
//!
//! ```
//! use fty_common_db::{arg, Connection};
//!
//! # fn main() -> fty_common_db::Result<()> {
//! # let dir = tempfile::TempDir::new().unwrap();
//! # let conn = Connection::with_url(dir.path().join("tx.sqlite").to_string_lossy());
//! conn.batch_execute("CREATE TABLE t (name TEXT)")?;
//!
//! let tx = conn.transaction()?;
//! tx.execute("INSERT INTO t (name) VALUES (:name)", arg("name", "kept"))?;
//! tx.commit()?;
//!
//! let tx = conn.transaction()?;
//! tx.execute("INSERT INTO t (name) VALUES (:name)", arg("name", "dropped"))?;
//! tx.rollback()?;
//!
//! assert_eq!(conn.select("SELECT name FROM t", ())?.len(), 1);
//! # Ok(())
//! # }
//! ```

use std::num::NonZeroU32;
use std::ops::Deref;
use std::sync::Arc;

use diesel::connection::{AnsiTransactionManager, TransactionManager};
use diesel::SqliteConnection;

use crate::{
    connection::Connection,
    error::{Error, Result},
    registry::Session,
    tracing_support::{SpanOperation, SpanTimer, LOG_TARGET},
};

/// Lifecycle of a [`Transaction`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// Opened and not yet ended
    Active,
    /// Ended by a successful commit
    Committed,
    /// Ended by a rollback, explicit or not
    RolledBack,
}

/// An open transaction on a [`Connection`]
///
/// Dereferences to the connection so statements can be issued directly.
pub struct Transaction<'c> {
    conn: &'c Connection,
    session: Arc<Session>,
    state: TransactionState,
}

impl<'c> Transaction<'c> {
    pub(crate) fn begin(conn: &'c Connection) -> Result<Self> {
        let session = conn.session()?;
        let timer = SpanTimer::start(SpanOperation::Begin, &conn.config().tracing, "BEGIN");
        let outcome = session.lock().and_then(|mut store| {
            if transaction_depth(&mut **store)? > 0 {
                return Err(Error::database(format!(
                    "a transaction is already active on {}",
                    session.url()
                )));
            }
            AnsiTransactionManager::begin_transaction(&mut **store).map_err(Error::from)
        });
        timer.finish(outcome, |_| 0)?;

        Ok(Self {
            conn,
            session,
            state: TransactionState::Active,
        })
    }

    /// Current lifecycle state
    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// The connection this transaction runs on
    pub fn connection(&self) -> &'c Connection {
        self.conn
    }

    /// Make every change since the transaction began permanent
    pub fn commit(mut self) -> Result<()> {
        self.end(SpanOperation::Commit)
    }

    /// Discard every change since the transaction began
    pub fn rollback(mut self) -> Result<()> {
        self.end(SpanOperation::Rollback)
    }

    fn end(&mut self, operation: SpanOperation) -> Result<()> {
        let timer = SpanTimer::start(operation, &self.conn.config().tracing, operation.as_str());
        let outcome = self.session.lock().and_then(|mut store| {
            let result = match operation {
                SpanOperation::Commit => AnsiTransactionManager::commit_transaction(&mut **store),
                _ => AnsiTransactionManager::rollback_transaction(&mut **store),
            };
            // a failed commit may leave the transaction open; Drop rolls it back
            if transaction_depth(&mut **store).unwrap_or(0) == 0 {
                self.state = match (&result, operation) {
                    (Ok(()), SpanOperation::Commit) => TransactionState::Committed,
                    _ => TransactionState::RolledBack,
                };
            }
            result.map_err(Error::from)
        });
        timer.finish(outcome, |_| 0)
    }
}

impl Deref for Transaction<'_> {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        self.conn
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if self.state != TransactionState::Active {
            return;
        }
        tracing::warn!(
            target: LOG_TARGET,
            url = self.conn.url(),
            "transaction dropped while active, rolling back"
        );
        if let Err(err) = self.end(SpanOperation::Rollback) {
            tracing::warn!(
                target: LOG_TARGET,
                url = self.conn.url(),
                error = err.message(),
                "implicit rollback failed"
            );
        }
    }
}

impl std::fmt::Debug for Transaction<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("url", &self.conn.url())
            .field("state", &self.state)
            .finish()
    }
}

fn transaction_depth(store: &mut SqliteConnection) -> Result<u32> {
    let status = AnsiTransactionManager::transaction_manager_status_mut(store);
    Ok(status.transaction_depth()?.map_or(0, NonZeroU32::get))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bind_collector::arg;
    use crate::connection::test_support::temp_connection;

    fn setup() -> (tempfile::TempDir, Connection) {
        let (dir, conn) = temp_connection();
        conn.batch_execute("CREATE TABLE t (name TEXT NOT NULL UNIQUE)")
            .unwrap();
        (dir, conn)
    }

    fn count(conn: &Connection) -> i64 {
        conn.select_row("SELECT COUNT(*) AS n FROM t", ())
            .unwrap()
            .get_i64("n")
            .unwrap()
    }

    #[test]
    fn test_commit_persists() {
        let (_dir, conn) = setup();
        let tx = conn.transaction().unwrap();
        assert_eq!(tx.state(), TransactionState::Active);
        tx.execute("INSERT INTO t (name) VALUES (:n)", arg("n", "a"))
            .unwrap();
        tx.commit().unwrap();
        assert_eq!(count(&conn), 1);
    }

    #[test]
    fn test_rollback_discards() {
        let (_dir, conn) = setup();
        let tx = conn.transaction().unwrap();
        tx.execute("INSERT INTO t (name) VALUES (:n)", arg("n", "a"))
            .unwrap();
        tx.rollback().unwrap();
        assert_eq!(count(&conn), 0);
    }

    #[test]
    fn test_drop_rolls_back() {
        let (_dir, conn) = setup();
        {
            let tx = conn.transaction().unwrap();
            tx.execute("INSERT INTO t (name) VALUES (:n)", arg("n", "a"))
                .unwrap();
        }
        assert_eq!(count(&conn), 0);

        // the session is usable for a new transaction afterwards
        let tx = conn.transaction().unwrap();
        tx.commit().unwrap();
    }

    #[test]
    fn test_nested_transaction_fails() {
        let (_dir, conn) = setup();
        let outer = conn.transaction().unwrap();
        let err = conn.transaction().unwrap_err();
        assert!(err.message().contains("already active"));
        outer.commit().unwrap();
    }

    #[test]
    fn test_error_inside_transaction_then_rollback() {
        let (_dir, conn) = setup();
        let tx = conn.transaction().unwrap();
        tx.execute("INSERT INTO t (name) VALUES (:n)", arg("n", "a"))
            .unwrap();
        assert!(tx
            .execute("INSERT INTO t (name) VALUES (:n)", arg("n", "a"))
            .is_err());
        tx.rollback().unwrap();
        assert_eq!(count(&conn), 0);
    }

    #[test]
    fn test_connection_accessor() {
        let (_dir, conn) = setup();
        let tx = conn.transaction().unwrap();
        assert_eq!(tx.connection().url(), conn.url());
        tx.rollback().unwrap();
    }
}
