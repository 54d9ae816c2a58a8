//! Process-wide session registry
//!
//! Each database URL gets one pool of store sessions, and every connection
//! shares one statement cache. Both live in a [`Registry`]; the process
//! normally uses the one returned by [`Registry::global`].
//!
//! A [`Connection`](crate::Connection) checks a session out of the pool on
//! first use and keeps it until it is dropped, so two live connections never
//! share a session: transactions and `last_insert_id` stay per connection. A
//! released session is reused by the next connection to the same URL.
//! [`Registry::shutdown`] drops the pools; sessions still held by connections
//! close when those connections go away.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use std::time::Duration;

use diesel::connection::SimpleConnection;
use diesel::r2d2::{self, ConnectionManager, CustomizeConnection, Pool, PooledConnection};
use diesel::{Connection as _, SqliteConnection};

use crate::{
    cache::{StatementCache, StatementCacheConfig},
    error::{Error, Result},
    tracing_support::LOG_TARGET,
};

/// Settings applied to every freshly opened session
const SESSION_PRAGMAS: &str =
    "PRAGMA journal_mode = WAL; PRAGMA foreign_keys = ON; PRAGMA busy_timeout = 5000;";

/// Most sessions open at once per URL
const MAX_SESSIONS: u32 = 16;

/// How long a checkout waits for a free session
const CHECKOUT_TIMEOUT: Duration = Duration::from_secs(10);

type SessionPool = Pool<ConnectionManager<SqliteConnection>>;

#[derive(Debug)]
struct SessionSetup;

impl CustomizeConnection<SqliteConnection, r2d2::Error> for SessionSetup {
    fn on_acquire(&self, conn: &mut SqliteConnection) -> std::result::Result<(), r2d2::Error> {
        conn.batch_execute(SESSION_PRAGMAS)
            .map_err(r2d2::Error::QueryError)
    }
}

/// A store session checked out for one connection
pub(crate) struct Session {
    url: String,
    conn: Mutex<PooledConnection<ConnectionManager<SqliteConnection>>>,
}

impl Session {
    /// The URL this session was opened with
    pub(crate) fn url(&self) -> &str {
        &self.url
    }

    /// Exclusive access to the underlying connection
    pub(crate) fn lock(
        &self,
    ) -> Result<MutexGuard<'_, PooledConnection<ConnectionManager<SqliteConnection>>>> {
        self.conn
            .lock()
            .map_err(|_| Error::database(format!("session for {} is poisoned", self.url)))
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session").field("url", &self.url).finish()
    }
}

/// Session pools and compiled statements
pub struct Registry {
    pools: Mutex<HashMap<String, SessionPool>>,
    statements: StatementCache,
}

static GLOBAL: OnceLock<Arc<Registry>> = OnceLock::new();

impl Registry {
    /// Create an independent registry
    pub fn new(cache: StatementCacheConfig) -> Self {
        Self {
            pools: Mutex::new(HashMap::new()),
            statements: StatementCache::new(cache),
        }
    }

    /// The process-wide registry
    pub fn global() -> Arc<Registry> {
        Arc::clone(GLOBAL.get_or_init(|| Arc::new(Registry::new(StatementCacheConfig::default()))))
    }

    /// The statement cache shared by connections of this registry
    pub fn statements(&self) -> &StatementCache {
        &self.statements
    }

    /// Number of URLs with a pool
    pub fn open_pools(&self) -> usize {
        self.pools.lock().map(|p| p.len()).unwrap_or(0)
    }

    /// Number of sessions open for `url`, checked out or idle
    pub fn sessions(&self, url: &str) -> usize {
        self.pools
            .lock()
            .ok()
            .and_then(|pools| pools.get(url).map(|pool| pool.state().connections as usize))
            .unwrap_or(0)
    }

    /// Check out a session for `url`, creating its pool on first use
    pub(crate) fn checkout(&self, url: &str) -> Result<Session> {
        let pool = self.pool(url)?;
        let conn = pool.get().map_err(|err| {
            tracing::warn!(target: LOG_TARGET, url, error = %err, "session checkout failed");
            Error::database(format!("cannot open {}: {}", url, err))
        })?;
        tracing::debug!(target: LOG_TARGET, url, "session checked out");
        Ok(Session {
            url: url.to_string(),
            conn: Mutex::new(conn),
        })
    }

    fn pool(&self, url: &str) -> Result<SessionPool> {
        let mut pools = self
            .pools
            .lock()
            .map_err(|_| Error::database("session registry is poisoned"))?;

        if let Some(pool) = pools.get(url) {
            return Ok(pool.clone());
        }

        // the pool opens sessions lazily; fail fast on an unusable URL
        SqliteConnection::establish(url)
            .map_err(Error::from)
            .inspect_err(|err| {
                tracing::warn!(target: LOG_TARGET, url, error = err.message(), "failed to open database");
            })?;

        let pool = SessionPool::builder()
            .max_size(MAX_SESSIONS)
            .min_idle(Some(0))
            .connection_timeout(CHECKOUT_TIMEOUT)
            .connection_customizer(Box::new(SessionSetup))
            .build_unchecked(ConnectionManager::new(url));
        tracing::info!(target: LOG_TARGET, url, max_sessions = MAX_SESSIONS, "opened session pool");
        pools.insert(url.to_string(), pool.clone());
        Ok(pool)
    }

    /// Drop every pool and compiled statement held by the registry
    ///
    /// Connections that already hold a session keep using it; it closes when
    /// they are dropped. Calling this more than once is harmless.
    pub fn shutdown(&self) {
        let released = match self.pools.lock() {
            Ok(mut pools) => pools.drain().count(),
            Err(_) => 0,
        };
        self.statements.clear();
        tracing::info!(target: LOG_TARGET, released, "database registry shut down");
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("open_pools", &self.open_pools())
            .field("statements", &self.statements)
            .finish()
    }
}

/// Release the process-wide pools and statement cache
///
/// Call once before process exit.
pub fn shutdown() {
    Registry::global().shutdown();
}
