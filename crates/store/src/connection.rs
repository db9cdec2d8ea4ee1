//! Single-connection SQLite access with WAL pragmas and a scoped
//! transaction helper. Mirrors this workspace's lock-per-resource idiom
//! (`parking_lot::Mutex`) rather than a connection pool — this subsystem is
//! single-writer by design.

use std::path::{Path, PathBuf};
use std::time::Duration;

use parking_lot::Mutex;
use rusqlite::Connection;

use sa_domain::error::{ErrorKind, MemoryError, Result};

pub struct ConnectionManager {
    conn: Mutex<Option<Connection>>,
    path: PathBuf,
}

impl ConnectionManager {
    /// Open (creating if absent) the SQLite file at `path`, applying the
    /// WAL/busy-timeout/synchronous pragmas this subsystem requires.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(MemoryError::from)?;
            }
        }
        let conn = Self::open_raw(path)?;
        Ok(Self {
            conn: Mutex::new(Some(conn)),
            path: path.to_path_buf(),
        })
    }

    /// In-memory database, used by tests and the maintenance CLI's dry runs.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        Ok(Self {
            conn: Mutex::new(Some(conn)),
            path: PathBuf::from(":memory:"),
        })
    }

    fn open_raw(path: &Path) -> Result<Connection> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.busy_timeout(Duration::from_millis(5000))?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        Ok(conn)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn closed_error() -> MemoryError {
        MemoryError::new(ErrorKind::StoreFailed, "connection manager is closed")
    }

    /// Run `f` with shared (read or write) access to the connection.
    pub fn with_connection<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let guard = self.conn.lock();
        let conn = guard.as_ref().ok_or_else(Self::closed_error)?;
        f(conn)
    }

    /// Run `f` inside a `BEGIN IMMEDIATE` transaction. Commits on `Ok`,
    /// rolls back on `Err`.
    pub fn transaction<T>(
        &self,
        f: impl FnOnce(&rusqlite::Transaction<'_>) -> Result<T>,
    ) -> Result<T> {
        let mut guard = self.conn.lock();
        let conn = guard.as_mut().ok_or_else(Self::closed_error)?;
        let tx = conn.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;
        match f(&tx) {
            Ok(value) => {
                tx.commit()?;
                Ok(value)
            }
            Err(e) => {
                let _ = tx.rollback();
                Err(e)
            }
        }
    }

    /// Idempotent: closing an already-closed manager is a no-op.
    pub fn close(&self) {
        self.conn.lock().take();
    }

    pub fn is_closed(&self) -> bool {
        self.conn.lock().is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_in_memory_allows_queries() {
        let manager = ConnectionManager::open_in_memory().unwrap();
        manager
            .with_connection(|conn| {
                conn.execute_batch("CREATE TABLE t (id INTEGER)")?;
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn transaction_rolls_back_on_error() {
        let manager = ConnectionManager::open_in_memory().unwrap();
        manager
            .with_connection(|conn| {
                conn.execute_batch("CREATE TABLE t (id INTEGER)")?;
                Ok(())
            })
            .unwrap();

        let result: Result<()> = manager.transaction(|tx| {
            tx.execute("INSERT INTO t (id) VALUES (1)", [])?;
            Err(MemoryError::new(ErrorKind::Internal, "boom"))
        });
        assert!(result.is_err());

        let count: i64 = manager
            .with_connection(|conn| {
                conn.query_row("SELECT COUNT(*) FROM t", [], |row| row.get(0))
                    .map_err(MemoryError::from)
            })
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn close_is_idempotent() {
        let manager = ConnectionManager::open_in_memory().unwrap();
        manager.close();
        manager.close();
        assert!(manager.is_closed());
        assert!(manager.with_connection(|_| Ok(())).is_err());
    }
}
