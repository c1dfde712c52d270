//! IntegrationStore: SQLite-backed integration records.
//!
//! Provides the publish engine and its read paths:
//! - Atomic publish with latest-pointer maintenance and stat carry-forward
//! - Routing path / name uniqueness among latest versions
//! - Download tracking with a trailing trending window

mod downloads;
mod publish;
mod query;
mod row;
mod schema;

pub use downloads::TRENDING_WINDOW_DAYS;
pub use schema::INTEGRATION_SCHEMA;

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use rusqlite::Connection;

use crate::error::{RegistryError, RegistryResult};

/// SQLite-backed integration store.
#[derive(Clone)]
pub struct IntegrationStore {
    conn: Arc<Mutex<Connection>>,
}

impl std::fmt::Debug for IntegrationStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IntegrationStore").finish_non_exhaustive()
    }
}

impl IntegrationStore {
    /// Open a file-backed store, creating the schema if needed.
    pub fn open(path: &Path) -> RegistryResult<Self> {
        Self::from_connection(Connection::open(path)?)
    }

    /// Create an in-memory store (for testing).
    pub fn memory() -> RegistryResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    pub fn from_connection(conn: Connection) -> RegistryResult<Self> {
        schema::init_connection(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> RegistryResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| RegistryError::Storage {
            message: "store connection lock poisoned".to_string(),
        })
    }

    /// Run `f` inside `BEGIN IMMEDIATE`; the writer lock is held from the
    /// first read, so checks and writes see the same committed state.
    fn write_txn<T>(
        &self,
        f: impl FnOnce(&Connection) -> RegistryResult<T>,
    ) -> RegistryResult<T> {
        let conn = self.lock()?;

        conn.execute_batch("BEGIN IMMEDIATE")?;
        let result = f(&conn);

        match &result {
            Ok(_) => {
                if let Err(e) = conn.execute_batch("COMMIT") {
                    let _ = conn.execute_batch("ROLLBACK");
                    return Err(e.into());
                }
            }
            Err(_) => {
                let _ = conn.execute_batch("ROLLBACK");
            }
        }

        result
    }
}
