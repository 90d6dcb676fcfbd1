//! SQLite persistence for Manifests and their canvas paintings
//!
//! ## Tables
//!
//! - `manifests` - Manifest records (customer, id, label JSON, space)
//! - `canvas_paintings` - one row per asset painted on a canvas, cascade
//!   deleted with the Manifest
//! - `schema_version` - migration bookkeeping
//!
//! Every operation takes a [`CustomerContext`] and only touches that
//! customer's rows.

pub mod canvas_paintings;
pub mod context;
pub mod diesel_schema;
pub mod manifests;
pub mod models;
pub mod schema;

use std::path::Path;
use std::time::Duration;

use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, CustomizeConnection, Pool, PooledConnection};
use tracing::{debug, info};

use crate::error::PresentationError;

pub use context::CustomerContext;
pub use models::{current_timestamp, ManifestRecord};

pub type DbPool = Pool<ConnectionManager<SqliteConnection>>;
pub type PooledConn = PooledConnection<ConnectionManager<SqliteConnection>>;

/// Pragmas applied to every pooled connection
#[derive(Debug, Clone, Copy)]
struct SqlitePragmas {
    wal: bool,
}

impl CustomizeConnection<SqliteConnection, diesel::r2d2::Error> for SqlitePragmas {
    fn on_acquire(&self, conn: &mut SqliteConnection) -> Result<(), diesel::r2d2::Error> {
        let mut pragmas = String::from("PRAGMA foreign_keys = ON; PRAGMA busy_timeout = 5000;");
        if self.wal {
            pragmas.push_str(" PRAGMA journal_mode = WAL; PRAGMA synchronous = NORMAL;");
        }
        conn.batch_execute(&pragmas)
            .map_err(diesel::r2d2::Error::QueryError)
    }
}

/// Pooled SQLite database
#[derive(Clone)]
pub struct PresentationDb {
    pool: DbPool,
}

impl PresentationDb {
    /// Open or create `presentation.db` under the storage directory
    pub fn open(storage_dir: &Path) -> Result<Self, PresentationError> {
        std::fs::create_dir_all(storage_dir)?;
        let db_path = storage_dir.join("presentation.db");
        info!("Opening SQLite database at {:?}", db_path);

        let manager = ConnectionManager::<SqliteConnection>::new(db_path.to_string_lossy());
        let pool = Pool::builder()
            .max_size(8)
            .connection_timeout(Duration::from_secs(10))
            .connection_customizer(Box::new(SqlitePragmas { wal: true }))
            .build(manager)
            .map_err(|e| PresentationError::Internal(format!("Failed to open SQLite: {}", e)))?;

        let db = Self { pool };
        db.with_conn(schema::init_schema)?;
        Ok(db)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self, PresentationError> {
        debug!("Opening in-memory SQLite database");

        // Each in-memory connection is its own database: keep exactly one
        let manager = ConnectionManager::<SqliteConnection>::new(":memory:");
        let pool = Pool::builder()
            .max_size(1)
            .connection_customizer(Box::new(SqlitePragmas { wal: false }))
            .build(manager)
            .map_err(|e| {
                PresentationError::Internal(format!("Failed to open in-memory SQLite: {}", e))
            })?;

        let db = Self { pool };
        db.with_conn(schema::init_schema)?;
        Ok(db)
    }

    /// Run `f` with a pooled connection
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, PresentationError>
    where
        F: FnOnce(&mut SqliteConnection) -> Result<T, PresentationError>,
    {
        let mut conn = self.conn()?;
        f(&mut conn)
    }

    /// Run `f` inside a single transaction
    pub fn transaction<F, T>(&self, f: F) -> Result<T, PresentationError>
    where
        F: FnOnce(&mut SqliteConnection) -> Result<T, PresentationError>,
    {
        self.with_conn(|conn| conn.transaction(f))
    }

    fn conn(&self) -> Result<PooledConn, PresentationError> {
        self.pool
            .get()
            .map_err(|e| PresentationError::Internal(format!("Failed to get connection: {}", e)))
    }

    /// Get database statistics
    pub fn stats(&self) -> Result<DbStats, PresentationError> {
        use diesel_schema::{canvas_paintings, manifests};

        self.with_conn(|conn| {
            let manifest_count: i64 = manifests::table
                .count()
                .get_result(conn)
                .map_err(|e| PresentationError::Internal(format!("Query failed: {}", e)))?;

            let canvas_painting_count: i64 = canvas_paintings::table
                .count()
                .get_result(conn)
                .map_err(|e| PresentationError::Internal(format!("Query failed: {}", e)))?;

            let ingesting_count: i64 = canvas_paintings::table
                .filter(canvas_paintings::ingesting.ne(0))
                .count()
                .get_result(conn)
                .map_err(|e| PresentationError::Internal(format!("Query failed: {}", e)))?;

            Ok(DbStats {
                manifest_count: manifest_count as u64,
                canvas_painting_count: canvas_painting_count as u64,
                ingesting_count: ingesting_count as u64,
            })
        })
    }
}

/// Database statistics
#[derive(Debug, Clone, serde::Serialize)]
pub struct DbStats {
    pub manifest_count: u64,
    pub canvas_painting_count: u64,
    pub ingesting_count: u64,
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_in_memory_and_stats() {
        let db = PresentationDb::open_in_memory().unwrap();
        let ctx = CustomerContext::new(1);
        db.with_conn(|conn| manifests::upsert(conn, &ctx, "m1", None, None))
            .unwrap();

        let stats = db.stats().unwrap();
        assert_eq!(stats.manifest_count, 1);
        assert_eq!(stats.canvas_painting_count, 0);
    }

    #[test]
    fn test_open_on_disk_is_reopenable() {
        let dir = tempfile::TempDir::new().unwrap();
        {
            let db = PresentationDb::open(dir.path()).unwrap();
            db.with_conn(|conn| manifests::upsert(conn, &CustomerContext::new(1), "m1", None, None))
                .unwrap();
        }
        let db = PresentationDb::open(dir.path()).unwrap();
        assert_eq!(db.stats().unwrap().manifest_count, 1);
    }

    #[test]
    fn test_transaction_rolls_back_on_error() {
        let db = PresentationDb::open_in_memory().unwrap();
        let ctx = CustomerContext::new(1);
        let result: Result<(), PresentationError> = db.transaction(|conn| {
            manifests::upsert(conn, &ctx, "m1", None, None)?;
            Err(PresentationError::Internal("boom".into()))
        });
        assert!(result.is_err());
        assert_eq!(db.stats().unwrap().manifest_count, 0);
    }
}
