//! Database schema definitions

use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::sql_types::Integer;
use tracing::info;

use crate::error::PresentationError;

/// Current schema version for migrations
pub const SCHEMA_VERSION: i32 = 1;

/// Initialize the database schema
pub fn init_schema(conn: &mut SqliteConnection) -> Result<(), PresentationError> {
    let current_version = get_schema_version(conn)?;

    if current_version == 0 {
        info!("Creating new database schema v{}", SCHEMA_VERSION);
        create_tables(conn)?;
        set_schema_version(conn, SCHEMA_VERSION)?;
    } else if current_version < SCHEMA_VERSION {
        info!("Migrating schema from v{} to v{}", current_version, SCHEMA_VERSION);
        migrate_schema(conn, current_version)?;
    } else {
        info!("Database schema is up to date (v{})", current_version);
    }

    Ok(())
}

#[derive(QueryableByName)]
struct VersionRow {
    #[diesel(sql_type = Integer)]
    version: i32,
}

/// Get current schema version (0 if not initialized)
fn get_schema_version(conn: &mut SqliteConnection) -> Result<i32, PresentationError> {
    conn.batch_execute("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL)")
        .map_err(|e| {
            PresentationError::Internal(format!("Failed to create schema_version table: {}", e))
        })?;

    let version = diesel::sql_query("SELECT version FROM schema_version LIMIT 1")
        .get_result::<VersionRow>(conn)
        .optional()
        .map_err(|e| PresentationError::Internal(format!("Failed to read schema_version: {}", e)))?
        .map_or(0, |row| row.version);

    Ok(version)
}

/// Set schema version
fn set_schema_version(conn: &mut SqliteConnection, version: i32) -> Result<(), PresentationError> {
    conn.batch_execute("DELETE FROM schema_version")
        .map_err(|e| PresentationError::Internal(format!("Failed to clear schema_version: {}", e)))?;
    diesel::sql_query("INSERT INTO schema_version (version) VALUES (?)")
        .bind::<Integer, _>(version)
        .execute(conn)
        .map_err(|e| PresentationError::Internal(format!("Failed to set schema_version: {}", e)))?;
    Ok(())
}

/// Create all tables
fn create_tables(conn: &mut SqliteConnection) -> Result<(), PresentationError> {
    conn.batch_execute(MANIFESTS_SCHEMA)
        .map_err(|e| PresentationError::Internal(format!("Failed to create manifest tables: {}", e)))?;

    conn.batch_execute(CANVAS_PAINTINGS_SCHEMA).map_err(|e| {
        PresentationError::Internal(format!("Failed to create canvas painting tables: {}", e))
    })?;

    conn.batch_execute(INDEXES_SCHEMA)
        .map_err(|e| PresentationError::Internal(format!("Failed to create indexes: {}", e)))?;

    Ok(())
}

/// Migrate schema from older version
fn migrate_schema(conn: &mut SqliteConnection, from_version: i32) -> Result<(), PresentationError> {
    // No released versions before v1 yet
    info!(from_version, "No migration steps registered");
    set_schema_version(conn, SCHEMA_VERSION)
}

const MANIFESTS_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS manifests (
    id TEXT NOT NULL,
    customer_id INTEGER NOT NULL,
    label_json TEXT,
    space_id INTEGER,
    created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now')),
    modified_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now')),
    last_processed_at TEXT,
    PRIMARY KEY (customer_id, id)
);
"#;

// choice_order is part of the uniqueness key, so "no choice" is stored as -1
const CANVAS_PAINTINGS_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS canvas_paintings (
    canvas_painting_id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
    canvas_id TEXT NOT NULL,
    manifest_id TEXT NOT NULL,
    customer_id INTEGER NOT NULL,
    canvas_original_id TEXT,
    canvas_order INTEGER NOT NULL,
    choice_order INTEGER NOT NULL DEFAULT -1,
    asset_id TEXT,
    external_asset_id TEXT,
    label_json TEXT,
    canvas_label_json TEXT,
    target TEXT,
    thumbnail TEXT,
    static_width INTEGER,
    static_height INTEGER,
    duration DOUBLE,
    ingesting INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now')),
    modified_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now')),
    FOREIGN KEY (customer_id, manifest_id) REFERENCES manifests (customer_id, id) ON DELETE CASCADE,
    UNIQUE (customer_id, manifest_id, canvas_id, canvas_order, choice_order)
);
"#;

const INDEXES_SCHEMA: &str = r#"
CREATE INDEX IF NOT EXISTS idx_canvas_paintings_manifest ON canvas_paintings (customer_id, manifest_id);
CREATE INDEX IF NOT EXISTS idx_canvas_paintings_canvas ON canvas_paintings (customer_id, canvas_id);
CREATE INDEX IF NOT EXISTS idx_canvas_paintings_asset ON canvas_paintings (asset_id);
"#;
