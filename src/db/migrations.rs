// src/db/migrations.rs
//
// Schema bootstrap and versioning
//
// PRINCIPLES:
// - One embedded schema file per version
// - Opening an unknown version is an error, never a silent upgrade
// - Bootstrapping an up-to-date database changes nothing

use rusqlite::Connection;

use crate::error::{AppError, AppResult};

/// Version written by this build
const CURRENT_SCHEMA_VERSION: i32 = 1;

const SCHEMA_V1: &str = include_str!("../../schema.sql");

/// Bring a database to the current schema version
///
/// Fresh databases get the full schema. A database already at the current
/// version is left alone; older or newer versions are refused.
pub fn initialize_database(conn: &Connection) -> AppResult<()> {
    match get_schema_version(conn)? {
        0 => {
            conn.execute_batch(SCHEMA_V1)
                .map_err(|e| AppError::Other(format!("Failed to apply schema v1: {}", e)))?;
            set_schema_version(conn, CURRENT_SCHEMA_VERSION)?;
            log::info!("Created schema v{}", CURRENT_SCHEMA_VERSION);
            Ok(())
        }
        CURRENT_SCHEMA_VERSION => Ok(()),
        found => Err(AppError::Other(format!(
            "Unsupported schema version {} (this build reads v{})",
            found, CURRENT_SCHEMA_VERSION
        ))),
    }
}

/// 0 when the database has never been bootstrapped
fn get_schema_version(conn: &Connection) -> AppResult<i32> {
    let has_table: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'schema_version')",
        [],
        |row| row.get(0),
    )?;

    if !has_table {
        return Ok(0);
    }

    let version: Option<i32> =
        conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))?;
    Ok(version.unwrap_or(0))
}

fn set_schema_version(conn: &Connection, version: i32) -> AppResult<()> {
    conn.execute(
        "INSERT OR IGNORE INTO schema_version (version, applied_at) VALUES (?1, datetime('now'))",
        [version],
    )?;
    Ok(())
}

/// `PRAGMA integrity_check`, as an error when anything but "ok" comes back
pub fn verify_database_integrity(conn: &Connection) -> AppResult<()> {
    let result: String = conn.query_row("PRAGMA integrity_check", [], |row| row.get(0))?;

    if result != "ok" {
        return Err(AppError::Other(format!(
            "Database integrity check failed: {}",
            result
        )));
    }
    Ok(())
}

/// Size and row counts of the local store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseStats {
    pub size_bytes: i64,
    pub performance_count: i64,
    pub record_count: i64,
    pub related_link_count: i64,
}

pub fn get_database_stats(conn: &Connection) -> AppResult<DatabaseStats> {
    let page_count: i64 = conn.query_row("PRAGMA page_count", [], |row| row.get(0))?;
    let page_size: i64 = conn.query_row("PRAGMA page_size", [], |row| row.get(0))?;

    Ok(DatabaseStats {
        size_bytes: page_count * page_size,
        performance_count: count_rows(conn, "performances")?,
        record_count: count_rows(conn, "records")?,
        related_link_count: count_rows(conn, "related_links")?,
    })
}

fn count_rows(conn: &Connection, table: &'static str) -> AppResult<i64> {
    let count = conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
        row.get(0)
    })?;
    Ok(count)
}
