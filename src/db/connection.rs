// src/db/connection.rs
//
// SQLite connection pool for the local store
//
// PRINCIPLES:
// - Every connection gets the same PRAGMAs on open
// - Readers run concurrently (WAL); writers are serialized by the object store
// - Pool failures surface as `AppError::Pool`

use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;

use crate::config::StorageConfig;
use crate::error::{AppError, AppResult};

pub type ConnectionPool = Pool<SqliteConnectionManager>;

pub type PooledConn = PooledConnection<SqliteConnectionManager>;

const CONNECTION_PRAGMAS: &str = "PRAGMA foreign_keys = ON;
     PRAGMA journal_mode = WAL;
     PRAGMA synchronous = NORMAL;
     PRAGMA busy_timeout = 5000;";

/// Open (creating if needed) the configured database file behind a pool
///
/// The root directory is created first so a brand-new install works.
pub fn create_connection_pool(config: &StorageConfig) -> AppResult<ConnectionPool> {
    std::fs::create_dir_all(&config.root_dir)?;
    let db_path = config.database_path();

    let manager = SqliteConnectionManager::file(&db_path)
        .with_init(|conn| conn.execute_batch(CONNECTION_PRAGMAS));

    let pool = Pool::builder()
        .max_size(config.pool_max_size)
        .build(manager)?;

    log::info!(
        "Opened database at {} (pool size {})",
        db_path.display(),
        config.pool_max_size
    );
    Ok(pool)
}

pub fn get_connection(pool: &ConnectionPool) -> AppResult<PooledConn> {
    pool.get()
        .map_err(|e| AppError::Pool(format!("No database connection available: {}", e)))
}

/// Private in-memory database with foreign keys on
pub fn create_test_connection() -> AppResult<Connection> {
    let conn = Connection::open_in_memory()?;
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    Ok(conn)
}
