// src/store/object_store.rs
//
// Typed CRUD + query + single-writer transactions over SQLite
//
// CRITICAL RULES:
// - Exactly one write transaction in flight per store; other writers queue
// - A write either commits every mutation or none
// - No business logic, no media I/O, no cross-entity orchestration
// - No sorting by related-collection size (callers materialize and sort)

use std::sync::{Arc, Mutex};

use rusqlite::{params_from_iter, Connection, Row, TransactionBehavior};

use crate::config::StorageConfig;
use crate::db::{
    create_connection_pool, get_connection, get_database_stats, initialize_database,
    verify_database_integrity, ConnectionPool, DatabaseStats,
};
use crate::error::{AppError, AppResult};

/// A row type the store knows how to map
///
/// `COLUMNS` must start with the primary key column `id`.
pub trait StoredObject: Sized {
    const TABLE: &'static str;
    const COLUMNS: &'static str;
    /// Default ordering for `query`
    const ORDER_BY: &'static str;

    fn id(&self) -> &str;

    /// Map database row to Self - returns rusqlite::Error for query_map compatibility
    fn from_row(row: &Row) -> Result<Self, rusqlite::Error>;

    /// Insert, or replace every column of an existing row with the same id
    fn upsert(&self, conn: &Connection) -> Result<(), rusqlite::Error>;
}

#[derive(Debug, Clone, PartialEq)]
enum Filter {
    All,
    Eq(&'static str, String),
    OneOf(&'static str, Vec<String>),
}

/// Predicate + ordering for `query`
///
/// Column names are static identifiers; values are always bound parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    filter: Filter,
    order_by: Option<&'static str>,
}

impl Query {
    pub fn all() -> Self {
        Self {
            filter: Filter::All,
            order_by: None,
        }
    }

    pub fn eq(column: &'static str, value: impl Into<String>) -> Self {
        Self {
            filter: Filter::Eq(column, value.into()),
            order_by: None,
        }
    }

    pub fn one_of(column: &'static str, values: Vec<String>) -> Self {
        Self {
            filter: Filter::OneOf(column, values),
            order_by: None,
        }
    }

    pub fn order_by(mut self, clause: &'static str) -> Self {
        self.order_by = Some(clause);
        self
    }

    fn where_clause(&self) -> (String, Vec<String>) {
        match &self.filter {
            Filter::All => (String::new(), Vec::new()),
            Filter::Eq(column, value) => (format!(" WHERE {} = ?1", column), vec![value.clone()]),
            // Nothing can match an empty set
            Filter::OneOf(_, values) if values.is_empty() => (" WHERE 0".to_string(), Vec::new()),
            Filter::OneOf(column, values) => {
                let placeholders = (1..=values.len())
                    .map(|i| format!("?{}", i))
                    .collect::<Vec<_>>()
                    .join(", ");
                (
                    format!(" WHERE {} IN ({})", column, placeholders),
                    values.clone(),
                )
            }
        }
    }
}

// ============================================================================
// CONNECTION-LEVEL OPERATIONS
// Shared by plain reads and by reads inside a write transaction.
// ============================================================================

pub fn find_in<T: StoredObject>(conn: &Connection, id: &str) -> AppResult<Option<T>> {
    let sql = format!("SELECT {} FROM {} WHERE id = ?1", T::COLUMNS, T::TABLE);
    let mut stmt = conn.prepare(&sql)?;

    match stmt.query_row([id], T::from_row) {
        Ok(row) => Ok(Some(row)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(AppError::Database(e)),
    }
}

pub fn get_in<T: StoredObject>(conn: &Connection, id: &str) -> AppResult<T> {
    find_in(conn, id)?.ok_or(AppError::NotFound)
}

pub fn query_in<T: StoredObject>(conn: &Connection, query: &Query) -> AppResult<Vec<T>> {
    let (where_clause, values) = query.where_clause();
    let sql = format!(
        "SELECT {} FROM {}{} ORDER BY {}",
        T::COLUMNS,
        T::TABLE,
        where_clause,
        query.order_by.unwrap_or(T::ORDER_BY)
    );

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(values.iter()), T::from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(rows)
}

/// Handle for mutations inside one `ObjectStore::write`
pub struct WriteTx<'conn> {
    conn: &'conn Connection,
}

impl<'conn> WriteTx<'conn> {
    pub fn connection(&self) -> &Connection {
        self.conn
    }

    pub fn upsert<T: StoredObject>(&self, object: &T) -> AppResult<()> {
        object.upsert(self.conn)?;
        Ok(())
    }

    pub fn get<T: StoredObject>(&self, id: &str) -> AppResult<T> {
        get_in(self.conn, id)
    }

    pub fn find<T: StoredObject>(&self, id: &str) -> AppResult<Option<T>> {
        find_in(self.conn, id)
    }

    pub fn query<T: StoredObject>(&self, query: &Query) -> AppResult<Vec<T>> {
        query_in(self.conn, query)
    }

    /// Delete one row; returns whether it existed
    pub fn delete<T: StoredObject>(&self, id: &str) -> AppResult<bool> {
        let sql = format!("DELETE FROM {} WHERE id = ?1", T::TABLE);
        let rows_affected = self.conn.execute(&sql, [id])?;
        Ok(rows_affected > 0)
    }

    /// Delete every row matching `query`; returns the number removed
    pub fn delete_where<T: StoredObject>(&self, query: &Query) -> AppResult<usize> {
        let (where_clause, values) = query.where_clause();
        let sql = format!("DELETE FROM {}{}", T::TABLE, where_clause);
        let rows_affected = self.conn.execute(&sql, params_from_iter(values.iter()))?;
        Ok(rows_affected)
    }
}

// ============================================================================
// STORE
// ============================================================================

pub struct ObjectStore {
    pool: Arc<ConnectionPool>,
    /// Serializes writers; SQLite would otherwise fail them with SQLITE_BUSY
    write_lock: Mutex<()>,
}

impl ObjectStore {
    pub fn new(pool: Arc<ConnectionPool>) -> Self {
        Self {
            pool,
            write_lock: Mutex::new(()),
        }
    }

    /// Open the configured database and bring its schema up to date
    pub fn open(config: &StorageConfig) -> AppResult<Self> {
        config.validate()?;
        let pool = Arc::new(create_connection_pool(config)?);

        {
            let conn = get_connection(&pool)?;
            initialize_database(&conn)?;
            verify_database_integrity(&conn)?;
        }

        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> Arc<ConnectionPool> {
        Arc::clone(&self.pool)
    }

    pub fn stats(&self) -> AppResult<DatabaseStats> {
        let conn = get_connection(&self.pool)?;
        get_database_stats(&conn)
    }

    pub fn get<T: StoredObject>(&self, id: &str) -> AppResult<T> {
        let conn = get_connection(&self.pool)?;
        get_in(&conn, id)
    }

    pub fn find<T: StoredObject>(&self, id: &str) -> AppResult<Option<T>> {
        let conn = get_connection(&self.pool)?;
        find_in(&conn, id)
    }

    pub fn query<T: StoredObject>(&self, query: &Query) -> AppResult<Vec<T>> {
        let conn = get_connection(&self.pool)?;
        query_in(&conn, query)
    }

    /// Run a read-only closure against a pooled connection
    pub fn read<R>(&self, f: impl FnOnce(&Connection) -> AppResult<R>) -> AppResult<R> {
        let conn = get_connection(&self.pool)?;
        f(&conn)
    }

    /// Run `f` as one atomic write
    ///
    /// All mutations commit together or none become visible. Store errors
    /// surface as `TransactionFailure`; typed errors returned by `f` (for
    /// example `NotFound`) pass through unchanged after the rollback.
    pub fn write<R>(&self, f: impl FnOnce(&WriteTx<'_>) -> AppResult<R>) -> AppResult<R> {
        // A poisoned lock only means another writer panicked; its transaction was rolled back
        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let mut conn = get_connection(&self.pool)?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(AppError::TransactionFailure)?;

        let result = f(&WriteTx { conn: &*tx });

        match result {
            Ok(value) => {
                tx.commit().map_err(AppError::TransactionFailure)?;
                Ok(value)
            }
            Err(e) => {
                // Dropping the transaction rolls it back
                drop(tx);
                log::warn!("Write transaction rolled back: {}", e);
                Err(match e {
                    AppError::Database(db) => AppError::TransactionFailure(db),
                    other => other,
                })
            }
        }
    }
}
