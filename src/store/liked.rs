// src/store/liked.rs
//
// Liked-id collaborator
//
// A small persisted set of Performance ids. It is injected into the
// Performance Repository and never owned by it; liking is independent of
// whether the Performance is cached locally.

use std::collections::HashSet;
use std::sync::{Arc, RwLock};

use chrono::Utc;
use rusqlite::params;

use crate::db::{get_connection, ConnectionPool};
use crate::error::AppResult;
use crate::store::rows::format_timestamp;

pub trait LikedPerformances: Send + Sync {
    fn liked_ids(&self) -> AppResult<HashSet<String>>;
    fn is_liked(&self, performance_id: &str) -> AppResult<bool>;
    fn set_liked(&self, performance_id: &str, liked: bool) -> AppResult<()>;
}

/// Key-value table on the main database
pub struct SqliteLikedPerformances {
    pool: Arc<ConnectionPool>,
}

impl SqliteLikedPerformances {
    pub fn new(pool: Arc<ConnectionPool>) -> Self {
        Self { pool }
    }
}

impl LikedPerformances for SqliteLikedPerformances {
    fn liked_ids(&self) -> AppResult<HashSet<String>> {
        let conn = get_connection(&self.pool)?;
        let mut stmt = conn.prepare("SELECT performance_id FROM liked_performances")?;
        let ids = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<HashSet<_>, _>>()?;
        Ok(ids)
    }

    fn is_liked(&self, performance_id: &str) -> AppResult<bool> {
        let conn = get_connection(&self.pool)?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM liked_performances WHERE performance_id = ?1",
            params![performance_id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn set_liked(&self, performance_id: &str, liked: bool) -> AppResult<()> {
        let conn = get_connection(&self.pool)?;
        if liked {
            conn.execute(
                "INSERT OR IGNORE INTO liked_performances (performance_id, liked_at) VALUES (?1, ?2)",
                params![performance_id, format_timestamp(&Utc::now())],
            )?;
        } else {
            conn.execute(
                "DELETE FROM liked_performances WHERE performance_id = ?1",
                params![performance_id],
            )?;
        }
        log::debug!("Performance {} liked={}", performance_id, liked);
        Ok(())
    }
}

/// Process-local set, for hosts that persist likes elsewhere
#[derive(Default)]
pub struct InMemoryLikedPerformances {
    ids: RwLock<HashSet<String>>,
}

impl InMemoryLikedPerformances {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            ids: RwLock::new(ids.into_iter().map(Into::into).collect()),
        }
    }
}

impl LikedPerformances for InMemoryLikedPerformances {
    fn liked_ids(&self) -> AppResult<HashSet<String>> {
        Ok(self.ids.read().unwrap_or_else(|p| p.into_inner()).clone())
    }

    fn is_liked(&self, performance_id: &str) -> AppResult<bool> {
        Ok(self
            .ids
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .contains(performance_id))
    }

    fn set_liked(&self, performance_id: &str, liked: bool) -> AppResult<()> {
        let mut ids = self.ids.write().unwrap_or_else(|p| p.into_inner());
        if liked {
            ids.insert(performance_id.to_string());
        } else {
            ids.remove(performance_id);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StorageConfig;
    use crate::store::ObjectStore;

    #[test]
    fn test_sqlite_liked_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = ObjectStore::open(&StorageConfig::from_root(dir.path())).unwrap();
        let liked = SqliteLikedPerformances::new(store.pool());

        liked.set_liked("PF1", true).unwrap();
        liked.set_liked("PF1", true).unwrap();
        liked.set_liked("PF2", true).unwrap();
        liked.set_liked("PF2", false).unwrap();

        assert!(liked.is_liked("PF1").unwrap());
        assert!(!liked.is_liked("PF2").unwrap());
        assert_eq!(liked.liked_ids().unwrap(), HashSet::from(["PF1".to_string()]));
    }

    #[test]
    fn test_in_memory_liked() {
        let liked = InMemoryLikedPerformances::with_ids(["PF1"]);
        liked.set_liked("PF3", true).unwrap();
        liked.set_liked("PF1", false).unwrap();
        assert_eq!(liked.liked_ids().unwrap(), HashSet::from(["PF3".to_string()]));
    }
}
