// src/repositories/record_repository.rs
//
// Record persistence - diary rows + their images
//
// CRITICAL RULES:
// - Every public call holds the repository gate (single logical writer)
// - A Record is only ever created for an existing Performance
// - Image saves run between two writes, never inside one
// - Every successful mutation publishes a change signal afterwards

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{broadcast, Mutex};
use tokio_stream::wrappers::BroadcastStream;

use crate::domain::{validate_record, MediaCategory, NewRecord, Performance, Record, RecordPatch};
use crate::error::{AppError, AppResult};
use crate::events::{Change, ChangeBus};
use crate::media::ImagePipeline;
use crate::store::{ObjectStore, Query};

pub struct RecordRepository {
    store: Arc<ObjectStore>,
    pipeline: Arc<ImagePipeline>,
    bus: ChangeBus,
    gate: Mutex<()>,
}

impl RecordRepository {
    pub fn new(store: Arc<ObjectStore>, pipeline: Arc<ImagePipeline>, bus: ChangeBus) -> Self {
        Self {
            store,
            pipeline,
            bus,
            gate: Mutex::new(()),
        }
    }

    /// Create a Record for an existing Performance and attach `images` in order
    ///
    /// Fails with `PerformanceNotFound` when the owner is not cached; the
    /// Performance must be saved first. If the images cannot be stored or
    /// attached, the new Record and whatever part of its namespace was written
    /// are removed again before the error is returned.
    pub async fn create_record(&self, draft: NewRecord, images: Vec<Vec<u8>>) -> AppResult<Record> {
        let _gate = self.gate.lock().await;

        let mut record = self.store.write(|tx| {
            if tx.find::<Performance>(&draft.performance_id)?.is_none() {
                return Err(AppError::PerformanceNotFound(draft.performance_id.clone()));
            }

            let record = Record::from_draft(draft);
            validate_record(&record)?;
            tx.upsert(&record)?;
            Ok(record)
        })?;

        log::info!(
            "Created record {} for performance {}",
            record.id,
            record.performance_id
        );

        if !images.is_empty() {
            let image_ids = match self
                .pipeline
                .save_ordered(images, &record.id, MediaCategory::Record)
                .await
            {
                Ok(ids) => ids,
                Err(e) => {
                    self.discard(&record, &e).await;
                    return Err(e);
                }
            };

            // The owner may have been deleted while the images were saved
            let record_id = record.id.clone();
            let attached = self.store.write(|tx| {
                let mut stored = tx.get::<Record>(&record_id)?;
                stored.image_ids = image_ids;
                stored.updated_at = Utc::now();
                tx.upsert(&stored)?;
                Ok(stored)
            });
            record = match attached {
                Ok(stored) => stored,
                Err(e) => {
                    self.discard(&record, &e).await;
                    return Err(e);
                }
            };

            log::debug!(
                "Attached {} images to record {}",
                record.image_ids.len(),
                record.id
            );
        }

        self.bus.publish();
        Ok(record)
    }

    /// Records of one Performance in creation order
    pub async fn fetch_records(&self, performance_id: &str) -> AppResult<Vec<Record>> {
        let _gate = self.gate.lock().await;
        self.store
            .query::<Record>(&Query::eq("performance_id", performance_id))
    }

    pub async fn fetch_all_records(&self) -> AppResult<Vec<Record>> {
        let _gate = self.gate.lock().await;
        self.store.query::<Record>(&Query::all())
    }

    pub async fn fetch_record(&self, record_id: &str) -> AppResult<Record> {
        let _gate = self.gate.lock().await;
        self.store.get::<Record>(record_id)
    }

    /// Change only the supplied fields; `NotFound` for an unknown id
    ///
    /// An empty patch writes nothing and publishes nothing.
    pub async fn update_record(&self, record_id: &str, patch: RecordPatch) -> AppResult<Record> {
        let _gate = self.gate.lock().await;

        let (updated, changed) = self.store.write(|tx| {
            let mut record = tx.get::<Record>(record_id)?;
            if patch.is_empty() {
                return Ok((record, false));
            }

            record.apply_patch(patch);
            validate_record(&record)?;
            tx.upsert(&record)?;
            Ok((record, true))
        })?;

        if changed {
            log::info!("Updated record {}", record_id);
            self.bus.publish();
        }
        Ok(updated)
    }

    /// Delete a Record and its images
    ///
    /// The owning Performance stays, even with no Records left. Deleting a
    /// Record that is already gone still succeeds.
    pub async fn delete_record(&self, record: &Record) -> AppResult<()> {
        let _gate = self.gate.lock().await;

        self.pipeline
            .storage()
            .delete_namespace(MediaCategory::Record, &record.id)
            .await?;

        let existed = self.store.write(|tx| tx.delete::<Record>(&record.id))?;

        debug_assert!(
            !self
                .store
                .query::<Record>(&Query::eq("performance_id", record.performance_id.as_str()))
                .map(|remaining| remaining.iter().any(|r| r.id == record.id))
                .unwrap_or(false),
            "record {} still listed under its performance",
            record.id
        );

        if existed {
            log::info!("Deleted record {}", record.id);
        } else {
            log::debug!("Record {} was already gone", record.id);
        }

        self.bus.publish();
        Ok(())
    }

    /// Images of a Record in the order they were attached
    pub async fn load_record_images(&self, record: &Record) -> AppResult<Vec<Vec<u8>>> {
        let _gate = self.gate.lock().await;
        self.pipeline
            .load_ordered(&record.image_ids, &record.id, MediaCategory::Record)
            .await
    }

    pub async fn load_record_thumbnails(&self, record: &Record) -> AppResult<Vec<Vec<u8>>> {
        let _gate = self.gate.lock().await;
        self.pipeline
            .load_thumbnails_ordered(&record.image_ids, &record.id, MediaCategory::Record)
            .await
    }

    /// Signal stream; one item per successful mutation after subscribing
    pub fn change_notifications(&self) -> BroadcastStream<Change> {
        self.bus.changes()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Change> {
        self.bus.subscribe()
    }

    /// Undo a half-created Record (best effort)
    async fn discard(&self, record: &Record, cause: &AppError) {
        log::warn!("Discarding record {}: {}", record.id, cause);

        if let Err(e) = self
            .pipeline
            .storage()
            .delete_namespace(MediaCategory::Record, &record.id)
            .await
        {
            log::warn!("Failed to delete media of record {}: {}", record.id, e);
        }

        if let Err(e) = self.store.write(|tx| tx.delete::<Record>(&record.id)) {
            log::warn!("Failed to delete record {}: {}", record.id, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StorageConfig;
    use crate::integrations::MockImageFetcher;
    use crate::media::codec::test_images::png;
    use crate::media::FileSystemMediaStore;
    use chrono::NaiveDate;
    use tempfile::TempDir;
    use tokio::sync::broadcast::error::TryRecvError;

    struct Fixture {
        _dir: TempDir,
        store: Arc<ObjectStore>,
        media: Arc<FileSystemMediaStore>,
        repo: RecordRepository,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let config = StorageConfig::from_root(dir.path());
        let store = Arc::new(ObjectStore::open(&config).unwrap());
        let media = Arc::new(FileSystemMediaStore::new(config.images_dir(), 300));
        let pipeline = Arc::new(ImagePipeline::new(
            media.clone(),
            Arc::new(MockImageFetcher::new()),
            &config,
        ));
        let repo = RecordRepository::new(store.clone(), pipeline, ChangeBus::new());

        let performance = Performance::new(
            "PF1",
            "Hamlet",
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 2, 1).unwrap(),
        );
        store.write(|tx| tx.upsert(&performance)).unwrap();

        Fixture {
            _dir: dir,
            store,
            media,
            repo,
        }
    }

    fn draft(performance_id: &str) -> NewRecord {
        NewRecord::new(performance_id, Utc::now(), 4.5, "Moving")
    }

    #[tokio::test]
    async fn test_create_for_missing_performance_fails() {
        let fx = fixture();
        let err = fx
            .repo
            .create_record(draft("P_missing"), Vec::new())
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::PerformanceNotFound(ref id) if id == "P_missing"));
        assert!(fx.repo.fetch_all_records().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_create_attaches_images_in_order() {
        let fx = fixture();
        let images = vec![png(30, 10), png(20, 10), png(10, 10)];

        let record = fx.repo.create_record(draft("PF1"), images).await.unwrap();
        assert_eq!(record.image_ids.len(), 3);

        let loaded = fx.repo.load_record_images(&record).await.unwrap();
        let widths: Vec<u32> = loaded
            .iter()
            .map(|b| image::load_from_memory(b).unwrap().width())
            .collect();
        assert_eq!(widths, vec![30, 20, 10]);

        let stored = fx.repo.fetch_record(&record.id).await.unwrap();
        assert_eq!(stored.image_ids, record.image_ids);
    }

    #[tokio::test]
    async fn test_create_with_bad_image_leaves_nothing_behind() {
        let fx = fixture();
        let images = vec![png(10, 10), b"not an image".to_vec()];

        let err = fx.repo.create_record(draft("PF1"), images).await.unwrap_err();
        assert!(matches!(err, AppError::ConversionFailure(_)));
        assert!(fx.repo.fetch_records("PF1").await.unwrap().is_empty());

        let reviews = fx.media.images_dir().join("Reviews");
        let leftovers = std::fs::read_dir(&reviews)
            .map(|entries| entries.count())
            .unwrap_or(0);
        assert_eq!(leftovers, 0);
    }

    #[tokio::test]
    async fn test_fetch_records_scoped_to_owner_in_creation_order() {
        let fx = fixture();
        let other = Performance::new(
            "PF2",
            "Macbeth",
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
        );
        fx.store.write(|tx| tx.upsert(&other)).unwrap();

        let first = fx.repo.create_record(draft("PF1"), Vec::new()).await.unwrap();
        fx.repo.create_record(draft("PF2"), Vec::new()).await.unwrap();
        let second = fx.repo.create_record(draft("PF1"), Vec::new()).await.unwrap();

        let ids: Vec<String> = fx
            .repo
            .fetch_records("PF1")
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec![first.id, second.id]);
        assert_eq!(fx.repo.fetch_all_records().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_update_patches_only_supplied_fields() {
        let fx = fixture();
        let record = fx.repo.create_record(draft("PF1"), Vec::new()).await.unwrap();

        let patch = RecordPatch {
            rating: Some(9.0),
            ..RecordPatch::default()
        };
        let updated = fx.repo.update_record(&record.id, patch).await.unwrap();

        assert_eq!(updated.rating, 5.0);
        assert_eq!(updated.note, record.note);
        assert_eq!(updated.viewed_at, record.viewed_at);
        assert_eq!(fx.repo.fetch_record(&record.id).await.unwrap().rating, 5.0);
    }

    #[tokio::test]
    async fn test_update_unknown_record_is_not_found() {
        let fx = fixture();
        let err = fx
            .repo
            .update_record("ghost", RecordPatch::default())
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_delete_removes_row_and_namespace_but_not_owner() {
        let fx = fixture();
        let record = fx
            .repo
            .create_record(draft("PF1"), vec![png(12, 12)])
            .await
            .unwrap();
        let namespace = fx
            .media
            .namespace_path(MediaCategory::Record, &record.id)
            .unwrap();
        assert!(namespace.exists());

        fx.repo.delete_record(&record).await.unwrap();

        assert!(!namespace.exists());
        assert!(fx.repo.fetch_record(&record.id).await.unwrap_err().is_not_found());
        assert!(fx.store.find::<Performance>("PF1").unwrap().is_some());

        // Already gone
        fx.repo.delete_record(&record).await.unwrap();
    }

    #[tokio::test]
    async fn test_mutations_publish_changes() {
        let fx = fixture();
        let mut rx = fx.repo.subscribe();

        let record = fx.repo.create_record(draft("PF1"), Vec::new()).await.unwrap();
        assert_eq!(rx.try_recv().unwrap(), Change);

        fx.repo
            .update_record(
                &record.id,
                RecordPatch {
                    note: Some("Still moving".to_string()),
                    ..RecordPatch::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(rx.try_recv().unwrap(), Change);

        fx.repo.delete_record(&record).await.unwrap();
        assert_eq!(rx.try_recv().unwrap(), Change);

        // Failed calls publish nothing
        let _ = fx.repo.create_record(draft("P_missing"), Vec::new()).await;
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn test_empty_patch_publishes_nothing() {
        let fx = fixture();
        let record = fx.repo.create_record(draft("PF1"), Vec::new()).await.unwrap();
        let mut rx = fx.repo.subscribe();

        let unchanged = fx
            .repo
            .update_record(&record.id, RecordPatch::default())
            .await
            .unwrap();

        assert_eq!(unchanged.updated_at, record.updated_at);
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn test_thumbnails_are_bounded() {
        let fx = fixture();
        let record = fx
            .repo
            .create_record(draft("PF1"), vec![png(900, 300)])
            .await
            .unwrap();

        let thumbs = fx.repo.load_record_thumbnails(&record).await.unwrap();
        let decoded = image::load_from_memory(&thumbs[0]).unwrap();
        assert_eq!(decoded.width(), 300);
    }
}
