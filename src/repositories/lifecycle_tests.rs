// src/repositories/lifecycle_tests.rs
//
// End-to-end lifecycle tests across both repositories
//
// Each test runs against a real SQLite file and a real image directory in a
// temp root. Remote images come from a mocked fetcher; latency is injected by
// wrapping the file-system media store.

#[cfg(test)]
mod lifecycle_tests {
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::{NaiveDate, Utc};
    use rand::Rng;
    use tempfile::TempDir;
    use tokio::sync::Notify;

    use crate::config::StorageConfig;
    use crate::domain::{MediaCategory, NewRecord, Performance, PerformanceDetail, Record};
    use crate::error::{AppError, AppResult};
    use crate::events::ChangeBus;
    use crate::integrations::{MockImageFetcher, MockPerformanceDetailSource};
    use crate::media::codec::test_images::png;
    use crate::media::{FileSystemMediaStore, ImagePipeline, MediaStorage};
    use crate::repositories::{PerformanceRepository, RecordRepository};
    use crate::store::{InMemoryLikedPerformances, ObjectStore, Query};

    // ========================================================================
    // HARNESS
    // ========================================================================

    /// Holds every save until the test lets it through
    #[derive(Default)]
    struct SaveGate {
        entered: Notify,
        release: Notify,
    }

    /// File-system store whose saves take a while
    ///
    /// Random jitter on every save, plus a long pause for one specific blob.
    struct SlowMediaStore {
        inner: FileSystemMediaStore,
        max_jitter_ms: u64,
        slowest: Option<Vec<u8>>,
        gate: Option<Arc<SaveGate>>,
    }

    #[async_trait]
    impl MediaStorage for SlowMediaStore {
        async fn save(
            &self,
            bytes: &[u8],
            id: &str,
            category: MediaCategory,
            owner_id: &str,
        ) -> AppResult<()> {
            let mut delay = rand::thread_rng().gen_range(0..=self.max_jitter_ms);
            if self.slowest.as_deref() == Some(bytes) {
                delay += 150;
            }
            tokio::time::sleep(Duration::from_millis(delay)).await;
            if let Some(gate) = &self.gate {
                gate.entered.notify_one();
                gate.release.notified().await;
            }
            self.inner.save(bytes, id, category, owner_id).await
        }

        async fn load(&self, id: &str, category: MediaCategory, owner_id: &str) -> AppResult<Vec<u8>> {
            self.inner.load(id, category, owner_id).await
        }

        async fn load_thumbnail(
            &self,
            id: &str,
            category: MediaCategory,
            owner_id: &str,
        ) -> AppResult<Vec<u8>> {
            self.inner.load_thumbnail(id, category, owner_id).await
        }

        async fn delete(&self, id: &str, category: MediaCategory, owner_id: &str) -> AppResult<()> {
            self.inner.delete(id, category, owner_id).await
        }

        async fn delete_namespace(&self, category: MediaCategory, owner_id: &str) -> AppResult<()> {
            self.inner.delete_namespace(category, owner_id).await
        }

        async fn list_namespace(
            &self,
            category: MediaCategory,
            owner_id: &str,
        ) -> AppResult<Vec<String>> {
            self.inner.list_namespace(category, owner_id).await
        }
    }

    struct Harness {
        _dir: TempDir,
        store: Arc<ObjectStore>,
        media: Arc<SlowMediaStore>,
        pipeline: Arc<ImagePipeline>,
        performances: PerformanceRepository,
        records: RecordRepository,
    }

    /// Remote URL "https://img.example/<w>" serves a PNG <w> pixels wide
    fn width_fetcher() -> MockImageFetcher {
        let mut fetcher = MockImageFetcher::new();
        fetcher.expect_fetch().returning(|url| {
            let width = url
                .rsplit('/')
                .next()
                .and_then(|w| w.parse::<u32>().ok())
                .ok_or_else(|| AppError::Other(format!("Unknown URL {}", url)))?;
            Ok(png(width, 8))
        });
        fetcher
    }

    fn harness(max_jitter_ms: u64, slowest: Option<Vec<u8>>) -> Harness {
        build_harness(max_jitter_ms, slowest, None)
    }

    fn gated_harness(gate: Arc<SaveGate>) -> Harness {
        build_harness(0, None, Some(gate))
    }

    fn build_harness(
        max_jitter_ms: u64,
        slowest: Option<Vec<u8>>,
        gate: Option<Arc<SaveGate>>,
    ) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let config = StorageConfig::from_root(dir.path());
        let store = Arc::new(ObjectStore::open(&config).unwrap());
        let media = Arc::new(SlowMediaStore {
            inner: FileSystemMediaStore::new(config.images_dir(), config.thumbnail_max_dimension),
            max_jitter_ms,
            slowest,
            gate,
        });
        let pipeline = Arc::new(ImagePipeline::new(
            media.clone(),
            Arc::new(width_fetcher()),
            &config,
        ));

        let performances = PerformanceRepository::new(
            store.clone(),
            pipeline.clone(),
            Arc::new(MockPerformanceDetailSource::new()),
            Arc::new(InMemoryLikedPerformances::new()),
        );
        let records = RecordRepository::new(store.clone(), pipeline.clone(), ChangeBus::new());

        Harness {
            _dir: dir,
            store,
            media,
            pipeline,
            performances,
            records,
        }
    }

    fn url(width: u32) -> String {
        format!("https://img.example/{}", width)
    }

    fn performance(id: &str, poster: Option<u32>, details: &[u32]) -> Performance {
        let mut p = Performance::new(
            id,
            "Swan Lake",
            NaiveDate::from_ymd_opt(2024, 9, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 9, 30).unwrap(),
        );
        p.poster_url = poster.map(url);
        p.detail = Some(PerformanceDetail {
            detail_image_urls: details.iter().copied().map(url).collect(),
            ..PerformanceDetail::default()
        });
        p
    }

    fn widths(images: &[Vec<u8>]) -> Vec<u32> {
        images
            .iter()
            .map(|b| image::load_from_memory(b).unwrap().width())
            .collect()
    }

    async fn files(h: &Harness, category: MediaCategory, owner: &str) -> Vec<String> {
        h.media.list_namespace(category, owner).await.unwrap()
    }

    // ========================================================================
    // PERFORMANCE LIFECYCLE
    // ========================================================================

    /// PROVES: re-saving replaces the detail list and frees the first save's files
    #[tokio::test]
    async fn test_resave_replaces_images_and_frees_old_files() {
        let h = harness(5, None);

        let first = h
            .performances
            .save(performance("P1", Some(100), &[11, 12]))
            .await
            .unwrap();
        let x = first.poster_id.clone().unwrap();
        let ys = first.detail_image_ids().to_vec();
        assert_eq!(
            widths(&h.performances.load_detail_images(&first).await.unwrap()),
            vec![11, 12]
        );

        let second = h
            .performances
            .save(performance("P1", Some(100), &[13]))
            .await
            .unwrap();
        assert_eq!(second.detail_image_ids().len(), 1);
        assert_eq!(
            widths(&h.performances.load_detail_images(&second).await.unwrap()),
            vec![13]
        );

        for gone in std::iter::once(&x).chain(ys.iter()) {
            let err = h
                .media
                .load(gone, MediaCategory::Performance, "P1")
                .await
                .unwrap_err();
            assert!(err.is_not_found(), "{} should be gone", gone);
        }

        let mut expected = second.owned_image_ids();
        expected.sort();
        assert_eq!(files(&h, MediaCategory::Performance, "P1").await, expected);
    }

    /// PROVES: detail images keep display order whatever the save latency
    #[tokio::test]
    async fn test_detail_order_survives_jitter() {
        let h = harness(30, None);
        let details = [50, 40, 30, 20, 10, 60];

        let saved = h
            .performances
            .save(performance("P1", None, &details))
            .await
            .unwrap();

        assert_eq!(
            widths(&h.performances.load_detail_images(&saved).await.unwrap()),
            details.to_vec()
        );
    }

    /// PROVES: concurrent saves of one id never leave unreferenced files
    #[tokio::test]
    async fn test_concurrent_saves_leave_consistent_namespace() {
        let h = harness(20, None);

        let (a, b) = tokio::join!(
            h.performances.save(performance("P1", Some(7), &[1, 2, 3])),
            h.performances.save(performance("P1", Some(8), &[4])),
        );
        a.unwrap();
        b.unwrap();

        let stored = h.performances.fetch_detail_local("P1").await.unwrap();
        let mut expected = stored.owned_image_ids();
        expected.sort();
        assert_eq!(files(&h, MediaCategory::Performance, "P1").await, expected);
    }

    /// PROVES: deleting a Performance removes its files, its Records and their files, and the row
    #[tokio::test]
    async fn test_delete_performance_cascades() {
        let h = harness(0, None);
        h.performances
            .save(performance("P1", Some(10), &[20, 30]))
            .await
            .unwrap();
        let record = h
            .records
            .create_record(
                NewRecord::new("P1", Utc::now(), 5.0, "Bravo"),
                vec![png(5, 5), png(6, 6)],
            )
            .await
            .unwrap();

        h.performances.delete("P1").await.unwrap();

        assert!(files(&h, MediaCategory::Performance, "P1").await.is_empty());
        assert!(files(&h, MediaCategory::Record, &record.id).await.is_empty());
        assert!(h.store.find::<Record>(&record.id).unwrap().is_none());
        assert!(h
            .performances
            .fetch_detail_local("P1")
            .await
            .unwrap_err()
            .is_not_found());
        assert!(h.records.fetch_all_records().await.unwrap().is_empty());
    }

    // ========================================================================
    // RECORD LIFECYCLE
    // ========================================================================

    /// PROVES: image ids follow input order even when the middle image is slowest
    #[tokio::test]
    async fn test_record_images_keep_input_order_with_slow_middle() {
        let img2 = png(22, 4);
        let h = harness(5, Some(img2.clone()));
        h.performances.save(performance("P1", None, &[])).await.unwrap();

        let images = vec![png(11, 4), img2, png(33, 4)];
        let record = h
            .records
            .create_record(NewRecord::new("P1", Utc::now(), 4.0, ""), images)
            .await
            .unwrap();

        assert_eq!(record.image_ids.len(), 3);
        assert_eq!(
            widths(&h.records.load_record_images(&record).await.unwrap()),
            vec![11, 22, 33]
        );
    }

    /// PROVES: a Record for an unknown Performance creates neither row nor namespace
    #[tokio::test]
    async fn test_record_for_missing_performance_creates_nothing() {
        let h = harness(0, None);

        let err = h
            .records
            .create_record(NewRecord::new("P_missing", Utc::now(), 3.0, ""), Vec::new())
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::PerformanceNotFound(_)));
        assert!(h.records.fetch_all_records().await.unwrap().is_empty());
        assert!(!h.media.inner.images_dir().join("Reviews").exists());
    }

    /// PROVES: a Record whose owner is deleted while its images are saved leaves no files
    #[tokio::test]
    async fn test_owner_deleted_during_record_image_save_leaves_nothing() {
        let gate = Arc::new(SaveGate::default());
        let h = gated_harness(gate.clone());
        h.performances.save(performance("P1", None, &[])).await.unwrap();

        let create = h
            .records
            .create_record(NewRecord::new("P1", Utc::now(), 4.0, ""), vec![png(9, 9)]);
        let delete_owner = async {
            gate.entered.notified().await;
            h.performances.delete("P1").await.unwrap();
            gate.release.notify_one();
        };
        let (created, ()) = tokio::join!(create, delete_owner);

        assert!(created.unwrap_err().is_not_found());
        assert!(h.store.query::<Record>(&Query::all()).unwrap().is_empty());

        let reviews = h.media.inner.images_dir().join("Reviews");
        let leftovers = std::fs::read_dir(&reviews)
            .map(|entries| entries.count())
            .unwrap_or(0);
        assert_eq!(leftovers, 0);
    }

    /// PROVES: deleting the last Record leaves the Performance in place with an empty list
    #[tokio::test]
    async fn test_delete_last_record_keeps_owner() {
        let h = harness(0, None);
        h.performances.save(performance("P1", None, &[])).await.unwrap();
        let record = h
            .records
            .create_record(NewRecord::new("P1", Utc::now(), 2.5, ""), vec![png(9, 9)])
            .await
            .unwrap();
        assert_eq!(
            h.performances.fetch_detail_local("P1").await.unwrap().record_ids,
            vec![record.id.clone()]
        );

        h.records.delete_record(&record).await.unwrap();

        let owner = h.performances.fetch_detail_local("P1").await.unwrap();
        assert!(owner.record_ids.is_empty());
        assert!(files(&h, MediaCategory::Record, &record.id).await.is_empty());
    }

    /// PROVES: re-saving a Performance keeps Records created against it
    #[tokio::test]
    async fn test_resave_after_records_keeps_them_attached() {
        let h = harness(0, None);
        h.performances.save(performance("P1", Some(1), &[])).await.unwrap();
        let record = h
            .records
            .create_record(NewRecord::new("P1", Utc::now(), 4.0, ""), Vec::new())
            .await
            .unwrap();

        let saved = h
            .performances
            .save(performance("P1", Some(2), &[3]))
            .await
            .unwrap();

        assert_eq!(saved.record_ids, vec![record.id.clone()]);
        assert_eq!(h.records.fetch_records("P1").await.unwrap().len(), 1);
        assert_eq!(h.performances.fetch_most_viewed().await.unwrap().id, "P1");
    }

    // ========================================================================
    // ORDERED FAN-OUT
    // ========================================================================

    /// PROVES: save_ordered returns ids in input order under random latency
    #[tokio::test]
    async fn test_save_ordered_order_is_independent_of_latency() {
        let h = harness(25, None);
        let mut rng = rand::thread_rng();
        let rounds: Vec<Vec<u32>> = (0..12)
            .map(|_| {
                let n = rng.gen_range(1..=9);
                (0..n).map(|_| rng.gen_range(1..=64)).collect()
            })
            .collect();
        drop(rng);

        for (round, input_widths) in rounds.into_iter().enumerate() {
            let owner = format!("R{}", round);
            let items: Vec<Vec<u8>> = input_widths.iter().map(|w| png(*w, 3)).collect();

            let ids = h
                .pipeline
                .save_ordered(items, &owner, MediaCategory::Record)
                .await
                .unwrap();
            assert_eq!(ids.len(), input_widths.len());

            let loaded = h
                .pipeline
                .load_ordered(&ids, &owner, MediaCategory::Record)
                .await
                .unwrap();
            assert_eq!(widths(&loaded), input_widths, "round {}", round);
        }
    }
}
