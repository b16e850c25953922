// src/repositories/performance_repository.rs
//
// Performance persistence - metadata rows + owned images in lock-step
//
// CRITICAL RULES:
// - Every public call holds the repository gate (single logical writer)
// - Media I/O never runs inside a store write
// - save: write new metadata first, free old images/links after
// - delete: media first, then metadata in one write

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;

use crate::domain::{validate_performance, MediaCategory, Performance, Record};
use crate::error::{AppError, AppResult};
use crate::integrations::PerformanceDetailSource;
use crate::media::ImagePipeline;
use crate::store::object_store::{get_in, query_in};
use crate::store::{
    hydrate_performance, record_ids_for, LikedPerformances, ObjectStore, Query, RelatedLinkRow,
};

/// State of an existing row, captured before it is overwritten
#[derive(Debug, Default)]
struct Captured {
    image_ids: Vec<String>,
    link_ids: Vec<String>,
    record_ids: Vec<String>,
}

pub struct PerformanceRepository {
    store: Arc<ObjectStore>,
    pipeline: Arc<ImagePipeline>,
    detail_source: Arc<dyn PerformanceDetailSource>,
    liked: Arc<dyn LikedPerformances>,
    gate: Mutex<()>,
}

impl PerformanceRepository {
    pub fn new(
        store: Arc<ObjectStore>,
        pipeline: Arc<ImagePipeline>,
        detail_source: Arc<dyn PerformanceDetailSource>,
        liked: Arc<dyn LikedPerformances>,
    ) -> Self {
        Self {
            store,
            pipeline,
            detail_source,
            liked,
            gate: Mutex::new(()),
        }
    }

    // ========================================================================
    // READS
    // ========================================================================

    /// Decoded Performance straight from the remote catalog (nothing is stored)
    pub async fn fetch_detail_remote(&self, performance_id: &str) -> AppResult<Performance> {
        let _gate = self.gate.lock().await;
        self.detail_source.fetch_detail(performance_id).await
    }

    /// Locally cached Performance, or `NotFound`
    pub async fn fetch_detail_local(&self, performance_id: &str) -> AppResult<Performance> {
        let _gate = self.gate.lock().await;
        self.load_hydrated(performance_id)
    }

    pub async fn fetch_all_local(&self) -> AppResult<Vec<Performance>> {
        let _gate = self.gate.lock().await;
        self.load_all(&Query::all())
    }

    /// Cached Performances whose id is in the liked set
    pub async fn fetch_liked(&self) -> AppResult<Vec<Performance>> {
        let _gate = self.gate.lock().await;
        let liked: Vec<String> = self.liked.liked_ids()?.into_iter().collect();
        self.load_all(&Query::one_of("id", liked))
    }

    /// The Performance with the most Records
    ///
    /// Ranked in memory. Ties go to the first in name order. `NotFound` when
    /// no Performance has any Record.
    pub async fn fetch_most_viewed(&self) -> AppResult<Performance> {
        let _gate = self.gate.lock().await;

        let mut best: Option<Performance> = None;
        for performance in self.load_all(&Query::all())? {
            let count = performance.record_ids.len();
            let current = best.as_ref().map(|b| b.record_ids.len()).unwrap_or(0);
            if count > current {
                best = Some(performance);
            }
        }

        best.ok_or(AppError::NotFound)
    }

    pub async fn is_liked(&self, performance_id: &str) -> AppResult<bool> {
        let _gate = self.gate.lock().await;
        self.liked.is_liked(performance_id)
    }

    pub async fn set_liked(&self, performance_id: &str, liked: bool) -> AppResult<()> {
        let _gate = self.gate.lock().await;
        self.liked.set_liked(performance_id, liked)
    }

    /// Full-size poster, `None` when the Performance has no poster
    pub async fn load_poster(&self, performance: &Performance) -> AppResult<Option<Vec<u8>>> {
        let _gate = self.gate.lock().await;
        self.load_poster_variant(performance, false).await
    }

    pub async fn load_poster_thumbnail(
        &self,
        performance: &Performance,
    ) -> AppResult<Option<Vec<u8>>> {
        let _gate = self.gate.lock().await;
        self.load_poster_variant(performance, true).await
    }

    /// Detail images in display order
    pub async fn load_detail_images(&self, performance: &Performance) -> AppResult<Vec<Vec<u8>>> {
        let _gate = self.gate.lock().await;
        self.pipeline
            .load_ordered(
                performance.detail_image_ids(),
                &performance.id,
                MediaCategory::Performance,
            )
            .await
    }

    // ========================================================================
    // MUTATIONS
    // ========================================================================

    /// Cache a Performance with its poster and detail images
    ///
    /// Images are downloaded when the Performance carries remote URLs;
    /// otherwise its local ids are kept as-is. Owned Records survive the
    /// overwrite. Old images and links that the new version no longer
    /// references are freed after the write commits; failing to free them is
    /// logged and does not fail the call.
    pub async fn save(&self, performance: Performance) -> AppResult<Performance> {
        let _gate = self.gate.lock().await;
        validate_performance(&performance)?;

        let mut incoming = performance;
        let performance_id = incoming.id.clone();
        log::info!("Saving performance {}", performance_id);

        self.download_images(&mut incoming).await?;

        let new_image_ids: HashSet<String> = incoming.owned_image_ids().into_iter().collect();
        let new_link_ids: HashSet<String> =
            incoming.related_links().iter().map(|l| l.id.clone()).collect();
        incoming.updated_at = Utc::now();

        let captured = self.store.write(|tx| {
            let captured = match tx.find::<Performance>(&performance_id)? {
                Some(previous) => Captured {
                    image_ids: previous.owned_image_ids(),
                    link_ids: tx
                        .query::<RelatedLinkRow>(&Query::eq("performance_id", performance_id.as_str()))?
                        .into_iter()
                        .map(|row| row.id)
                        .collect(),
                    record_ids: record_ids_for(tx.connection(), &performance_id)?,
                },
                None => Captured::default(),
            };

            tx.upsert(&incoming)?;
            for (position, link) in incoming.related_links().iter().enumerate() {
                tx.upsert(&RelatedLinkRow::from_link(&performance_id, position, link))?;
            }

            // Records reference the row by id, so the upsert must leave them attached
            let attached = record_ids_for(tx.connection(), &performance_id)?;
            if attached != captured.record_ids {
                return Err(AppError::Other(format!(
                    "Performance {} lost its records during save",
                    performance_id
                )));
            }

            Ok(captured)
        })?;

        let stale_images: Vec<String> = captured
            .image_ids
            .into_iter()
            .filter(|id| !new_image_ids.contains(id))
            .collect();
        let stale_links: Vec<String> = captured
            .link_ids
            .into_iter()
            .filter(|id| !new_link_ids.contains(id))
            .collect();

        self.free_stale(&performance_id, stale_images, stale_links).await;

        log::info!(
            "Saved performance {} ({} records kept)",
            performance_id,
            captured.record_ids.len()
        );

        self.load_hydrated(&performance_id)
    }

    /// Remove a Performance, its Records, and every image either of them owns
    ///
    /// Media goes first. If that fails the metadata is untouched and the call
    /// can simply be retried.
    pub async fn delete(&self, performance_id: &str) -> AppResult<()> {
        let _gate = self.gate.lock().await;
        log::info!("Deleting performance {}", performance_id);

        let record_ids = self.store.read(|conn| {
            get_in::<Performance>(conn, performance_id)?;
            record_ids_for(conn, performance_id)
        })?;

        let storage = self.pipeline.storage();
        for record_id in &record_ids {
            storage
                .delete_namespace(MediaCategory::Record, record_id)
                .await?;
        }
        storage
            .delete_namespace(MediaCategory::Performance, performance_id)
            .await?;

        let deleted_record_ids = self.store.write(|tx| {
            let by_owner = Query::eq("performance_id", performance_id);
            let deleted_record_ids = record_ids_for(tx.connection(), performance_id)?;

            let links = tx.delete_where::<RelatedLinkRow>(&by_owner)?;
            let records = tx.delete_where::<Record>(&by_owner)?;
            tx.delete::<Performance>(performance_id)?;

            log::debug!(
                "Deleted performance {} rows: {} links, {} records",
                performance_id,
                links,
                records
            );
            Ok(deleted_record_ids)
        })?;

        // Records created after the media pass still own namespaces
        for late in deleted_record_ids.iter().filter(|id| !record_ids.contains(id)) {
            if let Err(e) = storage.delete_namespace(MediaCategory::Record, late).await {
                log::warn!("Failed to delete media of record {}: {}", late, e);
            }
        }

        log::info!("Deleted performance {}", performance_id);
        Ok(())
    }

    // ========================================================================
    // INTERNALS
    // ========================================================================

    fn load_hydrated(&self, performance_id: &str) -> AppResult<Performance> {
        self.store.read(|conn| {
            let performance = get_in::<Performance>(conn, performance_id)?;
            hydrate_performance(conn, performance)
        })
    }

    fn load_all(&self, query: &Query) -> AppResult<Vec<Performance>> {
        self.store.read(|conn| {
            query_in::<Performance>(conn, query)?
                .into_iter()
                .map(|performance| hydrate_performance(conn, performance))
                .collect()
        })
    }

    async fn load_poster_variant(
        &self,
        performance: &Performance,
        thumbnail: bool,
    ) -> AppResult<Option<Vec<u8>>> {
        let Some(poster_id) = performance.poster_id.as_ref() else {
            return Ok(None);
        };

        let ids = [poster_id.clone()];
        let mut images = if thumbnail {
            self.pipeline
                .load_thumbnails_ordered(&ids, &performance.id, MediaCategory::Performance)
                .await?
        } else {
            self.pipeline
                .load_ordered(&ids, &performance.id, MediaCategory::Performance)
                .await?
        };

        Ok(images.pop())
    }

    /// Fetch and store remote images, replacing the local ids they feed
    ///
    /// Poster and detail images download concurrently; both are drained
    /// before an error is reported, and whatever either side already stored
    /// is removed again.
    async fn download_images(&self, performance: &mut Performance) -> AppResult<()> {
        let poster_urls: Vec<String> = performance.poster_url.iter().cloned().collect();
        let detail_urls = performance.detail_image_urls().to_vec();
        if poster_urls.is_empty() && detail_urls.is_empty() {
            return Ok(());
        }

        let (poster_ids, detail_ids) = tokio::join!(
            self.pipeline.fetch_and_save_ordered(
                &poster_urls,
                &performance.id,
                MediaCategory::Performance
            ),
            self.pipeline.fetch_and_save_ordered(
                &detail_urls,
                &performance.id,
                MediaCategory::Performance
            ),
        );
        let (poster_ids, detail_ids) = match (poster_ids, detail_ids) {
            (Ok(poster_ids), Ok(detail_ids)) => (poster_ids, detail_ids),
            (Err(e), _) | (_, Err(e)) => {
                self.discard_downloads(&performance.id).await;
                return Err(e);
            }
        };

        if !poster_urls.is_empty() {
            performance.poster_id = poster_ids.into_iter().next();
        }
        if !detail_urls.is_empty() {
            if let Some(detail) = performance.detail.as_mut() {
                detail.detail_image_ids = detail_ids;
            }
        }

        log::debug!(
            "Downloaded {} poster and {} detail images for {}",
            poster_urls.len(),
            detail_urls.len(),
            performance.id
        );
        Ok(())
    }

    /// Remove files a failed download left behind (best effort)
    ///
    /// Only images the stored row references survive; with no row yet the
    /// whole namespace goes.
    async fn discard_downloads(&self, performance_id: &str) {
        let storage = self.pipeline.storage();

        let referenced = match self.store.find::<Performance>(performance_id) {
            Ok(Some(stored)) => stored.owned_image_ids(),
            Ok(None) => {
                if let Err(e) = storage
                    .delete_namespace(MediaCategory::Performance, performance_id)
                    .await
                {
                    log::warn!(
                        "Failed to delete media of unsaved performance {}: {}",
                        performance_id,
                        e
                    );
                }
                return;
            }
            Err(e) => {
                log::warn!(
                    "Cannot discard downloads of performance {}: {}",
                    performance_id,
                    e
                );
                return;
            }
        };

        let on_disk = match storage
            .list_namespace(MediaCategory::Performance, performance_id)
            .await
        {
            Ok(ids) => ids,
            Err(e) => {
                log::warn!("Cannot list media of performance {}: {}", performance_id, e);
                return;
            }
        };

        for orphan in on_disk.iter().filter(|id| !referenced.contains(id)) {
            if let Err(e) = storage
                .delete(orphan, MediaCategory::Performance, performance_id)
                .await
            {
                log::warn!(
                    "Failed to discard image {} of performance {}: {}",
                    orphan,
                    performance_id,
                    e
                );
            }
        }
    }

    /// Best-effort cleanup after a committed save
    async fn free_stale(&self, performance_id: &str, image_ids: Vec<String>, link_ids: Vec<String>) {
        let storage = self.pipeline.storage();
        for image_id in &image_ids {
            if let Err(e) = storage
                .delete(image_id, MediaCategory::Performance, performance_id)
                .await
            {
                log::warn!(
                    "Failed to free old image {} of performance {}: {}",
                    image_id,
                    performance_id,
                    e
                );
            }
        }

        if !link_ids.is_empty() {
            let count = link_ids.len();
            let result = self
                .store
                .write(|tx| tx.delete_where::<RelatedLinkRow>(&Query::one_of("id", link_ids)));
            if let Err(e) = result {
                log::warn!(
                    "Failed to free {} old links of performance {}: {}",
                    count,
                    performance_id,
                    e
                );
            }
        }

        log::debug!(
            "Freed {} old images of performance {}",
            image_ids.len(),
            performance_id
        );
    }
}
