// src/media/image_pipeline.rs
//
// Remote fetch, normalization and ordered parallel save/load
//
// CRITICAL RULES:
// - Result order is input order; completion order is never observable
// - Fan-out is bounded per call
// - One failed item fails the call, but items already on disk stay there
//   (no rollback); the caller owns cleanup of the namespace
// - Never runs inside an object store write

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use uuid::Uuid;

use crate::config::StorageConfig;
use crate::domain::MediaCategory;
use crate::error::{AppError, AppResult};
use crate::integrations::ImageFetcher;
use crate::media::codec;
use crate::media::media_store::MediaStorage;

pub struct ImagePipeline {
    storage: Arc<dyn MediaStorage>,
    fetcher: Arc<dyn ImageFetcher>,
    jpeg_quality: u8,
    max_parallel: usize,
}

impl ImagePipeline {
    pub fn new(
        storage: Arc<dyn MediaStorage>,
        fetcher: Arc<dyn ImageFetcher>,
        config: &StorageConfig,
    ) -> Self {
        Self {
            storage,
            fetcher,
            jpeg_quality: config.jpeg_quality,
            max_parallel: config.max_parallel_media_ops.max(1),
        }
    }

    pub fn storage(&self) -> Arc<dyn MediaStorage> {
        Arc::clone(&self.storage)
    }

    /// Download one image and re-encode it as a static JPEG
    pub async fn fetch_remote(&self, url: &str) -> AppResult<Vec<u8>> {
        fetch_normalized(Arc::clone(&self.fetcher), url.to_string(), self.jpeg_quality).await
    }

    /// Save every item under a fresh id; ids come back in input order
    pub async fn save_ordered(
        &self,
        items: Vec<Vec<u8>>,
        owner_id: &str,
        category: MediaCategory,
    ) -> AppResult<Vec<String>> {
        let storage = Arc::clone(&self.storage);
        let owner_id = owner_id.to_string();

        let ids = self
            .fan_out(items, move |bytes| {
                let storage = Arc::clone(&storage);
                let owner_id = owner_id.clone();
                async move {
                    let id = Uuid::new_v4().to_string();
                    storage.save(&bytes, &id, category, &owner_id).await?;
                    Ok(id)
                }
            })
            .await?;

        Ok(ids)
    }

    /// Full-size bytes for `ids`, in the same order
    pub async fn load_ordered(
        &self,
        ids: &[String],
        owner_id: &str,
        category: MediaCategory,
    ) -> AppResult<Vec<Vec<u8>>> {
        self.load_ordered_variant(ids, owner_id, category, false).await
    }

    /// Thumbnail bytes for `ids`, in the same order
    pub async fn load_thumbnails_ordered(
        &self,
        ids: &[String],
        owner_id: &str,
        category: MediaCategory,
    ) -> AppResult<Vec<Vec<u8>>> {
        self.load_ordered_variant(ids, owner_id, category, true).await
    }

    /// Download, normalize and store `urls`; ids come back in URL order
    pub async fn fetch_and_save_ordered(
        &self,
        urls: &[String],
        owner_id: &str,
        category: MediaCategory,
    ) -> AppResult<Vec<String>> {
        if urls.is_empty() {
            return Ok(Vec::new());
        }

        let fetcher = Arc::clone(&self.fetcher);
        let quality = self.jpeg_quality;
        let images = self
            .fan_out(urls.to_vec(), move |url| {
                fetch_normalized(Arc::clone(&fetcher), url, quality)
            })
            .await?;

        self.save_ordered(images, owner_id, category).await
    }

    async fn load_ordered_variant(
        &self,
        ids: &[String],
        owner_id: &str,
        category: MediaCategory,
        thumbnail: bool,
    ) -> AppResult<Vec<Vec<u8>>> {
        let storage = Arc::clone(&self.storage);
        let owner_id = owner_id.to_string();

        self.fan_out(ids.to_vec(), move |id| {
            let storage = Arc::clone(&storage);
            let owner_id = owner_id.clone();
            async move {
                if thumbnail {
                    storage.load_thumbnail(&id, category, &owner_id).await
                } else {
                    storage.load(&id, category, &owner_id).await
                }
            }
        })
        .await
    }

    /// Run `op` over every input with at most `max_parallel` in flight
    ///
    /// Each unit is tagged with its input index and results are re-sorted by
    /// that index. Every unit runs to completion even after a failure; the
    /// first failure is returned.
    async fn fan_out<I, T, F, Fut>(&self, inputs: Vec<I>, op: F) -> AppResult<Vec<T>>
    where
        I: Send + 'static,
        T: Send + 'static,
        F: Fn(I) -> Fut + Send,
        Fut: Future<Output = AppResult<T>> + Send + 'static,
    {
        let total = inputs.len();
        let semaphore = Arc::new(Semaphore::new(self.max_parallel));
        let mut tasks = JoinSet::new();

        for (index, input) in inputs.into_iter().enumerate() {
            let semaphore = Arc::clone(&semaphore);
            let unit = op(input);
            tasks.spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|e| AppError::Other(format!("Media fan-out closed: {}", e)))?;
                unit.await.map(|value| (index, value))
            });
        }

        let mut tagged = Vec::with_capacity(total);
        let mut first_error = None;

        while let Some(joined) = tasks.join_next().await {
            match joined.map_err(AppError::from).and_then(|result| result) {
                Ok(pair) => tagged.push(pair),
                Err(e) => {
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }

        if let Some(e) = first_error {
            log::warn!(
                "Media fan-out failed after {}/{} items succeeded (completed items are kept): {}",
                tagged.len(),
                total,
                e
            );
            return Err(e);
        }

        tagged.sort_by_key(|(index, _)| *index);
        Ok(tagged.into_iter().map(|(_, value)| value).collect())
    }
}

async fn fetch_normalized(
    fetcher: Arc<dyn ImageFetcher>,
    url: String,
    quality: u8,
) -> AppResult<Vec<u8>> {
    let raw = fetcher.fetch(&url).await?;
    let normalized =
        tokio::task::spawn_blocking(move || codec::normalize(&raw, quality)).await??;
    Ok(normalized)
}
