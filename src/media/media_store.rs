// src/media/media_store.rs
//
// Filesystem-backed blob store for image bytes and thumbnails
//
// Layout:
//   {images_dir}/Performances/{performance_id}/{image_id}.{ext}
//   {images_dir}/Performances/{performance_id}/{image_id}_thumbnail.{ext}
//   {images_dir}/Reviews/{record_id}/...
//
// CRITICAL RULES:
// - Never touches the object store
// - Deletes are idempotent: absent files and namespaces are not errors
// - Writes go through a temp file + rename so readers never see half a file

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::domain::MediaCategory;
use crate::error::{AppError, AppResult};
use crate::media::codec::{self, SUPPORTED_EXTENSIONS};

const THUMBNAIL_SUFFIX: &str = "_thumbnail";

/// Contract of the media store, so the pipeline can run over other backends
#[async_trait]
pub trait MediaStorage: Send + Sync {
    /// Write the full image and its thumbnail, replacing any previous version
    async fn save(
        &self,
        bytes: &[u8],
        id: &str,
        category: MediaCategory,
        owner_id: &str,
    ) -> AppResult<()>;

    /// Full image bytes, or `NotFound`
    async fn load(&self, id: &str, category: MediaCategory, owner_id: &str) -> AppResult<Vec<u8>>;

    /// Thumbnail bytes, or `NotFound`
    async fn load_thumbnail(
        &self,
        id: &str,
        category: MediaCategory,
        owner_id: &str,
    ) -> AppResult<Vec<u8>>;

    /// Remove both variants; a missing image is not an error
    async fn delete(&self, id: &str, category: MediaCategory, owner_id: &str) -> AppResult<()>;

    /// Remove the whole namespace; a missing namespace is not an error
    async fn delete_namespace(&self, category: MediaCategory, owner_id: &str) -> AppResult<()>;

    /// Image ids currently present in a namespace, sorted
    async fn list_namespace(&self, category: MediaCategory, owner_id: &str)
        -> AppResult<Vec<String>>;
}

pub struct FileSystemMediaStore {
    images_dir: PathBuf,
    thumbnail_max_dimension: u32,
}

impl FileSystemMediaStore {
    pub fn new(images_dir: impl Into<PathBuf>, thumbnail_max_dimension: u32) -> Self {
        Self {
            images_dir: images_dir.into(),
            thumbnail_max_dimension,
        }
    }

    pub fn images_dir(&self) -> &Path {
        &self.images_dir
    }

    /// Folder scoping every file of one owner
    pub fn namespace_path(&self, category: MediaCategory, owner_id: &str) -> AppResult<PathBuf> {
        validate_component(owner_id)?;
        Ok(self
            .images_dir
            .join(category.path_segment())
            .join(owner_id))
    }

    fn file_path(&self, namespace: &Path, id: &str, thumbnail: bool, extension: &str) -> PathBuf {
        let suffix = if thumbnail { THUMBNAIL_SUFFIX } else { "" };
        namespace.join(format!("{}{}.{}", id, suffix, extension))
    }

    async fn load_variant(
        &self,
        id: &str,
        category: MediaCategory,
        owner_id: &str,
        thumbnail: bool,
    ) -> AppResult<Vec<u8>> {
        validate_component(id)?;
        let namespace = self.namespace_path(category, owner_id)?;

        for extension in SUPPORTED_EXTENSIONS {
            let path = self.file_path(&namespace, id, thumbnail, extension);
            match tokio::fs::read(&path).await {
                Ok(bytes) => return Ok(bytes),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(AppError::Io(e)),
            }
        }

        Err(AppError::NotFound)
    }

    /// Remove every extension of one variant
    async fn remove_variants(&self, namespace: &Path, id: &str, keep: Option<&str>) -> AppResult<()> {
        for extension in SUPPORTED_EXTENSIONS {
            if Some(extension) == keep {
                continue;
            }
            for thumbnail in [false, true] {
                remove_if_present(&self.file_path(namespace, id, thumbnail, extension)).await?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl MediaStorage for FileSystemMediaStore {
    async fn save(
        &self,
        bytes: &[u8],
        id: &str,
        category: MediaCategory,
        owner_id: &str,
    ) -> AppResult<()> {
        validate_component(id)?;
        let namespace = self.namespace_path(category, owner_id)?;

        let extension = codec::detect_extension(bytes)?;
        let owned = bytes.to_vec();
        let max_dimension = self.thumbnail_max_dimension;
        let (owned, thumbnail) = tokio::task::spawn_blocking(move || {
            let thumbnail = codec::make_thumbnail(&owned, extension, max_dimension);
            (owned, thumbnail)
        })
        .await?;
        let thumbnail = thumbnail?;

        tokio::fs::create_dir_all(&namespace).await?;

        // An earlier save under another extension would shadow this one on load
        self.remove_variants(&namespace, id, Some(extension)).await?;

        write_atomically(&self.file_path(&namespace, id, false, extension), &owned).await?;
        write_atomically(&self.file_path(&namespace, id, true, extension), &thumbnail).await?;

        log::debug!(
            "Saved image {} ({} bytes, .{}) under {}/{}",
            id,
            owned.len(),
            extension,
            category.path_segment(),
            owner_id
        );
        Ok(())
    }

    async fn load(&self, id: &str, category: MediaCategory, owner_id: &str) -> AppResult<Vec<u8>> {
        self.load_variant(id, category, owner_id, false).await
    }

    async fn load_thumbnail(
        &self,
        id: &str,
        category: MediaCategory,
        owner_id: &str,
    ) -> AppResult<Vec<u8>> {
        self.load_variant(id, category, owner_id, true).await
    }

    async fn delete(&self, id: &str, category: MediaCategory, owner_id: &str) -> AppResult<()> {
        validate_component(id)?;
        let namespace = self.namespace_path(category, owner_id)?;
        self.remove_variants(&namespace, id, None).await?;

        log::debug!(
            "Deleted image {} under {}/{}",
            id,
            category.path_segment(),
            owner_id
        );
        Ok(())
    }

    async fn delete_namespace(&self, category: MediaCategory, owner_id: &str) -> AppResult<()> {
        let namespace = self.namespace_path(category, owner_id)?;

        match tokio::fs::remove_dir_all(&namespace).await {
            Ok(()) => {
                log::info!("Deleted media namespace {}", namespace.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AppError::Io(e)),
        }
    }

    async fn list_namespace(
        &self,
        category: MediaCategory,
        owner_id: &str,
    ) -> AppResult<Vec<String>> {
        let namespace = self.namespace_path(category, owner_id)?;

        let mut entries = match tokio::fs::read_dir(&namespace).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(AppError::Io(e)),
        };

        let mut ids = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let is_image = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| SUPPORTED_EXTENSIONS.contains(&e))
                .unwrap_or(false);
            let stem = path.file_stem().and_then(|s| s.to_str());

            if let (true, Some(stem)) = (is_image, stem) {
                if !stem.ends_with(THUMBNAIL_SUFFIX) {
                    ids.push(stem.to_string());
                }
            }
        }

        ids.sort();
        ids.dedup();
        Ok(ids)
    }
}

/// Ids and owner ids become path components
fn validate_component(component: &str) -> AppResult<()> {
    let invalid = component.is_empty()
        || component == "."
        || component == ".."
        || component.contains(['/', '\\', '\0']);

    if invalid {
        return Err(AppError::Other(format!(
            "Invalid media path component: {:?}",
            component
        )));
    }
    Ok(())
}

async fn remove_if_present(path: &Path) -> AppResult<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(AppError::Io(e)),
    }
}

async fn write_atomically(path: &Path, bytes: &[u8]) -> AppResult<()> {
    let temp_path = path.with_extension("tmp");
    tokio::fs::write(&temp_path, bytes).await?;
    tokio::fs::rename(&temp_path, path).await?;
    Ok(())
}
