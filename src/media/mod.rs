// src/media/mod.rs
//
// Image bytes on disk: codec helpers, the file-system store and the
// ordered pipeline on top of it.

pub mod codec;
pub mod image_pipeline;
pub mod media_store;

pub use image_pipeline::ImagePipeline;
pub use media_store::{FileSystemMediaStore, MediaStorage};
