// src/integrations/mod.rs
//
// External Integrations Module
//
// Boundaries to the outside world. Nothing here touches local storage.

pub mod detail_source;
pub mod image_fetcher;

pub use detail_source::PerformanceDetailSource;
pub use image_fetcher::{HttpImageFetcher, ImageFetcher};

#[cfg(test)]
pub use detail_source::MockPerformanceDetailSource;
#[cfg(test)]
pub use image_fetcher::MockImageFetcher;
