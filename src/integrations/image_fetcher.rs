// src/integrations/image_fetcher.rs
//
// Remote image download
//
// ARCHITECTURE:
// - Plain HTTP GET of catalog poster/detail image URLs
// - Returns raw bytes; normalization happens in the image pipeline
// - Timeouts are enforced here, never inside the repositories

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client};

use crate::config::StorageConfig;
use crate::error::{AppError, AppResult};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ImageFetcher: Send + Sync {
    /// Raw bytes behind `url`
    async fn fetch(&self, url: &str) -> AppResult<Vec<u8>>;
}

/// reqwest-backed fetcher
pub struct HttpImageFetcher {
    http_client: Client,
}

impl HttpImageFetcher {
    pub fn new(timeout: Duration) -> AppResult<Self> {
        let http_client = Client::builder().timeout(timeout).build()?;
        Ok(Self { http_client })
    }

    pub fn from_config(config: &StorageConfig) -> AppResult<Self> {
        Self::new(Duration::from_secs(config.http_timeout_secs))
    }
}

#[async_trait]
impl ImageFetcher for HttpImageFetcher {
    async fn fetch(&self, url: &str) -> AppResult<Vec<u8>> {
        let response = self
            .http_client
            .get(url)
            .header(header::ACCEPT, "image/*")
            .send()
            .await?;

        // Check HTTP status
        if !response.status().is_success() {
            return Err(AppError::Other(format!(
                "Image download from {} returned status: {}",
                url,
                response.status()
            )));
        }

        let bytes = response.bytes().await?;
        log::debug!("Downloaded {} bytes from {}", bytes.len(), url);
        Ok(bytes.to_vec())
    }
}
