// src/integrations/detail_source.rs
//
// Remote detail collaborator
//
// Supplies fully decoded Performance objects. Wire format, retries and
// authentication belong to the implementor; this layer only consumes the
// decoded result.

use async_trait::async_trait;

use crate::domain::Performance;
use crate::error::AppResult;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PerformanceDetailSource: Send + Sync {
    /// Decoded Performance with `poster_url` and detail image URLs populated
    /// and no local image ids
    async fn fetch_detail(&self, performance_id: &str) -> AppResult<Performance>;
}
