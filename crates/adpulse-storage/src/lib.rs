//! Metrics persistence contract + HTTP fetch utilities for Adpulse.

use async_trait::async_trait;
use chrono::NaiveDate;
use thiserror::Error;

use adpulse_core::{MetricRow, Platform};

mod http;
mod memory;
mod postgres;

pub use http::{
    classify_reqwest_error, classify_status, BackoffPolicy, HttpClientConfig, HttpError,
    HttpFetcher, RetryDisposition, SimpleTokenBucket, TokenBucketConfig,
};
pub use memory::MemoryMetricsRepository;
pub use postgres::PgMetricsRepository;

pub const CRATE_NAME: &str = "adpulse-storage";

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("stored row could not be decoded: {0}")]
    Decode(String),
}

/// Filters for a range query. `campaign_contains` matches case-insensitively
/// against the campaign name, with missing names treated as empty strings.
#[derive(Debug, Clone)]
pub struct RowFilter {
    pub client_id: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub platforms: Option<Vec<Platform>>,
    pub campaign_contains: Option<String>,
}

impl RowFilter {
    pub fn range(client_id: impl Into<String>, start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            client_id: client_id.into(),
            start,
            end,
            platforms: None,
            campaign_contains: None,
        }
    }
}

/// The persistence contract for canonical metric rows.
///
/// `upsert` is idempotent on the row uniqueness key: repeating a batch with
/// unchanged input produces no additional observable effect. Each row write
/// is an atomic replace (insert-or-overwrite, last writer wins); the batch
/// as a whole is not atomic.
#[async_trait]
pub trait MetricsRepository: Send + Sync {
    /// Insert each row, or overwrite the stored row sharing its key and
    /// refresh its last-updated timestamp. Returns the number of rows
    /// written. Rows are never deleted here.
    async fn upsert(&self, rows: &[MetricRow]) -> Result<u64, RepositoryError>;

    /// Rows matching all supplied filters, ordered by date ascending.
    /// An empty result is a valid `Ok`, not an error.
    async fn query_range(&self, filter: &RowFilter) -> Result<Vec<MetricRow>, RepositoryError>;

    /// The min and max stored dates for a client, or `None` when the client
    /// has no rows at all — callers must treat `None` as "stop before any
    /// range query", not as an empty range.
    async fn date_bounds(
        &self,
        client_id: &str,
    ) -> Result<Option<(NaiveDate, NaiveDate)>, RepositoryError>;
}
