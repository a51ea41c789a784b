//! Platform fetcher contract + the Meta and Google ads API adapters.
//!
//! Each fetcher pages through its platform's insights API for a date range
//! and normalizes every item into canonical [`MetricRow`]s before anything
//! leaves the fetch boundary. Fetchers are read-only; persistence belongs
//! to the ingestion pipeline.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::debug;

use adpulse_core::{MetricRow, Platform};
use adpulse_storage::{HttpError, HttpFetcher};

pub mod google;
pub mod meta;
pub mod normalize;

pub use google::{GoogleCredentials, GoogleFetcher};
pub use meta::{MetaCredentials, MetaFetcher};

pub const CRATE_NAME: &str = "adpulse-adapters";

/// Result of one platform fetch. `Skipped` means the platform was never
/// attempted because its credentials are not configured — distinct from
/// `Fetched` with zero rows, so the ingestion report can tell operators
/// which platforms were never tried versus tried-and-empty.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    Skipped,
    Fetched(Vec<MetricRow>),
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("{platform} api returned status {status}: {body}")]
    Api {
        platform: Platform,
        status: u16,
        body: String,
    },
    #[error("{platform} response was malformed: {detail}")]
    Format { platform: Platform, detail: String },
    #[error("{platform} request timed out")]
    Timeout { platform: Platform },
    #[error("{platform} request failed: {detail}")]
    Transport { platform: Platform, detail: String },
}

impl FetchError {
    pub fn platform(&self) -> Platform {
        match self {
            FetchError::Api { platform, .. }
            | FetchError::Format { platform, .. }
            | FetchError::Timeout { platform }
            | FetchError::Transport { platform, .. } => *platform,
        }
    }

    fn from_http(platform: Platform, err: HttpError) -> Self {
        match err {
            HttpError::Timeout { .. } => FetchError::Timeout { platform },
            HttpError::Status { status, body, .. } => FetchError::Api {
                platform,
                status,
                body,
            },
            HttpError::Decode { source, .. } => FetchError::Format {
                platform,
                detail: source.to_string(),
            },
            HttpError::Request(err) => FetchError::Transport {
                platform,
                detail: err.to_string(),
            },
        }
    }
}

/// Fetch one platform's daily metrics for a client and date range.
#[async_trait]
pub trait PlatformFetcher: Send + Sync {
    fn platform(&self) -> Platform;

    async fn fetch(
        &self,
        http: &HttpFetcher,
        client_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<FetchOutcome, FetchError>;
}

/// Opaque next-page token. Today every platform hands back a complete
/// next-page URL; keeping it behind this wrapper keeps the fetch loop
/// identical if a platform switches to an offset-style cursor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageToken(pub String);

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    data: Vec<JsonValue>,
    #[serde(default)]
    paging: Option<Paging>,
}

#[derive(Debug, Deserialize)]
struct Paging {
    #[serde(default)]
    next: Option<String>,
}

/// Follow `paging.next` cursors until none remains, collecting every page's
/// items. A failed page request fails the whole call — a partial page set is
/// never returned as complete.
pub(crate) async fn fetch_all_pages(
    http: &HttpFetcher,
    platform: Platform,
    first_page: PageToken,
) -> Result<Vec<JsonValue>, FetchError> {
    let mut items = Vec::new();
    let mut pages = 0usize;
    let mut next = Some(first_page);

    while let Some(PageToken(url)) = next {
        let value = http
            .fetch_json(&url)
            .await
            .map_err(|err| FetchError::from_http(platform, err))?;
        let envelope: Envelope =
            serde_json::from_value(value).map_err(|err| FetchError::Format {
                platform,
                detail: err.to_string(),
            })?;
        items.extend(envelope.data);
        pages += 1;
        next = envelope
            .paging
            .and_then(|paging| paging.next)
            .map(PageToken);
    }

    debug!(%platform, pages, items = items.len(), "pagination complete");
    Ok(items)
}
