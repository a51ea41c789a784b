//! Google Ads daily campaign metrics fetcher.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::Value as JsonValue;
use url::Url;

use adpulse_core::{MetricRow, Platform};
use adpulse_storage::HttpFetcher;

use crate::normalize::{coerce_f64, coerce_i64, json_string};
use crate::{fetch_all_pages, FetchError, FetchOutcome, PageToken, PlatformFetcher};

pub const ADS_API_BASE: &str = "https://googleads.googleapis.com/v16";

const METRIC_FIELDS: &str =
    "segments.date,campaign.id,campaign.name,metrics.cost,metrics.impressions,metrics.clicks,metrics.conversions,metrics.conversions_value";
const PAGE_SIZE: &str = "500";

/// All three are required before the fetcher will attempt a call; a partial
/// set counts as unconfigured.
#[derive(Debug, Clone)]
pub struct GoogleCredentials {
    pub developer_token: String,
    pub refresh_token: String,
    pub customer_id: String,
}

#[derive(Debug, Clone)]
pub struct GoogleFetcher {
    credentials: Option<GoogleCredentials>,
    base_url: String,
}

impl GoogleFetcher {
    pub fn new(credentials: Option<GoogleCredentials>) -> Self {
        Self {
            credentials,
            base_url: ADS_API_BASE.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn first_page(
        &self,
        credentials: &GoogleCredentials,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<PageToken, FetchError> {
        let endpoint = format!(
            "{}/customers/{}/campaignMetrics",
            self.base_url, credentials.customer_id
        );
        let start_date = start.to_string();
        let end_date = end.to_string();
        let url = Url::parse_with_params(
            &endpoint,
            &[
                ("developer_token", credentials.developer_token.as_str()),
                ("start_date", start_date.as_str()),
                ("end_date", end_date.as_str()),
                ("fields", METRIC_FIELDS),
                ("page_size", PAGE_SIZE),
            ],
        )
        .map_err(|err| FetchError::Format {
            platform: Platform::Google,
            detail: format!("invalid campaign metrics url: {err}"),
        })?;
        Ok(PageToken(url.into()))
    }

    fn normalize_item(
        &self,
        credentials: &GoogleCredentials,
        client_id: &str,
        item: &JsonValue,
    ) -> Result<MetricRow, FetchError> {
        let date = item
            .pointer("/segments/date")
            .and_then(JsonValue::as_str)
            .and_then(|raw| raw.parse::<NaiveDate>().ok())
            .ok_or_else(|| FetchError::Format {
                platform: Platform::Google,
                detail: "campaign metrics item missing segments.date".to_string(),
            })?;

        Ok(MetricRow {
            date,
            platform: Platform::Google,
            client_id: client_id.to_string(),
            account_id: credentials.customer_id.clone(),
            campaign_id: json_string(item.pointer("/campaign/id")),
            campaign_name: json_string(item.pointer("/campaign/name")),
            spend: coerce_f64(item.pointer("/metrics/cost")),
            impressions: coerce_i64(item.pointer("/metrics/impressions")),
            reach: 0,
            clicks: coerce_i64(item.pointer("/metrics/clicks")),
            leads: 0,
            conversations: 0,
            conversions: coerce_i64(item.pointer("/metrics/conversions")),
            revenue: coerce_f64(item.pointer("/metrics/conversions_value")),
        })
    }
}

#[async_trait]
impl PlatformFetcher for GoogleFetcher {
    fn platform(&self) -> Platform {
        Platform::Google
    }

    async fn fetch(
        &self,
        http: &HttpFetcher,
        client_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<FetchOutcome, FetchError> {
        let Some(credentials) = &self.credentials else {
            return Ok(FetchOutcome::Skipped);
        };

        let first_page = self.first_page(credentials, start, end)?;
        let items = fetch_all_pages(http, Platform::Google, first_page).await?;
        let rows = items
            .iter()
            .map(|item| self.normalize_item(credentials, client_id, item))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(FetchOutcome::Fetched(rows))
    }
}
