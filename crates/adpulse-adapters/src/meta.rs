//! Meta (Facebook/Instagram) Graph API insights fetcher.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::Value as JsonValue;
use url::Url;

use adpulse_core::{MetricRow, Platform};
use adpulse_storage::HttpFetcher;

use crate::normalize::{coerce_f64, coerce_i64, json_string, sum_actions};
use crate::{fetch_all_pages, FetchError, FetchOutcome, PageToken, PlatformFetcher};

pub const GRAPH_API_BASE: &str = "https://graph.facebook.com/v19.0";

/// Raw action-type variants that all count as "messaging conversation
/// started". The windowed name is the common one; the rest appear in
/// historical ranges.
pub const CONVERSATION_ACTION_TYPES: [&str; 4] = [
    "onsite_conversion.messaging_conversation_started_7d",
    "onsite_conversion.messaging_conversation_started",
    "messaging_conversation_started_7d",
    "messaging_conversation_started",
];

const INSIGHTS_FIELDS: &str =
    "date_start,campaign_id,campaign_name,spend,impressions,reach,clicks,actions";
const PAGE_LIMIT: &str = "500";

#[derive(Debug, Clone)]
pub struct MetaCredentials {
    pub access_token: String,
    /// Ad account reference, e.g. `act_123`.
    pub account_id: String,
}

#[derive(Debug, Clone)]
pub struct MetaFetcher {
    credentials: Option<MetaCredentials>,
    base_url: String,
}

impl MetaFetcher {
    pub fn new(credentials: Option<MetaCredentials>) -> Self {
        Self {
            credentials,
            base_url: GRAPH_API_BASE.to_string(),
        }
    }

    /// Point the fetcher at a different API root (tests use a mock server).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn first_page(
        &self,
        credentials: &MetaCredentials,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<PageToken, FetchError> {
        let endpoint = format!("{}/{}/insights", self.base_url, credentials.account_id);
        let since = start.to_string();
        let until = end.to_string();
        let url = Url::parse_with_params(
            &endpoint,
            &[
                ("access_token", credentials.access_token.as_str()),
                ("level", "campaign"),
                ("time_increment", "1"),
                ("time_range[since]", since.as_str()),
                ("time_range[until]", until.as_str()),
                ("fields", INSIGHTS_FIELDS),
                ("limit", PAGE_LIMIT),
            ],
        )
        .map_err(|err| FetchError::Format {
            platform: Platform::Meta,
            detail: format!("invalid insights url: {err}"),
        })?;
        Ok(PageToken(url.into()))
    }

    fn normalize_item(
        &self,
        credentials: &MetaCredentials,
        client_id: &str,
        item: &JsonValue,
    ) -> Result<MetricRow, FetchError> {
        let date = item
            .get("date_start")
            .and_then(JsonValue::as_str)
            .and_then(|raw| raw.parse::<NaiveDate>().ok())
            .ok_or_else(|| FetchError::Format {
                platform: Platform::Meta,
                detail: "insights item missing date_start".to_string(),
            })?;

        let empty = Vec::new();
        let actions = item
            .get("actions")
            .and_then(JsonValue::as_array)
            .unwrap_or(&empty);

        Ok(MetricRow {
            date,
            platform: Platform::Meta,
            client_id: client_id.to_string(),
            account_id: credentials.account_id.clone(),
            campaign_id: json_string(item.get("campaign_id")),
            campaign_name: json_string(item.get("campaign_name")),
            spend: coerce_f64(item.get("spend")),
            impressions: coerce_i64(item.get("impressions")),
            reach: coerce_i64(item.get("reach")),
            clicks: coerce_i64(item.get("clicks")),
            leads: 0,
            conversations: sum_actions(actions, &CONVERSATION_ACTION_TYPES),
            conversions: 0,
            revenue: 0.0,
        })
    }
}

#[async_trait]
impl PlatformFetcher for MetaFetcher {
    fn platform(&self) -> Platform {
        Platform::Meta
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
        let items = fetch_all_pages(http, Platform::Meta, first_page).await?;
        let rows = items
            .iter()
            .map(|item| self.normalize_item(credentials, client_id, item))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(FetchOutcome::Fetched(rows))
    }
}
