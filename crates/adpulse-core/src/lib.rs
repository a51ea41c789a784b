//! Core domain model and aggregation engine for Adpulse.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod aggregate;

pub const CRATE_NAME: &str = "adpulse-core";

/// Ad platform an observation came from. Wire form is lowercase.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Meta,
    Google,
}

impl Platform {
    pub const ALL: [Platform; 2] = [Platform::Meta, Platform::Google];

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Meta => "meta",
            Platform::Google => "google",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("unrecognized platform {0:?}")]
pub struct ParsePlatformError(pub String);

impl FromStr for Platform {
    type Err = ParsePlatformError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "meta" => Ok(Platform::Meta),
            "google" => Ok(Platform::Google),
            other => Err(ParsePlatformError(other.to_string())),
        }
    }
}

/// One platform/campaign/day observation in canonical form, uniform
/// regardless of source platform. Counters and amounts are never null:
/// values absent at the source are zero here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRow {
    pub date: NaiveDate,
    pub platform: Platform,
    pub client_id: String,
    pub account_id: String,
    pub campaign_id: Option<String>,
    pub campaign_name: Option<String>,
    pub spend: f64,
    pub impressions: i64,
    pub reach: i64,
    pub clicks: i64,
    pub leads: i64,
    pub conversations: i64,
    pub conversions: i64,
    pub revenue: f64,
}

impl MetricRow {
    /// The storage uniqueness key: at most one stored row per key at any time.
    pub fn key(&self) -> RowKey {
        RowKey {
            date: self.date,
            platform: self.platform,
            client_id: self.client_id.clone(),
            account_id: self.account_id.clone(),
            campaign_id: self.campaign_id.clone(),
        }
    }
}

/// Uniqueness key for [`MetricRow`]. Ordering puts date first so keyed
/// iteration yields rows in date-ascending order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RowKey {
    pub date: NaiveDate,
    pub platform: Platform,
    pub client_id: String,
    pub account_id: String,
    pub campaign_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn platform_round_trips_lowercase() {
        for platform in Platform::ALL {
            assert_eq!(platform.as_str().parse::<Platform>().unwrap(), platform);
        }
        assert!("facebook".parse::<Platform>().is_err());
    }

    #[test]
    fn platform_serializes_as_lowercase_string() {
        let json = serde_json::to_string(&Platform::Meta).unwrap();
        assert_eq!(json, "\"meta\"");
    }

    #[test]
    fn row_key_orders_by_date_first() {
        let d1 = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();
        let d2 = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        let early = RowKey {
            date: d1,
            platform: Platform::Google,
            client_id: "c".into(),
            account_id: "a".into(),
            campaign_id: None,
        };
        let late = RowKey {
            date: d2,
            platform: Platform::Meta,
            client_id: "c".into(),
            account_id: "a".into(),
            campaign_id: None,
        };
        assert!(early < late);
    }
}
