//! In-memory [`MetricsRepository`] used by tests and database-less local
//! runs. Behaves observably like the Postgres implementation.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use tokio::sync::RwLock;

use adpulse_core::{MetricRow, RowKey};

use crate::{MetricsRepository, RepositoryError, RowFilter};

#[derive(Debug, Clone)]
struct StoredRow {
    row: MetricRow,
    #[allow(dead_code)]
    updated_at: DateTime<Utc>,
}

/// Keyed map of stored rows. Each upsert replaces the whole entry for its
/// key, so readers never observe a half-written row.
#[derive(Debug, Default, Clone)]
pub struct MemoryMetricsRepository {
    rows: Arc<RwLock<BTreeMap<RowKey, StoredRow>>>,
}

impl MemoryMetricsRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rows.read().await.is_empty()
    }
}

fn matches(filter: &RowFilter, row: &MetricRow) -> bool {
    if row.client_id != filter.client_id {
        return false;
    }
    if row.date < filter.start || row.date > filter.end {
        return false;
    }
    if let Some(platforms) = &filter.platforms {
        if !platforms.contains(&row.platform) {
            return false;
        }
    }
    if let Some(needle) = &filter.campaign_contains {
        let name = row.campaign_name.as_deref().unwrap_or("").to_lowercase();
        if !name.contains(&needle.to_lowercase()) {
            return false;
        }
    }
    true
}

#[async_trait]
impl MetricsRepository for MemoryMetricsRepository {
    async fn upsert(&self, rows: &[MetricRow]) -> Result<u64, RepositoryError> {
        let mut map = self.rows.write().await;
        for row in rows {
            map.insert(
                row.key(),
                StoredRow {
                    row: row.clone(),
                    updated_at: Utc::now(),
                },
            );
        }
        Ok(rows.len() as u64)
    }

    async fn query_range(&self, filter: &RowFilter) -> Result<Vec<MetricRow>, RepositoryError> {
        let map = self.rows.read().await;
        // BTreeMap iterates in RowKey order, which starts with date.
        Ok(map
            .values()
            .filter(|stored| matches(filter, &stored.row))
            .map(|stored| stored.row.clone())
            .collect())
    }

    async fn date_bounds(
        &self,
        client_id: &str,
    ) -> Result<Option<(NaiveDate, NaiveDate)>, RepositoryError> {
        let map = self.rows.read().await;
        let mut bounds: Option<(NaiveDate, NaiveDate)> = None;
        for stored in map.values() {
            if stored.row.client_id != client_id {
                continue;
            }
            let date = stored.row.date;
            bounds = Some(match bounds {
                None => (date, date),
                Some((min, max)) => (min.min(date), max.max(date)),
            });
        }
        Ok(bounds)
    }
}
