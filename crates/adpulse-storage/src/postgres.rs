//! Postgres-backed [`MetricsRepository`] over sqlx.

use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::debug;

use adpulse_core::{MetricRow, Platform};

use crate::{MetricsRepository, RepositoryError, RowFilter};

/// Repository over the `daily_metrics` table. Schema management is owned
/// elsewhere; the logical contract this code relies on is:
///
/// ```sql
/// CREATE TABLE daily_metrics (
///     date          date        NOT NULL,
///     platform      text        NOT NULL,
///     client_id     text        NOT NULL,
///     account_id    text        NOT NULL,
///     campaign_id   text,
///     campaign_name text,
///     spend         double precision NOT NULL DEFAULT 0,
///     impressions   bigint      NOT NULL DEFAULT 0,
///     reach         bigint      NOT NULL DEFAULT 0,
///     clicks        bigint      NOT NULL DEFAULT 0,
///     leads         bigint      NOT NULL DEFAULT 0,
///     conversations bigint      NOT NULL DEFAULT 0,
///     conversions   bigint      NOT NULL DEFAULT 0,
///     revenue       double precision NOT NULL DEFAULT 0,
///     updated_at    timestamptz NOT NULL DEFAULT now(),
///     UNIQUE NULLS NOT DISTINCT (date, platform, client_id, account_id, campaign_id)
/// );
/// ```
///
/// `NULLS NOT DISTINCT` makes campaign-less rows conflict on their key the
/// same way campaign rows do.
#[derive(Debug, Clone)]
pub struct PgMetricsRepository {
    pool: PgPool,
}

const UPSERT_SQL: &str = r#"
INSERT INTO daily_metrics
    (date, platform, client_id, account_id, campaign_id, campaign_name,
     spend, impressions, reach, clicks, leads, conversations, conversions, revenue, updated_at)
VALUES
    ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, now())
ON CONFLICT (date, platform, client_id, account_id, campaign_id)
DO UPDATE SET
    campaign_name = excluded.campaign_name,
    spend = excluded.spend,
    impressions = excluded.impressions,
    reach = excluded.reach,
    clicks = excluded.clicks,
    leads = excluded.leads,
    conversations = excluded.conversations,
    conversions = excluded.conversions,
    revenue = excluded.revenue,
    updated_at = now()
"#;

impl PgMetricsRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self, RepositoryError> {
        let pool = PgPool::connect(database_url).await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn row_from_pg(row: &PgRow) -> Result<MetricRow, RepositoryError> {
    let platform: String = row.try_get("platform")?;
    let platform: Platform = platform
        .parse()
        .map_err(|e: adpulse_core::ParsePlatformError| RepositoryError::Decode(e.to_string()))?;
    Ok(MetricRow {
        date: row.try_get("date")?,
        platform,
        client_id: row.try_get("client_id")?,
        account_id: row.try_get("account_id")?,
        campaign_id: row.try_get("campaign_id")?,
        campaign_name: row.try_get("campaign_name")?,
        spend: row.try_get("spend")?,
        impressions: row.try_get("impressions")?,
        reach: row.try_get("reach")?,
        clicks: row.try_get("clicks")?,
        leads: row.try_get("leads")?,
        conversations: row.try_get("conversations")?,
        conversions: row.try_get("conversions")?,
        revenue: row.try_get("revenue")?,
    })
}

#[async_trait]
impl MetricsRepository for PgMetricsRepository {
    async fn upsert(&self, rows: &[MetricRow]) -> Result<u64, RepositoryError> {
        // One atomic insert-or-replace per row; the batch is intentionally
        // not wrapped in a transaction (per-row atomicity is the contract).
        let mut written = 0u64;
        for row in rows {
            let result = sqlx::query(UPSERT_SQL)
                .bind(row.date)
                .bind(row.platform.as_str())
                .bind(&row.client_id)
                .bind(&row.account_id)
                .bind(&row.campaign_id)
                .bind(&row.campaign_name)
                .bind(row.spend)
                .bind(row.impressions)
                .bind(row.reach)
                .bind(row.clicks)
                .bind(row.leads)
                .bind(row.conversations)
                .bind(row.conversions)
                .bind(row.revenue)
                .execute(&self.pool)
                .await?;
            written += result.rows_affected();
        }
        debug!(rows = written, "upserted daily metrics");
        Ok(written)
    }

    async fn query_range(&self, filter: &RowFilter) -> Result<Vec<MetricRow>, RepositoryError> {
        let mut sql = String::from(
            r#"
            SELECT date, platform, client_id, account_id, campaign_id, campaign_name,
                   spend, impressions, reach, clicks, leads, conversations, conversions, revenue
              FROM daily_metrics
             WHERE client_id = $1
               AND date BETWEEN $2 AND $3
            "#,
        );
        let mut next_param = 4;
        if filter.platforms.is_some() {
            sql.push_str(&format!(" AND platform = ANY(${next_param})"));
            next_param += 1;
        }
        if filter.campaign_contains.is_some() {
            sql.push_str(&format!(
                " AND lower(coalesce(campaign_name, '')) LIKE ${next_param}"
            ));
        }
        sql.push_str(" ORDER BY date ASC, platform ASC, campaign_id ASC NULLS FIRST");

        let mut query = sqlx::query(&sql)
            .bind(&filter.client_id)
            .bind(filter.start)
            .bind(filter.end);
        if let Some(platforms) = &filter.platforms {
            let names: Vec<String> = platforms.iter().map(|p| p.to_string()).collect();
            query = query.bind(names);
        }
        if let Some(needle) = &filter.campaign_contains {
            query = query.bind(format!("%{}%", needle.to_lowercase()));
        }

        let rows = query.fetch_all(&self.pool).await?;
        rows.iter().map(row_from_pg).collect()
    }

    async fn date_bounds(
        &self,
        client_id: &str,
    ) -> Result<Option<(NaiveDate, NaiveDate)>, RepositoryError> {
        let row = sqlx::query(
            r#"
            SELECT min(date) AS min_date, max(date) AS max_date
              FROM daily_metrics
             WHERE client_id = $1
            "#,
        )
        .bind(client_id)
        .fetch_one(&self.pool)
        .await?;

        let min_date: Option<NaiveDate> = row.try_get("min_date")?;
        let max_date: Option<NaiveDate> = row.try_get("max_date")?;
        Ok(min_date.zip(max_date))
    }
}
