//! Ingestion coordinator: fans out the configured platform fetchers for a
//! client and date range, reconciles their output, and drives one idempotent
//! upsert batch. A failing platform never blocks the others; failures are
//! collected into a per-platform report instead of raised.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{ensure, Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use adpulse_adapters::{
    FetchOutcome, GoogleCredentials, GoogleFetcher, MetaCredentials, MetaFetcher, PlatformFetcher,
};
use adpulse_core::{MetricRow, Platform};
use adpulse_storage::{HttpClientConfig, HttpFetcher, MetricsRepository};

pub const CRATE_NAME: &str = "adpulse-ingest";

/// Process-wide ingestion configuration, constructed explicitly and passed
/// in rather than read from globals, so tests can supply fixtures. Absent
/// platform credentials are not an error: that platform is skipped.
#[derive(Debug, Clone, Default)]
pub struct IngestConfig {
    pub meta: Option<MetaCredentials>,
    pub google: Option<GoogleCredentials>,
    pub http_timeout_secs: u64,
    pub user_agent: String,
    pub default_window_days: i64,
}

impl IngestConfig {
    pub fn from_env() -> Self {
        let meta = match (
            std::env::var("META_ACCESS_TOKEN").ok(),
            std::env::var("META_AD_ACCOUNT_ID").ok(),
        ) {
            (Some(access_token), Some(account_id)) => Some(MetaCredentials {
                access_token,
                account_id,
            }),
            _ => None,
        };
        let google = match (
            std::env::var("GOOGLE_ADS_DEVELOPER_TOKEN").ok(),
            std::env::var("GOOGLE_ADS_REFRESH_TOKEN").ok(),
            std::env::var("GOOGLE_ADS_CUSTOMER_ID").ok(),
        ) {
            (Some(developer_token), Some(refresh_token), Some(customer_id)) => {
                Some(GoogleCredentials {
                    developer_token,
                    refresh_token,
                    customer_id,
                })
            }
            _ => None,
        };

        Self {
            meta,
            google,
            http_timeout_secs: std::env::var("ADPULSE_HTTP_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(60),
            user_agent: std::env::var("ADPULSE_USER_AGENT")
                .unwrap_or_else(|_| "adpulse/0.1".to_string()),
            default_window_days: std::env::var("ADPULSE_WINDOW_DAYS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(14),
        }
    }

    pub fn http_config(&self) -> HttpClientConfig {
        HttpClientConfig {
            timeout: Duration::from_secs(self.http_timeout_secs.max(1)),
            user_agent: Some(self.user_agent.clone()),
            ..Default::default()
        }
    }

    /// One fetcher per known platform, configured or not — unconfigured
    /// fetchers report themselves as skipped.
    pub fn fetchers(&self) -> Vec<Arc<dyn PlatformFetcher>> {
        vec![
            Arc::new(MetaFetcher::new(self.meta.clone())),
            Arc::new(GoogleFetcher::new(self.google.clone())),
        ]
    }
}

/// What happened to one platform during a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PlatformOutcome {
    /// Credentials not configured; the platform was never attempted.
    Skipped,
    /// Attempted and succeeded. `rows` survived range validation;
    /// `rejected` fell outside the requested range and were dropped.
    Fetched { rows: usize, rejected: usize },
    /// Attempted and failed; no rows from this platform were stored.
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlatformReport {
    pub platform: Platform,
    pub outcome: PlatformOutcome,
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestSummary {
    pub run_id: Uuid,
    pub client_id: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub rows_written: u64,
    pub reports: Vec<PlatformReport>,
}

impl IngestSummary {
    pub fn failed_platforms(&self) -> Vec<Platform> {
        self.reports
            .iter()
            .filter(|r| matches!(r.outcome, PlatformOutcome::Failed { .. }))
            .map(|r| r.platform)
            .collect()
    }

    pub fn skipped_platforms(&self) -> Vec<Platform> {
        self.reports
            .iter()
            .filter(|r| matches!(r.outcome, PlatformOutcome::Skipped))
            .map(|r| r.platform)
            .collect()
    }
}

pub struct IngestPipeline {
    fetchers: Vec<Arc<dyn PlatformFetcher>>,
    repository: Arc<dyn MetricsRepository>,
    http: Arc<HttpFetcher>,
}

impl IngestPipeline {
    pub fn new(config: &IngestConfig, repository: Arc<dyn MetricsRepository>) -> Result<Self> {
        let http = Arc::new(HttpFetcher::new(config.http_config()).context("building http client")?);
        Ok(Self {
            fetchers: config.fetchers(),
            repository,
            http,
        })
    }

    /// Assemble a pipeline from explicit parts (tests inject stub fetchers).
    pub fn with_fetchers(
        repository: Arc<dyn MetricsRepository>,
        http: Arc<HttpFetcher>,
        fetchers: Vec<Arc<dyn PlatformFetcher>>,
    ) -> Self {
        Self {
            fetchers,
            repository,
            http,
        }
    }

    /// Run one ingestion cycle. Fetchers run concurrently; their rows are
    /// validated against the requested range, concatenated, and written in
    /// one idempotent upsert batch. Only a repository failure aborts the
    /// run — per-platform fetch failures land in the summary's reports.
    pub async fn run(
        &self,
        client_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<IngestSummary> {
        ensure!(
            start <= end,
            "invalid range: start {start} is after end {end}"
        );

        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        info!(%run_id, client_id, %start, %end, "ingest run started");

        let mut handles = Vec::with_capacity(self.fetchers.len());
        for fetcher in &self.fetchers {
            let fetcher = Arc::clone(fetcher);
            let http = Arc::clone(&self.http);
            let client_id = client_id.to_string();
            let platform = fetcher.platform();
            let handle =
                tokio::spawn(async move { fetcher.fetch(&http, &client_id, start, end).await });
            handles.push((platform, handle));
        }

        let mut all_rows: Vec<MetricRow> = Vec::new();
        let mut reports = Vec::with_capacity(handles.len());
        for (platform, handle) in handles {
            let outcome = match handle.await {
                Ok(Ok(FetchOutcome::Skipped)) => {
                    info!(%platform, "platform skipped: credentials not configured");
                    PlatformOutcome::Skipped
                }
                Ok(Ok(FetchOutcome::Fetched(rows))) => {
                    let total = rows.len();
                    let mut kept = Vec::with_capacity(total);
                    for row in rows {
                        if row.date >= start && row.date <= end {
                            kept.push(row);
                        }
                    }
                    let rejected = total - kept.len();
                    if rejected > 0 {
                        warn!(%platform, rejected, "dropping rows outside requested range");
                    }
                    let outcome = PlatformOutcome::Fetched {
                        rows: kept.len(),
                        rejected,
                    };
                    all_rows.append(&mut kept);
                    outcome
                }
                Ok(Err(err)) => {
                    warn!(%platform, error = %err, "platform fetch failed");
                    PlatformOutcome::Failed {
                        error: err.to_string(),
                    }
                }
                Err(join_err) => {
                    warn!(%platform, error = %join_err, "platform fetch task aborted");
                    PlatformOutcome::Failed {
                        error: join_err.to_string(),
                    }
                }
            };
            reports.push(PlatformReport { platform, outcome });
        }

        let rows_written = self
            .repository
            .upsert(&all_rows)
            .await
            .context("upserting fetched rows")?;

        let finished_at = Utc::now();
        info!(%run_id, rows_written, "ingest run complete");
        Ok(IngestSummary {
            run_id,
            client_id: client_id.to_string(),
            start,
            end,
            started_at,
            finished_at,
            rows_written,
            reports,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use adpulse_adapters::FetchError;
    use adpulse_storage::{MemoryMetricsRepository, RowFilter};
    use async_trait::async_trait;

    #[derive(Clone)]
    enum StubBehavior {
        Rows(Vec<MetricRow>),
        Skip,
        FailApi,
    }

    struct StubFetcher {
        platform: Platform,
        behavior: StubBehavior,
    }

    #[async_trait]
    impl PlatformFetcher for StubFetcher {
        fn platform(&self) -> Platform {
            self.platform
        }

        async fn fetch(
            &self,
            _http: &HttpFetcher,
            _client_id: &str,
            _start: NaiveDate,
            _end: NaiveDate,
        ) -> Result<FetchOutcome, FetchError> {
            match &self.behavior {
                StubBehavior::Rows(rows) => Ok(FetchOutcome::Fetched(rows.clone())),
                StubBehavior::Skip => Ok(FetchOutcome::Skipped),
                StubBehavior::FailApi => Err(FetchError::Api {
                    platform: self.platform,
                    status: 500,
                    body: "upstream exploded".into(),
                }),
            }
        }
    }

    fn row(date: &str, platform: Platform, campaign: &str) -> MetricRow {
        MetricRow {
            date: date.parse().unwrap(),
            platform,
            client_id: "client-1".into(),
            account_id: "acct".into(),
            campaign_id: Some(format!("id-{campaign}")),
            campaign_name: Some(campaign.into()),
            spend: 10.0,
            impressions: 100,
            reach: 50,
            clicks: 5,
            leads: 0,
            conversations: 1,
            conversions: 0,
            revenue: 0.0,
        }
    }

    fn pipeline(
        repo: Arc<MemoryMetricsRepository>,
        fetchers: Vec<Arc<dyn PlatformFetcher>>,
    ) -> IngestPipeline {
        let http = Arc::new(HttpFetcher::new(HttpClientConfig::default()).unwrap());
        IngestPipeline::with_fetchers(repo, http, fetchers)
    }

    fn stub(platform: Platform, behavior: StubBehavior) -> Arc<dyn PlatformFetcher> {
        Arc::new(StubFetcher { platform, behavior })
    }

    fn march() -> (NaiveDate, NaiveDate) {
        ("2026-03-01".parse().unwrap(), "2026-03-14".parse().unwrap())
    }

    #[tokio::test]
    async fn one_platform_failing_does_not_block_the_other() {
        let repo = Arc::new(MemoryMetricsRepository::new());
        let pipeline = pipeline(
            repo.clone(),
            vec![
                stub(Platform::Meta, StubBehavior::FailApi),
                stub(
                    Platform::Google,
                    StubBehavior::Rows(vec![
                        row("2026-03-01", Platform::Google, "search"),
                        row("2026-03-02", Platform::Google, "search"),
                    ]),
                ),
            ],
        );

        let (start, end) = march();
        let summary = pipeline.run("client-1", start, end).await.unwrap();

        assert_eq!(summary.rows_written, 2);
        assert_eq!(summary.failed_platforms(), vec![Platform::Meta]);
        assert_eq!(repo.len().await, 2);
        match &summary.reports[0].outcome {
            PlatformOutcome::Failed { error } => assert!(error.contains("500")),
            other => panic!("expected failure report, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn skipped_is_reported_distinctly_from_fetched_empty() {
        let repo = Arc::new(MemoryMetricsRepository::new());
        let pipeline = pipeline(
            repo.clone(),
            vec![
                stub(Platform::Meta, StubBehavior::Skip),
                stub(Platform::Google, StubBehavior::Rows(vec![])),
            ],
        );

        let (start, end) = march();
        let summary = pipeline.run("client-1", start, end).await.unwrap();

        assert_eq!(summary.skipped_platforms(), vec![Platform::Meta]);
        assert_eq!(
            summary.reports[1].outcome,
            PlatformOutcome::Fetched {
                rows: 0,
                rejected: 0
            }
        );
        assert!(summary.failed_platforms().is_empty());
        assert_eq!(summary.rows_written, 0);
    }

    #[tokio::test]
    async fn rows_outside_the_requested_range_are_rejected_not_stored() {
        let repo = Arc::new(MemoryMetricsRepository::new());
        let pipeline = pipeline(
            repo.clone(),
            vec![stub(
                Platform::Meta,
                StubBehavior::Rows(vec![
                    row("2026-03-05", Platform::Meta, "in-range"),
                    row("2026-04-01", Platform::Meta, "out-of-range"),
                ]),
            )],
        );

        let (start, end) = march();
        let summary = pipeline.run("client-1", start, end).await.unwrap();

        assert_eq!(
            summary.reports[0].outcome,
            PlatformOutcome::Fetched {
                rows: 1,
                rejected: 1
            }
        );
        assert_eq!(summary.rows_written, 1);
        let stored = repo
            .query_range(&RowFilter::range(
                "client-1",
                "2026-01-01".parse().unwrap(),
                "2026-12-31".parse().unwrap(),
            ))
            .await
            .unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].campaign_name.as_deref(), Some("in-range"));
    }

    #[tokio::test]
    async fn rerunning_with_unchanged_upstream_is_idempotent() {
        let repo = Arc::new(MemoryMetricsRepository::new());
        let rows = vec![
            row("2026-03-01", Platform::Meta, "alpha"),
            row("2026-03-02", Platform::Meta, "alpha"),
        ];
        let pipeline = pipeline(
            repo.clone(),
            vec![stub(Platform::Meta, StubBehavior::Rows(rows))],
        );

        let (start, end) = march();
        let filter = RowFilter::range("client-1", start, end);

        pipeline.run("client-1", start, end).await.unwrap();
        let first = repo.query_range(&filter).await.unwrap();
        pipeline.run("client-1", start, end).await.unwrap();
        let second = repo.query_range(&filter).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(repo.len().await, 2);
    }

    #[tokio::test]
    async fn inverted_range_is_rejected_up_front() {
        let repo = Arc::new(MemoryMetricsRepository::new());
        let pipeline = pipeline(repo, vec![stub(Platform::Meta, StubBehavior::Skip)]);
        let err = pipeline
            .run(
                "client-1",
                "2026-03-14".parse().unwrap(),
                "2026-03-01".parse().unwrap(),
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("invalid range"));
    }
}
