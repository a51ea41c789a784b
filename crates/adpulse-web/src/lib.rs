//! Consumer-facing JSON query surface over the metrics repository. The
//! presentation layer (charts, tables) lives elsewhere and consumes these
//! endpoints read-only.

use std::sync::Arc;

use axum::{
    extract::{Path as AxumPath, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tracing::error;

use adpulse_core::aggregate::{
    campaign_rollup, daily_series, delta_set, totals, CampaignRollup, DeltaSet, KpiSet, Metric,
    SeriesPoint,
};
use adpulse_core::Platform;
use adpulse_storage::{MetricsRepository, RowFilter};

pub const CRATE_NAME: &str = "adpulse-web";

#[derive(Clone)]
pub struct AppState {
    pub repository: Arc<dyn MetricsRepository>,
}

impl AppState {
    pub fn new(repository: Arc<dyn MetricsRepository>) -> Self {
        Self { repository }
    }
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/clients/{client_id}/bounds", get(bounds_handler))
        .route("/clients/{client_id}/report", get(report_handler))
        .with_state(Arc::new(state))
}

pub async fn serve(repository: Arc<dyn MetricsRepository>, port: u16) -> anyhow::Result<()> {
    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    axum::serve(listener, app(AppState::new(repository))).await?;
    Ok(())
}

#[derive(Debug, Deserialize, Default)]
struct ReportQuery {
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
    /// Comma-separated platform names, e.g. `meta,google`.
    platforms: Option<String>,
    /// Case-insensitive substring match on campaign name.
    campaign: Option<String>,
    metric: Option<Metric>,
    #[serde(default)]
    by_platform: bool,
}

#[derive(Debug, Serialize)]
struct BoundsResponse {
    min_date: NaiveDate,
    max_date: NaiveDate,
}

#[derive(Debug, Serialize)]
struct ReportResponse {
    client_id: String,
    start: NaiveDate,
    end: NaiveDate,
    previous_start: NaiveDate,
    previous_end: NaiveDate,
    metric: Metric,
    kpis: KpiSet,
    deltas: DeltaSet,
    daily: Vec<SeriesPoint>,
    campaigns: Vec<CampaignRollup>,
}

async fn bounds_handler(
    State(state): State<Arc<AppState>>,
    AxumPath(client_id): AxumPath<String>,
) -> Response {
    match state.repository.date_bounds(&client_id).await {
        Ok(Some((min_date, max_date))) => Json(BoundsResponse { min_date, max_date }).into_response(),
        Ok(None) => json_error(StatusCode::NOT_FOUND, "no_client_data"),
        Err(err) => server_error(err.into()),
    }
}

async fn report_handler(
    State(state): State<Arc<AppState>>,
    AxumPath(client_id): AxumPath<String>,
    Query(query): Query<ReportQuery>,
) -> Response {
    // A client with no rows at all has no valid range to query; stop here
    // rather than computing deltas against nothing.
    let bounds = match state.repository.date_bounds(&client_id).await {
        Ok(Some(bounds)) => bounds,
        Ok(None) => return json_error(StatusCode::NOT_FOUND, "no_client_data"),
        Err(err) => return server_error(err.into()),
    };

    let start = query.start.unwrap_or(bounds.0);
    let end = query.end.unwrap_or(bounds.1);
    if start > end {
        return json_error(StatusCode::BAD_REQUEST, "invalid_range");
    }

    let platforms = match query.platforms.as_deref().map(parse_platforms).transpose() {
        Ok(platforms) => platforms,
        Err(_) => return json_error(StatusCode::BAD_REQUEST, "invalid_platform"),
    };

    let mut filter = RowFilter::range(client_id.clone(), start, end);
    filter.platforms = platforms.clone();
    filter.campaign_contains = query
        .campaign
        .as_deref()
        .map(str::trim)
        .filter(|needle| !needle.is_empty())
        .map(str::to_string);

    let rows = match state.repository.query_range(&filter).await {
        Ok(rows) => rows,
        Err(err) => return server_error(err.into()),
    };

    // The comparison window is the same-length period immediately before
    // the current one. It keeps the platform filter but intentionally not
    // the campaign filter.
    let period_days = (end - start).num_days() + 1;
    let previous_end = start - Duration::days(1);
    let previous_start = previous_end - Duration::days(period_days - 1);
    let mut previous_filter = RowFilter::range(client_id.clone(), previous_start, previous_end);
    previous_filter.platforms = platforms;

    let previous_rows = match state.repository.query_range(&previous_filter).await {
        Ok(rows) => rows,
        Err(err) => return server_error(err.into()),
    };

    let kpis = totals(&rows);
    let previous_kpis = totals(&previous_rows);
    let metric = query.metric.unwrap_or(Metric::Spend);

    Json(ReportResponse {
        client_id,
        start,
        end,
        previous_start,
        previous_end,
        metric,
        deltas: delta_set(&kpis, &previous_kpis),
        daily: daily_series(&rows, metric, query.by_platform),
        campaigns: campaign_rollup(&rows),
        kpis,
    })
    .into_response()
}

fn parse_platforms(raw: &str) -> Result<Vec<Platform>, adpulse_core::ParsePlatformError> {
    raw.split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::parse)
        .collect()
}

fn json_error(status: StatusCode, code: &str) -> Response {
    (status, Json(serde_json::json!({ "error": code }))).into_response()
}

fn server_error(err: anyhow::Error) -> Response {
    error!(error = %err, "request failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(serde_json::json!({ "error": "internal_error" })),
    )
        .into_response()
}
