use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{Duration, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use tracing::warn;
use tracing_subscriber::EnvFilter;

use adpulse_ingest::{IngestConfig, IngestPipeline, PlatformOutcome};
use adpulse_storage::{MemoryMetricsRepository, MetricsRepository, PgMetricsRepository};

#[derive(Debug, Parser)]
#[command(name = "adpulse")]
#[command(about = "Paid media metrics ingestion and reporting")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Fetch daily metrics for a client and upsert them into storage.
    Ingest {
        /// Client to ingest for; falls back to ADPULSE_CLIENT_ID.
        #[arg(long)]
        client_id: Option<String>,
        /// First day of the range (default: end minus the window).
        #[arg(long)]
        start: Option<NaiveDate>,
        /// Last day of the range (default: today).
        #[arg(long)]
        end: Option<NaiveDate>,
        /// Window length in days when --start is omitted.
        #[arg(long)]
        days: Option<i64>,
    },
    /// Serve the reporting query surface.
    Serve {
        #[arg(long, default_value_t = 8000)]
        port: u16,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Ingest {
            client_id,
            start,
            end,
            days,
        } => {
            let config = IngestConfig::from_env();
            let client_id = client_id
                .or_else(|| std::env::var("ADPULSE_CLIENT_ID").ok())
                .context("set --client-id or ADPULSE_CLIENT_ID to ingest for a client")?;

            let end = end.unwrap_or_else(|| Utc::now().date_naive());
            let window = days.unwrap_or(config.default_window_days);
            let start = start.unwrap_or(end - Duration::days(window));

            let repository = repository_from_env().await?;
            let pipeline = IngestPipeline::new(&config, repository)?;
            let summary = pipeline.run(&client_id, start, end).await?;

            println!(
                "ingest complete: run_id={} client={} range={}..{} rows_written={}",
                summary.run_id, summary.client_id, summary.start, summary.end, summary.rows_written
            );
            for report in &summary.reports {
                match &report.outcome {
                    PlatformOutcome::Skipped => {
                        println!("  {}: skipped (credentials not configured)", report.platform)
                    }
                    PlatformOutcome::Fetched { rows, rejected } => {
                        println!(
                            "  {}: {} rows ({} rejected out of range)",
                            report.platform, rows, rejected
                        )
                    }
                    PlatformOutcome::Failed { error } => {
                        println!("  {}: FAILED - {}", report.platform, error)
                    }
                }
            }
        }
        Commands::Serve { port } => {
            let repository = repository_from_env().await?;
            println!("serving reports on 0.0.0.0:{port}");
            adpulse_web::serve(repository, port).await?;
        }
    }

    Ok(())
}

async fn repository_from_env() -> Result<Arc<dyn MetricsRepository>> {
    match std::env::var("DATABASE_URL") {
        Ok(url) => {
            let repository = PgMetricsRepository::connect(&url)
                .await
                .context("connecting to DATABASE_URL")?;
            Ok(Arc::new(repository))
        }
        Err(_) => {
            warn!("DATABASE_URL not set; using in-memory storage (data will not persist)");
            Ok(Arc::new(MemoryMetricsRepository::new()))
        }
    }
}
