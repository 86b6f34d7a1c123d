//! MarketPulse — KPI/funnel aggregation for the marketplace platform.
//!
//! Runs a one-shot report over an NDJSON event export, or the periodic
//! daily-rollup scheduler.

use chrono::{DateTime, Utc};
use clap::Parser;
use marketpulse_core::source::{InMemoryEventSource, InMemoryRollupStore};
use marketpulse_core::AnalyticsConfig;
use marketpulse_reporting::{ReportAssembler, RollupScheduler};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "marketpulse")]
#[command(about = "Marketplace KPI and funnel aggregation")]
#[command(version)]
struct Cli {
    /// NDJSON event export to aggregate
    #[arg(long, env = "MARKETPULSE__EVENTS_FILE")]
    events: std::path::PathBuf,

    /// Report instant (RFC 3339); defaults to the current time
    #[arg(long)]
    now: Option<DateTime<Utc>>,

    /// Civil timezone as minutes east of UTC (overrides config)
    #[arg(long, env = "MARKETPULSE__UTC_OFFSET_MINUTES")]
    utc_offset_minutes: Option<i32>,

    /// Run the daily rollup scheduler instead of a one-shot report
    #[arg(long, default_value_t = false)]
    schedule: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "marketpulse=info".into()),
        )
        .json()
        .init();

    let cli = Cli::parse();

    let mut config = AnalyticsConfig::load().unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        AnalyticsConfig::default()
    });
    if let Some(offset) = cli.utc_offset_minutes {
        config.utc_offset_minutes = offset;
    }

    let raw = std::fs::read_to_string(&cli.events)?;
    let source = Arc::new(InMemoryEventSource::from_ndjson(&raw)?);
    info!(
        events = source.len(),
        path = %cli.events.display(),
        "Event export loaded"
    );

    if cli.schedule {
        let store = Arc::new(InMemoryRollupStore::new());
        let scheduler = RollupScheduler::new(source, store, config);
        info!("Rollup scheduler running");
        scheduler.run().await;
        return Ok(());
    }

    let now = cli.now.unwrap_or_else(Utc::now);
    let assembler = ReportAssembler::new(source, config);
    let report = assembler.assemble(now).await?;
    println!("{}", report.to_json_pretty()?);

    Ok(())
}
