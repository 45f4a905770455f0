#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! CLI entry point for the weather ingestion tool.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};
use skyfeed_cache::writer::local_date_key;
use skyfeed_history::{HistoryStore, Resolution};
use skyfeed_ingest::config::IngestConfig;
use skyfeed_ingest::{run_all, site_status};
use skyfeed_source::fetch::HttpFetcher;
use skyfeed_source::registry::all_adapters;
use skyfeed_state::FileStateStore;

#[derive(Parser)]
#[command(name = "skyfeed_ingest", about = "Weather ingestion and resilience tool")]
struct Cli {
    /// Site configuration file
    #[arg(long, default_value = "config/sites.toml")]
    config: PathBuf,
    /// Directory holding the cache, outage, history, and backoff documents
    #[arg(long, default_value = "data")]
    state_dir: PathBuf,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one ingestion cycle for every enabled site
    Run {
        /// Comma-separated list of site IDs (overrides `SKYFEED_SITES` env var)
        #[arg(long)]
        sites: Option<String>,
    },
    /// Show outage and circuit breaker state per site
    Status {
        /// Comma-separated list of site IDs (overrides `SKYFEED_SITES` env var)
        #[arg(long)]
        sites: Option<String>,
    },
    /// Query a site's observation history
    History {
        /// Site identifier
        site: String,
        /// Earliest observation time, Unix seconds (inclusive)
        #[arg(long)]
        start: Option<i64>,
        /// Latest observation time, Unix seconds (inclusive)
        #[arg(long)]
        end: Option<i64>,
        /// Keep one observation per hour
        #[arg(long)]
        hourly: bool,
        /// Local date (`YYYY-MM-DD`) for daily extremes. Defaults to today.
        #[arg(long)]
        date: Option<String>,
    },
    /// List supported providers
    Sources,
}

#[allow(clippy::too_many_lines)]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    pretty_env_logger::init();
    let cli = Cli::parse();

    if matches!(cli.command, Commands::Sources) {
        println!("{:<14} MEASURES", "PROVIDER");
        println!("{}", "-".repeat(60));
        for adapter in all_adapters() {
            let fields: Vec<&str> = adapter
                .measured_fields()
                .iter()
                .map(AsRef::<str>::as_ref)
                .collect();
            println!("{:<14} {}", adapter.provider().as_ref(), fields.join(", "));
        }
        return Ok(());
    }

    let config = IngestConfig::load(&cli.config)?;
    let store = FileStateStore::new(&cli.state_dir);
    let now = chrono::Utc::now().timestamp();

    match cli.command {
        Commands::Sources => {}
        Commands::Run { sites } => {
            let sites = config.enabled_sites(sites);
            log::info!(
                "Running {} site(s): {}",
                sites.len(),
                sites
                    .iter()
                    .map(|s| s.id.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            );

            let fetcher =
                HttpFetcher::new(Duration::from_secs(config.defaults.fetch_timeout_seconds))?;
            let start = Instant::now();
            let results = run_all(&store, &fetcher, &config, &sites, now).await;

            let failed = results.iter().filter(|(_, r)| r.is_err()).count();
            let outages = results
                .iter()
                .filter(|(_, r)| r.as_ref().is_ok_and(|report| report.outage.is_some()))
                .count();
            log::info!(
                "Run complete: {} site(s), {failed} failed, {outages} in outage, took {:.1}s",
                results.len(),
                start.elapsed().as_secs_f64()
            );
        }
        Commands::Status { sites } => {
            println!("{:<12} {:<10} {:<22} BREAKERS", "SITE", "STATE", "NEWEST");
            println!("{}", "-".repeat(72));
            for site in config.enabled_sites(sites) {
                let status = site_status(&store, &config.defaults, site)?;
                let state = if status.maintenance {
                    "maint"
                } else {
                    match &status.outage {
                        Some(o) if o.recovered_at.is_some() => "recovering",
                        Some(_) => "OUTAGE",
                        None => "ok",
                    }
                };
                let newest = status
                    .signals
                    .newest()
                    .map_or_else(|| "never".to_owned(), |ts| format!("{}s ago", now - ts));
                let breakers = status
                    .breakers
                    .iter()
                    .map(|(kind, entry)| {
                        format!(
                            "{kind}: {} failures ({})",
                            entry.failure_count,
                            entry.last_failure_reason.as_deref().unwrap_or("unknown")
                        )
                    })
                    .collect::<Vec<_>>()
                    .join("; ");
                println!("{:<12} {state:<10} {newest:<22} {breakers}", status.site);
            }
        }
        Commands::History {
            site,
            start,
            end,
            hourly,
            date,
        } => {
            let site_config = config
                .site(&site)
                .ok_or_else(|| format!("Unknown site: {site}"))?;
            let offset = site_config.offset()?;
            let history = HistoryStore::new(&store, config.defaults.history_retention_hours);

            let resolution = if hourly {
                Resolution::Hourly
            } else {
                Resolution::Raw
            };
            let result = history.query(&site, start, end, resolution)?;

            let date = date
                .or_else(|| local_date_key(now, &offset))
                .ok_or("could not determine the local date")?;
            let extremes = history.daily_extremes(&site, &date, &offset)?;
            let wind_rose = history.last_hour_wind_rose(&site, now)?;

            let output = serde_json::json!({
                "site": site,
                "resolution": resolution.as_ref(),
                "history": result,
                "daily_extremes": { "date": date, "values": extremes },
                "wind_rose": wind_rose,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}
