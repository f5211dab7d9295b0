#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! CLI entry point for the parking violation pipeline.

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use parking_map_aggregate::{build_outputs, top_segments};
use parking_map_cli_utils::{IndicatifProgress, init_logger};
use parking_map_database::ticket_db;
use parking_map_ingest::config::PipelineConfig;
use parking_map_ingest::{IngestError, run_ingest};
use parking_map_ingest_models::IngestOptions;
use parking_map_source::PageSource;
use parking_map_source::snapshot::SnapshotSource;
use parking_map_source::socrata::SocrataClient;
use parking_map_ticket_models::TicketType;

#[derive(Parser)]
#[command(name = "parking_map", about = "NYC parking violation pipeline")]
struct Cli {
    /// Configuration file (defaults to `parking_map.toml` when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// `DuckDB` record store (overrides `database_path`)
    #[arg(long, global = true)]
    db: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch violations page by page, resuming from the stored cursor
    Ingest {
        /// First issue date to fetch (YYYY-MM-DD, inclusive)
        #[arg(long)]
        issue_date_from: Option<NaiveDate>,
        /// Last issue date to fetch (YYYY-MM-DD, inclusive)
        #[arg(long)]
        issue_date_to: Option<NaiveDate>,
        /// Records per request (at most 1000)
        #[arg(long)]
        page_size: Option<u32>,
        /// Seconds to sleep between requests
        #[arg(long)]
        sleep: Option<f64>,
        /// Socrata application token
        #[arg(long, env = "PARKING_MAP_APP_TOKEN", hide_env_values = true)]
        app_token: Option<String>,
        /// Stop after this many records (for testing)
        #[arg(long)]
        limit: Option<u64>,
        /// Ignore the stored cursor and start from the beginning
        #[arg(long)]
        force: bool,
        /// Fetch and normalize without writing anything
        #[arg(long)]
        dry_run: bool,
        /// Also write every fetched raw record to this NDJSON file
        #[arg(long)]
        snapshot: Option<PathBuf>,
        /// Read records from an NDJSON snapshot instead of the API
        #[arg(long)]
        from_snapshot: Option<PathBuf>,
    },
    /// Rebuild the segment/time tables and write them as Parquet
    Aggregate {
        /// Minimum tickets for a segment to appear in the summary
        #[arg(long)]
        min_samples: Option<u64>,
        /// Directory for Parquet outputs and the manifest
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },
    /// Rebuild the segment summary and print the busiest segments
    Summary {
        /// Minimum tickets for a segment to appear in the summary
        #[arg(long)]
        min_samples: Option<u64>,
        /// Number of segments to print
        #[arg(long, default_value = "20")]
        top: usize,
        /// Directory for Parquet outputs and the manifest
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },
    /// Show the ingest cursor, record count and drop counts
    Status,
}

#[allow(clippy::too_many_lines)]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = init_logger();
    let cli = Cli::parse();

    let config = PipelineConfig::load(cli.config.as_deref())?;
    let db_path = cli.db.unwrap_or_else(|| config.database_path.clone());

    match cli.command {
        Commands::Ingest {
            issue_date_from,
            issue_date_to,
            page_size,
            sleep,
            app_token,
            limit,
            force,
            dry_run,
            snapshot,
            from_snapshot,
        } => {
            let sleep = match sleep {
                Some(seconds) => PipelineConfig {
                    sleep_seconds: seconds,
                    ..config.clone()
                }
                .sleep()?,
                None => config.sleep()?,
            };
            let options = IngestOptions {
                issue_date_from,
                issue_date_to,
                page_size: page_size.unwrap_or(config.page_size),
                sleep,
                limit,
                force,
                dry_run,
                snapshot_path: snapshot,
            };

            let normalizer = config.normalizer()?;
            let source: Box<dyn PageSource> = match from_snapshot {
                Some(path) => {
                    let source = SnapshotSource::load(&path).map_err(IngestError::Snapshot)?;
                    log::info!("Replaying {} records from {}", source.len(), path.display());
                    Box::new(source)
                }
                None => {
                    if app_token.is_none() {
                        log::warn!("No app token set; requests are throttled more aggressively");
                    }
                    Box::new(SocrataClient::new(config.socrata_config(app_token))?)
                }
            };

            let conn = ticket_db::open(&db_path)?;
            let progress = IndicatifProgress::records_spinner(&multi, source.label());
            let result = run_ingest(
                &conn,
                source.as_ref(),
                &normalizer,
                &options,
                progress.as_ref(),
            )
            .await?;

            println!("Pages fetched:      {}", result.pages_fetched);
            println!("Records fetched:    {}", result.records_fetched);
            println!("Records normalized: {}", result.records_normalized);
            println!("Records inserted:   {}", result.records_inserted);
            println!("Already stored:     {}", result.records_skipped());
            println!("Records dropped:    {}", result.records_dropped);
            println!("Window:             {}", result.window);
            println!("Cursor:             {}", result.final_cursor);
        }
        Commands::Aggregate {
            min_samples,
            output_dir,
        } => {
            let output_dir = output_dir.unwrap_or_else(|| config.output_dir.clone());
            let min_samples = min_samples.unwrap_or(config.min_samples);

            let conn = ticket_db::open(&db_path)?;
            let progress = IndicatifProgress::step_bar(&multi, "Aggregating");
            let (manifest, _) =
                build_outputs(&conn, &output_dir, min_samples, progress.as_ref())?;

            for table in &manifest.tables {
                println!(
                    "{:<24} {:>10} rows  {}",
                    table.name,
                    table.row_count,
                    output_dir.join(&table.file).display()
                );
            }
        }
        Commands::Summary {
            min_samples,
            top,
            output_dir,
        } => {
            let output_dir = output_dir.unwrap_or_else(|| config.output_dir.clone());
            let min_samples = min_samples.unwrap_or(config.min_samples);

            let conn = ticket_db::open(&db_path)?;
            let progress = IndicatifProgress::step_bar(&multi, "Summarizing");
            let (_, summaries) =
                build_outputs(&conn, &output_dir, min_samples, progress.as_ref())?;

            println!(
                "{} segments with at least {min_samples} tickets",
                summaries.len()
            );
            println!(
                "{:>8}  {:<13} {:<7} {:<7} SEGMENT",
                "TICKETS", "BOROUGH", "TIER", "PARKING"
            );
            println!("{}", "-".repeat(80));
            for summary in top_segments(&summaries, top) {
                let key = &summary.segment_key;
                let location = match (key.cross_from.is_empty(), key.cross_to.is_empty()) {
                    (true, true) => key.street_name.clone(),
                    _ if key.street_name.is_empty() => {
                        format!("{} & {}", key.cross_from, key.cross_to)
                    }
                    _ => format!(
                        "{} between {} and {}",
                        key.street_name, key.cross_from, key.cross_to
                    ),
                };
                println!(
                    "{:>8}  {:<13} {:<7} {:<7} {location}",
                    summary.total_count,
                    summary.borough,
                    summary.confidence_tier.as_ref(),
                    summary.count_for(TicketType::Parking),
                );
            }
        }
        Commands::Status => {
            let conn = ticket_db::open(&db_path)?;
            println!("Database: {}", db_path.display());
            println!("Window:   {}", ticket_db::get_window(&conn)?);
            println!("Cursor:   {}", ticket_db::get_cursor(&conn)?);
            println!("Records:  {}", ticket_db::record_count(&conn)?);

            let drops = ticket_db::drop_counts(&conn)?;
            if drops.is_empty() {
                println!("Dropped:  0");
            } else {
                println!("Dropped:");
                for (reason, count) in &drops {
                    println!("  {reason:<24} {count}");
                }
            }
        }
    }

    Ok(())
}
