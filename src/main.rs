//! worldlog CLI - Binary Entry Point
//!
//! Offline inspection and maintenance of an audit database: lookups,
//! retention purge, statistics and the rollback marker list.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use worldlog::event_store::EventStoreStats;
use worldlog::utils::{format_age, format_timestamp, now_millis};
use worldlog::{AuditConfig, AuditService, BlockPos, ChangeEvent, LookupRequest, Region};

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// JSON config file; `WORLDLOG_*` variables are used otherwise
    #[clap(long, global = true)]
    config: Option<PathBuf>,

    /// Override the data directory
    #[clap(long, global = true)]
    data_dir: Option<PathBuf>,

    #[clap(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show recorded changes by actor, coordinate or region
    Lookup {
        /// Only changes made by this actor id
        #[clap(long)]
        actor: Option<String>,
        /// World of --at / --from / --to
        #[clap(long, default_value = "world")]
        world: String,
        /// Single coordinate "x,y,z"
        #[clap(long)]
        at: Option<BlockPos>,
        /// Region corner "x,y,z"
        #[clap(long, requires = "to")]
        from: Option<BlockPos>,
        /// Opposite region corner "x,y,z"
        #[clap(long, requires = "from")]
        to: Option<BlockPos>,
        /// How far back, e.g. 30m, 1h, 7d, 1w2d
        #[clap(long, default_value = "1d")]
        time: String,
        #[clap(long)]
        limit: Option<usize>,
        /// Print JSON lines instead of a table
        #[clap(long)]
        json: bool,
    },
    /// Delete rows older than the retention period
    Purge {
        /// Age cutoff, e.g. 30d; the configured retention when omitted
        #[clap(long)]
        time: Option<String>,
    },
    /// Row counts and database size
    Stats,
    /// Recent rollback markers
    Markers {
        #[clap(long, default_value_t = 20)]
        limit: usize,
    },
}

fn load_config(args: &Args) -> Result<AuditConfig> {
    let mut config = match &args.config {
        Some(path) => AuditConfig::from_file(path)
            .with_context(|| format!("failed to read config {}", path.display()))?,
        None => AuditConfig::from_env(),
    };
    if let Some(dir) = &args.data_dir {
        config.data_dir = dir.clone();
    }
    Ok(config)
}

fn print_event(event: &ChangeEvent, now: i64) {
    let location = match event.coordinate() {
        Some(pos) => format!("{}@{}", event.world, pos),
        None => "inventory".to_string(),
    };
    let slot = event.slot().map(|s| format!(" #{}", s)).unwrap_or_default();
    let undone = if event.rolled_back { " (rolled back)" } else { "" };

    println!(
        "{:>12}  {:<16} {:<22} {}{}  {} -> {}{}",
        format_age(event.timestamp, now),
        event.actor_name,
        event.action,
        location,
        slot,
        event.before,
        event.after,
        undone
    );
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = load_config(&args)?;
    let service = AuditService::open(config).context("failed to open audit database")?;

    match args.cmd {
        Command::Lookup {
            actor,
            world,
            at,
            from,
            to,
            time,
            limit,
            json,
        } => {
            let events = match (at, from, to) {
                (Some(pos), _, _) => service.lookup_at(&world, pos, &time)?,
                (None, Some(a), Some(b)) => {
                    let mut request = LookupRequest::region("cli", Region::new(world, a, b), time);
                    request.actor = actor;
                    request.limit = limit;
                    service.lookup(&request)?
                }
                _ => match actor {
                    Some(actor) => {
                        let mut request = LookupRequest::actor("cli", actor, time);
                        request.limit = limit;
                        service.lookup(&request)?
                    }
                    None => bail!("give --actor, --at or --from/--to"),
                },
            };

            let now = now_millis();
            for event in &events {
                if json {
                    println!("{}", serde_json::to_string(event)?);
                } else {
                    print_event(event, now);
                }
            }
            if !json {
                println!("{} result(s)", events.len());
            }
        }
        Command::Purge { time } => {
            let counts = match time {
                Some(time) => service.purge(&time)?,
                None => service.purge_expired()?,
            };
            println!(
                "Purged {} block, {} container, {} inventory events, {} snapshots, {} markers",
                counts.block, counts.container, counts.inventory, counts.snapshots, counts.markers
            );
        }
        Command::Stats => {
            let stats = service.store().stats()?;
            for (category, count) in &stats.events_by_category {
                println!("{:<10} {}", category, count);
            }
            println!("{:<10} {}", "total", stats.total_events());
            println!("rolled back: {}", stats.rolled_back_events);
            println!("snapshots:   {}", stats.snapshot_count);
            println!("markers:     {}", stats.marker_count);
            if let (Some(oldest), Some(newest)) = (stats.oldest_event, stats.newest_event) {
                println!("range:       {} .. {}", format_timestamp(oldest), format_timestamp(newest));
            }
            println!("size:        {}", EventStoreStats::format_size(stats.database_size));
        }
        Command::Markers { limit } => {
            for marker in service.markers(limit)? {
                let restored = marker
                    .restored_at
                    .map(|t| format!(", restored {}", format_timestamp(t)))
                    .unwrap_or_default();
                println!(
                    "#{} {} by {}: {} over {} ({} applied, {} skipped, {} events{})",
                    marker.id,
                    format_timestamp(marker.created_at),
                    marker.issuer_id,
                    marker.scope,
                    marker.window,
                    marker.applied_count,
                    marker.skipped_count,
                    marker.event_ids.len(),
                    restored
                );
            }
        }
    }

    Ok(())
}
