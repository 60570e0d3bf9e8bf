//! lot-feed - The community sighting feed
//!
//! Shows the sighting feed (for one lot or all lots), casts and removes
//! votes, and surfaces notifications and campus-wide stats.

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use liblotwatch::app::App;
use liblotwatch::types::VoteKind;
use tracing::error;

#[derive(Parser)]
#[command(name = "lot-feed")]
#[command(version)]
#[command(about = "Browse and vote on TAPS sightings", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the sighting feed
    Show {
        /// Restrict to one lot (code or id); all lots when omitted
        #[arg(long)]
        lot: Option<String>,
    },

    /// Vote on a sighting (repeating the same vote removes it)
    Vote {
        /// Sighting id from `lot-feed show`
        sighting: String,

        /// Vote direction
        direction: Direction,
    },

    /// Show unread notifications
    Notifications {
        /// Mark everything read after listing
        #[arg(long)]
        mark_read: bool,
    },

    /// Show campus-wide stats
    Stats,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Direction {
    Up,
    Down,
}

impl From<Direction> for VoteKind {
    fn from(direction: Direction) -> Self {
        match direction {
            Direction::Up => VoteKind::Upvote,
            Direction::Down => VoteKind::Downvote,
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = run(cli.command).await {
        error!("{}", e);
        std::process::exit(1);
    }
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let level = if verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(command: Commands) -> Result<()> {
    let app = App::new()?;
    app.initialize().await;

    if !app.snapshot().is_ready() {
        anyhow::bail!("this device is not registered and verified yet; run lot-setup first");
    }
    app.clear_error();

    match command {
        Commands::Show { lot } => {
            let filter = match lot {
                Some(id_or_code) => Some(
                    app.snapshot()
                        .find_lot(&id_or_code)
                        .map(|l| l.id.clone())
                        .ok_or_else(|| anyhow::anyhow!("unknown lot: {}", id_or_code))?,
                ),
                None => None,
            };
            app.select_feed_filter(filter).await;
            outcome(&app)?;

            let state = app.snapshot();
            let sightings = state.feed.sightings();
            if sightings.is_empty() {
                println!("No recent sightings.");
            }
            for sighting in sightings {
                let vote = match sighting.user_vote {
                    Some(VoteKind::Upvote) => "^",
                    Some(VoteKind::Downvote) => "v",
                    None => " ",
                };
                println!(
                    "{} {:>3}  {:>4}m  {:6} {}  [{}]",
                    vote,
                    sighting.net_score,
                    sighting.minutes_ago,
                    sighting.lot_code,
                    sighting.notes.as_deref().unwrap_or("TAPS spotted"),
                    sighting.id
                );
            }
        }
        Commands::Vote {
            sighting,
            direction,
        } => {
            // Voting operates on the active view; load the aggregate
            // feed so any sighting id is reachable
            app.select_feed_filter(None).await;
            app.vote(&sighting, direction.into()).await;
            outcome(&app)?;

            if let Some(updated) = app.snapshot().feed.find(&sighting) {
                println!(
                    "{} now at {} ({} up / {} down)",
                    updated.id, updated.net_score, updated.upvotes, updated.downvotes
                );
            }
        }
        Commands::Notifications { mark_read } => {
            let notifications = app.notifications().await;
            if notifications.is_empty() {
                println!("No unread notifications.");
            }
            for notification in &notifications {
                println!(
                    "{}  {}",
                    notification.created_at.format("%m-%d %H:%M"),
                    notification.message
                );
            }
            if mark_read {
                app.mark_all_read().await;
            }
        }
        Commands::Stats => {
            app.load_campus_stats().await;
            match app.snapshot().campus_stats {
                Some(stats) => {
                    println!("registered devices: {}", stats.total_registered_devices);
                    println!("parked right now:   {}", stats.total_parked);
                    println!("sightings today:    {}", stats.total_sightings_today);
                }
                None => println!("Campus stats are unavailable right now."),
            }
        }
    }

    Ok(())
}

fn outcome(app: &App) -> Result<()> {
    let state = app.snapshot();
    if let Some(message) = &state.success_message {
        println!("{}", message);
    }
    if let Some(error) = &state.error {
        anyhow::bail!("{}", error);
    }
    Ok(())
}
