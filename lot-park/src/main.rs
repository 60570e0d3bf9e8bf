//! lot-park - Park and un-park in campus lots
//!
//! Lists lots, shows a lot's live stats and enforcement prediction, and
//! opens or closes this device's parking session.

use anyhow::Result;
use clap::{Parser, Subcommand};
use liblotwatch::app::App;
use tracing::error;

#[derive(Parser)]
#[command(name = "lot-park")]
#[command(version)]
#[command(about = "Check in and out of campus parking lots", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List all parking lots
    Lots,

    /// Show live stats and the enforcement prediction for a lot
    Status {
        /// Lot code or id (e.g. "PS")
        lot: String,
    },

    /// Check in to a lot
    Checkin {
        /// Lot code or id (e.g. "PS")
        lot: String,
    },

    /// Check out of the current lot
    Checkout,

    /// Show the active parking session, if any
    Current,
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
        Commands::Lots => {
            let state = app.snapshot();
            for lot in &state.lots {
                let marker = if lot.is_active { " " } else { "x" };
                println!("{} {:6} {}", marker, lot.code, lot.name);
            }
        }
        Commands::Status { lot } => {
            let lot_id = resolve_lot(&app, &lot)?;
            app.select_lot(&lot_id).await;
            outcome(&app)?;

            let state = app.snapshot();
            if let Some(stats) = state.selected_stats() {
                println!("{} ({})", stats.lot.name, stats.lot.code);
                println!("  parked now:       {}", stats.active_parkers);
                println!("  recent sightings: {}", stats.recent_sightings);
                println!("  TAPS probability: {:.0}%", stats.taps_probability * 100.0);
            }
            if let Some(prediction) = &state.prediction {
                println!(
                    "  risk level:       {} ({:.0}%)",
                    prediction.risk_level,
                    prediction.probability * 100.0
                );
                if let Some(factors) = &prediction.factors {
                    for factor in factors {
                        println!("    - {}", factor);
                    }
                }
            }
        }
        Commands::Checkin { lot } => {
            let lot_id = resolve_lot(&app, &lot)?;
            app.select_lot(&lot_id).await;
            app.check_in().await;
            outcome(&app)?;
        }
        Commands::Checkout => {
            app.check_out().await;
            outcome(&app)?;
        }
        Commands::Current => {
            let state = app.snapshot();
            match &state.current_session {
                Some(session) => {
                    println!(
                        "Parked in {} ({}) since {}",
                        session.lot_name,
                        session.lot_code,
                        session.checked_in_at.format("%H:%M UTC")
                    );
                }
                None => println!("Not currently parked."),
            }
        }
    }

    Ok(())
}

fn resolve_lot(app: &App, id_or_code: &str) -> Result<String> {
    app.snapshot()
        .find_lot(id_or_code)
        .map(|lot| lot.id.clone())
        .ok_or_else(|| anyhow::anyhow!("unknown lot: {}", id_or_code))
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
