//! lot-report - Report TAPS sightings
//!
//! Reports an enforcement-officer sighting in a lot, or submits a photo
//! of a fresh parking ticket for scanning (the backend maps a recent
//! ticket to a lot and creates the sighting itself).

use anyhow::Result;
use clap::{Parser, Subcommand};
use liblotwatch::app::{App, ScanPhase};
use std::path::PathBuf;
use tracing::error;

#[derive(Parser)]
#[command(name = "lot-report")]
#[command(version)]
#[command(about = "Report TAPS sightings and scan parking tickets", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Report a sighting in a lot
    Sighting {
        /// Lot code or id (e.g. "PS")
        lot: String,

        /// Free-form note shown with the sighting
        #[arg(short, long)]
        notes: Option<String>,
    },

    /// Submit a parking-ticket photo
    Scan {
        /// Path to the ticket image
        image: PathBuf,
    },
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
        Commands::Sighting { lot, notes } => {
            let lot_id = app
                .snapshot()
                .find_lot(&lot)
                .map(|l| l.id.clone())
                .ok_or_else(|| anyhow::anyhow!("unknown lot: {}", lot))?;
            app.select_lot(&lot_id).await;
            app.report_sighting(notes).await;
            outcome(&app)?;
        }
        Commands::Scan { image } => {
            app.select_scan_image(image);
            app.submit_ticket_scan().await;

            match app.snapshot().scan {
                ScanPhase::Success(scan) => {
                    match (&scan.mapped_lot_name, &scan.ticket_date) {
                        (Some(lot), Some(date)) => {
                            println!("Ticket from {} on {} recognized.", lot, date)
                        }
                        (Some(lot), None) => println!("Ticket from {} recognized.", lot),
                        _ => println!("Ticket recognized."),
                    }
                    if scan.sighting_id.is_some() {
                        println!(
                            "Sighting created. {} parkers notified.",
                            scan.users_notified
                        );
                    } else if !scan.is_recent {
                        println!("Ticket is too old to alert anyone.");
                    }
                }
                ScanPhase::Error(message) => anyhow::bail!("{}", message),
                _ => anyhow::bail!("scan did not complete"),
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
