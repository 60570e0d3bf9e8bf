//! lot-watch - Foreground daemon for TAPS alerts
//!
//! Polls the backend for new sightings and unread notifications, and
//! logs alerts as they arrive. The push-notification path belongs to
//! the mobile clients; this is the command-line delivery surface for
//! the same signal.

use anyhow::Result;
use clap::Parser;
use liblotwatch::app::App;
use liblotwatch::Config;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::time::{sleep, Duration};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "lot-watch")]
#[command(version)]
#[command(about = "Foreground daemon that watches for new TAPS sightings")]
#[command(long_about = "\
lot-watch - Foreground daemon for TAPS alerts

DESCRIPTION:
    lot-watch polls the Lotwatch backend at a fixed interval and logs a
    line for every sighting it has not seen before, plus the unread
    notification count. Point it at a terminal, a logfile, or a
    notification pipeline of your choice.

USAGE:
    # Run in foreground (logs to stderr)
    lot-watch

    # Watch a single lot with a tighter interval
    lot-watch --lot PS --poll-interval 30

SIGNALS:
    SIGTERM, SIGINT - Graceful shutdown (finishes the current poll)

CONFIGURATION:
    Configuration file: ~/.config/lotwatch/config.toml

    [watch]
    poll_interval = 60  # seconds between polls

EXIT CODES:
    0 - Clean shutdown
    1 - Runtime error
")]
struct Cli {
    /// Poll interval in seconds (overrides config)
    #[arg(long, value_name = "SECONDS")]
    poll_interval: Option<u64>,

    /// Watch a single lot (code or id) instead of all lots
    #[arg(long)]
    lot: Option<String>,

    /// Enable verbose logging to stderr
    #[arg(short, long)]
    verbose: bool,

    /// Poll once and exit (for testing)
    #[arg(long, hide = true)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = Config::load()?;
    let poll_interval = cli.poll_interval.unwrap_or(config.watch.poll_interval);

    let app = App::from_config(config)?;
    app.initialize().await;
    if !app.snapshot().is_ready() {
        anyhow::bail!("this device is not registered and verified yet; run lot-setup first");
    }

    let filter = match &cli.lot {
        Some(id_or_code) => Some(
            app.snapshot()
                .find_lot(id_or_code)
                .map(|l| l.id.clone())
                .ok_or_else(|| anyhow::anyhow!("unknown lot: {}", id_or_code))?,
        ),
        None => None,
    };

    info!("lot-watch starting (interval: {}s)", poll_interval);

    let shutdown = Arc::new(AtomicBool::new(false));
    setup_signal_handlers(shutdown.clone())?;

    let mut seen: HashSet<String> = HashSet::new();
    let mut first_poll = true;

    loop {
        poll(&app, &filter, &mut seen, first_poll).await;
        first_poll = false;

        if cli.once {
            break;
        }

        // Sleep until the next poll, waking early on shutdown
        for _ in 0..poll_interval {
            if shutdown.load(Ordering::Relaxed) {
                break;
            }
            sleep(Duration::from_secs(1)).await;
        }
        if shutdown.load(Ordering::Relaxed) {
            info!("shutdown requested, stopping");
            break;
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let level = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_writer(std::io::stderr)
        .init();
}

/// Set up signal handlers for graceful shutdown
#[cfg(unix)]
fn setup_signal_handlers(shutdown: Arc<AtomicBool>) -> Result<()> {
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;

    let mut signals = Signals::new([SIGINT, SIGTERM])?;

    std::thread::spawn(move || {
        for signal in signals.forever() {
            match signal {
                SIGTERM | SIGINT => {
                    info!("received shutdown signal");
                    shutdown.store(true, Ordering::Relaxed);
                    break;
                }
                _ => {}
            }
        }
    });

    Ok(())
}

#[cfg(not(unix))]
fn setup_signal_handlers(_shutdown: Arc<AtomicBool>) -> Result<()> {
    Ok(())
}

/// One poll: refresh the feed and unread count, log anything new.
async fn poll(app: &App, filter: &Option<String>, seen: &mut HashSet<String>, quiet: bool) {
    app.select_feed_filter(filter.clone()).await;
    app.fetch_unread_count().await;

    let state = app.snapshot();
    if let Some(error) = &state.error {
        warn!("poll failed: {}", error);
        app.clear_error();
        return;
    }

    for sighting in state.feed.sightings() {
        if seen.insert(sighting.id.clone()) && !quiet {
            info!(
                "TAPS spotted in {} ({}), {} min ago{}",
                sighting.lot_name,
                sighting.lot_code,
                sighting.minutes_ago,
                sighting
                    .notes
                    .as_deref()
                    .map(|n| format!(": {}", n))
                    .unwrap_or_default()
            );
        }
    }

    if state.unread_count > 0 {
        info!("{} unread notification(s)", state.unread_count);
    }
}
