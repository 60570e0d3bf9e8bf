//! lot-setup - Device registration and email verification for Lotwatch
//!
//! This tool walks a device through onboarding: register with the
//! backend, verify a campus email (directly or with a one-time code),
//! inspect the server-side identity, and manage push registration.

use anyhow::Result;
use clap::{Parser, Subcommand};
use liblotwatch::app::{App, AuthPhase};
use tracing::error;

#[derive(Parser)]
#[command(name = "lot-setup")]
#[command(version)]
#[command(about = "Register this device and verify your campus email", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Register this device with the backend
    Register,

    /// Verify a campus email address directly
    Verify {
        /// Campus email address
        email: String,
    },

    /// Email a one-time verification code
    SendCode {
        /// Campus email address
        email: String,
    },

    /// Confirm a one-time verification code
    ConfirmCode {
        /// Campus email address the code was sent to
        email: String,

        /// The code from the email
        code: String,
    },

    /// Show the device identity the server holds
    Status,

    /// Enable or disable push notifications
    Push {
        /// Turn push notifications on
        #[arg(long, conflicts_with = "disable")]
        enable: bool,

        /// Turn push notifications off
        #[arg(long)]
        disable: bool,

        /// Register a new push token for this device
        #[arg(long)]
        token: Option<String>,
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

    let level = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(command: Commands) -> Result<()> {
    let app = App::new()?;
    app.initialize().await;
    app.clear_error();

    match command {
        Commands::Register => {
            app.register().await;
            outcome(&app)?;
            match app.snapshot().phase {
                AuthPhase::Ready => println!("Device registered and verified."),
                AuthPhase::AwaitingVerification => {
                    println!("Device registered.");
                    println!("Verify your email with: lot-setup send-code <you@campus.edu>");
                }
                AuthPhase::Unauthenticated => {}
            }
        }
        Commands::Verify { email } => {
            app.verify_email(&email).await;
            outcome(&app)?;
            if app.snapshot().is_ready() {
                println!("Email verified. You're all set.");
            }
        }
        Commands::SendCode { email } => {
            app.send_code(&email).await;
            outcome(&app)?;
        }
        Commands::ConfirmCode { email, code } => {
            app.verify_code(&email, &code).await;
            outcome(&app)?;
            if app.snapshot().is_ready() {
                println!("Email verified. You're all set.");
            }
        }
        Commands::Status => {
            let state = app.snapshot();
            println!("device id:  {}", state.device_id.as_deref().unwrap_or("-"));
            println!("phase:      {:?}", state.phase);
            if let Some(identity) = app.identity().await {
                println!("registered: {}", identity.created_at.format("%Y-%m-%d %H:%M UTC"));
                println!("verified:   {}", identity.email_verified);
                println!("push:       {}", identity.is_push_enabled);
                if let Some(seen) = identity.last_seen_at {
                    println!("last seen:  {}", seen.format("%Y-%m-%d %H:%M UTC"));
                }
            }
            outcome(&app)?;
        }
        Commands::Push {
            enable,
            disable,
            token,
        } => {
            if let Some(token) = token {
                app.set_push_token(&token).await;
            } else if enable || disable {
                app.set_push_enabled(enable).await;
            } else {
                anyhow::bail!("pass --enable, --disable, or --token <TOKEN>");
            }
            outcome(&app)?;
        }
    }

    Ok(())
}

/// Print the success notice and turn a surfaced error into a failing
/// exit.
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
