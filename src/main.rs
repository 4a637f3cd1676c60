//! Campus Connect CLI - live campus notifications in the terminal.
//!
//! This is the main binary entry point. See the `campus_connect` library
//! for the core functionality.

use anyhow::Result;
use campus_connect::api::LoginRequest;
use campus_connect::{commands, env::Environment, Config, SessionStore};
use chrono::Utc;
use clap::{Parser, Subcommand};
use mimalloc::MiMalloc;

/// mimalloc provides better multi-threaded performance than the system allocator.
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(name = "campus-connect")]
#[command(version = VERSION)]
#[command(about = "Real-time Campus Connect notifications")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in and save the session
    Login {
        #[arg(long)]
        username: String,
        #[arg(long)]
        email: String,
        /// Read from CAMPUS_PASSWORD when omitted
        #[arg(long, env = "CAMPUS_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Forget the saved session
    Logout,
    /// Stay connected and print notifications as they arrive
    Listen,
    /// Print notifications queued while offline, then exit
    Backfill,
    /// Show or change configuration
    Config {
        key: Option<String>,
        value: Option<String>,
    },
    /// Show session and endpoint information
    Status,
}

fn init_logging() -> Result<()> {
    let default_filter = Environment::current().default_log_filter();
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter));
    builder.format_timestamp_secs();

    // Keep stdout for notifications when a log file is requested.
    if let Ok(path) = std::env::var("CAMPUS_LOG_FILE") {
        let log_file = std::fs::File::create(&path)
            .map_err(|e| anyhow::anyhow!("Failed to create log file at {path}: {e}"))?;
        builder.target(env_logger::Target::Pipe(Box::new(log_file)));
    }

    builder.init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging()?;

    let cli = Cli::parse();
    let sessions = SessionStore::in_config_dir()?;

    match cli.command {
        Commands::Login {
            username,
            email,
            password,
        } => {
            let config = Config::load()?;
            let request = LoginRequest {
                username,
                email,
                password,
            };
            let session = commands::login(&config, &sessions, &request).await?;
            println!("Logged in as user {}.", session.user_id);
        }
        Commands::Logout => {
            commands::logout(&sessions)?;
            println!("Logged out.");
        }
        Commands::Listen => {
            let config = Config::load()?;
            let session = commands::require_session(&sessions)?;
            println!("Listening for notifications as user {} (Ctrl-C to stop)...", session.user_id);
            commands::listen(&config, session).await?;
        }
        Commands::Backfill => {
            let config = Config::load()?;
            let session = commands::require_session(&sessions)?;
            let notifications = commands::backfill(&config, &session).await?;
            if notifications.is_empty() {
                println!("No new notifications.");
            }
            let now = Utc::now();
            for notification in &notifications {
                println!("{}", commands::format_notification(notification, now));
            }
        }
        Commands::Config { key, value } => match (key, value) {
            (None, _) => {
                let config = Config::load()?;
                println!("{}", serde_json::to_string_pretty(&config)?);
            }
            (Some(key), None) => {
                let config = Config::load()?;
                println!("{}", commands::config_get(&config, Some(&key))?);
            }
            (Some(key), Some(value)) => {
                let mut config = Config::load_saved()?;
                commands::config_set(&mut config, &key, &value)?;
                config.save()?;
                println!("Set {key} = {value}");
            }
        },
        Commands::Status => {
            let config = Config::load()?;
            println!("campus-connect v{VERSION} ({})", Environment::current());
            println!("Config:  {}", Config::path()?.display());
            println!("API:     {}", config.api_url);
            println!("Channel: {}", config.ws_url);
            match sessions.load()? {
                Some(session) => println!("Session: user {}", session.user_id),
                None => println!("Session: logged out"),
            }
        }
    }

    Ok(())
}
