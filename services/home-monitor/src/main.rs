//! Home Monitor CLI
//!
//! Headless live sensor dashboard for the Home Monitor backend.

use std::path::PathBuf;

use clap::Parser;
use home_monitor::auth::LoginInput;
use home_monitor::{load_config, Config};
use tracing::Level;

/// Environment variable holding the login password
const PASSWORD_ENV: &str = "HOME_MONITOR_PASSWORD";

#[derive(Parser)]
#[command(name = "home-monitor")]
#[command(about = "Live sensor dashboard for the Home Monitor backend")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log in as this user when no session is stored
    #[arg(short, long)]
    username: Option<String>,

    /// GraphQL HTTP endpoint (overrides config file)
    #[arg(long)]
    http_url: Option<String>,

    /// GraphQL WebSocket endpoint (overrides config file)
    #[arg(long)]
    ws_url: Option<String>,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: Level,
}

fn read_password(username: &str) -> std::io::Result<String> {
    match std::env::var(PASSWORD_ENV) {
        Ok(password) => Ok(password),
        Err(_) => rpassword::prompt_password(format!("Password for {}: ", username)),
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_max_level(args.log_level)
        .init();

    tracing::debug!(
        "Parsed command line arguments: config={:?}, username={:?}, log_level={:?}",
        args.config,
        args.username,
        args.log_level
    );

    let mut config = if let Some(config_path) = &args.config {
        tracing::debug!("Loading configuration from {:?}", config_path);
        load_config(config_path)?
    } else {
        tracing::debug!("Using default configuration");
        Config::default()
    };

    if let Some(http_url) = args.http_url {
        config.api.http_url = http_url;
    }
    if let Some(ws_url) = args.ws_url {
        config.api.ws_url = ws_url;
    }

    let login = match args.username {
        Some(username) => {
            let password = read_password(&username)?;
            Some(LoginInput::new(username, password))
        }
        None => None,
    };

    tracing::info!("Starting home monitor against {}", config.api.http_url);
    home_monitor::run(config, login).await?;

    Ok(())
}
