use clap::Parser;
use log::{error, info};
use std::process::ExitCode;

use duksu::cli::{self, Cli};
use duksu::config::Config;

#[tokio::main]
async fn main() -> ExitCode {
    // A missing .env file is fine; the process environment still applies
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    // RUST_LOG takes precedence over LOG_LEVEL
    let env = env_logger::Env::default().filter_or("RUST_LOG", config.log_level.as_str());
    env_logger::Builder::from_env(env).init();
    info!("Starting duksu {}", env!("CARGO_PKG_VERSION"));

    match cli::run(cli, &config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}
