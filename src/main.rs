//! Texnouz OCPI node
//!
//! Serves the OCPI 2.2.1 versions, credentials and module endpoints.
//! Reads configuration from a TOML file (~/.config/texnouz-ocpi/config.toml).

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};

use texnouz_ocpi::config::{default_config_path, AppConfig, LoggingConfig};
use texnouz_ocpi::server::{init_tracing, run};

#[derive(Debug, Parser)]
#[command(name = "ocpi-service", version, about = "Texnouz OCPI peering node")]
struct Cli {
    /// Path of the TOML configuration file
    #[arg(short, long, env = "OCPI_CONFIG")]
    config: Option<PathBuf>,

    /// Override `server.port`
    #[arg(short, long)]
    port: Option<u16>,

    /// Override `logging.level`
    #[arg(long)]
    log_level: Option<String>,

    /// Validate the configuration, print a summary and exit
    #[arg(long)]
    check: bool,
}

fn print_summary(path: &std::path::Path, config: &AppConfig) {
    println!("config:        {}", path.display());
    println!("listen:        {}", config.server.address());
    println!("versions url:  {}/versions", config.server.public_url());
    println!("ocpi version:  {}", config.ocpi.version);
    for role in &config.ocpi.roles {
        println!("role:          {}*{} {} ({})", role.country_code, role.party_id, role.role, role.name);
    }
    for entry in &config.ocpi.bootstrap {
        let direction = if entry.is_outbound() { "outbound" } else { "inbound" };
        println!("bootstrap:     {}*{} {} [{direction}]", entry.country_code, entry.party_id, entry.role);
    }
    println!("open data:     {}", config.ocpi.allow_open_data);
    println!("metrics:       {}", config.metrics.enabled);
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let path = cli.config.unwrap_or_else(default_config_path);

    let mut config = match AppConfig::load(&path) {
        Ok(config) => config,
        Err(e) => {
            init_tracing(&LoggingConfig::default());
            error!(path = %path.display(), error = %e, "Failed to load config");
            return ExitCode::FAILURE;
        }
    };
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }

    if cli.check {
        return match config.validate() {
            Ok(()) => {
                print_summary(&path, &config);
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("invalid configuration: {e}");
                ExitCode::FAILURE
            }
        };
    }

    init_tracing(&config.logging);
    info!(path = %path.display(), "Starting Texnouz OCPI node");

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "OCPI node stopped with error");
            ExitCode::FAILURE
        }
    }
}
