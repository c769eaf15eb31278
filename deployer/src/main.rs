//! WebLogic Deployer - Entry Point
//!
//! Deploys an archive to a WebLogic domain and prints where it is served.

use std::collections::HashMap;
use std::env;
use std::process::ExitCode;
use std::sync::Arc;

use colored::Colorize;
use tracing::{error, info};

use wlsdeployer::app::options::Configuration;
use wlsdeployer::app::run::{run, Command, Outcome};
use wlsdeployer::deploy::orchestrator::Deployer;
use wlsdeployer::filesys::file::File;
use wlsdeployer::logs::{init_logging, LogOptions};
use wlsdeployer::mgmt::rest::RestConnector;
use wlsdeployer::storage::settings::{Settings, DEFAULT_SETTINGS_FILE};
use wlsdeployer::utils::version_info;

#[tokio::main]
async fn main() -> ExitCode {
    // Parse command line arguments
    let args: Vec<String> = env::args().collect();
    let mut cli_args: HashMap<String, String> = HashMap::new();

    for arg in args.iter().skip(1) {
        if let Some((key, value)) = arg.split_once('=') {
            // Handle --key=value format
            let clean_key = key.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), value.to_string());
        } else if arg.starts_with("--") {
            // Handle standalone flags like --version
            let clean_key = arg.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), "true".to_string());
        }
    }

    // Print version and exit
    let version = version_info();
    if cli_args.contains_key("version") {
        match serde_json::to_string_pretty(&version) {
            Ok(json) => println!("{}", json),
            Err(_) => println!("{}", version.version),
        }
        return ExitCode::SUCCESS;
    }

    // Retrieve the settings file
    let settings_path = cli_args
        .get("settings")
        .cloned()
        .unwrap_or_else(|| DEFAULT_SETTINGS_FILE.to_string());
    let settings = match File::new(&settings_path).read_json::<Settings>().await {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Unable to read settings file {}: {}", settings_path, e);
            return ExitCode::FAILURE;
        }
    };

    // Initialize logging
    let log_options = LogOptions {
        log_level: settings.log_level.clone(),
        log_dir: settings.log_dir.clone().map(Into::into),
        ..Default::default()
    };
    let _log_guard = match init_logging(log_options) {
        Ok(guard) => guard,
        Err(e) => {
            println!("Failed to initialize logging: {e}");
            None
        }
    };

    let config = match Configuration::from_settings(settings).await {
        Ok(config) => Arc::new(config),
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };
    let command = match Command::from_args(&cli_args, &config) {
        Ok(command) => command,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    info!("Running WebLogic Deployer {} against {}", version.version, config.admin);
    let deployer = Deployer::new(Arc::clone(&config), Arc::new(RestConnector));
    match run(&deployer, command, await_shutdown_signal()).await {
        Ok(outcome) => {
            print_outcome(&outcome);
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{} ({:?})", e, e.phase());
            for cleanup in e.suppressed() {
                error!("  cleanup also failed: {}", cleanup);
            }
            ExitCode::FAILURE
        }
    }
}

fn print_outcome(outcome: &Outcome) {
    match outcome {
        Outcome::Deployed(endpoint) => match serde_json::to_string_pretty(endpoint) {
            Ok(json) => println!("{}", json),
            Err(e) => error!("Failed to print the endpoint: {}", e),
        },
        Outcome::Undeployed(name) => {
            println!("{} {}", "Undeployed".green(), name);
        }
        Outcome::Status {
            target,
            target_running,
            servers,
        } => {
            for server in servers {
                let state = if server.is_running() {
                    server.state.green()
                } else {
                    server.state.yellow()
                };
                let url = server.base_url.as_deref().unwrap_or("-");
                println!("{:<24} {:<32} {}", server.name, url, state);
            }
            let verdict = if *target_running {
                "running".green()
            } else {
                "not running".red()
            };
            println!("Target {} is {}", target.bold(), verdict);
        }
    }
}

async fn await_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let (mut sigterm, mut sigint) =
            match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
                (Ok(sigterm), Ok(sigint)) => (sigterm, sigint),
                _ => {
                    error!("Failed to install signal handlers, falling back to Ctrl+C");
                    let _ = tokio::signal::ctrl_c().await;
                    return;
                }
            };

        tokio::select! {
            _ = sigterm.recv() => {
                info!("SIGTERM received, shutting down...");
            }
            _ = sigint.recv() => {
                info!("SIGINT received, shutting down...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl+C received, shutting down...");
        }
    }
}
