//! permadeploy - Entry Point
//!
//! Serves the deploy API, runs builds in docker sandboxes and publishes the
//! results.

use std::collections::HashMap;
use std::env;

use permadeploy::app::options::AppOptions;
use permadeploy::app::run::run;
use permadeploy::filesys::file::File;
use permadeploy::logs::{init_logging, LogOptions};
use permadeploy::storage::layout::StorageLayout;
use permadeploy::storage::settings::Settings;
use permadeploy::utils::version_info;

use secrecy::SecretString;
use tracing::{error, info, warn};

/// Environment variable holding the upload node's bearer token
const STORAGE_TOKEN_VAR: &str = "PERMADEPLOY_STORAGE_TOKEN";

#[tokio::main]
async fn main() {
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
        return;
    }

    // Retrieve the settings file; a missing one means defaults
    let settings_file = match cli_args.get("config") {
        Some(path) => File::new(path),
        None => StorageLayout::default().settings_file(),
    };
    let (settings, missing_settings) = if settings_file.exists().await {
        match settings_file.read_json::<Settings>().await {
            Ok(settings) => (settings, None),
            Err(e) => {
                println!("Unable to read settings file {}: {}", settings_file.path().display(), e);
                return;
            }
        }
    } else {
        (Settings::default(), Some(settings_file.path().display().to_string()))
    };

    // Initialize logging
    let log_options = LogOptions {
        log_level: settings.log_level,
        json_format: settings.json_logs,
    };
    if let Err(e) = init_logging(log_options) {
        println!("Failed to initialize logging: {e}");
    }
    if let Some(path) = missing_settings {
        warn!("No settings file at {}, using defaults", path);
    }

    let token = env::var(STORAGE_TOKEN_VAR).ok().map(SecretString::from);
    let mut options = AppOptions::from_settings(&settings, token);
    if let Some(port) = cli_args.get("port").and_then(|p| p.parse().ok()) {
        options.server.port = port;
    }

    info!("Running permadeploy {} with options: {:?}", version.version, options);
    if let Err(e) = run(options, await_shutdown_signal()).await {
        error!("Failed to run permadeploy: {e}");
        std::process::exit(1);
    }
}

async fn await_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let (Ok(mut sigterm), Ok(mut sigint)) =
            (signal(SignalKind::terminate()), signal(SignalKind::interrupt()))
        else {
            error!("Failed to install signal handlers, waiting for Ctrl+C only");
            let _ = tokio::signal::ctrl_c().await;
            return;
        };

        tokio::select! {
            _ = sigterm.recv() => {
                info!("SIGTERM received, shutting down...");
            }
            _ = sigint.recv() => {
                info!("SIGINT received, shutting down...");
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl+C received, shutting down...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
        }
        info!("Ctrl+C received, shutting down...");
    }
}
