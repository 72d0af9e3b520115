use anyhow::Context;
use clap::Parser;
use clay_relay::{config::RelayConfig, install, relay, RelayError};
use std::{path::PathBuf, process::ExitCode};
use tracing::{error, info};
use tracing_subscriber::prelude::*;

#[derive(Parser, Debug)]
#[command(
    name = "clay-relay",
    about = "Native messaging host relaying a browser extension to a local WebSocket client",
    version
)]
struct Cli {
    /// Install the native messaging host manifest for this executable and exit
    #[arg(long, conflicts_with = "unregister")]
    register: bool,

    /// Remove the native messaging host manifest and exit
    #[arg(long)]
    unregister: bool,

    /// Path to a TOML config file
    #[arg(long, env = "CLAY_RELAY_CONFIG")]
    config: Option<PathBuf>,

    /// Arguments the browser appends (caller origin, --parent-window). Ignored.
    #[arg(hide = true, trailing_var_arg = true, allow_hyphen_values = true)]
    caller: Vec<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    let config = match RelayConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "cannot load config");
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    if cli.register || cli.unregister {
        return match registration(&config, cli.register) {
            Ok(done) => {
                println!("{done}");
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("{e:#}");
                ExitCode::FAILURE
            }
        };
    }

    info!(caller = ?cli.caller, "clay-relay starting");
    match relay::run(config, std::io::stdin(), tokio::io::stdout()).await {
        Ok(_) => {
            info!("relay finished");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "relay stopped");
            if let RelayError::Handshake(handshake) = &e {
                eprintln!("{}", handshake.hint());
            }
            ExitCode::from(e.exit_code())
        }
    }
}

fn registration(config: &RelayConfig, register: bool) -> anyhow::Result<&'static str> {
    if register {
        install::register(&config.manifest).context("registering native messaging host")?;
        Ok("Registered")
    } else {
        install::unregister(&config.manifest).context("unregistering native messaging host")?;
        Ok("Unregistered")
    }
}

fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};
    // stdout carries the protocol; logs must go to stderr.
    let _ = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(fmt::layer().with_writer(std::io::stderr))
        .try_init();
}
