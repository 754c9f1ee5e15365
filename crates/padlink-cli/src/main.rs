//! padlink CLI entry point

use clap::Parser;
use padlink_cli::{Cli, ExitCode};
use padlink_core::PadlinkConfig;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> std::process::ExitCode {
    let cli = Cli::parse();

    let config = match cli.config.as_deref() {
        Some(path) => match PadlinkConfig::load_from_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Error: {e}");
                return ExitCode::InvalidInput.to_exit_code();
            }
        },
        None => PadlinkConfig::load_from_env(),
    };

    // RUST_LOG wins unless a flag asks for more
    let filter = if cli.debug || config.debug {
        EnvFilter::new("debug,padlink_core=trace")
    } else if cli.verbose {
        EnvFilter::new("info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    match cli.execute_with_config(config).await {
        Ok(code) => code.to_exit_code(),
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::GeneralError.to_exit_code()
        }
    }
}
