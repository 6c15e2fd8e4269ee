use clap::Parser;
use log::{error, info};
use gdx_bridge::app::Command;
use gdx_bridge::error::{AppRunError, ConfigError};
use gdx_bridge::{init_logging, run};

/// Bridges Vernier Go Direct sensors to block programming extensions.
#[derive(Parser, Debug)]
#[command(name = "gdx-bridge", version)]
struct Cli {
    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[tokio::main]
async fn main() -> Result<(), AppRunError> {
    let cli = Cli::parse();

    if let Err(err) = init_logging(cli.verbose) {
        eprintln!("Failed to initialize logging: {}", err);
    }
    info!(concat!("gdx-bridge ", env!("CARGO_PKG_VERSION")));

    match run(cli.command).await {
        Err(AppRunError::ConfigError { source: ConfigError::CanNotLock { .. } }) => {
            error!("gdx-bridge has already been started");
            Ok(())
        },
        Err(err) => {
            error!("Unexpected error: {}", err);
            Err(err)
        },
        Ok(()) => Ok(()),
    }
}
