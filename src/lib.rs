use std::env;
use std::time::SystemTime;

use crate::app::Command;
use crate::config::io::ConfigIO;
use crate::config::types::BridgeConfig;
use crate::error::AppRunError;

pub mod app;
pub mod blocks;
pub mod config;
pub mod device;
pub mod error;
pub mod sim;

pub fn init_logging(verbose: bool) -> Result<(), fern::InitError> {
    let level = if verbose { log::LevelFilter::Debug } else { log::LevelFilter::Info };

    let mut dispatch = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{} {} {}] {}",
                humantime::format_rfc3339(SystemTime::now()),
                record.level(),
                record.target(),
                message
            ))
        })
        .level(level)
        .level_for("btleplug", log::LevelFilter::Warn)
        .chain(std::io::stderr());

    if let Ok(log_file) = env::var("LOG_FILE") {
        dispatch = dispatch.chain(fern::log_file(log_file)?);
    }

    dispatch.apply()?;
    Ok(())
}

pub async fn run(command: Command) -> Result<(), AppRunError> {
    if !command.needs_radio() {
        return app::run_command(command, &BridgeConfig::default()).await;
    }

    // one bridge process per radio: the config file lock is held until the command completes
    let config_io = ConfigIO::new_sync()?;
    let mut locker = config_io.locker()?;
    let _guard = locker.lock()?;

    let config = config_io.read().await?;
    app::run_command(command, &config).await
}
