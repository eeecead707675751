use clap::Parser;
use log::{error, info};
use freedrum_bridge::cli::Args;
use freedrum_bridge::{init_logging, run};
use freedrum_bridge::error::{AppRunError, ConfigError};

fn main() -> Result<(), AppRunError> {
    let args = Args::parse();

    init_logging(args.debug_requested());
    info!(concat!("Freedrum Bridge ", env!("CARGO_PKG_VERSION")));

    match run(args) {
        Err(AppRunError::ConfigError { source: ConfigError::CanNotLock { .. } }) => {
            error!("Another bridge is already running with this config file");
            Ok(())
        },
        Err(err) => {
            error!("Unexpected error: {}", err);
            Err(err)
        },
        Ok(_) => Ok(())
    }
}
