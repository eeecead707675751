use std::env;
use std::sync::Arc;
use log::{error, info, warn, LevelFilter};

use crate::cli::{command_loop, spawn_pair, Args};
use crate::config::io::ConfigIO;
use crate::device::btle::BtleSelector;
use crate::error::AppRunError;
use crate::midi::sink::{NullSink, OutputSink, RawMidiSink};
use crate::render::console::ConsoleRenderer;
use crate::session::Session;

pub mod cli;
pub mod config;
pub mod device;
pub mod error;
pub mod midi;
pub mod render;
pub mod session;

pub fn init_logging(debug: bool) {
    let mut dispatch = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{} {} {}] {}",
                humantime::format_rfc3339(std::time::SystemTime::now()),
                record.level(),
                record.target(),
                message
            ))
        })
        .level(LevelFilter::Debug)
        .level_for("btleplug", LevelFilter::Info)
        .chain(std::io::stderr());

    if let Ok(log_file) = env::var("LOG_FILE") {
        dispatch = dispatch.chain(
            fern::log_file(log_file).expect("Failed to open LOG_FILE")
        );
    }

    dispatch.apply().expect("Failed to initialize logger");
    set_debug_logging(debug);
}

/// The debug flag may also come from the config file, which is read after logging starts.
pub fn set_debug_logging(debug: bool) {
    log::set_max_level(if debug { LevelFilter::Debug } else { LevelFilter::Info });
}

pub fn run(args: Args) -> Result<(), AppRunError> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(run_bridge(args))
}

async fn run_bridge(args: Args) -> Result<(), AppRunError> {
    let mut config_io = ConfigIO::new_sync(args.config.clone())?;
    let mut config_locker = config_io.locker()?;
    let _lock_guard = config_locker.lock()?;

    let mut config = config_io.load_or_init().await?;
    args.apply(&mut config);
    set_debug_logging(config.debug);

    let sink: Box<dyn OutputSink> = match &config.output {
        Some(path) => Box::new(RawMidiSink::open(path).await?),
        None => {
            warn!("No output configured, MIDI frames are discarded");
            Box::new(NullSink)
        },
    };
    let selector = Arc::new(BtleSelector::new(config.scan_timeout()).await?);

    let (session, handle) = Session::new(&config, selector);
    let renderer = ConsoleRenderer::new(handle.clone(), config.activity_lifetime());
    let session_task = tokio::spawn(session.run(sink, Box::new(renderer)));
    handle.initialized().await?;

    if args.pair {
        spawn_pair(handle.clone());
    }

    let result = command_loop(&handle).await;

    info!("Shutting down");
    handle.shutdown().await?;
    if let Err(err) = session_task.await {
        error!("Session task failed: {}", err);
    }

    result
}
