use std::env;
use std::path::PathBuf;
use clap::Parser;
use crate::gui::application::run_application;
use crate::error::AppRunError;

pub mod config;
pub mod device;
pub mod error;
pub mod form;
pub mod gui;
pub mod inference;
pub mod notify;

#[derive(Debug, Clone, Parser)]
#[command(name = "vitals-monitor", version, about = "Live infant vitals monitor for the ESP32-CAM-Data sensor")]
pub struct CliArgs {
    /// Config file to use instead of the default location
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Classifier model file, overrides `modelPath` from the config file
    #[arg(long, value_name = "PATH")]
    pub model: Option<PathBuf>,

    #[arg(long, value_name = "LEVEL", default_value_t = log::LevelFilter::Info)]
    pub log_level: log::LevelFilter,
}

pub fn init_logging(level: log::LevelFilter) {
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
        .level(level)
        // btleplug is very chatty at debug level
        .level_for("btleplug", level.min(log::LevelFilter::Info))
        .chain(std::io::stderr());

    if let Ok(log_file) = env::var("LOG_FILE") {
        dispatch = dispatch.chain(
            fern::log_file(log_file).expect("Failed to open LOG_FILE")
        );
    }

    dispatch.apply().expect("Failed to initialize logger");
}

pub fn run(args: CliArgs) -> Result<(), AppRunError> {
    run_application(args)?;
    Ok(())
}
