//! tiliqua-flash - Flash bitstream bundles to Tiliqua SPI flash
//!
//! Bundles are installed into one of the fixed flash slots, or into the
//! bootloader region for XiP bundles.
//!
//! # Architecture
//!
//! All layout work happens in `tiliqua-flash-core`: the bundle manifest is
//! resolved against the slot, validated and turned into an ordered list of
//! write operations. This binary only loads configuration and bundles, and
//! hands the operations to the openFPGALoader executor.

mod cli;
mod commands;
mod error;

use clap::Parser;
use cli::{Cli, Commands};
use std::path::Path;
use tiliqua_flash_core::config::FlashConfig;
use tiliqua_flash_openfpgaloader::OpenFpgaLoader;

/// Load configuration from `path`, or start from defaults
fn load_config(path: Option<&Path>) -> Result<FlashConfig, error::CliError> {
    let config = match path {
        Some(path) => {
            log::debug!("Loading configuration from {}", path.display());
            FlashConfig::from_toml_file(path)?
        }
        None => FlashConfig::default(),
    };
    Ok(config.with_env())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logger, RUST_LOG still takes precedence over -v
    let default_filter = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    let config = load_config(cli.config.as_deref())?;
    let geometry = config.geometry()?;
    let loader = OpenFpgaLoader::from_config(&config);
    log::debug!(
        "Using {} with {:?}",
        loader.program().display(),
        geometry
    );

    let result = match cli.command {
        Commands::Plan { bundle } => commands::run_plan(&bundle, geometry, &loader),
        Commands::Flash { bundle, yes } => commands::run_flash(&bundle, yes, geometry, &loader),
        Commands::Inspect { image } => commands::run_inspect(&image).map(|_| ()),
        Commands::Slots => {
            commands::run_slots();
            Ok(())
        }
    };

    if let Err(e) = result {
        log::error!("{}", e);
        std::process::exit(1);
    }

    Ok(())
}
