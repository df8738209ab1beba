//! Configuration CLI commands.
//!
//! Provides `config path` and `config show` for inspecting the configuration
//! file and the settings a render would use.

use std::path::Path;

use clap::Subcommand;
use rasterflow::config::ConfigFile;

use super::common::load_config;
use crate::error::CliError;

/// Config subcommands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    /// Show the configuration file path
    Path,

    /// Show the effective render settings
    Show,
}

/// Run a config subcommand.
pub fn run(command: ConfigCommands, explicit: Option<&Path>) -> Result<(), CliError> {
    match command {
        ConfigCommands::Path => run_path(explicit),
        ConfigCommands::Show => run_show(explicit),
    }
}

/// Print the configuration file path.
fn run_path(explicit: Option<&Path>) -> Result<(), CliError> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => ConfigFile::default_path()?,
    };
    println!("{}", path.display());
    Ok(())
}

/// Print the settings a render would use without command-line overrides.
fn run_show(explicit: Option<&Path>) -> Result<(), CliError> {
    let file = load_config(explicit)?;
    let writer = file.to_writer_config();
    let block_size = file.block_size_or_default();

    println!("[render]");
    println!("  threads       = {}", writer.threads());
    println!("  max_in_flight = {}", writer.max_in_flight());
    println!("  block_size    = {}x{}", block_size.width, block_size.height);
    println!("  sequential    = {}", file.sequential.unwrap_or(false));
    Ok(())
}
