//! RasterFlow CLI - Command-line interface
//!
//! Renders procedural images to PNG through the RasterFlow block pipeline.

mod commands;
mod error;
mod progress;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use rasterflow::geometry::Extent;

use commands::common::{block_size_arg, Pattern};
use commands::config::ConfigCommands;
use commands::render::RenderArgs;
use error::CliError;

#[derive(Parser)]
#[command(name = "rasterflow")]
#[command(version = rasterflow::VERSION)]
#[command(about = "Write images block by block with parallel rasterization", long_about = None)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace); RUST_LOG overrides
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Also write logs to this file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    /// Configuration file (default: <config dir>/rasterflow/config.ini)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render a procedural image to a PNG file
    Render {
        /// Image width in pixels
        #[arg(long, default_value_t = 1024)]
        width: u32,

        /// Image height in pixels
        #[arg(long, default_value_t = 768)]
        height: u32,

        /// Block size as N or WxH (default from config, else 256)
        #[arg(long, value_parser = block_size_arg)]
        block_size: Option<Extent>,

        /// Rasterize worker threads (default: number of CPU cores)
        #[arg(long)]
        threads: Option<usize>,

        /// Soft limit on rasterized blocks waiting to be written
        #[arg(long)]
        max_in_flight: Option<usize>,

        /// Image to render
        #[arg(long, value_enum, default_value = "gradient")]
        pattern: Pattern,

        /// Output PNG path
        #[arg(short, long)]
        output: PathBuf,

        /// Rasterize and write on the calling thread, one block at a time
        #[arg(long)]
        sequential: bool,
    },

    /// Inspect configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(e.exit_code());
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    let _logging = rasterflow::logging::init_logging(cli.verbose, cli.log_file.as_deref())?;
    tracing::debug!(version = rasterflow::VERSION, "Starting rasterflow");

    match cli.command {
        Commands::Render {
            width,
            height,
            block_size,
            threads,
            max_in_flight,
            pattern,
            output,
            sequential,
        } => commands::render::run(
            RenderArgs {
                width,
                height,
                block_size,
                threads,
                max_in_flight,
                pattern,
                output,
                sequential,
            },
            cli.config.as_deref(),
        ),
        Commands::Config { command } => commands::config::run(command, cli.config.as_deref()),
    }
}
