//! Render command - write a procedural image to PNG through the block pipeline.

use std::path::{Path, PathBuf};

use rasterflow::geometry::Extent;
use rasterflow::progress::AbortFlag;
use rasterflow::resource::PngResource;
use rasterflow::{block_write_image, write_image, PipelineError};

use super::common::{check_canvas_size, load_config, Pattern};
use crate::error::CliError;
use crate::progress::BarProgress;

/// Arguments for the render command.
pub struct RenderArgs {
    pub width: u32,
    pub height: u32,
    pub block_size: Option<Extent>,
    pub threads: Option<usize>,
    pub max_in_flight: Option<usize>,
    pub pattern: Pattern,
    pub output: PathBuf,
    pub sequential: bool,
}

/// Run the render command.
pub fn run(args: RenderArgs, config_path: Option<&Path>) -> Result<(), CliError> {
    check_canvas_size(args.width, args.height)?;
    let file = load_config(config_path)?;

    // CLI takes precedence, then config
    let block_size = args
        .block_size
        .unwrap_or_else(|| file.block_size_or_default());
    let mut writer_config = file.to_writer_config();
    if let Some(threads) = args.threads {
        writer_config = writer_config.with_threads(threads);
    }
    if let Some(max_in_flight) = args.max_in_flight {
        writer_config = writer_config.with_max_in_flight(max_in_flight);
    }
    let sequential = args.sequential || file.sequential.unwrap_or(false);

    // Ctrl+C stops new blocks from starting; blocks already queued for
    // writing still finish
    let abort = AbortFlag::new();
    let handler_flag = abort.clone();
    ctrlc::set_handler(move || {
        eprintln!();
        eprintln!("Received interrupt, stopping after blocks being written...");
        handler_flag.request();
    })
    .map_err(|e| CliError::Signal(e.to_string()))?;

    println!("Rendering {:?} pattern", args.pattern);
    println!("  Size:       {}", Extent::new(args.width, args.height));
    println!("  Block size: {}", block_size);
    if sequential {
        println!("  Mode:       sequential");
    } else {
        println!(
            "  Mode:       {} threads, {} blocks in flight",
            writer_config.threads(),
            writer_config.max_in_flight()
        );
    }
    println!("  Output:     {}", args.output.display());
    println!();

    let view = args.pattern.view(args.width, args.height);
    let mut resource = PngResource::create(&args.output, args.width, args.height, block_size);
    let progress = BarProgress::new(abort);

    let result = if sequential {
        write_image(&mut resource, &view, &progress)
    } else {
        block_write_image(&mut resource, &view, &progress, &writer_config)
    };

    let report = match result {
        Ok(report) => {
            progress.finish("done");
            report
        }
        Err(PipelineError::Aborted) => {
            progress.abandon("aborted");
            return Err(PipelineError::Aborted.into());
        }
        Err(e) => {
            progress.abandon("failed");
            return Err(e.into());
        }
    };

    resource.finish()?;
    tracing::info!(path = %args.output.display(), "Wrote PNG");

    println!();
    println!(
        "Wrote {} blocks ({}×{}) to {} in {:.2?}",
        report.blocks,
        report.cols,
        report.rows,
        resource.path().display(),
        report.elapsed
    );
    Ok(())
}
