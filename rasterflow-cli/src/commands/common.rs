//! Common types and utilities shared across CLI commands.

use std::path::Path;

use clap::ValueEnum;
use rasterflow::buffer::Rgba8;
use rasterflow::config::{parse_block_size, ConfigError, ConfigFile};
use rasterflow::geometry::Extent;
use rasterflow::view::FnView;

use crate::error::CliError;

/// Side of one checkerboard square, in pixels.
const CHECKER_SQUARE: u32 = 32;

/// Iteration limit for the Mandelbrot pattern.
const MANDELBROT_ITERATIONS: u32 = 256;

/// Largest canvas `render` will allocate: 2^28 pixels, 1 GiB of RGBA8.
pub const MAX_CANVAS_PIXELS: u64 = 1 << 28;

/// Procedural image selection for CLI arguments.
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum Pattern {
    /// Red/green gradient across the image
    Gradient,
    /// Black and white checkerboard
    Checker,
    /// Mandelbrot set (expensive, uneven per-block cost)
    Mandelbrot,
}

impl Pattern {
    /// Color of pixel `(x, y)` in a `cols × rows` image.
    pub fn pixel(self, x: u32, y: u32, cols: u32, rows: u32) -> Rgba8 {
        match self {
            Pattern::Gradient => {
                let r = scale(x, cols);
                let g = scale(y, rows);
                [r, g, 128, 255]
            }
            Pattern::Checker => {
                let dark = ((x / CHECKER_SQUARE) + (y / CHECKER_SQUARE)) % 2 == 0;
                if dark {
                    [0, 0, 0, 255]
                } else {
                    [255, 255, 255, 255]
                }
            }
            Pattern::Mandelbrot => mandelbrot(x, y, cols, rows),
        }
    }

    /// A view evaluating this pattern over a `cols × rows` image.
    pub fn view(self, cols: u32, rows: u32) -> FnView<Rgba8, impl Fn(u32, u32, u32) -> Rgba8 + Sync> {
        FnView::new(cols, rows, move |x, y, _| self.pixel(x, y, cols, rows))
    }
}

/// Maps `value` in `[0, extent)` onto `[0, 255]`.
fn scale(value: u32, extent: u32) -> u8 {
    if extent <= 1 {
        return 0;
    }
    (value as u64 * 255 / (extent as u64 - 1)) as u8
}

fn mandelbrot(x: u32, y: u32, cols: u32, rows: u32) -> Rgba8 {
    // Fit [-2.5, 1] × [-1.25, 1.25] into the image, keeping pixels square
    let scale = (3.5 / cols.max(1) as f64).max(2.5 / rows.max(1) as f64);
    let cx = -0.75 + (x as f64 - cols as f64 / 2.0) * scale;
    let cy = (y as f64 - rows as f64 / 2.0) * scale;

    let (mut zx, mut zy) = (0.0f64, 0.0f64);
    let mut iteration = 0;
    while iteration < MANDELBROT_ITERATIONS && zx * zx + zy * zy <= 4.0 {
        let next = zx * zx - zy * zy + cx;
        zy = 2.0 * zx * zy + cy;
        zx = next;
        iteration += 1;
    }

    if iteration == MANDELBROT_ITERATIONS {
        return [0, 0, 0, 255];
    }
    let t = iteration as f64 / MANDELBROT_ITERATIONS as f64;
    [
        (9.0 * (1.0 - t) * t * t * t * 255.0) as u8,
        (15.0 * (1.0 - t) * (1.0 - t) * t * t * 255.0) as u8,
        (8.5 * (1.0 - t) * (1.0 - t) * (1.0 - t) * t * 255.0) as u8,
        255,
    ]
}

/// clap value parser for `--block-size`.
pub fn block_size_arg(value: &str) -> Result<Extent, String> {
    parse_block_size(value)
        .ok_or_else(|| format!("'{}' is not a block size; use N or WxH with non-zero sides", value))
}

/// Rejects output sizes whose RGBA canvas would exceed [`MAX_CANVAS_PIXELS`].
pub fn check_canvas_size(width: u32, height: u32) -> Result<(), CliError> {
    let pixels = width as u64 * height as u64;
    if pixels > MAX_CANVAS_PIXELS {
        return Err(CliError::Usage(format!(
            "{}×{} is {} pixels; the limit is {}",
            width, height, pixels, MAX_CANVAS_PIXELS
        )));
    }
    Ok(())
}

/// Load the config file: an explicit path must exist, the default path may not.
pub fn load_config(explicit: Option<&Path>) -> Result<ConfigFile, ConfigError> {
    match explicit {
        Some(path) => ConfigFile::load(path),
        None => match ConfigFile::default_path() {
            Ok(path) => ConfigFile::load_or_default(&path),
            Err(ConfigError::NoConfigDir) => Ok(ConfigFile::default()),
            Err(e) => Err(e),
        },
    }
}
