//! Image resource abstraction.
//!
//! A resource is the destination (or source) of pixel data: a file, a tile
//! store, a network sink. The pipeline only needs its dimensions, its
//! preferred write granularity, and region-based `read`/`write`.
//!
//! ```text
//! ┌─────────────────────┐
//! │  Block Pipeline     │
//! │                     │
//! │ &mut impl ImageResource
//! └──────────┬──────────┘
//!            │
//!            ▼
//! ┌─────────────────────┐
//! │   ImageResource     │ (trait)
//! └──────────┬──────────┘
//!            │
//!       ┌────┴────┐
//!       ▼         ▼
//! ┌──────────┐ ┌──────────┐
//! │  Memory  │ │   Png    │
//! │ Resource │ │ Resource │
//! └──────────┘ └──────────┘
//! ```

mod memory;
mod png;

pub use memory::MemoryResource;
pub use png::PngResource;

use crate::buffer::{Pixel, PixelBuffer};
use crate::error::ResourceError;
use crate::geometry::{BBox, Extent};

/// A readable and writable image store addressed by pixel regions.
///
/// Implementations must accept any region that lies inside their bounds,
/// including the clipped blocks along the right and bottom edges.
pub trait ImageResource {
    /// Pixel type stored by this resource.
    type Pixel: Pixel;

    /// Width in pixels.
    fn cols(&self) -> u32;

    /// Height in pixels.
    fn rows(&self) -> u32;

    /// Number of planes.
    fn planes(&self) -> u32 {
        1
    }

    /// Number of channels per pixel.
    fn channels(&self) -> usize {
        Self::Pixel::CHANNELS
    }

    /// Preferred write granularity.
    fn block_size(&self) -> Extent;

    /// Reads the region `bbox` into `buffer`, which must already be sized to it.
    fn read(&self, buffer: &mut PixelBuffer<Self::Pixel>, bbox: BBox) -> Result<(), ResourceError>;

    /// Writes `buffer` to the region `bbox`.
    fn write(&mut self, buffer: &PixelBuffer<Self::Pixel>, bbox: BBox)
        -> Result<(), ResourceError>;
}

/// Checks that `bbox` lies inside a `cols × rows` resource.
pub(crate) fn check_bounds(bbox: BBox, cols: u32, rows: u32) -> Result<(), ResourceError> {
    if BBox::new(0, 0, cols, rows).contains(&bbox) {
        Ok(())
    } else {
        Err(ResourceError::OutOfBounds { bbox, cols, rows })
    }
}

/// Checks that `buffer` has exactly the shape of `bbox` with `planes` planes.
pub(crate) fn check_shape<P: Pixel>(
    buffer: &PixelBuffer<P>,
    bbox: BBox,
    planes: u32,
) -> Result<(), ResourceError> {
    if buffer.cols() == bbox.width && buffer.rows() == bbox.height && buffer.planes() == planes {
        Ok(())
    } else {
        Err(ResourceError::DimensionMismatch {
            expected_cols: bbox.width,
            expected_rows: bbox.height,
            expected_planes: planes,
            actual_cols: buffer.cols(),
            actual_rows: buffer.rows(),
            actual_planes: buffer.planes(),
        })
    }
}
