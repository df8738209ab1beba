//! PNG-backed RGBA resource.

use std::path::{Path, PathBuf};

use image::{ImageFormat, Rgba, RgbaImage};

use crate::buffer::{PixelBuffer, Rgba8};
use crate::error::ResourceError;
use crate::geometry::{BBox, Extent};

use super::{check_bounds, check_shape, ImageResource};

/// An RGBA8 resource that assembles blocks in memory and encodes a PNG file.
///
/// PNG cannot be written region by region, so blocks are composed into an
/// in-memory canvas and the file is produced by [`PngResource::finish`].
pub struct PngResource {
    path: PathBuf,
    canvas: RgbaImage,
    block_size: Extent,
}

impl PngResource {
    /// Creates an empty (transparent) canvas that will be saved to `path`.
    pub fn create(path: impl Into<PathBuf>, cols: u32, rows: u32, block_size: Extent) -> Self {
        Self {
            path: path.into(),
            canvas: RgbaImage::new(cols, rows),
            block_size,
        }
    }

    /// Opens an existing image file for reading (and rewriting in place).
    pub fn open(path: impl Into<PathBuf>, block_size: Extent) -> Result<Self, ResourceError> {
        let path = path.into();
        let canvas = image::open(&path)?.to_rgba8();
        Ok(Self {
            path,
            canvas,
            block_size,
        })
    }

    /// Destination path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Encodes the canvas to the destination path.
    pub fn finish(&self) -> Result<(), ResourceError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        self.canvas.save_with_format(&self.path, ImageFormat::Png)?;
        tracing::debug!(path = %self.path.display(), "Saved PNG resource");
        Ok(())
    }
}

impl ImageResource for PngResource {
    type Pixel = Rgba8;

    fn cols(&self) -> u32 {
        self.canvas.width()
    }

    fn rows(&self) -> u32 {
        self.canvas.height()
    }

    fn block_size(&self) -> Extent {
        self.block_size
    }

    fn read(&self, buffer: &mut PixelBuffer<Rgba8>, bbox: BBox) -> Result<(), ResourceError> {
        check_bounds(bbox, self.cols(), self.rows())?;
        check_shape(buffer, bbox, 1)?;
        *buffer = PixelBuffer::from_fn(bbox.width, bbox.height, 1, |x, y, _| {
            self.canvas.get_pixel(bbox.x + x, bbox.y + y).0
        });
        Ok(())
    }

    fn write(&mut self, buffer: &PixelBuffer<Rgba8>, bbox: BBox) -> Result<(), ResourceError> {
        check_bounds(bbox, self.cols(), self.rows())?;
        check_shape(buffer, bbox, 1)?;
        for y in 0..bbox.height {
            for (x, pixel) in buffer.row(y, 0).iter().enumerate() {
                self.canvas
                    .put_pixel(bbox.x + x as u32, bbox.y + y, Rgba(*pixel));
            }
        }
        Ok(())
    }
}
