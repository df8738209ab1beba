//! In-memory image resource.

use crate::buffer::{Pixel, PixelBuffer};
use crate::error::ResourceError;
use crate::geometry::{BBox, Extent};

use super::{check_bounds, check_shape, ImageResource};

/// An image resource held entirely in memory.
///
/// Every successful write is appended to a write log, which makes this the
/// instrumented resource used to observe block ordering. It can also be told
/// to fail a specific write call, or every read, to exercise error paths.
#[derive(Debug, Clone)]
pub struct MemoryResource<P: Pixel> {
    image: PixelBuffer<P>,
    block_size: Extent,
    write_log: Vec<BBox>,
    write_calls: usize,
    fail_write_at: Option<usize>,
    fail_reads: bool,
}

impl<P: Pixel> MemoryResource<P> {
    /// Creates a default-filled resource.
    pub fn new(cols: u32, rows: u32, planes: u32, block_size: Extent) -> Self {
        Self::from_buffer(PixelBuffer::new(cols, rows, planes), block_size)
    }

    /// Wraps an existing buffer.
    pub fn from_buffer(image: PixelBuffer<P>, block_size: Extent) -> Self {
        Self {
            image,
            block_size,
            write_log: Vec::new(),
            write_calls: 0,
            fail_write_at: None,
            fail_reads: false,
        }
    }

    /// Makes the `call`-th write (0-based) fail with a backend error.
    pub fn with_write_failure_at(mut self, call: usize) -> Self {
        self.fail_write_at = Some(call);
        self
    }

    /// Makes every read fail with a backend error.
    pub fn with_read_failure(mut self) -> Self {
        self.fail_reads = true;
        self
    }

    /// Regions written so far, in call order.
    pub fn write_log(&self) -> &[BBox] {
        &self.write_log
    }

    /// Number of successful writes.
    pub fn write_count(&self) -> usize {
        self.write_log.len()
    }

    /// Current image contents.
    pub fn image(&self) -> &PixelBuffer<P> {
        &self.image
    }

    /// Consumes the resource and returns its contents.
    pub fn into_image(self) -> PixelBuffer<P> {
        self.image
    }
}

impl<P: Pixel> ImageResource for MemoryResource<P> {
    type Pixel = P;

    fn cols(&self) -> u32 {
        self.image.cols()
    }

    fn rows(&self) -> u32 {
        self.image.rows()
    }

    fn planes(&self) -> u32 {
        self.image.planes()
    }

    fn block_size(&self) -> Extent {
        self.block_size
    }

    fn read(&self, buffer: &mut PixelBuffer<P>, bbox: BBox) -> Result<(), ResourceError> {
        if self.fail_reads {
            return Err(ResourceError::Backend("simulated read failure".to_string()));
        }
        check_bounds(bbox, self.cols(), self.rows())?;
        check_shape(buffer, bbox, self.planes())?;
        if let Some(region) = self.image.crop(bbox) {
            *buffer = region;
        }
        Ok(())
    }

    fn write(&mut self, buffer: &PixelBuffer<P>, bbox: BBox) -> Result<(), ResourceError> {
        let call = self.write_calls;
        self.write_calls += 1;
        if self.fail_write_at == Some(call) {
            return Err(ResourceError::Backend(format!(
                "simulated failure on write {}",
                call
            )));
        }
        check_bounds(bbox, self.cols(), self.rows())?;
        check_shape(buffer, bbox, self.planes())?;
        self.image.paste(buffer, bbox.x, bbox.y);
        self.write_log.push(bbox);
        Ok(())
    }
}
