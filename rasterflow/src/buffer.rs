//! Concrete pixel storage.
//!
//! A [`PixelBuffer`] is a fully materialized `cols × rows × planes` array of
//! pixels. Rasterize tasks produce one per block and move it into the write
//! task that consumes it, so a buffer is never shared between threads.

use crate::geometry::{BBox, Extent};

/// A pixel value that can flow through the pipeline.
pub trait Pixel: Copy + Default + PartialEq + Send + Sync + std::fmt::Debug + 'static {
    /// Number of channels per pixel.
    const CHANNELS: usize;
}

impl Pixel for u8 {
    const CHANNELS: usize = 1;
}

impl Pixel for u16 {
    const CHANNELS: usize = 1;
}

impl Pixel for u32 {
    const CHANNELS: usize = 1;
}

impl Pixel for f32 {
    const CHANNELS: usize = 1;
}

impl Pixel for [u8; 3] {
    const CHANNELS: usize = 3;
}

impl Pixel for [u8; 4] {
    const CHANNELS: usize = 4;
}

impl Pixel for [f32; 3] {
    const CHANNELS: usize = 3;
}

/// RGBA pixel with 8 bits per channel.
pub type Rgba8 = [u8; 4];

/// A dense, plane-major pixel array.
///
/// Pixels are stored plane by plane, each plane in row-major order.
#[derive(Debug, Clone, PartialEq)]
pub struct PixelBuffer<P> {
    cols: u32,
    rows: u32,
    planes: u32,
    data: Vec<P>,
}

impl<P: Pixel> PixelBuffer<P> {
    /// Creates a buffer filled with the default pixel value.
    pub fn new(cols: u32, rows: u32, planes: u32) -> Self {
        let len = cols as usize * rows as usize * planes as usize;
        Self {
            cols,
            rows,
            planes,
            data: vec![P::default(); len],
        }
    }

    /// Creates a buffer by evaluating `f(x, y, plane)` for every pixel.
    pub fn from_fn<F>(cols: u32, rows: u32, planes: u32, mut f: F) -> Self
    where
        F: FnMut(u32, u32, u32) -> P,
    {
        let mut data = Vec::with_capacity(cols as usize * rows as usize * planes as usize);
        for plane in 0..planes {
            for y in 0..rows {
                for x in 0..cols {
                    data.push(f(x, y, plane));
                }
            }
        }
        Self {
            cols,
            rows,
            planes,
            data,
        }
    }

    /// Wraps existing pixel data.
    ///
    /// Returns `None` if `data` does not hold exactly `cols × rows × planes`
    /// pixels.
    pub fn from_vec(cols: u32, rows: u32, planes: u32, data: Vec<P>) -> Option<Self> {
        if data.len() != cols as usize * rows as usize * planes as usize {
            return None;
        }
        Some(Self {
            cols,
            rows,
            planes,
            data,
        })
    }

    pub fn cols(&self) -> u32 {
        self.cols
    }

    pub fn rows(&self) -> u32 {
        self.rows
    }

    pub fn planes(&self) -> u32 {
        self.planes
    }

    /// Size of one plane.
    pub fn extent(&self) -> Extent {
        Extent::new(self.cols, self.rows)
    }

    /// Returns true if the buffer holds no pixels.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Raw pixel data, plane-major.
    pub fn data(&self) -> &[P] {
        &self.data
    }

    /// Consumes the buffer and returns its pixel data.
    pub fn into_vec(self) -> Vec<P> {
        self.data
    }

    fn offset(&self, x: u32, y: u32, plane: u32) -> usize {
        (plane as usize * self.rows as usize + y as usize) * self.cols as usize + x as usize
    }

    /// Returns the pixel at `(x, y)` in `plane`, or `None` if out of range.
    pub fn get(&self, x: u32, y: u32, plane: u32) -> Option<P> {
        if x >= self.cols || y >= self.rows || plane >= self.planes {
            return None;
        }
        Some(self.data[self.offset(x, y, plane)])
    }

    /// Sets the pixel at `(x, y)` in `plane`. Returns false if out of range.
    pub fn set(&mut self, x: u32, y: u32, plane: u32, value: P) -> bool {
        if x >= self.cols || y >= self.rows || plane >= self.planes {
            return false;
        }
        let offset = self.offset(x, y, plane);
        self.data[offset] = value;
        true
    }

    /// One row of one plane.
    pub fn row(&self, y: u32, plane: u32) -> &[P] {
        let start = self.offset(0, y, plane);
        &self.data[start..start + self.cols as usize]
    }

    fn row_mut(&mut self, y: u32, plane: u32) -> &mut [P] {
        let start = self.offset(0, y, plane);
        let cols = self.cols as usize;
        &mut self.data[start..start + cols]
    }

    /// Copies the region `bbox` into a new buffer.
    ///
    /// Returns `None` unless `bbox` lies inside this buffer.
    pub fn crop(&self, bbox: BBox) -> Option<Self> {
        if !BBox::from_extent(self.extent()).contains(&bbox) {
            return None;
        }
        let mut out = Self::new(bbox.width, bbox.height, self.planes);
        for plane in 0..self.planes {
            for row in 0..bbox.height {
                let src = self.row(bbox.y + row, plane);
                let start = bbox.x as usize;
                out.row_mut(row, plane)
                    .copy_from_slice(&src[start..start + bbox.width as usize]);
            }
        }
        Some(out)
    }

    /// Copies `src` into this buffer with its top-left corner at `(x, y)`.
    ///
    /// Returns false, leaving the buffer untouched, if `src` does not fit or
    /// has a different plane count.
    pub fn paste(&mut self, src: &PixelBuffer<P>, x: u32, y: u32) -> bool {
        let target = BBox::new(x, y, src.cols, src.rows);
        if src.planes != self.planes || !BBox::from_extent(self.extent()).contains(&target) {
            return false;
        }
        for plane in 0..self.planes {
            for row in 0..src.rows {
                let start = x as usize;
                let width = src.cols as usize;
                self.row_mut(y + row, plane)[start..start + width]
                    .copy_from_slice(src.row(row, plane));
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(cols: u32, rows: u32) -> PixelBuffer<u16> {
        PixelBuffer::from_fn(cols, rows, 1, |x, y, _| (y * cols + x) as u16)
    }

    #[test]
    fn test_new_is_default_filled() {
        let buf: PixelBuffer<u8> = PixelBuffer::new(4, 3, 2);
        assert_eq!(buf.data().len(), 24);
        assert!(buf.data().iter().all(|&p| p == 0));
    }

    #[test]
    fn test_from_vec_rejects_wrong_length() {
        assert!(PixelBuffer::from_vec(2, 2, 1, vec![0u8; 3]).is_none());
        assert!(PixelBuffer::from_vec(2, 2, 1, vec![0u8; 4]).is_some());
    }

    #[test]
    fn test_get_set() {
        let mut buf: PixelBuffer<u8> = PixelBuffer::new(3, 3, 2);
        assert!(buf.set(2, 1, 1, 9));
        assert_eq!(buf.get(2, 1, 1), Some(9));
        assert_eq!(buf.get(2, 1, 0), Some(0));
        assert_eq!(buf.get(3, 0, 0), None);
        assert!(!buf.set(0, 0, 2, 1));
    }

    #[test]
    fn test_planes_are_stored_plane_major() {
        let buf = PixelBuffer::from_fn(2, 1, 2, |x, _, plane| (plane * 10 + x) as u8);
        assert_eq!(buf.data(), &[0, 1, 10, 11]);
    }

    #[test]
    fn test_crop() {
        let buf = ramp(5, 5);
        let crop = buf.crop(BBox::new(3, 3, 2, 2)).unwrap();
        assert_eq!(crop.data(), &[18, 19, 23, 24]);
    }

    #[test]
    fn test_crop_outside_is_none() {
        let buf = ramp(5, 5);
        assert!(buf.crop(BBox::new(4, 4, 2, 2)).is_none());
    }

    #[test]
    fn test_paste_round_trip() {
        let src = ramp(5, 5);
        let mut dst: PixelBuffer<u16> = PixelBuffer::new(5, 5, 1);
        for bbox in [
            BBox::new(0, 0, 3, 3),
            BBox::new(3, 0, 2, 3),
            BBox::new(0, 3, 3, 2),
            BBox::new(3, 3, 2, 2),
        ] {
            let block = src.crop(bbox).unwrap();
            assert!(dst.paste(&block, bbox.x, bbox.y));
        }
        assert_eq!(dst, src);
    }

    #[test]
    fn test_paste_rejects_overflow() {
        let src = ramp(3, 3);
        let mut dst: PixelBuffer<u16> = PixelBuffer::new(4, 4, 1);
        assert!(!dst.paste(&src, 2, 2));
        assert!(dst.data().iter().all(|&p| p == 0));
    }
}
