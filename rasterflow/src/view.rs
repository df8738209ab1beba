//! Image views: lazy pixel sources the pipeline rasterizes block by block.
//!
//! An [`ImageView`] turns a rectangular region into a concrete
//! [`PixelBuffer`]. Rasterize workers call it concurrently for different
//! blocks, so implementations must be `Sync` and must not rely on call order.
//!
//! # Implementors
//!
//! - [`FnView`] - evaluates a closure per pixel (procedural images)
//! - [`ResourceView`] - pulls pixels from another resource
//! - [`PixelBuffer`] - crops an already materialized image

use std::marker::PhantomData;

use crate::buffer::{Pixel, PixelBuffer};
use crate::error::ViewError;
use crate::geometry::BBox;
use crate::resource::ImageResource;

/// A pixel source that can be evaluated over any region.
pub trait ImageView: Sync {
    /// Pixel type produced by this view.
    type Pixel: Pixel;

    /// Width in pixels.
    fn cols(&self) -> u32;

    /// Height in pixels.
    fn rows(&self) -> u32;

    /// Number of planes.
    fn planes(&self) -> u32 {
        1
    }

    /// Materializes exactly the region `bbox`.
    ///
    /// # Errors
    ///
    /// Returns `ViewError` if the region is outside the view or the
    /// underlying computation or read fails.
    fn rasterize(&self, bbox: BBox) -> Result<PixelBuffer<Self::Pixel>, ViewError>;
}

fn check_region<V: ImageView + ?Sized>(view: &V, bbox: BBox) -> Result<(), ViewError> {
    if BBox::new(0, 0, view.cols(), view.rows()).contains(&bbox) {
        Ok(())
    } else {
        Err(ViewError::OutOfBounds {
            bbox,
            cols: view.cols(),
            rows: view.rows(),
        })
    }
}

/// A procedural view computing each pixel with `f(x, y, plane)`.
pub struct FnView<P, F> {
    cols: u32,
    rows: u32,
    planes: u32,
    f: F,
    _pixel: PhantomData<fn() -> P>,
}

impl<P, F> FnView<P, F>
where
    P: Pixel,
    F: Fn(u32, u32, u32) -> P + Sync,
{
    /// Creates a single-plane procedural view.
    pub fn new(cols: u32, rows: u32, f: F) -> Self {
        Self::with_planes(cols, rows, 1, f)
    }

    /// Creates a procedural view with `planes` planes.
    pub fn with_planes(cols: u32, rows: u32, planes: u32, f: F) -> Self {
        Self {
            cols,
            rows,
            planes,
            f,
            _pixel: PhantomData,
        }
    }
}

impl<P, F> ImageView for FnView<P, F>
where
    P: Pixel,
    F: Fn(u32, u32, u32) -> P + Sync,
{
    type Pixel = P;

    fn cols(&self) -> u32 {
        self.cols
    }

    fn rows(&self) -> u32 {
        self.rows
    }

    fn planes(&self) -> u32 {
        self.planes
    }

    fn rasterize(&self, bbox: BBox) -> Result<PixelBuffer<P>, ViewError> {
        check_region(self, bbox)?;
        Ok(PixelBuffer::from_fn(
            bbox.width,
            bbox.height,
            self.planes,
            |x, y, plane| (self.f)(bbox.x + x, bbox.y + y, plane),
        ))
    }
}

/// A view that reads its pixels from an image resource.
///
/// Read failures surface as [`ViewError::Upstream`].
pub struct ResourceView<'a, R> {
    resource: &'a R,
}

impl<'a, R> ResourceView<'a, R>
where
    R: ImageResource + Sync,
{
    pub fn new(resource: &'a R) -> Self {
        Self { resource }
    }
}

impl<R> ImageView for ResourceView<'_, R>
where
    R: ImageResource + Sync,
{
    type Pixel = R::Pixel;

    fn cols(&self) -> u32 {
        self.resource.cols()
    }

    fn rows(&self) -> u32 {
        self.resource.rows()
    }

    fn planes(&self) -> u32 {
        self.resource.planes()
    }

    fn rasterize(&self, bbox: BBox) -> Result<PixelBuffer<R::Pixel>, ViewError> {
        check_region(self, bbox)?;
        let mut buffer = PixelBuffer::new(bbox.width, bbox.height, self.planes());
        self.resource.read(&mut buffer, bbox)?;
        Ok(buffer)
    }
}

impl<P: Pixel> ImageView for PixelBuffer<P> {
    type Pixel = P;

    fn cols(&self) -> u32 {
        PixelBuffer::cols(self)
    }

    fn rows(&self) -> u32 {
        PixelBuffer::rows(self)
    }

    fn planes(&self) -> u32 {
        PixelBuffer::planes(self)
    }

    fn rasterize(&self, bbox: BBox) -> Result<PixelBuffer<P>, ViewError> {
        check_region(self, bbox)?;
        self.crop(bbox).ok_or(ViewError::OutOfBounds {
            bbox,
            cols: PixelBuffer::cols(self),
            rows: PixelBuffer::rows(self),
        })
    }
}
