//! Whole-image and region reads from a resource.

use crate::buffer::PixelBuffer;
use crate::error::{PipelineError, PipelineResult};
use crate::geometry::BBox;
use crate::resource::ImageResource;

/// Reads the entire resource into a new buffer.
pub fn read_image<R>(resource: &R) -> PipelineResult<PixelBuffer<R::Pixel>>
where
    R: ImageResource + ?Sized,
{
    read_image_region(resource, BBox::new(0, 0, resource.cols(), resource.rows()))
}

/// Reads `bbox` from the resource into a new buffer.
///
/// # Errors
///
/// - `Usage` - `bbox` is empty or not inside the resource
/// - `Read` - the resource failed to read
pub fn read_image_region<R>(resource: &R, bbox: BBox) -> PipelineResult<PixelBuffer<R::Pixel>>
where
    R: ImageResource + ?Sized,
{
    let bounds = BBox::new(0, 0, resource.cols(), resource.rows());
    if bbox.is_empty() || !bounds.contains(&bbox) {
        return Err(PipelineError::Usage(format!(
            "region {} is not inside the {}×{} image",
            bbox,
            resource.cols(),
            resource.rows()
        )));
    }

    let mut buffer = PixelBuffer::new(bbox.width, bbox.height, resource.planes());
    resource
        .read(&mut buffer, bbox)
        .map_err(PipelineError::Read)?;
    tracing::debug!(bbox = %bbox, "Read image region");
    Ok(buffer)
}
