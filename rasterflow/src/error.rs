//! Error types for the block pipeline and its collaborators.

use thiserror::Error;

use crate::geometry::BBox;

/// Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Errors surfaced by the block pipeline entry points.
///
/// Every run either writes the whole image or returns exactly one of these,
/// identifying the stage that failed.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Invalid input detected before any work started.
    #[error("Usage error: {0}")]
    Usage(String),

    /// The progress collaborator requested cancellation.
    #[error("Aborted by progress callback")]
    Aborted,

    /// A block could not be rasterized from the source view.
    #[error("Failed to rasterize block {index}: {source}")]
    Rasterize {
        index: usize,
        #[source]
        source: ViewError,
    },

    /// A block could not be written to the destination resource.
    #[error("Failed to write block {index}: {source}")]
    Write {
        index: usize,
        #[source]
        source: ResourceError,
    },

    /// Reading a region from a resource failed.
    #[error("Failed to read from resource: {0}")]
    Read(#[source] ResourceError),

    /// The worker threads could not be started.
    #[error("Failed to start worker threads: {0}")]
    ThreadPool(String),

    /// A worker thread panicked.
    #[error("Worker thread panicked: {0}")]
    WorkerPanicked(&'static str),
}

impl PipelineError {
    /// Block index associated with a task failure, if any.
    pub fn block_index(&self) -> Option<usize> {
        match self {
            Self::Rasterize { index, .. } | Self::Write { index, .. } => Some(*index),
            _ => None,
        }
    }

    /// Returns true if the run was cancelled by the caller.
    pub fn is_aborted(&self) -> bool {
        matches!(self, Self::Aborted)
    }
}

/// Errors produced while evaluating an image view over a region.
#[derive(Debug, Error)]
pub enum ViewError {
    /// The requested region is not inside the view.
    #[error("Region {bbox} is outside the {cols}×{rows} view")]
    OutOfBounds { bbox: BBox, cols: u32, rows: u32 },

    /// The processing graph failed to produce pixels.
    #[error("Evaluation failed: {0}")]
    Evaluation(String),

    /// An upstream resource read failed.
    #[error("Upstream read failed: {0}")]
    Upstream(#[from] ResourceError),
}

/// Errors produced by image resources.
#[derive(Debug, Error)]
pub enum ResourceError {
    /// The region is not inside the resource.
    #[error("Region {bbox} is outside the {cols}×{rows} resource")]
    OutOfBounds { bbox: BBox, cols: u32, rows: u32 },

    /// The buffer does not match the region it is written to or read from.
    #[error(
        "Buffer is {actual_cols}×{actual_rows}×{actual_planes}, \
         expected {expected_cols}×{expected_rows}×{expected_planes}"
    )]
    DimensionMismatch {
        expected_cols: u32,
        expected_rows: u32,
        expected_planes: u32,
        actual_cols: u32,
        actual_rows: u32,
        actual_planes: u32,
    },

    /// I/O error from a file-backed resource.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Image encoding or decoding error.
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// Backend-specific failure.
    #[error("Resource backend error: {0}")]
    Backend(String),
}
