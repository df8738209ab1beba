//! RasterFlow - parallel block-based image writing
//!
//! Writes a lazily evaluated image into a destination resource one block at
//! a time. Blocks are rasterized on a pool of worker threads in any order,
//! then written by a single writer thread in strict block-index order, with
//! an admission gate bounding how many finished blocks wait in memory.
//!
//! # Example
//!
//! ```
//! use rasterflow::geometry::Extent;
//! use rasterflow::progress::NullProgress;
//! use rasterflow::resource::MemoryResource;
//! use rasterflow::view::FnView;
//! use rasterflow::{block_write_image, WriterConfig};
//!
//! let view = FnView::new(100, 60, |x, y, _| (x ^ y) as u8);
//! let mut resource = MemoryResource::new(100, 60, 1, Extent::square(32));
//! let config = WriterConfig::new().with_threads(4);
//!
//! let report = block_write_image(&mut resource, &view, &NullProgress, &config).unwrap();
//! assert_eq!(report.blocks, 8);
//! assert_eq!(resource.image().get(99, 59, 0), Some(99 ^ 59));
//! ```

pub mod buffer;
pub mod config;
pub mod error;
pub mod gate;
pub mod geometry;
pub mod grid;
pub mod io;
pub mod logging;
pub mod progress;
pub mod queue;
pub mod resource;
pub mod task;
pub mod view;
pub mod writer;

pub use config::{ConfigFile, WriterConfig};
pub use error::{PipelineError, PipelineResult};
pub use writer::{block_write_image, write_image, ThreadedBlockWriter, WriteReport};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
