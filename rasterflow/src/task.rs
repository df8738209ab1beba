//! The two block task types.
//!
//! A block passes through two tasks on its way to the resource:
//!
//! ```text
//! RasterizeBlockTask ──(gate.admit)──► WriteBlockTask ──► resource.write
//!   any worker thread                  the writer thread only
//! ```
//!
//! The pixel buffer is moved from one to the other, never shared, and the
//! admission ticket travels with it so the gate slot is released exactly
//! once, after the write.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};

use crate::buffer::{Pixel, PixelBuffer};
use crate::error::{PipelineError, ViewError};
use crate::gate::{AdmissionGate, AdmissionTicket};
use crate::grid::Block;
use crate::progress::{ProgressCallback, SubProgress};
use crate::queue::OrderedWorkQueue;
use crate::resource::ImageResource;
use crate::view::ImageView;

/// Reported when a view panics while rasterizing a block.
pub const RASTERIZE_PANIC: &str = "rasterize worker";

/// Reported when a resource panics while writing a block.
pub const WRITE_PANIC: &str = "block writer";

/// Shared state of one pipeline run.
///
/// Once any task fails, the run is marked failed and the gate is closed so
/// blocked workers wake up and remaining tasks skip their work. An abort
/// closes the gate the same way but is reported as a cancellation.
#[derive(Debug)]
pub struct RunControl<'a> {
    gate: &'a AdmissionGate,
    failed: AtomicBool,
    aborted: AtomicBool,
}

impl<'a> RunControl<'a> {
    pub fn new(gate: &'a AdmissionGate) -> Self {
        Self {
            gate,
            failed: AtomicBool::new(false),
            aborted: AtomicBool::new(false),
        }
    }

    /// The admission gate for this run.
    pub fn gate(&self) -> &'a AdmissionGate {
        self.gate
    }

    /// Marks the run failed and closes the gate.
    ///
    /// Returns true for the call that actually failed the run, so only the
    /// first failure is surfaced.
    pub fn fail(&self) -> bool {
        let first = !self.failed.swap(true, Ordering::SeqCst);
        if first {
            self.gate.close();
        }
        first
    }

    /// Returns true once any task has failed.
    pub fn has_failed(&self) -> bool {
        self.failed.load(Ordering::SeqCst)
    }

    /// Marks the run aborted and closes the gate.
    ///
    /// Blocks already admitted are still written; blocks waiting at the gate
    /// are dropped. The writes that reach the resource stay a prefix of the
    /// grid because the writer never skips an index.
    pub fn abort(&self) {
        if !self.aborted.swap(true, Ordering::SeqCst) {
            tracing::warn!("Abort requested; no further blocks will start");
            self.gate.close();
        }
    }

    /// Returns true once the run has been aborted.
    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }

    /// Returns true if new blocks should not start.
    pub fn should_stop(&self) -> bool {
        self.has_failed() || self.is_aborted()
    }
}

/// Materializes one block and hands it to the write stage.
pub struct RasterizeBlockTask<'a, V> {
    block: Block,
    view: &'a V,
    control: &'a RunControl<'a>,
    progress: SubProgress<'a>,
}

impl<'a, V: ImageView> RasterizeBlockTask<'a, V> {
    /// Creates the task for `block`, which is one of `total_blocks`.
    pub fn new(
        block: Block,
        total_blocks: usize,
        view: &'a V,
        control: &'a RunControl<'a>,
        progress: &'a dyn ProgressCallback,
    ) -> Self {
        let share = 1.0 / total_blocks.max(1) as f64;
        Self {
            block,
            view,
            control,
            progress: SubProgress::new(progress, 0.0, share),
        }
    }

    pub fn block(&self) -> Block {
        self.block
    }

    /// Rasterizes the block, waits for admission, and submits the write.
    ///
    /// Returns without doing anything if the run has already failed or been
    /// aborted, and drops the buffer if the gate closes while waiting. A view
    /// error or panic marks the run failed and is returned, unless the run
    /// had already failed.
    pub fn run(
        self,
        write_queue: &OrderedWorkQueue<WriteBlockTask<'a, V::Pixel>>,
    ) -> Result<(), PipelineError> {
        let Block { index, bbox } = self.block;
        if self.control.has_failed() {
            tracing::trace!(index, "Run failed; skipping rasterize");
            return Ok(());
        }
        if self.control.is_aborted() || self.progress.abort_requested() {
            tracing::debug!(index, "Run aborted; skipping rasterize");
            self.control.abort();
            return Ok(());
        }

        // The view and progress callback are caller code running on a pool
        // thread; a panic there must still close the gate
        let rasterized = panic::catch_unwind(AssertUnwindSafe(|| {
            let buffer = self.view.rasterize(bbox)?;
            self.progress.report_incremental_progress(1.0);
            Ok::<_, ViewError>(buffer)
        }));

        let buffer = match rasterized {
            Ok(Ok(buffer)) => buffer,
            Ok(Err(source)) => {
                tracing::error!(index, bbox = %bbox, error = %source, "Rasterize failed");
                if !self.control.fail() {
                    // Another task already failed the run and owns the error
                    return Ok(());
                }
                return Err(PipelineError::Rasterize { index, source });
            }
            Err(_) => {
                tracing::error!(index, bbox = %bbox, "Rasterize panicked");
                if !self.control.fail() {
                    return Ok(());
                }
                return Err(PipelineError::WorkerPanicked(RASTERIZE_PANIC));
            }
        };

        let ticket = match self.control.gate().admit(index) {
            Ok(ticket) => ticket,
            Err(_) => {
                tracing::debug!(index, "Gate closed; dropping rasterized block");
                return Ok(());
            }
        };

        tracing::trace!(index, "Block admitted to write stage");
        write_queue.add_task(
            index,
            WriteBlockTask {
                block: self.block,
                buffer,
                ticket,
            },
        );
        Ok(())
    }
}

/// Writes one rasterized block to the destination resource.
pub struct WriteBlockTask<'a, P> {
    block: Block,
    buffer: PixelBuffer<P>,
    ticket: AdmissionTicket<'a>,
}

impl<P: Pixel> WriteBlockTask<'_, P> {
    pub fn block(&self) -> Block {
        self.block
    }

    /// Writes the buffer at the block's region, then releases the block's
    /// gate slot even if the write fails or panics.
    pub fn run<R>(self, resource: &mut R) -> Result<(), PipelineError>
    where
        R: ImageResource<Pixel = P> + ?Sized,
    {
        let Self {
            block,
            buffer,
            ticket,
        } = self;
        let result = panic::catch_unwind(AssertUnwindSafe(|| resource.write(&buffer, block.bbox)));
        drop(buffer);
        drop(ticket);

        match result {
            Ok(result) => result.map_err(|source| PipelineError::Write {
                index: block.index,
                source,
            }),
            Err(_) => {
                tracing::error!(index = block.index, bbox = %block.bbox, "Write panicked");
                Err(PipelineError::WorkerPanicked(WRITE_PANIC))
            }
        }
    }
}
