//! Block pipeline driver.
//!
//! Writes an [`ImageView`] into an [`ImageResource`] one block at a time.
//!
//! # Architecture
//!
//! ```text
//!                 ┌──────────────────────────┐
//!   BlockGrid ──► │ FifoWorkQueue (N threads)│  RasterizeBlockTask
//!   row-major     │ rasterize, any order     │
//!                 └────────────┬─────────────┘
//!                              │ gate.admit(index)
//!                              ▼
//!                 ┌──────────────────────────┐
//!                 │ OrderedWorkQueue         │  WriteBlockTask
//!                 │ 1 writer, index order    │ ──► resource.write
//!                 └────────────┬─────────────┘
//!                              │ ticket dropped
//!                              ▼
//!                     gate.release()
//! ```
//!
//! The writer thread is the only thread that touches the resource, so the
//! resource needs no locking. The view is shared by every rasterize worker.
//!
//! [`write_image`] is the single-threaded fallback. It produces the same
//! writes in the same order and is the reference the threaded path is
//! tested against.

use std::thread;
use std::time::{Duration, Instant};

use crate::config::WriterConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::gate::AdmissionGate;
use crate::grid::BlockGrid;
use crate::progress::ProgressCallback;
use crate::queue::{FifoWorkQueue, OrderedWorkQueue};
use crate::resource::ImageResource;
use crate::task::{RasterizeBlockTask, RunControl, WriteBlockTask};
use crate::view::ImageView;

/// Name of the writer thread.
const WRITER_THREAD_NAME: &str = "block-writer";

/// Prefix for rasterize worker thread names.
const RASTERIZE_THREAD_LABEL: &str = "rasterize";

/// Summary of a completed write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteReport {
    /// Blocks written.
    pub blocks: usize,
    /// Resource width.
    pub cols: u32,
    /// Resource height.
    pub rows: u32,
    /// Wall time for the whole run.
    pub elapsed: Duration,
}

/// Rejects images with no pixels.
fn validate_view<V: ImageView + ?Sized>(view: &V) -> PipelineResult<()> {
    if view.cols() == 0 || view.rows() == 0 || view.planes() == 0 {
        return Err(PipelineError::Usage(format!(
            "cannot write an empty image ({}×{}, {} planes)",
            view.cols(),
            view.rows(),
            view.planes()
        )));
    }
    Ok(())
}

/// Reports 0% and fails if the caller already asked to stop.
fn start_run(progress: &dyn ProgressCallback) -> PipelineResult<()> {
    progress.report_progress(0.0);
    if progress.abort_requested() {
        tracing::warn!("Abort requested before any block was queued");
        return Err(PipelineError::Aborted);
    }
    Ok(())
}

/// Parallel block writer.
///
/// Owns the rasterize thread pool, so one writer can be reused for many
/// images without respawning threads. Each call to [`write`](Self::write)
/// gets its own gate and writer thread.
#[derive(Debug)]
pub struct ThreadedBlockWriter {
    config: WriterConfig,
    rasterize_queue: FifoWorkQueue,
}

impl ThreadedBlockWriter {
    /// Creates a writer with `config.threads()` rasterize workers.
    pub fn new(config: WriterConfig) -> PipelineResult<Self> {
        let rasterize_queue = FifoWorkQueue::new(config.threads(), RASTERIZE_THREAD_LABEL)?;
        Ok(Self {
            config,
            rasterize_queue,
        })
    }

    pub fn config(&self) -> &WriterConfig {
        &self.config
    }

    /// Writes `view` into `resource` block by block.
    ///
    /// Blocks are rasterized in parallel and written in ascending index
    /// order. Returns once every block has been written, or with the first
    /// error. The abort signal is checked before each submission and again
    /// before each block starts rasterizing. Once it is seen, no further
    /// block starts, blocks already admitted to the write stage are written,
    /// and the run returns [`PipelineError::Aborted`]. The written blocks
    /// always form a prefix of the grid.
    ///
    /// # Errors
    ///
    /// - `Usage` - empty view or zero block size
    /// - `Aborted` - the progress callback requested cancellation
    /// - `Rasterize` / `Write` - a block failed; the run stops
    /// - `WorkerPanicked` - the view or resource panicked; the run stops
    pub fn write<R, V>(
        &self,
        resource: &mut R,
        view: &V,
        progress: &dyn ProgressCallback,
    ) -> PipelineResult<WriteReport>
    where
        R: ImageResource + Send,
        V: ImageView<Pixel = R::Pixel>,
    {
        let started = Instant::now();
        validate_view(view)?;
        start_run(progress)?;

        let grid = BlockGrid::new(resource.cols(), resource.rows(), resource.block_size())?;
        let total = grid.len();
        tracing::info!(
            blocks = total,
            extent = %grid.extent(),
            block_size = %grid.block_size(),
            threads = self.rasterize_queue.num_threads(),
            max_in_flight = self.config.max_in_flight(),
            "Writing image in blocks"
        );

        let gate = AdmissionGate::new(self.config.max_in_flight());
        let control = RunControl::new(&gate);
        let control = &control;
        let write_queue: OrderedWorkQueue<WriteBlockTask<'_, R::Pixel>> = OrderedWorkQueue::new();

        let (rasterized, written) = thread::scope(|scope| {
            let writer = write_queue.spawn_worker(scope, WRITER_THREAD_NAME, move |index, task| {
                tracing::debug!(index, bbox = %task.block().bbox, "Writing block");
                let result = task.run(&mut *resource);
                if let Err(error) = &result {
                    tracing::error!(index, error = %error, "Write failed");
                    control.fail();
                }
                result
            })?;

            let rasterized = self.rasterize_queue.join_all(|batch| {
                for block in grid.iter() {
                    if control.should_stop() {
                        tracing::debug!(index = block.index, "Run stopped; stopping submission");
                        break;
                    }
                    if progress.abort_requested() {
                        tracing::warn!(index = block.index, "Abort requested; stopping submission");
                        control.abort();
                        break;
                    }
                    tracing::debug!(index = block.index, bbox = %block.bbox, "Submitting block");
                    let task = RasterizeBlockTask::new(block, total, view, control, progress);
                    let write_queue = &write_queue;
                    batch.add_task(move || task.run(write_queue));
                }
            });

            let written = writer.join_all();
            Ok::<_, PipelineError>((rasterized, written))
        })?;

        // A task only returns an error if it was the one that failed the run
        let submitted = rasterized?;
        let blocks = written?;
        if control.is_aborted() {
            tracing::warn!(submitted, written = blocks, total, "Block write aborted");
            return Err(PipelineError::Aborted);
        }
        debug_assert_eq!(blocks, total, "every block must be written exactly once");

        progress.report_finished();
        let elapsed = started.elapsed();
        tracing::info!(
            blocks,
            elapsed_ms = elapsed.as_millis() as u64,
            peak_in_flight = gate.stats().peak_in_flight,
            "Image written"
        );

        Ok(WriteReport {
            blocks,
            cols: grid.extent().width,
            rows: grid.extent().height,
            elapsed,
        })
    }
}

/// Writes `view` into `resource` with a one-off [`ThreadedBlockWriter`].
pub fn block_write_image<R, V>(
    resource: &mut R,
    view: &V,
    progress: &dyn ProgressCallback,
    config: &WriterConfig,
) -> PipelineResult<WriteReport>
where
    R: ImageResource + Send,
    V: ImageView<Pixel = R::Pixel>,
{
    ThreadedBlockWriter::new(config.clone())?.write(resource, view, progress)
}

/// Writes `view` into `resource` on the calling thread.
///
/// Each block is rasterized and written before the next one starts. The
/// abort signal is checked before every block, so an aborted run never
/// leaves a partially written block.
pub fn write_image<R, V>(
    resource: &mut R,
    view: &V,
    progress: &dyn ProgressCallback,
) -> PipelineResult<WriteReport>
where
    R: ImageResource + ?Sized,
    V: ImageView<Pixel = R::Pixel> + ?Sized,
{
    let started = Instant::now();
    validate_view(view)?;
    start_run(progress)?;

    let grid = BlockGrid::new(resource.cols(), resource.rows(), resource.block_size())?;
    let total = grid.len();
    tracing::info!(blocks = total, extent = %grid.extent(), "Writing image sequentially");

    for block in grid.iter() {
        if progress.abort_requested() {
            tracing::warn!(index = block.index, total, "Block write aborted");
            return Err(PipelineError::Aborted);
        }
        progress.report_progress(block.index as f64 / total as f64);

        let buffer = view
            .rasterize(block.bbox)
            .map_err(|source| PipelineError::Rasterize {
                index: block.index,
                source,
            })?;
        resource
            .write(&buffer, block.bbox)
            .map_err(|source| PipelineError::Write {
                index: block.index,
                source,
            })?;
    }

    progress.report_finished();
    let elapsed = started.elapsed();
    tracing::info!(blocks = total, elapsed_ms = elapsed.as_millis() as u64, "Image written");

    Ok(WriteReport {
        blocks: total,
        cols: grid.extent().width,
        rows: grid.extent().height,
        elapsed,
    })
}
