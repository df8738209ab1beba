//! Integration tests for the block pipeline.
//!
//! These tests drive the public entry points end to end:
//! - block decomposition and strictly ordered writes
//! - out-of-order rasterization with randomized block costs
//! - error propagation from views and resources
//! - cancellation before and during a run
//! - PNG output through the `image` crate
//!
//! Run with: `cargo test --test pipeline_integration`

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use rand::Rng;
use tempfile::TempDir;

use rasterflow::buffer::{PixelBuffer, Rgba8};
use rasterflow::error::ViewError;
use rasterflow::geometry::{BBox, Extent};
use rasterflow::grid::BlockGrid;
use rasterflow::io::read_image;
use rasterflow::progress::{NullProgress, ProgressCallback, ProgressCounter};
use rasterflow::resource::{ImageResource, MemoryResource, PngResource};
use rasterflow::view::{FnView, ImageView, ResourceView};
use rasterflow::{block_write_image, write_image, PipelineError, ThreadedBlockWriter, WriterConfig};

// ============================================================================
// Helper Functions
// ============================================================================

fn config(threads: usize, max_in_flight: usize) -> WriterConfig {
    WriterConfig::new()
        .with_threads(threads)
        .with_max_in_flight(max_in_flight)
}

fn pixel(x: u32, y: u32, plane: u32) -> u32 {
    x.wrapping_mul(2_654_435_761) ^ y.wrapping_mul(40_503) ^ plane
}

/// Bounding boxes of every block, in index order.
fn expected_blocks(cols: u32, rows: u32, block_size: Extent) -> Vec<BBox> {
    BlockGrid::new(cols, rows, block_size)
        .unwrap()
        .iter()
        .map(|block| block.bbox)
        .collect()
}

/// Wraps a view and sleeps a random time per block, so blocks finish
/// rasterizing out of submission order.
struct JitteredView<V> {
    inner: V,
    max_delay_micros: u64,
    completed: Mutex<Vec<BBox>>,
}

impl<V> JitteredView<V> {
    fn new(inner: V, max_delay_micros: u64) -> Self {
        Self {
            inner,
            max_delay_micros,
            completed: Mutex::new(Vec::new()),
        }
    }
}

impl<V: ImageView> ImageView for JitteredView<V> {
    type Pixel = V::Pixel;

    fn cols(&self) -> u32 {
        self.inner.cols()
    }

    fn rows(&self) -> u32 {
        self.inner.rows()
    }

    fn planes(&self) -> u32 {
        self.inner.planes()
    }

    fn rasterize(&self, bbox: BBox) -> Result<PixelBuffer<V::Pixel>, ViewError> {
        let delay = rand::rng().random_range(0..=self.max_delay_micros);
        thread::sleep(Duration::from_micros(delay));
        let buffer = self.inner.rasterize(bbox)?;
        self.completed.lock().push(bbox);
        Ok(buffer)
    }
}

/// Fails to rasterize one specific region.
struct FailingAt<V> {
    inner: V,
    bad: BBox,
}

impl<V: ImageView> ImageView for FailingAt<V> {
    type Pixel = V::Pixel;

    fn cols(&self) -> u32 {
        self.inner.cols()
    }

    fn rows(&self) -> u32 {
        self.inner.rows()
    }

    fn rasterize(&self, bbox: BBox) -> Result<PixelBuffer<V::Pixel>, ViewError> {
        if bbox == self.bad {
            return Err(ViewError::Evaluation(format!("cannot evaluate {}", bbox)));
        }
        self.inner.rasterize(bbox)
    }
}

/// Requests abort on the `n`-th poll (1-based).
struct AbortOnPoll {
    polls: AtomicUsize,
    abort_at: usize,
}

impl AbortOnPoll {
    fn new(abort_at: usize) -> Self {
        Self {
            polls: AtomicUsize::new(0),
            abort_at,
        }
    }
}

impl ProgressCallback for AbortOnPoll {
    fn report_progress(&self, _fraction: f64) {}

    fn report_incremental_progress(&self, _delta: f64) {}

    fn abort_requested(&self) -> bool {
        self.polls.fetch_add(1, Ordering::SeqCst) + 1 >= self.abort_at
    }
}

/// Requests abort once the first block has finished rasterizing.
#[derive(Default)]
struct AbortAfterFirstBlock {
    rasterized: AtomicBool,
}

impl ProgressCallback for AbortAfterFirstBlock {
    fn report_progress(&self, _fraction: f64) {}

    fn report_incremental_progress(&self, _delta: f64) {
        self.rasterized.store(true, Ordering::SeqCst);
    }

    fn abort_requested(&self) -> bool {
        self.rasterized.load(Ordering::SeqCst)
    }
}

// ============================================================================
// Ordering
// ============================================================================

#[test]
fn test_25x25_image_with_10x10_blocks() {
    let view = FnView::new(25, 25, pixel);
    let mut resource = MemoryResource::new(25, 25, 1, Extent::square(10));

    let report = block_write_image(&mut resource, &view, &NullProgress, &config(4, 2)).unwrap();

    assert_eq!(report.blocks, 9);
    assert_eq!(
        resource.write_log(),
        expected_blocks(25, 25, Extent::square(10)).as_slice()
    );
    assert_eq!(resource.write_log()[8], BBox::new(20, 20, 5, 5));
    for (x, y) in [(0, 0), (24, 24), (13, 21)] {
        assert_eq!(resource.image().get(x, y, 0), Some(pixel(x, y, 0)));
    }
}

#[test]
fn test_out_of_order_rasterization_still_writes_in_order() {
    let view = JitteredView::new(FnView::new(97, 61, pixel), 2_000);
    let block_size = Extent::new(8, 8);
    let mut resource = MemoryResource::new(97, 61, 1, block_size);

    block_write_image(&mut resource, &view, &NullProgress, &config(8, 3)).unwrap();

    let expected = expected_blocks(97, 61, block_size);
    assert_eq!(resource.write_log(), expected.as_slice());
    assert_eq!(view.completed.lock().len(), expected.len());

    let mut reference = MemoryResource::new(97, 61, 1, block_size);
    write_image(&mut reference, &FnView::new(97, 61, pixel), &NullProgress).unwrap();
    assert_eq!(resource.image(), reference.image());
}

#[test]
fn test_single_slot_gate_with_many_workers() {
    let view = JitteredView::new(FnView::new(64, 64, pixel), 500);
    let mut resource = MemoryResource::new(64, 64, 1, Extent::square(4));

    let report = block_write_image(&mut resource, &view, &NullProgress, &config(16, 1)).unwrap();

    assert_eq!(report.blocks, 256);
    assert_eq!(
        resource.write_log(),
        expected_blocks(64, 64, Extent::square(4)).as_slice()
    );
}

#[test]
fn test_writing_twice_is_idempotent() {
    let view = JitteredView::new(FnView::with_planes(40, 30, 3, pixel), 300);
    let writer = ThreadedBlockWriter::new(config(4, 4)).unwrap();

    let mut first = MemoryResource::new(40, 30, 3, Extent::new(16, 7));
    let mut second = MemoryResource::new(40, 30, 3, Extent::new(16, 7));
    writer.write(&mut first, &view, &NullProgress).unwrap();
    writer.write(&mut second, &view, &NullProgress).unwrap();

    assert_eq!(first.image(), second.image());
    assert_eq!(first.image().get(39, 29, 2), Some(pixel(39, 29, 2)));
}

#[test]
fn test_sequential_fallback_writes_in_row_major_order() {
    let view = FnView::new(30, 20, pixel);
    let mut resource = MemoryResource::new(30, 20, 1, Extent::new(7, 9));
    let progress = ProgressCounter::new();

    let report = write_image(&mut resource, &view, &progress).unwrap();

    assert_eq!(report.blocks, 15);
    assert_eq!(
        resource.write_log(),
        expected_blocks(30, 20, Extent::new(7, 9)).as_slice()
    );
    assert!(progress.is_finished());
}

#[test]
fn test_copy_between_resources() {
    let source_image = PixelBuffer::from_fn(50, 50, 1, |x, y, _| pixel(x, y, 0) as u16);
    let source = MemoryResource::from_buffer(source_image.clone(), Extent::square(50));
    let mut destination = MemoryResource::new(50, 50, 1, Extent::square(12));

    block_write_image(
        &mut destination,
        &ResourceView::new(&source),
        &NullProgress,
        &config(3, 3),
    )
    .unwrap();

    assert_eq!(destination.image(), &source_image);
}

// ============================================================================
// Progress
// ============================================================================

#[test]
fn test_progress_reaches_one_and_finishes() {
    let progress = ProgressCounter::new();
    let view = JitteredView::new(FnView::new(33, 33, pixel), 200);
    let mut resource = MemoryResource::new(33, 33, 1, Extent::square(5));

    block_write_image(&mut resource, &view, &progress, &config(4, 4)).unwrap();

    assert!(progress.is_finished());
    assert!((progress.fraction() - 1.0).abs() < 1e-9);
}

// ============================================================================
// Errors
// ============================================================================

#[test]
fn test_zero_row_image_is_rejected_before_any_write() {
    let view = FnView::new(16, 0, pixel);
    let mut resource: MemoryResource<u32> = MemoryResource::new(16, 0, 1, Extent::square(4));

    let result = block_write_image(&mut resource, &view, &NullProgress, &config(2, 2));

    assert!(matches!(result, Err(PipelineError::Usage(_))));
    assert_eq!(resource.write_count(), 0);
}

#[test]
fn test_rasterize_failure_aborts_run() {
    let block_size = Extent::square(10);
    let expected = expected_blocks(25, 25, block_size);
    let view = FailingAt {
        inner: JitteredView::new(FnView::new(25, 25, pixel), 300),
        bad: expected[4],
    };
    let mut resource = MemoryResource::new(25, 25, 1, block_size);

    let result = block_write_image(&mut resource, &view, &NullProgress, &config(4, 2));

    match result {
        Err(PipelineError::Rasterize { index, source }) => {
            assert_eq!(index, 4);
            assert!(matches!(source, ViewError::Evaluation(_)));
        }
        other => panic!("expected rasterize failure, got {:?}", other),
    }
    // Only blocks before the failed one can have been written, in order
    let written = resource.write_log();
    assert!(written.len() <= 4);
    assert_eq!(written, &expected[..written.len()]);
}

#[test]
fn test_early_failure_with_many_blocked_workers_terminates() {
    let block_size = Extent::square(4);
    let view = FailingAt {
        inner: FnView::new(64, 64, pixel),
        bad: BBox::new(0, 0, 4, 4),
    };
    let mut resource = MemoryResource::new(64, 64, 1, block_size);

    let result = block_write_image(&mut resource, &view, &NullProgress, &config(8, 1));

    assert!(matches!(result, Err(PipelineError::Rasterize { index: 0, .. })));
    assert_eq!(resource.write_count(), 0);
}

#[test]
fn test_upstream_read_failure_is_rasterize_error() {
    let source: MemoryResource<u8> =
        MemoryResource::new(20, 20, 1, Extent::square(20)).with_read_failure();
    let mut destination = MemoryResource::new(20, 20, 1, Extent::square(10));

    let result = block_write_image(
        &mut destination,
        &ResourceView::new(&source),
        &NullProgress,
        &config(2, 2),
    );

    match result {
        Err(PipelineError::Rasterize { source, .. }) => {
            assert!(matches!(source, ViewError::Upstream(_)));
        }
        other => panic!("expected rasterize failure, got {:?}", other),
    }
}

#[test]
fn test_panicking_view_fails_run_instead_of_hanging() {
    let (sender, receiver) = mpsc::channel();
    thread::spawn(move || {
        let view = FnView::new(40, 40, |x, y, plane| {
            if (x, y) == (20, 20) {
                panic!("cannot evaluate pixel ({}, {})", x, y);
            }
            pixel(x, y, plane)
        });
        let mut resource = MemoryResource::new(40, 40, 1, Extent::square(10));
        let result = block_write_image(&mut resource, &view, &NullProgress, &config(4, 1));
        let _ = sender.send((result, resource.write_log().to_vec()));
    });

    let (result, written) = receiver
        .recv_timeout(Duration::from_secs(10))
        .expect("driver must return after a view panic");

    assert!(matches!(result, Err(PipelineError::WorkerPanicked(_))));
    // Block 10 holds the panicking pixel; nothing at or after it is written
    let expected = expected_blocks(40, 40, Extent::square(10));
    assert!(written.len() <= 10);
    assert_eq!(written.as_slice(), &expected[..written.len()]);
}

#[test]
fn test_write_failure_stops_run() {
    let view = JitteredView::new(FnView::new(40, 40, pixel), 200);
    let block_size = Extent::square(8);
    let mut resource = MemoryResource::new(40, 40, 1, block_size).with_write_failure_at(10);

    let result = block_write_image(&mut resource, &view, &NullProgress, &config(4, 4));

    assert!(matches!(result, Err(PipelineError::Write { index: 10, .. })));
    assert_eq!(
        resource.write_log(),
        &expected_blocks(40, 40, block_size)[..10]
    );
}

// ============================================================================
// Cancellation
// ============================================================================

#[test]
fn test_abort_before_start_writes_nothing() {
    let progress = AbortOnPoll::new(1);
    let view = FnView::new(20, 20, pixel);
    let mut resource = MemoryResource::new(20, 20, 1, Extent::square(5));

    let result = block_write_image(&mut resource, &view, &progress, &config(4, 4));

    assert!(matches!(result, Err(PipelineError::Aborted)));
    assert_eq!(resource.write_count(), 0);
}

#[test]
fn test_abort_during_run_writes_a_prefix() {
    // Poll 1 is the pre-start check; the submission loop and the tasks share
    // the remaining polls
    let progress = AbortOnPoll::new(7);
    let block_size = Extent::square(5);
    let view = JitteredView::new(FnView::new(20, 20, pixel), 200);
    let mut resource = MemoryResource::new(20, 20, 1, block_size);

    let result = block_write_image(&mut resource, &view, &progress, &config(4, 2));

    assert!(matches!(result, Err(PipelineError::Aborted)));
    let expected = expected_blocks(20, 20, block_size);
    let written = resource.write_log();
    assert!(written.len() < expected.len());
    assert_eq!(written, &expected[..written.len()]);
}

#[test]
fn test_abort_after_first_block_stops_queued_blocks() {
    let progress = AbortAfterFirstBlock::default();
    let block_size = Extent::square(8);
    let view = JitteredView::new(FnView::new(64, 64, pixel), 200);
    let mut resource = MemoryResource::new(64, 64, 1, block_size);

    let result = block_write_image(&mut resource, &view, &progress, &config(4, 4));

    assert!(matches!(result, Err(PipelineError::Aborted)));
    // At most one block per worker can be past the start check when the
    // first block finishes
    assert!(view.completed.lock().len() <= 4);
    let expected = expected_blocks(64, 64, block_size);
    let written = resource.write_log();
    assert!(written.len() <= 4);
    assert_eq!(written, &expected[..written.len()]);
}

#[test]
fn test_sequential_abort_leaves_no_partial_block() {
    let progress = AbortOnPoll::new(4);
    let block_size = Extent::square(5);
    let view = FnView::new(20, 20, pixel);
    let mut resource = MemoryResource::new(20, 20, 1, block_size);

    let result = write_image(&mut resource, &view, &progress);

    assert!(matches!(result, Err(PipelineError::Aborted)));
    assert_eq!(
        resource.write_log(),
        &expected_blocks(20, 20, block_size)[..2]
    );
}

// ============================================================================
// PNG output
// ============================================================================

#[test]
fn test_render_to_png_and_read_back() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("out").join("image.png");
    let view = FnView::new(45, 30, |x, y, _| -> Rgba8 { [x as u8, y as u8, (x + y) as u8, 255] });

    let mut resource = PngResource::create(&path, 45, 30, Extent::square(16));
    block_write_image(&mut resource, &view, &NullProgress, &config(3, 3)).unwrap();
    resource.finish().unwrap();

    let reopened = PngResource::open(&path, Extent::square(16)).unwrap();
    assert_eq!((reopened.cols(), reopened.rows()), (45, 30));
    let image = read_image(&reopened).unwrap();
    assert_eq!(image.get(44, 29, 0), Some([44, 29, 73, 255]));
    assert_eq!(image, view.rasterize(BBox::new(0, 0, 45, 30)).unwrap());
}
