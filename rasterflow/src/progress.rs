//! Progress reporting and cancellation.
//!
//! The pipeline reports into a [`ProgressCallback`] from several worker
//! threads at once, so callbacks are `Send + Sync` and take `&self`.
//! Cancellation is polled through [`ProgressCallback::abort_requested`] at
//! safe points only; it never interrupts a block mid-way.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Receiver for progress updates and source of cancellation requests.
pub trait ProgressCallback: Send + Sync {
    /// Sets the absolute progress fraction in `[0, 1]`.
    fn report_progress(&self, fraction: f64);

    /// Advances progress by `delta`.
    fn report_incremental_progress(&self, delta: f64);

    /// Marks the operation as finished.
    fn report_finished(&self) {
        self.report_progress(1.0);
    }

    /// Returns true if the caller wants the operation to stop.
    fn abort_requested(&self) -> bool {
        false
    }
}

/// A callback that ignores all reports and never aborts.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullProgress;

impl ProgressCallback for NullProgress {
    fn report_progress(&self, _fraction: f64) {}

    fn report_incremental_progress(&self, _delta: f64) {}
}

/// Shared cancellation flag.
///
/// Cheap to clone; every clone observes the same flag.
#[derive(Debug, Clone, Default)]
pub struct AbortFlag(Arc<AtomicBool>);

impl AbortFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn request(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Returns true once cancellation has been requested.
    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Thread-safe progress recorder.
///
/// Stores the fraction as `f64` bits in an atomic. The recorded value never
/// decreases and is clamped to `[0, 1]`.
#[derive(Debug, Default)]
pub struct ProgressCounter {
    fraction_bits: AtomicU64,
    finished: AtomicBool,
    abort: AbortFlag,
}

impl ProgressCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a counter whose `abort_requested` follows `abort`.
    pub fn with_abort_flag(abort: AbortFlag) -> Self {
        Self {
            abort,
            ..Self::default()
        }
    }

    /// Current progress fraction.
    pub fn fraction(&self) -> f64 {
        f64::from_bits(self.fraction_bits.load(Ordering::SeqCst))
    }

    /// Returns true once `report_finished` has been called.
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }

    /// The cancellation flag backing this counter.
    pub fn abort_flag(&self) -> &AbortFlag {
        &self.abort
    }

    fn update(&self, f: impl Fn(f64) -> f64) {
        // fetch_update only fails when the closure returns None
        let _ = self
            .fraction_bits
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |bits| {
                let current = f64::from_bits(bits);
                let next = f(current).clamp(0.0, 1.0).max(current);
                Some(next.to_bits())
            });
    }
}

impl ProgressCallback for ProgressCounter {
    fn report_progress(&self, fraction: f64) {
        self.update(|_| fraction);
    }

    fn report_incremental_progress(&self, delta: f64) {
        self.update(|current| current + delta);
    }

    fn report_finished(&self) {
        self.update(|_| 1.0);
        self.finished.store(true, Ordering::SeqCst);
    }

    fn abort_requested(&self) -> bool {
        self.abort.is_requested()
    }
}

/// Maps a child's `[0, 1]` progress onto the range `[from, to]` of a parent.
///
/// Each rasterize task reports through one of these spanning `1/total` of
/// the run, so a full unit of child progress advances the parent by exactly
/// one block.
#[derive(Clone, Copy)]
pub struct SubProgress<'a> {
    parent: &'a dyn ProgressCallback,
    from: f64,
    to: f64,
}

impl<'a> SubProgress<'a> {
    pub fn new(parent: &'a dyn ProgressCallback, from: f64, to: f64) -> Self {
        Self { parent, from, to }
    }

    fn span(&self) -> f64 {
        self.to - self.from
    }
}

impl std::fmt::Debug for SubProgress<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubProgress")
            .field("from", &self.from)
            .field("to", &self.to)
            .finish()
    }
}

impl ProgressCallback for SubProgress<'_> {
    fn report_progress(&self, fraction: f64) {
        self.parent
            .report_progress(self.from + fraction.clamp(0.0, 1.0) * self.span());
    }

    fn report_incremental_progress(&self, delta: f64) {
        self.parent.report_incremental_progress(delta * self.span());
    }

    fn report_finished(&self) {
        self.parent.report_progress(self.to);
    }

    fn abort_requested(&self) -> bool {
        self.parent.abort_requested()
    }
}
