//! Admission gate bounding rasterized-but-unwritten blocks.
//!
//! Rasterize workers pass through the gate before handing a finished block
//! to the writer. The gate keeps the number of blocks in flight (admitted but
//! not yet written) near a configured maximum, which caps how many block
//! buffers sit in memory waiting for the single writer.
//!
//! # Admission rule
//!
//! `wait(index)` returns as soon as any of these holds:
//!
//! ```text
//! (a) in_flight <= max_in_flight             capacity available
//! (b) index     <= last_admitted_index       priority bypass
//! (c) index     <= write_watermark           the writer needs this block next
//! ```
//!
//! and then records `index` as the last admitted index. The gate is a soft
//! limit: (b) and (c) may push `in_flight` past the maximum. It does not
//! order admissions either. Write ordering is the write queue's job.
//!
//! Condition (c) keeps the pipeline live. Writes drain in index order from
//! zero, so after `n` releases the writer is waiting for block `n`. Letting
//! that block through unconditionally means the writer can always make
//! progress, and every blocked worker is eventually woken by a release.

use parking_lot::{Condvar, Mutex};
use thiserror::Error;

/// Returned by `wait`/`admit` after the gate has been closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Admission gate is closed")]
pub struct GateClosed;

/// Why a block was let through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Admission {
    Capacity,
    Bypass,
    Watermark,
}

#[derive(Debug, Default)]
struct GateState {
    in_flight: usize,
    last_admitted_index: usize,
    write_watermark: usize,
    closed: bool,
    peak_in_flight: usize,
    admitted: usize,
    bypassed: usize,
}

impl GateState {
    fn admission(&self, index: usize, max_in_flight: usize) -> Option<Admission> {
        if self.in_flight <= max_in_flight {
            Some(Admission::Capacity)
        } else if index <= self.last_admitted_index {
            Some(Admission::Bypass)
        } else if index <= self.write_watermark {
            Some(Admission::Watermark)
        } else {
            None
        }
    }

    fn enter(&mut self) {
        self.in_flight += 1;
        self.admitted += 1;
        self.peak_in_flight = self.peak_in_flight.max(self.in_flight);
    }
}

/// Point-in-time view of the gate counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GateStats {
    /// Blocks currently admitted and not yet released.
    pub in_flight: usize,
    /// Highest `in_flight` value observed.
    pub peak_in_flight: usize,
    /// Total `enter` calls.
    pub admitted: usize,
    /// Waits that returned through (b) or (c) while over capacity.
    pub bypassed: usize,
    /// Total `release` calls.
    pub released: usize,
    /// Index most recently let through `wait`.
    pub last_admitted_index: usize,
}

/// Counting gate with a last-admitted-index bypass.
///
/// All counters live under one mutex; `wait` parks on a single condition
/// variable that every `release` and `close` signals.
#[derive(Debug)]
pub struct AdmissionGate {
    state: Mutex<GateState>,
    changed: Condvar,
    max_in_flight: usize,
}

impl AdmissionGate {
    /// Creates a gate allowing roughly `max_in_flight` blocks in flight.
    pub fn new(max_in_flight: usize) -> Self {
        tracing::debug!(max_in_flight, "Created admission gate");
        Self {
            state: Mutex::new(GateState::default()),
            changed: Condvar::new(),
            max_in_flight,
        }
    }

    /// Configured soft maximum.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight
    }

    /// Blocks currently admitted and not yet released.
    pub fn in_flight(&self) -> usize {
        self.state.lock().in_flight
    }

    /// Blocks until block `index` may proceed, then records it as the last
    /// admitted index. Does not count the block; call [`enter`](Self::enter).
    pub fn wait(&self, index: usize) -> Result<(), GateClosed> {
        let mut state = self.state.lock();
        self.wait_locked(&mut state, index)
    }

    fn wait_locked(
        &self,
        state: &mut parking_lot::MutexGuard<'_, GateState>,
        index: usize,
    ) -> Result<(), GateClosed> {
        loop {
            if state.closed {
                return Err(GateClosed);
            }
            match state.admission(index, self.max_in_flight) {
                Some(admission) => {
                    if admission != Admission::Capacity {
                        state.bypassed += 1;
                        tracing::trace!(index, ?admission, in_flight = state.in_flight, "Gate bypass");
                    }
                    state.last_admitted_index = index;
                    return Ok(());
                }
                None => self.changed.wait(state),
            }
        }
    }

    /// Counts one more block in flight. Never blocks.
    pub fn enter(&self) {
        self.state.lock().enter();
    }

    /// Releases one in-flight block and wakes every waiter.
    pub fn release(&self) {
        let mut state = self.state.lock();
        debug_assert!(state.in_flight > 0, "release without matching enter");
        state.in_flight = state.in_flight.saturating_sub(1);
        state.write_watermark += 1;
        drop(state);
        self.changed.notify_all();
    }

    /// Waits for and enters in one step, returning a ticket that releases
    /// the block when dropped.
    pub fn admit(&self, index: usize) -> Result<AdmissionTicket<'_>, GateClosed> {
        let mut state = self.state.lock();
        self.wait_locked(&mut state, index)?;
        state.enter();
        Ok(AdmissionTicket { gate: self, index })
    }

    /// Closes the gate. Current and future waiters return [`GateClosed`].
    pub fn close(&self) {
        self.state.lock().closed = true;
        self.changed.notify_all();
    }

    /// Returns true once [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Snapshot of the gate counters.
    pub fn stats(&self) -> GateStats {
        let state = self.state.lock();
        GateStats {
            in_flight: state.in_flight,
            peak_in_flight: state.peak_in_flight,
            admitted: state.admitted,
            bypassed: state.bypassed,
            released: state.write_watermark,
            last_admitted_index: state.last_admitted_index,
        }
    }
}

/// An admitted block. Releases its gate slot when dropped.
///
/// Write tasks own their ticket, so the slot is returned whether the write
/// succeeds, fails, or the task is discarded without running.
#[must_use = "dropping the ticket releases the block immediately"]
#[derive(Debug)]
pub struct AdmissionTicket<'a> {
    gate: &'a AdmissionGate,
    index: usize,
}

impl AdmissionTicket<'_> {
    /// Index of the admitted block.
    pub fn index(&self) -> usize {
        self.index
    }
}

impl Drop for AdmissionTicket<'_> {
    fn drop(&mut self) {
        self.gate.release();
    }
}
