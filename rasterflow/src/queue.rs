//! Work queues for the two pipeline stages.
//!
//! - [`FifoWorkQueue`] - fixed pool of rasterize workers. Tasks start in
//!   submission order and finish in any order.
//! - [`OrderedWorkQueue`] - one worker that runs tasks strictly in ascending
//!   index order, whatever order they arrive in.
//!
//! # Example
//!
//! ```
//! use rasterflow::queue::OrderedWorkQueue;
//!
//! let queue = OrderedWorkQueue::new();
//! queue.add_task(1, "second");
//! queue.add_task(0, "first");
//! queue.close();
//!
//! let mut seen = Vec::new();
//! queue
//!     .run_worker(|_, task| {
//!         seen.push(task);
//!         Ok(())
//!     })
//!     .unwrap();
//! assert_eq!(seen, ["first", "second"]);
//! ```

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, Scope, ScopedJoinHandle};

use parking_lot::{Condvar, Mutex};
use rayon::{ScopeFifo, ThreadPool, ThreadPoolBuilder};

use crate::error::PipelineError;

// =============================================================================
// FIFO Work Queue
// =============================================================================

/// Multi-worker queue dispatching tasks first-in-first-out.
///
/// Backed by a dedicated rayon pool. Completion order is unspecified.
pub struct FifoWorkQueue {
    pool: ThreadPool,
    label: String,
}

impl FifoWorkQueue {
    /// Creates a queue with `threads` workers named `{label}-{n}`.
    pub fn new(threads: usize, label: impl Into<String>) -> Result<Self, PipelineError> {
        let label = label.into();
        let thread_label = label.clone();
        let pool = ThreadPoolBuilder::new()
            .num_threads(threads.max(1))
            .thread_name(move |n| format!("{}-{}", thread_label, n))
            .build()
            .map_err(|e| PipelineError::ThreadPool(e.to_string()))?;

        tracing::debug!(threads = pool.current_num_threads(), label = %label, "Created FIFO work queue");
        Ok(Self { pool, label })
    }

    /// Number of worker threads.
    pub fn num_threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Label used for worker thread names.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Runs `submit` to enqueue tasks, then blocks until every task has
    /// completed.
    ///
    /// Returns the number of tasks submitted, or the first error any task
    /// returned. A panicking task counts as a failed one. A failing task does
    /// not cancel the others; tasks that should stop early must observe a
    /// shared signal themselves.
    pub fn join_all<'scope, S>(&self, submit: S) -> Result<usize, PipelineError>
    where
        S: for<'b> FnOnce(&FifoBatch<'b, 'scope>),
    {
        let first_error = Arc::new(Mutex::new(None));
        let mut submitted = 0;

        self.pool.in_place_scope_fifo(|scope| {
            let batch = FifoBatch {
                scope,
                first_error: Arc::clone(&first_error),
                submitted: std::cell::Cell::new(0),
            };
            submit(&batch);
            submitted = batch.submitted.get();
        });

        // All tasks have completed once the scope returns
        let error = first_error.lock().take();
        match error {
            Some(error) => Err(error),
            None => Ok(submitted),
        }
    }
}

impl std::fmt::Debug for FifoWorkQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FifoWorkQueue")
            .field("label", &self.label)
            .field("threads", &self.num_threads())
            .finish()
    }
}

/// Submission handle passed to [`FifoWorkQueue::join_all`].
pub struct FifoBatch<'b, 'scope> {
    scope: &'b ScopeFifo<'scope>,
    first_error: Arc<Mutex<Option<PipelineError>>>,
    submitted: std::cell::Cell<usize>,
}

impl<'scope> FifoBatch<'_, 'scope> {
    /// Enqueues a task behind every task already submitted.
    pub fn add_task<F>(&self, task: F)
    where
        F: FnOnce() -> Result<(), PipelineError> + Send + 'scope,
    {
        let first_error = Arc::clone(&self.first_error);
        self.submitted.set(self.submitted.get() + 1);
        self.scope.spawn_fifo(move |_| {
            let result = panic::catch_unwind(AssertUnwindSafe(task))
                .unwrap_or(Err(PipelineError::WorkerPanicked("fifo queue task")));
            if let Err(error) = result {
                let mut slot = first_error.lock();
                if slot.is_none() {
                    *slot = Some(error);
                }
            }
        });
    }

    /// Tasks submitted so far.
    pub fn submitted(&self) -> usize {
        self.submitted.get()
    }
}

// =============================================================================
// Ordered Work Queue
// =============================================================================

/// A task tagged with its position in the drain order.
struct IndexedTask<T> {
    index: usize,
    task: T,
}

// Ordering for BinaryHeap: lowest index at the top
impl<T> PartialEq for IndexedTask<T> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index
    }
}

impl<T> Eq for IndexedTask<T> {}

impl<T> PartialOrd for IndexedTask<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for IndexedTask<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap, so reverse to pop the smallest index first
        other.index.cmp(&self.index)
    }
}

struct OrderedState<T> {
    pending: BinaryHeap<IndexedTask<T>>,
    next_index: usize,
    closed: bool,
}

struct OrderedShared<T> {
    state: Mutex<OrderedState<T>>,
    ready: Condvar,
}

/// Single-consumer queue that drains tasks in ascending index order.
///
/// Indices must be unique and contiguous from the starting index (0 by
/// default). The worker parks while the next index is missing, holding any
/// later tasks pending. Cloning yields another handle to the same queue.
pub struct OrderedWorkQueue<T> {
    shared: Arc<OrderedShared<T>>,
}

impl<T> Clone for OrderedWorkQueue<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: Send> Default for OrderedWorkQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send> OrderedWorkQueue<T> {
    /// Creates a queue whose first task has index 0.
    pub fn new() -> Self {
        Self::starting_at(0)
    }

    /// Creates a queue whose first task has index `first`.
    pub fn starting_at(first: usize) -> Self {
        Self {
            shared: Arc::new(OrderedShared {
                state: Mutex::new(OrderedState {
                    pending: BinaryHeap::new(),
                    next_index: first,
                    closed: false,
                }),
                ready: Condvar::new(),
            }),
        }
    }

    /// Adds a task at `index`.
    ///
    /// Tasks added after the queue is closed are dropped.
    pub fn add_task(&self, index: usize, task: T) {
        let mut state = self.shared.state.lock();
        if state.closed {
            drop(state);
            tracing::debug!(index, "Ordered queue closed; dropping task");
            return;
        }
        state.pending.push(IndexedTask { index, task });
        let is_next = index == state.next_index;
        drop(state);
        if is_next {
            self.shared.ready.notify_one();
        }
    }

    /// Stops accepting tasks. The worker finishes every task it can still
    /// run in order and then exits.
    pub fn close(&self) {
        self.shared.state.lock().closed = true;
        self.shared.ready.notify_all();
    }

    /// Tasks waiting to run.
    pub fn pending(&self) -> usize {
        self.shared.state.lock().pending.len()
    }

    /// Index the worker will run next.
    pub fn next_index(&self) -> usize {
        self.shared.state.lock().next_index
    }

    /// Blocks until the next task in order is available.
    ///
    /// Returns `None` once the queue is closed and the next index is missing.
    fn next_ready(&self) -> Option<(usize, T)> {
        let mut state = self.shared.state.lock();
        loop {
            while let Some(top) = state.pending.peek() {
                if top.index >= state.next_index {
                    break;
                }
                let stale = top.index;
                state.pending.pop();
                tracing::warn!(index = stale, "Dropping duplicate or stale ordered task");
            }

            let next_index = state.next_index;
            if state.pending.peek().map(|t| t.index) == Some(next_index) {
                let IndexedTask { index, task } = state.pending.pop()?;
                state.next_index += 1;
                return Some((index, task));
            }
            if state.closed {
                return None;
            }
            self.shared.ready.wait(&mut state);
        }
    }

    /// Closes the queue and drops every pending task, returning how many
    /// were discarded.
    fn abandon(&self) -> usize {
        let discarded: Vec<IndexedTask<T>> = {
            let mut state = self.shared.state.lock();
            state.closed = true;
            state.pending.drain().collect()
        };
        self.shared.ready.notify_all();
        // Dropped outside the lock: tasks may release resources on drop
        discarded.len()
    }

    /// Runs tasks in order on the current thread until the queue is closed
    /// and drained as far as the ordering allows.
    ///
    /// Stops at the first failing task, discarding everything still pending.
    /// Returns the number of tasks run.
    pub fn run_worker<F>(&self, mut run: F) -> Result<usize, PipelineError>
    where
        F: FnMut(usize, T) -> Result<(), PipelineError>,
    {
        let mut completed = 0;
        while let Some((index, task)) = self.next_ready() {
            if let Err(error) = run(index, task) {
                let discarded = self.abandon();
                tracing::debug!(index, discarded, "Ordered worker stopped after failure");
                return Err(error);
            }
            completed += 1;
        }
        Ok(completed)
    }

    /// Starts the single worker on a named scoped thread.
    pub fn spawn_worker<'scope, 'env, F>(
        &self,
        scope: &'scope Scope<'scope, 'env>,
        name: &str,
        run: F,
    ) -> Result<OrderedWorker<'scope, T>, PipelineError>
    where
        T: 'scope,
        F: FnMut(usize, T) -> Result<(), PipelineError> + Send + 'scope,
    {
        let queue = self.clone();
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn_scoped(scope, move || queue.run_worker(run))
            .map_err(|e| PipelineError::ThreadPool(e.to_string()))?;

        Ok(OrderedWorker {
            queue: self.clone(),
            handle,
        })
    }
}

/// Handle to the worker thread of an [`OrderedWorkQueue`].
pub struct OrderedWorker<'scope, T> {
    queue: OrderedWorkQueue<T>,
    handle: ScopedJoinHandle<'scope, Result<usize, PipelineError>>,
}

impl<T: Send> OrderedWorker<'_, T> {
    /// Closes the queue and waits for the worker to finish.
    ///
    /// Tasks stranded behind a missing index are discarded. Returns the
    /// number of tasks run, or the worker's error.
    pub fn join_all(self) -> Result<usize, PipelineError> {
        self.queue.close();
        let result = self
            .handle
            .join()
            .map_err(|_| PipelineError::WorkerPanicked("ordered queue worker"))?;

        let stranded = self.queue.abandon();
        if stranded > 0 {
            tracing::warn!(stranded, "Discarded tasks stranded behind a missing index");
        }
        result
    }
}
