//! # Mutation Thread
//!
//! The single writer of scene state. Everything that edits the scene or the
//! manager tables runs here, one task at a time, so none of it needs locks
//! of its own.
//!
//! ## Architecture
//!
//! ```text
//!   Thread 1 ──┐
//!   Thread 2 ──┼──> [Unbounded FIFO Channel] ──> [Mutation Thread] ──> Scene::apply
//!   Thread N ──┘        (non-blocking send)         (single writer)
//! ```
//!
//! ## Ordering
//!
//! Tasks sent by one thread run in the order they were sent. Tasks from
//! different threads run in channel arrival order.
//!
//! ## Shutdown
//!
//! Shutdown **drains**: new tasks are refused, every task already queued
//! still runs, then the thread exits and is joined.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};

use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use parking_lot::{Mutex, RwLock};
use terrella_core::{TerrellaError, TerrellaResult};

/// A unit of work for the mutation thread.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Counters shared with the worker.
#[derive(Debug, Default)]
struct Counters {
    executed: AtomicU64,
    panicked: AtomicU64,
    pending: AtomicU64,
}

/// Statistics for the mutation thread.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MutationThreadStats {
    /// Queued tasks that ran to completion.
    pub executed: u64,
    /// Queued tasks that panicked.
    pub panicked: u64,
    /// Tasks queued but not yet run.
    pub pending: u64,
}

/// Dedicated worker thread with a FIFO task queue.
pub struct MutationThread {
    /// Thread name, for logs.
    name: String,
    /// Queue entry. `None` once shut down.
    sender: RwLock<Option<Sender<Task>>>,
    /// Identity of the worker, for the same-thread fast path.
    thread_id: ThreadId,
    /// Worker handle, taken by the first joining shutdown.
    handle: Mutex<Option<JoinHandle<()>>>,
    /// Statistics.
    counters: Arc<Counters>,
}

impl std::fmt::Debug for MutationThread {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MutationThread")
            .field("name", &self.name)
            .field("thread_id", &self.thread_id)
            .field("running", &self.is_running())
            .field("stats", &self.stats())
            .finish()
    }
}

impl MutationThread {
    /// Starts the worker.
    ///
    /// # Errors
    ///
    /// Returns [`TerrellaError::ThreadSpawn`] if the OS refuses the thread.
    pub fn spawn(name: impl Into<String>) -> TerrellaResult<Self> {
        let name = name.into();
        let (sender, receiver) = unbounded::<Task>();
        let counters = Arc::new(Counters::default());

        let worker_counters = Arc::clone(&counters);
        let worker_name = name.clone();
        let handle = thread::Builder::new()
            .name(name.clone())
            .spawn(move || Self::run_loop(&worker_name, &receiver, &worker_counters))
            .map_err(|e| TerrellaError::ThreadSpawn(e.to_string()))?;
        let thread_id = handle.thread().id();

        tracing::info!("Mutation thread '{}' started", name);

        Ok(Self {
            name,
            sender: RwLock::new(Some(sender)),
            thread_id,
            handle: Mutex::new(Some(handle)),
            counters,
        })
    }

    /// Worker main loop. Ends once the queue is closed and empty.
    fn run_loop(name: &str, receiver: &Receiver<Task>, counters: &Counters) {
        for task in receiver {
            let outcome = panic::catch_unwind(AssertUnwindSafe(task));
            counters.pending.fetch_sub(1, Ordering::AcqRel);

            match outcome {
                Ok(()) => {
                    counters.executed.fetch_add(1, Ordering::Relaxed);
                }
                Err(payload) => {
                    counters.panicked.fetch_add(1, Ordering::Relaxed);
                    tracing::error!(
                        "Task on mutation thread '{}' panicked: {}",
                        name,
                        panic_message(payload.as_ref())
                    );
                }
            }
        }

        tracing::info!("Mutation thread '{}' drained and stopped", name);
    }

    /// Thread name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// True until [`MutationThread::shutdown`] is called.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.sender.read().is_some()
    }

    /// Identity of the worker thread.
    #[must_use]
    pub fn thread_id(&self) -> ThreadId {
        self.thread_id
    }

    /// True when called from the worker itself.
    #[inline]
    #[must_use]
    pub fn running_on_this_thread(&self) -> bool {
        thread::current().id() == self.thread_id
    }

    /// Queues `task` without blocking.
    ///
    /// # Errors
    ///
    /// Returns [`TerrellaError::InvalidState`] after shutdown.
    pub fn add_task<F>(&self, task: F) -> TerrellaResult<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let guard = self.sender.read();
        let Some(sender) = guard.as_ref() else {
            return Err(TerrellaError::InvalidState("mutation thread has shut down"));
        };

        self.counters.pending.fetch_add(1, Ordering::AcqRel);
        sender.send(Box::new(task)).map_err(|_| {
            self.counters.pending.fetch_sub(1, Ordering::AcqRel);
            TerrellaError::InvalidState("mutation thread has stopped")
        })
    }

    /// Runs `task` right away when already on the worker, queues it otherwise.
    ///
    /// # Errors
    ///
    /// Returns [`TerrellaError::InvalidState`] if the task had to be queued
    /// and the thread has shut down.
    pub fn run_or_enqueue<F>(&self, task: F) -> TerrellaResult<()>
    where
        F: FnOnce() + Send + 'static,
    {
        if self.running_on_this_thread() {
            task();
            Ok(())
        } else {
            self.add_task(task)
        }
    }

    /// Blocks until every task queued before this call has run.
    ///
    /// Returns immediately on the worker itself, where waiting would
    /// deadlock.
    ///
    /// # Errors
    ///
    /// Returns [`TerrellaError::InvalidState`] after shutdown.
    pub fn flush(&self) -> TerrellaResult<()> {
        if self.running_on_this_thread() {
            return Ok(());
        }

        let (done_tx, done_rx) = bounded::<()>(1);
        self.add_task(move || {
            let _ = done_tx.send(());
        })?;
        done_rx
            .recv()
            .map_err(|_| TerrellaError::InvalidState("mutation thread stopped before flush"))
    }

    /// Current statistics.
    #[must_use]
    pub fn stats(&self) -> MutationThreadStats {
        MutationThreadStats {
            executed: self.counters.executed.load(Ordering::Relaxed),
            panicked: self.counters.panicked.load(Ordering::Relaxed),
            pending: self.counters.pending.load(Ordering::Acquire),
        }
    }

    /// Refuses new tasks, drains the queue and joins the worker.
    ///
    /// Idempotent and callable from any thread. Called from the worker
    /// itself it only closes the queue; the worker exits after the current
    /// task.
    pub fn shutdown(&self) {
        if let Some(sender) = self.sender.write().take() {
            tracing::info!(
                "Mutation thread '{}' shutting down, {} tasks left to drain",
                self.name,
                self.counters.pending.load(Ordering::Acquire)
            );
            drop(sender);
        }

        if self.running_on_this_thread() {
            return;
        }

        let mut handle = self.handle.lock();
        if let Some(handle) = handle.take() {
            if handle.join().is_err() {
                tracing::error!("Mutation thread '{}' terminated abnormally", self.name);
            }
        }
    }
}

impl Drop for MutationThread {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "<non-string panic payload>"
    }
}
