//! Call scheduler
//!
//! Dispatches due tasks from a deadline-ordered timetable to a pool of
//! buffered workers. One coordinator thread sleeps until the earliest
//! deadline and hands due tasks to the workers round-robin; execution of
//! each task is gated by its call token, so cancellation and invocation
//! never overlap.

use crate::error::Error;
use crate::timetable::Timetable;
use crate::token::{CallHandle, CallToken};
use crate::worker::BufferedWorker;
use parking_lot::{Condvar, Mutex};
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// Outcome reported by a scheduled call: run again after the interval,
/// or retire the task.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CallResult {
    Finished,
    Repeat,
}

// Per-buffer queue length of the execution workers.
const WORKER_QUEUE_LEN: usize = 10_000;

type Work = Box<dyn FnMut() -> CallResult + Send>;
type Runner = Box<dyn FnOnce() + Send>;

struct Task {
    work: Work,
    token: Arc<CallToken>,
    interval: Duration,
}

struct TableState {
    tasks: Timetable<Task>,
    stop: bool,
}

struct Shared {
    table: Mutex<TableState>,
    bell: Condvar,
}

/// Deferred and periodic call dispatch over a worker pool.
///
/// `compensate` selects how a repeating task's next deadline is computed:
/// from the previous deadline, so execution time shortens the sleep, or
/// from the moment execution finished, so execution time adds on top.
pub struct CallScheduler {
    shared: Arc<Shared>,
    coordinator: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for CallScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallScheduler").finish_non_exhaustive()
    }
}

impl CallScheduler {
    /// Create a scheduler with `workers` execution threads, clamped to
    /// the available parallelism. Zero workers is an error.
    pub fn new(compensate: bool, workers: usize) -> Result<Self, Error> {
        if workers == 0 {
            return Err(Error::NoWorkers);
        }
        let parallelism = thread::available_parallelism()
            .map(NonZeroUsize::get)
            .unwrap_or(1);
        let count = workers.min(parallelism);

        let mut pool = Vec::with_capacity(count);
        for _ in 0..count {
            pool.push(BufferedWorker::new(WORKER_QUEUE_LEN, true)?);
        }

        let shared = Arc::new(Shared {
            table: Mutex::new(TableState {
                tasks: Timetable::new(),
                stop: false,
            }),
            bell: Condvar::new(),
        });

        let coordinator = {
            let shared = Arc::clone(&shared);
            thread::spawn(move || coordinate(shared, pool, compensate))
        };

        debug!(workers = count, compensate, "scheduler started");
        Ok(Self {
            shared,
            coordinator: Some(coordinator),
        })
    }

    /// Register `work` for invocation every `interval`, starting one
    /// interval from now, or right away when `immediate` is set.
    ///
    /// The returned handle cancels the task when dropped; detach it to
    /// let the task run until it reports [`CallResult::Finished`].
    pub fn add(
        &self,
        work: impl FnMut() -> CallResult + Send + 'static,
        interval: Duration,
        immediate: bool,
    ) -> CallHandle {
        let token = CallToken::new();
        let task = Task {
            work: Box::new(work),
            token: Arc::clone(&token),
            interval,
        };

        let at = if immediate {
            Instant::now()
        } else {
            Instant::now() + interval
        };
        {
            let mut table = self.shared.table.lock();
            table.tasks.insert(at, task);
        }
        self.shared.bell.notify_one();

        CallHandle::new(token)
    }
}

impl Drop for CallScheduler {
    fn drop(&mut self) {
        {
            let mut table = self.shared.table.lock();
            table.stop = true;
        }
        self.shared.bell.notify_one();
        if let Some(coordinator) = self.coordinator.take() {
            let _ = coordinator.join();
        }
        debug!("scheduler stopped");
    }
}

fn coordinate(shared: Arc<Shared>, pool: Vec<BufferedWorker<Runner>>, compensate: bool) {
    let mut next_worker = 0usize;

    loop {
        let due = {
            let mut table = shared.table.lock();
            if table.stop {
                break;
            }

            match table.tasks.next_deadline() {
                None => {
                    shared
                        .bell
                        .wait_while(&mut table, |t| !t.stop && t.tasks.is_empty());
                }
                Some(deadline) if Instant::now() < deadline => {
                    // The earliest deadline is re-read on the next pass,
                    // so a task added with a closer deadline shortens the
                    // wait instead of riding out this one.
                    shared.bell.wait_until(&mut table, deadline);
                }
                Some(_) => {}
            }
            if table.stop {
                break;
            }

            table.tasks.pop_due(Instant::now())
        };

        if let Some((at, task)) = due {
            trace!(worker = next_worker, "dispatching due task");
            pool[next_worker].add(run_task(Arc::clone(&shared), task, at, compensate));
            next_worker = (next_worker + 1) % pool.len();
        }
    }
    // The pool drops here: each worker completes only its in-flight
    // invocation and discards the rest.
}

// Execution wrapper handed to a worker: consult the token, invoke the
// work, and re-queue the task when it asks to repeat.
fn run_task(shared: Arc<Shared>, task: Task, scheduled_at: Instant, compensate: bool) -> Runner {
    Box::new(move || {
        let mut task = task;
        let mut outcome = CallResult::Finished;

        if let Some(_running) = task.token.try_acquire() {
            outcome = (task.work)();
        }

        if outcome == CallResult::Repeat {
            let at = if compensate {
                scheduled_at + task.interval
            } else {
                Instant::now() + task.interval
            };

            let mut table = shared.table.lock();
            if !table.stop {
                table.tasks.insert(at, task);
                drop(table);
                shared.bell.notify_one();
            }
        }
    })
}
