//! Buffered worker
//!
//! Serializes a stream of work items onto one background thread while
//! amortizing lock contention: producers append to a shared back buffer,
//! the consumer swaps it with a privately owned front buffer under the
//! lock and drains the front without holding it.

use crate::error::Error;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::mem;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::debug;

struct Shared<T> {
    back: Mutex<VecDeque<T>>,
    bell: Condvar,
    stop: AtomicBool,
}

/// A worker thread encapsulation with double-buffered task intake.
///
/// The back buffer never holds more than `max_len` items: a push at the
/// limit evicts the oldest pending entry first. `drop_leftovers` selects
/// the shutdown behavior — discard whatever is still queued, or drain
/// every remaining item exactly once before the thread exits.
pub struct BufferedWorker<T: FnOnce() + Send + 'static> {
    shared: Arc<Shared<T>>,
    max_len: usize,
    thread: Option<JoinHandle<()>>,
}

impl<T: FnOnce() + Send + 'static> std::fmt::Debug for BufferedWorker<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferedWorker").finish_non_exhaustive()
    }
}

impl<T: FnOnce() + Send + 'static> BufferedWorker<T> {
    /// Start the consumer thread. Fails when `max_len` is zero.
    pub fn new(max_len: usize, drop_leftovers: bool) -> Result<Self, Error> {
        if max_len == 0 {
            return Err(Error::ZeroLengthBuffer);
        }

        let shared = Arc::new(Shared {
            back: Mutex::new(VecDeque::new()),
            bell: Condvar::new(),
            stop: AtomicBool::new(false),
        });

        let consumer = Arc::clone(&shared);
        let thread = thread::spawn(move || consume(consumer, drop_leftovers));

        Ok(Self {
            shared,
            max_len,
            thread: Some(thread),
        })
    }

    /// Queue a work item. Returns false iff the worker has been killed.
    pub fn add(&self, work: T) -> bool {
        if self.shared.stop.load(Ordering::SeqCst) {
            return false;
        }

        let mut back = self.shared.back.lock();
        if back.len() >= self.max_len {
            back.pop_front();
        }
        back.push_back(work);
        self.shared.bell.notify_one();

        true
    }

    /// Stop the consumer thread and join it. Idempotent. Leftover items
    /// are dropped or drained according to the construction policy.
    pub fn kill(&mut self) {
        if let Some(thread) = self.thread.take() {
            {
                let _back = self.shared.back.lock();
                self.shared.stop.store(true, Ordering::SeqCst);
                self.shared.bell.notify_one();
            }
            debug!("buffered worker stopping");
            let _ = thread.join();
        }
    }
}

impl<T: FnOnce() + Send + 'static> Drop for BufferedWorker<T> {
    fn drop(&mut self) {
        self.kill();
    }
}

fn consume<T: FnOnce() + Send>(shared: Arc<Shared<T>>, drop_leftovers: bool) {
    let mut front = VecDeque::new();

    while !shared.stop.load(Ordering::SeqCst) {
        {
            let mut back = shared.back.lock();
            mem::swap(&mut front, &mut *back);
        }
        run_front(&mut front, &shared.stop, drop_leftovers);

        let mut back = shared.back.lock();
        shared
            .bell
            .wait_while(&mut back, |b| {
                !shared.stop.load(Ordering::SeqCst) && b.is_empty()
            });
    }

    if !drop_leftovers {
        {
            let mut back = shared.back.lock();
            mem::swap(&mut front, &mut *back);
        }
        run_front(&mut front, &shared.stop, drop_leftovers);
    }
}

// FIFO drain of the front buffer. A stop request interrupts the drain
// after the current item unless leftovers must be executed.
fn run_front<T: FnOnce()>(front: &mut VecDeque<T>, stop: &AtomicBool, drop_leftovers: bool) {
    while !front.is_empty() && (!stop.load(Ordering::SeqCst) || !drop_leftovers) {
        if let Some(work) = front.pop_front() {
            work();
        }
    }
}
