//! Call token
//!
//! An atomic tri-state shared between a scheduled task and the handle
//! returned to the caller. It arbitrates between cancellation and
//! invocation: a call that acquired the token runs to completion, and
//! once the token is dead no call ever starts again.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::thread;

// Potential states of a token.
const IDLE: u8 = 0;
const RUNNING: u8 = 1;
const DEAD: u8 = 2;

/// Shared execution permit for one scheduled call.
pub(crate) struct CallToken {
    state: AtomicU8,
}

impl CallToken {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            state: AtomicU8::new(IDLE),
        })
    }

    /// Try the Idle → Running transition. The returned guard restores
    /// Idle when dropped, on every exit path including unwinding.
    pub(crate) fn try_acquire(&self) -> Option<CallGuard<'_>> {
        self.state
            .compare_exchange(IDLE, RUNNING, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| CallGuard { state: &self.state })
    }

    /// Move the token to Dead. While an invocation is in flight, yield
    /// and retry, so that after return no call is running and none will
    /// ever start.
    pub(crate) fn cancel(&self) {
        loop {
            match self
                .state
                .compare_exchange(IDLE, DEAD, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) | Err(DEAD) => break,
                Err(_) => thread::yield_now(),
            }
        }
    }
}

/// Scope guard for the Running state of a [`CallToken`].
pub(crate) struct CallGuard<'a> {
    state: &'a AtomicU8,
}

impl Drop for CallGuard<'_> {
    fn drop(&mut self) {
        self.state.store(IDLE, Ordering::Release);
    }
}

/// Ownership handle for a scheduled call, returned by
/// [`CallScheduler::add`](crate::scheduler::CallScheduler::add).
///
/// Dropping the handle cancels the call: an in-flight invocation is
/// allowed to finish, later ones never start. [`detach`](Self::detach)
/// severs that link, leaving the task governed only by its own return
/// value and the scheduler's lifetime.
#[must_use = "dropping the handle cancels the scheduled call"]
pub struct CallHandle {
    token: Option<Arc<CallToken>>,
}

impl CallHandle {
    pub(crate) fn new(token: Arc<CallToken>) -> Self {
        Self { token: Some(token) }
    }

    /// Let the call outlive this handle.
    pub fn detach(mut self) {
        self.token = None;
    }
}

impl Drop for CallHandle {
    fn drop(&mut self) {
        if let Some(token) = self.token.take() {
            token.cancel();
        }
    }
}
