//! Timeline
//!
//! Named countdown timers multiplexed onto an embedded call scheduler.
//! Each timer is a mutable countdown (resolution, duration, remaining,
//! repeating) bound to the scheduler through a call handle while it is
//! ticking. Observable state serializes to single-line strings and
//! restores losslessly.

use crate::error::{Error, ERROR_TICK_BEYOND_ZERO};
use crate::scheduler::{CallResult, CallScheduler};
use crate::serial::{TimerRecord, ALARM_TAG, FIELD_DELIMITER, PULSE_TAG, TIMER_TAG};
use crate::token::CallHandle;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// State of one timer, as visible to tick callbacks and serialization.
///
/// `remaining` is atomically readable so concurrent serialization can
/// observe a consistent value while the timer is ticking.
pub struct TimerState {
    name: String,
    resolution: Duration,
    duration: Duration,
    remaining_ms: AtomicU64,
    repeating: bool,
}

impl TimerState {
    fn new(
        name: &str,
        resolution: Duration,
        duration: Duration,
        remaining: Duration,
        repeating: bool,
    ) -> Self {
        Self {
            name: name.to_string(),
            resolution,
            duration,
            remaining_ms: AtomicU64::new(remaining.as_millis() as u64),
            repeating,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Interval between timer invocations.
    pub fn resolution(&self) -> Duration {
        self.resolution
    }

    /// Total countdown time.
    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Remaining countdown time.
    pub fn remaining(&self) -> Duration {
        Duration::from_millis(self.remaining_ms.load(Ordering::SeqCst))
    }

    /// Whether the countdown restarts from the top when reaching zero.
    pub fn repeating(&self) -> bool {
        self.repeating
    }

    fn store_remaining(&self, value: Duration) {
        self.remaining_ms
            .store(value.as_millis() as u64, Ordering::SeqCst);
    }

    // Remove one resolution from the countdown and report whether the
    // timer can tick again.
    fn tick(&self) -> CallResult {
        let remaining = self.remaining_ms.load(Ordering::SeqCst);
        assert!(remaining != 0, "{}", ERROR_TICK_BEYOND_ZERO);

        let next = remaining.saturating_sub(self.resolution.as_millis() as u64);
        if next == 0 {
            if self.repeating {
                // Repeating countdowns restart from the full duration.
                self.store_remaining(self.duration);
                return CallResult::Repeat;
            }
            self.remaining_ms.store(0, Ordering::SeqCst);
            return CallResult::Finished;
        }

        self.remaining_ms.store(next, Ordering::SeqCst);
        CallResult::Repeat
    }
}

type TimerAction = Arc<dyn Fn(&TimerState) + Send + Sync>;

struct TimerEntry {
    state: Arc<TimerState>,
    action: TimerAction,
    // Live scheduler binding; absent while paused or stopped.
    binding: Option<CallHandle>,
}

/// Named timers over one embedded scheduler.
///
/// All operations return whether they succeeded; failure means the name
/// was not found, or for [`timer_add`](Self::timer_add) that it was
/// already present or the countdown parameters were invalid.
pub struct Timeline {
    timers: Mutex<BTreeMap<String, TimerEntry>>,
    scheduler: CallScheduler,
}

impl std::fmt::Debug for Timeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Timeline").finish_non_exhaustive()
    }
}

impl Timeline {
    /// Create an empty timeline.
    pub fn new() -> Self {
        Self {
            timers: Mutex::new(BTreeMap::new()),
            scheduler: CallScheduler::new(true, 1).expect("scheduler with one worker"),
        }
    }

    /// Reconstruct a timeline from serialized elements.
    ///
    /// `timers_event` becomes the action of every restored timer.
    /// Elements marked active resume ticking one resolution from now;
    /// the rest stay paused. Construction fails wholesale on the first
    /// invalid element, so a timeline never exists half-parsed.
    pub fn from_state(
        elements: &[String],
        timers_event: impl Fn(&TimerState) + Send + Sync + 'static,
    ) -> Result<Self, Error> {
        let mut records = Vec::with_capacity(elements.len());
        for element in elements {
            match element.split(FIELD_DELIMITER).next().unwrap_or("") {
                TIMER_TAG => records.push(TimerRecord::parse(element)?),
                PULSE_TAG => return Err(Error::UnsupportedElement(PULSE_TAG)),
                ALARM_TAG => return Err(Error::UnsupportedElement(ALARM_TAG)),
                _ => return Err(Error::UnknownElement(element.clone())),
            }
        }

        let timeline = Self::new();
        let action: TimerAction = Arc::new(timers_event);
        for record in &records {
            if !timeline.restore(record, Arc::clone(&action)) {
                return Err(Error::MalformedElement(record.to_string()));
            }
        }

        Ok(timeline)
    }

    /// Add a named timer.
    ///
    /// With `tick_now` the first invocation fires immediately and
    /// observes `remaining == duration`; otherwise it fires one
    /// resolution later and observes `remaining == duration - resolution`.
    /// Returns false when the name is taken or unusable, or when the
    /// countdown parameters violate `0 < resolution <= duration`.
    pub fn timer_add(
        &self,
        name: &str,
        resolution: Duration,
        duration: Duration,
        repeating: bool,
        on_tick: impl Fn(&TimerState) + Send + Sync + 'static,
        tick_now: bool,
    ) -> bool {
        if name.is_empty()
            || name.contains(FIELD_DELIMITER)
            || resolution.is_zero()
            || resolution > duration
        {
            return false;
        }

        let remaining = if tick_now {
            duration + resolution
        } else {
            duration
        };
        let state = Arc::new(TimerState::new(name, resolution, duration, remaining, repeating));
        let action: TimerAction = Arc::new(on_tick);

        let mut timers = self.timers.lock();
        if timers.contains_key(name) {
            return false;
        }
        let binding = Some(self.bind(&state, &action, tick_now));
        timers.insert(name.to_string(), TimerEntry { state, action, binding });

        debug!(name, "timer added");
        true
    }

    /// Remove a timer. Ticking stops deterministically: an in-flight
    /// tick completes before removal returns.
    pub fn timer_remove(&self, name: &str) -> bool {
        let entry = self.timers.lock().remove(name);
        let removed = entry.is_some();
        // The binding cancels here, outside the map lock.
        drop(entry);

        if removed {
            debug!(name, "timer removed");
        }
        removed
    }

    /// Restart the countdown: the next tick fires immediately and
    /// observes `remaining == duration`.
    pub fn timer_reset(&self, name: &str) -> bool {
        let Some(stale) = self.unbind(name) else {
            return false;
        };
        drop(stale);

        let mut timers = self.timers.lock();
        let Some(entry) = timers.get_mut(name) else {
            return false;
        };
        entry
            .state
            .store_remaining(entry.state.duration + entry.state.resolution);
        entry.binding = Some(self.bind(&entry.state, &entry.action, true));
        true
    }

    /// Stop ticking and reset the countdown. The entity stays in the
    /// map and keeps serializing.
    pub fn timer_stop(&self, name: &str) -> bool {
        let Some(stale) = self.unbind(name) else {
            return false;
        };
        drop(stale);

        let timers = self.timers.lock();
        let Some(entry) = timers.get(name) else {
            return false;
        };
        entry.state.store_remaining(entry.state.duration);
        true
    }

    /// Stop ticking but keep the countdown where it is.
    pub fn timer_pause(&self, name: &str) -> bool {
        let Some(stale) = self.unbind(name) else {
            return false;
        };
        drop(stale);
        true
    }

    /// Start ticking again, one resolution from now. A timer that is
    /// already ticking is left alone, and an expired countdown has
    /// nothing left to resume until it is reset.
    pub fn timer_resume(&self, name: &str) -> bool {
        let mut stale = None;
        {
            let mut timers = self.timers.lock();
            let Some(entry) = timers.get_mut(name) else {
                return false;
            };
            if entry.state.remaining().is_zero() {
                // A finished countdown leaves its retired handle behind;
                // that is not a live binding, and a zero countdown must
                // never be re-armed.
                stale = entry.binding.take();
            } else if entry.binding.is_none() {
                entry.binding = Some(self.bind(&entry.state, &entry.action, false));
            }
        }
        drop(stale);
        true
    }

    /// Serialized state of every entity in the selected categories, in
    /// name order. The pulse and alarm categories are reserved and
    /// currently empty.
    pub fn serialize(&self, timers: bool, _pulses: bool, _alarms: bool) -> Vec<String> {
        let mut out = Vec::new();
        if timers {
            let map = self.timers.lock();
            out.extend(map.values().map(|entry| record_of(entry).to_string()));
        }
        out
    }

    // Take the scheduler binding out of a timer, if any. Returns None
    // when the name is unknown. The caller drops the returned handle
    // with the map lock released, so cancellation can wait out an
    // in-flight tick without holding up the map.
    fn unbind(&self, name: &str) -> Option<Option<CallHandle>> {
        let mut timers = self.timers.lock();
        timers.get_mut(name).map(|entry| entry.binding.take())
    }

    // Register the ticking task with the scheduler. The closure keeps a
    // weak reference only: a timer removed while its tick sits queued on
    // a worker upgrades to nothing and the task retires itself.
    fn bind(&self, state: &Arc<TimerState>, action: &TimerAction, tick_now: bool) -> CallHandle {
        let weak = Arc::downgrade(state);
        let action = Arc::clone(action);
        let resolution = state.resolution;

        self.scheduler.add(
            move || {
                let Some(state) = weak.upgrade() else {
                    return CallResult::Finished;
                };
                let outcome = state.tick();
                action(&state);
                outcome
            },
            resolution,
            tick_now,
        )
    }

    // Insert a deserialized timer, bound for normal ticking when marked
    // active.
    fn restore(&self, record: &TimerRecord, action: TimerAction) -> bool {
        let state = Arc::new(TimerState::new(
            &record.name,
            Duration::from_millis(record.resolution_ms),
            Duration::from_millis(record.duration_ms),
            Duration::from_millis(record.remaining_ms),
            record.repeating,
        ));

        let mut timers = self.timers.lock();
        if timers.contains_key(&record.name) {
            return false;
        }

        // Only countdowns with time left may tick; anything else would
        // violate the tick protocol on its first invocation.
        let binding = (record.active && record.remaining_ms > 0)
            .then(|| self.bind(&state, &action, false));
        timers.insert(
            record.name.clone(),
            TimerEntry { state, action, binding },
        );

        debug!(name = %record.name, active = record.active, "timer restored");
        true
    }
}

impl Default for Timeline {
    fn default() -> Self {
        Self::new()
    }
}

fn record_of(entry: &TimerEntry) -> TimerRecord {
    let state = &entry.state;
    let remaining_ms = state.remaining().as_millis() as u64;
    TimerRecord {
        name: state.name().to_string(),
        resolution_ms: state.resolution().as_millis() as u64,
        duration_ms: state.duration().as_millis() as u64,
        remaining_ms,
        repeating: state.repeating(),
        // An expired countdown cannot tick again, so its stale binding
        // does not count as active.
        active: entry.binding.is_some() && remaining_ms > 0,
    }
}
