//! End-to-end timing scenarios
//!
//! Exercises the scheduler and timeline together under real wall-clock
//! conditions: countdown boundaries, compensation behavior, pause and
//! resume arithmetic, serialization fixed points, and shutdown
//! quiescence. Wall-clock assertions use generous tolerances so the
//! suite holds on loaded machines.

#[cfg(test)]
mod tests {
    use crate::scheduler::{CallResult, CallScheduler};
    use crate::timeline::Timeline;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::{Duration, Instant};

    fn wait_for(cond: impl Fn() -> bool, timeout: Duration) -> bool {
        let start = Instant::now();
        while !cond() {
            if start.elapsed() > timeout {
                return false;
            }
            thread::yield_now();
        }
        true
    }

    fn counting_timeline(
        name: &str,
        resolution: Duration,
        duration: Duration,
        repeating: bool,
        tick_now: bool,
    ) -> (Timeline, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let schedule = Timeline::new();
        let counter = Arc::clone(&calls);
        assert!(
            schedule.timer_add(
                name,
                resolution,
                duration,
                repeating,
                move |_| {
                    counter.fetch_add(1, Ordering::SeqCst);
                },
                tick_now,
            ),
            "unable to add timer"
        );
        (schedule, calls)
    }

    #[test]
    fn test_expiring_timer() {
        let (schedule, calls) = counting_timeline(
            "t1",
            Duration::from_millis(10),
            Duration::from_millis(100),
            false,
            false,
        );

        assert!(
            wait_for(|| calls.load(Ordering::SeqCst) >= 10, Duration::from_secs(5)),
            "timer not ticking in tempo"
        );
        assert_eq!(calls.load(Ordering::SeqCst), 10, "wrong number of iterations");

        thread::sleep(Duration::from_millis(100));
        assert_eq!(
            calls.load(Ordering::SeqCst),
            10,
            "further calls should be impossible"
        );
        drop(schedule);
    }

    #[test]
    fn test_repeating_timer() {
        let (schedule, calls) = counting_timeline(
            "t1",
            Duration::from_millis(10),
            Duration::from_millis(100),
            true,
            false,
        );

        assert!(
            wait_for(|| calls.load(Ordering::SeqCst) >= 11, Duration::from_secs(5)),
            "timer not ticking past its duration"
        );
        drop(schedule);
    }

    #[test]
    fn test_two_timers() {
        let c1 = Arc::new(AtomicUsize::new(0));
        let c2 = Arc::new(AtomicUsize::new(0));

        let schedule = Timeline::new();
        for (name, counter) in [("t1", &c1), ("t2", &c2)] {
            let counter = Arc::clone(counter);
            assert!(
                schedule.timer_add(
                    name,
                    Duration::from_millis(10),
                    Duration::from_millis(100),
                    false,
                    move |_| {
                        counter.fetch_add(1, Ordering::SeqCst);
                    },
                    false,
                ),
                "unable to add timer"
            );
        }

        assert!(
            wait_for(
                || c1.load(Ordering::SeqCst) + c2.load(Ordering::SeqCst) >= 20,
                Duration::from_secs(5)
            ),
            "timers not ticking in tempo"
        );

        assert_eq!(c1.load(Ordering::SeqCst), 10);
        assert_eq!(c2.load(Ordering::SeqCst), 10);

        thread::sleep(Duration::from_millis(100));
        assert_eq!(
            c1.load(Ordering::SeqCst) + c2.load(Ordering::SeqCst),
            20,
            "further calls should be impossible"
        );
    }

    #[test]
    fn test_tick_now_first_observation() {
        let observed = Arc::new(AtomicU64::new(u64::MAX));
        let seen = Arc::new(AtomicUsize::new(0));

        let schedule = Timeline::new();
        {
            let observed = Arc::clone(&observed);
            let seen = Arc::clone(&seen);
            assert!(schedule.timer_add(
                "t1",
                Duration::from_millis(100),
                Duration::from_millis(500),
                false,
                move |state| {
                    if seen.fetch_add(1, Ordering::SeqCst) == 0 {
                        observed.store(state.remaining().as_millis() as u64, Ordering::SeqCst);
                    }
                },
                true,
            ));
        }

        assert!(wait_for(
            || seen.load(Ordering::SeqCst) >= 1,
            Duration::from_secs(5)
        ));
        // An immediately armed timer observes the full duration first.
        assert_eq!(observed.load(Ordering::SeqCst), 500);
    }

    #[test]
    fn test_deferred_first_observation() {
        let observed = Arc::new(AtomicU64::new(u64::MAX));
        let seen = Arc::new(AtomicUsize::new(0));

        let schedule = Timeline::new();
        {
            let observed = Arc::clone(&observed);
            let seen = Arc::clone(&seen);
            assert!(schedule.timer_add(
                "t1",
                Duration::from_millis(100),
                Duration::from_millis(500),
                false,
                move |state| {
                    if seen.fetch_add(1, Ordering::SeqCst) == 0 {
                        observed.store(state.remaining().as_millis() as u64, Ordering::SeqCst);
                    }
                },
                false,
            ));
        }

        assert!(wait_for(
            || seen.load(Ordering::SeqCst) >= 1,
            Duration::from_secs(5)
        ));
        // A deferred first tick has already consumed one resolution.
        assert_eq!(observed.load(Ordering::SeqCst), 400);
    }

    #[test]
    fn test_reset_rewinds_to_full_duration() {
        let observations = Arc::new(Mutex::new(Vec::new()));

        let schedule = Timeline::new();
        {
            let observations = Arc::clone(&observations);
            assert!(schedule.timer_add(
                "t1",
                Duration::from_millis(50),
                Duration::from_millis(1_000),
                false,
                move |state| {
                    observations.lock().push(state.remaining().as_millis() as u64);
                },
                false,
            ));
        }

        assert!(wait_for(
            || observations.lock().len() >= 2,
            Duration::from_secs(5)
        ));
        assert!(schedule.timer_reset("t1"));

        // Reset re-arms immediately, so the next observation after the
        // ordinary countdown ticks is the full duration again.
        assert!(wait_for(
            || observations.lock().contains(&1_000),
            Duration::from_secs(5)
        ));

        let seen = observations.lock();
        let first_full = seen.iter().position(|&r| r == 1_000).unwrap();
        assert!(first_full >= 2, "reset pre-empted the ordinary ticks");
        assert!(
            seen[..first_full].iter().all(|&r| r < 1_000),
            "countdown exceeded duration before reset: {seen:?}"
        );
    }

    #[test]
    fn test_pause_resume_continues_countdown() {
        let observations = Arc::new(Mutex::new(Vec::new()));

        let schedule = Timeline::new();
        {
            let observations = Arc::clone(&observations);
            assert!(schedule.timer_add(
                "t1",
                Duration::from_millis(50),
                Duration::from_millis(2_000),
                false,
                move |state| {
                    observations.lock().push(state.remaining().as_millis() as u64);
                },
                false,
            ));
        }

        assert!(wait_for(
            || observations.lock().len() >= 2,
            Duration::from_secs(5)
        ));
        assert!(schedule.timer_pause("t1"));

        let at_pause = *observations.lock().last().unwrap();
        let ticks_at_pause = observations.lock().len();

        thread::sleep(Duration::from_millis(200));
        assert_eq!(observations.lock().len(), ticks_at_pause, "paused timer ticked");

        assert!(schedule.timer_resume("t1"));
        assert!(wait_for(
            || observations.lock().len() > ticks_at_pause,
            Duration::from_secs(5)
        ));
        // The countdown picks up exactly where it paused.
        assert_eq!(observations.lock()[ticks_at_pause], at_pause - 50);
    }

    #[test]
    fn test_remove_stops_ticking_and_serialization() {
        let (schedule, calls) = counting_timeline(
            "t1",
            Duration::from_millis(500),
            Duration::from_secs(10),
            true,
            true,
        );

        assert!(
            wait_for(|| calls.load(Ordering::SeqCst) >= 1, Duration::from_secs(5)),
            "first tick missing"
        );
        assert!(schedule.timer_remove("t1"));
        let after_removal = calls.load(Ordering::SeqCst);

        assert_eq!(schedule.serialize(true, true, true), Vec::<String>::new());

        thread::sleep(Duration::from_millis(600));
        assert_eq!(
            calls.load(Ordering::SeqCst),
            after_removal,
            "removed timer kept ticking"
        );
    }

    #[test]
    fn test_deserialize_serialize_fixed_point() {
        let elements = vec!["timer:t3:100:500:500:0:1".to_string()];
        let schedule = Timeline::from_state(&elements, |_| {}).unwrap();
        assert_eq!(schedule.serialize(true, true, true), elements);
    }

    #[test]
    fn test_round_trip_is_name_ordered() {
        let elements = vec![
            "timer:t4:100:500:500:1:0".to_string(),
            "timer:t3:100:500:500:0:0".to_string(),
            "timer:t1:1000:10000:10000:1:0".to_string(),
            "timer:t2:1000:10000:10000:0:0".to_string(),
        ];

        let schedule = Timeline::from_state(&elements, |_| {}).unwrap();
        let serialized = schedule.serialize(true, true, true);

        let mut expected = elements.clone();
        expected.sort();
        assert_eq!(serialized, expected);
    }

    #[test]
    fn test_restored_active_timer_resumes_ticking() {
        let calls = Arc::new(AtomicUsize::new(0));
        let schedule = {
            let calls = Arc::clone(&calls);
            Timeline::from_state(&["timer:t1:10:100:100:0:1".to_string()], move |_| {
                calls.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap()
        };

        assert!(
            wait_for(|| calls.load(Ordering::SeqCst) >= 10, Duration::from_secs(5)),
            "restored timer not ticking"
        );
        drop(schedule);
    }

    #[test]
    fn test_dropping_timeline_quiesces_callbacks() {
        let (schedule, calls) = counting_timeline(
            "t1",
            Duration::from_millis(10),
            Duration::from_millis(100),
            true,
            false,
        );

        assert!(wait_for(
            || calls.load(Ordering::SeqCst) >= 1,
            Duration::from_secs(5)
        ));
        drop(schedule);

        let after_drop = calls.load(Ordering::SeqCst);
        thread::sleep(Duration::from_millis(100));
        assert_eq!(
            calls.load(Ordering::SeqCst),
            after_drop,
            "callback fired after timeline destruction"
        );
    }

    #[test]
    fn test_detached_immediate_burst() {
        let calls = Arc::new(AtomicUsize::new(0));
        let plan = CallScheduler::new(true, 2).unwrap();

        for _ in 0..100 {
            let calls = Arc::clone(&calls);
            plan.add(
                move || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    CallResult::Finished
                },
                Duration::from_micros(1),
                true,
            )
            .detach();
        }

        assert!(
            wait_for(|| calls.load(Ordering::SeqCst) == 100, Duration::from_secs(1)),
            "detached burst not fully executed"
        );
    }

    #[test]
    fn test_repetition_rate_is_plausible() {
        let calls = Arc::new(AtomicUsize::new(0));
        let plan = CallScheduler::new(true, 1).unwrap();

        let token = {
            let calls = Arc::clone(&calls);
            plan.add(
                move || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    CallResult::Repeat
                },
                Duration::from_millis(50),
                true,
            )
        };

        thread::sleep(Duration::from_millis(500));
        drop(token);

        // Roughly T / interval invocations; wide bounds for scheduling
        // noise on shared machines.
        let count = calls.load(Ordering::SeqCst);
        assert!(count >= 5, "too few repetitions: {count}");
        assert!(count <= 12, "too many repetitions: {count}");
    }

    fn measure_gaps(compensate: bool, interval: Duration, busy: Duration, reps: usize) -> Vec<Duration> {
        let stamps = Arc::new(Mutex::new(Vec::new()));
        let plan = CallScheduler::new(compensate, 1).unwrap();

        {
            let stamps = Arc::clone(&stamps);
            plan.add(
                move || {
                    let mut stamps = stamps.lock();
                    stamps.push(Instant::now());
                    let done = stamps.len() >= reps;
                    drop(stamps);

                    spin_sleep::sleep(busy);
                    if done {
                        CallResult::Finished
                    } else {
                        CallResult::Repeat
                    }
                },
                interval,
                false,
            )
            .detach();
        }

        assert!(
            wait_for(|| stamps.lock().len() >= reps, Duration::from_secs(10)),
            "periodic task did not complete its repetitions"
        );

        let stamps = stamps.lock();
        stamps.windows(2).map(|w| w[1] - w[0]).collect()
    }

    #[test]
    fn test_noncompensating_gap_includes_execution_time() {
        let interval = Duration::from_millis(50);
        let busy = Duration::from_millis(30);

        let gaps = measure_gaps(false, interval, busy, 6);
        let avg = gaps.iter().sum::<Duration>() / gaps.len() as u32;

        // Execution time stacks on top of the interval: gaps approximate
        // interval + busy. The midpoint between the two modes separates
        // them robustly.
        assert!(
            avg >= Duration::from_millis(65),
            "gap too short for a non-compensating scheduler: {avg:?}"
        );
        assert!(
            avg <= Duration::from_millis(200),
            "gap implausibly long: {avg:?}"
        );
    }

    #[test]
    fn test_compensating_gap_absorbs_execution_time() {
        let interval = Duration::from_millis(50);
        let busy = Duration::from_millis(30);

        let gaps = measure_gaps(true, interval, busy, 6);
        let avg = gaps.iter().sum::<Duration>() / gaps.len() as u32;

        // Execution time is part of the interval: gaps approximate the
        // interval itself.
        assert!(
            avg >= Duration::from_millis(40),
            "gap shorter than the interval: {avg:?}"
        );
        assert!(
            avg < Duration::from_millis(65),
            "compensation failed to absorb execution time: {avg:?}"
        );
    }

    #[test]
    fn test_countdown_never_leaves_bounds() {
        let observations = Arc::new(Mutex::new(Vec::new()));
        let duration_ms = 500u64;

        let schedule = Timeline::new();
        {
            let observations = Arc::clone(&observations);
            assert!(schedule.timer_add(
                "t1",
                Duration::from_millis(10),
                Duration::from_millis(duration_ms),
                true,
                move |state| {
                    observations.lock().push(state.remaining().as_millis() as u64);
                },
                true,
            ));
        }

        assert!(wait_for(
            || observations.lock().len() >= 20,
            Duration::from_secs(5)
        ));
        assert!(schedule.timer_stop("t1"));
        assert!(schedule.timer_resume("t1"));
        assert!(wait_for(
            || observations.lock().len() >= 30,
            Duration::from_secs(5)
        ));
        assert!(schedule.timer_remove("t1"));

        let seen = observations.lock();
        assert!(
            seen.iter().all(|&r| r <= duration_ms),
            "countdown exceeded duration: {seen:?}"
        );
    }
}
