//! Interval stability demo
//!
//! Prints the elapsed time of every repetition of a detached task so the
//! two scheduling modes can be compared: with compensation the printed
//! deltas stay near the requested interval, without it the simulated
//! execution time accumulates on top.

use std::env;
use std::io;
use std::process;
use std::time::{Duration, Instant};
use timeplan::{CallResult, CallScheduler};

fn main() {
    tracing_subscriber::fmt::init();

    let mut args = env::args().skip(1);
    let (Some(ms), Some(compensate)) = (args.next(), args.next()) else {
        eprintln!("usage: ticker <interval-ms> <compensate 0|1>");
        process::exit(1);
    };
    let interval = Duration::from_millis(ms.parse().unwrap_or(500));
    let compensate = compensate != "0";

    let scheduler = match CallScheduler::new(compensate, 1) {
        Ok(scheduler) => scheduler,
        Err(err) => {
            eprintln!("{err}");
            process::exit(1);
        }
    };

    let start = Instant::now();
    let mut value = 1u64;
    scheduler
        .add(
            move || {
                println!("{value}. reached after {}ms", start.elapsed().as_millis());
                value += 1;
                // Simulated work so the two modes diverge visibly.
                spin_sleep::sleep(Duration::from_millis(20));
                CallResult::Repeat
            },
            interval,
            false,
        )
        .detach();

    println!("enter any input to exit");
    let mut line = String::new();
    let _ = io::stdin().read_line(&mut line);
}
