//! Timeline walkthrough demo
//!
//! Adds a short countdown timer, lets it tick, pauses it and prints the
//! serialized state, then resumes it until it expires.

use std::time::Duration;
use timeplan::Timeline;

fn main() {
    tracing_subscriber::fmt::init();

    let timeline = Timeline::new();
    let added = timeline.timer_add(
        "demo",
        Duration::from_millis(250),
        Duration::from_millis(2_000),
        false,
        |state| println!("tick: {}ms remaining", state.remaining().as_millis()),
        true,
    );
    assert!(added, "demo timer not added");

    spin_sleep::sleep(Duration::from_millis(900));
    timeline.timer_pause("demo");
    for line in timeline.serialize(true, true, true) {
        println!("paused state: {line}");
    }

    timeline.timer_resume("demo");
    spin_sleep::sleep(Duration::from_millis(1_800));
    for line in timeline.serialize(true, true, true) {
        println!("final state: {line}");
    }
}
