//! Serialized element records
//!
//! Timeline entities travel as single-line `:`-delimited strings. Timers
//! use the shape
//! `timer:<name>:<resolution_ms>:<duration_ms>:<remaining_ms>:<repeating>:<active>`.

use crate::error::Error;
use std::fmt;

pub(crate) const FIELD_DELIMITER: char = ':';
pub(crate) const TIMER_TAG: &str = "timer";
pub(crate) const PULSE_TAG: &str = "pulse";
pub(crate) const ALARM_TAG: &str = "alarm";

/// Wire representation of one timer entity.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct TimerRecord {
    pub name: String,
    pub resolution_ms: u64,
    pub duration_ms: u64,
    pub remaining_ms: u64,
    pub repeating: bool,
    pub active: bool,
}

impl TimerRecord {
    /// Parse a `timer` element line, validating field count, integer
    /// fields, flags, and the countdown consistency constraints.
    pub(crate) fn parse(element: &str) -> Result<Self, Error> {
        let malformed = || Error::MalformedElement(element.to_string());

        let fields: Vec<&str> = element.split(FIELD_DELIMITER).collect();
        if fields.len() != 7 || fields[0] != TIMER_TAG {
            return Err(malformed());
        }

        let name = fields[1];
        if name.is_empty() {
            return Err(malformed());
        }

        let resolution_ms: u64 = fields[2].parse().map_err(|_| malformed())?;
        let duration_ms: u64 = fields[3].parse().map_err(|_| malformed())?;
        let remaining_ms: u64 = fields[4].parse().map_err(|_| malformed())?;
        let repeating = flag(fields[5]).ok_or_else(malformed)?;
        let active = flag(fields[6]).ok_or_else(malformed)?;

        if resolution_ms == 0
            || resolution_ms > duration_ms
            || remaining_ms > duration_ms + resolution_ms
        {
            return Err(malformed());
        }

        Ok(Self {
            name: name.to_string(),
            resolution_ms,
            duration_ms,
            remaining_ms,
            repeating,
            active,
        })
    }
}

fn flag(field: &str) -> Option<bool> {
    match field {
        "0" => Some(false),
        "1" => Some(true),
        _ => None,
    }
}

impl fmt::Display for TimerRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}:{}:{}:{}",
            TIMER_TAG,
            self.name,
            self.resolution_ms,
            self.duration_ms,
            self.remaining_ms,
            u8::from(self.repeating),
            u8::from(self.active),
        )
    }
}
