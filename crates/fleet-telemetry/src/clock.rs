//! Anchoring time-of-day log stamps to absolute instants.
//!
//! Worker logs print only `HH:MM:SS`. A stamp is placed on the reference
//! clock's date, or the day before when that would put it more than
//! `FUTURE_SKEW_SECS` ahead of the reference. This is correct for any
//! event less than a day old, which covers every bounded tail we read.

use chrono::{Duration, NaiveDateTime, NaiveTime};

/// Tolerance for worker clocks running slightly ahead of ours.
pub const FUTURE_SKEW_SECS: i64 = 60;

/// Unix seconds of `time` on the day it most recently occurred before `now`.
pub fn anchor(now: NaiveDateTime, time: NaiveTime) -> u64 {
    let mut candidate = now.date().and_time(time);
    if candidate > now + Duration::seconds(FUTURE_SKEW_SECS) {
        candidate -= Duration::days(1);
    }
    epoch_secs(candidate)
}

/// Unix seconds of a naive instant, treating it as UTC.
pub fn epoch_secs(at: NaiveDateTime) -> u64 {
    at.and_utc().timestamp().max(0) as u64
}
