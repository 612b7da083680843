//! Date and time wire representation.
//!
//! Dates are a day count relative to 1858-11-17 (the Modified Julian Day
//! epoch). Times are a count of 1/10 000 second units since midnight.

use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, Timelike};

use crate::error::TypeError;

/// `num_days_from_ce` of 1858-11-17.
const EPOCH_DAYS_FROM_CE: i32 = 678_576;

/// Time units per second.
pub const FRACTIONS_PER_SECOND: u32 = 10_000;

const NANOS_PER_FRACTION: u32 = 1_000_000_000 / FRACTIONS_PER_SECOND;

/// Encode a date as days since 1858-11-17.
#[must_use]
pub fn encode_date(date: NaiveDate) -> i32 {
    date.num_days_from_ce() - EPOCH_DAYS_FROM_CE
}

/// Decode a day count.
pub fn decode_date(days: i32) -> Result<NaiveDate, TypeError> {
    days.checked_add(EPOCH_DAYS_FROM_CE)
        .and_then(NaiveDate::from_num_days_from_ce_opt)
        .ok_or_else(|| TypeError::InvalidDateTime(format!("day count {days} out of range")))
}

/// Encode a time of day as 1/10 000 second units.
///
/// Sub-unit precision is truncated; leap seconds clamp to the last unit.
#[must_use]
pub fn encode_time(time: NaiveTime) -> i32 {
    let nanos = time.nanosecond().min(999_999_999);
    let fractions = time.num_seconds_from_midnight() * FRACTIONS_PER_SECOND
        + nanos / NANOS_PER_FRACTION;
    fractions as i32
}

/// Decode 1/10 000 second units since midnight.
pub fn decode_time(fractions: i32) -> Result<NaiveTime, TypeError> {
    let invalid = || TypeError::InvalidDateTime(format!("time value {fractions} out of range"));
    let fractions = u32::try_from(fractions).map_err(|_| invalid())?;
    NaiveTime::from_num_seconds_from_midnight_opt(
        fractions / FRACTIONS_PER_SECOND,
        (fractions % FRACTIONS_PER_SECOND) * NANOS_PER_FRACTION,
    )
    .ok_or_else(invalid)
}

/// Encode a timestamp as `(date, time)`.
#[must_use]
pub fn encode_timestamp(timestamp: NaiveDateTime) -> (i32, i32) {
    (encode_date(timestamp.date()), encode_time(timestamp.time()))
}

/// Decode a `(date, time)` pair.
pub fn decode_timestamp(date: i32, time: i32) -> Result<NaiveDateTime, TypeError> {
    Ok(NaiveDateTime::new(decode_date(date)?, decode_time(time)?))
}
