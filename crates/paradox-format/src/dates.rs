//! Date and time encodings.
//!
//! Dates are stored as a day count where day 1 is 0001-01-01 (proleptic Gregorian). Conversion
//! goes through the Serial Day Number with exact integer arithmetic so that every representable
//! date round-trips; no floating point is involved.

use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, Timelike};

/// Serial Day Number of day 0 in the on-disk day count.
pub const SDN_EPOCH_OFFSET: i64 = 1_721_425;
/// Set on every non-blank 4-byte date or time value.
pub const VALID_FLAG: u32 = 0x8000_0000;
pub const MILLIS_PER_DAY: u32 = 86_400_000;

const GREGOR_SDN_OFFSET: i64 = 32_045;
const DAYS_PER_5_MONTHS: i64 = 153;
const DAYS_PER_4_YEARS: i64 = 1_461;
const DAYS_PER_400_YEARS: i64 = 146_097;

/// Convert a Serial Day Number to a proleptic Gregorian `(year, month, day)`.
///
/// Years are astronomical-free: there is no year 0, so 1 BC is returned as `-1`. Returns `None`
/// for non-positive day numbers.
pub fn sdn_to_gregorian(sdn: i64) -> Option<(i32, u32, u32)> {
    if sdn <= 0 || sdn > (i64::MAX - 4 * GREGOR_SDN_OFFSET) / 4 {
        return None;
    }

    let mut temp = (sdn + GREGOR_SDN_OFFSET) * 4 - 1;

    let century = temp / DAYS_PER_400_YEARS;

    temp = ((temp % DAYS_PER_400_YEARS) / 4) * 4 + 3;
    let mut year = century * 100 + temp / DAYS_PER_4_YEARS;
    let day_of_year = (temp % DAYS_PER_4_YEARS) / 4 + 1;

    temp = day_of_year * 5 - 3;
    let mut month = temp / DAYS_PER_5_MONTHS;
    let day = (temp % DAYS_PER_5_MONTHS) / 5 + 1;

    if month < 10 {
        month += 3;
    } else {
        year += 1;
        month -= 9;
    }

    year -= 4800;
    if year <= 0 {
        year -= 1;
    }

    Some((i32::try_from(year).ok()?, month as u32, day as u32))
}

/// Convert a proleptic Gregorian date (no year 0) to its Serial Day Number.
///
/// Returns `None` for invalid components or dates before SDN 1 (4714-11-25 BC).
pub fn gregorian_to_sdn(year: i32, month: u32, day: u32) -> Option<i64> {
    if year == 0 || year < -4714 || !(1..=12).contains(&month) || !(1..=31).contains(&day) {
        return None;
    }
    if year == -4714 && (month < 11 || (month == 11 && day < 25)) {
        return None;
    }

    let mut year = i64::from(if year < 0 { year + 4801 } else { year + 4800 });
    let month = if month > 2 {
        i64::from(month) - 3
    } else {
        year -= 1;
        i64::from(month) + 9
    };

    Some(
        ((year / 100) * DAYS_PER_400_YEARS) / 4
            + ((year % 100) * DAYS_PER_4_YEARS) / 4
            + (month * DAYS_PER_5_MONTHS + 2) / 5
            + i64::from(day)
            - GREGOR_SDN_OFFSET,
    )
}

/// Convert an on-disk day count to a calendar date. Day counts below 1 precede the epoch floor.
pub fn date_from_day_count(days: i64) -> Option<NaiveDate> {
    if days < 1 {
        return None;
    }
    let (year, month, day) = sdn_to_gregorian(days + SDN_EPOCH_OFFSET)?;
    NaiveDate::from_ymd_opt(year, month, day)
}

/// Convert a calendar date to the on-disk day count; dates before 0001-01-01 are rejected.
pub fn day_count_from_date(date: NaiveDate) -> Option<i64> {
    if date.year() < 1 {
        return None;
    }
    let sdn = gregorian_to_sdn(date.year(), date.month(), date.day())?;
    Some(sdn - SDN_EPOCH_OFFSET)
}

/// Decoded state of a 4-byte date or time slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlaggedU32 {
    Blank,
    Valid(u32),
}

pub fn split_flagged(raw: u32) -> FlaggedU32 {
    if raw & VALID_FLAG == 0 {
        FlaggedU32::Blank
    } else {
        FlaggedU32::Valid(raw & !VALID_FLAG)
    }
}

/// Encode a date as it appears on disk. Returns `None` for dates before the epoch floor.
pub fn encode_date(date: NaiveDate) -> Option<[u8; 4]> {
    let days = day_count_from_date(date)?;
    let days = u32::try_from(days).ok().filter(|d| d & VALID_FLAG == 0)?;
    Some((days | VALID_FLAG).to_be_bytes())
}

/// Decode the 4 on-disk bytes of a date. `Ok(None)` is a blank value, `Err` an out-of-range
/// payload that must not be silently coerced.
pub fn decode_date(bytes: [u8; 4]) -> Result<Option<NaiveDate>, String> {
    match split_flagged(u32::from_be_bytes(bytes)) {
        FlaggedU32::Blank => Ok(None),
        FlaggedU32::Valid(days) => date_from_day_count(i64::from(days))
            .map(Some)
            .ok_or_else(|| format!("day count {days} is outside the supported calendar range")),
    }
}

pub fn encode_time(time: NaiveTime) -> [u8; 4] {
    let millis = time.num_seconds_from_midnight() * 1000 + time.nanosecond() / 1_000_000;
    (millis | VALID_FLAG).to_be_bytes()
}

pub fn decode_time(bytes: [u8; 4]) -> Result<Option<NaiveTime>, String> {
    match split_flagged(u32::from_be_bytes(bytes)) {
        FlaggedU32::Blank => Ok(None),
        FlaggedU32::Valid(millis) => time_from_millis(millis)
            .map(Some)
            .ok_or_else(|| format!("{millis} ms exceeds one day")),
    }
}

fn time_from_millis(millis: u32) -> Option<NaiveTime> {
    if millis >= MILLIS_PER_DAY {
        return None;
    }
    NaiveTime::from_num_seconds_from_midnight_opt(millis / 1000, (millis % 1000) * 1_000_000)
}

/// Combine an on-disk millisecond count (days included) into a timestamp.
pub fn timestamp_from_millis(total_millis: f64) -> Option<NaiveDateTime> {
    if !total_millis.is_finite() || total_millis < 0.0 {
        return None;
    }
    let total = total_millis.trunc() as u64;
    let millis_per_day = u64::from(MILLIS_PER_DAY);
    let days = i64::try_from(total / millis_per_day).ok()?;
    let date = date_from_day_count(days)?;
    let time = time_from_millis((total % millis_per_day) as u32)?;
    Some(NaiveDateTime::new(date, time))
}

pub fn millis_from_timestamp(timestamp: NaiveDateTime) -> Option<f64> {
    let days = day_count_from_date(timestamp.date())?;
    let time = timestamp.time();
    let millis = u64::from(time.num_seconds_from_midnight()) * 1000
        + u64::from(time.nanosecond() / 1_000_000);
    Some(days as f64 * f64::from(MILLIS_PER_DAY) + millis as f64)
}
