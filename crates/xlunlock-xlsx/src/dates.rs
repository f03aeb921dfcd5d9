//! Excel date serials.
//!
//! Excel stores dates as a day count from an epoch with the time of day as the fractional part.
//! The 1900 system counts 1900-02-29 (serial 60) even though that day never existed, so serials
//! 1..=59 sit one day off a straight count from 1899-12-30. Serial `0` is the "zero date"
//! 1899-12-30, which time-only cells use as their date part.

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};

const MILLIS_PER_DAY: f64 = 86_400_000.0;

/// Largest serial Excel accepts (9999-12-31 23:59:59.999 in the 1900 system).
const MAX_SERIAL: f64 = 2_958_466.0;

/// Serial of the fictitious 1900-02-29.
const PHANTOM_LEAP_DAY: f64 = 60.0;

/// Workbook date system (`<workbookPr date1904="1"/>` selects [`DateSystem::Excel1904`]).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum DateSystem {
    #[default]
    Excel1900,
    Excel1904,
}

fn zero_date() -> Option<NaiveDateTime> {
    NaiveDate::from_ymd_opt(1899, 12, 30)?.and_hms_opt(0, 0, 0)
}

fn epoch_1904() -> Option<NaiveDateTime> {
    NaiveDate::from_ymd_opt(1904, 1, 1)?.and_hms_opt(0, 0, 0)
}

fn add_days(base: NaiveDateTime, days: f64) -> Option<NaiveDateTime> {
    let millis = (days * MILLIS_PER_DAY).round() as i64;
    base.checked_add_signed(Duration::milliseconds(millis))
}

/// Convert a serial to a date-time.
///
/// Returns `None` for negative, non-finite or out-of-range serials and for serial 60 in the 1900
/// system.
pub fn serial_to_datetime(serial: f64, system: DateSystem) -> Option<NaiveDateTime> {
    if !serial.is_finite() || serial < 0.0 || serial >= MAX_SERIAL {
        return None;
    }
    match system {
        DateSystem::Excel1904 => add_days(epoch_1904()?, serial),
        DateSystem::Excel1900 => {
            let whole = serial.trunc();
            if whole == PHANTOM_LEAP_DAY {
                None
            } else if whole >= 1.0 && whole < PHANTOM_LEAP_DAY {
                add_days(zero_date()?, serial + 1.0)
            } else {
                add_days(zero_date()?, serial)
            }
        }
    }
}

/// Convert a date-time to a serial. Inverse of [`serial_to_datetime`].
///
/// In the 1900 system only the zero date itself is representable before 1900-01-01.
pub fn datetime_to_serial(value: NaiveDateTime, system: DateSystem) -> Option<f64> {
    let (base, shift) = match system {
        DateSystem::Excel1904 => (epoch_1904()?, 0.0),
        DateSystem::Excel1900 => {
            let zero = zero_date()?;
            let first_real_day = NaiveDate::from_ymd_opt(1900, 1, 1)?.and_hms_opt(0, 0, 0)?;
            let leap_cutover = NaiveDate::from_ymd_opt(1900, 3, 1)?.and_hms_opt(0, 0, 0)?;
            if value.date() == zero.date() {
                (zero, 0.0)
            } else if value < first_real_day {
                return None;
            } else if value < leap_cutover {
                (zero, -1.0)
            } else {
                (zero, 0.0)
            }
        }
    };
    if value < base {
        return None;
    }
    let millis = (value - base).num_milliseconds() as f64;
    let serial = millis / MILLIS_PER_DAY + shift;
    (serial < MAX_SERIAL).then_some(serial)
}

/// Serial as written by producers that apply the phantom 1900-02-29 shift to every date before
/// 1900-03-01, including 1899-12-31 (serial 0).
///
/// From 1900-01-01 on this agrees with [`datetime_to_serial`]. The zero date itself would need
/// serial -1 and is rejected; pass it through [`fix_zero_date`] first to get serial 0.
pub fn datetime_to_serial_compat(value: NaiveDateTime) -> Option<f64> {
    let zero = zero_date()?;
    let leap_cutover = NaiveDate::from_ymd_opt(1900, 3, 1)?.and_hms_opt(0, 0, 0)?;
    let mut serial = (value - zero).num_milliseconds() as f64 / MILLIS_PER_DAY;
    if value < leap_cutover {
        serial -= 1.0;
    }
    (0.0..MAX_SERIAL).contains(&serial).then_some(serial)
}

/// Time of day encoded in the fractional part of `serial` (e.g. `1.0 / 1440.0` is 00:01:00).
///
/// Rounds to the nearest second; a fraction that rounds up to a full day is midnight.
pub fn time_of_day(serial: f64) -> NaiveTime {
    if !serial.is_finite() {
        return NaiveTime::default();
    }
    let fraction = serial.rem_euclid(1.0);
    let secs = (fraction * 86_400.0).round() as u32 % 86_400;
    NaiveTime::from_num_seconds_from_midnight_opt(secs, 0).unwrap_or_default()
}

/// Shift the 1899-12-30 midnight zero date forward by one day.
///
/// Writers that treat the zero date as the day before serial 1 (see
/// [`datetime_to_serial_compat`]) store it as 1899-12-29. Adding one day first makes it serial 0,
/// which reads back as the original zero date. Every other value is returned as-is.
pub fn fix_zero_date(value: NaiveDateTime) -> NaiveDateTime {
    match zero_date() {
        Some(zero) if value == zero => value
            .checked_add_signed(Duration::days(1))
            .unwrap_or(value),
        _ => value,
    }
}

/// Whether `serial` holds only a time of day (zero date part).
pub fn is_time_only(serial: f64) -> bool {
    (0.0..1.0).contains(&serial)
}
