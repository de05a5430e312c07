//! Excel 1900-epoch serial date/time conversion.
//!
//! Excel's serial day 60 is the fictitious 1900-02-29 (the historical
//! leap-year bug carried forward from Lotus 1-2-3). Serials `>= 60` are
//! shifted by one day relative to a true proleptic Gregorian calendar.

use chrono::{Duration, NaiveDate, NaiveDateTime, Timelike};

const EPOCH_DAY_ZERO: (i32, u32, u32) = (1899, 12, 31);

fn epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(EPOCH_DAY_ZERO.0, EPOCH_DAY_ZERO.1, EPOCH_DAY_ZERO.2)
        .expect("static epoch date is valid")
}

/// Converts a civil date-time to its Excel serial representation.
pub fn to_serial(dt: NaiveDateTime) -> f64 {
    let mut days = (dt.date() - epoch()).num_days();
    if days >= 60 {
        days += 1;
    }
    let seconds_of_day = dt.time().num_seconds_from_midnight() as f64
        + dt.time().nanosecond() as f64 / 1_000_000_000.0;
    days as f64 + seconds_of_day / 86_400.0
}

/// Converts an Excel serial back to a civil date-time, rounding the
/// time-of-day fraction to the nearest whole second.
pub fn from_serial(serial: f64) -> NaiveDateTime {
    let mut days = serial.trunc() as i64;
    let frac = serial.fract();
    let seconds = (frac * 86_400.0).round() as i64;
    let (days, seconds) = if seconds >= 86_400 {
        (days + 1, 0)
    } else {
        (days, seconds)
    };
    if days >= 60 {
        days -= 1;
    }
    let date = epoch() + Duration::days(days);
    date.and_hms_opt(0, 0, 0).unwrap() + Duration::seconds(seconds)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn dt(y: i32, m: u32, d: u32, h: u32, mi: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, mi, s)
            .unwrap()
    }

    #[test]
    fn epoch_day_one_is_1900_01_01() {
        assert_eq!(to_serial(dt(1900, 1, 1, 0, 0, 0)), 1.0);
    }

    #[test]
    fn skips_fictitious_leap_day() {
        // Serial 59 is 1900-02-28; serial 61 is 1900-03-01 (60 never occurs
        // as a real date because Excel treats it as 1900-02-29).
        assert_eq!(to_serial(dt(1900, 2, 28, 0, 0, 0)), 59.0);
        assert_eq!(to_serial(dt(1900, 3, 1, 0, 0, 0)), 61.0);
        assert_eq!(from_serial(59.0), dt(1900, 2, 28, 0, 0, 0));
        assert_eq!(from_serial(61.0), dt(1900, 3, 1, 0, 0, 0));
    }

    #[test]
    fn round_trips_through_serial() {
        let original = dt(2024, 6, 15, 13, 45, 30);
        let serial = to_serial(original);
        assert_eq!(from_serial(serial), original);
    }

    #[test]
    fn rounds_fractional_seconds_on_read_back() {
        let serial = 45000.12345679012; // slightly off an exact second boundary
        let back = from_serial(serial);
        assert_eq!(back.and_utc().timestamp_subsec_nanos(), 0);
    }
}
