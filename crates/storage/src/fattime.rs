//! FAT timestamp source.
//!
//! The ingest node has no battery-backed RTC by default, so directory entries
//! carry a fixed epoch instead of wall-clock time: 2025-01-01 00:00:00. A
//! board with an RTC swaps in its own [`TimeProvider`] at mount time.

use embedded_fatfs::{Date, DateTime, Time, TimeProvider};

/// Fixed FAT epoch year used when no RTC is wired.
pub const FIXED_EPOCH_YEAR: u16 = 2025;

/// [`TimeProvider`] that stamps every filesystem object with the fixed epoch.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedClock;

impl FixedClock {
    /// Create the fixed-epoch clock.
    pub const fn new() -> Self {
        Self
    }

    /// The date stamped on every object: 2025-01-01.
    fn date() -> Date {
        Date {
            year: FIXED_EPOCH_YEAR,
            month: 1,
            day: 1,
        }
    }
}

impl TimeProvider for FixedClock {
    fn get_current_date(&self) -> Date {
        Self::date()
    }

    fn get_current_date_time(&self) -> DateTime {
        DateTime {
            date: Self::date(),
            time: Time {
                hour: 0,
                min: 0,
                sec: 0,
                millis: 0,
            },
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn fixed_clock_reports_2025_epoch() {
        let dt = FixedClock::new().get_current_date_time();
        assert_eq!(dt.date.year, 2025);
        assert_eq!(dt.date.month, 1);
        assert_eq!(dt.date.day, 1);
        assert_eq!((dt.time.hour, dt.time.min, dt.time.sec), (0, 0, 0));
    }

    #[test]
    fn date_and_datetime_agree() {
        let clock = FixedClock::new();
        assert_eq!(clock.get_current_date(), clock.get_current_date_time().date);
    }
}
