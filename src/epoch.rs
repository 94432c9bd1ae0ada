// This library is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This library is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this library.  If not, see <http://www.gnu.org/licenses/>.
//! Calendar arithmetic between broken-down dates and epoch seconds.
//!
//! Nothing here reads any ambient state, so it is safe to use before the
//! buses or the host link are up.  Only 1970 through 2099 is supported;
//! values outside that range give unspecified (but non-panicking) results.

use core::fmt;

/// Signed seconds since 1970-01-01T00:00:00Z.
///
/// 32 bits run out in 2038, well before the end of the supported range.
pub type EpochSeconds = i64;

pub const SECS_PER_MINUTE: i64 = 60;
pub const SECS_PER_HOUR: i64 = 3600;
pub const SECS_PER_DAY: i64 = 86_400;

/// A broken-down calendar time.
///
/// Values coming out of a time source are UTC; values coming out of the
/// zone engine are local wall time.  The type itself carries no zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DateTime {
    pub year: u16,
    /// 1-12
    pub month: u8,
    /// 1-31
    pub day: u8,
    /// 0-23
    pub hour: u8,
    /// 0-59
    pub minute: u8,
    /// 0-59
    pub second: u8,
}

impl DateTime {
    #[must_use]
    pub const fn new(year: u16, month: u8, day: u8, hour: u8, minute: u8, second: u8) -> Self {
        Self {
            year,
            month,
            day,
            hour,
            minute,
            second,
        }
    }

    /// True when every field is in range for 1970 through 2099.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        (1970..=2099).contains(&self.year)
            && (1..=12).contains(&self.month)
            && self.day >= 1
            && self.day <= days_in_month(self.year, self.month)
            && self.hour < 24
            && self.minute < 60
            && self.second < 60
    }

    #[must_use]
    pub fn to_epoch(&self) -> EpochSeconds {
        to_epoch(self)
    }

    #[must_use]
    pub fn from_epoch(epoch: EpochSeconds) -> Self {
        from_epoch(epoch)
    }

    /// Day of the week, Sunday = 0.
    #[must_use]
    pub fn weekday(&self) -> u8 {
        day_of_week(self.year, self.month, self.day)
    }
}

impl fmt::Display for DateTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}",
            self.year, self.month, self.day, self.hour, self.minute, self.second
        )
    }
}

/// Convert a UTC calendar time to epoch seconds.
///
/// January and February are counted as months 13 and 14 of the previous
/// year so the leap day lands at the end of the counting year.
#[must_use]
pub fn to_epoch(dt: &DateTime) -> EpochSeconds {
    let (y, m) = if dt.month <= 2 {
        (i64::from(dt.year) - 1, i64::from(dt.month) + 12)
    } else {
        (i64::from(dt.year), i64::from(dt.month))
    };
    // 59 days separate 1970-01-01 from 1970-03-01, where the count starts.
    let days = 365 * (y - 1970)
        + (y - 1968).div_euclid(4)
        + (153 * (m - 3) + 2) / 5
        + i64::from(dt.day)
        - 1
        + 59;
    days * SECS_PER_DAY
        + i64::from(dt.hour) * SECS_PER_HOUR
        + i64::from(dt.minute) * SECS_PER_MINUTE
        + i64::from(dt.second)
}

/// Convert epoch seconds back to a UTC calendar time.
#[must_use]
pub fn from_epoch(epoch: EpochSeconds) -> DateTime {
    let days = epoch.div_euclid(SECS_PER_DAY);
    let secs = epoch.rem_euclid(SECS_PER_DAY);

    // Days-to-civil over 400 year eras, counted from 0000-03-01.
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z - era * 146_097;
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = doy - (153 * mp + 2) / 5 + 1;
    let month = if mp < 10 { mp + 3 } else { mp - 9 };
    let year = yoe + era * 400 + i64::from(month <= 2);

    DateTime {
        year: year.clamp(0, i64::from(u16::MAX)) as u16,
        month: month as u8,
        day: day as u8,
        hour: (secs / SECS_PER_HOUR) as u8,
        minute: ((secs % SECS_PER_HOUR) / SECS_PER_MINUTE) as u8,
        second: (secs % SECS_PER_MINUTE) as u8,
    }
}

#[must_use]
pub fn is_leap_year(year: u16) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

#[must_use]
pub fn days_in_month(year: u16, month: u8) -> u8 {
    match month {
        4 | 6 | 9 | 11 => 30,
        2 if is_leap_year(year) => 29,
        2 => 28,
        _ => 31,
    }
}

/// Day of the week for a calendar date, Sunday = 0.
///
/// Zeller's congruence, which yields Saturday = 0, shifted by one.
#[must_use]
pub fn day_of_week(year: u16, month: u8, day: u8) -> u8 {
    let (y, m) = if month < 3 {
        (u32::from(year) - 1, u32::from(month) + 12)
    } else {
        (u32::from(year), u32::from(month))
    };
    let k = y % 100;
    let j = y / 100;
    let h = (u32::from(day) + 13 * (m + 1) / 5 + k + k / 4 + j / 4 + 5 * j) % 7;
    ((h + 6) % 7) as u8
}

/// Day of the month of the first Sunday.
#[must_use]
pub fn first_sunday(year: u16, month: u8) -> u8 {
    1 + (7 - day_of_week(year, month, 1)) % 7
}
