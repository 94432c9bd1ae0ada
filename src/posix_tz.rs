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
//! POSIX `TZ` rule strings.
//!
//! Accepts `std offset [dst [offset] [,start[/time],end[/time]]]` where
//! names are three or more letters or `<...>` quoted, offsets are hours
//! *west* of UTC as POSIX has it, and dates are `Jn`, `n` or `Mm.w.d`.
//! A DST name without a rule uses the US rule `M3.2.0,M11.1.0`.
//!
//! Offsets are stored as seconds *east* of UTC, the way the rest of the
//! crate adds them.

use thiserror_no_std::Error;

use crate::epoch::{self, days_in_month, day_of_week, DateTime, EpochSeconds, SECS_PER_DAY};

const DEFAULT_TRANSITION_TIME: i32 = 2 * 3600;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleError {
    #[error("zone name missing or too short")]
    BadName,

    #[error("utc offset malformed")]
    BadOffset,

    #[error("transition date malformed")]
    BadDate,

    #[error("transition time malformed")]
    BadTime,

    #[error("unexpected text after rule")]
    TrailingInput,
}

/// A transition day within a year.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleDate {
    /// `Jn`: 1-365, February 29 is never counted.
    Julian(u16),
    /// `n`: 0-365, February 29 is counted in leap years.
    DayOfYear(u16),
    /// `Mm.w.d`: weekday `d` (Sunday = 0) of week `w` (5 = last) of month `m`.
    MonthWeekDay { month: u8, week: u8, weekday: u8 },
}

impl RuleDate {
    /// UTC midnight at the start of this date in `year`.
    fn midnight(&self, year: u16) -> EpochSeconds {
        let jan1 = DateTime::new(year, 1, 1, 0, 0, 0).to_epoch();
        match *self {
            RuleDate::Julian(n) => {
                let mut day = i64::from(n) - 1;
                if epoch::is_leap_year(year) && n >= 60 {
                    day += 1;
                }
                jan1 + day * SECS_PER_DAY
            }
            RuleDate::DayOfYear(n) => jan1 + i64::from(n) * SECS_PER_DAY,
            RuleDate::MonthWeekDay {
                month,
                week,
                weekday,
            } => {
                let first = day_of_week(year, month, 1);
                let mut day = 1 + (weekday + 7 - first) % 7 + (week - 1) * 7;
                if day > days_in_month(year, month) {
                    day -= 7;
                }
                DateTime::new(year, month, day, 0, 0, 0).to_epoch()
            }
        }
    }
}

/// When a transition happens: a date plus local time of day, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub date: RuleDate,
    pub time: i32,
}

impl Transition {
    /// Epoch of this transition in `year`, given the offset in force just
    /// before it.
    fn at(&self, year: u16, offset_before: i32) -> EpochSeconds {
        self.date.midnight(year) + i64::from(self.time) - i64::from(offset_before)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DstRule {
    pub offset: i32,
    pub start: Transition,
    pub end: Transition,
}

/// A parsed zone rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PosixRule {
    pub std_offset: i32,
    pub dst: Option<DstRule>,
}

impl PosixRule {
    /// What an unset zone means: UTC with no DST.
    pub const UTC: PosixRule = PosixRule {
        std_offset: 0,
        dst: None,
    };

    pub fn parse(rule: &str) -> Result<Self, RuleError> {
        let mut p = Parser {
            s: rule.as_bytes(),
            pos: 0,
        };
        p.name()?;
        let std_offset = -p.offset(24).ok_or(RuleError::BadOffset)?;
        if p.at_end() {
            return Ok(PosixRule {
                std_offset,
                dst: None,
            });
        }

        p.name()?;
        let offset = if matches!(p.peek(), Some(b'0'..=b'9' | b'+' | b'-')) {
            -p.offset(24).ok_or(RuleError::BadOffset)?
        } else {
            std_offset + 3600
        };

        let (start, end) = if p.eat(b',') {
            let start = p.transition()?;
            if !p.eat(b',') {
                return Err(RuleError::BadDate);
            }
            (start, p.transition()?)
        } else {
            (
                Transition {
                    date: RuleDate::MonthWeekDay {
                        month: 3,
                        week: 2,
                        weekday: 0,
                    },
                    time: DEFAULT_TRANSITION_TIME,
                },
                Transition {
                    date: RuleDate::MonthWeekDay {
                        month: 11,
                        week: 1,
                        weekday: 0,
                    },
                    time: DEFAULT_TRANSITION_TIME,
                },
            )
        };
        if !p.at_end() {
            return Err(RuleError::TrailingInput);
        }

        Ok(PosixRule {
            std_offset,
            dst: Some(DstRule { offset, start, end }),
        })
    }

    /// Offset east of UTC in force at `epoch`, and whether it is DST.
    #[must_use]
    pub fn offset_at(&self, epoch: EpochSeconds) -> (i32, bool) {
        let Some(dst) = &self.dst else {
            return (self.std_offset, false);
        };
        let year = DateTime::from_epoch(epoch + i64::from(self.std_offset)).year;
        let start = dst.start.at(year, self.std_offset);
        let end = dst.end.at(year, dst.offset);
        let in_dst = if start < end {
            epoch >= start && epoch < end
        } else {
            // Southern hemisphere: DST spans the new year.
            epoch >= start || epoch < end
        };
        if in_dst {
            (dst.offset, true)
        } else {
            (self.std_offset, false)
        }
    }
}

struct Parser<'a> {
    s: &'a [u8],
    pos: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Option<u8> {
        self.s.get(self.pos).copied()
    }

    fn at_end(&self) -> bool {
        self.pos >= self.s.len()
    }

    fn eat(&mut self, c: u8) -> bool {
        if self.peek() == Some(c) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn name(&mut self) -> Result<(), RuleError> {
        let start = self.pos;
        if self.eat(b'<') {
            while let Some(c) = self.peek() {
                self.pos += 1;
                if c == b'>' {
                    return if self.pos - start - 2 >= 3 {
                        Ok(())
                    } else {
                        Err(RuleError::BadName)
                    };
                }
                if !(c.is_ascii_alphanumeric() || c == b'+' || c == b'-') {
                    return Err(RuleError::BadName);
                }
            }
            return Err(RuleError::BadName);
        }
        while matches!(self.peek(), Some(c) if c.is_ascii_alphabetic()) {
            self.pos += 1;
        }
        if self.pos - start >= 3 {
            Ok(())
        } else {
            Err(RuleError::BadName)
        }
    }

    fn number(&mut self, max_digits: usize) -> Option<u32> {
        let start = self.pos;
        let mut n: u32 = 0;
        while let Some(c @ b'0'..=b'9') = self.peek() {
            if self.pos - start == max_digits {
                return None;
            }
            n = n * 10 + u32::from(c - b'0');
            self.pos += 1;
        }
        (self.pos > start).then_some(n)
    }

    /// `[+-]hh[:mm[:ss]]` in seconds, hours up to `max_hours`.
    fn offset(&mut self, max_hours: u32) -> Option<i32> {
        let negative = if self.eat(b'-') {
            true
        } else {
            self.eat(b'+');
            false
        };
        let hours = self.number(3)?;
        let mut minutes = 0;
        let mut seconds = 0;
        if self.eat(b':') {
            minutes = self.number(2)?;
            if self.eat(b':') {
                seconds = self.number(2)?;
            }
        }
        if hours > max_hours || minutes > 59 || seconds > 59 {
            return None;
        }
        let value = (hours * 3600 + minutes * 60 + seconds) as i32;
        Some(if negative { -value } else { value })
    }

    fn transition(&mut self) -> Result<Transition, RuleError> {
        let date = if self.eat(b'J') {
            match self.number(3) {
                Some(n @ 1..=365) => RuleDate::Julian(n as u16),
                _ => return Err(RuleError::BadDate),
            }
        } else if self.eat(b'M') {
            let month = self.number(2).ok_or(RuleError::BadDate)?;
            if !self.eat(b'.') {
                return Err(RuleError::BadDate);
            }
            let week = self.number(1).ok_or(RuleError::BadDate)?;
            if !self.eat(b'.') {
                return Err(RuleError::BadDate);
            }
            let weekday = self.number(1).ok_or(RuleError::BadDate)?;
            if !(1..=12).contains(&month) || !(1..=5).contains(&week) || weekday > 6 {
                return Err(RuleError::BadDate);
            }
            RuleDate::MonthWeekDay {
                month: month as u8,
                week: week as u8,
                weekday: weekday as u8,
            }
        } else {
            match self.number(3) {
                Some(n @ 0..=365) => RuleDate::DayOfYear(n as u16),
                _ => return Err(RuleError::BadDate),
            }
        };
        let time = if self.eat(b'/') {
            self.offset(167).ok_or(RuleError::BadTime)?
        } else {
            DEFAULT_TRANSITION_TIME
        };
        Ok(Transition { date, time })
    }
}
