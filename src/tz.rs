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
//! UTC to local wall time.
//!
//! A zone is either a fixed offset (with an optional flat one hour DST bump)
//! or a POSIX rule string.  Rules are parsed only in [`TimeZone::apply`],
//! on boot, on a configuration change, or on the hourly resync; converting a
//! time is a pure query.
//!
//! Every rule conversion is checked by writing the offset out as a `+hhmm`
//! token and reading it back.  A zero or out-of-range offset means the rule
//! did not take, and that tick is answered by the built-in DST calendar in
//! [`FallbackDst`] instead.  The check runs every tick, so a rule that starts
//! working again is picked up straight away.

use heapless::String;
use log::{info, warn};

use crate::epoch::{first_sunday, DateTime, EpochSeconds};
use crate::error::ClockError;
use crate::posix_tz::{PosixRule, RuleError};

/// Longest rule string that can be configured or stored.
pub const RULE_CAPACITY: usize = 48;

/// Offsets beyond this are not real zones.
pub const MAX_OFFSET: i32 = 14 * 3600;

pub const SYDNEY_RULE: &str = "AEST-10AEDT,M10.1.0,M4.1.0/3";

pub type RuleText = String<RULE_CAPACITY>;

/// The configured zone.  Exactly one mode is active.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimeZoneConfig {
    Rule(RuleText),
    FixedOffset { offset: i32, dst_bump: bool },
}

impl Default for TimeZoneConfig {
    fn default() -> Self {
        TimeZoneConfig::Rule(RuleText::try_from(SYDNEY_RULE).unwrap_or_default())
    }
}

/// A hard-coded DST calendar: standard and DST offsets, switching on the
/// first Sunday of two months at a fixed UTC-referenced time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FallbackDst {
    pub std_offset: i32,
    pub dst_offset: i32,
    /// Month whose first Sunday starts DST.
    pub spring_month: u8,
    /// Month whose first Sunday ends DST.
    pub fall_month: u8,
    /// Seconds from UTC midnight of the Sunday to the switch, may be negative.
    pub transition: i32,
}

impl FallbackDst {
    /// Eastern Australia: 02:00 AEST in October, 03:00 AEDT in April, both
    /// 16:00 UTC on the Saturday.
    pub const SYDNEY: FallbackDst = FallbackDst {
        std_offset: 10 * 3600,
        dst_offset: 11 * 3600,
        spring_month: 10,
        fall_month: 4,
        transition: -8 * 3600,
    };

    fn switch_at(&self, year: u16, month: u8) -> EpochSeconds {
        let sunday = DateTime::new(year, month, first_sunday(year, month), 0, 0, 0);
        sunday.to_epoch() + i64::from(self.transition)
    }

    /// Offset in force at `epoch`, and whether it is DST.
    ///
    /// Whether the window wraps the new year follows from the month order:
    /// a spring month later than the fall month means southern hemisphere.
    #[must_use]
    pub fn offset_at(&self, epoch: EpochSeconds) -> (i32, bool) {
        let year = DateTime::from_epoch(epoch).year;
        let start = self.switch_at(year, self.spring_month);
        let end = self.switch_at(year, self.fall_month);
        let in_dst = if self.spring_month > self.fall_month {
            epoch >= start || epoch < end
        } else {
            epoch >= start && epoch < end
        };
        if in_dst {
            (self.dst_offset, true)
        } else {
            (self.std_offset, false)
        }
    }
}

/// Which path produced a local time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Fixed,
    Rule,
    Fallback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalTime {
    pub wall: DateTime,
    /// Epoch seconds shifted by `offset`.
    pub epoch: EpochSeconds,
    pub offset: i32,
    pub is_dst: bool,
    pub resolution: Resolution,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Fixed { offset: i32, dst_bump: bool },
    Rule(PosixRule),
}

/// The zone engine.  Holds the applied configuration, never ambient state.
#[derive(Debug, Clone)]
pub struct TimeZone {
    mode: Mode,
    fallback: FallbackDst,
    rule_working: bool,
}

impl Default for TimeZone {
    fn default() -> Self {
        Self::new(FallbackDst::SYDNEY)
    }
}

impl TimeZone {
    /// A zone converting as UTC until a configuration is applied.
    #[must_use]
    pub fn new(fallback: FallbackDst) -> Self {
        Self {
            mode: Mode::Rule(PosixRule::UTC),
            fallback,
            rule_working: true,
        }
    }

    /// Make `config` the active zone.
    ///
    /// A rule that does not parse is reported and leaves the zone converting
    /// as UTC, which the per-tick check then catches.
    pub fn apply(&mut self, config: &TimeZoneConfig) -> Result<(), RuleError> {
        match config {
            TimeZoneConfig::FixedOffset { offset, dst_bump } => {
                self.mode = Mode::Fixed {
                    offset: *offset,
                    dst_bump: *dst_bump,
                };
                Ok(())
            }
            TimeZoneConfig::Rule(text) => match PosixRule::parse(text) {
                Ok(rule) => {
                    self.mode = Mode::Rule(rule);
                    Ok(())
                }
                Err(e) => {
                    warn!("zone rule {:?} rejected: {}", text.as_str(), e);
                    self.mode = Mode::Rule(PosixRule::UTC);
                    Err(e)
                }
            },
        }
    }

    /// Convert a UTC time to local wall time.
    pub fn to_local(&mut self, utc: &DateTime) -> LocalTime {
        let epoch = utc.to_epoch();
        let (offset, is_dst, resolution) = match &self.mode {
            Mode::Fixed { offset, dst_bump } => {
                let bump = if *dst_bump { 3600 } else { 0 };
                (offset + bump, *dst_bump, Resolution::Fixed)
            }
            Mode::Rule(rule) => {
                let (offset, is_dst) = rule.offset_at(epoch);
                match verify_offset(offset) {
                    Some(offset) => {
                        if !self.rule_working {
                            info!("zone rule effective again");
                            self.rule_working = true;
                        }
                        (offset, is_dst, Resolution::Rule)
                    }
                    None => {
                        if self.rule_working {
                            warn!("{}, using built-in DST calendar", ClockError::RuleIneffective);
                            self.rule_working = false;
                        }
                        let (offset, is_dst) = self.fallback.offset_at(epoch);
                        (offset, is_dst, Resolution::Fallback)
                    }
                }
            }
        };
        let local = epoch + i64::from(offset);
        LocalTime {
            wall: DateTime::from_epoch(local),
            epoch: local,
            offset,
            is_dst,
            resolution,
        }
    }
}

/// `+hhmm` / `-hhmm` for an offset east of UTC, as `strftime("%z")` has it.
#[must_use]
pub fn offset_token(offset: i32) -> String<8> {
    let mut token = String::new();
    let sign = if offset < 0 { "-" } else { "+" };
    let minutes = offset.unsigned_abs() / 60;
    let (h, m) = (minutes / 60, minutes % 60);
    // Offsets too large for the buffer leave a short token, which fails to parse.
    let _ = ufmt::uwrite!(&mut token, "{}{}{}{}{}", sign, h / 10, h % 10, m / 10, m % 10);
    token
}

/// Seconds east of UTC from a `+hhmm` token.
#[must_use]
pub fn parse_offset_token(token: &str) -> Option<i32> {
    let b = token.as_bytes();
    if b.len() != 5 || !b[1..].iter().all(u8::is_ascii_digit) {
        return None;
    }
    let digit = |i: usize| i32::from(b[i] - b'0');
    let value = (digit(1) * 10 + digit(2)) * 3600 + (digit(3) * 10 + digit(4)) * 60;
    match b[0] {
        b'+' => Some(value),
        b'-' => Some(-value),
        _ => None,
    }
}

/// Round-trip `offset` through its token; `None` if the rule path is not
/// trustworthy.  Zero is indistinguishable from a rule that never applied.
/// The token drops seconds, so a verified offset is returned as given.
fn verify_offset(offset: i32) -> Option<i32> {
    let parsed = parse_offset_token(&offset_token(offset))?;
    if parsed == 0 || parsed.abs() > MAX_OFFSET {
        None
    } else {
        Some(offset)
    }
}
