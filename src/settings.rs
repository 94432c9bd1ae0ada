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
//! Persistent settings.
//!
//! Settings are changed by `key=value` commands from the host and written to
//! EEPROM only on an explicit `save`, then read back at startup.
//!
//! Image layout:
//!
//! | byte  | contents                                         |
//! |-------|--------------------------------------------------|
//! | 0     | magic [`MAGIC`]                                  |
//! | 1     | brightness, 0-15                                 |
//! | 2     | flags, see `flag`                                |
//! | 3..7  | fixed offset, seconds east of UTC, i32 LE        |
//! | 7     | rule length                                      |
//! | 8..56 | rule text                                        |

use core::fmt::Debug;

use log::info;
use thiserror_no_std::Error;

use crate::posix_tz::{PosixRule, RuleError};
use crate::tz::{RuleText, TimeZoneConfig, MAX_OFFSET, RULE_CAPACITY};

/// Marks an image written by this firmware.  Erased EEPROM reads 0xFF.
pub const MAGIC: u8 = 0xC1;

pub const IMAGE_LEN: usize = 8 + RULE_CAPACITY;

mod flag {
    pub const TWELVE_HOUR: u8 = 1 << 0;
    pub const TILT_ACTIVE_HIGH: u8 = 1 << 1;
    pub const HEARTBEAT: u8 = 1 << 2;
    pub const RULE_MODE: u8 = 1 << 3;
    pub const DST_BUMP: u8 = 1 << 4;
}

// "Factory" defaults.
const BRIGHTNESS_DEFAULT: u8 = 8;
const BRIGHTNESS_MAX: u8 = 15;
const TWELVE_HOUR_DEFAULT: bool = false;
const TILT_ACTIVE_HIGH_DEFAULT: bool = true;
const HEARTBEAT_DEFAULT: bool = true;

const OFFSET_MIN: i32 = -MAX_OFFSET;
const RULE_MAX: u8 = RULE_CAPACITY as u8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub zone: TimeZoneConfig,

    /// Panel intensity (range: 0-15)  Default: 8
    pub brightness: u8,

    /// 12 hour face without leading zero.  Default: off
    pub twelve_hour: bool,

    /// Tilt switch reads high when the clock is upside down.  Default: on
    pub tilt_active_high: bool,

    /// Toggle the corner pixel every second.  Default: on
    pub heartbeat: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            zone: TimeZoneConfig::default(),
            brightness: BRIGHTNESS_DEFAULT,
            twelve_hour: TWELVE_HOUR_DEFAULT,
            tilt_active_high: TILT_ACTIVE_HIGH_DEFAULT,
            heartbeat: HEARTBEAT_DEFAULT,
        }
    }
}

/// What a command changed, so the caller can push it to the hardware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
    Zone,
    Brightness(u8),
    TwelveHour,
    TiltPolarity(bool),
    Heartbeat(bool),
    /// Nothing changed; persist the current settings.
    Save,
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    #[error("unknown setting")]
    UnknownKey,

    #[error("value out of range")]
    BadValue,

    #[error("zone rule longer than {} bytes", RULE_CAPACITY)]
    RuleTooLong,

    #[error("zone rule invalid: {0}")]
    BadRule(RuleError),

    #[error("dst bump applies to a fixed offset only")]
    NotFixedOffset,
}

impl Settings {
    /// Decode a stored image.  Each field that is out of range falls back to
    /// its default; an image without the magic byte is all defaults.
    #[must_use]
    pub fn from_bytes(image: &[u8; IMAGE_LEN]) -> Self {
        if image[0] != MAGIC {
            return Settings::default();
        }
        let flags = image[2];
        let zone = if flags & flag::RULE_MODE != 0 {
            let rule = match image[7] {
                len @ 1..=RULE_MAX => core::str::from_utf8(&image[8..8 + usize::from(len)]).ok(),
                _ => None,
            };
            match rule.and_then(|r| RuleText::try_from(r).ok()) {
                Some(text) => TimeZoneConfig::Rule(text),
                None => TimeZoneConfig::default(),
            }
        } else {
            match i32::from_le_bytes([image[3], image[4], image[5], image[6]]) {
                offset @ OFFSET_MIN..=MAX_OFFSET => TimeZoneConfig::FixedOffset {
                    offset,
                    dst_bump: flags & flag::DST_BUMP != 0,
                },
                _ => TimeZoneConfig::default(),
            }
        };
        Settings {
            zone,
            brightness: match image[1] {
                v @ 0..=BRIGHTNESS_MAX => v,
                _ => BRIGHTNESS_DEFAULT,
            },
            twelve_hour: flags & flag::TWELVE_HOUR != 0,
            tilt_active_high: flags & flag::TILT_ACTIVE_HIGH != 0,
            heartbeat: flags & flag::HEARTBEAT != 0,
        }
    }

    #[must_use]
    pub fn to_bytes(&self) -> [u8; IMAGE_LEN] {
        let mut image = [0u8; IMAGE_LEN];
        image[0] = MAGIC;
        image[1] = self.brightness;
        let mut flags = 0;
        if self.twelve_hour {
            flags |= flag::TWELVE_HOUR;
        }
        if self.tilt_active_high {
            flags |= flag::TILT_ACTIVE_HIGH;
        }
        if self.heartbeat {
            flags |= flag::HEARTBEAT;
        }
        match &self.zone {
            TimeZoneConfig::Rule(text) => {
                flags |= flag::RULE_MODE;
                // RuleText cannot exceed RULE_CAPACITY.
                image[7] = text.len() as u8;
                image[8..8 + text.len()].copy_from_slice(text.as_bytes());
            }
            TimeZoneConfig::FixedOffset { offset, dst_bump } => {
                if *dst_bump {
                    flags |= flag::DST_BUMP;
                }
                image[3..7].copy_from_slice(&offset.to_le_bytes());
            }
        }
        image[2] = flags;
        image
    }

    /// Apply one `key=value` command (or `save`).
    ///
    /// Keys: `tz` (POSIX rule), `offset` (seconds east), `dst` (0/1),
    /// `bright` (0-15), `h12`, `tilt`, `beat` (0/1).
    pub fn apply_command(&mut self, command: &str) -> Result<Change, ConfigError> {
        let command = command.trim();
        if command == "save" {
            return Ok(Change::Save);
        }
        let (key, value) = command.split_once('=').ok_or(ConfigError::UnknownKey)?;
        let value = value.trim();
        let change = match key.trim() {
            "tz" => {
                let text = RuleText::try_from(value).map_err(|_| ConfigError::RuleTooLong)?;
                PosixRule::parse(&text).map_err(ConfigError::BadRule)?;
                self.zone = TimeZoneConfig::Rule(text);
                Change::Zone
            }
            "offset" => {
                let offset = match value.parse::<i32>() {
                    Ok(v @ OFFSET_MIN..=MAX_OFFSET) => v,
                    _ => return Err(ConfigError::BadValue),
                };
                let dst_bump = match self.zone {
                    TimeZoneConfig::FixedOffset { dst_bump, .. } => dst_bump,
                    TimeZoneConfig::Rule(_) => false,
                };
                self.zone = TimeZoneConfig::FixedOffset { offset, dst_bump };
                Change::Zone
            }
            "dst" => {
                let on = parse_flag(value)?;
                match &mut self.zone {
                    TimeZoneConfig::FixedOffset { dst_bump, .. } => *dst_bump = on,
                    TimeZoneConfig::Rule(_) => return Err(ConfigError::NotFixedOffset),
                }
                Change::Zone
            }
            "bright" => {
                self.brightness = match value.parse::<u8>() {
                    Ok(v @ 0..=BRIGHTNESS_MAX) => v,
                    _ => return Err(ConfigError::BadValue),
                };
                Change::Brightness(self.brightness)
            }
            "h12" => {
                self.twelve_hour = parse_flag(value)?;
                Change::TwelveHour
            }
            "tilt" => {
                self.tilt_active_high = parse_flag(value)?;
                Change::TiltPolarity(self.tilt_active_high)
            }
            "beat" => {
                self.heartbeat = parse_flag(value)?;
                Change::Heartbeat(self.heartbeat)
            }
            _ => return Err(ConfigError::UnknownKey),
        };
        info!("setting {} changed", key);
        Ok(change)
    }
}

fn parse_flag(value: &str) -> Result<bool, ConfigError> {
    match value {
        "0" => Ok(false),
        "1" => Ok(true),
        _ => Err(ConfigError::BadValue),
    }
}

/// Where settings persist across power cycles.
pub trait SettingsStore {
    type Error: Debug;

    fn load(&mut self) -> Result<Settings, Self::Error>;

    /// EEPROM has a limited number of write cycles in its life.  Call this
    /// on explicit request only, never from the loop on a timer.
    fn save(&mut self, settings: &Settings) -> Result<(), Self::Error>;
}
