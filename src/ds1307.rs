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
//! DS1307 battery-backed RTC interface.
//!
//! The first seven registers hold seconds, minutes, hours, day of week, day,
//! month and year since 2000, all BCD.  Bit 7 of the seconds register halts
//! the oscillator; it is cleared on every write and ignored on read.  The
//! DS3231 shares this layout and address and works unchanged.

use embedded_hal::i2c::I2c;
use thiserror_no_std::Error;

use crate::bcd;
use crate::epoch::DateTime;

// 104 is the DS1307/DS3231 RTC device address
pub const RTC_ADDRESS: u8 = 0x68;

const REG_SECONDS: u8 = 0x00;
const CLOCK_HALT: u8 = 0b1000_0000;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error<E> {
    #[error("i2c transaction failed: {0:?}")]
    Bus(E),

    #[error("register contents are not a valid time")]
    InvalidData,
}

pub struct Ds1307<I2C> {
    i2c: I2C,
}

impl<I2C: I2c> Ds1307<I2C> {
    pub fn new(i2c: I2C) -> Self {
        Self { i2c }
    }

    /// True if a device acknowledges a read at the RTC address.
    pub fn probe(&mut self) -> bool {
        let mut buf = [0u8; 1];
        self.i2c
            .write_read(RTC_ADDRESS, &[REG_SECONDS], &mut buf)
            .is_ok()
    }

    /// Get the time from the RTC.
    pub fn read(&mut self) -> Result<DateTime, Error<I2C::Error>> {
        // send request to receive data starting at register 0
        let mut buf = [0u8; 7];
        self.i2c
            .write_read(RTC_ADDRESS, &[REG_SECONDS], &mut buf)
            .map_err(Error::Bus)?;
        let dt = decode(&buf);
        if dt.is_valid() {
            Ok(dt)
        } else {
            Err(Error::InvalidData)
        }
    }

    /// Set the time on the RTC.
    ///
    /// A failed write is reported but may have partially landed; nothing is
    /// rolled back.
    pub fn write(&mut self, dt: &DateTime) -> Result<(), Error<I2C::Error>> {
        let regs = encode(dt);
        let mut buf = [0u8; 8];
        buf[0] = REG_SECONDS;
        buf[1..].copy_from_slice(&regs);
        self.i2c.write(RTC_ADDRESS, &buf).map_err(Error::Bus)
    }

    pub fn release(self) -> I2C {
        self.i2c
    }
}

/// Register image for a UTC time.  Years outside 2000..=2099 are clamped.
#[must_use]
pub fn encode(dt: &DateTime) -> [u8; 7] {
    let year = dt.year.clamp(2000, 2099) - 2000;
    [
        bcd::encode(dt.second) & !CLOCK_HALT,
        bcd::encode(dt.minute),
        bcd::encode(dt.hour), // 24 hour mode, bit 6 clear
        dt.weekday() + 1,     // 1-7, Sunday first
        bcd::encode(dt.day),
        bcd::encode(dt.month),
        bcd::encode(year as u8),
    ]
}

/// UTC time from a register image.  Flag bits are masked, nothing is checked.
#[must_use]
pub fn decode(regs: &[u8; 7]) -> DateTime {
    DateTime {
        second: bcd::decode(regs[0] & !CLOCK_HALT),
        minute: bcd::decode(regs[1] & 0b0111_1111),
        hour: bcd::decode(regs[2] & 0b0011_1111), // assume 24 hour mode
        day: bcd::decode(regs[4] & 0b0011_1111),
        month: bcd::decode(regs[5] & 0b0001_1111),
        year: 2000 + u16::from(bcd::decode(regs[6])),
    }
}
