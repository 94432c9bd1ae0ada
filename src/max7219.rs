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
//! MAX7219 daisy chain of 8x8 LED modules.
//!
//! The chain is wired with its data input on the right, so the leftmost
//! module is the last to receive its byte and every frame is shifted out
//! left module first.  Each digit register drives one row; the MSB is the
//! leftmost column.

use embedded_hal::digital::OutputPin;
use embedded_hal::spi::SpiBus;
use thiserror_no_std::Error;

mod reg {
    pub const DIGIT0: u8 = 0x01;
    pub const DECODE_MODE: u8 = 0x09;
    pub const INTENSITY: u8 = 0x0A;
    pub const SCAN_LIMIT: u8 = 0x0B;
    pub const SHUTDOWN: u8 = 0x0C;
    pub const DISPLAY_TEST: u8 = 0x0F;
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error<S, P> {
    #[error("spi transfer failed: {0:?}")]
    Spi(S),

    #[error("chip select failed: {0:?}")]
    Pin(P),
}

pub struct Max7219<SPI, CS, const N: usize> {
    spi: SPI,
    cs: CS,
}

impl<SPI, CS, const N: usize> Max7219<SPI, CS, N>
where
    SPI: SpiBus,
    CS: OutputPin,
{
    /// Take the bus and bring every module out of shutdown, blank.
    pub fn new(spi: SPI, cs: CS) -> Result<Self, Error<SPI::Error, CS::Error>> {
        let mut dev = Self { spi, cs };
        dev.write_all(reg::DISPLAY_TEST, 0)?;
        dev.write_all(reg::SCAN_LIMIT, 7)?;
        dev.write_all(reg::DECODE_MODE, 0)?;
        for row in 0..8 {
            dev.write_row(row, &[0; N])?;
        }
        dev.write_all(reg::SHUTDOWN, 1)?;
        Ok(dev)
    }

    /// Same brightness, 0-15, on every module.
    pub fn set_intensity(&mut self, level: u8) -> Result<(), Error<SPI::Error, CS::Error>> {
        self.write_all(reg::INTENSITY, level.min(15))
    }

    /// One row across the chain, `bits[0]` being the leftmost module.
    pub fn write_row(&mut self, row: u8, bits: &[u8; N]) -> Result<(), Error<SPI::Error, CS::Error>> {
        self.transfer(|i| (reg::DIGIT0 + row, bits[i]))
    }

    fn write_all(&mut self, register: u8, value: u8) -> Result<(), Error<SPI::Error, CS::Error>> {
        self.transfer(|_| (register, value))
    }

    fn transfer(
        &mut self,
        word: impl Fn(usize) -> (u8, u8),
    ) -> Result<(), Error<SPI::Error, CS::Error>> {
        self.cs.set_low().map_err(Error::Pin)?;
        let sent = (0..N).try_for_each(|i| {
            let (register, value) = word(i);
            self.spi.write(&[register, value])
        });
        let flushed = self.spi.flush();
        // Latch even if the transfer failed so the chain is not left selected.
        self.cs.set_high().map_err(Error::Pin)?;
        sent.and(flushed).map_err(Error::Spi)
    }

    pub fn release(self) -> (SPI, CS) {
        (self.spi, self.cs)
    }
}
