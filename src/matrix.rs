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
//! Text on a MAX7219 LED matrix panel.
//!
//! Frames are composed a column at a time straight from the font, so the
//! only buffer is one frame of `N` modules.

use embedded_hal::digital::OutputPin;
use embedded_hal::spi::SpiBus;
use heapless::String;

use crate::display::{Display, Layout, TEXT_CAPACITY};
use crate::font;
use crate::max7219::{self, Max7219};
use crate::{elapsed, Duration, Instant};

/// Time per one-column scroll step.
pub const SCROLL_STEP: Duration = Duration::from_ticks(35);

pub struct MatrixDisplay<SPI, CS, const N: usize> {
    dev: Max7219<SPI, CS, N>,
    text: String<TEXT_CAPACITY>,
    layout: Layout,
    offset: usize,
    last_step: Option<Instant>,
    complete: bool,
    mirrored: bool,
    indicator: bool,
}

impl<SPI, CS, const N: usize> MatrixDisplay<SPI, CS, N>
where
    SPI: SpiBus,
    CS: OutputPin,
{
    pub const WIDTH: usize = N * 8;

    pub fn new(dev: Max7219<SPI, CS, N>) -> Self {
        Self {
            dev,
            text: String::new(),
            layout: Layout::Centered,
            offset: 0,
            last_step: None,
            complete: true,
            mirrored: false,
            indicator: false,
        }
    }

    pub fn release(self) -> Max7219<SPI, CS, N> {
        self.dev
    }

    /// Column bits at logical panel column `x`, bit 0 at the top.
    fn column(&self, x: usize) -> u8 {
        let text_x = match self.layout {
            Layout::Centered => {
                let start = Self::WIDTH.saturating_sub(font::text_width(&self.text)) / 2;
                x.checked_sub(start)
            }
            Layout::Scroll => (x + self.offset).checked_sub(Self::WIDTH),
        };
        let mut bits = text_x.map_or(0, |tx| font::column(&self.text, tx));
        if self.indicator && x == Self::WIDTH - 1 {
            bits |= 0x01;
        }
        bits
    }

    fn push(&mut self) -> Result<(), max7219::Error<SPI::Error, CS::Error>> {
        let mut columns = [[0u8; 8]; N];
        for (m, module) in columns.iter_mut().enumerate() {
            for (b, col) in module.iter_mut().enumerate() {
                *col = self.column(m * 8 + b);
            }
        }
        for row in 0..8u8 {
            let mut bits = [0u8; N];
            for (m, byte) in bits.iter_mut().enumerate() {
                for b in 0..8 {
                    let x = m * 8 + b;
                    let lit = if self.mirrored {
                        let mx = Self::WIDTH - 1 - x;
                        columns[mx / 8][mx % 8] >> (7 - row) & 1
                    } else {
                        columns[m][b] >> row & 1
                    };
                    *byte |= lit << (7 - b);
                }
            }
            self.dev.write_row(row, &bits)?;
        }
        Ok(())
    }
}

impl<SPI, CS, const N: usize> Display for MatrixDisplay<SPI, CS, N>
where
    SPI: SpiBus,
    CS: OutputPin,
{
    type Error = max7219::Error<SPI::Error, CS::Error>;

    fn show(&mut self, text: &str, layout: Layout) -> Result<(), Self::Error> {
        self.text.clear();
        for c in text.chars() {
            if self.text.push(c).is_err() {
                break;
            }
        }
        self.layout = layout;
        self.offset = 0;
        self.last_step = None;
        self.complete = layout == Layout::Centered;
        self.push()
    }

    fn animate(&mut self, now: Instant) -> Result<bool, Self::Error> {
        if self.complete {
            return Ok(true);
        }
        let due = self
            .last_step
            .map_or(true, |last| elapsed(now, last) >= SCROLL_STEP);
        if due {
            self.last_step = Some(now);
            self.offset += 1;
            self.push()?;
            if self.offset >= font::text_width(&self.text) + Self::WIDTH {
                self.complete = true;
            }
        }
        Ok(self.complete)
    }

    fn set_mirrored(&mut self, mirrored: bool) -> Result<(), Self::Error> {
        self.mirrored = mirrored;
        self.push()
    }

    fn set_intensity(&mut self, level: u8) -> Result<(), Self::Error> {
        self.dev.set_intensity(level)
    }

    fn set_indicator(&mut self, on: bool) -> Result<(), Self::Error> {
        if self.indicator == on {
            return Ok(());
        }
        self.indicator = on;
        self.push()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::max7219::tests::{FakeChain, FakeCs};

    type Panel = MatrixDisplay<FakeChain, FakeCs, 4>;

    fn panel() -> Panel {
        MatrixDisplay::new(Max7219::new(FakeChain::default(), FakeCs::default()).unwrap())
    }

    /// Lit pixels of the most recent full frame, `[row][x]`.
    fn pixels(panel: Panel) -> [[bool; 32]; 8] {
        let (spi, _) = panel.release().release();
        let mut grid = [[false; 32]; 8];
        for frame in &spi.frames[spi.frames.len() - 8..] {
            for (m, &(register, value)) in frame.iter().enumerate() {
                let row = usize::from(register - 1);
                for b in 0..8 {
                    grid[row][m * 8 + b] = value >> (7 - b) & 1 == 1;
                }
            }
        }
        grid
    }

    #[test]
    fn centered_text_is_centered() {
        let mut p = panel();
        p.show("1", Layout::Centered).unwrap();
        assert!(p.animate(Instant::from_ticks(0)).unwrap());
        let grid = pixels(p);
        // "1" is five columns wide; its stem is the middle column.
        let start = (32 - 5) / 2;
        assert!((0..7).all(|row| grid[row][start + 2]));
        assert!(!grid[3][start - 1]);
    }

    #[test]
    fn scroll_completes_after_text_leaves_panel() {
        let mut p = panel();
        p.show("A", Layout::Scroll).unwrap();
        let steps = font::text_width("A") + 32;
        for i in 0..steps - 1 {
            assert!(!p.animate(Instant::from_ticks(i as u32 * 35)).unwrap());
        }
        assert!(p.animate(Instant::from_ticks((steps as u32 - 1) * 35)).unwrap());
        assert!(p.animate(Instant::from_ticks(steps as u32 * 35)).unwrap());
    }

    #[test]
    fn scroll_waits_for_step_interval() {
        let mut p = panel();
        p.show("A", Layout::Scroll).unwrap();
        p.animate(Instant::from_ticks(100)).unwrap();
        p.animate(Instant::from_ticks(110)).unwrap();
        assert_eq!(p.offset, 1);
        p.animate(Instant::from_ticks(135)).unwrap();
        assert_eq!(p.offset, 2);
    }

    #[test]
    fn indicator_pixel_follows_mirroring() {
        let mut p = panel();
        p.show("", Layout::Centered).unwrap();
        p.set_indicator(true).unwrap();
        p.set_mirrored(true).unwrap();
        let grid = pixels(p);
        assert!(grid[7][0]);
        assert!(!grid[0][31]);

        let mut p = panel();
        p.show("", Layout::Centered).unwrap();
        p.set_indicator(true).unwrap();
        let grid = pixels(p);
        assert!(grid[0][31]);
    }

    #[test]
    fn overlong_text_is_truncated() {
        let mut p = panel();
        let long = "X".repeat(TEXT_CAPACITY + 10);
        p.show(&long, Layout::Scroll).unwrap();
        assert_eq!(p.text.len(), TEXT_CAPACITY);
    }
}
