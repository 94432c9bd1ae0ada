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
//! The render primitive the arbiter and orientation monitor drive.

use core::fmt::Debug;

use crate::Instant;

/// Longest text a display has to hold, in bytes.
pub const TEXT_CAPACITY: usize = 64;

/// How text is laid out on the panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    /// Static, horizontally centered.
    Centered,
    /// Scrolls in from the right until it has fully left on the left.
    Scroll,
}

pub trait Display {
    type Error: Debug;

    /// Replace the content and restart its animation.
    fn show(&mut self, text: &str, layout: Layout) -> Result<(), Self::Error>;

    /// Advance the animation if a frame is due.  Returns true once the
    /// current pass is complete; static content is always complete.
    fn animate(&mut self, now: Instant) -> Result<bool, Self::Error>;

    /// Rotate the output by 180 degrees (rows and columns mirrored).
    fn set_mirrored(&mut self, mirrored: bool) -> Result<(), Self::Error>;

    /// Brightness, 0-15.
    fn set_intensity(&mut self, level: u8) -> Result<(), Self::Error>;

    /// The heartbeat pixel.
    fn set_indicator(&mut self, on: bool) -> Result<(), Self::Error>;
}
