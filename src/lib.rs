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
//! LED matrix clock core.
//!
//! Everything that decides *what* the clock shows lives here and is free of
//! board specifics, so it builds and tests on the host.  The AVR binary in
//! `main.rs` only wires these pieces to the peripherals.
//!
//! Data flows leaf first: [`time_source`] yields a UTC [`epoch::DateTime`],
//! [`tz`] turns it into local wall time, [`arbiter`] decides whether the
//! panel shows that time or a scrolling message, and [`orientation`] picks
//! the mirroring applied to whatever is drawn.  [`app::Clock`] owns all of
//! them and polls them in a fixed order.

#![cfg_attr(not(test), no_std)]

pub mod app;
pub mod arbiter;
pub mod bcd;
pub mod display;
pub mod ds1307;
pub mod epoch;
pub mod error;
pub mod font;
pub mod matrix;
pub mod max7219;
pub mod orientation;
pub mod posix_tz;
pub mod protocol;
pub mod settings;
pub mod time_source;
pub mod tz;

/// A point on the monotonic millisecond counter.
pub type Instant = fugit::TimerInstantU32<1000>;

/// A span on the monotonic millisecond counter.
pub type Duration = fugit::MillisDurationU32;

/// Milliseconds elapsed from `earlier` to `later`, zero if `later` is not
/// actually later.
#[inline]
pub fn elapsed(later: Instant, earlier: Instant) -> Duration {
    later
        .checked_duration_since(earlier)
        .unwrap_or(Duration::from_ticks(0))
}
