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
//! Failure classes of the timekeeping path.
//!
//! None of these is fatal.  Each is logged where it happens and the clock
//! carries on with whatever time base it already has:
//!
//! - `SourceUnavailable`: no RTC answered the boot probe; the software
//!   clock is used for the whole session.
//! - `TransientReadFailure`: an RTC read was not acknowledged; that one
//!   read is answered by the software clock.
//! - `TransientWriteFailure`: writing a fresh sync to the RTC failed; the
//!   RTC keeps its old time until the next resync.
//! - `RuleIneffective`: the applied zone rule produced no usable offset;
//!   the built-in DST calendar answers for that tick.
//! - `NetworkTimeUnavailable`: the host never answered a time request
//!   within the retry budget.

use thiserror_no_std::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockError {
    #[error("no hardware clock on the bus, using software clock")]
    SourceUnavailable,

    #[error("hardware clock read failed")]
    TransientReadFailure,

    #[error("hardware clock write failed")]
    TransientWriteFailure,

    #[error("zone rule gave no usable offset")]
    RuleIneffective,

    #[error("no time from host after {attempts} attempts")]
    NetworkTimeUnavailable { attempts: u8 },
}
