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
//! Where UTC comes from.
//!
//! The RTC is probed once at boot.  If it answers, every read goes to it and
//! a failed read is answered by the software clock for that call only.  If
//! it does not answer, the software clock is all there is for the session.

use embedded_hal::i2c::I2c;
use log::{info, warn};

use crate::ds1307::Ds1307;
use crate::epoch::{DateTime, EpochSeconds};
use crate::error::ClockError;
use crate::{elapsed, Duration, Instant};

/// What an unsynced software clock counts up from: 2024-01-01T00:00:00Z.
pub const DEFAULT_EPOCH: EpochSeconds = 1_704_067_200;

/// Epoch seconds derived from the millisecond counter and one anchor pair.
///
/// The anchor is rolled forward by whole seconds on every read so the
/// counter can wrap without losing time, as long as reads come more often
/// than once per half wrap (24 days).  An instant older than the anchor
/// reads as the anchor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SoftClock {
    epoch: EpochSeconds,
    at: Instant,
    primed: bool,
}

impl Default for SoftClock {
    fn default() -> Self {
        Self {
            epoch: DEFAULT_EPOCH,
            at: Instant::from_ticks(0),
            primed: false,
        }
    }
}

impl SoftClock {
    /// Anchor the clock: `epoch` was true at monotonic time `now`.
    pub fn prime(&mut self, epoch: EpochSeconds, now: Instant) {
        self.epoch = epoch;
        self.at = now;
        self.primed = true;
    }

    pub fn now(&mut self, now: Instant) -> EpochSeconds {
        let secs = elapsed(now, self.at).to_secs();
        self.epoch += i64::from(secs);
        self.at = self.at + Duration::from_ticks(secs * 1000);
        self.epoch
    }

    /// False until the first external sync.
    pub fn is_primed(&self) -> bool {
        self.primed
    }
}

/// The UTC provider chosen at boot.
pub enum TimeSource<I2C> {
    /// An RTC answered the boot probe.  `soft` tracks the last good read.
    Hardware { rtc: Ds1307<I2C>, soft: SoftClock },
    Software(SoftClock),
}

impl<I2C: I2c> TimeSource<I2C> {
    /// Check for an RTC on `i2c` and pick the source for the session.
    ///
    /// A present RTC also seeds the software clock, so the time survives
    /// power loss even if a later read fails.
    pub fn probe(i2c: I2C, now: Instant) -> Self {
        let mut rtc = Ds1307::new(i2c);
        if !rtc.probe() {
            warn!("{}", ClockError::SourceUnavailable);
            return TimeSource::Software(SoftClock::default());
        }
        let mut soft = SoftClock::default();
        match rtc.read() {
            Ok(dt) => {
                info!("rtc present, time {}", dt);
                soft.prime(dt.to_epoch(), now);
            }
            Err(e) => warn!("rtc present but unreadable: {}", e),
        }
        TimeSource::Hardware { rtc, soft }
    }

    /// Whether an RTC was found at boot.  Never changes afterwards.
    pub fn presence(&self) -> bool {
        matches!(self, TimeSource::Hardware { .. })
    }

    /// Whether any sync, from the host or the RTC, has happened.
    pub fn is_synced(&self) -> bool {
        match self {
            TimeSource::Hardware { soft, .. } | TimeSource::Software(soft) => soft.is_primed(),
        }
    }

    /// Current UTC.  Never fails; see the module docs for the fallbacks.
    pub fn read_utc(&mut self, now: Instant) -> DateTime {
        match self {
            TimeSource::Hardware { rtc, soft } => match rtc.read() {
                Ok(dt) => {
                    soft.prime(dt.to_epoch(), now);
                    dt
                }
                Err(e) => {
                    warn!("{}: {}", ClockError::TransientReadFailure, e);
                    DateTime::from_epoch(soft.now(now))
                }
            },
            TimeSource::Software(soft) => DateTime::from_epoch(soft.now(now)),
        }
    }

    /// Take an externally obtained epoch as the new truth.
    ///
    /// The software anchor is always updated.  With an RTC the time is also
    /// written to it; a failed write is returned and not retried.
    pub fn prime(&mut self, epoch: EpochSeconds, now: Instant) -> Result<(), ClockError> {
        match self {
            TimeSource::Hardware { rtc, soft } => {
                soft.prime(epoch, now);
                rtc.write(&DateTime::from_epoch(epoch)).map_err(|e| {
                    warn!("{}: {}", ClockError::TransientWriteFailure, e);
                    ClockError::TransientWriteFailure
                })
            }
            TimeSource::Software(soft) => {
                soft.prime(epoch, now);
                Ok(())
            }
        }
    }
}
