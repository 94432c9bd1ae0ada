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
//! The cooperative main loop.
//!
//! [`Clock`] owns every piece of loop state.  Each call to [`Clock::poll`]
//! runs the components once, always in this order:
//!
//! 1. orientation
//! 2. frames from the host (time, messages, settings)
//! 3. the hourly resync check
//! 4. the display arbiter
//!
//! so mirroring is settled before anything is drawn, and the face is
//! resolved from a UTC read taken in the same call.

use core::fmt::Debug;

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;
use log::{info, warn};

use crate::arbiter::{format_face, Arbiter};
use crate::display::Display;
use crate::epoch::EpochSeconds;
use crate::orientation::{Orientation, OrientationMonitor};
use crate::protocol::{Frame, HostLink, Link};
use crate::settings::{Change, Settings, SettingsStore};
use crate::time_source::TimeSource;
use crate::tz::{LocalTime, TimeZone};
use crate::{Duration, Instant};

/// Time between host resyncs.  A missed one waits for the next.
pub const RESYNC_INTERVAL: Duration = Duration::from_ticks(3_600_000);

pub struct Clock<I2C> {
    source: TimeSource<I2C>,
    zone: TimeZone,
    arbiter: Arbiter,
    orientation: OrientationMonitor,
    settings: Settings,
    next_resync: Instant,
}

impl<I2C: I2c> Clock<I2C> {
    /// Bring everything up.  Blocks for at most the bounded host sync; with
    /// no host the clock runs on whatever time base it found.
    pub fn boot<S, L, D, DL>(
        i2c: I2C,
        tilt: bool,
        store: &mut S,
        host: &mut HostLink<L>,
        display: &mut D,
        delay: &mut DL,
        mut clock: impl FnMut() -> Instant,
    ) -> Self
    where
        S: SettingsStore,
        L: Link,
        D: Display,
        DL: DelayNs,
    {
        let settings = store.load().unwrap_or_else(|e| {
            warn!("settings unreadable, using defaults: {:?}", e);
            Settings::default()
        });
        let source = TimeSource::probe(i2c, clock());

        let mut zone = TimeZone::default();
        // A bad stored rule is logged by apply and caught per tick.
        let _ = zone.apply(&settings.zone);

        let orientation = OrientationMonitor::new(tilt, clock(), settings.tilt_active_high);
        report("intensity", display.set_intensity(settings.brightness));
        report("mirroring", display.set_mirrored(orientation.inverted()));

        let mut arbiter = Arbiter::new();
        arbiter.set_heartbeat(settings.heartbeat);

        let mut this = Self {
            source,
            zone,
            arbiter,
            orientation,
            settings,
            next_resync: clock() + RESYNC_INTERVAL,
        };
        match host.acquire_time(delay, &mut clock) {
            Ok(epoch) => this.prime(epoch, clock()),
            Err(e) => warn!("{}, keeping current time base", e),
        }
        this
    }

    /// One pass of the loop.  `tilt` is the raw tilt switch reading.
    pub fn poll<L, D, S>(
        &mut self,
        now: Instant,
        tilt: bool,
        host: &mut HostLink<L>,
        display: &mut D,
        store: &mut S,
    ) where
        L: Link,
        D: Display,
        S: SettingsStore,
    {
        if let Some(orientation) = self.orientation.sample(tilt, now) {
            report(
                "mirroring",
                display.set_mirrored(orientation == Orientation::Inverted),
            );
        }

        while let Some(frame) = host.poll(now) {
            match frame {
                Frame::Time(epoch) => self.prime(epoch, now),
                Frame::Message(text) => {
                    report("message", self.arbiter.show_message(&text, now, display));
                }
                Frame::Config(command) => self.configure(&command, display, store),
            }
        }

        if now >= self.next_resync {
            self.next_resync = if now < self.next_resync + RESYNC_INTERVAL {
                self.next_resync + RESYNC_INTERVAL
            } else {
                now + RESYNC_INTERVAL
            };
            self.resync(now, host);
        }

        let (source, zone) = (&mut self.source, &mut self.zone);
        let twelve_hour = self.settings.twelve_hour;
        let stepped = self.arbiter.step(now, display, || {
            let utc = source.read_utc(now);
            format_face(&zone.to_local(&utc), twelve_hour)
        });
        report("display", stepped);
    }

    fn prime(&mut self, epoch: EpochSeconds, now: Instant) {
        // A failed RTC write has been logged; the software clock has the time.
        let _ = self.source.prime(epoch, now);
        info!("synced to {}", epoch);
    }

    fn resync<L: Link>(&mut self, now: Instant, host: &mut HostLink<L>) {
        // Rules are applied here and on change, never per tick.
        let _ = self.zone.apply(&self.settings.zone);
        // The host only speaks when asked, so a quiet link is asked too.
        if !host.is_connected() {
            info!("host not connected, requesting time anyway");
        }
        if let Err(e) = host.request_time(now) {
            warn!("time request failed: {:?}", e);
        }
    }

    fn configure<D: Display, S: SettingsStore>(
        &mut self,
        command: &str,
        display: &mut D,
        store: &mut S,
    ) {
        let change = match self.settings.apply_command(command) {
            Ok(change) => change,
            Err(e) => {
                warn!("setting {:?} rejected: {}", command, e);
                return;
            }
        };
        match change {
            Change::Zone => {
                let _ = self.zone.apply(&self.settings.zone);
            }
            Change::Brightness(level) => report("intensity", display.set_intensity(level)),
            // Picked up by the next face.
            Change::TwelveHour => {}
            Change::TiltPolarity(active_high) => {
                if let Some(orientation) = self.orientation.set_active_high(active_high) {
                    report(
                        "mirroring",
                        display.set_mirrored(orientation == Orientation::Inverted),
                    );
                }
            }
            Change::Heartbeat(on) => self.arbiter.set_heartbeat(on),
            Change::Save => match store.save(&self.settings) {
                Ok(()) => info!("settings saved"),
                Err(e) => warn!("settings save failed: {:?}", e),
            },
        }
    }

    /// Local time now, resolved the same way the face is.
    pub fn local_time(&mut self, now: Instant) -> LocalTime {
        let utc = self.source.read_utc(now);
        self.zone.to_local(&utc)
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn arbiter(&self) -> &Arbiter {
        &self.arbiter
    }

    pub fn source(&self) -> &TimeSource<I2C> {
        &self.source
    }

    pub fn inverted(&self) -> bool {
        self.orientation.inverted()
    }
}

fn report<E: Debug>(what: &str, result: Result<(), E>) {
    if let Err(e) = result {
        warn!("{} failed: {:?}", what, e);
    }
}
