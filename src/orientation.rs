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
//! Debounced tilt switch.

use log::info;

use crate::{elapsed, Duration, Instant};

/// How long a new raw reading must hold before it counts.
pub const DEBOUNCE: Duration = Duration::from_ticks(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    Upright,
    Inverted,
}

pub struct OrientationMonitor {
    raw: bool,
    changed: Instant,
    state: Orientation,
    active_high: bool,
}

impl OrientationMonitor {
    /// Seed from the reading at boot; no debounce applies to the first one.
    pub fn new(raw: bool, now: Instant, active_high: bool) -> Self {
        Self {
            raw,
            changed: now,
            state: derive(raw, active_high),
            active_high,
        }
    }

    /// Feed one raw reading.  Returns the new orientation when a change has
    /// held for the full debounce window.
    pub fn sample(&mut self, raw: bool, now: Instant) -> Option<Orientation> {
        if raw != self.raw {
            self.raw = raw;
            self.changed = now;
            return None;
        }
        let target = derive(raw, self.active_high);
        if target == self.state || elapsed(now, self.changed) < DEBOUNCE {
            return None;
        }
        self.state = target;
        info!("orientation now {:?}", target);
        Some(target)
    }

    /// Change the switch polarity.  The current raw reading is reinterpreted
    /// at once; a resulting change is reported like a debounced flip.
    pub fn set_active_high(&mut self, active_high: bool) -> Option<Orientation> {
        self.active_high = active_high;
        let target = derive(self.raw, active_high);
        if target == self.state {
            return None;
        }
        self.state = target;
        Some(target)
    }

    pub fn orientation(&self) -> Orientation {
        self.state
    }

    pub fn inverted(&self) -> bool {
        self.state == Orientation::Inverted
    }
}

fn derive(raw: bool, active_high: bool) -> Orientation {
    if raw == active_high {
        Orientation::Inverted
    } else {
        Orientation::Upright
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(ms: u32) -> Instant {
        Instant::from_ticks(ms)
    }

    /// Samples `raw` every 10 ms over `[from, to)` and counts flips.
    fn hold(m: &mut OrientationMonitor, raw: bool, from: u32, to: u32) -> usize {
        (from..to)
            .step_by(10)
            .filter(|&t| m.sample(raw, at(t)).is_some())
            .count()
    }

    #[test]
    fn seeded_from_first_reading() {
        assert!(!OrientationMonitor::new(false, at(0), true).inverted());
        assert!(OrientationMonitor::new(true, at(0), true).inverted());
        assert!(OrientationMonitor::new(false, at(0), false).inverted());
    }

    #[test]
    fn bounce_produces_no_flip() {
        let mut m = OrientationMonitor::new(false, at(0), true);
        let mut flips = hold(&mut m, false, 0, 100);
        flips += hold(&mut m, true, 100, 150);
        flips += hold(&mut m, false, 150, 200);
        flips += hold(&mut m, true, 200, 250);
        flips += hold(&mut m, false, 250, 2000);
        assert_eq!(flips, 0);
        assert!(!m.inverted());
    }

    #[test]
    fn stable_change_flips_exactly_once() {
        let mut m = OrientationMonitor::new(false, at(0), true);
        assert_eq!(hold(&mut m, true, 100, 3000), 1);
        assert!(m.inverted());
    }

    #[test]
    fn flip_waits_for_full_window() {
        let mut m = OrientationMonitor::new(false, at(0), true);
        assert_eq!(m.sample(true, at(1000)), None);
        assert_eq!(m.sample(true, at(1499)), None);
        assert_eq!(m.sample(true, at(1500)), Some(Orientation::Inverted));
        assert_eq!(m.sample(true, at(1510)), None);
    }

    #[test]
    fn bounce_restarts_the_window() {
        let mut m = OrientationMonitor::new(false, at(0), true);
        m.sample(true, at(1000));
        m.sample(false, at(1300));
        m.sample(true, at(1400));
        assert_eq!(m.sample(true, at(1500)), None);
        assert_eq!(m.sample(true, at(1900)), Some(Orientation::Inverted));
    }

    #[test]
    fn polarity_change_reinterprets_reading() {
        let mut m = OrientationMonitor::new(true, at(0), true);
        assert!(m.inverted());
        assert_eq!(m.set_active_high(false), Some(Orientation::Upright));
        assert_eq!(m.set_active_high(false), None);
        assert_eq!(m.sample(true, at(5000)), None);
    }
}
