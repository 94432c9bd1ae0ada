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
//! Decides whether the panel shows the time or a scrolling message.
//!
//! Two states.  `Clock` redraws the face once a second.  `Scroll` repeats a
//! message until it has been up for [`SCROLL_DURATION`] and the current pass
//! has finished, then drops back to `Clock`.  Only one of them drives the
//! display in any tick.

use heapless::String;
use log::{debug, info};

use crate::display::{Display, Layout, TEXT_CAPACITY};
use crate::tz::LocalTime;
use crate::{Duration, Instant};

/// Minimum time a message stays up.
pub const SCROLL_DURATION: Duration = Duration::from_ticks(5000);

pub const MESSAGE_CAPACITY: usize = TEXT_CAPACITY;

const TICK: Duration = Duration::from_ticks(1000);

pub type Message = String<MESSAGE_CAPACITY>;

/// Clock face text, `HH:MM` or `H:MM`.
pub type Face = String<8>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisplayState {
    Clock,
    Scroll { text: Message, expires: Instant },
}

pub struct Arbiter {
    state: DisplayState,
    next_tick: Option<Instant>,
    face: Face,
    heartbeat: bool,
    beat: bool,
}

impl Default for Arbiter {
    fn default() -> Self {
        Self::new()
    }
}

impl Arbiter {
    pub fn new() -> Self {
        Self {
            state: DisplayState::Clock,
            next_tick: None,
            face: Face::new(),
            heartbeat: false,
            beat: false,
        }
    }

    pub fn state(&self) -> &DisplayState {
        &self.state
    }

    /// Enable the heartbeat pixel.  Disabling clears it on the next tick.
    pub fn set_heartbeat(&mut self, enabled: bool) {
        self.heartbeat = enabled;
    }

    /// Start scrolling `text`, replacing any message already up.
    pub fn show_message<D: Display>(
        &mut self,
        text: &str,
        now: Instant,
        display: &mut D,
    ) -> Result<(), D::Error> {
        let text = normalize(text);
        info!("message {:?}", text.as_str());
        display.show(&text, Layout::Scroll)?;
        // The pixel sits on the text; the next clock tick restores it.
        if self.beat {
            self.beat = false;
            display.set_indicator(false)?;
        }
        self.state = DisplayState::Scroll {
            text,
            expires: now + SCROLL_DURATION,
        };
        Ok(())
    }

    /// Advance one loop iteration.  `face` is only called on a clock tick.
    pub fn step<D: Display>(
        &mut self,
        now: Instant,
        display: &mut D,
        face: impl FnOnce() -> Face,
    ) -> Result<(), D::Error> {
        match self.state {
            DisplayState::Clock => self.step_clock(now, display, face),
            DisplayState::Scroll { .. } => self.step_scroll(now, display),
        }
    }

    fn step_scroll<D: Display>(&mut self, now: Instant, display: &mut D) -> Result<(), D::Error> {
        if !display.animate(now)? {
            return Ok(());
        }
        let DisplayState::Scroll { text, expires } = &self.state else {
            return Ok(());
        };
        if now < *expires {
            debug!("message pass complete, repeating");
            return display.show(text, Layout::Scroll);
        }
        self.state = DisplayState::Clock;
        display.show(&self.face, Layout::Centered)
    }

    fn step_clock<D: Display>(
        &mut self,
        now: Instant,
        display: &mut D,
        face: impl FnOnce() -> Face,
    ) -> Result<(), D::Error> {
        let next = match self.next_tick {
            Some(tick) if now < tick => return Ok(()),
            // More than a tick behind: resync instead of bursting.
            Some(tick) if now < tick + TICK => tick + TICK,
            _ => now + TICK,
        };
        self.next_tick = Some(next);

        self.face = face();
        display.show(&self.face, Layout::Centered)?;
        if self.heartbeat {
            self.beat = !self.beat;
            display.set_indicator(self.beat)?;
        } else if self.beat {
            self.beat = false;
            display.set_indicator(false)?;
        }
        Ok(())
    }
}

/// Line breaks become spaces; text past capacity is cut at a char boundary.
fn normalize(text: &str) -> Message {
    let mut message = Message::new();
    for c in text.chars() {
        let c = if matches!(c, '\r' | '\n') { ' ' } else { c };
        if message.push(c).is_err() {
            break;
        }
    }
    message
}

/// Hour and minute with a steady colon.
#[must_use]
pub fn format_face(local: &LocalTime, twelve_hour: bool) -> Face {
    let mut face = Face::new();
    let (hour, minute) = (local.wall.hour, local.wall.minute);
    let _ = if twelve_hour {
        let hour = match hour % 12 {
            0 => 12,
            h => h,
        };
        ufmt::uwrite!(&mut face, "{}:{}{}", hour, minute / 10, minute % 10)
    } else {
        ufmt::uwrite!(&mut face, "{}{}:{}{}", hour / 10, hour % 10, minute / 10, minute % 10)
    };
    face
}
