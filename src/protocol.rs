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
//! Serial link to a host PC.
//!
//! The host is the network time source, the message bus and the
//! configuration channel.  Three frame types arrive, each starting with a
//! header byte that can never occur inside UTF-8 text:
//!
//! * `0xFF` and ten ASCII digits: unix time.
//! * `0xFE`, text, `0x00`: a message to scroll.
//! * `0xFD`, `key=value`, `0x00`: a configuration command.
//!
//! The clock asks for the time by sending [`TIME_REQUEST`].

use embedded_hal::delay::DelayNs;
use heapless::{String, Vec};
use log::{debug, info, warn};

use crate::display::TEXT_CAPACITY;
use crate::epoch::EpochSeconds;
use crate::error::ClockError;
use crate::{elapsed, Duration, Instant};

const TIME_HEADER: u8 = 0xFF;
const MESSAGE_HEADER: u8 = 0xFE;
const CONFIG_HEADER: u8 = 0xFD;
const TERMINATOR: u8 = 0x00;

/// Digits in a time frame after the header.
const TIME_DIGITS: u8 = 10;

/// BEL, as sent by the Arduino Time library's serial sync.
pub const TIME_REQUEST: u8 = 0x07;

/// A time request not answered within this is taken as the host being gone.
pub const REPLY_TIMEOUT: Duration = Duration::from_ticks(5000);

/// Boot sync tries this often before giving up.
pub const SYNC_ATTEMPTS: u8 = 20;

pub const SYNC_RETRY_DELAY: Duration = Duration::from_ticks(500);

/// Link polling granularity while waiting during boot sync, in microseconds.
const SYNC_POLL_US: u32 = 100;

pub type Text = String<TEXT_CAPACITY>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Time(EpochSeconds),
    Message(Text),
    Config(Text),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TextKind {
    Message,
    Config,
}

#[derive(Debug)]
enum State {
    Idle,
    Time { value: EpochSeconds, digits: u8 },
    Text { kind: TextKind, bytes: Vec<u8, TEXT_CAPACITY> },
}

/// Byte-at-a-time frame parser.
///
/// A header byte always starts a new frame, abandoning any frame in
/// progress.  Bytes outside a frame and malformed time frames are dropped.
#[derive(Debug)]
pub struct FrameDecoder {
    state: State,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecoder {
    pub const fn new() -> Self {
        Self { state: State::Idle }
    }

    pub fn push(&mut self, byte: u8) -> Option<Frame> {
        match byte {
            TIME_HEADER => {
                self.state = State::Time { value: 0, digits: 0 };
                return None;
            }
            MESSAGE_HEADER | CONFIG_HEADER => {
                let kind = if byte == MESSAGE_HEADER {
                    TextKind::Message
                } else {
                    TextKind::Config
                };
                self.state = State::Text {
                    kind,
                    bytes: Vec::new(),
                };
                return None;
            }
            _ => {}
        }

        match &mut self.state {
            State::Idle => None,
            State::Time { value, digits } => {
                if !byte.is_ascii_digit() {
                    debug!("dropping time frame at byte {:#04x}", byte);
                    self.state = State::Idle;
                    return None;
                }
                *value = *value * 10 + EpochSeconds::from(byte - b'0');
                *digits += 1;
                if *digits < TIME_DIGITS {
                    return None;
                }
                let epoch = *value;
                self.state = State::Idle;
                Some(Frame::Time(epoch))
            }
            State::Text { kind, bytes } => {
                if byte != TERMINATOR {
                    // Overlong text is cut; the rest of the frame is skipped.
                    let _ = bytes.push(byte);
                    return None;
                }
                let kind = *kind;
                let text = to_text(bytes);
                self.state = State::Idle;
                Some(match kind {
                    TextKind::Message => Frame::Message(text),
                    TextKind::Config => Frame::Config(text),
                })
            }
        }
    }
}

/// Longest valid UTF-8 prefix of `bytes`.
fn to_text(bytes: &[u8]) -> Text {
    let valid = match core::str::from_utf8(bytes) {
        Ok(s) => s,
        // valid_up_to() always lands on a char boundary.
        Err(e) => core::str::from_utf8(&bytes[..e.valid_up_to()]).unwrap_or_default(),
    };
    let mut text = Text::new();
    let _ = text.push_str(valid);
    text
}

/// Byte transport to the host.
pub trait Link {
    type Error: core::fmt::Debug;

    fn read(&mut self) -> nb::Result<u8, Self::Error>;

    /// Send [`TIME_REQUEST`].
    fn request_time(&mut self) -> Result<(), Self::Error>;
}

/// Frames from the host plus a view of whether anyone is listening.
pub struct HostLink<L> {
    link: L,
    decoder: FrameDecoder,
    connected: bool,
    awaiting_since: Option<Instant>,
}

impl<L: Link> HostLink<L> {
    pub fn new(link: L) -> Self {
        Self {
            link,
            decoder: FrameDecoder::new(),
            connected: false,
            awaiting_since: None,
        }
    }

    /// True once the host has sent anything, until a time request goes
    /// unanswered for [`REPLY_TIMEOUT`].
    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Read what is available and return the next complete frame, if any.
    /// Call again until it returns `None` to drain the link.
    pub fn poll(&mut self, now: Instant) -> Option<Frame> {
        loop {
            let byte = match self.link.read() {
                Ok(byte) => byte,
                Err(nb::Error::WouldBlock) => break,
                Err(nb::Error::Other(e)) => {
                    warn!("host link read failed: {:?}", e);
                    break;
                }
            };
            if !self.connected {
                info!("host link up");
                self.connected = true;
            }
            if let Some(frame) = self.decoder.push(byte) {
                if let Frame::Time(_) = frame {
                    self.awaiting_since = None;
                }
                return Some(frame);
            }
        }

        // Only once drained, so a reply already waiting is never a timeout.
        if let Some(sent) = self.awaiting_since {
            if elapsed(now, sent) >= REPLY_TIMEOUT {
                self.awaiting_since = None;
                if self.connected {
                    warn!("host did not answer time request");
                }
                self.connected = false;
            }
        }
        None
    }

    /// Ask the host for the time.  Unanswered requests are timed from the
    /// oldest one.
    pub fn request_time(&mut self, now: Instant) -> Result<(), L::Error> {
        self.link.request_time()?;
        if self.awaiting_since.is_none() {
            self.awaiting_since = Some(now);
        }
        Ok(())
    }

    /// Bounded boot sync: up to [`SYNC_ATTEMPTS`] requests, [`SYNC_RETRY_DELAY`]
    /// apart.  Frames other than time that arrive meanwhile are dropped.
    pub fn acquire_time<D: DelayNs>(
        &mut self,
        delay: &mut D,
        mut clock: impl FnMut() -> Instant,
    ) -> Result<EpochSeconds, ClockError> {
        let polls = SYNC_RETRY_DELAY.to_micros() / SYNC_POLL_US;
        for attempt in 1..=SYNC_ATTEMPTS {
            if let Err(e) = self.request_time(clock()) {
                warn!("time request failed: {:?}", e);
            }
            for _ in 0..polls {
                while let Some(frame) = self.poll(clock()) {
                    match frame {
                        Frame::Time(epoch) => {
                            info!("host time {} after {} attempt(s)", epoch, attempt);
                            return Ok(epoch);
                        }
                        other => debug!("ignoring {:?} during sync", other),
                    }
                }
                delay.delay_us(SYNC_POLL_US);
            }
        }
        Err(ClockError::NetworkTimeUnavailable {
            attempts: SYNC_ATTEMPTS,
        })
    }

    pub fn release(self) -> L {
        self.link
    }

    #[cfg(test)]
    pub(crate) fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use core::convert::Infallible;
    use std::collections::VecDeque;

    /// Host side of the link.  Answers the `answer_on`th time request with
    /// `epoch`.
    #[derive(Default)]
    pub(crate) struct FakeLink {
        pub rx: VecDeque<u8>,
        pub requests: usize,
        pub answer_on: Option<(usize, EpochSeconds)>,
    }

    impl FakeLink {
        pub fn send(&mut self, bytes: &[u8]) {
            self.rx.extend(bytes.iter().copied());
        }

        pub fn send_time(&mut self, epoch: EpochSeconds) {
            self.rx.push_back(TIME_HEADER);
            self.rx.extend(std::format!("{:010}", epoch).bytes());
        }
    }

    impl Link for FakeLink {
        type Error = Infallible;

        fn read(&mut self) -> nb::Result<u8, Infallible> {
            self.rx.pop_front().ok_or(nb::Error::WouldBlock)
        }

        fn request_time(&mut self) -> Result<(), Infallible> {
            self.requests += 1;
            if let Some((n, epoch)) = self.answer_on {
                if n == self.requests {
                    self.send_time(epoch);
                }
            }
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeDelay {
        us: u64,
    }

    impl DelayNs for FakeDelay {
        fn delay_ns(&mut self, ns: u32) {
            self.us += u64::from(ns) / 1000;
        }
    }

    fn decode(bytes: &[u8]) -> std::vec::Vec<Frame> {
        let mut d = FrameDecoder::new();
        bytes.iter().filter_map(|&b| d.push(b)).collect()
    }

    fn text(s: &str) -> Text {
        Text::try_from(s).unwrap()
    }

    #[test]
    fn decodes_each_frame_type() {
        let mut bytes = std::vec![TIME_HEADER];
        bytes.extend_from_slice(b"1717200000");
        bytes.push(MESSAGE_HEADER);
        bytes.extend_from_slice(b"Hello\0");
        bytes.push(CONFIG_HEADER);
        bytes.extend_from_slice(b"bright=3\0");
        assert_eq!(
            decode(&bytes),
            [
                Frame::Time(1_717_200_000),
                Frame::Message(text("Hello")),
                Frame::Config(text("bright=3")),
            ]
        );
    }

    #[test]
    fn noise_between_frames_is_ignored() {
        let mut bytes = std::vec::Vec::from(&b"garbage\r\n\0"[..]);
        bytes.push(TIME_HEADER);
        bytes.extend_from_slice(b"0000000042");
        bytes.extend_from_slice(b"7x");
        assert_eq!(decode(&bytes), [Frame::Time(42)]);
    }

    #[test]
    fn malformed_time_is_dropped() {
        let mut bytes = std::vec![TIME_HEADER];
        bytes.extend_from_slice(b"17172x0000");
        assert!(decode(&bytes).is_empty());
    }

    #[test]
    fn header_restarts_frame() {
        let mut bytes = std::vec![MESSAGE_HEADER];
        bytes.extend_from_slice(b"lost");
        bytes.push(TIME_HEADER);
        bytes.extend_from_slice(b"0000000001");
        assert_eq!(decode(&bytes), [Frame::Time(1)]);
    }

    #[test]
    fn overlong_text_is_truncated_to_valid_utf8() {
        let mut bytes = std::vec![MESSAGE_HEADER, b'a'];
        for _ in 0..40 {
            bytes.extend_from_slice("é".as_bytes());
        }
        bytes.push(TERMINATOR);
        let frames = decode(&bytes);
        let [Frame::Message(msg)] = &frames[..] else {
            panic!("expected one message, got {:?}", frames);
        };
        // 'a' plus 31 two-byte chars fill 63 bytes; the 64th is half a char.
        assert_eq!(msg.len(), 63);
        assert!(msg.starts_with("aé"));
    }

    #[test]
    fn connectivity_follows_traffic_and_replies() {
        let mut host = HostLink::new(FakeLink::default());
        let at = Instant::from_ticks;
        assert!(!host.is_connected());
        assert_eq!(host.poll(at(0)), None);
        assert!(!host.is_connected());

        host.link.send(b"\r\n");
        assert_eq!(host.poll(at(10)), None);
        assert!(host.is_connected());

        host.request_time(at(100)).unwrap();
        host.request_time(at(2000)).unwrap();
        host.poll(at(5099));
        assert!(host.is_connected());
        host.poll(at(5100));
        assert!(!host.is_connected());

        host.link.send_time(99);
        assert_eq!(host.poll(at(6000)), Some(Frame::Time(99)));
        assert!(host.is_connected());
    }

    #[test]
    fn answered_request_keeps_link_up() {
        let mut host = HostLink::new(FakeLink::default());
        let at = Instant::from_ticks;
        host.link.send(b"\0");
        host.poll(at(0));
        host.request_time(at(0)).unwrap();
        host.link.send_time(5);
        assert_eq!(host.poll(at(100)), Some(Frame::Time(5)));
        host.poll(at(60_000));
        assert!(host.is_connected());
    }

    #[test]
    fn boot_sync_succeeds_on_later_attempt() {
        let mut host = HostLink::new(FakeLink {
            answer_on: Some((3, 1_717_200_000)),
            ..FakeLink::default()
        });
        host.link.send(&[MESSAGE_HEADER, b'h', b'i', TERMINATOR]);
        let mut delay = FakeDelay::default();
        let epoch = host
            .acquire_time(&mut delay, || Instant::from_ticks(0))
            .unwrap();
        assert_eq!(epoch, 1_717_200_000);
        assert_eq!(host.release().requests, 3);
        assert_eq!(delay.us, 2 * 500_000);
    }

    #[test]
    fn boot_sync_gives_up() {
        let mut host = HostLink::new(FakeLink::default());
        let mut delay = FakeDelay::default();
        assert_eq!(
            host.acquire_time(&mut delay, || Instant::from_ticks(0)),
            Err(ClockError::NetworkTimeUnavailable { attempts: 20 })
        );
        assert_eq!(host.release().requests, 20);
        assert_eq!(delay.us, 20 * 500_000);
    }
}
