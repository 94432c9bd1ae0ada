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
//! The whole loop against simulated peripherals.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::convert::Infallible;
use std::rc::Rc;

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::{self, ErrorKind, NoAcknowledgeSource, Operation};

use matrixclock::app::Clock;
use matrixclock::arbiter::DisplayState;
use matrixclock::display::{Display, Layout};
use matrixclock::ds1307;
use matrixclock::epoch::{DateTime, EpochSeconds};
use matrixclock::protocol::{HostLink, Link};
use matrixclock::settings::{Settings, SettingsStore, IMAGE_LEN};
use matrixclock::tz::Resolution;
use matrixclock::Instant;

// 2024-06-01T00:00:00Z, 10:00 in Sydney.
const JUNE: EpochSeconds = 1_717_200_000;

#[derive(Default)]
struct Rtc {
    regs: Option<[u8; 7]>,
    failing: bool,
}

#[derive(Clone)]
struct Bus(Rc<RefCell<Rtc>>);

impl i2c::ErrorType for Bus {
    type Error = ErrorKind;
}

impl i2c::I2c for Bus {
    fn transaction(
        &mut self,
        _address: u8,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        let mut rtc = self.0.borrow_mut();
        let Some(regs) = rtc.regs.as_mut() else {
            return Err(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address));
        };
        let mut updated = None;
        for op in operations {
            match op {
                Operation::Write(bytes) if bytes.len() == 8 => {
                    let mut next = [0; 7];
                    next.copy_from_slice(&bytes[1..]);
                    updated = Some(next);
                }
                Operation::Write(_) => {}
                Operation::Read(buf) => {
                    let n = buf.len().min(7);
                    buf[..n].copy_from_slice(&regs[..n]);
                }
            }
        }
        if let Some(next) = updated {
            *regs = next;
        }
        if rtc.failing {
            return Err(ErrorKind::Other);
        }
        Ok(())
    }
}

struct Panel {
    shown: Vec<(String, Layout)>,
    layout: Layout,
    frames: usize,
    mirrored: bool,
    intensity: u8,
}

impl Panel {
    fn new() -> Self {
        Self {
            shown: Vec::new(),
            layout: Layout::Centered,
            frames: 0,
            mirrored: false,
            intensity: 0,
        }
    }

    fn face(&self) -> Option<&str> {
        self.shown
            .iter()
            .rev()
            .find(|(_, layout)| *layout == Layout::Centered)
            .map(|(text, _)| text.as_str())
    }
}

impl Display for Panel {
    type Error = Infallible;

    fn show(&mut self, text: &str, layout: Layout) -> Result<(), Infallible> {
        self.shown.push((text.to_owned(), layout));
        self.layout = layout;
        self.frames = 0;
        Ok(())
    }

    fn animate(&mut self, _now: Instant) -> Result<bool, Infallible> {
        if self.layout == Layout::Centered {
            return Ok(true);
        }
        self.frames += 1;
        Ok(self.frames >= 40)
    }

    fn set_mirrored(&mut self, mirrored: bool) -> Result<(), Infallible> {
        self.mirrored = mirrored;
        Ok(())
    }

    fn set_intensity(&mut self, level: u8) -> Result<(), Infallible> {
        self.intensity = level;
        Ok(())
    }

    fn set_indicator(&mut self, _on: bool) -> Result<(), Infallible> {
        Ok(())
    }
}

#[derive(Default)]
struct Host {
    rx: VecDeque<u8>,
    requests: usize,
    time: Option<EpochSeconds>,
}

impl Host {
    fn send(&mut self, bytes: &[u8]) {
        self.rx.extend(bytes);
    }
}

#[derive(Clone)]
struct Serial(Rc<RefCell<Host>>);

impl Link for Serial {
    type Error = Infallible;

    fn read(&mut self) -> nb::Result<u8, Infallible> {
        self.0.borrow_mut().rx.pop_front().ok_or(nb::Error::WouldBlock)
    }

    fn request_time(&mut self) -> Result<(), Infallible> {
        let mut host = self.0.borrow_mut();
        host.requests += 1;
        if let Some(epoch) = host.time {
            host.rx.push_back(0xFF);
            host.rx.extend(format!("{:010}", epoch).bytes());
        }
        Ok(())
    }
}

struct Eeprom([u8; IMAGE_LEN]);

impl SettingsStore for Eeprom {
    type Error = Infallible;

    fn load(&mut self) -> Result<Settings, Infallible> {
        Ok(Settings::from_bytes(&self.0))
    }

    fn save(&mut self, settings: &Settings) -> Result<(), Infallible> {
        self.0 = settings.to_bytes();
        Ok(())
    }
}

struct NoDelay;

impl DelayNs for NoDelay {
    fn delay_ns(&mut self, _ns: u32) {}
}

struct Rig {
    clock: Clock<Bus>,
    rtc: Rc<RefCell<Rtc>>,
    host: Rc<RefCell<Host>>,
    link: HostLink<Serial>,
    panel: Panel,
    eeprom: Eeprom,
    now: u32,
    tilt: bool,
}

impl Rig {
    fn boot(rtc: Rtc, host: Host) -> Self {
        let rtc = Rc::new(RefCell::new(rtc));
        let host = Rc::new(RefCell::new(host));
        let mut link = HostLink::new(Serial(host.clone()));
        let mut panel = Panel::new();
        let mut eeprom = Eeprom([0xFF; IMAGE_LEN]);
        let clock = Clock::boot(
            Bus(rtc.clone()),
            false,
            &mut eeprom,
            &mut link,
            &mut panel,
            &mut NoDelay,
            || Instant::from_ticks(0),
        );
        Self {
            clock,
            rtc,
            host,
            link,
            panel,
            eeprom,
            now: 0,
            tilt: false,
        }
    }

    /// Run the loop every 10 ms for `ms`.
    fn run(&mut self, ms: u32) {
        let end = self.now + ms;
        while self.now < end {
            self.clock.poll(
                Instant::from_ticks(self.now),
                self.tilt,
                &mut self.link,
                &mut self.panel,
                &mut self.eeprom,
            );
            self.now += 10;
        }
    }

    /// One loop iteration at `ms`.
    fn poll_at(&mut self, ms: u32) {
        self.clock.poll(
            Instant::from_ticks(ms),
            self.tilt,
            &mut self.link,
            &mut self.panel,
            &mut self.eeprom,
        );
    }

    fn send(&self, bytes: &[u8]) {
        self.host.borrow_mut().send(bytes);
    }
}

fn answering_host() -> Host {
    Host {
        time: Some(JUNE),
        ..Host::default()
    }
}

fn rtc_at(dt: &DateTime) -> Rtc {
    Rtc {
        regs: Some(ds1307::encode(dt)),
        failing: false,
    }
}

#[test]
fn boot_sync_writes_rtc() {
    let mut rig = Rig::boot(rtc_at(&DateTime::new(2020, 1, 1, 0, 0, 0)), answering_host());
    let regs = rig.rtc.borrow().regs.unwrap();
    assert_eq!(ds1307::decode(&regs), DateTime::from_epoch(JUNE));
    assert_eq!(rig.host.borrow().requests, 1);

    rig.run(10);
    assert_eq!(rig.panel.face(), Some("10:00"));
}

#[test]
fn rtc_failure_falls_back_to_software_time() {
    let mut rig = Rig::boot(rtc_at(&DateTime::from_epoch(JUNE)), Host::default());
    rig.run(1000);
    assert_eq!(rig.panel.face(), Some("10:00"));

    rig.rtc.borrow_mut().failing = true;
    rig.run(61_000);
    assert_eq!(rig.panel.face(), Some("10:01"));
    assert!(rig.clock.source().presence());
}

#[test]
fn no_rtc_and_no_host_counts_from_default_epoch() {
    let mut rig = Rig::boot(Rtc::default(), Host::default());
    assert!(!rig.clock.source().presence());
    assert!(!rig.clock.source().is_synced());
    rig.run(10);
    // 2024-01-01T00:00:00Z is 11:00 in a Sydney summer.
    assert_eq!(rig.panel.face(), Some("11:00"));
}

#[test]
fn ineffective_rule_uses_built_in_calendar() {
    let mut rig = Rig::boot(Rtc::default(), answering_host());
    rig.send(b"\xFDtz=UTC0\x00");
    rig.run(10);
    let local = rig.clock.local_time(Instant::from_ticks(rig.now));
    assert_eq!(local.resolution, Resolution::Fallback);
    assert_eq!(rig.panel.face(), Some("10:00"));

    rig.send(b"\xFDtz=IST-5:30\x00");
    rig.run(1000);
    assert_eq!(rig.panel.face(), Some("05:30"));
}

#[test]
fn messages_scroll_over_the_clock_and_expire() {
    let mut rig = Rig::boot(Rtc::default(), answering_host());
    rig.run(1000);
    rig.send(b"\xFEline one\r\nline two\x00");
    rig.run(10);
    match rig.clock.arbiter().state() {
        DisplayState::Scroll { text, .. } => assert_eq!(text, "line one  line two"),
        other => panic!("expected scroll, got {:?}", other),
    }
    rig.run(4000);
    assert!(matches!(rig.clock.arbiter().state(), DisplayState::Scroll { .. }));
    rig.run(2000);
    assert_eq!(rig.clock.arbiter().state(), &DisplayState::Clock);
    assert_eq!(rig.panel.shown.last().map(|(_, l)| *l), Some(Layout::Centered));
}

#[test]
fn settings_survive_a_reboot() {
    let mut rig = Rig::boot(Rtc::default(), answering_host());
    rig.send(b"\xFDbright=2\x00\xFDtilt=0\x00\xFDsave\x00");
    rig.run(10);
    assert_eq!(rig.panel.intensity, 2);
    // Polarity flipped with the switch reading low: now upside down.
    assert!(rig.panel.mirrored);

    let image = rig.eeprom.0;
    let mut again = Eeprom(image);
    let mut link = HostLink::new(Serial(rig.host.clone()));
    let mut panel = Panel::new();
    let clock = Clock::boot(
        Bus(rig.rtc.clone()),
        false,
        &mut again,
        &mut link,
        &mut panel,
        &mut NoDelay,
        || Instant::from_ticks(0),
    );
    assert_eq!(panel.intensity, 2);
    assert!(panel.mirrored);
    assert!(clock.inverted());
}

#[test]
fn tilt_bounce_is_ignored() {
    let mut rig = Rig::boot(Rtc::default(), answering_host());
    for _ in 0..20 {
        rig.tilt = !rig.tilt;
        rig.run(100);
    }
    rig.tilt = false;
    rig.run(2000);
    assert!(!rig.panel.mirrored);

    rig.tilt = true;
    rig.run(600);
    assert!(rig.panel.mirrored);
}

#[test]
fn hourly_resync_continues_after_missed_reply() {
    let mut rig = Rig::boot(Rtc::default(), answering_host());
    rig.run(1000);
    assert_eq!(rig.host.borrow().requests, 1);

    rig.poll_at(3_600_000);
    assert_eq!(rig.host.borrow().requests, 2);

    // Host goes quiet and the request times out.
    rig.host.borrow_mut().time = None;
    rig.poll_at(7_200_000);
    assert_eq!(rig.host.borrow().requests, 3);
    rig.poll_at(7_210_000);
    assert!(!rig.link.is_connected());

    // Still asked on the hour, and the answer brings the link back.
    rig.host.borrow_mut().time = Some(JUNE + 10_800);
    rig.poll_at(10_800_000);
    assert_eq!(rig.host.borrow().requests, 4);
    rig.poll_at(10_800_010);
    assert!(rig.link.is_connected());
    let local = rig.clock.local_time(Instant::from_ticks(10_800_010));
    assert_eq!((local.wall.hour, local.wall.minute), (13, 0));
}

#[test]
fn host_arriving_after_boot_is_synced_on_the_hour() {
    let mut rig = Rig::boot(Rtc::default(), Host::default());
    assert_eq!(rig.host.borrow().requests, 20);
    assert!(!rig.clock.source().is_synced());

    rig.host.borrow_mut().time = Some(JUNE);
    rig.poll_at(3_600_000);
    assert_eq!(rig.host.borrow().requests, 21);
    rig.poll_at(3_600_010);
    assert!(rig.clock.source().is_synced());
    assert!(rig.link.is_connected());
    let local = rig.clock.local_time(Instant::from_ticks(3_600_010));
    assert_eq!((local.wall.hour, local.wall.minute), (10, 0));
}
