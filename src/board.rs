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
//! Arduino Nano implementations of the library's collaborator traits.
//!
//! The USART transmit half is shared: log lines and the time request byte
//! both go out through it, so it lives in a global guarded like the
//! millisecond counter.

use core::cell::RefCell;
use core::fmt::{self, Write as _};

use arduino_hal::hal::port::{mode, Pin, PD0, PD1};
use arduino_hal::prelude::*;
use avr_device::interrupt::Mutex;
use log::{LevelFilter, Log, Metadata, Record};

use matrixclock::protocol::{Link, TIME_REQUEST};
use matrixclock::settings::{Settings, SettingsStore, IMAGE_LEN};

type Rx = Pin<mode::Input, PD0>;
type Tx = Pin<mode::Output, PD1>;

pub type SerialReader = arduino_hal::usart::UsartReader<arduino_hal::pac::USART0, Rx, Tx>;
pub type SerialWriter = arduino_hal::usart::UsartWriter<arduino_hal::pac::USART0, Rx, Tx>;

static WRITER: Mutex<RefCell<Option<SerialWriter>>> = Mutex::new(RefCell::new(None));

/// Hand the transmit half to the logger and the link.
pub fn install_writer(writer: SerialWriter) {
    avr_device::interrupt::free(|cs| *WRITER.borrow(cs).borrow_mut() = Some(writer));
}

fn with_writer(f: impl FnOnce(&mut SerialWriter)) {
    avr_device::interrupt::free(|cs| {
        if let Some(writer) = WRITER.borrow(cs).borrow_mut().as_mut() {
            f(writer);
        }
    })
}

/// `core::fmt` on top of the ufmt serial writer.
struct FmtSerial<'a>(&'a mut SerialWriter);

impl fmt::Write for FmtSerial<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        // Infallible: the USART blocks until each byte is out.
        let _ = ufmt::uWrite::write_str(self.0, s);
        Ok(())
    }
}

struct SerialLogger;

impl Log for SerialLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        with_writer(|writer| {
            let _ = write!(
                FmtSerial(writer),
                "{} {}: {}\r\n",
                record.level(),
                record.target(),
                record.args()
            );
        });
    }

    fn flush(&self) {}
}

static LOGGER: SerialLogger = SerialLogger;

/// Route the `log` macros to the serial port.  Call once, before enabling
/// interrupts.
pub fn init_logging(level: LevelFilter) {
    // SAFETY: single core, called once before anything else logs.  AVR has
    // no atomic compare-and-swap for the safe variants.
    unsafe {
        let _ = log::set_logger_racy(&LOGGER);
        log::set_max_level_racy(level);
    }
}

/// The host link over the USB serial port.
pub struct SerialLink {
    rx: SerialReader,
}

impl SerialLink {
    pub fn new(rx: SerialReader) -> Self {
        Self { rx }
    }
}

impl Link for SerialLink {
    type Error = ();

    fn read(&mut self) -> nb::Result<u8, ()> {
        self.rx.read().map_err(|e| e.map(|_| ()))
    }

    fn request_time(&mut self) -> Result<(), ()> {
        with_writer(|writer| {
            let _ = ufmt::uWrite::write_char(writer, char::from(TIME_REQUEST));
        });
        Ok(())
    }
}

/// Settings image at the start of the onboard EEPROM.
pub struct EepromStore {
    eeprom: arduino_hal::Eeprom,
}

impl EepromStore {
    pub fn new(eeprom: arduino_hal::Eeprom) -> Self {
        Self { eeprom }
    }
}

impl SettingsStore for EepromStore {
    type Error = ();

    fn load(&mut self) -> Result<Settings, ()> {
        let mut image = [0xFF; IMAGE_LEN];
        self.eeprom.read(0, &mut image).map_err(|_| ())?;
        Ok(Settings::from_bytes(&image))
    }

    /// Only bytes that differ are rewritten, to spare the cells.
    fn save(&mut self, settings: &Settings) -> Result<(), ()> {
        for (offset, &byte) in (0u16..).zip(settings.to_bytes().iter()) {
            if self.eeprom.read_byte(offset) != byte {
                self.eeprom.write_byte(offset, byte);
            }
        }
        Ok(())
    }
}
