/*
 matrixclock

 Firmware for a four module MAX7219 LED matrix clock on an Arduino Nano.

 Target: ATmega328P, clock at 16 MHz.

 Wiring:
   * MAX7219 chain: DIN D11, CLK D13, CS D10.
   * DS1307 (optional): SDA A4, SCL A5.
   * Tilt switch: D2 to ground, internal pull-up.
   * Host PC on the USB serial port, 9600 baud.

 This library is free software: you can redistribute it and/or modify
 it under the terms of the GNU General Public License as published by
 the Free Software Foundation, either version 3 of the License, or
 (at your option) any later version.

 This library is distributed in the hope that it will be useful,
 but WITHOUT ANY WARRANTY; without even the implied warranty of
 MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 GNU General Public License for more details.

 You should have received a copy of the GNU General Public License
 along with this library.  If not, see <http://www.gnu.org/licenses/>.

 */

#![no_std]
#![no_main]

mod board;
mod panic;
mod timer;

use arduino_hal::spi;
use log::LevelFilter;

use matrixclock::app::Clock;
use matrixclock::matrix::MatrixDisplay;
use matrixclock::max7219::Max7219;
use matrixclock::protocol::HostLink;

/// Serial speed of the host link, the log, and the panic message.
pub const BAUD: u32 = 9600;

const PANEL_MODULES: usize = 4;

// Standard mode I2C; the DS1307 tops out at 100 kHz.
const I2C_SPEED: u32 = 50_000;

#[arduino_hal::entry]
fn main() -> ! {
    let dp = arduino_hal::Peripherals::take().unwrap();
    let pins = arduino_hal::pins!(dp);
    let serial = arduino_hal::default_serial!(dp, pins, BAUD);
    let (rx, tx) = serial.split();

    board::install_writer(tx);
    board::init_logging(LevelFilter::Info);

    timer::init_tc0(dp.TC0);
    // SAFETY: the only interrupt handler is the millisecond counter, set up above.
    unsafe { avr_device::interrupt::enable() };

    let i2c = arduino_hal::I2c::new(
        dp.TWI,
        pins.a4.into_pull_up_input(),
        pins.a5.into_pull_up_input(),
        I2C_SPEED,
    );
    let (spi, cs) = arduino_hal::Spi::new(
        dp.SPI,
        pins.d13.into_output(),
        pins.d11.into_output(),
        pins.d12.into_pull_up_input(),
        pins.d10.into_output(),
        spi::Settings::default(),
    );
    let tilt = pins.d2.into_pull_up_input();

    let mut display = match Max7219::<_, _, PANEL_MODULES>::new(spi, cs) {
        Ok(dev) => MatrixDisplay::new(dev),
        Err(_) => panic!("matrix init"),
    };
    let mut store = board::EepromStore::new(arduino_hal::Eeprom::new(dp.EEPROM));
    let mut host = HostLink::new(board::SerialLink::new(rx));
    let mut delay = arduino_hal::Delay::new();

    let mut clock = Clock::boot(
        i2c,
        tilt.is_high(),
        &mut store,
        &mut host,
        &mut display,
        &mut delay,
        timer::now,
    );

    loop {
        clock.poll(timer::now(), tilt.is_high(), &mut host, &mut display, &mut store);
    }
}
