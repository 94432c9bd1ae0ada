//! Millisecond counter for the main loop, the Arduino `millis()`.
//!
//! TC0 runs in CTC mode and fires `TIMER0_COMPA` once a millisecond; the
//! handler bumps a 32-bit counter that wraps after about 49 days.  Everything
//! downstream compares [`Instant`]s, which copes with the wrap.
//!
//! Based on https://blog.rahix.de/005-avr-hal-millis/
use avr_device::interrupt::Mutex;
use core::cell::Cell;

use matrixclock::Instant;

// 16 MHz / 64 / 250 = 1 kHz.
const PRESCALER: u32 = 64;
const TIMER_COUNTS: u32 = 250;

const MILLIS_INCREMENT: u32 = PRESCALER * TIMER_COUNTS / 16_000;

static MILLIS_COUNTER: Mutex<Cell<u32>> = Mutex::new(Cell::new(0));

#[avr_device::interrupt(atmega328p)]
fn TIMER0_COMPA() {
    avr_device::interrupt::free(|cs| {
        let counter = MILLIS_COUNTER.borrow(cs);
        counter.set(counter.get().wrapping_add(MILLIS_INCREMENT));
    })
}

/// Milliseconds since `init_tc0()`.
pub fn now() -> Instant {
    Instant::from_ticks(avr_device::interrupt::free(|cs| MILLIS_COUNTER.borrow(cs).get()))
}

/// Start TC0 counting.  Interrupts still have to be enabled globally.
pub fn init_tc0(tc0: arduino_hal::pac::TC0) {
    tc0.tccr0a.write(|w| w.wgm0().ctc());
    tc0.ocr0a.write(|w| w.bits(TIMER_COUNTS as u8));
    tc0.tccr0b.write(|w| w.cs0().prescale_64());
    tc0.timsk0.write(|w| w.ocie0a().set_bit());

    avr_device::interrupt::free(|cs| MILLIS_COUNTER.borrow(cs).set(0));
}
