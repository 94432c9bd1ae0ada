// Based on https://github.com/Rahix/avr-hal/blob/main/examples/arduino-uno/src/bin/uno-panic.rs
// License MIT

#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    // The loop is dead; nothing else may touch the peripherals again.
    avr_device::interrupt::disable();

    // SAFETY: we're never returning so stealing the peripherals is ok
    let dp = unsafe { arduino_hal::Peripherals::steal() };
    let pins = arduino_hal::pins!(dp);
    let mut serial = arduino_hal::default_serial!(dp, pins, crate::BAUD);

    let _ = ufmt::uwrite!(&mut serial, "\r\npanic");
    if let Some(loc) = info.location() {
        let _ = ufmt::uwrite!(
            &mut serial,
            " at {}:{}:{}",
            loc.file(),
            loc.line(),
            loc.column(),
        );
    }
    let _ = ufmt::uwrite!(&mut serial, "\r\n");

    // Blink the builtin LED.  It shares SCK, but the panel is deselected.
    let mut led = pins.d13.into_output();
    loop {
        led.toggle();
        arduino_hal::delay_ms(250);
    }
}
