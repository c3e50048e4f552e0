#![no_std]
#![no_main]
#![feature(abi_avr_interrupt)]

use avr_device::interrupt::{self, Mutex};
use core::cell::Cell;
use panic_halt as _;

use microsync_firmware::config::{self, board};
use microsync_firmware::drivers::OutputBank;
use microsync_firmware::hal::{
    gpio, uart, DynPin, Prescaler, Tc0Millis, Tc1SysTimer, Tc3Burst, Usart0, Watchdog, WatchdogTimeout,
};
use microsync_firmware::{Application, PollOutcome, Scheduler};

type Outputs = OutputBank<DynPin, Tc3Burst, { board::NUM_PINS }>;

const _: () = assert!(Prescaler::Div8.divisor() == config::SYS_TIMER_PRESCALER);

// Shared between the main loop and the timer interrupts
static SCHEDULER: Scheduler<Tc1SysTimer, Outputs, { config::MAX_EVENTS }> = Scheduler::new(
    Tc1SysTimer::new(Prescaler::Div8),
    OutputBank::new(gpio::board::pins(), Tc3Burst::new(), board::SHUTTER_PINS),
    config::SYS_TICK_RATE,
    config::SCHEDULER_CONFIG,
);

static MILLIS: Mutex<Cell<u32>> = Mutex::new(Cell::new(0));

fn millis() -> u32 {
    interrupt::free(|cs| MILLIS.borrow(cs).get())
}

#[avr_device::entry]
fn main() -> ! {
    gpio::board::init();
    SCHEDULER.clock().timer().init();
    Tc0Millis::new().init();

    let mut app = Application::new(Usart0::new(config::CPU_FREQ_HZ, config::UART_BAUD));
    let mut watchdog = Watchdog::new();
    watchdog.start(WatchdogTimeout::at_least_ms(config::WDT_TIMEOUT_MS));

    // Enable interrupts globally
    unsafe { interrupt::enable() };
    app.banner();

    loop {
        watchdog.feed();
        if app.poll(&SCHEDULER, millis()) == PollOutcome::ResetRequested {
            let _ = app.console().flush();
            watchdog.force_reset();
        }
    }
}

#[avr_device::interrupt(atmega128)]
fn TIMER1_COMPA() {
    // Overflow and UART interrupts may preempt a long drain. The scheduler
    // masks this interrupt itself while it touches the queue.
    unsafe { interrupt::enable() };
    SCHEDULER.on_compare();
}

#[avr_device::interrupt(atmega128)]
fn TIMER1_OVF() {
    SCHEDULER.on_overflow();
}

#[avr_device::interrupt(atmega128)]
fn TIMER0_COMP() {
    interrupt::free(|cs| {
        let ms = MILLIS.borrow(cs);
        ms.set(ms.get().wrapping_add(1));
    });
}

#[avr_device::interrupt(atmega128)]
fn USART0_RX() {
    uart::on_rx_interrupt();
}

#[avr_device::interrupt(atmega128)]
fn USART0_UDRE() {
    uart::on_udre_interrupt();
}
