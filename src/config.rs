//! Configuration constants for the microsync firmware

use crate::rtos::action::PinId;
use crate::rtos::clock::TickRate;
use crate::rtos::scheduler::SchedulerConfig;

/// Firmware version reported over the serial link
pub const VERSION: &str = "2.4.1";

/// CPU frequency in Hz
pub const CPU_FREQ_HZ: u32 = 16_000_000;

/// System timer (TC1) prescaler
pub const SYS_TIMER_PRESCALER: u32 = 8;

/// Width of the system timer counter
pub const SYS_TIMER_BITS: u32 = 16;

/// Tick/microsecond conversion for the system timer: 2 ticks per us
pub const SYS_TICK_RATE: TickRate =
    TickRate::from_timer_clock(CPU_FREQ_HZ as u64, SYS_TIMER_PRESCALER as u64);

/// Burst timer (TC3) runs unprescaled
pub const BURST_TICKS_PER_US: u32 = CPU_FREQ_HZ / 1_000_000;

/// UART baud rate
pub const UART_BAUD: u32 = 115_200;

/// A partially received packet is discarded after this much silence
pub const UART_TIMEOUT_MS: u32 = 25;

/// Watchdog timeout period in milliseconds
pub const WDT_TIMEOUT_MS: u16 = 100;

/// Maximum number of pending actions. Sized for 4 KiB of SRAM.
pub const MAX_EVENTS: usize = 64;

/// Any action due within this window is fired right away
pub const TS_TOLERANCE_US: u64 = 2;

/// Head of the queue this far behind means the compare interrupt was starved
pub const TS_MISSED_TOLERANCE_US: u64 = 100;

/// Repeat intervals below this are treated as one-shot
pub const MIN_EVENT_INTERVAL_US: u64 = 20;

/// Added to every timestamp requested by the host
pub const UNIFORM_TIME_DELAY_US: u64 = 500;

/// Pulse width used when a command leaves it at zero
pub const DEFAULT_PULSE_DURATION_US: u32 = 100;

pub const DEFAULT_SHUTTER_DELAY_US: u32 = 1_000;
pub const DEFAULT_CAM_READOUT_US: u32 = 10_000;

pub const SCHEDULER_CONFIG: SchedulerConfig = SchedulerConfig::from_micros(
    SYS_TICK_RATE,
    TS_TOLERANCE_US,
    TS_MISSED_TOLERANCE_US,
    MIN_EVENT_INTERVAL_US,
);

/// Board pin assignments (logical pin ids, see `drivers::pins`)
pub mod board {
    use super::PinId;

    /// Number of addressable logical pins (D0..D67)
    pub const NUM_PINS: usize = 68;

    /// Laser shutters Cy2, Cy3, Cy5, Cy7 on A0..A3
    pub const SHUTTER_PINS: [PinId; 4] = [54, 55, 56, 57];

    /// Camera trigger
    pub const CAMERA_PIN: PinId = 66;

    /// Error indicator LED
    pub const ERR_PIN: PinId = 53;

    /// Scope probe for main loop timing
    pub const DBG_PIN: PinId = 31;
}
