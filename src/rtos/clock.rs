//! Logical clock: a 64-bit tick count built from a wrapping hardware counter.

use core::cell::UnsafeCell;
use core::sync::atomic::{compiler_fence, AtomicBool, Ordering};

use crate::hal::timer::SysTimer;

/// Fixed-point tick/microsecond ratio: `ticks = us * multiplier / divisor`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TickRate {
    multiplier: u64,
    divisor: u64,
}

const fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a
}

/// `value * mul / div` with a 128-bit intermediate. Results past `u64::MAX`
/// are a configuration error: they assert in debug builds and saturate in
/// release builds.
const fn scale(value: u64, mul: u64, div: u64) -> u64 {
    let wide = value as u128 * mul as u128 / div as u128;
    if wide > u64::MAX as u128 {
        debug_assert!(false, "tick conversion overflow");
        u64::MAX
    } else {
        wide as u64
    }
}

impl TickRate {
    pub const fn new(multiplier: u64, divisor: u64) -> Self {
        assert!(multiplier != 0 && divisor != 0, "tick rate must be non-zero");
        let g = gcd(multiplier, divisor);
        Self {
            multiplier: multiplier / g,
            divisor: divisor / g,
        }
    }

    /// Rate of a counter clocked at `clock_hz / prescaler`.
    pub const fn from_timer_clock(clock_hz: u64, prescaler: u64) -> Self {
        Self::new(clock_hz, prescaler * 1_000_000)
    }

    pub const fn multiplier(&self) -> u64 {
        self.multiplier
    }

    pub const fn divisor(&self) -> u64 {
        self.divisor
    }

    pub const fn micros_to_ticks(&self, us: u64) -> u64 {
        scale(us, self.multiplier, self.divisor)
    }

    pub const fn ticks_to_micros(&self, ticks: u64) -> u64 {
        scale(ticks, self.divisor, self.multiplier)
    }

    /// Worst-case round-trip error of `ticks_to_micros(micros_to_ticks(us))`.
    pub const fn resolution_micros(&self) -> u64 {
        if self.divisor <= self.multiplier {
            1
        } else {
            (self.divisor + self.multiplier - 1) / self.multiplier
        }
    }
}

/// Word written from one interrupt handler and read from the foreground.
/// 8-bit cores have no 32-bit atomics, so loads may tear; readers compare two
/// loads to catch that.
struct IsrWord(UnsafeCell<u32>);

// SAFETY: volatile word access; tearing is detected by the reader.
unsafe impl Sync for IsrWord {}

impl IsrWord {
    const fn new(value: u32) -> Self {
        Self(UnsafeCell::new(value))
    }

    fn load(&self) -> u32 {
        compiler_fence(Ordering::SeqCst);
        // SAFETY: pointer into our own cell.
        unsafe { core::ptr::read_volatile(self.0.get()) }
    }

    fn store(&self, value: u32) {
        // SAFETY: pointer into our own cell.
        unsafe { core::ptr::write_volatile(self.0.get(), value) };
        compiler_fence(Ordering::SeqCst);
    }
}

/// Extends `T`'s counter to 64 bits by counting overflows.
///
/// The overflow interrupt is the only writer of the overflow word. A read that
/// lands after the hardware wrapped but before that interrupt ran sees the
/// old overflow count, so `now_ticks` can lag by up to one counter period
/// around a wrap. That window is accepted rather than locked away.
pub struct LogicalClock<T: SysTimer> {
    timer: T,
    rate: TickRate,
    running: AtomicBool,
    overflows: IsrWord,
}

impl<T: SysTimer> LogicalClock<T> {
    pub const fn new(timer: T, rate: TickRate) -> Self {
        Self {
            timer,
            rate,
            running: AtomicBool::new(false),
            overflows: IsrWord::new(0),
        }
    }

    pub fn timer(&self) -> &T {
        &self.timer
    }

    pub fn rate(&self) -> TickRate {
        self.rate
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Start counting from zero. No-op if already running.
    pub fn start(&self) {
        if self.is_running() {
            return;
        }
        self.overflows.store(0);
        self.running.store(true, Ordering::Release);
        self.timer.start();
    }

    /// Halt the counter and forget the absolute time reference.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
        self.timer.stop();
        self.overflows.store(0);
    }

    /// Called from the counter overflow interrupt.
    pub fn on_overflow(&self) {
        if self.is_running() {
            // Only writer while running
            self.overflows.store(self.overflows.load().wrapping_add(1));
        }
    }

    pub fn overflow_count(&self) -> u32 {
        self.overflows.load()
    }

    /// Raw hardware counter, zero while stopped.
    pub fn raw_counter(&self) -> u32 {
        if self.is_running() {
            self.timer.counter()
        } else {
            0
        }
    }

    /// Current time in ticks; zero while the clock is stopped.
    pub fn now_ticks(&self) -> u64 {
        if !self.is_running() {
            return 0;
        }
        loop {
            let epoch = self.overflows.load();
            let raw = self.timer.counter() as u64 & counter_mask::<T>();
            if self.overflows.load() == epoch {
                return ((epoch as u64) << T::COUNTER_BITS) | raw;
            }
        }
    }

    pub fn now_micros(&self) -> u64 {
        self.rate.ticks_to_micros(self.now_ticks())
    }

    pub fn micros_to_ticks(&self, us: u64) -> u64 {
        self.rate.micros_to_ticks(us)
    }

    pub fn ticks_to_micros(&self, ticks: u64) -> u64 {
        self.rate.ticks_to_micros(ticks)
    }
}

/// Mask selecting the bits the hardware counter actually holds.
pub(crate) fn counter_mask<T: SysTimer>() -> u64 {
    (1u64 << T::COUNTER_BITS) - 1
}
