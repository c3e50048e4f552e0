//! Hardware timer interfaces consumed by the scheduling core, and the
//! ATmega128 implementations behind them.

/// Free-running counter with one compare channel and an overflow interrupt.
///
/// Methods take `&self` because the timer is shared between the foreground
/// loop and the compare/overflow interrupt handlers; register access is
/// inherently interior-mutable.
pub trait SysTimer {
    /// Width of the hardware counter in bits (at most 32).
    const COUNTER_BITS: u32;

    /// Zero the counter and start counting.
    fn start(&self);

    /// Halt the counter.
    fn stop(&self);

    /// Raw counter value.
    fn counter(&self) -> u32;

    /// Program the compare register. Only the low `COUNTER_BITS` are used.
    fn set_compare(&self, value: u32);

    fn enable_compare_irq(&self);

    fn disable_compare_irq(&self);

    fn compare_irq_enabled(&self) -> bool;
}

/// Hardware pulse-train generator used by burst actions.
pub trait BurstTimer {
    /// Start a square-ish train with the given period in burst-timer ticks.
    fn start_burst(&mut self, period_ticks: u32);

    /// Stop the train and leave the output low.
    fn stop_burst(&mut self);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Prescaler {
    Stop = 0,
    Direct = 1,
    Div8 = 2,
    Div64 = 3,
    Div256 = 4,
    Div1024 = 5,
}

impl Prescaler {
    pub const fn divisor(self) -> u32 {
        match self {
            Prescaler::Stop => 0,
            Prescaler::Direct => 1,
            Prescaler::Div8 => 8,
            Prescaler::Div64 => 64,
            Prescaler::Div256 => 256,
            Prescaler::Div1024 => 1024,
        }
    }
}

#[cfg(target_arch = "avr")]
pub use self::avr::{Tc0Millis, Tc1SysTimer, Tc3Burst};

#[cfg(target_arch = "avr")]
mod avr {
    use super::{BurstTimer, Prescaler, SysTimer};
    use avr_device::atmega128::{TC0, TC1, TC3};

    const PRESCALER_MASK: u8 = 0x07;
    const TOIE1: u8 = 1 << 2;
    const OCIE1A: u8 = 1 << 4;
    const OCIE0: u8 = 1 << 1;
    // CTC mode, clk/64 (TC0 has its own prescaler table)
    const TCCR0_CTC_DIV64: u8 = (1 << 3) | 0b100;
    const OCR0_1KHZ: u8 = 249;
    // Fast PWM, TOP = ICR3, clear OC3A on compare
    const TCCR3A_FAST_PWM: u8 = (1 << 7) | (1 << 1);
    const TCCR3B_FAST_PWM: u8 = (1 << 4) | (1 << 3);

    /// TC1 in normal mode, OCR1A as the event compare channel.
    pub struct Tc1SysTimer {
        prescaler: Prescaler,
    }

    impl Tc1SysTimer {
        pub const fn new(prescaler: Prescaler) -> Self {
            Self { prescaler }
        }

        /// Normal mode, overflow interrupt on, compare interrupt masked.
        pub fn init(&self) {
            unsafe {
                let p = TC1::ptr();
                (*p).tccr1a.write(|w| w.bits(0));
                (*p).tccr1b.write(|w| w.bits(0));
                (*p).tcnt1.write(|w| w.bits(0));
                (*p).timsk.modify(|r, w| w.bits((r.bits() | TOIE1) & !OCIE1A));
            }
        }
    }

    impl SysTimer for Tc1SysTimer {
        const COUNTER_BITS: u32 = 16;

        fn start(&self) {
            unsafe {
                let p = TC1::ptr();
                (*p).tcnt1.write(|w| w.bits(0));
                (*p).tccr1b.modify(|r, w| {
                    w.bits((r.bits() & !PRESCALER_MASK) | (self.prescaler as u8 & PRESCALER_MASK))
                });
            }
        }

        fn stop(&self) {
            unsafe {
                let p = TC1::ptr();
                (*p).tccr1b.modify(|r, w| w.bits(r.bits() & !PRESCALER_MASK));
            }
        }

        fn counter(&self) -> u32 {
            unsafe { (*TC1::ptr()).tcnt1.read().bits() as u32 }
        }

        fn set_compare(&self, value: u32) {
            unsafe { (*TC1::ptr()).ocr1a.write(|w| w.bits(value as u16)) }
        }

        fn enable_compare_irq(&self) {
            unsafe { (*TC1::ptr()).timsk.modify(|r, w| w.bits(r.bits() | OCIE1A)) }
        }

        fn disable_compare_irq(&self) {
            unsafe { (*TC1::ptr()).timsk.modify(|r, w| w.bits(r.bits() & !OCIE1A)) }
        }

        fn compare_irq_enabled(&self) -> bool {
            unsafe { (*TC1::ptr()).timsk.read().bits() & OCIE1A != 0 }
        }
    }

    /// TC3 fast PWM on OC3A, 1/8 duty cycle.
    pub struct Tc3Burst {
        _private: (),
    }

    impl Tc3Burst {
        pub const fn new() -> Self {
            Self { _private: () }
        }
    }

    impl BurstTimer for Tc3Burst {
        fn start_burst(&mut self, period_ticks: u32) {
            let top = period_ticks.min(u16::MAX as u32) as u16;
            unsafe {
                let p = TC3::ptr();
                (*p).tccr3b.write(|w| w.bits(0));
                (*p).tcnt3.write(|w| w.bits(0));
                (*p).icr3.write(|w| w.bits(top));
                (*p).ocr3a.write(|w| w.bits(top >> 3));
                (*p).tccr3a.write(|w| w.bits(TCCR3A_FAST_PWM));
                (*p).tccr3b.write(|w| w.bits(TCCR3B_FAST_PWM | Prescaler::Direct as u8));
            }
        }

        fn stop_burst(&mut self) {
            unsafe {
                let p = TC3::ptr();
                (*p).tccr3b.write(|w| w.bits(0));
                (*p).tccr3a.write(|w| w.bits(0));
            }
        }
    }

    /// TC0 compare interrupt at 1 kHz, the millisecond time base for link
    /// timeouts. Independent of the system timer, which the host can stop.
    pub struct Tc0Millis {
        _private: (),
    }

    impl Tc0Millis {
        pub const fn new() -> Self {
            Self { _private: () }
        }

        pub fn init(&self) {
            unsafe {
                let p = TC0::ptr();
                (*p).tcnt0.write(|w| w.bits(0));
                (*p).ocr0.write(|w| w.bits(OCR0_1KHZ));
                (*p).tccr0.write(|w| w.bits(TCCR0_CTC_DIV64));
                (*TC1::ptr()).timsk.modify(|r, w| w.bits(r.bits() | OCIE0));
            }
        }
    }
}
