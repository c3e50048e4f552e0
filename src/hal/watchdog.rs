use avr_device::atmega128::WDT;

/// Watchdog prescaler selections (WDP2..0) at the 1 MHz watchdog oscillator
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum WatchdogTimeout {
    Ms14 = 0,
    Ms28 = 1,
    Ms56 = 2,
    Ms110 = 3,
    Ms220 = 4,
    Ms450 = 5,
    Ms900 = 6,
    Ms1800 = 7,
}

impl WatchdogTimeout {
    /// Shortest timeout not below `ms`.
    pub const fn at_least_ms(ms: u16) -> Self {
        match ms {
            0..=14 => WatchdogTimeout::Ms14,
            15..=28 => WatchdogTimeout::Ms28,
            29..=56 => WatchdogTimeout::Ms56,
            57..=110 => WatchdogTimeout::Ms110,
            111..=220 => WatchdogTimeout::Ms220,
            221..=450 => WatchdogTimeout::Ms450,
            451..=900 => WatchdogTimeout::Ms900,
            _ => WatchdogTimeout::Ms1800,
        }
    }
}

pub struct Watchdog {
    _private: (),
}

impl Watchdog {
    #[inline]
    pub fn new() -> Self {
        Self { _private: () }
    }

    #[inline]
    pub fn start(&mut self, timeout: WatchdogTimeout) {
        unsafe {
            let p = WDT::ptr();
            // WDCE | WDE opens the timed change window
            (*p).wdtcr.write(|w| w.bits(0x18));
            (*p).wdtcr.write(|w| w.bits(0x08 | timeout as u8));
        }
    }

    #[inline]
    pub fn feed(&mut self) {
        avr_device::asm::wdr();
    }

    /// Let the watchdog expire to reset the processor.
    pub fn force_reset(&mut self) -> ! {
        self.start(WatchdogTimeout::Ms14);
        loop {}
    }
}

impl Default for Watchdog {
    fn default() -> Self {
        Self::new()
    }
}
