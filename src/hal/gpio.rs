//! Runtime-addressable output pins for the ATmega128 port registers.
//!
//! The scheduler addresses outputs by a logical pin id carried in the
//! action payload, so pins here are plain values rather than the
//! type-state pins a static board would use.

use core::convert::Infallible;
use embedded_hal::digital::v2::OutputPin;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Port {
    A,
    B,
    C,
    D,
    E,
    F,
    G,
}

/// An output line, or a placeholder for a logical pin with no wiring.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DynPin {
    line: Option<(Port, u8)>,
}

impl DynPin {
    pub const fn new(port: Port, bit: u8) -> Self {
        Self { line: Some((port, bit & 0x07)) }
    }

    pub const fn unconnected() -> Self {
        Self { line: None }
    }

    pub fn line(&self) -> Option<(Port, u8)> {
        self.line
    }

    /// Configure the line as an output driven low.
    pub fn into_output(self) -> Self {
        if let Some((port, bit)) = self.line {
            regs::set_ddr(port, bit);
            regs::write(port, bit, false);
        }
        self
    }
}

impl OutputPin for DynPin {
    type Error = Infallible;

    fn set_low(&mut self) -> Result<(), Self::Error> {
        if let Some((port, bit)) = self.line {
            regs::write(port, bit, false);
        }
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        if let Some((port, bit)) = self.line {
            regs::write(port, bit, true);
        }
        Ok(())
    }
}

#[cfg(target_arch = "avr")]
mod regs {
    use super::Port;
    use avr_device::atmega128::{PORTA, PORTB, PORTC, PORTD, PORTE, PORTF, PORTG};

    macro_rules! with_port {
        ($port:expr, |$p:ident| $body:expr) => {
            match $port {
                Port::A => { let $p = unsafe { &*PORTA::ptr() }; $body }
                Port::B => { let $p = unsafe { &*PORTB::ptr() }; $body }
                Port::C => { let $p = unsafe { &*PORTC::ptr() }; $body }
                Port::D => { let $p = unsafe { &*PORTD::ptr() }; $body }
                Port::E => { let $p = unsafe { &*PORTE::ptr() }; $body }
                Port::F => { let $p = unsafe { &*PORTF::ptr() }; $body }
                Port::G => { let $p = unsafe { &*PORTG::ptr() }; $body }
            }
        };
    }

    pub fn set_ddr(port: Port, bit: u8) {
        with_port!(port, |p| p.ddr.modify(|r, w| unsafe { w.bits(r.bits() | (1 << bit)) }))
    }

    pub fn write(port: Port, bit: u8, high: bool) {
        with_port!(port, |p| p.port.modify(|r, w| unsafe {
            if high {
                w.bits(r.bits() | (1 << bit))
            } else {
                w.bits(r.bits() & !(1 << bit))
            }
        }))
    }
}

// Host builds have no port registers; pins are inert.
#[cfg(not(target_arch = "avr"))]
mod regs {
    use super::Port;

    pub fn set_ddr(_port: Port, _bit: u8) {}

    pub fn write(_port: Port, _bit: u8, _high: bool) {}
}

/// Board wiring: logical pin id to port line.
pub mod board {
    use super::{DynPin, Port};
    use crate::config::board::NUM_PINS;

    /// Wired lines. Everything else is left unconnected.
    const WIRING: [(u8, Port, u8); 8] = [
        (31, Port::D, 7), // debug probe
        (53, Port::D, 6), // error LED
        (54, Port::A, 0), // shutter Cy2
        (55, Port::A, 1), // shutter Cy3
        (56, Port::A, 2), // shutter Cy5
        (57, Port::A, 3), // shutter Cy7
        (66, Port::C, 0), // camera trigger
        (67, Port::C, 1),
    ];

    /// Pin table for the output bank. Lines still need `init` before use.
    pub const fn pins() -> [DynPin; NUM_PINS] {
        let mut pins = [DynPin::unconnected(); NUM_PINS];
        let mut i = 0;
        while i < WIRING.len() {
            let (id, port, bit) = WIRING[i];
            pins[id as usize] = DynPin::new(port, bit);
            i += 1;
        }
        pins
    }

    /// Make every wired line an output, driven low.
    pub fn init() {
        for &(_, port, bit) in WIRING.iter() {
            let _ = DynPin::new(port, bit).into_output();
        }
    }
}
