//! Interrupt-driven USART0 with software FIFOs.
//!
//! The receive interrupt fills `RX`, the data-register-empty interrupt drains
//! `TX`. The foreground only sees the `embedded-hal` serial traits, so a
//! frame in progress survives a long catch-up drain in the main loop.

use heapless::Deque;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum UartError {
    /// Receive ring was full and at least one byte was lost.
    Overrun,
}

/// Receive FIFO that remembers a lost byte until the reader hears about it.
pub struct RxQueue<const N: usize> {
    bytes: Deque<u8, N>,
    overrun: bool,
}

impl<const N: usize> RxQueue<N> {
    pub const fn new() -> Self {
        Self { bytes: Deque::new(), overrun: false }
    }

    /// Drops `byte` and flags an overrun when full.
    pub fn push(&mut self, byte: u8) {
        if self.bytes.push_back(byte).is_err() {
            self.overrun = true;
        }
    }

    /// An overrun is reported once, ahead of the bytes that survived it.
    pub fn read(&mut self) -> nb::Result<u8, UartError> {
        if core::mem::replace(&mut self.overrun, false) {
            return Err(nb::Error::Other(UartError::Overrun));
        }
        self.bytes.pop_front().ok_or(nb::Error::WouldBlock)
    }
}

impl<const N: usize> Default for RxQueue<N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(target_arch = "avr")]
pub use self::avr::{on_rx_interrupt, on_udre_interrupt, Usart0};

#[cfg(target_arch = "avr")]
mod avr {
    use super::{RxQueue, UartError};
    use avr_device::atmega128::USART0;
    use avr_device::interrupt::{self, Mutex};
    use core::cell::RefCell;
    use embedded_hal::serial;
    use heapless::Deque;

    const BUFFER_SIZE: usize = 64;

    const U2X: u8 = 1 << 1;
    const RXCIE: u8 = 1 << 7;
    const UDRIE: u8 = 1 << 5;
    const RXEN: u8 = 1 << 4;
    const TXEN: u8 = 1 << 3;
    // 8N1
    const UCSZ_8BIT: u8 = (1 << 2) | (1 << 1);

    static TX_BUFFER: Mutex<RefCell<Deque<u8, BUFFER_SIZE>>> = Mutex::new(RefCell::new(Deque::new()));
    static RX_BUFFER: Mutex<RefCell<RxQueue<BUFFER_SIZE>>> = Mutex::new(RefCell::new(RxQueue::new()));

    pub struct Usart0 {
        _private: (),
    }

    impl Usart0 {
        /// Double-speed mode, 8N1, receive interrupt on.
        pub fn new(cpu_hz: u32, baud: u32) -> Self {
            let ubrr = (cpu_hz / (8 * baud)).saturating_sub(1) as u16;
            unsafe {
                let p = USART0::ptr();
                (*p).ubrr0h.write(|w| w.bits((ubrr >> 8) as u8));
                (*p).ubrr0l.write(|w| w.bits(ubrr as u8));
                (*p).ucsr0a.write(|w| w.bits(U2X));
                (*p).ucsr0c.write(|w| w.bits(UCSZ_8BIT));
                (*p).ucsr0b.write(|w| w.bits(RXCIE | RXEN | TXEN));
            }
            Self { _private: () }
        }
    }

    impl serial::Read<u8> for Usart0 {
        type Error = UartError;

        fn read(&mut self) -> nb::Result<u8, UartError> {
            interrupt::free(|cs| RX_BUFFER.borrow(cs).borrow_mut().read())
        }
    }

    impl serial::Write<u8> for Usart0 {
        type Error = UartError;

        fn write(&mut self, byte: u8) -> nb::Result<(), UartError> {
            interrupt::free(|cs| {
                let queued = TX_BUFFER.borrow(cs).borrow_mut().push_back(byte).is_ok();
                unsafe { (*USART0::ptr()).ucsr0b.modify(|r, w| w.bits(r.bits() | UDRIE)) };
                if queued {
                    Ok(())
                } else {
                    Err(nb::Error::WouldBlock)
                }
            })
        }

        fn flush(&mut self) -> nb::Result<(), UartError> {
            interrupt::free(|cs| {
                if TX_BUFFER.borrow(cs).borrow().is_empty() {
                    Ok(())
                } else {
                    Err(nb::Error::WouldBlock)
                }
            })
        }
    }

    /// Body of the `USART0_RX` interrupt.
    pub fn on_rx_interrupt() {
        let byte = unsafe { (*USART0::ptr()).udr0.read().bits() };
        interrupt::free(|cs| RX_BUFFER.borrow(cs).borrow_mut().push(byte));
    }

    /// Body of the `USART0_UDRE` interrupt.
    pub fn on_udre_interrupt() {
        interrupt::free(|cs| {
            if let Some(byte) = TX_BUFFER.borrow(cs).borrow_mut().pop_front() {
                unsafe { (*USART0::ptr()).udr0.write(|w| w.bits(byte)) };
            } else {
                // Buffer empty - disable TX interrupt
                unsafe { (*USART0::ptr()).ucsr0b.modify(|r, w| w.bits(r.bits() & !UDRIE)) };
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrun_is_reported_once_before_the_kept_bytes() {
        let mut rx = RxQueue::<2>::new();
        assert_eq!(rx.read(), Err(nb::Error::WouldBlock));
        rx.push(1);
        rx.push(2);
        rx.push(3);
        assert_eq!(rx.read(), Err(nb::Error::Other(UartError::Overrun)));
        assert_eq!(rx.read(), Ok(1));
        rx.push(4);
        assert_eq!([rx.read(), rx.read()], [Ok(2), Ok(4)]);
        assert_eq!(rx.read(), Err(nb::Error::WouldBlock));
    }
}
