use embedded_hal::serial;
use ufmt::uWrite;

/// Text and binary output over any `embedded-hal` serial port.
///
/// Writes block until the port takes each byte. Reads are passed through
/// untouched, so the same port can feed a `FrameReceiver`.
pub struct SerialConsole<S> {
    serial: S,
}

impl<S> SerialConsole<S> {
    pub const fn new(serial: S) -> Self {
        Self { serial }
    }

    pub fn inner_mut(&mut self) -> &mut S {
        &mut self.serial
    }

    pub fn release(self) -> S {
        self.serial
    }
}

impl<S: serial::Write<u8>> SerialConsole<S> {
    pub fn write_byte(&mut self, byte: u8) -> Result<(), S::Error> {
        nb::block!(self.serial.write(byte))
    }

    /// Raw binary payload, e.g. schedule records.
    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), S::Error> {
        bytes.iter().try_for_each(|&b| self.write_byte(b))
    }

    pub fn flush(&mut self) -> Result<(), S::Error> {
        nb::block!(self.serial.flush())
    }
}

impl<S: serial::Write<u8>> uWrite for SerialConsole<S> {
    type Error = S::Error;

    fn write_str(&mut self, s: &str) -> Result<(), Self::Error> {
        self.write_bytes(s.as_bytes())
    }
}

impl<S: serial::Read<u8>> serial::Read<u8> for SerialConsole<S> {
    type Error = S::Error;

    fn read(&mut self) -> nb::Result<u8, Self::Error> {
        self.serial.read()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_hal::serial::Read;
    use embedded_hal_mock::serial::{Mock, Transaction};

    #[test]
    fn formats_through_ufmt() {
        let port = Mock::new(&[Transaction::write_many(b"N=42\n")]);
        let mut console = SerialConsole::new(port);
        ufmt::uwriteln!(console, "N={}", 42u32).unwrap();
        console.release().done();
    }

    #[test]
    fn raw_bytes_then_flush() {
        let port = Mock::new(&[Transaction::write_many([0u8, 1, 0xFF]), Transaction::flush()]);
        let mut console = SerialConsole::new(port);
        console.write_bytes(&[0, 1, 0xFF]).unwrap();
        console.flush().unwrap();
        console.release().done();
    }

    #[test]
    fn reads_pass_through() {
        let port = Mock::new(&[Transaction::read(b'G')]);
        let mut console = SerialConsole::new(port);
        assert!(matches!(console.read(), Ok(b'G')));
        console.release().done();
    }
}
