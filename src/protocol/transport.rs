//! Packet framing on the serial link

use embedded_hal::serial;

use super::packet::{DataPacket, PACKET_SIZE};
use super::{ProtocolError, Result};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LinkStats {
    pub packets: u32,
    pub timeouts: u32,
    pub read_errors: u32,
}

/// Assembles fixed-size packets from a byte stream.
///
/// Packets carry no delimiter, so a stalled sender would shift every later
/// packet. A gap longer than `timeout_ms` in the middle of a packet drops
/// the partial bytes and resynchronises on the next one.
pub struct FrameReceiver {
    buffer: [u8; PACKET_SIZE],
    len: usize,
    last_byte_ms: u32,
    timeout_ms: u32,
    stats: LinkStats,
}

impl FrameReceiver {
    pub const fn new(timeout_ms: u32) -> Self {
        Self {
            buffer: [0; PACKET_SIZE],
            len: 0,
            last_byte_ms: 0,
            timeout_ms,
            stats: LinkStats {
                packets: 0,
                timeouts: 0,
                read_errors: 0,
            },
        }
    }

    /// Read whatever the port has. Returns a packet as soon as one is
    /// complete; remaining bytes stay in the port for the next call.
    pub fn poll<R: serial::Read<u8>>(&mut self, port: &mut R, now_ms: u32) -> Result<Option<DataPacket>> {
        let mut got_byte = false;
        loop {
            match port.read() {
                Ok(byte) => {
                    got_byte = true;
                    self.last_byte_ms = now_ms;
                    self.buffer[self.len] = byte;
                    self.len += 1;
                    if self.len == PACKET_SIZE {
                        self.len = 0;
                        self.stats.packets = self.stats.packets.wrapping_add(1);
                        return Ok(Some(DataPacket::parse(&self.buffer)));
                    }
                }
                Err(nb::Error::WouldBlock) => break,
                Err(nb::Error::Other(_)) => {
                    self.len = 0;
                    self.stats.read_errors = self.stats.read_errors.wrapping_add(1);
                    return Err(ProtocolError::LinkRead);
                }
            }
        }

        if !got_byte && self.len > 0 && now_ms.wrapping_sub(self.last_byte_ms) > self.timeout_ms {
            let received = core::mem::replace(&mut self.len, 0);
            self.stats.timeouts = self.stats.timeouts.wrapping_add(1);
            return Err(ProtocolError::LinkTimeout { received });
        }
        Ok(None)
    }

    /// Bytes of the packet in progress.
    pub fn pending(&self) -> usize {
        self.len
    }

    pub fn stats(&self) -> LinkStats {
        self.stats
    }
}
