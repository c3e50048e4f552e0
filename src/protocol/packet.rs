//! Host command packet

use super::{ProtocolError, Result};
use crate::drivers::pins::pin_from_name;
use crate::rtos::action::{Action, PinId, ScheduledAction};
use crate::rtos::clock::TickRate;

pub const PACKET_SIZE: usize = 24;

/// One host command: six little-endian words, the first holding the three
/// letter command name and a NUL.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DataPacket {
    pub cmd: [u8; 4],
    pub arg1: u32,
    pub arg2: u32,
    /// Requested time in microseconds, relative to reception
    pub ts_us: u32,
    /// Repetitions: 0 forever, 1 once
    pub n: u32,
    pub interv_us: u32,
}

fn word(bytes: &[u8; PACKET_SIZE], at: usize) -> u32 {
    u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

impl DataPacket {
    pub fn new(cmd: &str, arg1: u32, arg2: u32, ts_us: u32, n: u32, interv_us: u32) -> Self {
        let mut name = [0u8; 4];
        for (dst, src) in name.iter_mut().take(3).zip(cmd.bytes()) {
            *dst = src;
        }
        Self { cmd: name, arg1, arg2, ts_us, n, interv_us }
    }

    pub fn parse(bytes: &[u8; PACKET_SIZE]) -> Self {
        Self {
            cmd: [bytes[0], bytes[1], bytes[2], bytes[3]],
            arg1: word(bytes, 4),
            arg2: word(bytes, 8),
            ts_us: word(bytes, 12),
            n: word(bytes, 16),
            interv_us: word(bytes, 20),
        }
    }

    pub fn to_bytes(&self) -> [u8; PACKET_SIZE] {
        let mut buf = [0u8; PACKET_SIZE];
        buf[0..4].copy_from_slice(&self.cmd);
        for (i, w) in [self.arg1, self.arg2, self.ts_us, self.n, self.interv_us]
            .iter()
            .enumerate()
        {
            let at = 4 + 4 * i;
            buf[at..at + 4].copy_from_slice(&w.to_le_bytes());
        }
        buf
    }

    /// Command name, upper-cased. Only the first three bytes are significant.
    pub fn command(&self) -> [u8; 3] {
        [
            self.cmd[0].to_ascii_uppercase(),
            self.cmd[1].to_ascii_uppercase(),
            self.cmd[2].to_ascii_uppercase(),
        ]
    }

    /// `arg1` read as a packed pin name.
    pub fn pin(&self) -> Result<PinId> {
        pin_from_name(self.arg1).ok_or(ProtocolError::UnknownPin { name: self.arg1 })
    }

    /// Pulse width, falling back to `default_us` when `arg2` is zero.
    pub fn pulse_width_us(&self, default_us: u32) -> u32 {
        if self.arg2 > 0 {
            self.arg2
        } else {
            default_us
        }
    }

    /// Turn the timing fields into a relative scheduled action:
    /// `due = ticks(ts_us) + uniform_delay`, repeated `n` times every
    /// `interv_us` unless the interval is too short to repeat.
    pub fn to_action(&self, action: Action, rate: TickRate, timing: &Timing) -> ScheduledAction {
        let due = rate.micros_to_ticks(self.ts_us as u64) + rate.micros_to_ticks(timing.uniform_delay_us);
        let remaining = if (self.interv_us as u64) < timing.min_interval_us {
            1
        } else {
            self.n
        };
        ScheduledAction::repeating(action, due, remaining, rate.micros_to_ticks(self.interv_us as u64))
    }
}

/// Host-facing timing knobs used when turning packets into actions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Timing {
    pub uniform_delay_us: u64,
    pub min_interval_us: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    const RATE: TickRate = TickRate::new(2, 1);
    const TIMING: Timing = Timing { uniform_delay_us: 500, min_interval_us: 20 };

    #[test]
    fn parses_host_layout() {
        let mut raw = [0u8; PACKET_SIZE];
        raw[0..4].copy_from_slice(b"ppl\0");
        raw[4..8].copy_from_slice(b"D13\0");
        raw[8..12].copy_from_slice(&250u32.to_le_bytes());
        raw[12..16].copy_from_slice(&1_000u32.to_le_bytes());
        raw[16..20].copy_from_slice(&3u32.to_le_bytes());
        raw[20..24].copy_from_slice(&400u32.to_le_bytes());
        let p = DataPacket::parse(&raw);
        assert_eq!(&p.command(), b"PPL");
        assert_eq!(p.pin(), Ok(13));
        assert_eq!((p.arg2, p.ts_us, p.n, p.interv_us), (250, 1_000, 3, 400));
        assert_eq!(p.to_bytes(), raw);
    }

    #[test]
    fn action_timing_from_packet() {
        let p = DataPacket::new("TGL", 0, 0, 1_000, 5, 400);
        let a = p.to_action(Action::TogglePin { pin: 2 }, RATE, &TIMING);
        assert_eq!((a.due, a.remaining, a.interval), (3_000, 5, 800));
    }

    #[test]
    fn short_interval_fires_once() {
        let p = DataPacket::new("TGL", 0, 0, 0, 0, 19);
        let a = p.to_action(Action::TogglePin { pin: 2 }, RATE, &TIMING);
        assert_eq!((a.due, a.remaining), (1_000, 1));
    }

    #[test]
    fn unknown_pin_is_reported() {
        let p = DataPacket::new("PIN", u32::from_le_bytes(*b"Q9\0\0"), 1, 0, 1, 0);
        assert!(matches!(p.pin(), Err(ProtocolError::UnknownPin { .. })));
        assert_eq!(p.pulse_width_us(100), 1);
    }
}
