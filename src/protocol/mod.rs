//! Host command protocol: 24-byte command packets in, text lines and binary
//! schedule records out.

pub mod packet;
pub mod transport;

use embedded_hal::serial;
use ufmt::{uWrite, uwriteln};

use crate::acquisition::{self, AcqParams};
use crate::config;
use crate::drivers::outputs::OutputControl;
use crate::drivers::serial_console::SerialConsole;
use crate::hal::timer::SysTimer;
use crate::props::{OutputRequest, PropValue, Properties, PropertyError, SystemSnapshot};
use crate::rtos::action::{Action, ScheduledAction};
use crate::rtos::scheduler::{Scheduler, SchedulerError};

use self::packet::{DataPacket, Timing};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ProtocolError {
    UnknownCommand { cmd: [u8; 3] },
    UnknownPin { name: u32 },
    Schedule(SchedulerError),
    Property(PropertyError),
    /// A drain owns the outputs right now.
    OutputsBusy,
    /// The reply could not be written.
    Io,
    /// A partial packet was dropped after a gap on the link.
    LinkTimeout { received: usize },
    /// The port reported a receive error; the partial packet was dropped.
    LinkRead,
}

pub type Result<T> = core::result::Result<T, ProtocolError>;

impl From<SchedulerError> for ProtocolError {
    fn from(e: SchedulerError) -> Self {
        ProtocolError::Schedule(e)
    }
}

impl From<PropertyError> for ProtocolError {
    fn from(e: PropertyError) -> Self {
        ProtocolError::Property(e)
    }
}

/// Printable form of host-supplied bytes, up to the first NUL.
fn write_name<W: uWrite + ?Sized>(f: &mut ufmt::Formatter<'_, W>, bytes: &[u8]) -> core::result::Result<(), W::Error> {
    for &b in bytes.iter().take_while(|&&b| b != 0) {
        let c = if b.is_ascii_graphic() || b == b' ' { b } else { b'?' };
        f.write_str(core::str::from_utf8(&[c]).unwrap_or("?"))?;
    }
    Ok(())
}

impl ufmt::uDisplay for ProtocolError {
    fn fmt<W>(&self, f: &mut ufmt::Formatter<'_, W>) -> core::result::Result<(), W::Error>
    where
        W: uWrite + ?Sized,
    {
        match self {
            ProtocolError::UnknownCommand { cmd } => {
                f.write_str("unknown command '")?;
                write_name(f, cmd)?;
                f.write_str("'")
            }
            ProtocolError::UnknownPin { name } => {
                f.write_str("unknown pin '")?;
                write_name(f, &name.to_le_bytes())?;
                f.write_str("'")
            }
            ProtocolError::Schedule(e) => ufmt::uDisplay::fmt(e, f),
            ProtocolError::Property(e) => ufmt::uDisplay::fmt(e, f),
            ProtocolError::OutputsBusy => f.write_str("outputs busy"),
            ProtocolError::Io => f.write_str("serial write failed"),
            ProtocolError::LinkTimeout { received } => {
                ufmt::uwrite!(f, "packet timed out after {} bytes", *received)
            }
            ProtocolError::LinkRead => f.write_str("serial read error"),
        }
    }
}

/// Reply channel: text through `uWrite`, plus raw bytes for binary records.
pub trait Reply: uWrite {
    fn write_raw(&mut self, bytes: &[u8]) -> core::result::Result<(), Self::Error>;
}

impl<S: serial::Write<u8>> Reply for SerialConsole<S> {
    fn write_raw(&mut self, bytes: &[u8]) -> core::result::Result<(), S::Error> {
        self.write_bytes(bytes)
    }
}

fn io<E>(_: E) -> ProtocolError {
    ProtocolError::Io
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Command {
    Pin,
    Toggle,
    PositivePulse,
    NegativePulse,
    Burst,
    EnablePin,
    DisablePin,
    Go,
    Stop,
    Clear,
    Reset,
    Get,
    Set,
    Status,
    Functions,
    Queue,
    Continuous,
    Stroboscopic,
    Alex,
}

impl Command {
    const TABLE: [(&'static [u8; 3], Command); 19] = [
        (b"PIN", Command::Pin),
        (b"TGL", Command::Toggle),
        (b"PPL", Command::PositivePulse),
        (b"NPL", Command::NegativePulse),
        (b"BST", Command::Burst),
        (b"ENP", Command::EnablePin),
        (b"DSP", Command::DisablePin),
        (b"GO!", Command::Go),
        (b"STP", Command::Stop),
        (b"CLR", Command::Clear),
        (b"RST", Command::Reset),
        (b"GET", Command::Get),
        (b"SET", Command::Set),
        (b"STA", Command::Status),
        (b"FUN", Command::Functions),
        (b"QUE", Command::Queue),
        (b"CON", Command::Continuous),
        (b"STR", Command::Stroboscopic),
        (b"ALX", Command::Alex),
    ];

    /// Look up an upper-cased command name.
    pub fn from_name(name: [u8; 3]) -> Option<Self> {
        Self::TABLE.iter().find(|(n, _)| **n == name).map(|&(_, c)| c)
    }

    pub fn name(self) -> &'static str {
        for &(n, c) in Self::TABLE.iter() {
            if c == self {
                return core::str::from_utf8(n).unwrap_or("???");
            }
        }
        "???"
    }
}

/// Executes host commands against the scheduler and its outputs.
pub struct CommandHandler {
    props: Properties,
    timing: Timing,
    burst_ticks_per_us: u32,
    reset_requested: bool,
}

impl Default for CommandHandler {
    fn default() -> Self {
        Self::new(
            Timing {
                uniform_delay_us: config::UNIFORM_TIME_DELAY_US,
                min_interval_us: config::MIN_EVENT_INTERVAL_US,
            },
            config::BURST_TICKS_PER_US,
        )
    }
}

impl CommandHandler {
    pub fn new(timing: Timing, burst_ticks_per_us: u32) -> Self {
        Self {
            props: Properties::default(),
            timing,
            burst_ticks_per_us,
            reset_requested: false,
        }
    }

    pub fn props(&self) -> &Properties {
        &self.props
    }

    /// `true` once after an `RST` command.
    pub fn take_reset_request(&mut self) -> bool {
        core::mem::replace(&mut self.reset_requested, false)
    }

    pub fn handle<T, O, W, const N: usize>(
        &mut self,
        packet: &DataPacket,
        sched: &Scheduler<T, O, N>,
        out: &mut W,
    ) -> Result<()>
    where
        T: SysTimer,
        O: OutputControl,
        W: Reply + ?Sized,
    {
        let name = packet.command();
        let command = Command::from_name(name).ok_or(ProtocolError::UnknownCommand { cmd: name })?;

        match command {
            Command::Pin => {
                let level = packet.arg2 != 0;
                self.schedule(sched, packet, Action::SetPin { pin: packet.pin()?, level })
            }
            Command::Toggle => self.schedule(sched, packet, Action::TogglePin { pin: packet.pin()? }),
            Command::EnablePin => self.schedule(sched, packet, Action::EnablePin { pin: packet.pin()? }),
            Command::DisablePin => self.schedule(sched, packet, Action::DisablePin { pin: packet.pin()? }),
            Command::PositivePulse | Command::NegativePulse => {
                let pin = packet.pin()?;
                let positive = command == Command::PositivePulse;
                self.schedule_pair(
                    sched,
                    packet,
                    Action::SetPin { pin, level: positive },
                    Action::SetPin { pin, level: !positive },
                )
            }
            Command::Burst => {
                let period = packet.arg1.saturating_mul(self.burst_ticks_per_us);
                self.schedule_pair(sched, packet, Action::StartBurst { period }, Action::StopBurst)
            }
            Command::Go => {
                sched.start();
                Ok(())
            }
            Command::Stop => {
                sched.stop();
                sched.clear();
                Self::outputs(sched, |o| o.reset())
            }
            Command::Clear => {
                sched.clear();
                Self::outputs(sched, |o| o.reset())
            }
            Command::Reset => {
                Self::outputs(sched, |o| o.reset())?;
                self.reset_requested = true;
                Ok(())
            }
            Command::Get => {
                let sys = Self::snapshot(sched)?;
                match self.props.get(packet.arg1, &sys)? {
                    PropValue::Text(s) => uwriteln!(out, "{}", s).map_err(io),
                    PropValue::Number(n) => uwriteln!(out, "{}", n).map_err(io),
                }
            }
            Command::Set => match self.props.set(packet.arg1, packet.arg2)? {
                Some(OutputRequest::SelectLasers(mask)) => Self::outputs(sched, |o| o.select_lasers(mask)),
                Some(OutputRequest::OpenShutters(mask)) => Self::outputs(sched, |o| o.open_shutters(mask)),
                Some(OutputRequest::CloseShutters(mask)) => Self::outputs(sched, |o| o.close_shutters(mask)),
                None => Ok(()),
            },
            Command::Status => self.status(sched, out),
            Command::Functions => {
                for (code, name) in Action::CODES {
                    uwriteln!(out, "{} {}", code, name).map_err(io)?;
                }
                Ok(())
            }
            Command::Queue => {
                for action in sched.peek_all() {
                    out.write_raw(&action.to_record()).map_err(io)?;
                }
                Ok(())
            }
            Command::Continuous | Command::Stroboscopic | Command::Alex => {
                self.acquire(command, sched, packet)
            }
        }
    }

    /// Single action at `ts_us + uniform delay` from now.
    fn schedule<T: SysTimer, O: OutputControl, const N: usize>(
        &self,
        sched: &Scheduler<T, O, N>,
        packet: &DataPacket,
        action: Action,
    ) -> Result<()> {
        let scheduled = packet.to_action(action, sched.clock().rate(), &self.timing);
        sched.schedule(scheduled, true)?;
        Ok(())
    }

    /// Front and back edge sharing one time anchor, `arg2` us apart (or the
    /// default pulse width). Both edges go in or neither does.
    fn schedule_pair<T: SysTimer, O: OutputControl, const N: usize>(
        &self,
        sched: &Scheduler<T, O, N>,
        packet: &DataPacket,
        front: Action,
        back: Action,
    ) -> Result<()> {
        let rate = sched.clock().rate();
        let width = rate.micros_to_ticks(packet.pulse_width_us(self.props.default_pulse_us) as u64);
        let first = packet.to_action(front, rate, &self.timing);
        let second = ScheduledAction {
            action: back,
            due: first.due.checked_add(width).ok_or(SchedulerError::DueTimeOverflow)?,
            ..first
        };
        sched.schedule_all(&[first, second], true)?;
        Ok(())
    }

    fn acquire<T: SysTimer, O: OutputControl, const N: usize>(
        &self,
        command: Command,
        sched: &Scheduler<T, O, N>,
        packet: &DataPacket,
    ) -> Result<()> {
        let params = AcqParams::new(packet, &self.props, sched.now_micros(), self.timing.uniform_delay_us);
        let lasers = sched.with_outputs(|o| o.selected_lasers()).ok_or(ProtocolError::OutputsBusy)?;
        let interval = packet.interv_us as u64;
        match command {
            Command::Continuous => acquisition::start_continuous(
                sched,
                &params,
                packet.n,
                lasers,
                self.props.default_pulse_us as u64,
            )?,
            Command::Stroboscopic => {
                acquisition::start_stroboscopic(sched, &params, packet.n, interval, lasers)?
            }
            _ => acquisition::start_alex(sched, &params, packet.n, interval, lasers)?,
        }
        Ok(())
    }

    fn status<T: SysTimer, O: OutputControl, W: Reply + ?Sized, const N: usize>(
        &self,
        sched: &Scheduler<T, O, N>,
        out: &mut W,
    ) -> Result<()> {
        let stats = sched.stats();
        let state = if sched.clock().is_running() { "RUNNING" } else { "STOPPED" };
        uwriteln!(out, "SYNC DEVICE v{}", config::VERSION).map_err(io)?;
        uwriteln!(out, "-- SYSTEM STATUS --").map_err(io)?;
        uwriteln!(out, "Event queue size: {} of {}", sched.pending_count(), sched.capacity()).map_err(io)?;
        uwriteln!(out, "System counter is {}", state).map_err(io)?;
        uwriteln!(out, "System time: {} us", sched.now_micros()).map_err(io)?;
        uwriteln!(
            out,
            "Events fired: {}, dropped: {}, skipped: {}, catch-ups: {}, peak queue: {}",
            stats.fired,
            stats.dropped,
            stats.skipped,
            stats.catch_ups,
            stats.high_water
        )
        .map_err(io)
    }

    fn snapshot<T: SysTimer, O: OutputControl, const N: usize>(
        sched: &Scheduler<T, O, N>,
    ) -> Result<SystemSnapshot> {
        let clock = sched.clock();
        Ok(SystemSnapshot {
            running: clock.is_running(),
            counter: clock.raw_counter(),
            overflows: clock.overflow_count(),
            time_us: clock.now_micros(),
            pending: sched.pending_count(),
            selected_lasers: sched.with_outputs(|o| o.selected_lasers()).ok_or(ProtocolError::OutputsBusy)?,
        })
    }

    fn outputs<T: SysTimer, O: OutputControl, const N: usize>(
        sched: &Scheduler<T, O, N>,
        f: impl FnOnce(&mut O),
    ) -> Result<()> {
        sched.with_outputs(f).ok_or(ProtocolError::OutputsBusy)
    }
}
