//! Application layer: one main-loop iteration of the sync device.

use embedded_hal::serial;

use crate::config;
use crate::drivers::outputs::OutputControl;
use crate::drivers::serial_console::SerialConsole;
use crate::hal::timer::SysTimer;
use crate::logger::{Level, Logger};
use crate::protocol::transport::FrameReceiver;
use crate::protocol::CommandHandler;
use crate::rtos::scheduler::Scheduler;
use crate::{log_error, log_info, log_warn};

/// What one call to [`Application::poll`] did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PollOutcome {
    Idle,
    Handled,
    /// The host sent `RST`; the caller should reset the processor.
    ResetRequested,
}

/// Main application state and logic
pub struct Application<S> {
    console: SerialConsole<S>,
    receiver: FrameReceiver,
    handler: CommandHandler,
    logger: Logger,
}

impl<S> Application<S>
where
    S: serial::Read<u8> + serial::Write<u8>,
{
    pub fn new(serial: S) -> Self {
        Self::with_handler(serial, CommandHandler::default(), Logger::default())
    }

    pub fn with_handler(serial: S, handler: CommandHandler, logger: Logger) -> Self {
        Self {
            console: SerialConsole::new(serial),
            receiver: FrameReceiver::new(config::UART_TIMEOUT_MS),
            handler,
            logger,
        }
    }

    pub fn console(&mut self) -> &mut SerialConsole<S> {
        &mut self.console
    }

    pub fn receiver(&self) -> &FrameReceiver {
        &self.receiver
    }

    pub fn set_log_level(&mut self, level: Level) {
        self.logger.set_level(level);
    }

    pub fn banner(&mut self) {
        log_info!(self.logger, &mut self.console, "microsync v{} ready", config::VERSION);
    }

    /// Catch up on missed deadlines, then receive and run at most one
    /// command. `now_ms` is a free-running millisecond count used for link
    /// timeouts only.
    pub fn poll<T, O, const N: usize>(&mut self, sched: &Scheduler<T, O, N>, now_ms: u32) -> PollOutcome
    where
        T: SysTimer,
        O: OutputControl,
    {
        if sched.catch_up() {
            log_warn!(
                self.logger,
                &mut self.console,
                "missed event deadline, caught up at {} us",
                sched.now_micros()
            );
        }

        let packet = match self.receiver.poll(&mut self.console, now_ms) {
            Ok(Some(packet)) => packet,
            Ok(None) => return PollOutcome::Idle,
            Err(e) => {
                log_warn!(self.logger, &mut self.console, "{}", e);
                return PollOutcome::Idle;
            }
        };

        if let Err(e) = self.handler.handle(&packet, sched, &mut self.console) {
            log_error!(self.logger, &mut self.console, "{}", e);
        }
        if self.handler.take_reset_request() {
            return PollOutcome::ResetRequested;
        }
        PollOutcome::Handled
    }
}
