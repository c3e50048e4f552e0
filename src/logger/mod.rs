//! Level-tagged text logging to the serial console
//!
//! Records are single lines, prefixed `ERR: `, `WRN: `, `INF: ` or `DBG: `,
//! which the host tooling already recognises. The logger only holds the
//! filter and counters; the writer is passed per record so the same console
//! serves command replies and log lines.

use ufmt::uWrite;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Level {
    Error = 0,
    Warn = 1,
    Info = 2,
    Debug = 3,
}

impl Level {
    pub const fn tag(self) -> &'static str {
        match self {
            Level::Error => "ERR: ",
            Level::Warn => "WRN: ",
            Level::Info => "INF: ",
            Level::Debug => "DBG: ",
        }
    }
}

pub struct Logger {
    max_level: Level,
    written: u32,
    suppressed: u32,
}

impl Logger {
    pub const fn new(max_level: Level) -> Self {
        Self {
            max_level,
            written: 0,
            suppressed: 0,
        }
    }

    pub fn set_level(&mut self, level: Level) {
        self.max_level = level;
    }

    pub fn level(&self) -> Level {
        self.max_level
    }

    pub fn enabled(&self, level: Level) -> bool {
        level <= self.max_level
    }

    /// Start a record: writes the tag and returns `true` if `level` passes
    /// the filter. Used by the `log_*!` macros.
    pub fn begin<W: uWrite + ?Sized>(&mut self, out: &mut W, level: Level) -> bool {
        if !self.enabled(level) {
            self.suppressed = self.suppressed.wrapping_add(1);
            return false;
        }
        self.written = self.written.wrapping_add(1);
        out.write_str(level.tag()).is_ok()
    }

    pub fn written(&self) -> u32 {
        self.written
    }

    pub fn suppressed(&self) -> u32 {
        self.suppressed
    }
}

impl Default for Logger {
    fn default() -> Self {
        #[cfg(feature = "debug")]
        let level = Level::Debug;
        #[cfg(not(feature = "debug"))]
        let level = Level::Info;
        Self::new(level)
    }
}

/// `log_at!(logger, out, level, "fmt", args..)` with `out: &mut impl uWrite`.
#[macro_export]
macro_rules! log_at {
    ($logger:expr, $out:expr, $level:expr, $($arg:tt)+) => {{
        let out = &mut *$out;
        if $logger.begin(&mut *out, $level) {
            let _ = ufmt::uwriteln!(out, $($arg)+);
        }
    }};
}

#[macro_export]
macro_rules! log_error {
    ($logger:expr, $out:expr, $($arg:tt)+) => {
        $crate::log_at!($logger, $out, $crate::logger::Level::Error, $($arg)+)
    };
}

#[macro_export]
macro_rules! log_warn {
    ($logger:expr, $out:expr, $($arg:tt)+) => {
        $crate::log_at!($logger, $out, $crate::logger::Level::Warn, $($arg)+)
    };
}

#[macro_export]
macro_rules! log_info {
    ($logger:expr, $out:expr, $($arg:tt)+) => {
        $crate::log_at!($logger, $out, $crate::logger::Level::Info, $($arg)+)
    };
}

#[macro_export]
macro_rules! log_debug {
    ($logger:expr, $out:expr, $($arg:tt)+) => {
        $crate::log_at!($logger, $out, $crate::logger::Level::Debug, $($arg)+)
    };
}
