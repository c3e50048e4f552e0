//! Scheduled actions and the visitor that carries them out.

/// Logical output pin id (see `drivers::pins`).
pub type PinId = u8;

/// The closed set of things the scheduler can do at a point in time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Action {
    SetPin { pin: PinId, level: bool },
    TogglePin { pin: PinId },
    EnablePin { pin: PinId },
    DisablePin { pin: PinId },
    /// Period in burst-timer ticks
    StartBurst { period: u32 },
    StopBurst,
    /// Bit `i` selects shutter `i`; an empty mask means all shutters
    OpenShutters { mask: u8 },
    CloseShutters { mask: u8 },
}

/// Receiver of fired actions. Implemented by whatever drives the outputs.
///
/// Callbacks run from interrupt context with the compare interrupt unmasked;
/// they must not block. Calling `Scheduler::schedule` from inside one is fine.
pub trait ActionSink {
    fn set_level(&mut self, pin: PinId, level: bool);
    fn toggle(&mut self, pin: PinId);
    fn enable(&mut self, pin: PinId);
    fn disable(&mut self, pin: PinId);
    fn start_burst(&mut self, period: u32);
    fn stop_burst(&mut self);
    fn open_shutters(&mut self, mask: u8);
    fn close_shutters(&mut self, mask: u8);
}

impl Action {
    pub const CODES: [(u8, &'static str); 8] = [
        (1, "TGL_PIN"),
        (2, "SET_PIN"),
        (3, "BST__ON"),
        (4, "BST_OFF"),
        (5, "EN__PIN"),
        (6, "DIS_PIN"),
        (7, "OPE_SHU"),
        (8, "CLS_SHU"),
    ];

    pub fn apply<S: ActionSink + ?Sized>(&self, sink: &mut S) {
        match *self {
            Action::SetPin { pin, level } => sink.set_level(pin, level),
            Action::TogglePin { pin } => sink.toggle(pin),
            Action::EnablePin { pin } => sink.enable(pin),
            Action::DisablePin { pin } => sink.disable(pin),
            Action::StartBurst { period } => sink.start_burst(period),
            Action::StopBurst => sink.stop_burst(),
            Action::OpenShutters { mask } => sink.open_shutters(mask),
            Action::CloseShutters { mask } => sink.close_shutters(mask),
        }
    }

    /// Stable numeric code used on the wire.
    pub const fn code(&self) -> u8 {
        match self {
            Action::TogglePin { .. } => 1,
            Action::SetPin { .. } => 2,
            Action::StartBurst { .. } => 3,
            Action::StopBurst => 4,
            Action::EnablePin { .. } => 5,
            Action::DisablePin { .. } => 6,
            Action::OpenShutters { .. } => 7,
            Action::CloseShutters { .. } => 8,
        }
    }

    pub fn name(&self) -> &'static str {
        Self::CODES[self.code() as usize - 1].1
    }

    /// The two payload words as they appear on the wire.
    pub const fn args(&self) -> (u32, u32) {
        match *self {
            Action::SetPin { pin, level } => (pin as u32, level as u32),
            Action::TogglePin { pin } | Action::EnablePin { pin } | Action::DisablePin { pin } => {
                (pin as u32, 0)
            }
            Action::StartBurst { period } => (period, 0),
            Action::StopBurst => (0, 0),
            Action::OpenShutters { mask } | Action::CloseShutters { mask } => (mask as u32, 0),
        }
    }

    pub fn from_raw(code: u8, arg1: u32, arg2: u32) -> Option<Self> {
        let pin = || PinId::try_from(arg1).ok();
        let mask = || u8::try_from(arg1).ok();
        Some(match code {
            1 => Action::TogglePin { pin: pin()? },
            2 => Action::SetPin { pin: pin()?, level: arg2 != 0 },
            3 => Action::StartBurst { period: arg1 },
            4 => Action::StopBurst,
            5 => Action::EnablePin { pin: pin()? },
            6 => Action::DisablePin { pin: pin()? },
            7 => Action::OpenShutters { mask: mask()? },
            8 => Action::CloseShutters { mask: mask()? },
            _ => return None,
        })
    }
}

/// Size of a scheduled action as reported to the host.
pub const RECORD_SIZE: usize = 28;

/// One entry in the action store.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ScheduledAction {
    pub action: Action,
    /// Absolute due time in ticks (or an offset, when scheduled relative)
    pub due: u64,
    /// 0 repeats forever, 1 fires once, N > 1 fires N times
    pub remaining: u32,
    /// Ticks between repetitions
    pub interval: u64,
}

impl ScheduledAction {
    pub const fn once(action: Action, due: u64) -> Self {
        Self { action, due, remaining: 1, interval: 0 }
    }

    pub const fn repeating(action: Action, due: u64, count: u32, interval: u64) -> Self {
        Self { action, due, remaining: count, interval }
    }

    /// Fires once and is gone.
    pub const fn is_one_shot(&self, min_interval: u64) -> bool {
        self.remaining == 1 || self.interval < min_interval
    }

    /// Apply the repeat policy after a firing. Returns `true` if the action
    /// has to go back into the store, with `due` and `remaining` advanced.
    pub fn advance(&mut self, min_interval: u64) -> bool {
        if self.is_one_shot(min_interval) {
            return false;
        }
        self.due = self.due.saturating_add(self.interval);
        if self.remaining > 1 {
            self.remaining -= 1;
        }
        true
    }

    /// Host record: code, arg1, arg2, due (u64), remaining, interval, all LE.
    pub fn to_record(&self) -> [u8; RECORD_SIZE] {
        let (arg1, arg2) = self.action.args();
        let interval = u32::try_from(self.interval).unwrap_or(u32::MAX);
        let mut buf = [0u8; RECORD_SIZE];
        buf[0..4].copy_from_slice(&(self.action.code() as u32).to_le_bytes());
        buf[4..8].copy_from_slice(&arg1.to_le_bytes());
        buf[8..12].copy_from_slice(&arg2.to_le_bytes());
        buf[12..20].copy_from_slice(&self.due.to_le_bytes());
        buf[20..24].copy_from_slice(&self.remaining.to_le_bytes());
        buf[24..28].copy_from_slice(&interval.to_le_bytes());
        buf
    }
}
