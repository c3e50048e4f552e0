//! Device properties readable and writable over `GET`/`SET`.

use crate::config;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Access {
    ReadOnly,
    ReadWrite,
    WriteOnly,
}

/// Property ids as numbered on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u32)]
pub enum PropId {
    Version = 0,
    SysTimerStatus = 1,
    SysTimerValue = 2,
    SysTimerOvfCount = 3,
    SysTimeMs = 4,
    SysTimerPrescaler = 5,
    DefaultPulseDurationUs = 6,
    WatchdogTimeoutMs = 7,
    NumEvents = 8,
    InterlockEnabled = 9,
    SelectedLasers = 10,
    OpenShutters = 11,
    CloseShutters = 12,
    ShutterDelayUs = 13,
    CamReadoutUs = 14,
}

impl PropId {
    const ALL: [PropId; 15] = [
        PropId::Version,
        PropId::SysTimerStatus,
        PropId::SysTimerValue,
        PropId::SysTimerOvfCount,
        PropId::SysTimeMs,
        PropId::SysTimerPrescaler,
        PropId::DefaultPulseDurationUs,
        PropId::WatchdogTimeoutMs,
        PropId::NumEvents,
        PropId::InterlockEnabled,
        PropId::SelectedLasers,
        PropId::OpenShutters,
        PropId::CloseShutters,
        PropId::ShutterDelayUs,
        PropId::CamReadoutUs,
    ];

    pub fn from_raw(id: u32) -> Option<Self> {
        Self::ALL.get(id as usize).copied()
    }

    pub const fn access(self) -> Access {
        match self {
            PropId::DefaultPulseDurationUs
            | PropId::InterlockEnabled
            | PropId::SelectedLasers
            | PropId::ShutterDelayUs
            | PropId::CamReadoutUs => Access::ReadWrite,
            PropId::OpenShutters | PropId::CloseShutters => Access::WriteOnly,
            _ => Access::ReadOnly,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PropertyError {
    UnknownId { id: u32 },
    ReadOnly { id: u32 },
    WriteOnly { id: u32 },
}

impl ufmt::uDisplay for PropertyError {
    fn fmt<W>(&self, f: &mut ufmt::Formatter<'_, W>) -> Result<(), W::Error>
    where
        W: ufmt::uWrite + ?Sized,
    {
        match *self {
            PropertyError::UnknownId { id } => ufmt::uwrite!(f, "unknown property with id={}", id),
            PropertyError::ReadOnly { id } => ufmt::uwrite!(f, "property {} is read-only", id),
            PropertyError::WriteOnly { id } => ufmt::uwrite!(f, "property {} is write-only", id),
        }
    }
}

/// What a property read produced.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PropValue {
    Text(&'static str),
    Number(u64),
}

/// Live state the read-only properties report, sampled by the caller.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SystemSnapshot {
    pub running: bool,
    pub counter: u32,
    pub overflows: u32,
    pub time_us: u64,
    pub pending: usize,
    pub selected_lasers: u8,
}

/// Output change requested by writing a property.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputRequest {
    SelectLasers(u8),
    OpenShutters(u8),
    CloseShutters(u8),
}

/// The writable settings.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Properties {
    pub default_pulse_us: u32,
    pub interlock_enabled: bool,
    pub shutter_delay_us: u32,
    pub cam_readout_us: u32,
}

impl Default for Properties {
    fn default() -> Self {
        Self {
            default_pulse_us: config::DEFAULT_PULSE_DURATION_US,
            interlock_enabled: false,
            shutter_delay_us: config::DEFAULT_SHUTTER_DELAY_US,
            cam_readout_us: config::DEFAULT_CAM_READOUT_US,
        }
    }
}

impl Properties {
    pub fn get(&self, raw_id: u32, sys: &SystemSnapshot) -> Result<PropValue, PropertyError> {
        let id = PropId::from_raw(raw_id).ok_or(PropertyError::UnknownId { id: raw_id })?;
        if id.access() == Access::WriteOnly {
            return Err(PropertyError::WriteOnly { id: raw_id });
        }
        let n = |v: u64| Ok(PropValue::Number(v));
        match id {
            PropId::Version => Ok(PropValue::Text(config::VERSION)),
            PropId::SysTimerStatus => Ok(PropValue::Text(if sys.running { "RUNNING" } else { "STOPPED" })),
            PropId::SysTimerValue => n(sys.counter as u64),
            PropId::SysTimerOvfCount => n(sys.overflows as u64),
            PropId::SysTimeMs => n(sys.time_us / 1_000),
            PropId::SysTimerPrescaler => n(config::SYS_TIMER_PRESCALER as u64),
            PropId::DefaultPulseDurationUs => n(self.default_pulse_us as u64),
            PropId::WatchdogTimeoutMs => n(config::WDT_TIMEOUT_MS as u64),
            PropId::NumEvents => n(sys.pending as u64),
            PropId::InterlockEnabled => n(self.interlock_enabled as u64),
            PropId::SelectedLasers => n(sys.selected_lasers as u64),
            PropId::ShutterDelayUs => n(self.shutter_delay_us as u64),
            PropId::CamReadoutUs => n(self.cam_readout_us as u64),
            PropId::OpenShutters | PropId::CloseShutters => Err(PropertyError::WriteOnly { id: raw_id }),
        }
    }

    /// Store a setting. Properties that act on the outputs come back as an
    /// `OutputRequest` for the caller to carry out.
    pub fn set(&mut self, raw_id: u32, value: u32) -> Result<Option<OutputRequest>, PropertyError> {
        let id = PropId::from_raw(raw_id).ok_or(PropertyError::UnknownId { id: raw_id })?;
        if id.access() == Access::ReadOnly {
            return Err(PropertyError::ReadOnly { id: raw_id });
        }
        let mask = (value & 0x0F) as u8;
        match id {
            PropId::DefaultPulseDurationUs => self.default_pulse_us = value,
            PropId::InterlockEnabled => self.interlock_enabled = value != 0,
            PropId::ShutterDelayUs => self.shutter_delay_us = value,
            PropId::CamReadoutUs => self.cam_readout_us = value,
            PropId::SelectedLasers => return Ok(Some(OutputRequest::SelectLasers(mask))),
            PropId::OpenShutters => return Ok(Some(OutputRequest::OpenShutters(mask))),
            PropId::CloseShutters => return Ok(Some(OutputRequest::CloseShutters(mask))),
            _ => return Err(PropertyError::ReadOnly { id: raw_id }),
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_match_the_wire_numbering() {
        for (i, id) in PropId::ALL.iter().enumerate() {
            assert_eq!(*id as u32, i as u32);
            assert_eq!(PropId::from_raw(i as u32), Some(*id));
        }
        assert_eq!(PropId::from_raw(15), None);
    }

    #[test]
    fn reads_live_and_stored_values() {
        let props = Properties::default();
        let sys = SystemSnapshot { running: true, time_us: 12_345_678, pending: 3, ..Default::default() };
        assert_eq!(props.get(0, &sys), Ok(PropValue::Text(config::VERSION)));
        assert_eq!(props.get(1, &sys), Ok(PropValue::Text("RUNNING")));
        assert_eq!(props.get(4, &sys), Ok(PropValue::Number(12_345)));
        assert_eq!(props.get(8, &sys), Ok(PropValue::Number(3)));
        assert_eq!(props.get(6, &sys), Ok(PropValue::Number(config::DEFAULT_PULSE_DURATION_US as u64)));
    }

    #[test]
    fn access_is_enforced() {
        let mut props = Properties::default();
        let sys = SystemSnapshot::default();
        assert_eq!(props.set(2, 5), Err(PropertyError::ReadOnly { id: 2 }));
        assert_eq!(props.get(11, &sys), Err(PropertyError::WriteOnly { id: 11 }));
        assert_eq!(props.get(99, &sys), Err(PropertyError::UnknownId { id: 99 }));
        assert_eq!(props.set(99, 0), Err(PropertyError::UnknownId { id: 99 }));
    }

    #[test]
    fn writes_update_settings_or_request_outputs() {
        let mut props = Properties::default();
        assert_eq!(props.set(13, 2_500), Ok(None));
        assert_eq!(props.shutter_delay_us, 2_500);
        assert_eq!(props.set(9, 1), Ok(None));
        assert!(props.interlock_enabled);
        assert_eq!(props.set(10, 0b0110), Ok(Some(OutputRequest::SelectLasers(0b0110))));
        assert_eq!(props.set(12, 0), Ok(Some(OutputRequest::CloseShutters(0))));
    }
}
