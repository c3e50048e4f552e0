//! Camera and shutter sequences for the microscope acquisition modes.
//!
//! Each mode builds its whole plan first and inserts it with one
//! `Scheduler::schedule_all`, so a sequence is queued entirely or not at
//! all. Times are absolute microseconds since the clock started and are
//! converted to ticks here.

use heapless::Vec;

use crate::config::board::{CAMERA_PIN, SHUTTER_PINS};
use crate::hal::timer::SysTimer;
use crate::protocol::packet::DataPacket;
use crate::props::Properties;
use crate::rtos::action::{Action, ActionSink, PinId, ScheduledAction};
use crate::rtos::scheduler::{Result, Scheduler, SchedulerError};

/// Timing shared by every acquisition mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AcqParams {
    /// Exposure
    pub exp: u64,
    /// Camera readout, never longer than the exposure
    pub cam: u64,
    /// Shutter opening delay
    pub shutter: u64,
    /// First exposure, absolute
    pub start: u64,
}

impl AcqParams {
    /// The start is the requested time, but never earlier than the camera
    /// readout or shutter delay allow.
    pub fn new(packet: &DataPacket, props: &Properties, now_us: u64, uniform_delay_us: u64) -> Self {
        let exp = packet.arg1 as u64;
        let cam = exp.min(props.cam_readout_us as u64);
        let shutter = props.shutter_delay_us as u64;
        let start = cam.max(shutter).max(packet.ts_us as u64) + now_us + uniform_delay_us;
        Self { exp, cam, shutter, start }
    }

    pub fn frame(&self) -> u64 {
        self.exp + self.cam + self.shutter
    }
}

/// Upper bound on the actions one sequence inserts: four lasers with a
/// laser and a camera pulse each.
pub const MAX_PLAN: usize = 16;

type Plan = Vec<ScheduledAction, MAX_PLAN>;

/// Rising edge at `at_us`, falling edge `width_us` later, both repeated.
fn plan_pulse<T: SysTimer, O: ActionSink, const N: usize>(
    plan: &mut Plan,
    sched: &Scheduler<T, O, N>,
    pin: PinId,
    width_us: u64,
    at_us: u64,
    count: u32,
    interval_us: u64,
) -> Result<()> {
    plan_pair(
        plan,
        sched,
        (Action::SetPin { pin, level: true }, Action::SetPin { pin, level: false }),
        width_us,
        at_us,
        count,
        interval_us,
    )
}

/// Open the selected shutters at `at_us` and close them `width_us` later.
fn plan_shutter_pulse<T: SysTimer, O: ActionSink, const N: usize>(
    plan: &mut Plan,
    sched: &Scheduler<T, O, N>,
    lasers: u8,
    width_us: u64,
    at_us: u64,
    count: u32,
    interval_us: u64,
) -> Result<()> {
    plan_pair(
        plan,
        sched,
        (Action::OpenShutters { mask: lasers }, Action::CloseShutters { mask: lasers }),
        width_us,
        at_us,
        count,
        interval_us,
    )
}

fn plan_pair<T: SysTimer, O: ActionSink, const N: usize>(
    plan: &mut Plan,
    sched: &Scheduler<T, O, N>,
    (front, back): (Action, Action),
    width_us: u64,
    at_us: u64,
    count: u32,
    interval_us: u64,
) -> Result<()> {
    let clock = sched.clock();
    let interval = clock.micros_to_ticks(interval_us);
    let at = clock.micros_to_ticks(at_us);
    let end = clock.micros_to_ticks(at_us + width_us);
    for action in [
        ScheduledAction::repeating(front, at, count, interval),
        ScheduledAction::repeating(back, end, count, interval),
    ] {
        plan.push(action).map_err(|_| SchedulerError::QueueFull { capacity: MAX_PLAN })?;
    }
    Ok(())
}

/// Shutters stay open for the whole series while the camera runs
/// free at one frame per exposure. The first camera frame is read out while
/// the shutters open and is thrown away.
pub fn start_continuous<T: SysTimer, O: ActionSink, const N: usize>(
    sched: &Scheduler<T, O, N>,
    p: &AcqParams,
    frames: u32,
    lasers: u8,
    default_pulse_us: u64,
) -> Result<()> {
    let mut plan = Plan::new();
    let cam_pulse = (p.exp / 2).min(default_pulse_us);
    plan_pulse(&mut plan, sched, CAMERA_PIN, cam_pulse, p.start - p.cam, 1, 0)?;
    plan_shutter_pulse(
        &mut plan,
        sched,
        lasers,
        frames as u64 * p.exp + p.shutter,
        p.start - p.shutter,
        1,
        0,
    )?;
    plan_pulse(&mut plan, sched, CAMERA_PIN, cam_pulse, p.start, frames.saturating_add(1), p.exp)?;
    sched.schedule_all(&plan, false)
}

/// Shutters open only for each exposure.
pub fn start_stroboscopic<T: SysTimer, O: ActionSink, const N: usize>(
    sched: &Scheduler<T, O, N>,
    p: &AcqParams,
    frames: u32,
    interval_us: u64,
    lasers: u8,
) -> Result<()> {
    let mut plan = Plan::new();
    let period = p.frame().max(interval_us);
    plan_shutter_pulse(&mut plan, sched, lasers, p.exp, p.start, frames, period)?;
    plan_pulse(&mut plan, sched, CAMERA_PIN, p.exp, p.start + p.shutter, frames, period)?;
    sched.schedule_all(&plan, false)
}

/// Alternating excitation: one frame per selected laser, in shutter order,
/// the whole cycle repeated `frames` times. No laser selected means all four.
pub fn start_alex<T: SysTimer, O: ActionSink, const N: usize>(
    sched: &Scheduler<T, O, N>,
    p: &AcqParams,
    frames: u32,
    interval_us: u64,
    lasers: u8,
) -> Result<()> {
    let lasers = match lasers & 0x0F {
        0 => 0x0F,
        selected => selected,
    };
    let channels = lasers.count_ones() as u64;
    let period = (channels * p.frame()).max(interval_us);
    let mut plan = Plan::new();
    let mut frame_start = p.start;
    for (i, &laser) in SHUTTER_PINS.iter().enumerate() {
        if lasers & (1 << i) == 0 {
            continue;
        }
        plan_pulse(&mut plan, sched, laser, p.exp, frame_start, frames, period)?;
        plan_pulse(&mut plan, sched, CAMERA_PIN, p.exp, frame_start + p.shutter, frames, period)?;
        frame_start += p.frame();
    }
    sched.schedule_all(&plan, false)
}
