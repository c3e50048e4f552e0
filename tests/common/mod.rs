//! Host-side test bench: a simulated system timer and a sink that records
//! every fired action with the tick it fired at.
#![allow(dead_code)]

use std::cell::Cell;
use std::convert::Infallible;
use std::rc::Rc;

use microsync_firmware::drivers::OutputControl;
use microsync_firmware::hal::timer::SysTimer;
use microsync_firmware::protocol::Reply;
use microsync_firmware::rtos::{ActionSink, PinId};
use microsync_firmware::{Action, Scheduler, SchedulerConfig, TickRate};

pub struct SimTimer {
    pub now: Rc<Cell<u32>>,
    pub compare: Cell<u32>,
    irq: Cell<bool>,
    pub running: Cell<bool>,
}

impl SysTimer for SimTimer {
    const COUNTER_BITS: u32 = 32;

    fn start(&self) {
        self.now.set(0);
        self.running.set(true);
    }

    fn stop(&self) {
        self.running.set(false);
    }

    fn counter(&self) -> u32 {
        self.now.get()
    }

    fn set_compare(&self, value: u32) {
        self.compare.set(value);
    }

    fn enable_compare_irq(&self) {
        self.irq.set(true);
    }

    fn disable_compare_irq(&self) {
        self.irq.set(false);
    }

    fn compare_irq_enabled(&self) -> bool {
        self.irq.get()
    }
}

/// Stand-in for the output bank.
pub struct Recorder {
    now: Rc<Cell<u32>>,
    pub fired: Vec<(u64, Action)>,
    pub resets: u32,
    pub lasers: u8,
}

impl Recorder {
    fn record(&mut self, action: Action) {
        self.fired.push((self.now.get() as u64, action));
    }
}

impl ActionSink for Recorder {
    fn set_level(&mut self, pin: PinId, level: bool) {
        self.record(Action::SetPin { pin, level });
    }

    fn toggle(&mut self, pin: PinId) {
        self.record(Action::TogglePin { pin });
    }

    fn enable(&mut self, pin: PinId) {
        self.record(Action::EnablePin { pin });
    }

    fn disable(&mut self, pin: PinId) {
        self.record(Action::DisablePin { pin });
    }

    fn start_burst(&mut self, period: u32) {
        self.record(Action::StartBurst { period });
    }

    fn stop_burst(&mut self) {
        self.record(Action::StopBurst);
    }

    fn open_shutters(&mut self, mask: u8) {
        self.record(Action::OpenShutters { mask });
    }

    fn close_shutters(&mut self, mask: u8) {
        self.record(Action::CloseShutters { mask });
    }
}

impl OutputControl for Recorder {
    fn reset(&mut self) {
        self.resets += 1;
    }

    fn select_lasers(&mut self, mask: u8) {
        self.lasers = mask;
    }

    fn selected_lasers(&self) -> u8 {
        self.lasers
    }
}

pub type SimScheduler<const N: usize> = Scheduler<SimTimer, Recorder, N>;

pub struct Bench<const N: usize> {
    pub sched: SimScheduler<N>,
    now: Rc<Cell<u32>>,
}

impl<const N: usize> Bench<N> {
    pub fn new(rate: TickRate, config: SchedulerConfig) -> Self {
        let now = Rc::new(Cell::new(0));
        let timer = SimTimer {
            now: now.clone(),
            compare: Cell::new(0),
            irq: Cell::new(false),
            running: Cell::new(false),
        };
        let sink = Recorder { now: now.clone(), fired: Vec::new(), resets: 0, lasers: 0b1111 };
        Self { sched: Scheduler::new(timer, sink, rate, config), now }
    }

    /// One tick per microsecond, 2/100/20 tick tolerances.
    pub fn ticks() -> Self {
        Self::new(
            TickRate::new(1, 1),
            SchedulerConfig { tolerance: 2, missed_tolerance: 100, min_interval: 20 },
        )
    }

    pub fn timer(&self) -> &SimTimer {
        self.sched.clock().timer()
    }

    /// Move the counter without delivering any interrupt.
    pub fn set_counter(&self, ticks: u32) {
        self.now.set(ticks);
    }

    /// Run the counter forward to `target`, delivering a compare interrupt
    /// each time it crosses the armed compare value.
    pub fn advance_to(&self, target: u32) {
        loop {
            let now = self.now.get();
            let compare = self.timer().compare.get();
            if !self.timer().running.get()
                || !self.timer().compare_irq_enabled()
                || compare <= now
                || compare > target
            {
                break;
            }
            self.now.set(compare);
            self.sched.on_compare();
        }
        self.now.set(target);
    }

    pub fn fired(&self) -> Vec<(u64, Action)> {
        self.sched.with_outputs(|r| r.fired.clone()).unwrap()
    }

    pub fn outputs<R>(&self, f: impl FnOnce(&mut Recorder) -> R) -> R {
        self.sched.with_outputs(f).unwrap()
    }
}

/// Reply sink capturing text and binary output separately.
#[derive(Default)]
pub struct ReplyBuf {
    pub text: String,
    pub raw: Vec<u8>,
}

impl ufmt::uWrite for ReplyBuf {
    type Error = Infallible;

    fn write_str(&mut self, s: &str) -> Result<(), Infallible> {
        self.text.push_str(s);
        Ok(())
    }
}

impl Reply for ReplyBuf {
    fn write_raw(&mut self, bytes: &[u8]) -> Result<(), Infallible> {
        self.raw.extend_from_slice(bytes);
        Ok(())
    }
}
