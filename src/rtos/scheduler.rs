//! Event scheduler: inserts actions, drains due ones from the compare
//! interrupt, and keeps the compare register pointed at the next due time.
#![allow(clippy::new_without_default)]

use core::cell::UnsafeCell;

use heapless::Vec;

use super::action::{ActionSink, ScheduledAction};
use super::clock::{counter_mask, LogicalClock, TickRate};
use super::critical::MaskedCell;
use super::queue::ActionQueue;
use crate::hal::timer::SysTimer;

/// Timing tolerances, in ticks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SchedulerConfig {
    /// Actions due within this many ticks are fired immediately.
    pub tolerance: u64,
    /// Head of the queue later than this is a starved compare interrupt.
    pub missed_tolerance: u64,
    /// Repeat intervals below this make an action one-shot.
    pub min_interval: u64,
}

impl SchedulerConfig {
    pub const fn from_micros(
        rate: TickRate,
        tolerance_us: u64,
        missed_tolerance_us: u64,
        min_interval_us: u64,
    ) -> Self {
        Self {
            tolerance: rate.micros_to_ticks(tolerance_us),
            missed_tolerance: rate.micros_to_ticks(missed_tolerance_us),
            min_interval: rate.micros_to_ticks(min_interval_us),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SchedulerStats {
    /// Actions fired
    pub fired: u32,
    /// Actions rejected or lost because the store was full
    pub dropped: u32,
    /// Foreground catch-up drains after a starved compare interrupt
    pub catch_ups: u32,
    /// Repetitions skipped because they were already stale
    pub skipped: u32,
    /// Deepest the store has been
    pub high_water: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SchedulerError {
    /// The store is at capacity; the action was dropped.
    QueueFull { capacity: usize },
    /// A relative due time does not fit in 64 bits once added to now.
    DueTimeOverflow,
}

impl ufmt::uDisplay for SchedulerError {
    fn fmt<W>(&self, f: &mut ufmt::Formatter<'_, W>) -> core::result::Result<(), W::Error>
    where
        W: ufmt::uWrite + ?Sized,
    {
        match self {
            SchedulerError::QueueFull { capacity } => {
                ufmt::uwrite!(f, "event table is full ({} events)", *capacity)
            }
            SchedulerError::DueTimeOverflow => f.write_str("event timestamp overflow"),
        }
    }
}

pub type Result<T> = core::result::Result<T, SchedulerError>;

struct Shared<const N: usize> {
    queue: ActionQueue<N>,
    /// A drain owns the outputs and the compare register until it clears this.
    draining: bool,
    stats: SchedulerStats,
}

enum Step {
    Idle,
    Retry,
    Fire(ScheduledAction),
}

/// The scheduling core.
///
/// Shared by reference between the foreground loop and the timer interrupts;
/// every store access happens with the compare interrupt masked. Callbacks
/// run unmasked, owned by whichever drain is active. A second drain that
/// starts meanwhile (compare interrupt, or `schedule` from inside a
/// callback) returns immediately and leaves the work to the running one.
pub struct Scheduler<T: SysTimer, O: ActionSink, const N: usize> {
    clock: LogicalClock<T>,
    config: SchedulerConfig,
    shared: MaskedCell<Shared<N>>,
    outputs: UnsafeCell<O>,
}

// SAFETY: single-core target. `shared` is only touched with the compare
// interrupt masked and `outputs` only by the holder of the `draining` claim.
unsafe impl<T: SysTimer + Sync, O: ActionSink + Send, const N: usize> Sync for Scheduler<T, O, N> {}

impl<T: SysTimer, O: ActionSink, const N: usize> Scheduler<T, O, N> {
    pub const fn new(timer: T, outputs: O, rate: TickRate, config: SchedulerConfig) -> Self {
        Self {
            clock: LogicalClock::new(timer, rate),
            config,
            shared: MaskedCell::new(Shared {
                queue: ActionQueue::new(),
                draining: false,
                stats: SchedulerStats {
                    fired: 0,
                    dropped: 0,
                    catch_ups: 0,
                    skipped: 0,
                    high_water: 0,
                },
            }),
            outputs: UnsafeCell::new(outputs),
        }
    }

    pub fn clock(&self) -> &LogicalClock<T> {
        &self.clock
    }

    pub fn config(&self) -> SchedulerConfig {
        self.config
    }

    pub fn capacity(&self) -> usize {
        N
    }

    pub fn now_ticks(&self) -> u64 {
        self.clock.now_ticks()
    }

    pub fn now_micros(&self) -> u64 {
        self.clock.now_micros()
    }

    /// Start the clock, then fire whatever is already due and arm for the rest.
    pub fn start(&self) {
        if self.clock.is_running() {
            return;
        }
        self.clock.start();
        self.timer().enable_compare_irq();
        self.drain();
    }

    /// Stop the clock. Pending actions stay in the store.
    pub fn stop(&self) {
        self.timer().disable_compare_irq();
        self.clock.stop();
    }

    /// Counter overflow interrupt entry point.
    pub fn on_overflow(&self) {
        self.clock.on_overflow();
    }

    /// Compare match interrupt entry point.
    pub fn on_compare(&self) {
        self.drain();
    }

    /// Insert an action. With `relative`, `action.due` is an offset from now
    /// (from zero while the clock is stopped).
    pub fn schedule(&self, action: ScheduledAction, relative: bool) -> Result<()> {
        self.schedule_all(core::slice::from_ref(&action), relative)
    }

    /// Insert a group of actions all-or-nothing: if the store cannot take
    /// every one of them, or any due time overflows, none is inserted.
    /// Relative offsets share a single reading of the clock.
    pub fn schedule_all(&self, batch: &[ScheduledAction], relative: bool) -> Result<()> {
        let head = self.shared.with(self.timer(), |shared, _mask| {
            if N - shared.queue.len() < batch.len() {
                let rejected = u32::try_from(batch.len()).unwrap_or(u32::MAX);
                shared.stats.dropped = shared.stats.dropped.saturating_add(rejected);
                return Err(SchedulerError::QueueFull { capacity: N });
            }
            let base = if relative { self.clock.now_ticks() } else { 0 };
            if batch.iter().any(|a| a.due.checked_add(base).is_none()) {
                return Err(SchedulerError::DueTimeOverflow);
            }
            for &action in batch {
                let action = ScheduledAction { due: action.due + base, ..action };
                if shared.queue.push(action).is_err() {
                    shared.stats.dropped = shared.stats.dropped.saturating_add(1);
                    return Err(SchedulerError::QueueFull { capacity: N });
                }
            }
            shared.stats.high_water = shared.stats.high_water.max(shared.queue.len());
            let head = shared.queue.next_due();
            if !shared.draining {
                if let Some(due) = head {
                    self.arm(due);
                }
            }
            Ok(head)
        })?;

        // The compare register only matches going forward; anything already
        // due would otherwise wait a full counter period.
        if let Some(due) = head {
            if self.is_due(due, self.clock.now_ticks()) {
                self.drain();
            }
        }
        Ok(())
    }

    /// Fire every due action, in due order, then arm for the next one.
    pub fn drain(&self) {
        if !self.clock.is_running() {
            return;
        }
        let claimed = self.shared.with(self.timer(), |shared, _mask| {
            if shared.draining {
                false
            } else {
                shared.draining = true;
                true
            }
        });
        if !claimed {
            return;
        }

        loop {
            let step = self.shared.with(self.timer(), |shared, _mask| {
                let Some(head) = shared.queue.peek() else {
                    shared.draining = false;
                    return Step::Idle;
                };
                let due = head.due;
                if self.is_due(due, self.clock.now_ticks()) {
                    if let Some(fired) = shared.queue.pop() {
                        return Step::Fire(fired);
                    }
                }
                self.arm(due);
                // Time may have reached `due` while arming.
                if self.clock.now_ticks() >= due {
                    return Step::Retry;
                }
                shared.draining = false;
                Step::Idle
            });

            match step {
                Step::Idle => return,
                Step::Retry => continue,
                Step::Fire(fired) => {
                    // SAFETY: the `draining` claim gives this call exclusive
                    // use of the outputs until it is released above.
                    let outputs = unsafe { &mut *self.outputs.get() };
                    fired.action.apply(outputs);
                    self.reschedule(fired);
                }
            }
        }
    }

    /// Repeat policy, applied after `fired` ran.
    fn reschedule(&self, fired: ScheduledAction) {
        let now = self.clock.now_ticks();
        let config = self.config;
        self.shared.with(self.timer(), |shared, _mask| {
            shared.stats.fired = shared.stats.fired.wrapping_add(1);
            let mut next = fired;
            if !next.advance(config.min_interval) {
                return;
            }
            // Stale repetitions are skipped whole, keeping the phase and
            // spending the repeat count they would have used.
            while next.due.saturating_add(config.missed_tolerance) < now {
                shared.stats.skipped = shared.stats.skipped.wrapping_add(1);
                if !next.advance(config.min_interval) {
                    return;
                }
            }
            if shared.queue.push(next).is_err() {
                shared.stats.dropped = shared.stats.dropped.saturating_add(1);
            }
        });
    }

    /// True when the head of the queue is later than the missed-deadline
    /// tolerance, i.e. the compare interrupt did not get to run.
    pub fn is_overdue(&self) -> bool {
        if !self.clock.is_running() {
            return false;
        }
        let head = self.shared.with(self.timer(), |shared, _mask| shared.queue.next_due());
        match head {
            Some(due) => self.clock.now_ticks() > due.saturating_add(self.config.missed_tolerance),
            None => false,
        }
    }

    /// Foreground recovery: drain if the compare interrupt fell behind.
    /// Returns whether a catch-up drain ran.
    pub fn catch_up(&self) -> bool {
        if !self.is_overdue() {
            return false;
        }
        self.shared.with(self.timer(), |shared, _mask| {
            shared.stats.catch_ups = shared.stats.catch_ups.wrapping_add(1);
        });
        self.drain();
        true
    }

    /// Drop every pending action.
    pub fn clear(&self) {
        self.shared.with(self.timer(), |shared, _mask| shared.queue.clear());
    }

    pub fn pending_count(&self) -> usize {
        self.shared.with(self.timer(), |shared, _mask| shared.queue.len())
    }

    /// Snapshot of the pending schedule, earliest first.
    pub fn peek_all(&self) -> impl Iterator<Item = ScheduledAction> {
        let snapshot: Vec<ScheduledAction, N> =
            self.shared.with(self.timer(), |shared, _mask| shared.queue.snapshot());
        snapshot.into_iter()
    }

    pub fn stats(&self) -> SchedulerStats {
        self.shared.with(self.timer(), |shared, _mask| shared.stats)
    }

    /// Direct access to the outputs outside of a drain, e.g. to reset them on
    /// a stop command. Returns `None` if a drain currently owns them.
    pub fn with_outputs<R>(&self, f: impl FnOnce(&mut O) -> R) -> Option<R> {
        let claimed = self.shared.with(self.timer(), |shared, _mask| {
            !core::mem::replace(&mut shared.draining, true)
        });
        if !claimed {
            return None;
        }
        // SAFETY: holding the `draining` claim, same as a drain.
        let result = f(unsafe { &mut *self.outputs.get() });
        let head = self.shared.with(self.timer(), |shared, _mask| {
            shared.draining = false;
            shared.queue.next_due()
        });
        // A compare match while we held the claim was ignored.
        if let Some(due) = head {
            self.arm(due);
            if self.is_due(due, self.clock.now_ticks()) {
                self.drain();
            }
        }
        Some(result)
    }

    fn timer(&self) -> &T {
        self.clock.timer()
    }

    fn is_due(&self, due: u64, now: u64) -> bool {
        due <= now.saturating_add(self.config.tolerance)
    }

    fn arm(&self, due: u64) {
        self.timer().set_compare((due & counter_mask::<T>()) as u32);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rtos::action::{Action, PinId};
    use core::cell::Cell;
    use std::vec::Vec as StdVec;

    struct SimTimer {
        now: Cell<u32>,
        compare: Cell<u32>,
        irq: Cell<bool>,
    }

    impl SysTimer for SimTimer {
        const COUNTER_BITS: u32 = 32;
        fn start(&self) {
            self.now.set(0);
        }
        fn stop(&self) {}
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

    #[derive(Default)]
    struct Log {
        toggled: StdVec<PinId>,
    }

    impl ActionSink for Log {
        fn set_level(&mut self, _pin: PinId, _level: bool) {}
        fn toggle(&mut self, pin: PinId) {
            self.toggled.push(pin);
        }
        fn enable(&mut self, _pin: PinId) {}
        fn disable(&mut self, _pin: PinId) {}
        fn start_burst(&mut self, _period: u32) {}
        fn stop_burst(&mut self) {}
        fn open_shutters(&mut self, _mask: u8) {}
        fn close_shutters(&mut self, _mask: u8) {}
    }

    const CONFIG: SchedulerConfig = SchedulerConfig { tolerance: 2, missed_tolerance: 100, min_interval: 20 };

    fn scheduler<const N: usize>() -> Scheduler<SimTimer, Log, N> {
        let timer = SimTimer { now: Cell::new(0), compare: Cell::new(0), irq: Cell::new(false) };
        Scheduler::new(timer, Log::default(), TickRate::new(1, 1), CONFIG)
    }

    fn toggled<const N: usize>(s: &Scheduler<SimTimer, Log, N>) -> StdVec<PinId> {
        s.with_outputs(|log| log.toggled.clone()).unwrap()
    }

    fn toggle(pin: PinId, due: u64) -> ScheduledAction {
        ScheduledAction::once(Action::TogglePin { pin }, due)
    }

    #[test]
    fn insert_arms_compare_to_earliest() {
        let s = scheduler::<8>();
        s.start();
        s.schedule(toggle(1, 500), false).unwrap();
        assert_eq!(s.timer().compare.get(), 500);
        s.schedule(toggle(2, 300), false).unwrap();
        assert_eq!(s.timer().compare.get(), 300);
        s.schedule(toggle(3, 900), false).unwrap();
        assert_eq!(s.timer().compare.get(), 300);
        assert!(s.timer().compare_irq_enabled());
    }

    #[test]
    fn relative_due_is_anchored_to_now() {
        let s = scheduler::<8>();
        s.start();
        s.timer().now.set(1_000);
        s.schedule(toggle(1, 250), true).unwrap();
        assert_eq!(s.peek_all().next().unwrap().due, 1_250);
    }

    #[test]
    fn relative_before_start_is_anchored_at_zero() {
        let s = scheduler::<8>();
        s.schedule(toggle(1, 250), true).unwrap();
        assert_eq!(s.peek_all().next().unwrap().due, 250);
        assert_eq!(s.now_ticks(), 0);
    }

    #[test]
    fn relative_overflow_is_rejected() {
        let s = scheduler::<8>();
        s.start();
        s.timer().now.set(10);
        assert_eq!(s.schedule(toggle(1, u64::MAX - 5), true), Err(SchedulerError::DueTimeOverflow));
        assert_eq!(s.pending_count(), 0);
    }

    #[test]
    fn due_now_fires_inside_schedule() {
        let s = scheduler::<8>();
        s.start();
        s.timer().now.set(40);
        s.schedule(toggle(4, 41), false).unwrap();
        assert_eq!(toggled(&s), [4]);
        assert_eq!(s.pending_count(), 0);
    }

    #[test]
    fn drain_is_noop_while_stopped() {
        let s = scheduler::<8>();
        s.schedule(toggle(1, 0), false).unwrap();
        s.drain();
        assert_eq!(s.pending_count(), 1);
        s.start();
        assert_eq!(toggled(&s), [1]);
    }

    #[test]
    fn stale_repetitions_are_skipped() {
        let s = scheduler::<8>();
        s.start();
        s.schedule(ScheduledAction::repeating(Action::TogglePin { pin: 1 }, 0, 20, 100), false)
            .unwrap();
        assert_eq!(toggled(&s).len(), 1);
        // Compare interrupt starved for about ten periods
        s.timer().now.set(1_050);
        assert!(s.is_overdue());
        assert!(s.catch_up());
        // 100 fires late, 200..=900 are stale, 1000 is within tolerance
        assert_eq!(toggled(&s).len(), 3);
        let next = s.peek_all().next().unwrap();
        assert_eq!(next.due, 1_100);
        assert_eq!(next.remaining, 9);
        let stats = s.stats();
        assert_eq!(stats.skipped, 8);
        assert_eq!(stats.catch_ups, 1);
        assert_eq!(stats.fired, 3);
        assert!(!s.is_overdue());
    }

    #[test]
    fn skipping_can_exhaust_a_finite_train() {
        let s = scheduler::<8>();
        s.start();
        s.schedule(ScheduledAction::repeating(Action::TogglePin { pin: 1 }, 0, 3, 100), false)
            .unwrap();
        s.timer().now.set(5_000);
        assert!(s.catch_up());
        assert_eq!(toggled(&s).len(), 2);
        assert_eq!(s.pending_count(), 0);
        assert_eq!(s.stats().skipped, 1);
    }

    #[test]
    fn with_outputs_fires_work_that_became_due() {
        let s = scheduler::<4>();
        s.start();
        s.schedule(toggle(7, 10), false).unwrap();
        s.with_outputs(|log| {
            log.toggled.push(99);
            // Compare match lands while the outputs are borrowed
            s.timer().now.set(10);
            s.on_compare();
        })
        .unwrap();
        assert_eq!(toggled(&s), [99, 7]);
    }
}
