//! Output bank: the digital lines, shutters and burst generator that
//! scheduled actions drive.

use embedded_hal::digital::v2::OutputPin;

use crate::hal::timer::BurstTimer;
use crate::rtos::action::{ActionSink, PinId};

/// Shutter mask meaning "every shutter".
const ALL_SHUTTERS: u8 = 0b1111;

/// Controls the command layer needs on top of firing actions.
pub trait OutputControl: ActionSink {
    /// All lines low and enabled, burst stopped.
    fn reset(&mut self);

    /// Enable the shutters in `mask`, disable the rest.
    fn select_lasers(&mut self, mask: u8);

    /// Mask of enabled shutters.
    fn selected_lasers(&self) -> u8;
}

/// Shadow state plus the physical pins.
///
/// A disabled pin still tracks its level (set and toggle update it) but is
/// driven low until it is enabled again.
pub struct OutputBank<P: OutputPin, B: BurstTimer, const N: usize> {
    pins: [P; N],
    levels: [bool; N],
    active: [bool; N],
    burst: B,
    shutters: [PinId; 4],
    pin_errors: u32,
}

impl<P: OutputPin, B: BurstTimer, const N: usize> OutputBank<P, B, N> {
    pub const fn new(pins: [P; N], burst: B, shutters: [PinId; 4]) -> Self {
        Self {
            pins,
            levels: [false; N],
            active: [true; N],
            burst,
            shutters,
            pin_errors: 0,
        }
    }

    /// Remembered level, regardless of whether the pin is enabled.
    pub fn level(&self, pin: PinId) -> bool {
        self.levels.get(pin as usize).copied().unwrap_or(false)
    }

    pub fn is_active(&self, pin: PinId) -> bool {
        self.active.get(pin as usize).copied().unwrap_or(false)
    }

    /// Level currently on the wire.
    pub fn driven(&self, pin: PinId) -> bool {
        self.level(pin) && self.is_active(pin)
    }

    pub fn pin_errors(&self) -> u32 {
        self.pin_errors
    }

    /// Give the pins and burst timer back.
    pub fn release(self) -> ([P; N], B) {
        (self.pins, self.burst)
    }

    fn drive(&mut self, pin: PinId) {
        let idx = pin as usize;
        let high = self.levels[idx] && self.active[idx];
        let result = if high {
            self.pins[idx].set_high()
        } else {
            self.pins[idx].set_low()
        };
        if result.is_err() {
            self.pin_errors = self.pin_errors.wrapping_add(1);
        }
    }

    fn valid(&self, pin: PinId) -> bool {
        (pin as usize) < N
    }

    fn for_shutters(&mut self, mask: u8, mut f: impl FnMut(&mut Self, PinId)) {
        let mask = if mask == 0 { ALL_SHUTTERS } else { mask };
        for i in 0..self.shutters.len() {
            if mask & (1 << i) != 0 {
                let pin = self.shutters[i];
                f(self, pin);
            }
        }
    }
}

impl<P: OutputPin, B: BurstTimer, const N: usize> ActionSink for OutputBank<P, B, N> {
    fn set_level(&mut self, pin: PinId, level: bool) {
        if self.valid(pin) {
            self.levels[pin as usize] = level;
            self.drive(pin);
        }
    }

    fn toggle(&mut self, pin: PinId) {
        let level = self.level(pin);
        self.set_level(pin, !level);
    }

    fn enable(&mut self, pin: PinId) {
        if self.valid(pin) {
            self.active[pin as usize] = true;
            self.drive(pin);
        }
    }

    fn disable(&mut self, pin: PinId) {
        if self.valid(pin) {
            self.active[pin as usize] = false;
            self.drive(pin);
        }
    }

    fn start_burst(&mut self, period: u32) {
        self.burst.start_burst(period);
    }

    fn stop_burst(&mut self) {
        self.burst.stop_burst();
    }

    fn open_shutters(&mut self, mask: u8) {
        self.for_shutters(mask, |bank, pin| bank.set_level(pin, true));
    }

    fn close_shutters(&mut self, mask: u8) {
        self.for_shutters(mask, |bank, pin| bank.set_level(pin, false));
    }
}

impl<P: OutputPin, B: BurstTimer, const N: usize> OutputControl for OutputBank<P, B, N> {
    fn reset(&mut self) {
        self.burst.stop_burst();
        for pin in 0..N {
            self.levels[pin] = false;
            self.active[pin] = true;
            self.drive(pin as PinId);
        }
    }

    fn select_lasers(&mut self, mask: u8) {
        for i in 0..self.shutters.len() {
            let pin = self.shutters[i];
            if mask & (1 << i) != 0 {
                self.enable(pin);
            } else {
                self.disable(pin);
            }
        }
    }

    fn selected_lasers(&self) -> u8 {
        self.shutters
            .iter()
            .enumerate()
            .filter(|&(_, &pin)| self.is_active(pin))
            .fold(0, |mask, (i, _)| mask | (1 << i))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_hal_mock::pin::{Mock, State, Transaction as T};

    #[derive(Default)]
    struct Burst {
        period: Option<u32>,
        stops: u32,
    }

    impl BurstTimer for Burst {
        fn start_burst(&mut self, period_ticks: u32) {
            self.period = Some(period_ticks);
        }
        fn stop_burst(&mut self) {
            self.period = None;
            self.stops += 1;
        }
    }

    fn bank(expect: [&[T]; 4]) -> (OutputBank<Mock, Burst, 4>, [Mock; 4]) {
        let pins = expect.map(|e| Mock::new(e));
        let handles = pins.clone();
        (OutputBank::new(pins, Burst::default(), [0, 1, 2, 3]), handles)
    }

    fn done(mut handles: [Mock; 4]) {
        for pin in handles.iter_mut() {
            pin.done();
        }
    }

    #[test]
    fn disabled_pin_remembers_level_but_drives_low() {
        let (mut b, handles) = bank([
            &[
                T::set(State::High),
                T::set(State::Low),
                T::set(State::Low),
                T::set(State::Low),
                T::set(State::High),
            ],
            &[],
            &[],
            &[],
        ]);
        b.set_level(0, true);
        b.disable(0);
        assert!(b.level(0));
        assert!(!b.driven(0));
        b.toggle(0);
        b.toggle(0);
        b.enable(0);
        assert!(b.driven(0));
        done(handles);
    }

    #[test]
    fn empty_shutter_mask_means_all() {
        let high = [T::set(State::High)];
        let (mut b, handles) = bank([&high, &high, &high, &high]);
        b.open_shutters(0);
        assert!((0..4).all(|pin| b.level(pin)));
        done(handles);
    }

    #[test]
    fn shutter_mask_selects_bits() {
        let (mut b, handles) = bank([&[], &[T::set(State::Low)], &[], &[T::set(State::Low)]]);
        b.close_shutters(0b1010);
        done(handles);
    }

    #[test]
    fn laser_selection_round_trips() {
        let low = [T::set(State::Low)];
        let (mut b, handles) = bank([&low, &low, &low, &low]);
        b.select_lasers(0b0101);
        assert_eq!(b.selected_lasers(), 0b0101);
        assert!(b.is_active(0) && !b.is_active(1));
        done(handles);
    }

    #[test]
    fn reset_stops_burst_and_reenables() {
        let (mut b, handles) = bank([
            &[T::set(State::Low), T::set(State::Low)],
            &[T::set(State::High), T::set(State::Low)],
            &[T::set(State::Low)],
            &[T::set(State::Low)],
        ]);
        b.disable(0);
        b.set_level(1, true);
        b.start_burst(1600);
        b.reset();
        let (_, burst) = b.release();
        assert_eq!(burst.period, None);
        assert_eq!(burst.stops, 1);
        done(handles);
    }

    #[test]
    fn out_of_range_pin_is_ignored() {
        let (mut b, handles) = bank([&[], &[], &[], &[]]);
        b.set_level(9, true);
        b.toggle(200);
        assert!(!b.level(9));
        done(handles);
    }
}
