//! Compare-interrupt masking.
//!
//! The action store is shared between the foreground loop and the compare
//! interrupt. The compare interrupt is the only preempting caller, so masking
//! it (rather than all interrupts) is enough to serialize access; UART and
//! overflow interrupts keep running.

use core::cell::UnsafeCell;

use crate::hal::timer::SysTimer;

/// Compare interrupt masked for the guard's lifetime.
///
/// Restores the previous mask state on drop, so guards nest and are safe to
/// take inside the compare handler itself.
pub struct CompareMask<'a, T: SysTimer> {
    timer: &'a T,
    restore: bool,
}

impl<'a, T: SysTimer> CompareMask<'a, T> {
    pub fn acquire(timer: &'a T) -> Self {
        let restore = timer.compare_irq_enabled();
        timer.disable_compare_irq();
        Self { timer, restore }
    }

    pub fn timer(&self) -> &T {
        self.timer
    }
}

impl<T: SysTimer> Drop for CompareMask<'_, T> {
    fn drop(&mut self) {
        if self.restore {
            self.timer.enable_compare_irq();
        }
    }
}

/// Data only reachable with the compare interrupt masked.
pub(crate) struct MaskedCell<V> {
    value: UnsafeCell<V>,
}

// SAFETY: single-core target; every access goes through `with`, which masks
// the only interrupt that touches the cell.
unsafe impl<V: Send> Sync for MaskedCell<V> {}

impl<V> MaskedCell<V> {
    pub(crate) const fn new(value: V) -> Self {
        Self { value: UnsafeCell::new(value) }
    }

    /// Run `f` with exclusive access. `f` must not call back into `with` on
    /// the same cell.
    pub(crate) fn with<T: SysTimer, R>(
        &self,
        timer: &T,
        f: impl FnOnce(&mut V, &CompareMask<'_, T>) -> R,
    ) -> R {
        let mask = CompareMask::acquire(timer);
        // SAFETY: the compare interrupt is masked and callers never nest
        // `with` on one cell, so this is the only live reference.
        let value = unsafe { &mut *self.value.get() };
        f(value, &mask)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::cell::Cell;

    struct FakeTimer {
        irq: Cell<bool>,
        toggles: Cell<u32>,
    }

    impl SysTimer for FakeTimer {
        const COUNTER_BITS: u32 = 32;
        fn start(&self) {}
        fn stop(&self) {}
        fn counter(&self) -> u32 {
            0
        }
        fn set_compare(&self, _value: u32) {}
        fn enable_compare_irq(&self) {
            self.irq.set(true);
            self.toggles.set(self.toggles.get() + 1);
        }
        fn disable_compare_irq(&self) {
            self.irq.set(false);
        }
        fn compare_irq_enabled(&self) -> bool {
            self.irq.get()
        }
    }

    #[test]
    fn mask_restores_enabled_irq() {
        let timer = FakeTimer { irq: Cell::new(true), toggles: Cell::new(0) };
        {
            let _mask = CompareMask::acquire(&timer);
            assert!(!timer.compare_irq_enabled());
        }
        assert!(timer.compare_irq_enabled());
    }

    #[test]
    fn nested_masks_unmask_once() {
        let timer = FakeTimer { irq: Cell::new(true), toggles: Cell::new(0) };
        {
            let _outer = CompareMask::acquire(&timer);
            {
                let _inner = CompareMask::acquire(&timer);
            }
            assert!(!timer.compare_irq_enabled());
        }
        assert!(timer.compare_irq_enabled());
        assert_eq!(timer.toggles.get(), 1);
    }

    #[test]
    fn mask_leaves_disabled_irq_disabled() {
        let timer = FakeTimer { irq: Cell::new(false), toggles: Cell::new(0) };
        drop(CompareMask::acquire(&timer));
        assert!(!timer.compare_irq_enabled());
    }

    #[test]
    fn cell_access_is_masked() {
        let timer = FakeTimer { irq: Cell::new(true), toggles: Cell::new(0) };
        let cell = MaskedCell::new(5u32);
        let seen = cell.with(&timer, |v, mask| {
            *v += 1;
            (*v, mask.timer().compare_irq_enabled())
        });
        assert_eq!(seen, (6, false));
        assert!(timer.compare_irq_enabled());
    }
}
