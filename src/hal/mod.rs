pub mod gpio;
pub mod timer;
pub mod uart;
#[cfg(target_arch = "avr")]
pub mod watchdog;

// Re-export commonly used types
pub use gpio::{DynPin, Port};
pub use timer::{BurstTimer, Prescaler, SysTimer};
pub use uart::{RxQueue, UartError};
#[cfg(target_arch = "avr")]
pub use timer::{Tc0Millis, Tc1SysTimer, Tc3Burst};
#[cfg(target_arch = "avr")]
pub use uart::Usart0;
#[cfg(target_arch = "avr")]
pub use watchdog::{Watchdog, WatchdogTimeout};
