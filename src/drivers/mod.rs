pub mod outputs;
pub mod pins;
pub mod serial_console;

pub use outputs::{OutputBank, OutputControl};
pub use pins::pin_from_name;
pub use serial_console::SerialConsole;
