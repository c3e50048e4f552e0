//! Firmware for the microsync instrument synchronizer.
//!
//! The host streams timed commands over a serial link; the device turns them
//! into pin, shutter and burst actions and fires each one from the system
//! timer's compare interrupt at its due time.
#![cfg_attr(not(test), no_std)]

pub mod acquisition;
pub mod application;
pub mod config;
pub mod drivers;
pub mod hal;
pub mod logger;
pub mod props;
pub mod protocol;
pub mod rtos;

pub use application::{Application, PollOutcome};
pub use rtos::{Action, ScheduledAction, Scheduler, SchedulerConfig, SchedulerError, TickRate};
