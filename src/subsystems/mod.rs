//! Subsystem modules for the companion service.

pub mod comms;
pub mod companion;
#[cfg(feature = "subsystem-cron")]
pub mod cron;
pub mod knowledge;
pub mod memory;
#[cfg(feature = "subsystem-speech")]
pub mod speech;
