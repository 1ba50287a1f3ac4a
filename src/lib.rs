//! Temperature Array Logger
//!
//! Reads `#ch: value` lines from the thermocouple Arduino, groups them into
//! eight-channel rows, and keeps them in memory, in a backup CSV and on screen.

pub mod config_loader;
pub mod protocol;
pub mod channels;
pub mod arduino_connection;
pub mod collector;
pub mod dataset;
pub mod backup;
pub mod export;
pub mod session;
