#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! `SampleSource` and `StateSink` adapters: everything that touches a
//! clock, a filesystem, or a wire in one place, kept out of `monitor_core`.

pub mod error;
pub mod file_sink;
pub mod simulated;

#[cfg(feature = "modbus")]
pub mod modbus;

pub use error::{IoError, Result};
pub use file_sink::FileStateSink;
pub use simulated::SimulatedSampleSource;

#[cfg(feature = "modbus")]
pub use modbus::{ModbusSampleSource, ZoneRegisterMap};
