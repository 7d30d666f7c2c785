//! angle-core - magnetic-angle sampling and self-calibration
//!
//! Reconstructs a continuous, unwrapped rotary angle from a stream of
//! SPI-polled magnetic sensor readings (a1333, as5047d, tle5012b), applies
//! a per-sensor piecewise-linear correction table, and reconciles the
//! result against a stepper driver's known electrical phase. A scripted
//! motion sequence fits the correction table from measured step means.
//!
//! The MCU transport, motion planner, and stepper driver are modeled as
//! traits in [`mcu`]; this crate only ever calls into them.

pub mod calibration;
pub mod cli;
pub mod clock;
pub mod collector;
pub mod config;
pub mod decoder;
pub mod error;
pub mod mcu;
pub mod sensor;
mod wrap;

pub use calibration::{CalibrationReport, CalibrationRunner, CalibrationTable, PhaseAligner};
pub use cli::{AngleCalibrateCommand, AngleCalibrateResult};
pub use collector::{AngleBatch, Collector, Subscriber};
pub use config::AngleConfig;
pub use decoder::{RawMessage, Sample, SampleDecoder};
pub use error::{AngleError, Result};
pub use sensor::SensorKind;
pub use wrap::{signed_wrap16, unwrap16, unwrap_sequence};
