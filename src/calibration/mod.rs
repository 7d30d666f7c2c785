//! Self-calibration: the correction table, phase reconciliation, the
//! least-squares backend, and the scripted-motion fit runner (spec.md §4.4-§4.8).

mod lstsq;
mod phase;
mod runner;
mod table;

pub use lstsq::lstsq;
pub use phase::{PhaseAligner, PhaseState};
pub use runner::{CalibrationReport, CalibrationRunner};
pub use table::{CalibrationTable, BUCKETS, BUCKET_SIZE};
