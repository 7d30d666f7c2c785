//! Error types for the angle-sensor core.

use thiserror::Error;

/// Fatal and recoverable error conditions, per the error handling design
/// (spec.md §7). Recoverable conditions (TCODE_ERROR in a record) are
/// counted, not raised, and therefore have no variant here.
#[derive(Debug, Error)]
pub enum AngleError {
    /// A tle5012b transfer's CRC did not match after the bounded retry budget.
    #[error("spi crc check failed after {retries} retries")]
    CrcRetryExhausted { retries: u32 },

    /// The stepper driver's electrical phase offset was not known when it
    /// was required (calibration start, or phase-alignment seeding).
    #[error("stepper driver phase offset is unknown")]
    DriverPhaseUnknown,

    /// One of the 2*full_steps sample windows collected zero samples.
    #[error("calibration capture window {index} collected no samples")]
    IncompleteCapture { index: usize },

    /// Two distinct forward calibration steps produced the same mean
    /// angle — the sensor did not appear to move between them.
    #[error("sensor did not update between step {a} and step {b}")]
    SensorNotUpdating { a: usize, b: usize },

    /// The least-squares backend could not solve the system (e.g. it is
    /// rank-deficient beyond what the minimum-norm solution tolerates).
    #[error("least-squares table fit failed: {0}")]
    LstsqFailed(String),

    /// No TMC driver module matched the configured stepper at connect time.
    #[error("no TMC driver found for stepper '{0}'")]
    TmcDriverNotFound(String),

    /// Malformed or out-of-range configuration value.
    #[error("invalid config: {0}")]
    Config(String),

    /// Underlying SPI transport failure, reported by the out-of-scope
    /// transport collaborator.
    #[error("spi transport error: {0}")]
    Transport(String),
}

pub type Result<T> = std::result::Result<T, AngleError>;
