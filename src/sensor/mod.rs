//! Per-chip sensor variants: init sequence, tcode interpretation, and
//! whether the chip owns an independent clock (spec.md §4.3, §9 "dynamic
//! sensor polymorphism").

mod crc;

pub use crc::crc8_1d;

use crate::error::{AngleError, Result};
use crate::mcu::SpiTransport;

/// The three supported magnetic-angle sensor chips.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorKind {
    A1333,
    As5047d,
    Tle5012b,
}

/// `tcode` interpretation mode (spec.md §4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeCodeMode {
    /// tcode is a small MCU-clock sub-sample offset: `sclock = mclock + (tcode << time_shift)`.
    SubSampleOffset,
    /// tcode is the low 6 bits of the sensor's own frame counter.
    FrameCounter,
}

impl SensorKind {
    pub fn from_config_name(name: &str) -> Result<Self> {
        match name {
            "a1333" => Ok(Self::A1333),
            "as5047d" => Ok(Self::As5047d),
            "tle5012b" => Ok(Self::Tle5012b),
            other => Err(AngleError::Config(format!(
                "unknown sensor_type '{other}' (expected a1333, as5047d, or tle5012b)"
            ))),
        }
    }

    pub fn config_name(self) -> &'static str {
        match self {
            Self::A1333 => "a1333",
            Self::As5047d => "as5047d",
            Self::Tle5012b => "tle5012b",
        }
    }

    /// SPI mode, default clock speed (Hz) and static sensor-to-print-time
    /// delay (seconds), from the original per-chip table.
    pub fn spi_mode(self) -> u8 {
        match self {
            Self::A1333 => 3,
            Self::As5047d => 1,
            Self::Tle5012b => 1,
        }
    }

    pub fn default_spi_speed_hz(self) -> u32 {
        match self {
            Self::A1333 => 10_000_000,
            Self::As5047d => (1.0 / 0.000_000_350) as u32,
            Self::Tle5012b => 4_000_000,
        }
    }

    pub fn static_delay(self) -> f64 {
        match self {
            Self::A1333 => 0.000_001,
            Self::As5047d => 0.000_100,
            Self::Tle5012b => 0.000_042_700 * 2.5,
        }
    }

    pub fn time_code_mode(self) -> TimeCodeMode {
        match self {
            Self::A1333 | Self::As5047d => TimeCodeMode::SubSampleOffset,
            Self::Tle5012b => TimeCodeMode::FrameCounter,
        }
    }

    /// Whether this chip owns an independent clock that ClockMap must
    /// track against the MCU clock (only tle5012b, spec.md §4.1/§4.3).
    pub fn has_independent_clock(self) -> bool {
        matches!(self, Self::Tle5012b)
    }

    /// Per-chip init sequence (spec.md §4.3).
    pub fn init(self, spi: &mut dyn SpiTransport) -> Result<()> {
        match self {
            Self::A1333 => {
                spi.transfer_now(&[0x32, 0x00])?;
            }
            Self::As5047d => {
                spi.transfer_now(&[0xff, 0xfc])?; // DIAAGC
                spi.transfer_now(&[0x40, 0x01])?; // ERRFL
                spi.transfer_now(&[0xc0, 0x00])?; // NOP
            }
            Self::Tle5012b => {
                spi.transfer_now(&[0x80, 0x01, 0x00, 0x00, 0x00, 0x00])?; // STAT
            }
        }
        Ok(())
    }

    /// Selects `time_shift` so that the encodable sub-sample-offset range
    /// covers at least 2ms of polling jitter (spec.md §4.3, original
    /// `_build_config`). Only meaningful for `SubSampleOffset` chips, but
    /// computed uniformly since the config command always carries a
    /// `time_shift` field.
    pub fn select_time_shift(mcu_freq_hz: f64) -> u8 {
        const TCODE_ERROR: u32 = 0xff;
        let mut time_shift: u8 = 0;
        while (f64::from(TCODE_ERROR << time_shift)) / mcu_freq_hz < 0.002 {
            time_shift += 1;
        }
        time_shift
    }
}

/// tle5012b periodic frame-counter/temperature read command.
pub const TLE5012B_READ_CMD: [u8; 8] = [0x84, 0x42, 0, 0, 0, 0, 0, 0];

/// Maximum CRC retry attempts before a transfer is fatal (spec.md §4.3, §7).
pub const TLE5012B_CRC_RETRIES: u32 = 5;

/// Issue the tle5012b frame-counter/temperature read, verifying the CRC
/// over `request[0..2] ++ response[2..-1]` against the trailing response
/// byte, retrying up to [`TLE5012B_CRC_RETRIES`] times.
pub fn tle5012b_read_verified(spi: &mut dyn SpiTransport) -> Result<(Vec<u8>, u64)> {
    let mut last_err = None;
    for _ in 0..TLE5012B_CRC_RETRIES {
        let resp = match spi.transfer_now(&TLE5012B_READ_CMD) {
            Ok(r) => r,
            Err(e) => {
                last_err = Some(e);
                continue;
            }
        };
        if resp.response.len() < 3 {
            last_err = Some(AngleError::Transport("short tle5012b response".into()));
            continue;
        }
        let body_end = resp.response.len() - 1;
        let expected = resp.response[body_end];
        let computed = crc8_1d(&TLE5012B_READ_CMD[0..2], &resp.response[2..body_end]);
        if computed == expected {
            return Ok((resp.response, resp.clock));
        }
        last_err = Some(AngleError::Transport("tle5012b crc mismatch".into()));
    }
    let _ = last_err;
    Err(AngleError::CrcRetryExhausted {
        retries: TLE5012B_CRC_RETRIES,
    })
}

/// Decode the tle5012b temperature field (spec.md §4.3):
/// `(raw + 152) / 2.776 °C`, where `raw` is `resp[5]` treated as signed
/// against bit 0 of `resp[4]`.
pub fn tle5012b_temperature_c(resp: &[u8]) -> Option<f64> {
    if resp.len() < 6 {
        return None;
    }
    let sign_bit = resp[4] & 0x01;
    let raw = if sign_bit != 0 {
        (resp[5] as i32) - 256
    } else {
        resp[5] as i32
    };
    Some(f64::from(raw + 152) / 2.776)
}
