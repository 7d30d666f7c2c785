//! Parses the four angle-sensor config options (spec.md §6). Takes
//! already-extracted value strings for this sensor's printer-config
//! section; the outer `.cfg` key/value scan belongs to the host's config
//! loader, not this crate.

use crate::calibration::{CalibrationTable, BUCKETS};
use crate::error::{AngleError, Result};
use crate::sensor::SensorKind;

pub const DEFAULT_SAMPLE_PERIOD: f64 = 0.000_400;

/// One angle sensor's config-file section, parsed but not yet wired to a
/// live stepper or MCU.
#[derive(Debug, Clone)]
pub struct AngleConfig {
    pub sensor_type: SensorKind,
    pub sample_period: f64,
    pub stepper: Option<String>,
    pub calibrate: Option<CalibrationTable>,
}

impl AngleConfig {
    /// `sensor_type` is required; the rest default as in spec.md §6.
    pub fn parse(sensor_type: &str, sample_period: Option<&str>, stepper: Option<&str>, calibrate: Option<&str>) -> Result<Self> {
        let sensor_type = SensorKind::from_config_name(sensor_type)?;

        let sample_period = match sample_period {
            Some(raw) => {
                let v: f64 = raw
                    .parse()
                    .map_err(|e| AngleError::Config(format!("invalid sample_period '{raw}': {e}")))?;
                if v <= 0.0 {
                    return Err(AngleError::Config(format!(
                        "sample_period must be > 0, got {v}"
                    )));
                }
                v
            }
            None => DEFAULT_SAMPLE_PERIOD,
        };

        let stepper = stepper.map(|s| s.to_string());

        let calibrate = match calibrate {
            Some(raw) => Some(parse_calibrate(raw)?),
            None => None,
        };

        Ok(Self {
            sensor_type,
            sample_period,
            stepper,
            calibrate,
        })
    }
}

/// Parse a persisted `calibrate=` comma list into a table (`reversed` and
/// `phase_offset` are not carried in this form and default to false/0.0;
/// a freshly fit table's own values are written back verbatim by the
/// caller instead of round-tripping through this parser).
fn parse_calibrate(raw: &str) -> Result<CalibrationTable> {
    let values: Vec<f64> = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<f64>()
                .map_err(|e| AngleError::Config(format!("invalid calibrate value '{s}': {e}")))
        })
        .collect::<Result<_>>()?;

    if values.len() != BUCKETS {
        return Err(AngleError::Config(format!(
            "calibrate list must have exactly {BUCKETS} entries, got {}",
            values.len()
        )));
    }

    let mut entries = [0i64; BUCKETS];
    for (i, v) in values.iter().enumerate() {
        entries[i] = v.round() as i64;
    }
    Ok(CalibrationTable::new(entries, false, 0.0))
}

/// Render a table's bucket values as the persisted `calibrate=` text: one
/// decimal place, comma-separated, a newline every 8 values (spec.md §6).
pub fn format_calibrate(table: &CalibrationTable) -> String {
    let values = table.to_config_values();
    let mut out = String::new();
    for (i, v) in values.iter().enumerate() {
        if i > 0 {
            out.push(',');
            if i % 8 == 0 {
                out.push('\n');
            } else {
                out.push(' ');
            }
        }
        out.push_str(&format!("{v:.1}"));
    }
    out
}
