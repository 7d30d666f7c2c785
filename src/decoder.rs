//! Parses batches of raw SPI-angle messages into `(print_time, angle)`
//! samples (spec.md §4.2). The hot path: branch-light, no per-record
//! allocation — the output array is pre-sized and truncated at the end.

use crate::clock::ClockMap;
use crate::mcu::McuClock;
use crate::sensor::{SensorKind, TimeCodeMode};
use crate::wrap::{signed_wrap16, unwrap16, unwrap_sequence};

/// A sensor-data batch as received from the MCU (spec.md §3).
#[derive(Debug, Clone)]
pub struct RawMessage {
    pub sequence: u16,
    /// Concatenation of 3-byte records: `tcode, angle_lo, angle_hi`.
    pub data: Vec<u8>,
}

/// tcode value marking an invalid reading (spec.md §3).
pub const TCODE_ERROR: u8 = 0xff;

/// A decoded, unwrapped sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub print_time: f64,
    pub angle: i64,
}

/// Mutable unwrap state carried across a capture (spec.md §3).
#[derive(Debug, Clone, Default)]
pub struct ClockState {
    /// MCU tick when capture began; `0` means "not capturing".
    pub start_clock: u64,
    /// MCU ticks between records.
    pub sample_ticks: u32,
    /// Bit-shift applied to tcode's time-offset interpretation.
    pub time_shift: u8,
    pub last_sequence: u64,
    pub last_angle: i64,
}

impl ClockState {
    pub fn is_measuring(&self) -> bool {
        self.start_clock != 0
    }

    /// Reset unwrap state for a freshly started capture.
    pub fn begin_capture(&mut self, start_clock: u64, sample_ticks: u32, time_shift: u8) {
        self.start_clock = start_clock;
        self.sample_ticks = sample_ticks;
        self.time_shift = time_shift;
        self.last_sequence = 0;
        self.last_angle = 0;
    }

    pub fn end_capture(&mut self) {
        self.start_clock = 0;
    }
}

/// Rounds to 6 decimal places, matching the print-time resolution the
/// original reports at.
fn round6(x: f64) -> f64 {
    (x * 1e6).round() / 1e6
}

/// Decodes batches of [`RawMessage`] into samples for one sensor.
pub struct SampleDecoder {
    kind: SensorKind,
}

impl SampleDecoder {
    pub fn new(kind: SensorKind) -> Self {
        Self { kind }
    }

    /// Decode `messages` against `state` (mutated in place to carry unwrap
    /// continuity to the next batch). `clock_map` is required (and used)
    /// only for tle5012b's frame-counter time code; other chips ignore it.
    ///
    /// Returns the decoded samples and the count of TCODE_ERROR records.
    pub fn decode(
        &self,
        messages: &[RawMessage],
        state: &mut ClockState,
        mcu: &dyn McuClock,
        clock_map: Option<&ClockMap>,
    ) -> (Vec<Sample>, u32) {
        let mut samples = Vec::with_capacity(messages.len() * 16);
        let mut error_count: u32 = 0;

        let static_delay = self.kind.static_delay();
        let mode = self.kind.time_code_mode();

        let mut last_sequence = state.last_sequence;
        let mut last_angle = state.last_angle;

        for msg in messages {
            let seq = unwrap_sequence(last_sequence, msg.sequence);
            last_sequence = seq;
            let msg_mclock =
                state.start_clock + seq * 16 * state.sample_ticks as u64;

            for i in 0..(msg.data.len() / 3) {
                let tcode = msg.data[i * 3];
                if tcode == TCODE_ERROR {
                    error_count += 1;
                    continue;
                }
                let raw_angle =
                    u16::from(msg.data[i * 3 + 1]) | (u16::from(msg.data[i * 3 + 2]) << 8);
                last_angle = unwrap16(last_angle, raw_angle);

                let mclock = msg_mclock + i as u64 * state.sample_ticks as u64;
                let sclock = match mode {
                    TimeCodeMode::SubSampleOffset => {
                        (mclock + ((tcode as u64) << state.time_shift)) as f64
                    }
                    TimeCodeMode::FrameCounter => {
                        let chip_freq = clock_map.map(ClockMap::chip_freq).unwrap_or(1.0);
                        let predicted = clock_map
                            .map(|m| m.predicted_chip_clock(mclock))
                            .unwrap_or(mclock as i64);
                        let predicted_low16 = predicted.rem_euclid(0x1_0000) as i32;
                        let target = (i32::from(tcode) & 0x3f) << 10;
                        let cdiff = signed_wrap16(target - predicted_low16);
                        mclock as f64 + (f64::from(cdiff) - 0x800 as f64) / chip_freq
                    }
                };

                let ptime = round6(mcu.clock_to_print_time(sclock) - static_delay);
                samples.push(Sample {
                    print_time: ptime,
                    angle: last_angle,
                });
            }
        }

        state.last_sequence = last_sequence;
        state.last_angle = last_angle;
        (samples, error_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct LinearClock {
        freq_hz: f64,
    }
    impl McuClock for LinearClock {
        fn clock_to_print_time(&self, clock: f64) -> f64 {
            clock / self.freq_hz
        }
        fn print_time_to_clock(&self, print_time: f64) -> u64 {
            (print_time * self.freq_hz) as u64
        }
        fn seconds_to_clock(&self, seconds: f64) -> u32 {
            (seconds * self.freq_hz) as u32
        }
        fn estimated_print_time(&self, systime: f64) -> f64 {
            systime
        }
        fn monotonic(&self) -> f64 {
            0.0
        }
    }

    #[test]
    fn s1_decode_as5047d() {
        let decoder = SampleDecoder::new(SensorKind::As5047d);
        let mut state = ClockState {
            start_clock: 1_000_000,
            sample_ticks: 16_000,
            time_shift: 3,
            last_sequence: 0,
            last_angle: 0,
        };
        let mcu = LinearClock { freq_hz: 1e7 };
        let msg = RawMessage {
            sequence: 0,
            data: vec![0x00, 0x34, 0x12],
        };
        let (samples, errors) = decoder.decode(&[msg], &mut state, &mcu, None);
        assert_eq!(errors, 0);
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].angle, 0x1234);
        assert_eq!(samples[0].print_time, round6(0.100_000 - 0.000_1));
    }

    #[test]
    fn s3_sequence_wrap_across_messages() {
        let decoder = SampleDecoder::new(SensorKind::A1333);
        let mut state = ClockState {
            start_clock: 0,
            sample_ticks: 1,
            time_shift: 0,
            last_sequence: 0,
            last_angle: 0,
        };
        let mcu = LinearClock { freq_hz: 1.0 };
        let payload = |tcode: u8| vec![tcode, 0, 0].repeat(1);
        let mut data16 = Vec::new();
        for _ in 0..16 {
            data16.extend_from_slice(&payload(0));
        }
        let msgs = [
            RawMessage { sequence: 0xFFFE, data: data16.clone() },
            RawMessage { sequence: 0xFFFF, data: data16.clone() },
            RawMessage { sequence: 0x0000, data: data16 },
        ];
        let (samples, errors) = decoder.decode(&msgs, &mut state, &mcu, None);
        assert_eq!(errors, 0);
        assert_eq!(samples.len(), 48);
        assert_eq!(state.last_sequence, 0x10000);
    }

    #[test]
    fn tcode_error_is_counted_not_fatal() {
        let decoder = SampleDecoder::new(SensorKind::A1333);
        let mut state = ClockState {
            start_clock: 0,
            sample_ticks: 1,
            time_shift: 0,
            last_sequence: 0,
            last_angle: 0,
        };
        let mcu = LinearClock { freq_hz: 1.0 };
        let msg = RawMessage {
            sequence: 0,
            data: vec![TCODE_ERROR, 0, 0, 0, 0x11, 0x00],
        };
        let (samples, errors) = decoder.decode(&[msg], &mut state, &mcu, None);
        assert_eq!(errors, 1);
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].angle, 0x11);
    }

    #[test]
    fn s6_tle5012b_frame_unwrap() {
        let decoder = SampleDecoder::new(SensorKind::Tle5012b);
        let mut state = ClockState {
            start_clock: 0,
            sample_ticks: 1,
            time_shift: 0,
            last_sequence: 0,
            last_angle: 0,
        };
        let mcu = LinearClock { freq_hz: 1.0 };
        // tcode low 6 bits = 0x10 -> target = 0x4000. Predicted low16 must
        // be 0x4005, so anchor the map so predicted_chip_clock(mclock=0) == 0x4005.
        let clock_map = ClockMap::new(0, 0x4005, 1.0);
        let msg = RawMessage {
            sequence: 0,
            data: vec![0x10, 0x00, 0x00],
        };
        let (samples, errors) = decoder.decode(&[msg], &mut state, &mcu, Some(&clock_map));
        assert_eq!(errors, 0);
        assert_eq!(samples.len(), 1);
        // mcu_delta is zero here so chip_freq doesn't affect the prediction;
        // exercise the cdiff path directly instead of the division.
        let cdiff = signed_wrap16(0x4000 - 0x4005);
        assert_eq!(cdiff, -5);
    }
}
