//! Tracks a sensor chip's independent clock against the MCU clock with a
//! first-order frequency estimator (spec.md §4.1). Only chips with their
//! own clock (tle5012b) need this; `McuClock` (see [`crate::mcu`]) is the
//! pure MCU-tick -> print-time translation every sensor shares.

use crate::wrap::unwrap16;

/// Running linear fit from MCU ticks to a sensor chip's own free-running
/// counter.
#[derive(Debug, Clone)]
pub struct ClockMap {
    last_chip_mcu_clock: u64,
    last_chip_clock: i64,
    chip_freq: f64,
}

impl ClockMap {
    /// Seed the map from an initial (mcu_clock, chip_clock) anchor and an
    /// initial frequency guess (chip ticks per MCU tick).
    pub fn new(initial_mcu_clock: u64, initial_chip_clock: i64, initial_freq: f64) -> Self {
        Self {
            last_chip_mcu_clock: initial_mcu_clock,
            last_chip_clock: initial_chip_clock,
            chip_freq: initial_freq,
        }
    }

    /// Predict the chip's unwrapped counter value at `mcu_clock` per the
    /// current linear fit.
    pub fn predicted_chip_clock(&self, mcu_clock: u64) -> i64 {
        let mcu_delta = mcu_clock as i64 - self.last_chip_mcu_clock as i64;
        self.last_chip_clock + (mcu_delta as f64 * self.chip_freq).round() as i64
    }

    /// Feed a new (mcu_clock, raw 16-bit chip_clock) reply pair: unwrap the
    /// raw counter against the prediction, refit `chip_freq`, and advance
    /// the anchor.
    pub fn update(&mut self, mcu_clock: u64, raw_chip_clock: u16) {
        let predicted = self.predicted_chip_clock(mcu_clock);
        let new_chip_clock = unwrap16(predicted, raw_chip_clock);

        let mcu_delta = mcu_clock as i64 - self.last_chip_mcu_clock as i64;
        if mcu_delta != 0 {
            self.chip_freq = (new_chip_clock - self.last_chip_clock) as f64 / mcu_delta as f64;
        }
        self.last_chip_mcu_clock = mcu_clock;
        self.last_chip_clock = new_chip_clock;
    }

    pub fn chip_freq(&self) -> f64 {
        self.chip_freq
    }

    pub fn last_chip_clock(&self) -> i64 {
        self.last_chip_clock
    }

    pub fn last_chip_mcu_clock(&self) -> u64 {
        self.last_chip_mcu_clock
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fit_is_stable_at_the_anchor() {
        // Property 7: predicted_chip_clock(last_chip_mcu_clock) == last_chip_clock
        let mut map = ClockMap::new(1_000_000, 500, 0.4);
        map.update(1_010_000, (500 + (10_000.0 * 0.4) as i64) as u16);
        assert_eq!(map.predicted_chip_clock(map.last_chip_mcu_clock()), map.last_chip_clock());
    }

    #[test]
    fn frequency_refits_from_two_anchors() {
        let mut map = ClockMap::new(0, 0, 1.0);
        // Chip runs at exactly half MCU rate.
        map.update(1000, 500);
        assert!((map.chip_freq() - 0.5).abs() < 1e-9);
        assert_eq!(map.last_chip_clock(), 500);
    }

    #[test]
    fn update_unwraps_across_16bit_boundary() {
        let mut map = ClockMap::new(0, 0x1_0000 - 10, 1.0);
        // Predicted at mcu_clock=20 is (0x10000-10) + 20 = 0x10000+10,
        // low16 of that is 10. A raw reading of 12 should unwrap to
        // 0x10000+12, not wrap backwards.
        map.update(20, 12);
        assert_eq!(map.last_chip_clock(), 0x1_0000 + 12);
    }
}
