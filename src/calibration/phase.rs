//! Reconciles the sensor's unknown mechanical zero with the stepper
//! driver's known electrical phase (spec.md §4.6).

use crate::error::{AngleError, Result};
use crate::mcu::{MotionPlanner, StepperPhaseSource};

/// `mcu_pos_offset`, cleared whenever the motion system resyncs the
/// stepper's commanded position (spec.md §3).
#[derive(Debug, Clone, Default)]
pub struct PhaseState {
    mcu_pos_offset: Option<i64>,
}

/// Converts a raw unwrapped angle to microsteps and back, and seeds/holds
/// the offset between sensor-derived and MCU-commanded position.
pub struct PhaseAligner {
    state: PhaseState,
    angle_to_mcu_pos: f64,
}

impl PhaseAligner {
    /// `full_steps_per_rotation` and `microsteps` define the conversion
    /// factor `full_steps * microsteps / 2^16` from raw angle to microsteps.
    pub fn new(full_steps_per_rotation: u32, microsteps: u32) -> Self {
        let angle_to_mcu_pos =
            f64::from(full_steps_per_rotation) * f64::from(microsteps) / 65536.0;
        Self {
            state: PhaseState::default(),
            angle_to_mcu_pos,
        }
    }

    pub fn mcu_pos_offset(&self) -> Option<i64> {
        self.state.mcu_pos_offset
    }

    /// Clear the offset; the next sample will re-seed it (stepper
    /// position resync).
    pub fn reset_phase(&mut self) {
        self.state.mcu_pos_offset = None;
    }

    /// Seed (or reseed) the offset from a single sample, reconciling it
    /// against the driver's known phase modulo one electrical cycle.
    /// `table_phase_offset` is the active [`super::table::CalibrationTable`]'s
    /// `phase_offset` field (the electrical-phase rotation baked into the
    /// table at fit time).
    pub fn seed_phase(
        &mut self,
        print_time: f64,
        angle: i64,
        table_phase_offset: f64,
        driver: &dyn StepperPhaseSource,
        planner: &dyn MotionPlanner,
    ) -> Result<()> {
        let mcu_phase_offset = driver
            .mcu_phase_offset()
            .ok_or(AngleError::DriverPhaseUnknown)?;
        let phases = driver.phases();

        let mcu_pos = planner.get_past_mcu_position(print_time);
        let a_mpos = angle as f64 * self.angle_to_mcu_pos;

        let raw_diff = (a_mpos + table_phase_offset * self.angle_to_mcu_pos)
            - (mcu_pos as f64 + mcu_phase_offset as f64);
        let mut phase_diff = raw_diff.rem_euclid(phases as f64);
        if phase_diff > phases as f64 / 2.0 {
            phase_diff -= phases as f64;
        }

        self.state.mcu_pos_offset =
            Some(mcu_pos - (a_mpos - phase_diff).round() as i64);
        Ok(())
    }

    /// Seed the offset only if it is currently unset (the normal call
    /// site: the first sample after a capture or resync starts, per
    /// spec.md §4.5).
    pub fn seed_if_unset(
        &mut self,
        print_time: f64,
        angle: i64,
        table_phase_offset: f64,
        driver: &dyn StepperPhaseSource,
        planner: &dyn MotionPlanner,
    ) -> Result<()> {
        if self.state.mcu_pos_offset.is_none() {
            self.seed_phase(print_time, angle, table_phase_offset, driver, planner)?;
        }
        Ok(())
    }

    /// The motion system's commanded position for the current offset, if
    /// seeded.
    pub fn commanded_position(&self, sensor_angle: i64) -> Option<i64> {
        self.state
            .mcu_pos_offset
            .map(|offset| offset + (sensor_angle as f64 * self.angle_to_mcu_pos).round() as i64)
    }
}
