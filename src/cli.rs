//! The `ANGLE_CALIBRATE STEPPER=<name>` command (spec.md §6).

use crate::calibration::{CalibrationReport, CalibrationRunner};
use crate::config::format_calibrate;
use crate::error::{AngleError, Result};
use crate::mcu::{CalibrationSampleSource, StepperMotion, StepperPhaseSource};

/// A single angle sensor's registered calibration command, naming the
/// stepper it reconciles against.
pub struct AngleCalibrateCommand {
    stepper_name: String,
    runner: CalibrationRunner,
}

/// What the command writes back to the config store on success, and the
/// text returned to the caller.
pub struct AngleCalibrateResult {
    pub response: String,
    pub calibrate_text: String,
}

impl AngleCalibrateCommand {
    pub fn new(stepper_name: impl Into<String>, runner: CalibrationRunner) -> Self {
        Self {
            stepper_name: stepper_name.into(),
            runner,
        }
    }

    pub fn stepper_name(&self) -> &str {
        &self.stepper_name
    }

    /// Dispatch `ANGLE_CALIBRATE STEPPER=<name>`. Rejects stepper names
    /// that don't match this command's configured sensor.
    pub fn dispatch(
        &self,
        requested_stepper: &str,
        motion: &mut dyn StepperMotion,
        driver: &dyn StepperPhaseSource,
        tap: &dyn CalibrationSampleSource,
    ) -> Result<AngleCalibrateResult> {
        if requested_stepper != self.stepper_name {
            return Err(AngleError::TmcDriverNotFound(requested_stepper.to_string()));
        }
        let report = self.runner.run(motion, driver, tap)?;
        Ok(Self::finish(report))
    }

    fn finish(report: CalibrationReport) -> AngleCalibrateResult {
        let response = report.format_report();
        let calibrate_text = format_calibrate(&report.table);
        AngleCalibrateResult {
            response,
            calibrate_text,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::Sample;

    struct NullMotion;
    impl StepperMotion for NullMotion {
        fn queue_move(&mut self, _distance: f64, _speed: f64) {}
        fn wait_moves(&mut self) {}
        fn now(&self) -> f64 {
            0.0
        }
    }
    struct NullDriver;
    impl StepperPhaseSource for NullDriver {
        fn mcu_phase_offset(&self) -> Option<i64> {
            None
        }
        fn phases(&self) -> i64 {
            400
        }
    }
    struct EmptyTap;
    impl CalibrationSampleSource for EmptyTap {
        fn samples_between(&self, _start: f64, _end: f64) -> Vec<Sample> {
            Vec::new()
        }
    }

    #[test]
    fn rejects_mismatched_stepper_name() {
        let cmd = AngleCalibrateCommand::new("extruder", CalibrationRunner::new(200, 40.0));
        let mut motion = NullMotion;
        let err = cmd
            .dispatch("wrong_stepper", &mut motion, &NullDriver, &EmptyTap)
            .unwrap_err();
        assert!(matches!(err, AngleError::TmcDriverNotFound(_)));
    }

    #[test]
    fn propagates_fatal_errors_from_the_runner() {
        let cmd = AngleCalibrateCommand::new("stepper_x", CalibrationRunner::new(200, 40.0));
        let mut motion = NullMotion;
        let err = cmd
            .dispatch("stepper_x", &mut motion, &NullDriver, &EmptyTap)
            .unwrap_err();
        assert!(matches!(err, AngleError::DriverPhaseUnknown));
    }
}
