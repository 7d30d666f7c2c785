//! Contracts for the external collaborators this core talks to: the MCU
//! command-queue/RPC link, the SPI transport, the stepper driver's phase
//! service, and the motion planner. None of these are implemented here —
//! each is a thin trait the host wires up to its own reactor, transport
//! and planner.

use crate::error::Result;

/// Result of a single SPI exchange: the response bytes and the MCU tick
/// at which the MCU captured the reply.
#[derive(Debug, Clone)]
pub struct SpiResponse {
    pub response: Vec<u8>,
    pub clock: u64,
}

/// A single SPI transfer, either a synchronous "now" exchange or one
/// latched to a specific MCU clock.
pub trait SpiTransport {
    fn transfer_now(&mut self, data: &[u8]) -> Result<SpiResponse>;
    fn transfer_at_clock(&mut self, data: &[u8], clock: u64) -> Result<SpiResponse>;
}

/// The MCU's clock domain: ticks, print-time, and the host's wall clock.
pub trait McuClock {
    /// `clock` is a fractional MCU tick count — the tle5012b frame-counter
    /// path (spec.md §4.2 Mode B) derives a sample instant that does not
    /// land on an integer tick.
    fn clock_to_print_time(&self, clock: f64) -> f64;
    fn print_time_to_clock(&self, print_time: f64) -> u64;
    fn seconds_to_clock(&self, seconds: f64) -> u32;
    fn estimated_print_time(&self, systime: f64) -> f64;
    /// Host reactor's monotonic wall clock, seconds.
    fn monotonic(&self) -> f64;
}

/// MCU command-queue/RPC plumbing for the `spi_angle` family of commands
/// (spec.md §6). The host implements this against its own transport; the
/// core only ever calls these methods.
pub trait AngleMcuLink: McuClock {
    fn create_oid(&mut self) -> u8;
    fn config_spi_angle(&mut self, oid: u8, spi_oid: u8, sensor_type: &str);
    /// Starts (or, with `rest_ticks == 0`, stops) periodic sampling.
    fn query_spi_angle_start(&mut self, oid: u8, clock: u64, rest_ticks: u32, time_shift: u8);
    /// Sends the stop command and returns the MCU's acknowledged final
    /// sequence number (`spi_angle_end` reply).
    fn query_spi_angle_stop(&mut self, oid: u8, at_clock: u64) -> u16;
}

/// The stepper driver's known electrical phase (out of scope: the
/// phase-offset service itself).
pub trait StepperPhaseSource {
    /// `None` until the driver has established its phase, e.g. right
    /// after power-up before a homing move.
    fn mcu_phase_offset(&self) -> Option<i64>;
    /// Number of microsteps in one electrical cycle.
    fn phases(&self) -> i64;
}

/// The motion planner's view of commanded position (out of scope: the
/// planner itself).
pub trait MotionPlanner {
    fn get_past_mcu_position(&self, print_time: f64) -> i64;
}

/// Scripted motion control used only by [`crate::calibration::runner`]
/// (out of scope: the reactor/motion-queue plumbing that executes it).
pub trait StepperMotion {
    /// Queue a relative move of `distance` (stepper-native units) at `speed`.
    fn queue_move(&mut self, distance: f64, speed: f64);
    /// Block until all queued moves have completed.
    fn wait_moves(&mut self);
    /// Current print time, seconds.
    fn now(&self) -> f64;
}

/// The internal tap `CalibrationRunner` reads while a calibration motion
/// sequence runs (out of scope: the Collector drain loop that feeds it).
pub trait CalibrationSampleSource {
    /// Decoded, pre-table samples with `print_time` in `[start, end)`.
    fn samples_between(&self, start: f64, end: f64) -> Vec<crate::decoder::Sample>;
}
