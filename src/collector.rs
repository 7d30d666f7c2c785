//! Bulk-capture lifecycle: a mutex-protected raw-message queue fed by an
//! MCU callback, drained by a ~100ms timer into decode -> calibration ->
//! phase-alignment -> subscriber fan-out (spec.md §3, §5).

use parking_lot::Mutex;

use crate::calibration::{CalibrationTable, PhaseAligner};
use crate::clock::ClockMap;
use crate::decoder::{ClockState, RawMessage, SampleDecoder};
use crate::error::Result;
use crate::mcu::{AngleMcuLink, McuClock, MotionPlanner, StepperPhaseSource};
use crate::sensor::SensorKind;

/// Scheduling guard: commands are issued `MIN_MSG_TIME` seconds ahead of
/// `estimated_print_time(now)` so the MCU has the command queued before
/// its requested clock arrives (SUPPLEMENTED #2).
pub const MIN_MSG_TIME: f64 = 0.100;

/// One `angle/dump_angle` batch, matching the wire shape in spec.md §6.
#[derive(Debug, Clone)]
pub struct AngleBatch {
    pub data: Vec<(f64, i64)>,
    pub errors: u32,
    pub position_offset: Option<i64>,
}

/// A subscriber to the angle dump stream. `on_attach` fires once, with the
/// header handshake tuple, before any batches (SUPPLEMENTED #4).
pub trait Subscriber {
    fn on_attach(&mut self, time: f64, angle: i64);
    fn on_batch(&mut self, batch: &AngleBatch);
}

/// Raw queue shared between the MCU callback (producer) and the drain
/// timer (consumer); swapped, not drained in place, to keep the lock held
/// for O(1) (spec.md §5).
#[derive(Default)]
struct RawQueue {
    messages: Vec<RawMessage>,
}

/// Owns one sensor's capture state: the raw queue, the unwrap/decode
/// state, the active calibration table, and the phase aligner.
pub struct Collector {
    kind: SensorKind,
    oid: u8,
    raw: Mutex<RawQueue>,
    decoder: SampleDecoder,
    clock_state: ClockState,
    clock_map: Option<ClockMap>,
    table: CalibrationTable,
    phase: PhaseAligner,
    subscribers: Vec<Box<dyn Subscriber + Send>>,
    sample_period_ticks: u32,
    time_shift: u8,
}

impl Collector {
    pub fn new(
        kind: SensorKind,
        oid: u8,
        sample_period_ticks: u32,
        time_shift: u8,
        full_steps_per_rotation: u32,
        microsteps: u32,
    ) -> Self {
        Self {
            kind,
            oid,
            raw: Mutex::new(RawQueue::default()),
            decoder: SampleDecoder::new(kind),
            clock_state: ClockState::default(),
            clock_map: None,
            table: CalibrationTable::identity(),
            phase: PhaseAligner::new(full_steps_per_rotation, microsteps),
            subscribers: Vec::new(),
            sample_period_ticks,
            time_shift,
        }
    }

    /// Swap in a freshly fitted table (atomic: readers never see a torn
    /// state, spec.md §5).
    pub fn set_table(&mut self, table: CalibrationTable) {
        self.table = table;
    }

    pub fn table(&self) -> &CalibrationTable {
        &self.table
    }

    /// MCU callback: append one batch to the raw queue. Never blocks on
    /// anything but the queue's own mutex.
    pub fn push_raw(&self, msg: RawMessage) {
        self.raw.lock().messages.push(msg);
    }

    /// Begin capture: schedule the MCU start command `MIN_MSG_TIME` ahead
    /// of now and reset unwrap state.
    pub fn start(&mut self, link: &mut dyn AngleMcuLink) {
        let start_clock =
            link.print_time_to_clock(link.estimated_print_time(link.monotonic()) + MIN_MSG_TIME);
        self.clock_state
            .begin_capture(start_clock, self.sample_period_ticks, self.time_shift);
        self.raw.lock().messages.clear();
        link.query_spi_angle_start(
            self.oid,
            start_clock,
            self.sample_period_ticks,
            self.time_shift,
        );
    }

    /// Stop capture: schedule the stop command and discard any messages
    /// still queued (no partial batch crosses the stop, spec.md §5).
    pub fn stop(&mut self, link: &mut dyn AngleMcuLink) {
        let at_clock =
            link.print_time_to_clock(link.estimated_print_time(link.monotonic()) + MIN_MSG_TIME);
        let _final_sequence = link.query_spi_angle_stop(self.oid, at_clock);
        self.clock_state.end_capture();
        self.raw.lock().messages.clear();
    }

    pub fn is_measuring(&self) -> bool {
        self.clock_state.is_measuring()
    }

    /// Motion system "stepper position re-sync" hook (spec.md §9 Global
    /// state): clears the phase offset so the next sample re-seeds it.
    pub fn on_stepper_resync(&mut self) {
        self.phase.reset_phase();
    }

    pub fn add_subscriber(&mut self, mut sub: Box<dyn Subscriber + Send>, seed: (f64, i64)) {
        sub.on_attach(seed.0, seed.1);
        self.subscribers.push(sub);
    }

    /// The ~100ms drain tick: swap out the raw queue, decode, apply the
    /// table, seed/advance phase alignment, and fan out to subscribers.
    /// Never yields; the only lock held is released before decoding.
    pub fn drain(
        &mut self,
        mcu: &dyn McuClock,
        driver: &dyn StepperPhaseSource,
        planner: &dyn MotionPlanner,
    ) -> Result<()> {
        let messages = std::mem::take(&mut self.raw.lock().messages);
        if messages.is_empty() {
            return Ok(());
        }

        let (mut samples, errors) =
            self.decoder
                .decode(&messages, &mut self.clock_state, mcu, self.clock_map.as_ref());

        self.table.apply(&mut samples);

        let mut position_offset = self.phase.mcu_pos_offset();
        if position_offset.is_none() {
            if let Some(first) = samples.first() {
                match self.phase.seed_if_unset(
                    first.print_time,
                    first.angle,
                    self.table.phase_offset(),
                    driver,
                    planner,
                ) {
                    Ok(()) => position_offset = self.phase.mcu_pos_offset(),
                    Err(_) => position_offset = None,
                }
            }
        }

        let batch = AngleBatch {
            data: samples.iter().map(|s| (s.print_time, s.angle)).collect(),
            errors,
            position_offset,
        };
        for sub in &mut self.subscribers {
            sub.on_batch(&batch);
        }
        Ok(())
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    struct RecordingLink {
        time: f64,
        freq: f64,
        started: Vec<(u64, u32, u8)>,
        stopped: Vec<u64>,
    }
    impl McuClock for RecordingLink {
        fn clock_to_print_time(&self, clock: f64) -> f64 {
            clock / self.freq
        }
        fn print_time_to_clock(&self, print_time: f64) -> u64 {
            (print_time * self.freq) as u64
        }
        fn seconds_to_clock(&self, seconds: f64) -> u32 {
            (seconds * self.freq) as u32
        }
        fn estimated_print_time(&self, systime: f64) -> f64 {
            systime
        }
        fn monotonic(&self) -> f64 {
            self.time
        }
    }
    impl AngleMcuLink for RecordingLink {
        fn create_oid(&mut self) -> u8 {
            0
        }
        fn config_spi_angle(&mut self, _oid: u8, _spi_oid: u8, _sensor_type: &str) {}
        fn query_spi_angle_start(&mut self, _oid: u8, clock: u64, rest_ticks: u32, time_shift: u8) {
            self.started.push((clock, rest_ticks, time_shift));
        }
        fn query_spi_angle_stop(&mut self, _oid: u8, at_clock: u64) -> u16 {
            self.stopped.push(at_clock);
            0
        }
    }

    #[test]
    fn start_schedules_min_msg_time_ahead() {
        let mut link = RecordingLink {
            time: 1.0,
            freq: 1_000_000.0,
            started: Vec::new(),
            stopped: Vec::new(),
        };
        let mut collector = Collector::new(SensorKind::As5047d, 3, 40, 3, 200, 16);
        collector.start(&mut link);
        assert!(collector.is_measuring());
        assert_eq!(link.started.len(), 1);
        assert_eq!(link.started[0].0, ((1.0 + MIN_MSG_TIME) * 1_000_000.0) as u64);
    }

    #[test]
    fn stop_clears_measuring_and_raw_queue() {
        let mut link = RecordingLink {
            time: 1.0,
            freq: 1_000_000.0,
            started: Vec::new(),
            stopped: Vec::new(),
        };
        let mut collector = Collector::new(SensorKind::As5047d, 3, 40, 3, 200, 16);
        collector.start(&mut link);
        collector.push_raw(RawMessage {
            sequence: 0,
            data: vec![0, 0, 0],
        });
        collector.stop(&mut link);
        assert!(!collector.is_measuring());
        assert_eq!(link.stopped.len(), 1);
        assert_eq!(collector.raw.lock().messages.len(), 0);
    }

    #[test]
    fn resync_clears_phase_offset() {
        let mut collector = Collector::new(SensorKind::As5047d, 3, 40, 3, 200, 16);
        // Can't seed without a driver/planner here; just assert the reset
        // path is callable and leaves the offset cleared (it starts unset).
        collector.on_stepper_resync();
        assert!(collector.phase.mcu_pos_offset().is_none());
    }
}
