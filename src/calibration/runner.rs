//! Drives the stepper through a scripted motion, samples the sensor at
//! each full step, and fits a new [`CalibrationTable`] (spec.md §4.7, §4.8).

use nalgebra::{DMatrix, DVector};

use super::lstsq::lstsq;
use super::table::{CalibrationTable, BUCKETS};
use crate::decoder::Sample;
use crate::error::{AngleError, Result};
use crate::mcu::{CalibrationSampleSource, StepperMotion, StepperPhaseSource};

/// `full_step_distance` and `rotation_distance` are in the stepper's own
/// native distance units (spec.md §4.7 references them only as ratios).
pub struct CalibrationRunner {
    full_steps_per_rotation: u32,
    rotation_distance: f64,
}

/// Result of a completed calibration run: the fitted table plus the
/// report text persisted alongside it (spec.md §6 / SUPPLEMENTED #5).
pub struct CalibrationReport {
    pub table: CalibrationTable,
    pub stddev_pct: f64,
    pub stddev_forward_pct: f64,
    pub stddev_reverse_pct: f64,
    pub queries: usize,
}

impl CalibrationReport {
    /// `"angle: stddev=%.3f%% (%.3f%% forward / %.3f%% reverse) in %d queries"`.
    pub fn format_report(&self) -> String {
        format!(
            "angle: stddev={:.3}% ({:.3}% forward / {:.3}% reverse) in {} queries",
            self.stddev_pct, self.stddev_forward_pct, self.stddev_reverse_pct, self.queries
        )
    }
}

fn mean_angle(samples: &[Sample]) -> f64 {
    samples.iter().map(|s| s.angle as f64).sum::<f64>() / samples.len() as f64
}

/// Pooled standard deviation of `samples` around their own per-group mean,
/// as a fraction of one full revolution (`2^16`), expressed in percent.
fn pooled_stddev_pct(groups: &[Vec<Sample>]) -> f64 {
    let mut sum_sq = 0.0;
    let mut count = 0usize;
    for g in groups {
        if g.is_empty() {
            continue;
        }
        let mean = mean_angle(g);
        for s in g {
            let d = s.angle as f64 - mean;
            sum_sq += d * d;
        }
        count += g.len();
    }
    if count == 0 {
        return 0.0;
    }
    let stddev = (sum_sq / count as f64).sqrt();
    stddev / 65536.0 * 100.0
}

impl CalibrationRunner {
    pub fn new(full_steps_per_rotation: u32, rotation_distance: f64) -> Self {
        Self {
            full_steps_per_rotation,
            rotation_distance,
        }
    }

    /// Run the full scripted-motion capture and fit (spec.md §4.7).
    pub fn run(
        &self,
        motion: &mut dyn StepperMotion,
        driver: &dyn StepperPhaseSource,
        tap: &dyn CalibrationSampleSource,
    ) -> Result<CalibrationReport> {
        let phi = driver
            .mcu_phase_offset()
            .ok_or(AngleError::DriverPhaseUnknown)?;

        let n = self.full_steps_per_rotation as usize;
        let step_distance = self.rotation_distance / n as f64;
        let rotation = self.rotation_distance;
        let speed = step_distance / 0.010;

        motion.queue_move(-(rotation + phi as f64 * step_distance), speed);
        motion.queue_move(2.0 * rotation, speed);
        motion.queue_move(-2.0 * rotation, speed);
        motion.queue_move(0.5 * rotation - step_distance, speed);
        motion.wait_moves();

        let mut windows: Vec<(f64, f64)> = Vec::with_capacity(2 * n);
        let samp_dist = step_distance;
        for i in 0..(2 * n) {
            motion.queue_move(samp_dist, speed);
            motion.wait_moves();
            let t = motion.now();
            windows.push((t + 0.050, t + 0.100));

            if i == n - 1 {
                motion.queue_move(0.5 * rotation, speed);
                motion.queue_move(-0.5 * rotation + samp_dist, speed);
                motion.wait_moves();
            }
        }

        motion.queue_move(-(0.5 * rotation + phi as f64 * step_distance), speed);
        motion.wait_moves();

        let mut forward_samples: Vec<Vec<Sample>> = vec![Vec::new(); n];
        let mut reverse_samples: Vec<Vec<Sample>> = vec![Vec::new(); n];
        let mut combined: Vec<Vec<Sample>> = vec![Vec::new(); n];
        let mut queries = 0usize;

        for (idx, (start, end)) in windows.iter().enumerate() {
            let samples = tap.samples_between(*start, *end);
            if samples.is_empty() {
                return Err(AngleError::IncompleteCapture { index: idx });
            }
            queries += samples.len();
            let step = if idx < n {
                forward_samples[idx].extend(samples.iter().cloned());
                idx
            } else {
                let r = idx - n;
                let step = n - 1 - r;
                reverse_samples[step].extend(samples.iter().cloned());
                step
            };
            combined[step].extend(samples);
        }

        let forward_means: Vec<f64> = forward_samples.iter().map(|g| mean_angle(g)).collect();
        for i in 0..n {
            for j in (i + 1)..n {
                if forward_means[i] == forward_means[j] {
                    return Err(AngleError::SensorNotUpdating { a: i, b: j });
                }
            }
        }

        let a: Vec<f64> = combined.iter().map(|g| mean_angle(g)).collect();
        let table = Self::fit_table(&a)?;

        let stddev_forward_pct = pooled_stddev_pct(&forward_samples);
        let stddev_reverse_pct = pooled_stddev_pct(&reverse_samples);
        let stddev_pct = pooled_stddev_pct(&combined);

        Ok(CalibrationReport {
            table,
            stddev_pct,
            stddev_forward_pct,
            stddev_reverse_pct,
            queries,
        })
    }

    /// The table-fit half of §4.7/§4.8, split out so it can be tested
    /// against synthetic means without a motion/tap harness (S5).
    pub fn fit_table(a_in: &[f64]) -> Result<CalibrationTable> {
        let n = a_in.len();
        let nominal_step = 65536.0 / n as f64;

        // Step 1 (§4.8): phase_offset from argmin(a), computed on the
        // as-measured array, before `reversed` or the rotation below.
        let argmin = a_in
            .iter()
            .enumerate()
            .min_by(|x, y| x.1.partial_cmp(y.1).unwrap())
            .map(|(i, _)| i)
            .unwrap();
        let phase_offset = ((argmin & 3) as f64) * nominal_step;

        // Step 2: reversed = a[N-2] > a[N-1].
        let mut a = a_in.to_vec();
        let reversed = a[n - 2] > a[n - 1];
        if reversed {
            a.reverse();
        }

        // Step 3: pick the entry that becomes a[0]. The literal rule (not
        // plain min(a)): if a[0] > a[1], anchor on max(a); else min(a).
        let anchor_is_max = a[0] > a[1];
        let anchor_idx = if anchor_is_max {
            a.iter()
                .enumerate()
                .max_by(|x, y| x.1.partial_cmp(y.1).unwrap())
                .map(|(i, _)| i)
                .unwrap()
        } else {
            a.iter()
                .enumerate()
                .min_by(|x, y| x.1.partial_cmp(y.1).unwrap())
                .map(|(i, _)| i)
                .unwrap()
        };
        a.rotate_left(anchor_idx);

        // Step 4: build the N x 64 system.
        let m = BUCKETS;
        let bucket_size = 65536.0 / m as f64;
        let mut mat = DMatrix::<f64>::zeros(n, m);
        let mut b = DVector::<f64>::zeros(n);
        for s in 0..n {
            let int_angle = a[s].round().rem_euclid(65536.0);
            let bucket = ((int_angle / bucket_size).floor() as usize) % m;
            let delta = a[s] - bucket as f64 * bucket_size;
            let frac = delta / bucket_size;
            mat[(s, bucket)] += 1.0 - frac;
            let next = (bucket + 1) % m;
            mat[(s, next)] += frac;

            let mut bs = s as f64 * nominal_step;
            if bucket + 1 >= m {
                bs -= frac * 65536.0;
            }
            b[s] = bs;
        }

        let x = lstsq(&mat, &b)?;
        let mut entries = [0i64; BUCKETS];
        for (i, e) in entries.iter_mut().enumerate() {
            *e = x[i].round() as i64;
        }

        Ok(CalibrationTable::new(entries, reversed, phase_offset))
    }
}
