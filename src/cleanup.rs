//! Point cleanup: outlier rejection, gap interpolation and per-point deltas.
//!
//! ## Algorithm
//! For each raw point, with `prev` the last retained point:
//! 1. Drop malformed fixes (logged)
//! 2. Project to planar coordinates
//! 3. The first valid point is kept as-is with zero deltas
//! 4. Drop points whose timestamp does not move forward (logged)
//! 5. Reject outliers: the speed implied by distance/time exceeds
//!    `max_speed`, or differs from the reported speed by more than
//!    `max_speed_factor` in either direction
//! 6. Fill gaps longer than one second with linearly interpolated points,
//!    one per second
//! 7. Compute deltas against `prev` and retain
//!
//! The cleaner is stateful: `prev` carries across batches, so successive
//! calls behave exactly like one call over the concatenated input.

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::geo_utils::{heading_degrees, planar_distance};
use crate::{ExtendedPoint, PipelineConfig, Projector, RawPoint};

/// Meters per second to kilometers per hour.
const MS_TO_KMH: f64 = 3.6;

/// Result of cleaning one batch.
#[derive(Debug, Clone, Default)]
pub struct CleanupOutput {
    /// Retained points in temporal order, interpolated points included
    pub points: Vec<ExtendedPoint>,
    /// Rejected points, for auditing
    pub outliers: Vec<RawPoint>,
}

/// Running cleanup counters for one track.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CleanupStats {
    pub received: usize,
    pub malformed: usize,
    pub non_monotonic: usize,
    pub outliers: usize,
    pub interpolated: usize,
    pub retained: usize,
}

/// Stateful cleaner for a single track.
#[derive(Debug)]
pub struct Cleaner<P: Projector> {
    projector: P,
    max_speed: f64,
    max_speed_factor: f64,
    skip_interpolate: bool,
    skip_outliers: bool,
    prev: Option<ExtendedPoint>,
    stats: CleanupStats,
}

impl<P: Projector> Cleaner<P> {
    pub fn new(config: &PipelineConfig, projector: P) -> Self {
        Self {
            projector,
            max_speed: config.max_speed,
            max_speed_factor: config.max_speed_factor,
            skip_interpolate: config.skip_interpolate,
            skip_outliers: config.skip_outliers,
            prev: None,
            stats: CleanupStats::default(),
        }
    }

    /// Clean a batch of raw points. Malformed points never abort the batch.
    pub fn cleanup(&mut self, points: &[RawPoint]) -> CleanupOutput {
        let mut output = CleanupOutput {
            points: Vec::with_capacity(points.len()),
            outliers: Vec::new(),
        };

        for raw in points {
            self.stats.received += 1;

            if !raw.is_valid() {
                warn!("[Cleanup] Dropping malformed point {:?}", raw);
                self.stats.malformed += 1;
                continue;
            }

            let candidate = ExtendedPoint::from_raw(raw, self.projector.project(raw.lat, raw.lon));

            let Some(prev) = self.prev.as_ref() else {
                self.retain(candidate, &mut output);
                continue;
            };

            let dt = candidate.ts - prev.ts;
            if dt <= 0 {
                warn!(
                    "[Cleanup] Dropping point at ts={} (previous retained ts={})",
                    candidate.ts, prev.ts
                );
                self.stats.non_monotonic += 1;
                continue;
            }

            if !self.skip_outliers && self.is_outlier(prev, &candidate, dt) {
                debug!("[Cleanup] Outlier at ts={}", candidate.ts);
                self.stats.outliers += 1;
                output.outliers.push(*raw);
                continue;
            }

            if !self.skip_interpolate && dt > 1 {
                let anchor = prev.clone();
                for step in 1..dt {
                    let synthetic = interpolate(&anchor, &candidate, step, dt);
                    self.stats.interpolated += 1;
                    self.retain(synthetic, &mut output);
                }
            }

            self.retain(candidate, &mut output);
        }

        output
    }

    fn is_outlier(&self, prev: &ExtendedPoint, candidate: &ExtendedPoint, dt: i64) -> bool {
        let distance = planar_distance(prev.position(), candidate.position());
        let calc_speed = distance / dt as f64 * MS_TO_KMH;
        let factor = calc_speed / candidate.spd.max(1.0);

        calc_speed > self.max_speed
            || factor > self.max_speed_factor
            || factor < 1.0 / self.max_speed_factor
    }

    fn retain(&mut self, mut point: ExtendedPoint, output: &mut CleanupOutput) {
        if let Some(prev) = self.prev.as_ref() {
            apply_deltas(&mut point, prev);
        }
        self.stats.retained += 1;
        self.prev = Some(point.clone());
        output.points.push(point);
    }

    /// Last retained point.
    pub fn prev(&self) -> Option<&ExtendedPoint> {
        self.prev.as_ref()
    }

    pub fn stats(&self) -> &CleanupStats {
        &self.stats
    }
}

/// Point `step` seconds after `from` on the line to `to`, `dt` seconds away.
/// Planar position and altitude are floored; the rest stays real.
fn interpolate(from: &ExtendedPoint, to: &ExtendedPoint, step: i64, dt: i64) -> ExtendedPoint {
    let lerp = |a: f64, b: f64| a + (b - a) * step as f64 / dt as f64;
    let raw = RawPoint::new(
        from.ts + step,
        lerp(from.lat, to.lat),
        lerp(from.lon, to.lon),
        lerp(from.alt as f64, to.alt as f64).floor() as i64,
        lerp(from.spd, to.spd),
    );
    let position = (
        lerp(from.x as f64, to.x as f64).floor() as i64,
        lerp(from.y as f64, to.y as f64).floor() as i64,
    );

    let mut point = ExtendedPoint::from_raw(&raw, position);
    point.interpolated = true;
    point
}

/// Fill distance, heading and deltas of `point` relative to `prev`.
fn apply_deltas(point: &mut ExtendedPoint, prev: &ExtendedPoint) {
    point.dst = planar_distance(prev.position(), point.position());
    point.hdg = heading_degrees(prev.position(), point.position());
    point.alt_d = point.alt - prev.alt;
    point.spd_d = point.spd - prev.spd;
    point.hdg_d = point.hdg - prev.hdg;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::WebMercator;

    /// Planar meters = degrees * 1000, so test positions stay readable.
    fn scaled(lat: f64, lon: f64) -> (i64, i64) {
        ((lon * 1000.0).round() as i64, (lat * 1000.0).round() as i64)
    }

    fn config() -> PipelineConfig {
        PipelineConfig::default()
    }

    #[test]
    fn test_first_point_has_zero_deltas() {
        let mut cleaner = Cleaner::new(&config(), scaled);
        let out = cleaner.cleanup(&[RawPoint::new(1, 0.0, 0.0, 100, 20.0)]);
        assert_eq!(out.points.len(), 1);
        let p = &out.points[0];
        assert_eq!((p.dst, p.hdg, p.alt_d, p.spd_d, p.hdg_d), (0.0, 0.0, 0, 0.0, 0.0));
    }

    #[test]
    fn test_interpolation_fills_one_second_steps() {
        let mut cleaner = Cleaner::new(&config(), scaled);
        let out = cleaner.cleanup(&[
            RawPoint::new(1, 0.0, 0.0, 100, 30.0),
            RawPoint::new(4, 0.03, 0.0, 131, 36.0),
        ]);

        assert!(out.outliers.is_empty());
        let ts: Vec<i64> = out.points.iter().map(|p| p.ts).collect();
        assert_eq!(ts, vec![1, 2, 3, 4]);

        let p2 = &out.points[1];
        assert!((p2.lat - 0.01).abs() < 1e-12);
        assert_eq!(p2.alt, 110);
        assert_eq!(p2.position(), (0, 10));
        assert!((p2.spd - 32.0).abs() < 1e-9);
        assert!(p2.interpolated);

        let p3 = &out.points[2];
        assert!((p3.lat - 0.02).abs() < 1e-12);
        assert_eq!(p3.alt, 120);
        assert_eq!(p3.position(), (0, 20));
        assert!((p3.spd - 34.0).abs() < 1e-9);

        let p4 = &out.points[3];
        assert!(!p4.interpolated);
        assert_eq!(p4.alt_d, 11);
        assert_eq!(p4.dst, 10.0);
        assert_eq!(cleaner.stats().interpolated, 2);
        assert_eq!(cleaner.stats().retained, 4);
    }

    #[test]
    fn test_interpolation_disabled() {
        let cfg = PipelineConfig {
            skip_interpolate: true,
            ..config()
        };
        let mut cleaner = Cleaner::new(&cfg, scaled);
        let out = cleaner.cleanup(&[
            RawPoint::new(1, 0.0, 0.0, 100, 30.0),
            RawPoint::new(4, 0.03, 0.0, 131, 36.0),
        ]);
        assert_eq!(out.points.len(), 2);
        assert_eq!(out.points[1].dst, 30.0);
    }

    #[test]
    fn test_outlier_rejected() {
        let projector = |lat: f64, lon: f64| ((lon * 100.0).round() as i64, (lat * 100.0).round() as i64);
        let mut cleaner = Cleaner::new(&config(), projector);
        let spike = RawPoint::new(2, 2.0, 2.0, 100, 1000.0);
        let out = cleaner.cleanup(&[RawPoint::new(1, 0.01, 0.01, 100, 0.0), spike]);

        assert_eq!(out.points.len(), 1);
        assert_eq!(out.points[0].position(), (1, 1));
        assert_eq!(out.outliers, vec![spike]);
        assert_eq!(cleaner.prev().map(|p| p.ts), Some(1));
    }

    #[test]
    fn test_speed_factor_bounds() {
        // 10 m/s = 36 km/h implied
        let mut cleaner = Cleaner::new(&config(), scaled);
        let out = cleaner.cleanup(&[
            RawPoint::new(1, 0.0, 0.0, 100, 36.0),
            RawPoint::new(2, 0.01, 0.0, 100, 200.0), // factor 0.18 < 1/5
            RawPoint::new(3, 0.02, 0.0, 100, 10.0),  // factor 3.6 within bounds
        ]);
        assert_eq!(out.outliers.len(), 1);
        assert_eq!(out.outliers[0].ts, 2);
        let ts: Vec<i64> = out.points.iter().map(|p| p.ts).collect();
        assert_eq!(ts, vec![1, 2, 3]);
        assert!(out.points[1].interpolated);
    }

    #[test]
    fn test_high_speed_factor_below_max_speed() {
        let mut cleaner = Cleaner::new(&config(), scaled);
        let out = cleaner.cleanup(&[
            RawPoint::new(1, 0.0, 0.0, 100, 10.0),
            // 30 m in 1 s = 108 km/h, under max_speed but 10.8x the reported speed
            RawPoint::new(2, 0.03, 0.0, 100, 10.0),
        ]);
        assert_eq!(out.outliers.len(), 1);
        assert_eq!(out.outliers[0].ts, 2);
        assert_eq!(out.points.len(), 1);
        assert_eq!(cleaner.stats().outliers, 1);
    }

    #[test]
    fn test_implausible_altitude_dropped() {
        let cfg = PipelineConfig {
            skip_outliers: true,
            ..config()
        };
        let mut cleaner = Cleaner::new(&cfg, WebMercator);
        let out = cleaner.cleanup(&[
            RawPoint::new(1, 46.0, 7.0, -10, 10.0),
            RawPoint::new(2, 46.0, 7.0, i64::MAX, 10.0),
            RawPoint::new(3, 46.0, 7.0, i64::MIN, 10.0),
            RawPoint::new(4, 46.0, 7.0, -4, 10.0),
        ]);

        let ts: Vec<i64> = out.points.iter().map(|p| p.ts).collect();
        assert_eq!(ts, vec![1, 2, 3, 4]);
        assert_eq!(cleaner.stats().malformed, 2);
        // The gap left by the dropped fixes is interpolated from real altitudes
        assert!(out.points.iter().all(|p| (-10..=-4).contains(&p.alt)));
        assert_eq!(out.points[3].alt_d, 2);
    }

    #[test]
    fn test_outliers_disabled() {
        let cfg = PipelineConfig {
            skip_outliers: true,
            ..config()
        };
        let mut cleaner = Cleaner::new(&cfg, scaled);
        let out = cleaner.cleanup(&[
            RawPoint::new(1, 0.0, 0.0, 100, 0.0),
            RawPoint::new(2, 1.0, 1.0, 100, 1000.0),
        ]);
        assert_eq!(out.points.len(), 2);
        assert!(out.outliers.is_empty());
    }

    #[test]
    fn test_malformed_and_non_monotonic_dropped() {
        let mut cleaner = Cleaner::new(&config(), scaled);
        let out = cleaner.cleanup(&[
            RawPoint::new(5, 0.0, 0.0, 100, 36.0),
            RawPoint::new(6, f64::NAN, 0.0, 100, 36.0),
            RawPoint::new(5, 0.01, 0.0, 100, 36.0),
            RawPoint::new(4, 0.01, 0.0, 100, 36.0),
            RawPoint::new(6, 0.01, 0.0, 100, 36.0),
        ]);
        let ts: Vec<i64> = out.points.iter().map(|p| p.ts).collect();
        assert_eq!(ts, vec![5, 6]);

        let stats = cleaner.stats();
        assert_eq!(stats.received, 5);
        assert_eq!(stats.malformed, 1);
        assert_eq!(stats.non_monotonic, 2);
        assert_eq!(stats.retained, 2);
    }

    #[test]
    fn test_state_carries_across_batches() {
        let mut cleaner = Cleaner::new(&config(), scaled);
        let first = cleaner.cleanup(&[RawPoint::new(1, 0.0, 0.0, 100, 36.0)]);
        let second = cleaner.cleanup(&[RawPoint::new(2, 0.01, 0.0, 95, 36.0)]);
        assert_eq!(first.points.len(), 1);
        assert_eq!(second.points.len(), 1);
        assert_eq!(second.points[0].dst, 10.0);
        assert_eq!(second.points[0].alt_d, -5);
    }

    #[test]
    fn test_heading_difference_is_not_wrapped() {
        let cfg = PipelineConfig {
            skip_outliers: true,
            skip_interpolate: true,
            ..config()
        };
        let tenths = |lat: f64, lon: f64| ((lon * 10.0).round() as i64, (lat * 10.0).round() as i64);
        let mut cleaner = Cleaner::new(&cfg, tenths);
        let out = cleaner.cleanup(&[
            RawPoint::new(1, 0.0, 0.0, 100, 10.0),
            RawPoint::new(2, 5.7, -0.1, 100, 10.0),
            RawPoint::new(3, 11.4, 0.0, 100, 10.0),
        ]);
        assert_eq!(out.points[1].position(), (-1, 57));
        assert_eq!(out.points[2].position(), (0, 114));

        assert!(out.points[1].hdg > 358.9 && out.points[1].hdg < 359.1);
        assert!(out.points[2].hdg > 0.9 && out.points[2].hdg < 1.1);
        assert!((out.points[2].hdg_d + 358.0).abs() < 0.05);
    }
}
