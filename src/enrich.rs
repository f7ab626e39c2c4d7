//! Windowed aggregate statistics.
//!
//! Drives a [`PointWindow`] and, for every processed target, computes one
//! [`EnrichedWindow`] per configured key from the points around it. Track
//! level statistics are accumulated along the way.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{ExtendedPoint, PointWindow, WindowKey};

/// Aggregates over one window of points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EnrichedWindow {
    /// Sum of point distances (meters)
    pub distance: f64,
    /// Last altitude minus first altitude
    pub alt_delta: i64,
    /// Sum of positive altitude deltas
    pub alt_gain: i64,
    /// Sum of negative altitude deltas (zero or negative)
    pub alt_loss: i64,
    pub alt_max: i64,
    pub alt_min: i64,
    pub speed_min: f64,
    pub speed_max: f64,
    pub speed_ave: f64,
    /// Last speed minus first speed
    pub speed_delta: f64,
}

impl EnrichedWindow {
    /// Compute aggregates over points in temporal order.
    ///
    /// Returns `None` for an empty window.
    pub fn from_points(points: &[&ExtendedPoint]) -> Option<Self> {
        let first = points.first()?;
        let last = points.last()?;

        let mut window = EnrichedWindow {
            distance: 0.0,
            alt_delta: last.alt - first.alt,
            alt_gain: 0,
            alt_loss: 0,
            alt_max: i64::MIN,
            alt_min: i64::MAX,
            speed_min: f64::INFINITY,
            speed_max: f64::NEG_INFINITY,
            speed_ave: 0.0,
            speed_delta: last.spd - first.spd,
        };

        let mut speed_sum = 0.0;
        for p in points {
            window.distance += p.dst;
            if p.alt_d > 0 {
                window.alt_gain += p.alt_d;
            } else {
                window.alt_loss += p.alt_d;
            }
            window.alt_max = window.alt_max.max(p.alt);
            window.alt_min = window.alt_min.min(p.alt);
            window.speed_min = window.speed_min.min(p.spd);
            window.speed_max = window.speed_max.max(p.spd);
            speed_sum += p.spd;
        }
        window.speed_ave = speed_sum / points.len() as f64;

        Some(window)
    }
}

/// Running statistics for a whole track.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackStats {
    /// Points processed
    pub points: usize,
    pub max_speed: f64,
    pub max_alt: Option<i64>,
    pub min_alt: Option<i64>,
    /// Cumulative planar distance (meters)
    pub distance: f64,
    /// Cumulative altitude lost (meters, positive)
    pub descent: i64,
    /// Per key, the best speed held across a whole full-size window:
    /// running maximum of `speed_min` over windows of exactly `key.size()`
    pub sustained_speed: BTreeMap<WindowKey, f64>,
}

impl TrackStats {
    /// Fold a processed point into the totals.
    pub fn update(&mut self, point: &ExtendedPoint) {
        self.points += 1;
        self.max_speed = self.max_speed.max(point.spd);
        self.max_alt = Some(self.max_alt.map_or(point.alt, |alt| alt.max(point.alt)));
        self.min_alt = Some(self.min_alt.map_or(point.alt, |alt| alt.min(point.alt)));
        self.distance += point.dst;
        if point.alt_d < 0 {
            self.descent -= point.alt_d;
        }
    }

    /// Track the sustained speed for `key`. Truncated windows are ignored.
    pub fn record_window(&mut self, key: WindowKey, window: &EnrichedWindow, len: usize) {
        if len != key.size() {
            return;
        }
        let best = self.sustained_speed.entry(key).or_insert(window.speed_min);
        if window.speed_min > *best {
            *best = window.speed_min;
        }
    }
}

/// Process every target the window can currently advance to.
///
/// Each target gains one entry per key, and the processed targets are
/// returned in temporal order. Shorter windows near stream boundaries are
/// not errors.
pub fn enrich(
    window: &mut PointWindow,
    keys: &[WindowKey],
    stats: &mut TrackStats,
) -> Vec<ExtendedPoint> {
    let mut enriched = Vec::new();

    while window.process() {
        if let Some(target) = window.target() {
            stats.update(target);
        }

        let computed: Vec<(WindowKey, EnrichedWindow, usize)> = keys
            .iter()
            .filter_map(|key| {
                let points = window.extract(key);
                EnrichedWindow::from_points(&points).map(|w| (*key, w, points.len()))
            })
            .collect();

        if let Some(target) = window.target_mut() {
            for (key, computed_window, len) in computed {
                stats.record_window(key, &computed_window, len);
                target.windows.insert(key, computed_window);
            }
            enriched.push(target.clone());
        }
    }

    enriched
}
