//! # Track Enricher
//!
//! Streaming cleanup and motion analytics for GPS tracks recorded during an
//! activity such as skiing.
//!
//! This library provides:
//! - Outlier rejection and one-second gap interpolation
//! - Per-point deltas (distance, heading, altitude, speed)
//! - Windowed aggregates over forward, backward and centered windows
//! - A bounded-memory pipeline from a point source to a sink
//!
//! ## Features
//!
//! - **`parallel`** - Run independent tracks in parallel with rayon
//! - **`persistence`** - SQLite sink
//! - **`full`** - Enable all features
//!
//! ## Quick Start
//!
//! ```rust
//! use track_enricher::{
//!     MemorySink, PipelineConfig, RawPoint, Track, TrackPipeline, VecSource, WebMercator,
//! };
//!
//! // A skier moving north at ~36 km/h, one fix per second
//! let points: Vec<RawPoint> = (0..20)
//!     .map(|i| RawPoint::new(1_000 + i, 46.0 + i as f64 * 0.00009, 7.0, 2_000 - i, 36.0))
//!     .collect();
//!
//! let config = PipelineConfig::default();
//! let track = Track::new("run-1", "demo", 1_000);
//! let mut source = VecSource::new(points);
//! let mut sink = MemorySink::default();
//!
//! let pipeline = TrackPipeline::new(&config, WebMercator).unwrap();
//! let stats = pipeline.run(&track, &mut source, &mut sink).unwrap();
//!
//! assert_eq!(stats.points_written, 20);
//! assert_eq!(sink.points(&track.id).len(), 20);
//! ```

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

// Unified error handling
pub mod error;
pub use error::{OptionExt, Result, TrackError};

// Window shapes
pub mod window_key;
pub use window_key::{WindowDirection, WindowKey};

// Run configuration
pub mod config;
pub use config::PipelineConfig;

// Projection and planar geometry
pub mod geo_utils;
pub use geo_utils::{Projector, WebMercator};

// Fixed-size overlapping batches
pub mod batch_window;
pub use batch_window::{Batch, BatchWindow};

// Head/tail buffer around the target point
pub mod point_window;
pub use point_window::PointWindow;

// Outlier rejection, interpolation, deltas
pub mod cleanup;
pub use cleanup::{Cleaner, CleanupOutput, CleanupStats};

// Windowed aggregates
pub mod enrich;
pub use enrich::{enrich, EnrichedWindow, TrackStats};

// Source -> cleanup -> enrich -> sink
pub mod pipeline;
#[cfg(feature = "parallel")]
pub use pipeline::run_tracks_parallel;
pub use pipeline::{CancelToken, PhaseTimings, PointSource, RunStats, Sink, TrackPipeline};

// Built-in sources and sinks
pub mod io;
pub use io::{JsonLinesSink, JsonLinesSource, MemorySink, VecSource};

// SQLite sink
#[cfg(feature = "persistence")]
pub mod persistence;
#[cfg(feature = "persistence")]
pub use persistence::SqliteSink;

// ============================================================================
// Core Types
// ============================================================================

/// One recording session. Read-only to the pipeline; used for logging and
/// as the key handed to sinks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub id: String,
    pub group: String,
    /// Unix timestamp (seconds) of the first fix
    pub start_time: i64,
}

impl Track {
    pub fn new(id: impl Into<String>, group: impl Into<String>, start_time: i64) -> Self {
        Self {
            id: id.into(),
            group: group.into(),
            start_time,
        }
    }
}

/// Lowest altitude accepted from a fix (meters).
pub const MIN_ALTITUDE: i64 = -1_000;
/// Highest altitude accepted from a fix (meters).
pub const MAX_ALTITUDE: i64 = 10_000;

/// An unprocessed GPS fix as produced by a point source.
///
/// # Example
/// ```
/// use track_enricher::RawPoint;
/// let point = RawPoint::new(1_700_000_000, 46.02, 7.75, 2_450, 32.5);
/// assert!(point.is_valid());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawPoint {
    /// Unix timestamp in seconds
    pub ts: i64,
    pub lat: f64,
    pub lon: f64,
    /// Altitude in meters
    pub alt: i64,
    /// Reported speed in km/h
    pub spd: f64,
}

impl RawPoint {
    pub fn new(ts: i64, lat: f64, lon: f64, alt: i64, spd: f64) -> Self {
        Self {
            ts,
            lat,
            lon,
            alt,
            spd,
        }
    }

    /// Check if the fix is usable: positive timestamp, coordinates in range,
    /// plausible altitude, finite non-negative speed.
    pub fn is_valid(&self) -> bool {
        self.ts > 0
            && (MIN_ALTITUDE..=MAX_ALTITUDE).contains(&self.alt)
            && self.lat.is_finite()
            && self.lon.is_finite()
            && self.lat >= -90.0
            && self.lat <= 90.0
            && self.lon >= -180.0
            && self.lon <= 180.0
            && self.spd.is_finite()
            && self.spd >= 0.0
    }
}

/// A retained point (original or interpolated) with planar position,
/// deltas from the previous retained point and its computed windows.
///
/// Created once by cleanup. Enrichment only adds entries to `windows`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtendedPoint {
    pub ts: i64,
    pub lat: f64,
    pub lon: f64,
    pub alt: i64,
    pub spd: f64,
    /// Planar position in meters
    pub x: i64,
    pub y: i64,
    /// Planar distance from the previous retained point
    pub dst: f64,
    /// Bearing from the previous retained point, 0° along +Y
    pub hdg: f64,
    pub alt_d: i64,
    pub spd_d: f64,
    /// Raw heading difference, not wrapped: 359° -> 1° gives -358
    pub hdg_d: f64,
    /// True for points synthesized to fill a timing gap
    #[serde(default)]
    pub interpolated: bool,
    #[serde(default, with = "window_map")]
    pub windows: HashMap<WindowKey, EnrichedWindow>,
}

impl ExtendedPoint {
    /// Wrap a raw point at its projected position with zero deltas.
    pub fn from_raw(raw: &RawPoint, position: (i64, i64)) -> Self {
        Self {
            ts: raw.ts,
            lat: raw.lat,
            lon: raw.lon,
            alt: raw.alt,
            spd: raw.spd,
            x: position.0,
            y: position.1,
            dst: 0.0,
            hdg: 0.0,
            alt_d: 0,
            spd_d: 0.0,
            hdg_d: 0.0,
            interpolated: false,
            windows: HashMap::new(),
        }
    }

    pub fn position(&self) -> (i64, i64) {
        (self.x, self.y)
    }

    /// The raw fix this point was built from.
    pub fn raw(&self) -> RawPoint {
        RawPoint::new(self.ts, self.lat, self.lon, self.alt, self.spd)
    }

    pub fn window(&self, key: &WindowKey) -> Option<&EnrichedWindow> {
        self.windows.get(key)
    }
}

/// Window maps serialize with compact labels (`f5`, `m3`) as keys so that
/// text formats with string-only keys can carry them.
mod window_map {
    use std::collections::{BTreeMap, HashMap};

    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    use crate::{EnrichedWindow, WindowKey};

    pub fn serialize<S>(
        windows: &HashMap<WindowKey, EnrichedWindow>,
        serializer: S,
    ) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let labelled: BTreeMap<String, &EnrichedWindow> = windows
            .iter()
            .map(|(key, window)| (key.to_string(), window))
            .collect();
        labelled.serialize(serializer)
    }

    pub fn deserialize<'de, D>(
        deserializer: D,
    ) -> std::result::Result<HashMap<WindowKey, EnrichedWindow>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let labelled = BTreeMap::<String, EnrichedWindow>::deserialize(deserializer)?;
        labelled
            .into_iter()
            .map(|(label, window)| {
                label
                    .parse::<WindowKey>()
                    .map(|key| (key, window))
                    .map_err(D::Error::custom)
            })
            .collect()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_point_validation() {
        assert!(RawPoint::new(10, 46.0, 7.0, 2000, 20.0).is_valid());
        assert!(!RawPoint::new(0, 46.0, 7.0, 2000, 20.0).is_valid());
        assert!(!RawPoint::new(10, 91.0, 7.0, 2000, 20.0).is_valid());
        assert!(!RawPoint::new(10, 46.0, 181.0, 2000, 20.0).is_valid());
        assert!(!RawPoint::new(10, f64::NAN, 7.0, 2000, 20.0).is_valid());
        assert!(!RawPoint::new(10, 46.0, 7.0, 2000, -1.0).is_valid());
        assert!(!RawPoint::new(10, 46.0, 7.0, 2000, f64::INFINITY).is_valid());
    }

    #[test]
    fn test_altitude_range() {
        assert!(RawPoint::new(10, 46.0, 7.0, MIN_ALTITUDE, 20.0).is_valid());
        assert!(RawPoint::new(10, 46.0, 7.0, MAX_ALTITUDE, 20.0).is_valid());
        assert!(!RawPoint::new(10, 46.0, 7.0, MAX_ALTITUDE + 1, 20.0).is_valid());
        assert!(!RawPoint::new(10, 46.0, 7.0, i64::MAX, 20.0).is_valid());
        assert!(!RawPoint::new(10, 46.0, 7.0, i64::MIN, 20.0).is_valid());
    }

    #[test]
    fn test_extended_point_from_raw() {
        let raw = RawPoint::new(10, 46.0, 7.0, 2000, 20.0);
        let point = ExtendedPoint::from_raw(&raw, (5, 6));
        assert_eq!(point.position(), (5, 6));
        assert_eq!(point.dst, 0.0);
        assert_eq!(point.alt_d, 0);
        assert!(point.windows.is_empty());
        assert_eq!(point.raw(), raw);
    }

    #[test]
    fn test_extended_point_json_uses_labels() {
        let mut point = ExtendedPoint::from_raw(&RawPoint::new(10, 46.0, 7.0, 2000, 20.0), (0, 0));
        let key = WindowKey::midpoint(3).unwrap();
        point.windows.insert(
            key,
            EnrichedWindow {
                distance: 12.0,
                alt_delta: -3,
                alt_gain: 0,
                alt_loss: -3,
                alt_max: 2000,
                alt_min: 1997,
                speed_min: 19.0,
                speed_max: 21.0,
                speed_ave: 20.0,
                speed_delta: 1.0,
            },
        );

        let json = serde_json::to_string(&point).unwrap();
        assert!(json.contains(r#""m3":{"#));

        let back: ExtendedPoint = serde_json::from_str(&json).unwrap();
        assert_eq!(back, point);
    }
}
