//! Pipeline configuration.
//!
//! One immutable value per run, handed by reference to every stage. Nothing
//! is read from globals, so independent runs (and tests) can use different
//! settings side by side.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TrackError};
use crate::window_key::WindowKey;

/// Configuration for cleanup, batching and enrichment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Implied speed (km/h) above which a point is an outlier.
    /// Default: 150.0
    pub max_speed: f64,

    /// Allowed ratio between implied and reported speed, in either direction.
    /// Default: 5.0
    pub max_speed_factor: f64,

    /// Disable gap interpolation.
    pub skip_interpolate: bool,

    /// Disable outlier rejection.
    pub skip_outliers: bool,

    /// Raw points per batch pulled from the source.
    /// Default: 500
    pub batch_size: usize,

    /// Points carried from one batch into the next. Must be below batch_size.
    /// Default: 0
    pub overlap: usize,

    /// Upcoming points held back before a target is processed.
    /// 0 derives it from the window keys. Default: 0
    pub min_head_length: usize,

    /// Window shapes computed for every point.
    /// Default: f5, b5, m5
    pub windows: Vec<WindowKey>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_speed: 150.0,
            max_speed_factor: 5.0,
            skip_interpolate: false,
            skip_outliers: false,
            batch_size: 500,
            overlap: 0,
            min_head_length: 0,
            windows: default_windows(),
        }
    }
}

fn default_windows() -> Vec<WindowKey> {
    ["f5", "b5", "m5"]
        .iter()
        .filter_map(|label| label.parse().ok())
        .collect()
}

impl PipelineConfig {
    /// Parse a JSON document and validate it. Missing fields take defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: PipelineConfig = serde_json::from_str(json)
            .map_err(|e| TrackError::config(format!("invalid pipeline config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Replace the window keys.
    pub fn with_windows(mut self, windows: Vec<WindowKey>) -> Self {
        self.windows = windows;
        self
    }

    /// Check every setting. Only ever fails at setup time.
    pub fn validate(&self) -> Result<()> {
        if !self.max_speed.is_finite() || self.max_speed <= 0.0 {
            return Err(TrackError::config(format!(
                "max_speed must be positive, got {}",
                self.max_speed
            )));
        }
        if !self.max_speed_factor.is_finite() || self.max_speed_factor < 1.0 {
            return Err(TrackError::config(format!(
                "max_speed_factor must be at least 1, got {}",
                self.max_speed_factor
            )));
        }
        if self.batch_size == 0 {
            return Err(TrackError::config("batch_size must be positive"));
        }
        if self.overlap > self.batch_size {
            return Err(TrackError::config(format!(
                "overlap {} exceeds batch size {}",
                self.overlap, self.batch_size
            )));
        }
        if self.overlap == self.batch_size {
            return Err(TrackError::config(format!(
                "overlap {} must leave room for new points in a batch of {}",
                self.overlap, self.batch_size
            )));
        }
        if self.windows.is_empty() {
            return Err(TrackError::config("at least one window key is required"));
        }
        let mut seen = HashSet::new();
        for key in &self.windows {
            if !seen.insert(*key) {
                return Err(TrackError::config(format!("duplicate window key {}", key)));
            }
        }
        if self.min_head_length != 0 && self.min_head_length < self.lookahead() {
            log::warn!(
                "[Config] min_head_length {} is below the {} points the windows read ahead; \
                 forward windows will be truncated mid-stream",
                self.min_head_length,
                self.lookahead()
            );
        }
        Ok(())
    }

    /// Lookahead the configured windows need to be full mid-stream.
    pub fn lookahead(&self) -> usize {
        self.windows.iter().map(|k| k.lookahead()).max().unwrap_or(0)
    }

    /// Effective head length for the point window.
    pub fn head_length(&self) -> usize {
        if self.min_head_length == 0 {
            self.lookahead()
        } else {
            self.min_head_length
        }
    }

    /// Longest window in use; bounds the processed history kept in memory.
    pub fn max_window_size(&self) -> usize {
        self.windows.iter().map(|k| k.size()).max().unwrap_or(1)
    }
}
