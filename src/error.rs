//! Unified error handling for the track-enricher library.
//!
//! Only setup problems and collaborator failures are errors. A malformed
//! raw point is logged and counted, an outlier is data, and a short window
//! at a stream boundary is expected.

use thiserror::Error;

/// Unified error type for pipeline operations.
#[derive(Debug, Error)]
pub enum TrackError {
    /// Invalid construction (window key, batch window, pipeline configuration)
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// The point source failed while reading a track
    #[error("Point source failed for track '{track_id}': {message}")]
    Source { track_id: String, message: String },

    /// The sink failed while writing a track
    #[error("Sink failed for track '{track_id}': {message}")]
    Sink { track_id: String, message: String },

    /// The run was cancelled at a batch boundary
    #[error("Track '{track_id}' cancelled after {batches} batches")]
    Cancelled { track_id: String, batches: usize },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[cfg(feature = "persistence")]
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

impl TrackError {
    /// Shorthand for a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        TrackError::Config {
            message: message.into(),
        }
    }

    /// True for errors that can only happen at setup time.
    pub fn is_config(&self) -> bool {
        matches!(self, TrackError::Config { .. })
    }
}

/// Result type alias for track-enricher operations.
pub type Result<T> = std::result::Result<T, TrackError>;

/// Extension trait for converting Option to TrackError.
pub trait OptionExt<T> {
    /// Convert Option to Result with a configuration error.
    fn ok_or_config(self, message: &str) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_config(self, message: &str) -> Result<T> {
        self.ok_or_else(|| TrackError::config(message))
    }
}
