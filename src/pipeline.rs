//! # Track Pipeline
//!
//! Wires a point source through cleanup and enrichment into a sink.
//!
//! ## Flow
//! ```text
//! PointSource -> BatchWindow -> Cleaner -> PointWindow/enrich -> Sink
//! ```
//!
//! Each track gets its own batch window, point window and cleaner, all
//! owned by a single run. Within a track everything is sequential and in
//! temporal order. Independent tracks share nothing and can run in
//! parallel (feature `parallel`).
//!
//! At end of stream the point window is drained so the points held back
//! for lookahead are flushed with shortened forward windows.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::batch_window::{Batch, BatchWindow};
use crate::cleanup::{Cleaner, CleanupStats};
use crate::enrich::{enrich, TrackStats};
use crate::error::{Result, TrackError};
use crate::point_window::PointWindow;
use crate::{ExtendedPoint, PipelineConfig, Projector, RawPoint, Track, WindowKey};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

// ============================================================================
// Collaborators
// ============================================================================

/// Supplier of raw points for one track.
pub trait PointSource {
    /// Up to `max_count` points, or `None` once the stream has ended.
    fn load_points(&mut self, max_count: usize) -> Result<Option<Vec<RawPoint>>>;
}

/// Destination for enriched points.
///
/// A failed write is fatal to the current track; no retry is attempted.
pub trait Sink {
    fn write(&mut self, track: &Track, points: &[ExtendedPoint]) -> Result<()>;

    /// Receive rejected points for auditing. Ignored by default.
    fn write_outliers(&mut self, _track: &Track, _outliers: &[RawPoint]) -> Result<()> {
        Ok(())
    }
}

impl<S: PointSource + ?Sized> PointSource for Box<S> {
    fn load_points(&mut self, max_count: usize) -> Result<Option<Vec<RawPoint>>> {
        (**self).load_points(max_count)
    }
}

impl<K: Sink + ?Sized> Sink for Box<K> {
    fn write(&mut self, track: &Track, points: &[ExtendedPoint]) -> Result<()> {
        (**self).write(track, points)
    }

    fn write_outliers(&mut self, track: &Track, outliers: &[RawPoint]) -> Result<()> {
        (**self).write_outliers(track, outliers)
    }
}

/// Cooperative cancellation, checked between batches.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

// ============================================================================
// Statistics
// ============================================================================

/// Wall time spent per phase. Observability only.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PhaseTimings {
    pub load: Duration,
    pub cleanup: Duration,
    pub enrich: Duration,
    pub write: Duration,
}

impl PhaseTimings {
    pub fn total(&self) -> Duration {
        self.load + self.cleanup + self.enrich + self.write
    }
}

/// Summary of one track run.
#[derive(Debug, Clone, Default)]
pub struct RunStats {
    pub track_id: String,
    pub batches: usize,
    pub points_read: usize,
    pub points_written: usize,
    pub cleanup: CleanupStats,
    pub track: TrackStats,
    pub timings: PhaseTimings,
}

fn elapsed_ms(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1000.0
}

// ============================================================================
// Pipeline
// ============================================================================

/// Per-track pipeline runner. Cheap to construct; every `run` builds fresh
/// per-track state.
pub struct TrackPipeline<'c, P> {
    config: &'c PipelineConfig,
    projector: P,
    cancel: Option<CancelToken>,
}

impl<'c, P: Projector + Clone> TrackPipeline<'c, P> {
    /// Validate the configuration and create a pipeline.
    pub fn new(config: &'c PipelineConfig, projector: P) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            projector,
            cancel: None,
        })
    }

    /// Stop runs at the next batch boundary once `token` is cancelled.
    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        self.config
    }

    /// Process one track from `source` into `sink`.
    pub fn run<S, K>(&self, track: &Track, source: &mut S, sink: &mut K) -> Result<RunStats>
    where
        S: PointSource + ?Sized,
        K: Sink + ?Sized,
    {
        info!(
            "[Pipeline] Starting track {} (group {}, {} windows)",
            track.id,
            track.group,
            self.config.windows.len()
        );

        let mut batches: BatchWindow<RawPoint, ExtendedPoint> =
            BatchWindow::new(self.config.batch_size, self.config.overlap)?;
        let mut run = TrackRun {
            track,
            keys: &self.config.windows,
            cleaner: Cleaner::new(self.config, self.projector.clone()),
            window: PointWindow::for_config(self.config),
            sink,
            stats: RunStats {
                track_id: track.id.clone(),
                ..RunStats::default()
            },
        };

        loop {
            if let Some(token) = &self.cancel {
                if token.is_cancelled() {
                    let dropped = run.window.discard() + batches.body_len();
                    warn!(
                        "[Pipeline] Track {} cancelled after {} batches, discarding {} buffered points",
                        track.id,
                        batches.batches(),
                        dropped
                    );
                    return Err(TrackError::Cancelled {
                        track_id: track.id.clone(),
                        batches: batches.batches(),
                    });
                }
            }

            let start = Instant::now();
            let loaded = source
                .load_points(self.config.batch_size)
                .map_err(|e| source_error(track, e))?;
            run.stats.timings.load += start.elapsed();

            match loaded {
                Some(points) => {
                    run.stats.points_read += points.len();
                    batches.load(points, |batch| run.process_batch(batch))?;
                }
                None => break,
            }
        }

        batches.finish(|batch| run.process_batch(batch))?;
        if !run.window.is_exhausted() {
            warn!(
                "[Pipeline] Track {} finished with {} unprocessed points",
                track.id,
                run.window.head_len()
            );
        }

        let mut stats = run.stats;
        stats.batches = batches.batches();
        stats.cleanup = run.cleaner.stats().clone();

        info!(
            "[Pipeline] Track {} done: {} read, {} written, {} outliers, {} interpolated in {:.1}ms \
             (load {:.1}ms, cleanup {:.1}ms, enrich {:.1}ms, write {:.1}ms)",
            track.id,
            stats.points_read,
            stats.points_written,
            stats.cleanup.outliers,
            stats.cleanup.interpolated,
            elapsed_ms(stats.timings.total()),
            elapsed_ms(stats.timings.load),
            elapsed_ms(stats.timings.cleanup),
            elapsed_ms(stats.timings.enrich),
            elapsed_ms(stats.timings.write),
        );

        Ok(stats)
    }
}

/// State owned by a single track run.
struct TrackRun<'a, P: Projector, K: ?Sized> {
    track: &'a Track,
    keys: &'a [WindowKey],
    cleaner: Cleaner<P>,
    window: PointWindow,
    sink: &'a mut K,
    stats: RunStats,
}

impl<P: Projector, K: Sink + ?Sized> TrackRun<'_, P, K> {
    fn process_batch(&mut self, batch: Batch<'_, RawPoint, ExtendedPoint>) -> Result<Vec<ExtendedPoint>> {
        let start = Instant::now();
        let cleaned = self.cleaner.cleanup(batch.fresh());
        self.stats.timings.cleanup += start.elapsed();

        if batch.is_drain {
            self.window.set_drain();
        }
        self.window.load_points(cleaned.points);

        let start = Instant::now();
        let enriched = enrich(&mut self.window, self.keys, &mut self.stats.track);
        self.stats.timings.enrich += start.elapsed();

        let start = Instant::now();
        if !cleaned.outliers.is_empty() {
            self.sink
                .write_outliers(self.track, &cleaned.outliers)
                .map_err(|e| sink_error(self.track, e))?;
        }
        if !enriched.is_empty() {
            self.sink
                .write(self.track, &enriched)
                .map_err(|e| sink_error(self.track, e))?;
        }
        self.stats.timings.write += start.elapsed();
        self.stats.points_written += enriched.len();

        debug!(
            "[Pipeline] Track {} batch: {} fresh points, {} enriched, {} outliers{}",
            self.track.id,
            batch.fresh().len(),
            enriched.len(),
            cleaned.outliers.len(),
            if batch.is_drain { " (drain)" } else { "" }
        );

        Ok(enriched)
    }
}

fn source_error(track: &Track, err: TrackError) -> TrackError {
    match err {
        TrackError::Source { .. } => err,
        other => TrackError::Source {
            track_id: track.id.clone(),
            message: other.to_string(),
        },
    }
}

fn sink_error(track: &Track, err: TrackError) -> TrackError {
    match err {
        TrackError::Sink { .. } => err,
        other => TrackError::Sink {
            track_id: track.id.clone(),
            message: other.to_string(),
        },
    }
}

// ============================================================================
// Parallel tracks
// ============================================================================

/// Result of one track in a parallel run, with the sink handed back.
#[cfg(feature = "parallel")]
#[derive(Debug)]
pub struct TrackOutcome<K> {
    pub track: Track,
    pub sink: K,
    pub result: Result<RunStats>,
}

/// Run independent tracks in parallel, one pipeline instance per track.
///
/// Configuration errors fail the whole call; per-track errors are reported
/// in each outcome.
#[cfg(feature = "parallel")]
pub fn run_tracks_parallel<P, S, K>(
    config: &PipelineConfig,
    projector: P,
    jobs: Vec<(Track, S, K)>,
) -> Result<Vec<TrackOutcome<K>>>
where
    P: Projector + Clone + Send + Sync,
    S: PointSource + Send,
    K: Sink + Send,
{
    let pipeline = TrackPipeline::new(config, projector)?;
    info!("[Pipeline] Running {} tracks in parallel", jobs.len());

    Ok(jobs
        .into_par_iter()
        .map(|(track, mut source, mut sink)| {
            let result = pipeline.run(&track, &mut source, &mut sink);
            if let Err(e) = &result {
                warn!("[Pipeline] Track {} failed: {}", track.id, e);
            }
            TrackOutcome {
                track,
                sink,
                result,
            }
        })
        .collect())
}
