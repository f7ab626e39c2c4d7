//! Built-in point sources and sinks.
//!
//! - [`VecSource`] / [`MemorySink`]: in-memory, for tests and embedding
//! - [`JsonLinesSource`] / [`JsonLinesSink`]: one JSON object per line

use std::collections::{HashMap, VecDeque};
use std::io::{BufRead, Write};

use log::warn;
use serde::Serialize;

use crate::error::Result;
use crate::pipeline::{PointSource, Sink};
use crate::{ExtendedPoint, RawPoint, Track};

/// Serves points from memory in chunks.
#[derive(Debug, Clone, Default)]
pub struct VecSource {
    points: VecDeque<RawPoint>,
}

impl VecSource {
    pub fn new(points: Vec<RawPoint>) -> Self {
        Self {
            points: points.into(),
        }
    }

    pub fn remaining(&self) -> usize {
        self.points.len()
    }
}

impl PointSource for VecSource {
    fn load_points(&mut self, max_count: usize) -> Result<Option<Vec<RawPoint>>> {
        if self.points.is_empty() {
            return Ok(None);
        }
        let take = max_count.max(1).min(self.points.len());
        Ok(Some(self.points.drain(..take).collect()))
    }
}

/// Reads raw points from JSON lines such as
/// `{"ts":1700000000,"lat":46.02,"lon":7.75,"alt":2450,"spd":32.5}`.
///
/// Blank lines are skipped. Lines that do not parse, invalid UTF-8
/// included, are logged, counted and skipped; they never end the stream.
pub struct JsonLinesSource<R> {
    reader: R,
    line_number: usize,
    malformed: usize,
    finished: bool,
}

impl<R: BufRead> JsonLinesSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line_number: 0,
            malformed: 0,
            finished: false,
        }
    }

    /// Lines skipped because they did not parse.
    pub fn malformed(&self) -> usize {
        self.malformed
    }
}

impl<R: BufRead> PointSource for JsonLinesSource<R> {
    fn load_points(&mut self, max_count: usize) -> Result<Option<Vec<RawPoint>>> {
        if self.finished {
            return Ok(None);
        }

        let mut points = Vec::with_capacity(max_count);
        let mut line = Vec::new();
        while points.len() < max_count.max(1) {
            line.clear();
            if self.reader.read_until(b'\n', &mut line)? == 0 {
                self.finished = true;
                break;
            }
            self.line_number += 1;

            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            match serde_json::from_slice::<RawPoint>(&line) {
                Ok(point) => points.push(point),
                Err(e) => {
                    warn!(
                        "[JsonLinesSource] Skipping line {}: {}",
                        self.line_number, e
                    );
                    self.malformed += 1;
                }
            }
        }

        if self.finished && points.is_empty() {
            Ok(None)
        } else {
            Ok(Some(points))
        }
    }
}

/// Collects enriched points and outliers per track id.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    points: HashMap<String, Vec<ExtendedPoint>>,
    outliers: HashMap<String, Vec<RawPoint>>,
    writes: usize,
}

impl MemorySink {
    pub fn points(&self, track_id: &str) -> &[ExtendedPoint] {
        self.points.get(track_id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn outliers(&self, track_id: &str) -> &[RawPoint] {
        self.outliers.get(track_id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Number of `write` calls received.
    pub fn writes(&self) -> usize {
        self.writes
    }

    pub fn into_points(self) -> HashMap<String, Vec<ExtendedPoint>> {
        self.points
    }
}

impl Sink for MemorySink {
    fn write(&mut self, track: &Track, points: &[ExtendedPoint]) -> Result<()> {
        self.writes += 1;
        self.points
            .entry(track.id.clone())
            .or_default()
            .extend_from_slice(points);
        Ok(())
    }

    fn write_outliers(&mut self, track: &Track, outliers: &[RawPoint]) -> Result<()> {
        self.outliers
            .entry(track.id.clone())
            .or_default()
            .extend_from_slice(outliers);
        Ok(())
    }
}

#[derive(Serialize)]
struct PointLine<'a> {
    track: &'a str,
    point: &'a ExtendedPoint,
}

/// Writes one `{"track": ..., "point": {...}}` object per enriched point.
pub struct JsonLinesSink<W: Write> {
    writer: W,
    written: usize,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer, written: 0 }
    }

    pub fn written(&self) -> usize {
        self.written
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> Sink for JsonLinesSink<W> {
    fn write(&mut self, track: &Track, points: &[ExtendedPoint]) -> Result<()> {
        for point in points {
            serde_json::to_writer(
                &mut self.writer,
                &PointLine {
                    track: &track.id,
                    point,
                },
            )?;
            self.writer.write_all(b"\n")?;
        }
        self.writer.flush()?;
        self.written += points.len();
        Ok(())
    }
}
