//! # SQLite Sink
//!
//! Stores enriched points per track in SQLite. Scalar fields live in
//! columns; the window map is a MessagePack blob keyed by window label.
//!
//! Writes are idempotent per `(track_id, ts)`, so replaying a batch after a
//! failed run overwrites instead of duplicating.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use log::{debug, info};
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::{Result, TrackError};
use crate::pipeline::Sink;
use crate::{EnrichedWindow, ExtendedPoint, RawPoint, Track, WindowKey};

pub struct SqliteSink {
    db: Connection,
}

impl SqliteSink {
    /// Open (or create) a database file.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let db = Connection::open(path.as_ref())?;
        Self::init_schema(&db)?;
        info!("[SqliteSink] Opened {}", path.as_ref().display());
        Ok(Self { db })
    }

    /// Create an in-memory database (for testing).
    pub fn in_memory() -> Result<Self> {
        let db = Connection::open_in_memory()?;
        Self::init_schema(&db)?;
        Ok(Self { db })
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS tracks (
                id TEXT PRIMARY KEY,
                track_group TEXT NOT NULL,
                start_time INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS points (
                track_id TEXT NOT NULL,
                ts INTEGER NOT NULL,
                lat REAL NOT NULL,
                lon REAL NOT NULL,
                alt INTEGER NOT NULL,
                spd REAL NOT NULL,
                x INTEGER NOT NULL,
                y INTEGER NOT NULL,
                dst REAL NOT NULL,
                hdg REAL NOT NULL,
                alt_d INTEGER NOT NULL,
                spd_d REAL NOT NULL,
                hdg_d REAL NOT NULL,
                interpolated INTEGER NOT NULL,
                windows BLOB NOT NULL,
                PRIMARY KEY (track_id, ts)
            );

            CREATE TABLE IF NOT EXISTS outliers (
                track_id TEXT NOT NULL,
                ts INTEGER NOT NULL,
                lat REAL NOT NULL,
                lon REAL NOT NULL,
                alt INTEGER NOT NULL,
                spd REAL NOT NULL,
                PRIMARY KEY (track_id, ts)
            );

            CREATE INDEX IF NOT EXISTS idx_tracks_group ON tracks(track_group);
            "#,
        )?;
        Ok(())
    }

    fn store_track(conn: &Connection, track: &Track) -> Result<()> {
        conn.execute(
            "INSERT OR REPLACE INTO tracks (id, track_group, start_time) VALUES (?, ?, ?)",
            params![track.id, track.group, track.start_time],
        )?;
        Ok(())
    }

    /// Number of stored points for a track.
    pub fn point_count(&self, track_id: &str) -> Result<usize> {
        let count: i64 = self.db.query_row(
            "SELECT COUNT(*) FROM points WHERE track_id = ?",
            params![track_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// Stored track metadata, if any point or outlier was written for it.
    pub fn load_track(&self, track_id: &str) -> Result<Option<Track>> {
        Ok(self
            .db
            .query_row(
                "SELECT id, track_group, start_time FROM tracks WHERE id = ?",
                params![track_id],
                |row| Ok(Track::new(row.get::<_, String>(0)?, row.get::<_, String>(1)?, row.get(2)?)),
            )
            .optional()?)
    }

    /// Load a track's points in timestamp order.
    pub fn load_points(&self, track_id: &str) -> Result<Vec<ExtendedPoint>> {
        let mut stmt = self.db.prepare(
            "SELECT ts, lat, lon, alt, spd, x, y, dst, hdg, alt_d, spd_d, hdg_d, interpolated, windows
             FROM points WHERE track_id = ? ORDER BY ts",
        )?;

        let rows = stmt.query_map(params![track_id], |row| {
            let point = ExtendedPoint {
                ts: row.get(0)?,
                lat: row.get(1)?,
                lon: row.get(2)?,
                alt: row.get(3)?,
                spd: row.get(4)?,
                x: row.get(5)?,
                y: row.get(6)?,
                dst: row.get(7)?,
                hdg: row.get(8)?,
                alt_d: row.get(9)?,
                spd_d: row.get(10)?,
                hdg_d: row.get(11)?,
                interpolated: row.get(12)?,
                windows: Default::default(),
            };
            let blob: Vec<u8> = row.get(13)?;
            Ok((point, blob))
        })?;

        let mut points = Vec::new();
        for row in rows {
            let (mut point, blob) = row?;
            point.windows = decode_windows(track_id, &blob)?;
            points.push(point);
        }
        Ok(points)
    }

    pub fn load_outliers(&self, track_id: &str) -> Result<Vec<RawPoint>> {
        let mut stmt = self.db.prepare(
            "SELECT ts, lat, lon, alt, spd FROM outliers WHERE track_id = ? ORDER BY ts",
        )?;
        let outliers = stmt
            .query_map(params![track_id], |row| {
                Ok(RawPoint::new(
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(outliers)
    }
}

fn encode_windows(track: &Track, point: &ExtendedPoint) -> Result<Vec<u8>> {
    let labelled: BTreeMap<String, &EnrichedWindow> = point
        .windows
        .iter()
        .map(|(key, window)| (key.to_string(), window))
        .collect();
    rmp_serde::to_vec(&labelled).map_err(|e| TrackError::Sink {
        track_id: track.id.clone(),
        message: format!("failed to encode windows at ts {}: {}", point.ts, e),
    })
}

fn decode_windows(
    track_id: &str,
    blob: &[u8],
) -> Result<HashMap<WindowKey, EnrichedWindow>> {
    let labelled: BTreeMap<String, EnrichedWindow> =
        rmp_serde::from_slice(blob).map_err(|e| TrackError::Sink {
            track_id: track_id.to_string(),
            message: format!("failed to decode windows: {}", e),
        })?;
    labelled
        .into_iter()
        .map(|(label, window)| label.parse::<WindowKey>().map(|key| (key, window)))
        .collect()
}

impl Sink for SqliteSink {
    fn write(&mut self, track: &Track, points: &[ExtendedPoint]) -> Result<()> {
        let tx = self.db.transaction()?;
        Self::store_track(&tx, track)?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT OR REPLACE INTO points
                 (track_id, ts, lat, lon, alt, spd, x, y, dst, hdg, alt_d, spd_d, hdg_d, interpolated, windows)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )?;
            for p in points {
                let windows = encode_windows(track, p)?;
                stmt.execute(params![
                    track.id,
                    p.ts,
                    p.lat,
                    p.lon,
                    p.alt,
                    p.spd,
                    p.x,
                    p.y,
                    p.dst,
                    p.hdg,
                    p.alt_d,
                    p.spd_d,
                    p.hdg_d,
                    p.interpolated,
                    windows
                ])?;
            }
        }
        tx.commit()?;
        debug!("[SqliteSink] Stored {} points for {}", points.len(), track.id);
        Ok(())
    }

    fn write_outliers(&mut self, track: &Track, outliers: &[RawPoint]) -> Result<()> {
        let tx = self.db.transaction()?;
        Self::store_track(&tx, track)?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT OR REPLACE INTO outliers (track_id, ts, lat, lon, alt, spd)
                 VALUES (?, ?, ?, ?, ?, ?)",
            )?;
            for o in outliers {
                stmt.execute(params![track.id, o.ts, o.lat, o.lon, o.alt, o.spd])?;
            }
        }
        tx.commit()?;
        Ok(())
    }
}
