//! Fixed-size overlapping batches.
//!
//! Points accumulate in a body. Each time the body holds a full batch the
//! callback sees the first `batch_size` points; the last `overlap` of them
//! stay in the body and lead the next batch, and the last `overlap` outputs
//! of the callback are handed back alongside it as boundary context.
//!
//! ```text
//! batch_size = 5, overlap = 2
//!
//! load a..g   -> on_full([a b c d e], carried 0)   body = [d e f g]
//! load h      -> on_full([d e f g h], carried 2)   body = [g h]
//! finish      -> on_full([g h],       carried 2, drain)
//! ```

use crate::error::{Result, TrackError};

/// One batch handed to the callback.
#[derive(Debug)]
pub struct Batch<'a, T, U> {
    /// Batch contents, carried overlap first
    pub points: &'a [T],
    /// Number of leading points already seen in the previous batch
    pub carried: usize,
    /// Last outputs of the previous batch
    pub prior_tail: &'a [U],
    /// True for the final call after end of stream
    pub is_drain: bool,
}

impl<'a, T, U> Batch<'a, T, U> {
    /// Points not seen by any earlier batch.
    pub fn fresh(&self) -> &'a [T] {
        &self.points[self.carried.min(self.points.len())..]
    }
}

/// Buffers points into overlapping batches. Single-use per track.
#[derive(Debug)]
pub struct BatchWindow<T, U> {
    body: Vec<T>,
    tail: Vec<U>,
    batch_size: usize,
    overlap: usize,
    carried: usize,
    batches: usize,
    drained: bool,
}

impl<T, U: Clone> BatchWindow<T, U> {
    /// Requires `0 < batch_size` and `overlap < batch_size`: an overlap equal
    /// to the batch size is rejected because no new points would ever fit.
    pub fn new(batch_size: usize, overlap: usize) -> Result<Self> {
        if batch_size == 0 {
            return Err(TrackError::config("batch size must be positive"));
        }
        if overlap > batch_size {
            return Err(TrackError::config(format!(
                "overlap {} exceeds batch size {}",
                overlap, batch_size
            )));
        }
        // A batch made only of carried points would never advance
        if overlap == batch_size {
            return Err(TrackError::config(format!(
                "overlap {} must leave room for new points in a batch of {}",
                overlap, batch_size
            )));
        }
        Ok(Self {
            body: Vec::with_capacity(batch_size),
            tail: Vec::with_capacity(overlap),
            batch_size,
            overlap,
            carried: 0,
            batches: 0,
            drained: false,
        })
    }

    /// Append points and emit every full batch.
    pub fn load<I, F>(&mut self, points: I, mut on_full: F) -> Result<()>
    where
        I: IntoIterator<Item = T>,
        F: FnMut(Batch<'_, T, U>) -> Result<Vec<U>>,
    {
        if self.drained {
            return Err(TrackError::config("batch window already drained"));
        }
        self.body.extend(points);

        while self.body.len() >= self.batch_size {
            let output = on_full(Batch {
                points: &self.body[..self.batch_size],
                carried: self.carried,
                prior_tail: &self.tail,
                is_drain: false,
            })?;
            self.batches += 1;

            let keep_from = output.len().saturating_sub(self.overlap);
            self.tail = output[keep_from..].to_vec();
            self.body.drain(..self.batch_size - self.overlap);
            self.carried = self.overlap;
        }
        Ok(())
    }

    /// End of stream: emit whatever remains exactly once, with no overlap kept.
    pub fn finish<F>(&mut self, mut on_full: F) -> Result<Vec<U>>
    where
        F: FnMut(Batch<'_, T, U>) -> Result<Vec<U>>,
    {
        if self.drained {
            return Err(TrackError::config("batch window already drained"));
        }
        self.drained = true;

        let output = on_full(Batch {
            points: &self.body,
            carried: self.carried,
            prior_tail: &self.tail,
            is_drain: true,
        })?;
        self.batches += 1;

        self.body.clear();
        self.tail.clear();
        self.carried = 0;
        Ok(output)
    }

    /// Points waiting for the next batch, carried overlap included.
    pub fn body_len(&self) -> usize {
        self.body.len()
    }

    /// Outputs kept from the last batch.
    pub fn tail(&self) -> &[U] {
        &self.tail
    }

    /// Number of callback invocations so far.
    pub fn batches(&self) -> usize {
        self.batches
    }

    pub fn is_drained(&self) -> bool {
        self.drained
    }
}
