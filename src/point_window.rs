//! Two-sided point buffer around a single advancing target.
//!
//! ```text
//!   tail (processed)        target        head (unprocessed)
//! [ ... p7 p8 p9 ]  <-  [ p10 ]  <-  [ p11 p12 p13 ... ]
//! ```
//!
//! `process` moves the target into the tail and pulls the next point out of
//! the head, but only while the head still holds more than
//! `min_head_length` points, so forward windows see their full lookahead.
//! Once draining, the lookahead requirement is dropped and the remaining
//! points are processed with shorter forward windows.
//!
//! Lifecycle: empty -> loading/ready -> draining -> exhausted.

use std::collections::VecDeque;

use log::debug;

use crate::{ExtendedPoint, PipelineConfig, WindowDirection, WindowKey};

/// Head/tail buffer with a target cursor.
#[derive(Debug)]
pub struct PointWindow {
    head: VecDeque<ExtendedPoint>,
    tail: VecDeque<ExtendedPoint>,
    target: Option<ExtendedPoint>,
    min_head_length: usize,
    tail_capacity: usize,
    drain: bool,
}

impl PointWindow {
    /// Create a window requiring `min_head_length` upcoming points before a
    /// target is processed, keeping at most `tail_capacity` processed points.
    pub fn new(min_head_length: usize, tail_capacity: usize) -> Self {
        Self {
            head: VecDeque::new(),
            tail: VecDeque::with_capacity(tail_capacity + 1),
            target: None,
            min_head_length,
            tail_capacity,
            drain: false,
        }
    }

    /// Size the window for the configured keys.
    pub fn for_config(config: &PipelineConfig) -> Self {
        Self::new(config.head_length(), config.max_window_size())
    }

    /// Append unprocessed points in temporal order.
    pub fn load_points<I>(&mut self, points: I)
    where
        I: IntoIterator<Item = ExtendedPoint>,
    {
        self.head.extend(points);
    }

    /// Advance the target.
    ///
    /// Returns true when a new target is set. Returns false when more input
    /// is needed (not draining) or when every point has been processed.
    pub fn process(&mut self) -> bool {
        if let Some(done) = self.target.take() {
            self.tail.push_back(done);
            while self.tail.len() > self.tail_capacity {
                self.tail.pop_front();
            }
        }

        if self.drain && self.head.is_empty() {
            return false;
        }
        if self.drain || self.head.len() > self.min_head_length {
            self.target = self.head.pop_front();
            return self.target.is_some();
        }
        false
    }

    /// Points forming the window `key` around the current target.
    ///
    /// Always contains the target. Near stream boundaries the window is
    /// shorter than `key.size()`; callers needing a full window compare
    /// lengths. Empty when no target is set.
    pub fn extract(&self, key: &WindowKey) -> Vec<&ExtendedPoint> {
        let Some(target) = self.target.as_ref() else {
            return Vec::new();
        };
        let size = key.size();

        match key.direction() {
            WindowDirection::Forward => std::iter::once(target)
                .chain(self.head.iter().take(size - 1))
                .collect(),
            WindowDirection::Backward => self
                .tail_suffix(size - 1)
                .chain(std::iter::once(target))
                .collect(),
            WindowDirection::Midpoint => {
                let split = (size - 1) / 2;
                self.tail_suffix(split)
                    .chain(std::iter::once(target))
                    .chain(self.head.iter().take(split))
                    .collect()
            }
        }
    }

    fn tail_suffix(&self, count: usize) -> impl Iterator<Item = &ExtendedPoint> {
        self.tail.iter().skip(self.tail.len().saturating_sub(count))
    }

    /// No further input will arrive; flush despite unmet lookahead.
    pub fn set_drain(&mut self) {
        if !self.drain {
            debug!(
                "[PointWindow] Draining {} buffered points",
                self.head.len() + usize::from(self.target.is_some())
            );
        }
        self.drain = true;
    }

    pub fn is_draining(&self) -> bool {
        self.drain
    }

    /// Draining and nothing left to process.
    pub fn is_exhausted(&self) -> bool {
        self.drain && self.head.is_empty() && self.target.is_none()
    }

    pub fn target(&self) -> Option<&ExtendedPoint> {
        self.target.as_ref()
    }

    pub fn target_mut(&mut self) -> Option<&mut ExtendedPoint> {
        self.target.as_mut()
    }

    pub fn head_len(&self) -> usize {
        self.head.len()
    }

    pub fn tail_len(&self) -> usize {
        self.tail.len()
    }

    pub fn min_head_length(&self) -> usize {
        self.min_head_length
    }

    /// Drop everything buffered without processing it.
    pub fn discard(&mut self) -> usize {
        let dropped = self.head.len() + usize::from(self.target.is_some());
        self.head.clear();
        self.tail.clear();
        self.target = None;
        dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RawPoint;

    fn points(count: i64) -> Vec<ExtendedPoint> {
        (0..count)
            .map(|i| ExtendedPoint::from_raw(&RawPoint::new(i + 1, 46.0, 7.0, i, 10.0), (0, i)))
            .collect()
    }

    fn ts(window: &[&ExtendedPoint]) -> Vec<i64> {
        window.iter().map(|p| p.ts).collect()
    }

    #[test]
    fn test_process_respects_lookahead_then_drains() {
        let mut window = PointWindow::new(10, 5);
        window.load_points(points(20));

        let mut advanced = 0;
        while window.process() {
            advanced += 1;
        }
        assert_eq!(advanced, 10);
        assert_eq!(window.head_len(), 10);
        assert!(!window.is_exhausted());

        window.set_drain();
        while window.process() {
            advanced += 1;
        }
        assert_eq!(advanced, 20);
        assert!(window.is_exhausted());
        assert!(!window.process());
    }

    #[test]
    fn test_process_resumes_after_more_input() {
        let mut window = PointWindow::new(2, 5);
        let mut batch = points(6);
        let later = batch.split_off(3);

        window.load_points(batch);
        assert!(window.process());
        assert!(!window.process());
        assert_eq!(window.target().map(|p| p.ts), None);

        window.load_points(later);
        assert!(window.process());
        assert_eq!(window.target().map(|p| p.ts), Some(2));
    }

    #[test]
    fn test_tail_trimmed_to_capacity() {
        let mut window = PointWindow::new(0, 3);
        window.load_points(points(10));
        window.set_drain();
        while window.process() {}
        assert_eq!(window.tail_len(), 3);
    }

    #[test]
    fn test_extract_shapes_mid_stream() {
        let mut window = PointWindow::new(2, 5);
        window.load_points(points(10));
        for _ in 0..5 {
            assert!(window.process());
        }
        assert_eq!(window.target().map(|p| p.ts), Some(5));

        let forward = window.extract(&WindowKey::forward(3).unwrap());
        assert_eq!(ts(&forward), vec![5, 6, 7]);

        let backward = window.extract(&WindowKey::backward(3).unwrap());
        assert_eq!(ts(&backward), vec![3, 4, 5]);

        let midpoint = window.extract(&WindowKey::midpoint(5).unwrap());
        assert_eq!(ts(&midpoint), vec![3, 4, 5, 6, 7]);
    }

    #[test]
    fn test_extract_truncates_at_boundaries() {
        let mut window = PointWindow::new(0, 5);
        window.load_points(points(3));
        window.set_drain();

        assert!(window.process());
        let backward = window.extract(&WindowKey::backward(4).unwrap());
        assert_eq!(ts(&backward), vec![1]);
        let midpoint = window.extract(&WindowKey::midpoint(5).unwrap());
        assert_eq!(ts(&midpoint), vec![1, 2, 3]);

        assert!(window.process());
        assert!(window.process());
        let forward = window.extract(&WindowKey::forward(4).unwrap());
        assert_eq!(ts(&forward), vec![3]);
    }

    #[test]
    fn test_extract_length_bounds() {
        let keys: Vec<WindowKey> = ["f1", "f4", "b1", "b6", "m1", "m3", "m7"]
            .iter()
            .map(|label| label.parse().unwrap())
            .collect();

        let mut window = PointWindow::new(3, 7);
        window.load_points(points(12));
        window.set_drain();
        while window.process() {
            for key in &keys {
                let extracted = window.extract(key);
                assert!(!extracted.is_empty(), "{} empty", key);
                assert!(extracted.len() <= key.size(), "{} too long", key);
                assert!(extracted.iter().any(|p| std::ptr::eq(*p, window.target().unwrap())));
            }
        }
    }

    #[test]
    fn test_extract_without_target_is_empty() {
        let window = PointWindow::new(0, 3);
        assert!(window.extract(&WindowKey::forward(3).unwrap()).is_empty());
    }

    #[test]
    fn test_discard() {
        let mut window = PointWindow::new(1, 3);
        window.load_points(points(4));
        assert!(window.process());
        assert_eq!(window.discard(), 3);
        assert_eq!(window.head_len(), 0);
        assert_eq!(window.tail_len(), 0);
        assert!(window.target().is_none());
    }
}
