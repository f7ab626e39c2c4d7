//! Window keys: the shape of a window around a target point.
//!
//! A key is a direction plus a size counted in points, target included.
//! Keys are plain hashable values so they can index the per-point window map.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TrackError};

/// Where a window sits relative to its target point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WindowDirection {
    /// Target followed by upcoming points
    Forward,
    /// Already processed points followed by the target
    Backward,
    /// Target centered between processed and upcoming points
    Midpoint,
}

impl WindowDirection {
    fn label(self) -> char {
        match self {
            WindowDirection::Forward => 'f',
            WindowDirection::Backward => 'b',
            WindowDirection::Midpoint => 'm',
        }
    }
}

/// Immutable window shape. Construct with [`WindowKey::new`], which rejects
/// zero sizes and even-sized midpoint windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "RawWindowKey", into = "RawWindowKey")]
pub struct WindowKey {
    direction: WindowDirection,
    size: usize,
}

impl WindowKey {
    pub fn new(direction: WindowDirection, size: usize) -> Result<Self> {
        if size == 0 {
            return Err(TrackError::config(format!(
                "window size must be positive ({:?})",
                direction
            )));
        }
        if direction == WindowDirection::Midpoint && size % 2 == 0 {
            return Err(TrackError::config(format!(
                "midpoint window size must be odd, got {}",
                size
            )));
        }
        Ok(Self { direction, size })
    }

    pub fn forward(size: usize) -> Result<Self> {
        Self::new(WindowDirection::Forward, size)
    }

    pub fn backward(size: usize) -> Result<Self> {
        Self::new(WindowDirection::Backward, size)
    }

    pub fn midpoint(size: usize) -> Result<Self> {
        Self::new(WindowDirection::Midpoint, size)
    }

    pub fn direction(&self) -> WindowDirection {
        self.direction
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Number of upcoming points this window reads past its target.
    pub fn lookahead(&self) -> usize {
        match self.direction {
            WindowDirection::Forward => self.size - 1,
            WindowDirection::Backward => 0,
            WindowDirection::Midpoint => (self.size - 1) / 2,
        }
    }

    /// Number of processed points this window reads before its target.
    pub fn lookbehind(&self) -> usize {
        match self.direction {
            WindowDirection::Forward => 0,
            WindowDirection::Backward => self.size - 1,
            WindowDirection::Midpoint => (self.size - 1) / 2,
        }
    }
}

impl fmt::Display for WindowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.direction.label(), self.size)
    }
}

/// Parses compact labels such as `f5`, `b10`, `m3`.
impl FromStr for WindowKey {
    type Err = TrackError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let mut chars = s.chars();
        let direction = match chars.next().map(|c| c.to_ascii_lowercase()) {
            Some('f') => WindowDirection::Forward,
            Some('b') => WindowDirection::Backward,
            Some('m') => WindowDirection::Midpoint,
            _ => {
                return Err(TrackError::config(format!(
                    "unknown window label '{}'",
                    s
                )))
            }
        };
        let size: usize = chars
            .as_str()
            .parse()
            .map_err(|_| TrackError::config(format!("bad window size in label '{}'", s)))?;
        Self::new(direction, size)
    }
}

// Serde goes through this shadow type so deserialized keys are validated.
#[derive(Serialize, Deserialize)]
struct RawWindowKey {
    direction: WindowDirection,
    size: usize,
}

impl TryFrom<RawWindowKey> for WindowKey {
    type Error = TrackError;

    fn try_from(raw: RawWindowKey) -> Result<Self> {
        WindowKey::new(raw.direction, raw.size)
    }
}

impl From<WindowKey> for RawWindowKey {
    fn from(key: WindowKey) -> Self {
        RawWindowKey {
            direction: key.direction,
            size: key.size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_midpoint_requires_odd_size() {
        assert!(WindowKey::midpoint(3).is_ok());
        assert!(WindowKey::midpoint(1).is_ok());
        let err = WindowKey::midpoint(4).unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn test_forward_backward_accept_any_positive_size() {
        for size in 1..=8 {
            assert!(WindowKey::forward(size).is_ok());
            assert!(WindowKey::backward(size).is_ok());
        }
        assert!(WindowKey::forward(0).is_err());
        assert!(WindowKey::backward(0).is_err());
    }

    #[test]
    fn test_structural_equality_as_map_key() {
        let mut map = HashMap::new();
        map.insert(WindowKey::forward(5).unwrap(), 1);
        map.insert(WindowKey::backward(5).unwrap(), 2);

        assert_eq!(map.get(&WindowKey::forward(5).unwrap()), Some(&1));
        assert_eq!(map.get(&WindowKey::backward(5).unwrap()), Some(&2));
        assert_eq!(map.get(&WindowKey::forward(3).unwrap()), None);
    }

    #[test]
    fn test_lookahead_and_lookbehind() {
        let f = WindowKey::forward(5).unwrap();
        let b = WindowKey::backward(5).unwrap();
        let m = WindowKey::midpoint(5).unwrap();
        assert_eq!((f.lookahead(), f.lookbehind()), (4, 0));
        assert_eq!((b.lookahead(), b.lookbehind()), (0, 4));
        assert_eq!((m.lookahead(), m.lookbehind()), (2, 2));
    }

    #[test]
    fn test_labels() {
        let key: WindowKey = "m7".parse().unwrap();
        assert_eq!(key, WindowKey::midpoint(7).unwrap());
        assert_eq!(key.to_string(), "m7");
        assert_eq!("B10".parse::<WindowKey>().unwrap().to_string(), "b10");

        assert!("m4".parse::<WindowKey>().is_err());
        assert!("x3".parse::<WindowKey>().is_err());
        assert!("f".parse::<WindowKey>().is_err());
    }

    #[test]
    fn test_serde_validates() {
        let key: WindowKey = serde_json::from_str(r#"{"direction":"forward","size":3}"#).unwrap();
        assert_eq!(key, WindowKey::forward(3).unwrap());

        let json = serde_json::to_string(&WindowKey::midpoint(3).unwrap()).unwrap();
        assert_eq!(json, r#"{"direction":"midpoint","size":3}"#);

        let bad: std::result::Result<WindowKey, _> =
            serde_json::from_str(r#"{"direction":"midpoint","size":2}"#);
        assert!(bad.is_err());
    }
}
