//! Half-open time windows `[min, max)` bounding one paginated sweep

use std::fmt;

use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub min: DateTime<Utc>,
    pub max: DateTime<Utc>,
}

impl Window {
    pub fn new(min: DateTime<Utc>, max: DateTime<Utc>) -> Self {
        Self { min, max }
    }

    pub fn is_empty(&self) -> bool {
        self.min >= self.max
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        self.min <= ts && ts < self.max
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.min.to_rfc3339(), self.max.to_rfc3339())
    }
}

/// Successive windows from `start` up to `stop`, each at most `size` long.
///
/// `stop` is captured once by the caller; the last window ends exactly there.
#[derive(Debug, Clone)]
pub struct Windows {
    cursor: DateTime<Utc>,
    stop: DateTime<Utc>,
    size: chrono::Duration,
}

impl Windows {
    pub fn new(start: DateTime<Utc>, stop: DateTime<Utc>, size: chrono::Duration) -> Self {
        Self {
            cursor: start,
            stop,
            size,
        }
    }
}

impl Iterator for Windows {
    type Item = Window;

    fn next(&mut self) -> Option<Window> {
        if self.cursor >= self.stop {
            return None;
        }
        // A non-positive size degenerates to one window covering the rest
        let max = if self.size > chrono::Duration::zero() {
            self.cursor
                .checked_add_signed(self.size)
                .map_or(self.stop, |end| end.min(self.stop))
        } else {
            self.stop
        };
        let window = Window::new(self.cursor, max);
        self.cursor = max;
        Some(window)
    }
}

impl std::iter::FusedIterator for Windows {}
