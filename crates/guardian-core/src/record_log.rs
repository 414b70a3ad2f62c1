//! Append-only record log with optional retention bound.
//!
//! Alerts, drift reports and remediation records are append-only. By default
//! nothing is ever dropped; a `max_retained` bound evicts the oldest entries
//! first, and [`RecordLog::drain`] lets a host hand entries off to an
//! external sink.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Append-only log of immutable records
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordLog<T> {
    entries: VecDeque<T>,
    max_retained: Option<usize>,
    /// Entries dropped because of the retention bound
    evicted: u64,
}

impl<T> Default for RecordLog<T> {
    fn default() -> Self {
        Self::unbounded()
    }
}

impl<T> RecordLog<T> {
    /// Create a log that never drops entries
    pub fn unbounded() -> Self {
        Self {
            entries: VecDeque::new(),
            max_retained: None,
            evicted: 0,
        }
    }

    /// Create a log with an optional retention bound (`None` = unbounded)
    pub fn with_retention(max_retained: Option<usize>) -> Self {
        Self {
            entries: VecDeque::new(),
            max_retained,
            evicted: 0,
        }
    }

    /// Append a record, evicting the oldest when over the bound
    pub fn push(&mut self, record: T) {
        self.entries.push_back(record);
        if let Some(max) = self.max_retained {
            while self.entries.len() > max {
                self.entries.pop_front();
                self.evicted += 1;
            }
        }
    }

    /// Remove and return every retained record, oldest first
    pub fn drain(&mut self) -> Vec<T> {
        self.entries.drain(..).collect()
    }

    /// Drop every retained record
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of records dropped by the retention bound so far
    pub fn evicted(&self) -> u64 {
        self.evicted
    }

    pub fn max_retained(&self) -> Option<usize> {
        self.max_retained
    }

    /// Most recent record
    pub fn last(&self) -> Option<&T> {
        self.entries.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.entries.iter()
    }
}

impl<T: Clone> RecordLog<T> {
    /// Copy of every retained record, oldest first
    pub fn snapshot(&self) -> Vec<T> {
        self.entries.iter().cloned().collect()
    }

    /// Copy of the `n` most recent records, oldest first
    pub fn recent(&self, n: usize) -> Vec<T> {
        let skip = self.entries.len().saturating_sub(n);
        self.entries.iter().skip(skip).cloned().collect()
    }
}
