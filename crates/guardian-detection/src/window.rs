//! Bounded FIFO window of recent metric values.

use llm_guardian_core::stats;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Fixed-capacity window of the most recent values for one metric.
///
/// Once full, every push drops the oldest value. `mean` and `std_dev` are
/// 0.0 when there is not enough data to define them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricWindow {
    values: VecDeque<f64>,
    capacity: usize,
}

impl MetricWindow {
    /// Create an empty window. A zero capacity is bumped to 1.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            values: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a value, evicting the oldest if over capacity
    pub fn push(&mut self, value: f64) {
        self.values.push_back(value);
        while self.values.len() > self.capacity {
            self.values.pop_front();
        }
        self.values.make_contiguous();
    }

    /// Contiguous view of the window; `push` keeps the buffer unwrapped
    fn as_slice(&self) -> &[f64] {
        self.values.as_slices().0
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.values.len() == self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }

    /// Values in insertion order, oldest first
    pub fn values(&self) -> Vec<f64> {
        self.as_slice().to_vec()
    }

    /// Arithmetic mean; 0.0 when empty
    pub fn mean(&self) -> f64 {
        stats::mean(self.as_slice())
    }

    /// Sample standard deviation (divisor `n - 1`); 0.0 below 2 samples
    pub fn std_dev(&self) -> f64 {
        stats::std_dev(self.as_slice())
    }

    /// Smallest value (0.0 when empty)
    pub fn min(&self) -> f64 {
        if self.values.is_empty() {
            return 0.0;
        }
        self.values.iter().copied().fold(f64::INFINITY, f64::min)
    }

    /// Largest value (0.0 when empty)
    pub fn max(&self) -> f64 {
        if self.values.is_empty() {
            return 0.0;
        }
        self.values.iter().copied().fold(f64::NEG_INFINITY, f64::max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_empty_window() {
        let window = MetricWindow::new(10);
        assert!(window.is_empty());
        assert_eq!(window.mean(), 0.0);
        assert_eq!(window.std_dev(), 0.0);
        assert_eq!(window.min(), 0.0);
        assert_eq!(window.max(), 0.0);
    }

    #[test]
    fn test_single_value_has_zero_std() {
        let mut window = MetricWindow::new(10);
        window.push(5.0);
        assert_eq!(window.mean(), 5.0);
        assert_eq!(window.std_dev(), 0.0);
    }

    #[test]
    fn test_sample_std_dev() {
        let mut window = MetricWindow::new(10);
        for v in [1.0, 2.0, 3.0, 4.0] {
            window.push(v);
        }
        assert_eq!(window.mean(), 2.5);
        // sample variance = 5 / 3
        assert!((window.std_dev() - (5.0f64 / 3.0).sqrt()).abs() < 1e-12);
        assert_eq!(window.min(), 1.0);
        assert_eq!(window.max(), 4.0);
    }

    #[test]
    fn test_fifo_eviction() {
        let mut window = MetricWindow::new(3);
        for v in 1..=5 {
            window.push(v as f64);
        }
        assert!(window.is_full());
        assert_eq!(window.values(), vec![3.0, 4.0, 5.0]);
    }

    #[test]
    fn test_moments_after_wraparound_match_core_helpers() {
        let mut window = MetricWindow::new(4);
        for v in [9.0, 9.0, 1.0, 2.0, 3.0, 10.0] {
            window.push(v);
        }
        let expected = [1.0, 2.0, 3.0, 10.0];
        assert_eq!(window.values(), expected);
        assert_eq!(window.mean(), stats::mean(&expected));
        assert_eq!(window.std_dev(), stats::std_dev(&expected));
        assert_eq!(window.mean(), 4.0);
    }

    proptest! {
        #[test]
        fn prop_window_keeps_last_c_values(
            capacity in 1usize..50,
            values in proptest::collection::vec(-1e6f64..1e6, 0..200),
        ) {
            let mut window = MetricWindow::new(capacity);
            for v in &values {
                window.push(*v);
            }
            prop_assert!(window.len() <= capacity);
            let expected: Vec<f64> = values
                .iter()
                .skip(values.len().saturating_sub(capacity))
                .copied()
                .collect();
            prop_assert_eq!(window.mean(), stats::mean(&expected));
            prop_assert_eq!(window.std_dev(), stats::std_dev(&expected));
            prop_assert_eq!(window.values(), expected);
        }
    }
}
