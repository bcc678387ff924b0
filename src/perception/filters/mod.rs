//! Filtering algorithms for sensor data

use std::collections::VecDeque;

/// A generic filter interface
pub trait Filter<T> {
    /// Feed one sample and return the filtered value
    fn filter(&mut self, input: T) -> T;

    /// Forget all history
    fn reset(&mut self);
}

/// Rolling minimum over the last `capacity` samples.
///
/// Short false echoes are rare compared to missed echoes, so the minimum of a
/// short window rejects spurious long readings while tracking approaching walls.
#[derive(Debug, Clone)]
pub struct RollingMinimum {
    capacity: usize,
    window: VecDeque<i32>,
}

impl RollingMinimum {
    /// Create an empty window holding up to `capacity` samples
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        RollingMinimum {
            capacity,
            window: VecDeque::with_capacity(capacity),
        }
    }

    /// Maximum samples held
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Samples currently held
    pub fn len(&self) -> usize {
        self.window.len()
    }

    /// Whether the window holds no samples
    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    /// Replace the window contents with fresh samples
    pub fn prime<I: IntoIterator<Item = i32>>(&mut self, samples: I) {
        self.reset();
        for sample in samples {
            self.push(sample);
        }
    }

    /// Samples currently held, oldest first
    pub fn samples(&self) -> impl Iterator<Item = i32> + '_ {
        self.window.iter().copied()
    }

    fn push(&mut self, sample: i32) {
        if self.window.len() == self.capacity {
            self.window.pop_front();
        }
        self.window.push_back(sample);
    }
}

impl Filter<i32> for RollingMinimum {
    /// Minimum of `input` and the held window; `input` then joins the window
    fn filter(&mut self, input: i32) -> i32 {
        let minimum = self.window.iter().copied().fold(input, i32::min);
        self.push(input);
        minimum
    }

    fn reset(&mut self) {
        self.window.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_window_passes_input_through() {
        let mut filter = RollingMinimum::new(5);
        assert_eq!(filter.filter(40), 40);
    }

    #[test]
    fn minimum_never_exceeds_raw_or_recent_window() {
        let inputs = [80, 30, 255, 255, 90, 70, 255, 20, 60, 60, 60, 60, 60, 60];
        let mut filter = RollingMinimum::new(5);
        let mut history: Vec<i32> = Vec::new();

        for raw in inputs {
            let recent_min = history.iter().rev().take(5).copied().min().unwrap_or(raw);
            let filtered = filter.filter(raw);
            assert!(filtered <= raw);
            assert!(filtered <= recent_min);
            assert_eq!(filtered, recent_min.min(raw));
            history.push(raw);
        }
        // the 20 has aged out of the window
        assert_eq!(filter.filter(60), 60);
    }

    #[test]
    fn prime_discards_older_history() {
        let mut filter = RollingMinimum::new(3);
        filter.prime([5, 5, 5]);
        filter.prime([50, 60, 70]);
        assert_eq!(filter.samples().collect::<Vec<_>>(), vec![50, 60, 70]);
        assert_eq!(filter.filter(90), 50);
    }

    #[test]
    fn window_is_bounded() {
        let mut filter = RollingMinimum::new(2);
        filter.prime([1, 2, 3, 4]);
        assert_eq!(filter.len(), 2);
        assert_eq!(filter.samples().collect::<Vec<_>>(), vec![3, 4]);
        filter.reset();
        assert!(filter.is_empty());
    }
}
