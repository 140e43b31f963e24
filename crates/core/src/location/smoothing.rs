//! Recency-weighted speed smoothing over a sliding window.

use std::collections::VecDeque;

/// Bounded FIFO window of speed samples with a linearly-weighted average.
///
/// The i-th oldest sample (1-indexed) gets weight i, so the most recent
/// sample counts the most. An empty window smooths to 0.
#[derive(Clone, Debug)]
pub struct SpeedSmoother {
    samples: VecDeque<f64>,
    capacity: usize,
}

impl SpeedSmoother {
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Add a sample, evicting the oldest when full, and return the new
    /// smoothed value.
    pub fn push(&mut self, speed: f64) -> f64 {
        self.samples.push_back(speed);
        if self.samples.len() > self.capacity {
            self.samples.pop_front();
        }
        self.smoothed()
    }

    pub fn smoothed(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }

        let mut weighted_sum = 0.0;
        let mut weight_total = 0.0;
        for (i, speed) in self.samples.iter().enumerate() {
            let weight = (i + 1) as f64;
            weighted_sum += weight * speed;
            weight_total += weight;
        }

        weighted_sum / weight_total
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn reset(&mut self) {
        self.samples.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_empty_smooths_to_zero() {
        let smoother = SpeedSmoother::new(5);
        assert_eq!(smoother.smoothed(), 0.0);
    }

    #[test]
    fn test_linear_weighting() {
        let mut smoother = SpeedSmoother::new(5);
        for speed in [1.0, 2.0, 3.0, 4.0, 5.0] {
            smoother.push(speed);
        }

        // (1*1 + 2*2 + 3*3 + 4*4 + 5*5) / (1+2+3+4+5) = 55/15
        assert_relative_eq!(smoother.smoothed(), 55.0 / 15.0);
    }

    #[test]
    fn test_fifo_eviction() {
        let mut smoother = SpeedSmoother::new(3);
        for speed in [10.0, 1.0, 2.0, 3.0] {
            smoother.push(speed);
        }

        assert_eq!(smoother.len(), 3);
        // The 10.0 sample is gone: (1*1 + 2*2 + 3*3) / 6
        assert_relative_eq!(smoother.smoothed(), 14.0 / 6.0);
    }

    #[test]
    fn test_reset() {
        let mut smoother = SpeedSmoother::new(5);
        smoother.push(3.0);
        smoother.reset();

        assert!(smoother.is_empty());
        assert_eq!(smoother.smoothed(), 0.0);
    }
}
