// Copyright @yucwang 2026

use crate::math::constants::Float;

use std::collections::VecDeque;

/// Number of throughput samples kept. One sample is produced per completed
/// tonemap, so this covers about 4.25 hours at the default refresh interval.
pub const PERFORMANCE_WINDOW: usize = 512;

/// Sliding window of render throughput samples, in batches per second.
pub struct PerformanceLog {
    samples: VecDeque<Float>,
}

impl PerformanceLog {
    pub fn new() -> Self {
        Self { samples: VecDeque::with_capacity(PERFORMANCE_WINDOW) }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn record(&mut self, batches_per_second: Float) {
        self.samples.push_back(batches_per_second);
        if self.samples.len() > PERFORMANCE_WINDOW {
            self.samples.pop_front();
        }
    }

    pub fn mean(&self) -> Float {
        let n = self.samples.len() as Float;
        self.samples.iter().sum::<Float>() / n
    }

    pub fn stddev(&self) -> Float {
        let n = self.samples.len() as Float;
        let mean = self.mean();
        let sqr_mean = self.samples.iter().map(|x| x * x).sum::<Float>() / n;
        (sqr_mean - mean * mean).max(0.0).sqrt()
    }

    pub fn latest(&self) -> Option<Float> {
        self.samples.back().copied()
    }
}
