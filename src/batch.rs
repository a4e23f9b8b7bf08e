//! Adaptive batch sizing for embedding requests (§4.4, §4.9). Grows the
//! batch when recent latency tracks below target, shrinks it when latency
//! overshoots, using a sliding window of the last ten observed latencies.

use std::collections::VecDeque;
use std::time::Duration;

const WINDOW: usize = 10;
const GROW_FACTOR: f64 = 1.2;
const SHRINK_FACTOR: f64 = 0.5;
const FAST_FACTOR: f64 = 2.0;

pub struct BatchOptimizer {
    min_size: usize,
    max_size: usize,
    current_size: usize,
    target_latency: Duration,
    window: VecDeque<Duration>,
}

impl BatchOptimizer {
    pub fn new(min_size: usize, max_size: usize, initial_size: usize, target_latency: Duration) -> Self {
        let current_size = initial_size.clamp(min_size, max_size.max(min_size));
        Self {
            min_size,
            max_size: max_size.max(min_size),
            current_size,
            target_latency,
            window: VecDeque::with_capacity(WINDOW),
        }
    }

    pub fn current_size(&self) -> usize {
        self.current_size
    }

    /// Records a batch's observed latency and adjusts the target size for
    /// the next batch. Latency at or above `2x` target shrinks the batch by
    /// half; latency at or below target grows it by 20%; in between, size
    /// is left unchanged.
    pub fn record(&mut self, elapsed: Duration) {
        if self.window.len() == WINDOW {
            self.window.pop_front();
        }
        self.window.push_back(elapsed);

        let avg = self.average_latency();
        let target = self.target_latency;

        if avg >= target.mul_f64(FAST_FACTOR) {
            let shrunk = (self.current_size as f64 * SHRINK_FACTOR).floor() as usize;
            self.current_size = shrunk.max(self.min_size);
        } else if avg <= target {
            let grown = (self.current_size as f64 * GROW_FACTOR).ceil() as usize;
            self.current_size = grown.min(self.max_size).max(self.current_size);
        }
    }

    fn average_latency(&self) -> Duration {
        if self.window.is_empty() {
            return Duration::ZERO;
        }
        let total: Duration = self.window.iter().sum();
        total / self.window.len() as u32
    }
}
