//! Sliding time windows over per-frame samples.
//!
//! Frame rate is not uniform, so a sample is weighted by the time that
//! elapsed since the previous sample: the value observed at `t[i]` stands
//! for the interval `(t[i-1], t[i]]`, clipped to the window
//! `[now - duration, now]`. When no interval of positive length falls in the
//! window (the very first sample, or a zero-length window), the samples in
//! the window are counted unweighted instead.

use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, PartialEq)]
struct Sample {
    t: f64,
    value: f64,
}

#[derive(Debug, Clone)]
pub struct SlidingWindow {
    duration: f64,
    /// Ordered by time. The front sample may precede the window; it is kept
    /// as the left edge of the first interval.
    samples: VecDeque<Sample>,
}

impl SlidingWindow {
    pub fn new(duration: f64) -> Self {
        Self {
            duration: duration.max(0.0),
            samples: VecDeque::new(),
        }
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    /// Record a sample. Timestamps must be non-decreasing.
    pub fn push(&mut self, t: f64, value: f64) {
        self.samples.push_back(Sample { t, value });
        let start = t - self.duration;
        while self.samples.len() >= 2 && self.samples[1].t <= start {
            self.samples.pop_front();
        }
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Latest recorded value.
    pub fn last(&self) -> Option<f64> {
        self.samples.back().map(|s| s.value)
    }

    /// Time-weighted fraction of the window ending at `now` during which
    /// `pred` held. `None` before the first sample.
    pub fn fraction(&self, now: f64, pred: impl Fn(f64) -> bool) -> Option<f64> {
        let last = self.samples.back()?;
        let start = now - self.duration;

        let (mut hits, mut total) = (0.0, 0.0);
        for (prev, cur) in self.samples.iter().zip(self.samples.iter().skip(1)) {
            if cur.t <= start {
                continue;
            }
            let weight = cur.t - prev.t.max(start);
            total += weight;
            if pred(cur.value) {
                hits += weight;
            }
        }
        if total > 0.0 {
            return Some(hits / total);
        }

        let in_window: Vec<&Sample> = self.samples.iter().filter(|s| s.t >= start).collect();
        if in_window.is_empty() {
            return Some(if pred(last.value) { 1.0 } else { 0.0 });
        }
        let n = in_window.iter().filter(|s| pred(s.value)).count();
        Some(n as f64 / in_window.len() as f64)
    }

    /// Sum of `delta(previous, current)` over samples inside the window.
    pub fn sum_changes(&self, now: f64, delta: impl Fn(f64, f64) -> f64) -> f64 {
        let start = now - self.duration;
        self.samples
            .iter()
            .zip(self.samples.iter().skip(1))
            .filter(|(_, cur)| cur.t > start)
            .map(|(prev, cur)| delta(prev.value, cur.value))
            .sum()
    }
}
