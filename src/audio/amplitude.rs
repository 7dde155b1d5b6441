use std::collections::VecDeque;

/// Level reported when there is nothing to take a logarithm of.
pub const DB_FLOOR: f64 = -90.0;

/// Rolling window of per-frame mean amplitudes with a running sum.
#[derive(Debug, Clone)]
pub struct AmplitudeTracker {
    window: VecDeque<f64>,
    sum: f64,
    capacity: usize,
}

impl AmplitudeTracker {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            window: VecDeque::with_capacity(capacity),
            sum: 0.0,
            capacity,
        }
    }

    /// Number of frames needed to span `window_secs`, clamped to
    /// `[1, frames_per_second]`.
    pub fn capacity_for(window_secs: f64, frame_secs: f64) -> usize {
        if frame_secs.is_nan() || frame_secs <= 0.0 || !window_secs.is_finite() {
            return 1;
        }
        let per_second = (1.0 / frame_secs).round().max(1.0) as usize;
        let frames = (window_secs / frame_secs).round();
        if frames < 1.0 {
            1
        } else {
            (frames as usize).min(per_second)
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    pub fn push(&mut self, amplitude: f64) {
        while self.window.len() >= self.capacity {
            self.evict_oldest();
        }
        self.window.push_back(amplitude);
        self.sum += amplitude;
    }

    /// Resize the window to cover `window_secs` of `frame_secs` frames.
    pub fn set_window_duration(&mut self, window_secs: f64, frame_secs: f64) {
        self.set_capacity(Self::capacity_for(window_secs, frame_secs));
    }

    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity.max(1);
        while self.window.len() > self.capacity {
            self.evict_oldest();
        }
    }

    fn evict_oldest(&mut self) {
        if let Some(oldest) = self.window.pop_front() {
            self.sum -= oldest;
        }
        if self.window.is_empty() {
            // drop any accumulated rounding drift
            self.sum = 0.0;
        }
    }

    pub fn clear(&mut self) {
        self.window.clear();
        self.sum = 0.0;
    }

    /// Mean of the retained amplitudes, or 1.0 when nothing has been seen.
    pub fn mean(&self) -> f64 {
        if self.window.is_empty() {
            1.0
        } else {
            self.sum / self.window.len() as f64
        }
    }

    /// Largest retained amplitude, or `peak` when empty.
    pub fn max(&self, peak: f64) -> f64 {
        self.window.iter().copied().reduce(f64::max).unwrap_or(peak)
    }

    /// Mean level relative to `peak`, in dB.
    pub fn current_db(&self, peak: f64) -> f64 {
        level_db(self.mean(), peak)
    }
}

pub fn level_db(mean: f64, peak: f64) -> f64 {
    if mean == 0.0 || peak == 0.0 {
        DB_FLOOR
    } else {
        20.0 * (mean / peak).log10()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_tracker_reports_unit_mean() {
        let tracker = AmplitudeTracker::new(4);
        assert_eq!(tracker.mean(), 1.0);
        assert_eq!(tracker.max(32767.0), 32767.0);
    }

    #[test]
    fn running_mean_matches_recomputed_mean() {
        let mut tracker = AmplitudeTracker::new(5);
        let mut history = Vec::new();
        let mut value = 0.37f64;
        for i in 0..200 {
            value = (value * 3.9 * (1.0 - value / 1000.0) + i as f64).rem_euclid(997.0);
            tracker.push(value);
            history.push(value);

            assert!(tracker.len() <= tracker.capacity());
            let kept = &history[history.len() - tracker.len()..];
            let expected = kept.iter().sum::<f64>() / kept.len() as f64;
            assert!((tracker.mean() - expected).abs() < 1e-9 * expected.max(1.0));
        }
        assert_eq!(tracker.len(), 5);
    }

    #[test]
    fn shrinking_capacity_truncates_oldest() {
        let mut tracker = AmplitudeTracker::new(4);
        for v in [1.0, 2.0, 3.0, 4.0] {
            tracker.push(v);
        }
        tracker.set_capacity(2);
        assert_eq!(tracker.len(), 2);
        assert_eq!(tracker.mean(), 3.5);
        assert_eq!(tracker.max(0.0), 4.0);
    }

    #[test]
    fn capacity_from_durations() {
        let frame = 1024.0 / 44_100.0;
        assert_eq!(AmplitudeTracker::capacity_for(0.25, frame), 11);
        assert_eq!(AmplitudeTracker::capacity_for(0.001, frame), 1);
        // capped to roughly one second of frames
        assert_eq!(AmplitudeTracker::capacity_for(10.0, frame), 43);
    }

    #[test]
    fn db_floor_on_zero_and_monotonic_in_mean() {
        assert_eq!(level_db(0.0, 32767.0), DB_FLOOR);
        assert_eq!(level_db(10.0, 0.0), DB_FLOOR);
        assert!((level_db(32767.0, 32767.0)).abs() < 1e-12);

        let mut last = f64::NEG_INFINITY;
        for mean in [1.0, 2.0, 10.0, 100.0, 1000.0, 32767.0] {
            let db = level_db(mean, 32767.0);
            assert!(db >= last);
            last = db;
        }
    }
}
