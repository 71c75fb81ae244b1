use std::time::{Duration, Instant};

/// Rolling speed estimate and remaining-time projection (spec §4.6).
/// Grounded on the original source's per-segment speed/ETA projection in
/// `_run_task`, reimplemented with `Instant` instead of wall-clock deltas.
#[derive(Debug)]
pub struct Stats {
    started_at: Instant,
    window_start: Instant,
    window_bytes: u64,
    completed_segments: u64,
    total_elapsed: Duration,
    speed_bps: Option<f64>,
    eta_seconds: Option<f64>,
}

impl Stats {
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            started_at: now,
            window_start: now,
            window_bytes: 0,
            completed_segments: 0,
            total_elapsed: Duration::ZERO,
            speed_bps: None,
            eta_seconds: None,
        }
    }

    /// Called once per completed segment. `remaining_segments` excludes the
    /// one just completed.
    pub fn record_segment_complete(&mut self, bytes: u64, remaining_segments: u64) {
        let now = Instant::now();
        self.completed_segments += 1;
        self.window_bytes += bytes;
        self.total_elapsed = now.duration_since(self.started_at);

        // Only emit once at least a second of wall time has passed; the
        // window itself resets on read, per spec §4.6, not here.
        let window_elapsed = now.duration_since(self.window_start);
        if window_elapsed >= Duration::from_secs(1) {
            self.speed_bps = Some(self.window_bytes as f64 / window_elapsed.as_secs_f64());
        }

        if self.completed_segments > 0 {
            let avg_secs_per_segment =
                self.total_elapsed.as_secs_f64() / self.completed_segments as f64;
            self.eta_seconds = Some(avg_secs_per_segment * remaining_segments as f64);
        }
    }

    /// Returns the last computed speed and resets the tumbling window — spec
    /// §4.6: "the counter resets when it is read."
    pub fn speed_bps(&mut self) -> Option<f64> {
        let speed = self.speed_bps;
        self.window_start = Instant::now();
        self.window_bytes = 0;
        speed
    }

    pub fn eta_seconds(&self) -> Option<f64> {
        self.eta_seconds
    }
}

impl Default for Stats {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eta_undefined_before_any_segment_completes() {
        let stats = Stats::new();
        assert!(stats.eta_seconds().is_none());
    }

    #[test]
    fn eta_becomes_defined_after_first_segment() {
        let mut stats = Stats::new();
        stats.record_segment_complete(1000, 4);
        assert!(stats.eta_seconds().is_some());
    }
}
