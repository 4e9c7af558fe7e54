//! `rad_pps`-style packets-per-second smoothing, used solely for admission
//! control and stat reporting.

use std::time::Duration;

/// Two rolling one-second buckets blended by how far into the current
/// second the caller is. Cheap, allocation-free, and deterministic given a
/// fixed `elapsed` clock so it can be driven by tests without sleeping.
#[derive(Debug, Default, Clone, Copy)]
pub struct PpsCounter {
    pps_old: u32,
    pps_now: u32,
    time_old: u64,
}

impl PpsCounter {
    pub fn new() -> Self {
        Self::default()
    }

    fn roll(&mut self, secs: u64) {
        if secs != self.time_old {
            self.pps_old = self.pps_now;
            self.pps_now = 0;
            self.time_old = secs;
        }
    }

    /// Record one sample at `elapsed` (time since some fixed epoch, e.g.
    /// the pool's start time).
    pub fn sample(&mut self, elapsed: Duration) {
        self.roll(elapsed.as_secs());
        self.pps_now += 1;
    }

    /// The smoothed rate at `elapsed`: a blend of the last full second
    /// (`pps_old`) and the current, still-accumulating one (`pps_now`),
    /// weighted by how far into the current second we are. If no sample
    /// has landed in over a second, traffic is treated as having stopped.
    pub fn rate(&self, elapsed: Duration) -> f64 {
        let secs = elapsed.as_secs();
        if secs != self.time_old {
            return 0.0;
        }
        let frac = (elapsed.as_secs_f64() - secs as f64).clamp(0.0, 1.0);
        self.pps_old as f64 * (1.0 - frac) + self.pps_now as f64 * frac
    }
}
