//! Heartbeat bookkeeping on the coordinator side.
//!
//! The worker emits `Heartbeat` on a fixed interval while it is encoding. The
//! coordinator only records when it last saw one; staleness is evaluated
//! lazily when someone asks for status.

use std::time::{Duration, Instant};

#[derive(Debug, Default, Clone)]
pub struct LivenessMonitor {
    last_heartbeat: Option<Instant>,
}

impl LivenessMonitor {
    pub fn record(&mut self) {
        self.record_at(Instant::now());
    }

    pub fn record_at(&mut self, at: Instant) {
        self.last_heartbeat = Some(at);
    }

    pub fn last_heartbeat(&self) -> Option<Instant> {
        self.last_heartbeat
    }

    /// Stale only if a heartbeat was observed and the latest one is older
    /// than `threshold`. A worker that has not heartbeated yet is not stale.
    pub fn is_stale(&self, threshold: Duration) -> bool {
        self.is_stale_at(Instant::now(), threshold)
    }

    pub fn is_stale_at(&self, now: Instant, threshold: Duration) -> bool {
        match self.last_heartbeat {
            Some(last) => now.saturating_duration_since(last) > threshold,
            None => false,
        }
    }

    pub fn reset(&mut self) {
        self.last_heartbeat = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_heartbeat_is_not_stale() {
        let monitor = LivenessMonitor::default();
        assert!(!monitor.is_stale(Duration::ZERO));
    }

    #[test]
    fn test_staleness_threshold() {
        let mut monitor = LivenessMonitor::default();
        let seen = Instant::now();
        monitor.record_at(seen);

        let threshold = Duration::from_secs(30);
        assert!(!monitor.is_stale_at(seen + Duration::from_secs(29), threshold));
        assert!(monitor.is_stale_at(seen + Duration::from_secs(31), threshold));
    }

    #[test]
    fn test_reset_forgets_heartbeat() {
        let mut monitor = LivenessMonitor::default();
        monitor.record();
        monitor.reset();
        assert!(monitor.last_heartbeat().is_none());
    }
}
