//! Round-trip ping tracking per connection.

use crate::integration::PingSource;

/// Smoothed round-trip time for one connection.
///
/// Samples fold into a 15/16 rolling average; the first sample is taken
/// as-is. Reports `None` until something has been measured.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PingTracker {
    average_ms: Option<f32>,
    samples: u64,
}

impl PingTracker {
    /// Creates an empty tracker.
    #[must_use]
    pub const fn new() -> Self {
        Self { average_ms: None, samples: 0 }
    }

    /// Folds in one round-trip sample. Non-finite or negative samples are ignored.
    pub fn record_sample(&mut self, rtt_ms: f32) {
        if !rtt_ms.is_finite() || rtt_ms < 0.0 {
            return;
        }
        self.average_ms = Some(match self.average_ms {
            Some(avg) => (avg * 15.0 + rtt_ms) / 16.0,
            None => rtt_ms,
        });
        self.samples += 1;
    }

    /// Samples folded in so far.
    #[must_use]
    pub const fn samples(&self) -> u64 {
        self.samples
    }
}

impl PingSource for PingTracker {
    fn reported_ping_ms(&self) -> Option<f32> {
        self.average_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_reports_none() {
        assert_eq!(PingTracker::new().reported_ping_ms(), None);
    }

    #[test]
    fn test_rolling_average() {
        let mut tracker = PingTracker::new();
        tracker.record_sample(80.0);
        assert_eq!(tracker.reported_ping_ms(), Some(80.0));

        tracker.record_sample(96.0);
        assert_eq!(tracker.reported_ping_ms(), Some(81.0));
        assert_eq!(tracker.samples(), 2);
    }

    #[test]
    fn test_bad_samples_ignored() {
        let mut tracker = PingTracker::new();
        tracker.record_sample(f32::NAN);
        tracker.record_sample(-5.0);
        assert_eq!(tracker.reported_ping_ms(), None);
        assert_eq!(tracker.samples(), 0);
    }
}
