//! # Network Simulation
//!
//! Latency, jitter and loss between two in-process endpoints.
//!
//! ## Features
//!
//! - Preset link conditions from LAN to mobile
//! - Delay lines keyed by simulation time, so runs are repeatable
//! - Ordered lines for reliable traffic, lossy ones for unreliable
//!
//! Randomness is supplied by the caller as raw `u32` draws; this module
//! never seeds anything itself.

use std::collections::VecDeque;

/// Network conditions for simulation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NetworkConditions {
    /// One-way base latency in milliseconds.
    pub base_latency_ms: u32,
    /// Jitter (variance) in milliseconds.
    pub jitter_ms: u32,
    /// Packet loss percentage (0-100). Ordered lines ignore it.
    pub packet_loss_percent: u8,
}

impl NetworkConditions {
    /// LAN.
    pub const PERFECT: Self = Self { base_latency_ms: 1, jitter_ms: 0, packet_loss_percent: 0 };

    /// Fiber.
    pub const GOOD: Self = Self { base_latency_ms: 10, jitter_ms: 2, packet_loss_percent: 0 };

    /// Cable.
    pub const AVERAGE: Self = Self { base_latency_ms: 30, jitter_ms: 10, packet_loss_percent: 1 };

    /// Mobile or congested wifi.
    pub const POOR: Self = Self { base_latency_ms: 80, jitter_ms: 40, packet_loss_percent: 5 };

    /// Looks up a preset by name.
    #[must_use]
    pub fn preset(name: &str) -> Option<Self> {
        match name {
            "perfect" => Some(Self::PERFECT),
            "good" => Some(Self::GOOD),
            "average" => Some(Self::AVERAGE),
            "poor" => Some(Self::POOR),
            _ => None,
        }
    }

    /// One-way latency in seconds for a random draw.
    #[must_use]
    pub fn generate_latency(&self, rng_value: u32) -> f64 {
        let jitter = if self.jitter_ms > 0 {
            i64::from(rng_value % self.jitter_ms.saturating_mul(2)) - i64::from(self.jitter_ms)
        } else {
            0
        };
        let ms = (i64::from(self.base_latency_ms) + jitter).max(0);
        #[allow(clippy::cast_precision_loss)]
        let seconds = ms as f64 / 1000.0;
        seconds
    }

    /// True if the packet is lost for a random draw.
    #[must_use]
    pub fn should_drop(&self, rng_value: u32) -> bool {
        (rng_value % 100) < u32::from(self.packet_loss_percent)
    }

    /// Expected round trip in milliseconds, ignoring jitter.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn nominal_rtt_ms(&self) -> f32 {
        self.base_latency_ms.saturating_mul(2) as f32
    }
}

impl Default for NetworkConditions {
    fn default() -> Self {
        Self::AVERAGE
    }
}

/// Delivery discipline of a [`DelayLine`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Delivery {
    /// Never drops; a message is never delivered before an earlier one.
    Ordered,
    /// May drop and reorder.
    Lossy,
}

/// Delay-line statistics.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LinkStats {
    /// Messages accepted for transit.
    pub sent: u64,
    /// Messages lost.
    pub dropped: u64,
    /// Messages delivered.
    pub delivered: u64,
}

/// One direction of a simulated link.
#[derive(Clone, Debug)]
pub struct DelayLine<M> {
    conditions: NetworkConditions,
    delivery: Delivery,
    in_flight: VecDeque<(f64, M)>,
    last_due: f64,
    stats: LinkStats,
}

impl<M> DelayLine<M> {
    /// Creates an empty line.
    #[must_use]
    pub const fn new(conditions: NetworkConditions, delivery: Delivery) -> Self {
        Self {
            conditions,
            delivery,
            in_flight: VecDeque::new(),
            last_due: f64::NEG_INFINITY,
            stats: LinkStats { sent: 0, dropped: 0, delivered: 0 },
        }
    }

    /// Puts `message` on the wire at simulation time `now`.
    ///
    /// `latency_draw` and `loss_draw` are raw random values. Returns false if
    /// the message was lost.
    pub fn send(&mut self, now: f64, message: M, latency_draw: u32, loss_draw: u32) -> bool {
        self.stats.sent += 1;
        let mut due = now + self.conditions.generate_latency(latency_draw);

        match self.delivery {
            Delivery::Ordered => {
                due = due.max(self.last_due);
                self.last_due = due;
                self.in_flight.push_back((due, message));
            }
            Delivery::Lossy => {
                if self.conditions.should_drop(loss_draw) {
                    self.stats.dropped += 1;
                    return false;
                }
                let at = self.in_flight.partition_point(|(t, _)| *t <= due);
                self.in_flight.insert(at, (due, message));
            }
        }
        true
    }

    /// Hands every message due by `now` to `deliver`, in arrival order.
    pub fn deliver_due(&mut self, now: f64, mut deliver: impl FnMut(M)) -> usize {
        let mut count = 0;
        while self.in_flight.front().is_some_and(|(due, _)| *due <= now) {
            if let Some((_, message)) = self.in_flight.pop_front() {
                deliver(message);
                count += 1;
            }
        }
        self.stats.delivered += count as u64;
        count
    }

    /// Messages still in transit.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Line statistics.
    #[must_use]
    pub const fn stats(&self) -> LinkStats {
        self.stats
    }

    /// Conditions this line simulates.
    #[must_use]
    pub const fn conditions(&self) -> NetworkConditions {
        self.conditions
    }
}
