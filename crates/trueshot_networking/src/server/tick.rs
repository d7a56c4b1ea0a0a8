//! # Server Tick Loop
//!
//! Fixed-timestep controller for the authoritative simulation.
//!
//! ## Design
//!
//! - Wall-clock accumulator, one tick per elapsed step, for real-time runs
//! - Headless stepping for simulations and tests
//! - Each tick reports its simulation time and delta in seconds
//! - Rolling 15/16 average of tick processing time

use std::time::{Duration, Instant};

/// Timing of one executed tick.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TickTiming {
    /// Tick number, starting at 1.
    pub tick: u64,
    /// Simulation time at this tick, seconds.
    pub now: f64,
    /// Simulation time since the previous tick, seconds.
    pub delta: f64,
}

/// Tick timing statistics.
#[derive(Clone, Copy, Debug, Default)]
pub struct TickStats {
    /// Minimum tick duration observed.
    pub min_tick_us: u64,
    /// Maximum tick duration observed.
    pub max_tick_us: u64,
    /// Average tick duration (rolling).
    pub avg_tick_us: u64,
    /// Ticks that overran their budget.
    pub late_ticks: u64,
    /// Total ticks measured.
    pub total_ticks: u64,
}

/// Fixed-timestep tick loop controller.
pub struct TickLoop {
    tick_duration: Duration,
    last_poll: Instant,
    accumulator: Duration,
    tick_count: u64,
    stats: TickStats,
}

impl TickLoop {
    /// Creates a tick loop at `tick_rate` ticks per second.
    #[must_use]
    pub fn new(tick_rate: u32) -> Self {
        let tick_duration = Duration::from_micros(1_000_000 / u64::from(tick_rate.max(1)));
        #[allow(clippy::cast_possible_truncation)]
        let budget_us = tick_duration.as_micros() as u64;
        Self {
            tick_duration,
            last_poll: Instant::now(),
            accumulator: Duration::ZERO,
            tick_count: 0,
            stats: TickStats {
                min_tick_us: u64::MAX,
                max_tick_us: 0,
                avg_tick_us: budget_us,
                late_ticks: 0,
                total_ticks: 0,
            },
        }
    }

    /// Adds wall-clock time elapsed since the last poll. True if a tick is due.
    #[must_use]
    pub fn should_tick(&mut self) -> bool {
        let now = Instant::now();
        self.accumulator += now.duration_since(self.last_poll);
        self.last_poll = now;
        self.accumulator >= self.tick_duration
    }

    /// Consumes one step from the accumulator and returns its timing.
    pub fn begin_tick(&mut self) -> (TickTiming, Instant) {
        self.accumulator = self.accumulator.saturating_sub(self.tick_duration);
        (self.advance(), Instant::now())
    }

    /// Steps simulation time without consulting the wall clock.
    ///
    /// For headless runs and tests.
    pub fn step(&mut self) -> TickTiming {
        self.advance()
    }

    fn advance(&mut self) -> TickTiming {
        self.tick_count += 1;
        let delta = self.tick_duration.as_secs_f64();
        #[allow(clippy::cast_precision_loss)]
        let now = self.tick_count as f64 * delta;
        TickTiming { tick: self.tick_count, now, delta }
    }

    /// Records how long the tick started at `start` took.
    #[allow(clippy::cast_possible_truncation)]
    pub fn end_tick(&mut self, start: Instant) {
        let duration = start.elapsed();
        let duration_us = duration.as_micros() as u64;

        self.stats.total_ticks += 1;
        self.stats.min_tick_us = self.stats.min_tick_us.min(duration_us);
        self.stats.max_tick_us = self.stats.max_tick_us.max(duration_us);
        self.stats.avg_tick_us = (self.stats.avg_tick_us * 15 + duration_us) / 16;

        if duration > self.tick_duration {
            self.stats.late_ticks += 1;
        }
    }

    /// Sleeps until roughly the next tick is due.
    pub fn wait_for_next_tick(&self) {
        let elapsed = self.last_poll.elapsed() + self.accumulator;
        if elapsed < self.tick_duration {
            std::thread::sleep(self.tick_duration - elapsed);
        }
    }

    /// Ticks executed so far.
    #[must_use]
    pub const fn tick_count(&self) -> u64 {
        self.tick_count
    }

    /// Tick statistics.
    #[must_use]
    pub const fn stats(&self) -> &TickStats {
        &self.stats
    }

    /// Target tick duration.
    #[must_use]
    pub const fn tick_duration(&self) -> Duration {
        self.tick_duration
    }
}

impl Default for TickLoop {
    fn default() -> Self {
        Self::new(60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tick_loop_creation() {
        let tick_loop = TickLoop::new(60);
        assert_eq!(tick_loop.tick_count(), 0);
        assert_eq!(tick_loop.tick_duration(), Duration::from_micros(16666));
    }

    #[test]
    fn test_step_advances_sim_time() {
        let mut tick_loop = TickLoop::new(100);
        let first = tick_loop.step();
        let second = tick_loop.step();

        assert_eq!(first.tick, 1);
        assert!((first.delta - 0.01).abs() < 1e-12);
        assert!((second.now - 0.02).abs() < 1e-12);
    }

    #[test]
    fn test_wall_clock_tick() {
        let mut tick_loop = TickLoop::new(1000);
        std::thread::sleep(Duration::from_millis(5));

        assert!(tick_loop.should_tick());
        let (timing, start) = tick_loop.begin_tick();
        tick_loop.end_tick(start);

        assert_eq!(timing.tick, 1);
        assert_eq!(tick_loop.stats().total_ticks, 1);
    }

    #[test]
    fn test_wait_paces_real_time() {
        let mut tick_loop = TickLoop::new(200);
        let begun = Instant::now();

        for _ in 0..3 {
            while !tick_loop.should_tick() {
                tick_loop.wait_for_next_tick();
            }
            let (_, start) = tick_loop.begin_tick();
            tick_loop.end_tick(start);
        }

        assert_eq!(tick_loop.tick_count(), 3);
        assert!(begun.elapsed() >= Duration::from_millis(14));
        assert_eq!(tick_loop.stats().total_ticks, 3);
    }
}
