//! Injectable simulated latency.
//!
//! The resource store and the built-in manifest source await a delay before
//! every operation so development builds show realistic loading states.
//! Tests and production use `NoDelay`.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;

use crate::config::{LatencyBand, Settings};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Read,
    Write,
}

/// Chooses how long an operation waits before touching storage.
pub trait DelayStrategy: Send + Sync {
    fn delay_for(&self, op: Operation) -> Duration;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoDelay;

impl DelayStrategy for NoDelay {
    fn delay_for(&self, _op: Operation) -> Duration {
        Duration::ZERO
    }
}

/// Uniformly random delay from a per-operation band.
#[derive(Debug, Clone, Copy)]
pub struct RandomDelay {
    read: LatencyBand,
    write: LatencyBand,
}

impl RandomDelay {
    pub fn new(read: LatencyBand, write: LatencyBand) -> Self {
        Self {
            read: read.normalized(),
            write: write.normalized(),
        }
    }
}

impl DelayStrategy for RandomDelay {
    fn delay_for(&self, op: Operation) -> Duration {
        let band = match op {
            Operation::Read => self.read,
            Operation::Write => self.write,
        };
        let ms = rand::thread_rng().gen_range(band.min_ms..=band.max_ms);
        Duration::from_millis(ms)
    }
}

/// Delay strategy selected by `simulate_latency`.
pub fn from_settings(settings: &Settings) -> Arc<dyn DelayStrategy> {
    if settings.simulate_latency {
        Arc::new(RandomDelay::new(settings.read_latency_ms, settings.write_latency_ms))
    } else {
        Arc::new(NoDelay)
    }
}

/// Wait out the delay chosen for `op`.
pub async fn simulate(strategy: &dyn DelayStrategy, op: Operation) {
    let delay = strategy.delay_for(op);
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_delay_within_band() {
        let strategy = RandomDelay::new(LatencyBand::new(200, 800), LatencyBand::new(300, 1000));
        for _ in 0..100 {
            let read = strategy.delay_for(Operation::Read);
            assert!(read >= Duration::from_millis(200) && read <= Duration::from_millis(800));
            let write = strategy.delay_for(Operation::Write);
            assert!(write >= Duration::from_millis(300) && write <= Duration::from_millis(1000));
        }
    }

    #[test]
    fn test_from_settings() {
        let mut settings = Settings::default();
        settings.simulate_latency = false;
        assert_eq!(from_settings(&settings).delay_for(Operation::Write), Duration::ZERO);

        settings.simulate_latency = true;
        settings.read_latency_ms = LatencyBand::new(5, 5);
        assert_eq!(from_settings(&settings).delay_for(Operation::Read), Duration::from_millis(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_simulate_sleeps() {
        let strategy = RandomDelay::new(LatencyBand::new(500, 500), LatencyBand::new(500, 500));
        let start = tokio::time::Instant::now();
        simulate(&strategy, Operation::Read).await;
        assert!(start.elapsed() >= Duration::from_millis(500));
    }
}
