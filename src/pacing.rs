//! Wall-clock pacing between browser operations.
//!
//! All human-emulation sleeps go through the [`Pacing`] trait so tests can
//! swap in a zero-delay policy.

use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;

/// The suspension points the pipeline paces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pace {
    /// After navigating to a harvested URL, before touching the page
    Settle,
    /// Between results-page scroll batches
    ScrollPause,
    /// After clicking a next-page control
    PageLoad,
    /// Just before an in-page interaction (click, form submit)
    PreAction,
    /// The dwell activity itself
    Dwell,
    /// Between keywords
    BetweenKeywords,
}

/// A pacing policy. Returns the duration actually waited so callers can
/// report it.
#[async_trait]
pub trait Pacing: Send + Sync {
    async fn wait(&self, pace: Pace) -> Duration;
}

/// Randomized human-like pacing with configured bounds.
pub struct HumanPacing {
    pub scroll_pause_ms: (u64, u64),
    pub settle_ms: (u64, u64),
    pub dwell_secs: (u64, u64),
}

impl HumanPacing {
    pub fn new(config: &crate::AppConfig) -> Self {
        Self {
            scroll_pause_ms: (config.scroll_pause_min_ms, config.scroll_pause_max_ms),
            settle_ms: (config.settle_min_ms, config.settle_max_ms),
            dwell_secs: (config.dwell_min_secs, config.dwell_max_secs),
        }
    }

    fn pick(&self, pace: Pace) -> Duration {
        let (min_ms, max_ms) = match pace {
            Pace::Settle => self.settle_ms,
            Pace::ScrollPause => self.scroll_pause_ms,
            Pace::PageLoad => (3000, 3000),
            Pace::PreAction => (300, 1000),
            Pace::Dwell => (self.dwell_secs.0 * 1000, self.dwell_secs.1 * 1000),
            Pace::BetweenKeywords => (2000, 5000),
        };

        if max_ms <= min_ms {
            return Duration::from_millis(min_ms);
        }
        let ms = rand::thread_rng().gen_range(min_ms..=max_ms);
        Duration::from_millis(ms)
    }
}

#[async_trait]
impl Pacing for HumanPacing {
    async fn wait(&self, pace: Pace) -> Duration {
        let duration = self.pick(pace);
        tokio::time::sleep(duration).await;
        duration
    }
}

/// Zero-delay policy for tests.
pub struct NoDelay;

#[async_trait]
impl Pacing for NoDelay {
    async fn wait(&self, _pace: Pace) -> Duration {
        Duration::ZERO
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn picked_durations_stay_within_bounds() {
        let pacing = HumanPacing {
            scroll_pause_ms: (10, 20),
            settle_ms: (5, 6),
            dwell_secs: (1, 2),
        };
        for _ in 0..50 {
            let d = pacing.pick(Pace::ScrollPause).as_millis() as u64;
            assert!((10..=20).contains(&d));
            let d = pacing.pick(Pace::Dwell).as_millis() as u64;
            assert!((1000..=2000).contains(&d));
        }
    }

    #[test]
    fn degenerate_range_returns_the_minimum() {
        let pacing = HumanPacing {
            scroll_pause_ms: (30, 30),
            settle_ms: (0, 0),
            dwell_secs: (0, 0),
        };
        assert_eq!(pacing.pick(Pace::ScrollPause).as_millis(), 30);
    }

    #[tokio::test]
    async fn no_delay_reports_zero() {
        assert_eq!(NoDelay.wait(Pace::Dwell).await, Duration::ZERO);
    }
}
