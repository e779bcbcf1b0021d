//! Per-domain rate limiting with adaptive backoff
//!
//! The baseline delay is the configured delay or the robots.txt crawl-delay,
//! whichever is larger, capped at `max_delay`, plus a share of the average
//! response latency. Each failure or 429/503 raises the backoff level; the
//! backoff never shrinks until `reset_after_successes` consecutive successes
//! return the domain to baseline.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;

use crate::config::PolitenessConfig;

/// Weight of the newest sample in the latency moving average
const LATENCY_EMA_ALPHA: f64 = 0.2;

/// Persisted part of a domain's throttle
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RateLimitState {
    pub backoff_level: u32,
    pub success_streak: u32,
    pub current_backoff_ms: u64,
    pub avg_latency_ms: Option<f64>,
}

impl RateLimitState {
    pub fn is_backing_off(&self) -> bool {
        self.backoff_level > 0
    }
}

/// Runtime throttle for one domain
#[derive(Debug)]
pub struct Throttle {
    config: PolitenessConfig,
    state: RateLimitState,
    crawl_delay: Option<Duration>,
    next_allowed: Option<Instant>,
}

impl Throttle {
    pub fn new(config: &PolitenessConfig, state: RateLimitState) -> Self {
        Self {
            config: config.clone(),
            state,
            crawl_delay: None,
            next_allowed: None,
        }
    }

    pub fn state(&self) -> &RateLimitState {
        &self.state
    }

    pub fn set_crawl_delay(&mut self, delay: Option<Duration>) {
        self.crawl_delay = delay;
    }

    /// Delay between fetches when the domain is healthy
    pub fn baseline(&self) -> Duration {
        let configured = self
            .crawl_delay
            .map_or(self.config.default_delay(), |d| d.max(self.config.default_delay()))
            .min(self.config.max_delay());
        let latency_ms = self.state.avg_latency_ms.unwrap_or(0.0) * self.config.latency_factor;
        configured + Duration::from_millis(latency_ms.max(0.0).round() as u64)
    }

    /// Delay applied after the most recent fetch, without jitter
    pub fn current_delay(&self) -> Duration {
        let baseline = self.baseline();
        if self.state.is_backing_off() {
            baseline.max(Duration::from_millis(self.state.current_backoff_ms))
        } else {
            baseline
        }
    }

    /// Time left before the next fetch may start
    pub fn wait_time(&self) -> Option<Duration> {
        let next = self.next_allowed?;
        let now = Instant::now();
        (next > now).then(|| next - now)
    }

    pub fn record_success(&mut self, latency: Duration) {
        let sample = latency.as_secs_f64() * 1000.0;
        self.state.avg_latency_ms = Some(match self.state.avg_latency_ms {
            Some(avg) => avg + LATENCY_EMA_ALPHA * (sample - avg),
            None => sample,
        });

        self.state.success_streak += 1;
        if self.state.is_backing_off() && self.state.success_streak >= self.config.reset_after_successes {
            self.state.backoff_level = 0;
            self.state.current_backoff_ms = 0;
        }
        self.schedule_next();
    }

    /// Raise the backoff level. `retry_after` is honored up to `max_backoff`.
    pub fn record_failure(&mut self, retry_after: Option<Duration>) -> Duration {
        self.state.success_streak = 0;
        self.state.backoff_level = self.state.backoff_level.saturating_add(1);

        let shift = (self.state.backoff_level - 1).min(32);
        let exponential = self.config.backoff_base_ms.saturating_mul(1u64 << shift);
        let requested = retry_after.map_or(0, |d| d.as_millis() as u64);
        self.state.current_backoff_ms = exponential
            .max(requested)
            .max(self.state.current_backoff_ms)
            .min(self.config.max_backoff_ms);

        self.schedule_next();
        self.current_delay()
    }

    /// A fetch that neither succeeded nor calls for backoff (404, DNS).
    /// The current delay still applies before the next one.
    pub fn record_attempt(&mut self) {
        self.schedule_next();
    }

    fn schedule_next(&mut self) {
        let jitter = if self.config.jitter_ms > 0 {
            Duration::from_millis(rand::thread_rng().gen_range(0..self.config.jitter_ms))
        } else {
            Duration::ZERO
        };
        self.next_allowed = Some(Instant::now() + self.current_delay() + jitter);
    }
}
