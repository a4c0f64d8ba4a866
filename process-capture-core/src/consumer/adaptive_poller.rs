use std::collections::VecDeque;
use std::time::Duration;

use crate::models::error::CaptureError;

/// Slowest drain cadence a poller may be configured with.
pub const MAX_POLL_INTERVAL: Duration = Duration::from_secs(60);

/// Tuning for [`AdaptivePoller`].
#[derive(Debug, Clone, PartialEq)]
pub struct AdaptivePollerConfig {
    /// Fastest drain cadence (default: 1 ms).
    pub min_interval: Duration,
    /// Slowest drain cadence (default: 20 ms).
    pub max_interval: Duration,
    /// Interval before any outcome is recorded (default: 10 ms).
    pub initial_interval: Duration,
    /// Fraction of drains that should yield data (default: 0.5).
    pub target_hit_ratio: f64,
    /// Number of recent drain outcomes considered (default: 16).
    pub window: usize,
    /// Multiplier applied when draining should speed up (default: 0.8).
    pub shrink_factor: f64,
    /// Multiplier applied when draining should slow down (default: 1.2).
    pub grow_factor: f64,
}

impl AdaptivePollerConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.min_interval.is_zero() {
            return Err("minimum interval must be non-zero".into());
        }
        if self.min_interval > self.max_interval {
            return Err("minimum interval exceeds maximum interval".into());
        }
        if self.max_interval > MAX_POLL_INTERVAL {
            return Err(format!(
                "maximum interval must not exceed {}s",
                MAX_POLL_INTERVAL.as_secs()
            ));
        }
        if !(0.0..=1.0).contains(&self.target_hit_ratio) {
            return Err("target hit ratio must be within [0, 1]".into());
        }
        if self.window == 0 {
            return Err("window must hold at least one outcome".into());
        }
        if !(self.shrink_factor > 0.0 && self.shrink_factor < 1.0) {
            return Err("shrink factor must be within (0, 1)".into());
        }
        if !(self.grow_factor > 1.0 && self.grow_factor.is_finite()) {
            return Err("grow factor must be greater than 1".into());
        }
        Ok(())
    }
}

impl Default for AdaptivePollerConfig {
    fn default() -> Self {
        Self {
            min_interval: Duration::from_millis(1),
            max_interval: Duration::from_millis(20),
            initial_interval: Duration::from_millis(10),
            target_hit_ratio: 0.5,
            window: 16,
            shrink_factor: 0.8,
            grow_factor: 1.2,
        }
    }
}

/// Consumer-side drain pacing.
///
/// Tracks whether recent drains returned anything and moves the wait
/// interval between them: mostly-productive drains mean chunks are piling
/// up, so the interval shrinks toward `min_interval`; mostly-empty drains
/// burn CPU, so it grows toward `max_interval`. A drain that fills its
/// whole batch shrinks the interval immediately.
///
/// Purely advisory. Nothing else in the pipeline depends on it.
#[derive(Debug, Clone)]
pub struct AdaptivePoller {
    config: AdaptivePollerConfig,
    current: Duration,
    outcomes: VecDeque<bool>,
    hits: usize,
}

impl AdaptivePoller {
    pub fn new(config: AdaptivePollerConfig) -> Result<Self, CaptureError> {
        config.validate().map_err(CaptureError::InvalidConfiguration)?;
        let current = config.initial_interval.clamp(config.min_interval, config.max_interval);
        Ok(Self {
            outcomes: VecDeque::with_capacity(config.window),
            config,
            current,
            hits: 0,
        })
    }

    pub fn config(&self) -> &AdaptivePollerConfig {
        &self.config
    }

    /// How long to wait before the next drain.
    pub fn current_interval(&self) -> Duration {
        self.current
    }

    /// Fraction of productive drains in the window, `None` before any drain.
    pub fn hit_ratio(&self) -> Option<f64> {
        if self.outcomes.is_empty() {
            None
        } else {
            Some(self.hits as f64 / self.outcomes.len() as f64)
        }
    }

    /// Record one drain attempt and return the next interval.
    pub fn record(&mut self, hit: bool) -> Duration {
        self.push_outcome(hit);

        if let Some(ratio) = self.hit_ratio() {
            if ratio > self.config.target_hit_ratio {
                self.scale(self.config.shrink_factor);
            } else if ratio < self.config.target_hit_ratio {
                self.scale(self.config.grow_factor);
            }
        }
        self.current
    }

    /// Record a drain that asked for `requested` chunks and got `received`.
    pub fn record_drain(&mut self, received: usize, requested: usize) -> Duration {
        if requested > 0 && received >= requested {
            // Full batch: more is almost certainly waiting.
            self.push_outcome(true);
            self.scale(self.config.shrink_factor);
            return self.current;
        }
        self.record(received > 0)
    }

    /// Forget history and go back to the initial interval.
    pub fn reset(&mut self) {
        self.outcomes.clear();
        self.hits = 0;
        self.current = self
            .config
            .initial_interval
            .clamp(self.config.min_interval, self.config.max_interval);
    }

    fn push_outcome(&mut self, hit: bool) {
        if self.outcomes.len() == self.config.window {
            if let Some(true) = self.outcomes.pop_front() {
                self.hits -= 1;
            }
        }
        self.outcomes.push_back(hit);
        if hit {
            self.hits += 1;
        }
    }

    fn scale(&mut self, factor: f64) {
        let next = self.current.as_secs_f64() * factor;
        self.current = if next >= self.config.max_interval.as_secs_f64() {
            self.config.max_interval
        } else if next <= self.config.min_interval.as_secs_f64() {
            self.config.min_interval
        } else {
            Duration::from_secs_f64(next)
        };
    }
}

impl Default for AdaptivePoller {
    fn default() -> Self {
        let config = AdaptivePollerConfig::default();
        Self {
            current: config.initial_interval,
            outcomes: VecDeque::with_capacity(config.window),
            config,
            hits: 0,
        }
    }
}

/// Drain cadence: fixed, or driven by an [`AdaptivePoller`].
#[derive(Debug, Clone)]
pub enum Pacing {
    Fixed(Duration),
    Adaptive(AdaptivePoller),
}

impl Pacing {
    pub fn interval(&self) -> Duration {
        match self {
            Self::Fixed(interval) => *interval,
            Self::Adaptive(poller) => poller.current_interval(),
        }
    }

    /// Feed back one drain result and return the wait before the next.
    pub fn record_drain(&mut self, received: usize, requested: usize) -> Duration {
        match self {
            Self::Fixed(interval) => *interval,
            Self::Adaptive(poller) => poller.record_drain(received, requested),
        }
    }
}

impl Default for Pacing {
    fn default() -> Self {
        Self::Adaptive(AdaptivePoller::default())
    }
}
