use crate::executor::Response;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tracing::debug;

/// Weight given to history in the moving average; the newest sample gets
/// the remaining 0.3.
pub const SMOOTHING: f64 = 0.7;

/// Running statistics for one endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointStats {
    pub url: String,
    pub count: u64,
    pub failures: u64,
    /// `Duration::MAX` until the first completion
    pub min: Duration,
    pub max: Duration,
    /// Exponentially smoothed latency in seconds
    pub avg: f64,
    /// Configured share of traffic in [0, 1]
    pub freq: f64,
}

impl EndpointStats {
    pub fn new(url: impl Into<String>, freq: f64) -> Self {
        Self {
            url: url.into(),
            count: 0,
            failures: 0,
            min: Duration::MAX,
            max: Duration::ZERO,
            avg: 0.0,
            freq,
        }
    }

    pub fn record(&mut self, duration: Duration, pass: bool) {
        self.min = self.min.min(duration);
        self.max = self.max.max(duration);

        let secs = duration.as_secs_f64();
        self.avg = if self.count == 0 {
            secs
        } else {
            self.avg * SMOOTHING + secs * (1.0 - SMOOTHING)
        };

        self.count += 1;
        if !pass {
            self.failures += 1;
        }
    }

    /// Percentage of completions that passed, `None` before the first one.
    pub fn success_percent(&self) -> Option<f64> {
        if self.count == 0 {
            return None;
        }
        Some((1.0 - self.failures as f64 / self.count as f64) * 100.0)
    }
}

/// Endpoint URL -> statistics. Sorted so reports are stable.
pub type ResultDistribution = BTreeMap<String, EndpointStats>;

/// Throughput checkpoint emitted every `interval` completions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Progress {
    pub completed: u64,
    /// Wall time since the aggregator started
    pub elapsed: Duration,
    /// Completions since the previous checkpoint divided by the time between them
    pub requests_per_sec: f64,
}

/// Folds completions into the distribution. The only writer of the
/// statistics it owns.
pub struct StatsAggregator {
    distribution: ResultDistribution,
    expected: u64,
    interval: u64,
    completed: u64,
    start_time: Instant,
    checkin: Instant,
    checkin_completed: u64,
}

impl StatsAggregator {
    pub fn new(distribution: ResultDistribution, expected: u64) -> Self {
        let now = Instant::now();
        Self {
            distribution,
            expected,
            interval: (expected / 10).max(1),
            completed: 0,
            start_time: now,
            checkin: now,
            checkin_completed: 0,
        }
    }

    /// Fold one completion. Returns a checkpoint when this completion lands
    /// on an interval boundary or is the last expected one.
    pub fn record(&mut self, response: &Response) -> anyhow::Result<Option<Progress>> {
        if self.is_complete() {
            debug!("Dropping completion {} past the expected count", response.id);
            return Ok(None);
        }

        let Some(stats) = self.distribution.get_mut(&response.url) else {
            anyhow::bail!("Completion for unknown endpoint: {}", response.url);
        };
        stats.record(response.duration, response.pass);
        self.completed += 1;

        if self.completed % self.interval == 0 || self.completed == self.expected {
            return Ok(Some(self.checkpoint()));
        }
        Ok(None)
    }

    fn checkpoint(&mut self) -> Progress {
        let now = Instant::now();
        let since_checkin = now.duration_since(self.checkin).as_secs_f64();
        let batch = self.completed - self.checkin_completed;
        let requests_per_sec = if since_checkin > 0.0 {
            batch as f64 / since_checkin
        } else {
            0.0
        };

        self.checkin = now;
        self.checkin_completed = self.completed;

        Progress {
            completed: self.completed,
            elapsed: now.duration_since(self.start_time),
            requests_per_sec,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.completed >= self.expected
    }

    pub fn completed(&self) -> u64 {
        self.completed
    }

    pub fn expected(&self) -> u64 {
        self.expected
    }

    pub fn interval(&self) -> u64 {
        self.interval
    }

    pub fn distribution(&self) -> &ResultDistribution {
        &self.distribution
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    pub fn into_distribution(self) -> ResultDistribution {
        self.distribution
    }
}
