use crate::stats::{EndpointStats, Progress, ResultDistribution};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Everything a finished run hands to the outside world.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub requests: u64,
    pub concurrency: usize,
    pub duration: Duration,
    pub total_failures: u64,
    pub endpoints: ResultDistribution,
    pub progress: Vec<Progress>,
}

impl RunReport {
    pub fn new(
        started_at: DateTime<Utc>,
        requests: u64,
        concurrency: usize,
        duration: Duration,
        endpoints: ResultDistribution,
        progress: Vec<Progress>,
    ) -> Self {
        let total_failures = endpoints.values().map(|s| s.failures).sum();
        Self {
            started_at,
            requests,
            concurrency,
            duration,
            total_failures,
            endpoints,
            progress,
        }
    }

    /// Overall pass rate, `None` for an empty run.
    pub fn success_percent(&self) -> Option<f64> {
        if self.requests == 0 {
            return None;
        }
        Some((1.0 - self.total_failures as f64 / self.requests as f64) * 100.0)
    }

    pub fn requests_per_sec(&self) -> f64 {
        let secs = self.duration.as_secs_f64();
        if secs > 0.0 {
            self.requests as f64 / secs
        } else {
            0.0
        }
    }
}

fn millis(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

fn write_endpoint(f: &mut fmt::Formatter<'_>, stats: &EndpointStats) -> fmt::Result {
    writeln!(f, "{}", stats.url)?;
    writeln!(f, "  Count:   {}", stats.count)?;
    match stats.success_percent() {
        Some(success) => {
            writeln!(f, "  Success: {:.2} %", success)?;
            writeln!(f, "  Min:     {:.3} ms", millis(stats.min))?;
            writeln!(f, "  Max:     {:.3} ms", millis(stats.max))?;
            writeln!(f, "  Avg:     {:.3} ms", stats.avg * 1000.0)?;
        }
        None => {
            writeln!(f, "  Success: -")?;
            writeln!(f, "  Min:     -")?;
            writeln!(f, "  Max:     -")?;
            writeln!(f, "  Avg:     -")?;
        }
    }
    if stats.freq < 1.0 {
        writeln!(f, "  Freq:    {:.2} %", stats.freq * 100.0)?;
    }
    Ok(())
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Request Summaries")?;
        writeln!(f, "=================================")?;
        for stats in self.endpoints.values() {
            writeln!(f)?;
            write_endpoint(f, stats)?;
        }

        writeln!(f)?;
        writeln!(f, "Result Summary")?;
        writeln!(f, "=================================")?;
        writeln!(f, "  Started:     {}", self.started_at.to_rfc3339())?;
        writeln!(f, "  Req Count:   {}", self.requests)?;
        writeln!(f, "  Concurrency: {}", self.concurrency)?;
        writeln!(f, "  Duration:    {:?}", self.duration)?;
        match self.success_percent() {
            Some(success) => writeln!(f, "  Success:     {:.2} %", success)?,
            None => writeln!(f, "  Success:     -")?,
        }
        writeln!(f, "  Req/Sec:     {:.2}", self.requests_per_sec())
    }
}
