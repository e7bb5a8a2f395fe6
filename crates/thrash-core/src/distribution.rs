//! Weighted endpoint table.
//!
//! Each tested endpoint owns a slice of `[0, 1]` proportional to its share of
//! traffic. A uniform draw is mapped back to an endpoint by scanning for the
//! slice that contains it.

use crate::config::{Config, Frequency};
use crate::error::DistributionError;
use crate::stats::{EndpointStats, ResultDistribution};
use rand::Rng;
use tracing::{debug, warn};

/// Slack allowed when deciding the table is meant to reach 1.0.
const FULL_TABLE_EPSILON: f64 = 1e-9;

/// Boundary misses tolerated before clamping.
const MAX_REDRAWS: usize = 8;

/// Half-open slice `[start, stop)` of the unit interval.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment {
    pub start: f64,
    pub stop: f64,
}

impl Segment {
    /// Strict containment: draws exactly on a boundary belong to nobody.
    pub fn contains(&self, r: f64) -> bool {
        self.start < r && r < self.stop
    }

    pub fn width(&self) -> f64 {
        self.stop - self.start
    }
}

/// Immutable URL -> segment table, in config order.
#[derive(Debug, Clone, PartialEq)]
pub struct EndpointLookup {
    entries: Vec<(String, Segment)>,
}

impl EndpointLookup {
    /// Build the segment table and the matching statistics skeleton.
    pub fn build(config: &Config) -> Result<(Self, ResultDistribution), DistributionError> {
        let mut explicit_total = 0.0;
        let mut auto_count = 0u32;
        for endpoint in &config.endpoints {
            match endpoint.freq {
                Frequency::Percentage(p) => explicit_total += p,
                Frequency::Auto => auto_count += 1,
                Frequency::Excluded => {}
            }
        }

        let remaining = 1.0 - explicit_total * 0.01;
        if remaining < -FULL_TABLE_EPSILON {
            return Err(DistributionError::UnbalancedFrequency {
                total_percent: explicit_total,
            });
        }
        let remaining = remaining.max(0.0);

        let auto_share = if auto_count > 0 {
            remaining / f64::from(auto_count)
        } else {
            if remaining > FULL_TABLE_EPSILON {
                warn!(
                    "Explicit frequencies only cover {}% and no endpoint is auto; \
                     the unassigned {:.4} is spread over the configured shares",
                    explicit_total, remaining
                );
            }
            0.0
        };

        let mut entries: Vec<(String, Segment)> = Vec::new();
        let mut distribution = ResultDistribution::new();
        let mut position = 0.0;

        for endpoint in &config.endpoints {
            let share = match endpoint.freq {
                Frequency::Excluded => continue,
                Frequency::Auto => auto_share,
                Frequency::Percentage(p) => p * 0.01,
            };

            let url = format!("{}{}", config.root, endpoint.path);
            if distribution.contains_key(&url) {
                return Err(DistributionError::DuplicateEndpoint(url));
            }

            let segment = Segment {
                start: position,
                stop: position + share,
            };
            position = segment.stop;

            distribution.insert(url.clone(), EndpointStats::new(url.clone(), share));
            entries.push((url, segment));
        }

        // Auto endpoints with nothing left over get a zero-width slice; they
        // stay in the report but can never be drawn.
        entries.retain(|(url, segment)| {
            let keep = segment.width() > 0.0;
            if !keep {
                debug!("Endpoint {} has no share of traffic", url);
            }
            keep
        });

        if entries.is_empty() {
            return Err(DistributionError::NoEndpoints);
        }

        let full =
            (auto_count > 0 && remaining > 0.0) || (position - 1.0).abs() < FULL_TABLE_EPSILON;
        if full {
            if let Some((_, last)) = entries.last_mut() {
                last.stop = 1.0;
            }
        }

        Ok((Self { entries }, distribution))
    }

    /// Endpoint whose segment strictly contains `r`, if any.
    pub fn select(&self, r: f64) -> Option<&str> {
        self.entries
            .iter()
            .find(|(_, segment)| segment.contains(r))
            .map(|(url, _)| url.as_str())
    }

    /// Draw an endpoint. The draw is scaled to the assigned part of `[0, 1]`
    /// so unassigned capacity never misses; a boundary hit is re-drawn up to
    /// `MAX_REDRAWS` times and then clamped to the nearest segment.
    pub fn select_random<R: Rng + ?Sized>(&self, rng: &mut R) -> &str {
        let assigned = self.assigned();
        let mut r = 0.0;
        for _ in 0..MAX_REDRAWS {
            r = rng.gen::<f64>() * assigned;
            if let Some(url) = self.select(r) {
                return url;
            }
        }
        self.nearest(r)
    }

    /// First endpoint whose segment ends past `r`, else the last one.
    pub fn nearest(&self, r: f64) -> &str {
        let index = self
            .entries
            .iter()
            .position(|(_, segment)| r < segment.stop)
            .unwrap_or(self.entries.len() - 1);
        // `build` never returns an empty table.
        &self.entries[index].0
    }

    /// Upper end of the last segment; 1.0 for a full table.
    pub fn assigned(&self) -> f64 {
        self.entries.last().map_or(0.0, |(_, segment)| segment.stop)
    }

    pub fn segments(&self) -> impl Iterator<Item = (&str, Segment)> + '_ {
        self.entries.iter().map(|(url, segment)| (url.as_str(), *segment))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
