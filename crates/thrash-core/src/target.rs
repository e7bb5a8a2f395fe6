use crate::config::Config;
use crate::distribution::EndpointLookup;
use crate::error::DistributionError;
use crate::stats::{EndpointStats, ResultDistribution};
use anyhow::Context;
use rand::Rng;

/// Accepts absolute http(s) URLs with a host, e.g. `http://localhost:8080/x`.
pub fn is_valid_url(raw: &str) -> bool {
    parse_target_url(raw).is_ok()
}

fn parse_target_url(raw: &str) -> anyhow::Result<url::Url> {
    let url = url::Url::parse(raw).with_context(|| format!("Invalid URL: {raw}"))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        anyhow::bail!("URL must be http:// or https:// (got {raw})");
    }
    if url.host_str().map_or(true, str::is_empty) {
        anyhow::bail!("URL must include a host (got {raw})");
    }

    Ok(url)
}

/// Where generated requests go.
#[derive(Debug, Clone)]
pub enum Target {
    /// Every request hits the same URL
    Single(String),
    /// Each request draws an endpoint from the weighted table
    Weighted(EndpointLookup),
}

impl Target {
    pub fn next_url<R: Rng + ?Sized>(&self, rng: &mut R) -> String {
        match self {
            Target::Single(url) => url.clone(),
            Target::Weighted(lookup) => lookup.select_random(rng).to_string(),
        }
    }
}

/// A target together with the statistics skeleton it will fill.
#[derive(Debug, Clone)]
pub struct LoadPlan {
    pub target: Target,
    pub distribution: ResultDistribution,
}

impl LoadPlan {
    /// Single-endpoint mode. The URL is used verbatim.
    pub fn single(url: &str) -> anyhow::Result<Self> {
        parse_target_url(url)?;

        let mut distribution = ResultDistribution::new();
        distribution.insert(url.to_string(), EndpointStats::new(url, 1.0));

        Ok(Self {
            target: Target::Single(url.to_string()),
            distribution,
        })
    }

    /// Weighted multi-endpoint mode.
    pub fn from_config(config: &Config) -> Result<Self, DistributionError> {
        let (lookup, distribution) = EndpointLookup::build(config)?;
        Ok(Self {
            target: Target::Weighted(lookup),
            distribution,
        })
    }

    pub fn endpoint_count(&self) -> usize {
        self.distribution.len()
    }
}
