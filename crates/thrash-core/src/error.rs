use thiserror::Error;

/// Fatal problems found while turning a config into an endpoint table.
/// All of them abort the run before a single request is sent.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DistributionError {
    /// Explicit percentages alone exceed 100%
    #[error("Unbalanced frequencies: explicit percentages sum to {total_percent}%")]
    UnbalancedFrequency { total_percent: f64 },

    /// Every endpoint is excluded or the list is empty
    #[error("No endpoints to test: every entry is excluded or the list is empty")]
    NoEndpoints,

    /// Two entries resolve to the same URL
    #[error("Duplicate endpoint: {0}")]
    DuplicateEndpoint(String),
}

/// Raw `freq` value that is neither a sentinel nor a percentage in (0, 100].
#[derive(Debug, Clone, Copy, PartialEq, Error)]
#[error("invalid freq {0}: expected 0 (exclude), -1 (auto) or a percentage in (0, 100]")]
pub struct InvalidFrequency(pub f64);
