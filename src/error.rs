//! Typed provider error taxonomy.
//!
//! Raw provider messages are classified exactly once, inside the provider
//! adapters; everything above the adapter boundary matches on these
//! variants rather than sniffing message text.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProviderError {
    /// Address could not be resolved. Non-fatal: the place is dropped from
    /// routing input, never from the caller's list.
    #[error("geocoding failed for \"{0}\"")]
    Geocode(String),

    /// Bad or missing credentials, or an inactive subscription. Triggers
    /// fallback to the primary provider; fatal when none remains.
    #[error("provider authentication failed: {0}")]
    Auth(String),

    /// The requested locations are outside the provider's service area.
    #[error("outside provider service area: {0}")]
    Coverage(String),

    /// The call succeeded but no route was found.
    #[error("no route found")]
    Empty,

    /// Network or timeout failure. Retried up to the attempt cap, then
    /// treated like an empty response.
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// Response arrived but did not have the expected shape.
    #[error("malformed provider response: {0}")]
    Parse(String),

    /// The provider does not implement this operation.
    #[error("{0} is not supported by this provider")]
    Unsupported(&'static str),
}

impl ProviderError {
    /// Only transport failures are worth retrying; every other variant is a
    /// definitive answer from the provider.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ProviderError::Transport(_))
    }
}
