pub mod ip_lookup;
pub mod resolver;

use async_trait::async_trait;
use shared::GeoFix;
use std::time::Duration;

pub use ip_lookup::{IpLocator, IpLookupClient, parse_client_ip};
pub use resolver::{GeolocationResolver, ReportedPosition};

#[derive(Debug, thiserror::Error)]
pub enum GeoError {
    #[error("position source unsupported")]
    Unsupported,
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("lookup not configured")]
    NotConfigured,
    #[error("lookup failed: {0}")]
    Lookup(String),
    #[error("invalid position: {0}")]
    InvalidResponse(String),
}

/// How a position is requested from a source.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionOptions {
    pub enable_high_accuracy: bool,
    pub timeout: Duration,
    /// Oldest cached position the caller accepts.
    pub maximum_age: Duration,
}

impl Default for PositionOptions {
    fn default() -> Self {
        Self {
            enable_high_accuracy: true,
            timeout: Duration::from_secs(10),
            maximum_age: Duration::ZERO,
        }
    }
}

#[async_trait]
pub trait PositionSource: Send + Sync {
    async fn current_position(&self, options: &PositionOptions) -> Result<GeoFix, GeoError>;
}
