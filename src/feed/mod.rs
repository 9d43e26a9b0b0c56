//! Feed access: the endpoint catalogue and the fetching client.

pub mod client;

use std::fmt;

use async_trait::async_trait;

use crate::error::Result;

// Re-export for convenience
pub use client::FeedClient;

/// One of the feed's data sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EndpointKind {
    Incidents,
    Roadworks,
    TrafficSpeed,
}

impl EndpointKind {
    /// All endpoints, in the fixed order reconciliation evaluates them.
    pub const ALL: [EndpointKind; 3] = [
        EndpointKind::Incidents,
        EndpointKind::Roadworks,
        EndpointKind::TrafficSpeed,
    ];

    /// Feed path relative to the base URL.
    pub fn path(&self) -> &'static str {
        match self {
            Self::Incidents => "incidents/incidents.xml",
            Self::Roadworks => "roadworks/roadworks.xml",
            Self::TrafficSpeed => "trafficspeed/trafficspeed.xml",
        }
    }

    /// Element names (lowercase) that carry records of this kind.
    pub fn record_names(&self) -> &'static [&'static str] {
        match self {
            Self::Incidents => &["incident"],
            Self::Roadworks => &["roadwork", "situation"],
            Self::TrafficSpeed => &["measurement", "sitemeasurements"],
        }
    }
}

impl fmt::Display for EndpointKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Incidents => "incidents",
            Self::Roadworks => "roadworks",
            Self::TrafficSpeed => "trafficspeed",
        };
        f.write_str(name)
    }
}

/// Trait for resolving one logical endpoint to raw feed text.
///
/// Implemented by [`FeedClient`] for the real feed; tests inject scripted
/// sources.
#[async_trait]
pub trait FeedSource: Send + Sync {
    async fn fetch(&self, endpoint: EndpointKind) -> Result<String>;
}
