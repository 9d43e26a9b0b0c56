//! Tunnel entities and status records.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Generic keywords that mark a feed record as tunnel-related.
const TUNNEL_KEYWORDS: [&str; 3] = ["tunnel", "onderdoorgang", "viaduct"];

/// Road identifiers for the monitored corridor.
const ROAD_IDS: [&str; 2] = ["a73", "a 73"];

/// A monitored tunnel. Created at configuration load; never mutated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Tunnel {
    /// Stable identifier used as the key in state maps
    pub key: String,

    /// Display name
    pub name: String,

    /// Phrases that tie a feed record to this tunnel
    pub search_terms: Vec<String>,
}

impl Tunnel {
    /// Check whether a feed record's location/description text refers to
    /// this tunnel. A record matches when any configured search phrase
    /// appears in the combined text, or when the text mentions both a
    /// generic tunnel keyword and the road identifier.
    pub fn matches(&self, location: &str, description: &str) -> bool {
        let haystack = format!("{} {}", location, description).to_lowercase();

        let has_search_term = self
            .search_terms
            .iter()
            .any(|term| haystack.contains(&term.to_lowercase()));

        let has_tunnel_keyword = TUNNEL_KEYWORDS.iter().any(|kw| haystack.contains(kw));
        let has_road_id = ROAD_IDS.iter().any(|id| haystack.contains(id));

        has_search_term || (has_tunnel_keyword && has_road_id)
    }
}

/// Operational state of a tunnel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TunnelStatus {
    Open,
    Closed,
    Restricted,
    Maintenance,
    Unknown,
}

impl TunnelStatus {
    /// Lowercase label as used in feed-facing text and logs.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Closed => "closed",
            Self::Restricted => "restricted",
            Self::Maintenance => "maintenance",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for TunnelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One observed status for a tunnel. Produced fresh on every extraction or
/// reconciliation; immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusRecord {
    pub status: TunnelStatus,
    pub reason: Option<String>,
    pub duration: Option<String>,
    pub observed_at: DateTime<Utc>,
}

impl StatusRecord {
    pub fn new(status: TunnelStatus, reason: impl Into<String>) -> Self {
        Self {
            status,
            reason: Some(reason.into()),
            duration: None,
            observed_at: Utc::now(),
        }
    }

    /// Default result when no source reports anything amiss.
    pub fn open_default() -> Self {
        Self::new(TunnelStatus::Open, "No incidents detected")
    }

    /// Record for an unmatched or unparseable document.
    pub fn unknown() -> Self {
        Self {
            status: TunnelStatus::Unknown,
            reason: None,
            duration: None,
            observed_at: Utc::now(),
        }
    }

    /// Result when every source failed or stayed silent.
    pub fn connection_error() -> Self {
        Self::new(TunnelStatus::Unknown, "Connection error")
    }
}

/// A status record retained after a transition, tagged with its tunnel key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClosureHistoryEntry {
    pub tunnel: String,
    pub status: TunnelStatus,
    pub reason: Option<String>,
    pub duration: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl ClosureHistoryEntry {
    pub fn from_record(tunnel: &str, record: &StatusRecord) -> Self {
        Self {
            tunnel: tunnel.to_string(),
            status: record.status,
            reason: record.reason.clone(),
            duration: record.duration.clone(),
            timestamp: record.observed_at,
        }
    }
}
