//! Process-wide monitor state and derived statistics.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::tunnel::{ClosureHistoryEntry, TunnelStatus};

/// Maximum number of history entries kept per tunnel.
pub const HISTORY_CAP: usize = 50;

/// Daily aggregates derived from closure history. Recomputed every check
/// cycle and persisted only as a cache; history is the source of truth.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyStatistics {
    /// Closed entries observed today
    pub closure_count: usize,

    /// Mean closure duration in minutes over today's closed entries that
    /// carry a duration
    pub avg_closure_minutes: u64,

    /// Share of the day not spent closed, in percent
    pub uptime_percentage: u8,

    /// Newest closed/restricted entry across all days
    pub last_incident: Option<DateTime<Utc>>,

    /// When these aggregates were computed
    pub last_update: Option<DateTime<Utc>>,
}

impl Default for DailyStatistics {
    fn default() -> Self {
        Self {
            closure_count: 0,
            avg_closure_minutes: 0,
            uptime_percentage: 100,
            last_incident: None,
            last_update: None,
        }
    }
}

/// The two persisted blobs: closure history and the statistics snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersistedState {
    #[serde(default)]
    pub closure_history: HashMap<String, VecDeque<ClosureHistoryEntry>>,

    #[serde(default)]
    pub statistics: DailyStatistics,
}

/// In-memory monitor state. Hydrated from persisted storage at startup,
/// mutated only by the transition tracker and scheduler, flushed after
/// every check cycle and at shutdown.
#[derive(Debug, Clone, Default)]
pub struct MonitorState {
    /// Most recent reconciled status per tunnel. Not persisted: a restart
    /// starts with no prior observations so the first pass never alerts.
    pub last_status: HashMap<String, TunnelStatus>,

    /// Bounded per-tunnel transition log, newest first
    pub closure_history: HashMap<String, VecDeque<ClosureHistoryEntry>>,

    pub statistics: DailyStatistics,
    pub is_monitoring: bool,
    pub check_interval_ms: u64,
}

impl MonitorState {
    /// Rebuild state from a persisted snapshot.
    pub fn hydrate(persisted: PersistedState, check_interval_ms: u64) -> Self {
        Self {
            last_status: HashMap::new(),
            closure_history: persisted.closure_history,
            statistics: persisted.statistics,
            is_monitoring: false,
            check_interval_ms,
        }
    }

    /// Snapshot the persistable parts of this state.
    pub fn snapshot(&self) -> PersistedState {
        PersistedState {
            closure_history: self.closure_history.clone(),
            statistics: self.statistics.clone(),
        }
    }

    /// Append a transition to the tunnel's history, newest first, evicting
    /// the oldest entries beyond the cap.
    pub fn record_transition(&mut self, entry: ClosureHistoryEntry) {
        let history = self.closure_history.entry(entry.tunnel.clone()).or_default();
        history.push_front(entry);
        history.truncate(HISTORY_CAP);
    }

    /// Shrink every tunnel's history to its newest `keep` entries.
    pub fn prune_history(&mut self, keep: usize) {
        for history in self.closure_history.values_mut() {
            history.truncate(keep);
        }
    }
}
