//! Daily aggregates derived from closure history.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};

use crate::extract::parse_duration_minutes;
use crate::models::{ClosureHistoryEntry, DailyStatistics, TunnelStatus};

const DAY_MINUTES: f64 = 24.0 * 60.0;

/// Recompute today's aggregates across all tunnels. History is the source
/// of truth; the result is a cache.
pub fn compute_statistics(
    history: &HashMap<String, VecDeque<ClosureHistoryEntry>>,
    now: DateTime<Utc>,
) -> DailyStatistics {
    let today = now.date_naive();

    let mut closure_count = 0;
    let mut closed_minutes = 0.0;
    let mut sampled_closures = 0;
    let mut last_incident: Option<DateTime<Utc>> = None;

    for entries in history.values() {
        for entry in entries {
            if entry.status == TunnelStatus::Closed && entry.timestamp.date_naive() == today {
                closure_count += 1;
                if let Some(duration) = &entry.duration {
                    let minutes = parse_duration_minutes(duration);
                    if minutes > 0.0 {
                        closed_minutes += minutes;
                        sampled_closures += 1;
                    }
                }
            }

            // Last incident looks across all days, not just today
            if matches!(
                entry.status,
                TunnelStatus::Closed | TunnelStatus::Restricted
            ) && last_incident.is_none_or(|t| entry.timestamp > t)
            {
                last_incident = Some(entry.timestamp);
            }
        }
    }

    let avg_closure_minutes = if sampled_closures > 0 {
        (closed_minutes / sampled_closures as f64).round() as u64
    } else {
        0
    };

    let uptime_percentage =
        (((DAY_MINUTES - closed_minutes) / DAY_MINUTES) * 100.0).round().max(0.0) as u8;

    DailyStatistics {
        closure_count,
        avg_closure_minutes,
        uptime_percentage,
        last_incident,
        last_update: Some(now),
    }
}
