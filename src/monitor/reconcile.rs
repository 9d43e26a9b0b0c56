//! Merging per-source records into one authoritative status.

use crate::extract::extract;
use crate::feed::{EndpointKind, FeedSource};
use crate::models::{StatusRecord, Tunnel, TunnelStatus};

/// Reconcile one tunnel's status across all endpoints.
///
/// Endpoints are evaluated in the fixed order incidents, roadworks,
/// traffic-speed. Closed and restricted records override everything seen
/// so far; any other non-unknown record only replaces a still-open
/// running result. Closed is maximal, no later source can downgrade it,
/// so evaluation stops there. A fetch failure makes that endpoint absent
/// for this pass; when every endpoint fails or stays silent the result is
/// unknown with a connection-error reason.
pub async fn reconcile(source: &dyn FeedSource, tunnel: &Tunnel) -> StatusRecord {
    let mut result = StatusRecord::open_default();
    let mut any_signal = false;

    for kind in EndpointKind::ALL {
        let raw = match source.fetch(kind).await {
            Ok(raw) => raw,
            Err(error) => {
                log::warn!("Skipping {} for {}: {}", kind, tunnel.key, error);
                continue;
            }
        };

        let record = extract(&raw, kind, tunnel);
        if record.status == TunnelStatus::Unknown {
            continue;
        }
        any_signal = true;

        let overrides = matches!(
            record.status,
            TunnelStatus::Closed | TunnelStatus::Restricted
        );
        if overrides || result.status == TunnelStatus::Open {
            let closed = record.status == TunnelStatus::Closed;
            result = record;
            if closed {
                break;
            }
        }
    }

    if any_signal {
        result
    } else {
        StatusRecord::connection_error()
    }
}
