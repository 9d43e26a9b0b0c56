//! Transition detection between consecutive reconciliations.

use crate::alert::Alert;
use crate::models::{ClosureHistoryEntry, MonitorState, StatusRecord, Tunnel};

/// Outcome of observing one reconciled status.
#[derive(Debug)]
pub struct Observation {
    pub changed: bool,
    pub alert: Option<Alert>,
}

/// Compare a fresh reconciled record against the tunnel's last known
/// status. A transition is only recognized when a previous status existed
/// and differs, so the first observation after startup never alerts. Every
/// recognized transition is appended to history, whatever the target
/// status; the last-known status is updated unconditionally.
pub fn observe(
    state: &mut MonitorState,
    tunnel: &Tunnel,
    record: &StatusRecord,
    notifications_enabled: bool,
) -> Observation {
    let previous = state.last_status.get(&tunnel.key).copied();
    let changed = previous.is_some_and(|prev| prev != record.status);

    if changed {
        log::info!(
            "Status change for {}: {} -> {}",
            tunnel.key,
            previous.map(|p| p.label()).unwrap_or("none"),
            record.status
        );
        state.record_transition(ClosureHistoryEntry::from_record(&tunnel.key, record));
    }

    let alert = if changed && notifications_enabled {
        Alert::for_transition(tunnel, record)
    } else {
        None
    };

    state
        .last_status
        .insert(tunnel.key.clone(), record.status);

    Observation { changed, alert }
}

#[cfg(test)]
mod tests {
    use crate::models::TunnelStatus;

    use super::*;

    fn roermond() -> Tunnel {
        Tunnel {
            key: "roermond".to_string(),
            name: "Roermond".to_string(),
            search_terms: vec!["roermond".to_string()],
        }
    }

    #[test]
    fn first_observation_is_not_a_transition() {
        let mut state = MonitorState::default();
        let record = StatusRecord::new(TunnelStatus::Closed, "afgesloten");

        let observation = observe(&mut state, &roermond(), &record, true);

        assert!(!observation.changed);
        assert!(observation.alert.is_none());
        assert!(state.closure_history.is_empty());
        assert_eq!(
            state.last_status.get("roermond"),
            Some(&TunnelStatus::Closed)
        );
    }

    #[test]
    fn transition_records_history_and_alerts() {
        let mut state = MonitorState::default();
        let tunnel = roermond();

        observe(
            &mut state,
            &tunnel,
            &StatusRecord::new(TunnelStatus::Open, "No incidents detected"),
            true,
        );
        let observation = observe(
            &mut state,
            &tunnel,
            &StatusRecord::new(TunnelStatus::Closed, "afgesloten"),
            true,
        );

        assert!(observation.changed);
        assert!(observation.alert.is_some());
        assert_eq!(state.closure_history["roermond"].len(), 1);
        assert_eq!(
            state.closure_history["roermond"][0].status,
            TunnelStatus::Closed
        );
    }

    #[test]
    fn same_status_is_not_a_transition() {
        let mut state = MonitorState::default();
        let tunnel = roermond();
        let record = StatusRecord::new(TunnelStatus::Open, "No incidents detected");

        observe(&mut state, &tunnel, &record, true);
        let observation = observe(&mut state, &tunnel, &record, true);

        assert!(!observation.changed);
        assert!(state.closure_history.is_empty());
    }

    #[test]
    fn transition_to_unknown_is_recorded_but_silent() {
        let mut state = MonitorState::default();
        let tunnel = roermond();

        observe(
            &mut state,
            &tunnel,
            &StatusRecord::new(TunnelStatus::Open, "No incidents detected"),
            true,
        );
        let observation = observe(&mut state, &tunnel, &StatusRecord::connection_error(), true);

        assert!(observation.changed);
        assert!(observation.alert.is_none());
        assert_eq!(state.closure_history["roermond"].len(), 1);
        assert_eq!(
            state.last_status.get("roermond"),
            Some(&TunnelStatus::Unknown)
        );
    }

    #[test]
    fn disabled_notifications_suppress_alerts_not_history() {
        let mut state = MonitorState::default();
        let tunnel = roermond();

        observe(
            &mut state,
            &tunnel,
            &StatusRecord::new(TunnelStatus::Open, "No incidents detected"),
            false,
        );
        let observation = observe(
            &mut state,
            &tunnel,
            &StatusRecord::new(TunnelStatus::Closed, "afgesloten"),
            false,
        );

        assert!(observation.changed);
        assert!(observation.alert.is_none());
        assert_eq!(state.closure_history["roermond"].len(), 1);
    }
}
