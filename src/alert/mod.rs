//! Alert construction and the dispatch boundary.
//!
//! The core decides when and what to alert; rendering (native
//! notification, in-app banner) belongs to the dispatcher implementation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::models::{StatusRecord, Tunnel, TunnelStatus};

/// How prominently an alert should be rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Success,
    Warning,
    Danger,
}

/// A user-facing alert request raised on a status transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub tunnel_key: String,
    pub title: String,
    pub body: String,
    pub severity: AlertSeverity,
    pub reason: Option<String>,
    pub duration: Option<String>,

    /// Urgent alerts should stay visible until acknowledged
    pub urgent: bool,
}

impl Alert {
    /// Build the alert for a transition into `record`'s status.
    /// Transitions into unknown never alert.
    pub fn for_transition(tunnel: &Tunnel, record: &StatusRecord) -> Option<Self> {
        let (title, body, severity) = match record.status {
            TunnelStatus::Closed => (
                format!("{} Tunnel CLOSED!", tunnel.name),
                format!(
                    "The {} tunnel is now closed. Consider alternative routes.",
                    tunnel.name
                ),
                AlertSeverity::Danger,
            ),
            TunnelStatus::Open => (
                format!("{} Tunnel Open", tunnel.name),
                format!("The {} tunnel is now open for traffic.", tunnel.name),
                AlertSeverity::Success,
            ),
            TunnelStatus::Maintenance => (
                format!("{} Tunnel Maintenance", tunnel.name),
                format!("The {} tunnel is under maintenance.", tunnel.name),
                AlertSeverity::Warning,
            ),
            TunnelStatus::Restricted => (
                format!("{} Tunnel Restricted", tunnel.name),
                format!("Traffic restrictions on {} tunnel.", tunnel.name),
                AlertSeverity::Warning,
            ),
            TunnelStatus::Unknown => return None,
        };

        Some(Self {
            tunnel_key: tunnel.key.clone(),
            title,
            body,
            severity,
            reason: record.reason.clone(),
            duration: record.duration.clone(),
            urgent: record.status == TunnelStatus::Closed,
        })
    }
}

/// Trait for alert emission backends.
#[async_trait]
pub trait AlertDispatcher: Send + Sync {
    async fn dispatch(&self, alert: &Alert) -> Result<()>;
}

/// Dispatcher that writes alerts to the log. The CLI default.
pub struct LogDispatcher;

#[async_trait]
impl AlertDispatcher for LogDispatcher {
    async fn dispatch(&self, alert: &Alert) -> Result<()> {
        match alert.severity {
            AlertSeverity::Danger => log::warn!("{} {}", alert.title, alert.body),
            _ => log::info!("{} {}", alert.title, alert.body),
        }
        if let Some(reason) = &alert.reason {
            log::info!("  Reason: {}", reason);
        }
        if let Some(duration) = &alert.duration {
            log::info!("  Duration: {}", duration);
        }
        Ok(())
    }
}
