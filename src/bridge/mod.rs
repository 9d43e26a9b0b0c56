//! Foreground / background message boundary.
//!
//! The background worker lives in its own task with its own cadence and
//! shares no memory with the foreground; the two sides talk only through
//! typed channels. Either side may be torn down and restarted
//! independently, so a send with no live listener is dropped, never an
//! error.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;

use crate::feed::FeedSource;
use crate::models::{Tunnel, TunnelStatus};
use crate::monitor::reconcile;

/// Messages from the foreground to the background worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ForegroundMessage {
    StartMonitoring,
    StopMonitoring,
    UpdateSettings {
        check_interval_ms: Option<u64>,
        notifications_enabled: Option<bool>,
    },
}

/// Messages from the background worker to the foreground.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BackgroundMessage {
    /// The worker has no probe of its own and asks the foreground to run
    /// a check pass.
    BackgroundCheckRequest,

    /// Statuses observed by the worker's own probe.
    StatusUpdate { data: HashMap<String, TunnelStatus> },
}

/// Channel endpoints held by the foreground.
pub struct BridgeHandle {
    commands: mpsc::Sender<ForegroundMessage>,
    pub updates: mpsc::Receiver<BackgroundMessage>,
}

impl BridgeHandle {
    /// Fire-and-forget send; a torn-down worker just drops the message.
    pub async fn send(&self, message: ForegroundMessage) {
        if self.commands.send(message).await.is_err() {
            log::debug!("Background worker not listening; message dropped");
        }
    }
}

/// Trait for the worker's own status checks.
#[async_trait]
pub trait StatusProbe: Send + Sync {
    async fn probe(&self) -> HashMap<String, TunnelStatus>;
}

/// Reconcile-only probe over the feed. Owns its own source and mutates
/// nothing, so the worker never touches foreground state.
pub struct FeedProbe {
    tunnels: Vec<Tunnel>,
    source: Arc<dyn FeedSource>,
}

impl FeedProbe {
    pub fn new(tunnels: Vec<Tunnel>, source: Arc<dyn FeedSource>) -> Self {
        Self { tunnels, source }
    }
}

#[async_trait]
impl StatusProbe for FeedProbe {
    async fn probe(&self) -> HashMap<String, TunnelStatus> {
        let checks = self.tunnels.iter().map(|tunnel| {
            let source = Arc::clone(&self.source);
            async move {
                let record = reconcile(source.as_ref(), tunnel).await;
                (tunnel.key.clone(), record.status)
            }
        });
        join_all(checks).await.into_iter().collect()
    }
}

/// Spawn the background worker; returns the foreground's handle.
///
/// With a probe, the worker reports `StatusUpdate` messages from its own
/// checks; without one it posts `BackgroundCheckRequest` and leaves the
/// checking to the foreground.
pub fn spawn_background(
    probe: Option<Arc<dyn StatusProbe>>,
    check_interval_ms: u64,
) -> BridgeHandle {
    let (command_tx, command_rx) = mpsc::channel(16);
    let (update_tx, update_rx) = mpsc::channel(16);

    tokio::spawn(run_worker(probe, check_interval_ms, command_rx, update_tx));

    BridgeHandle {
        commands: command_tx,
        updates: update_rx,
    }
}

async fn run_worker(
    probe: Option<Arc<dyn StatusProbe>>,
    check_interval_ms: u64,
    mut commands: mpsc::Receiver<ForegroundMessage>,
    updates: mpsc::Sender<BackgroundMessage>,
) {
    let mut monitoring = false;
    let mut interval_ms = check_interval_ms;
    let mut ticker = new_ticker(interval_ms).await;

    loop {
        tokio::select! {
            command = commands.recv() => {
                match command {
                    Some(ForegroundMessage::StartMonitoring) => {
                        log::debug!("Background monitoring started");
                        monitoring = true;
                    }
                    Some(ForegroundMessage::StopMonitoring) => {
                        log::debug!("Background monitoring stopped");
                        monitoring = false;
                    }
                    Some(ForegroundMessage::UpdateSettings {
                        check_interval_ms,
                        notifications_enabled: _,
                    }) => {
                        // Notification policy lives in the foreground; the
                        // worker only re-arms its cadence.
                        if let Some(ms) = check_interval_ms {
                            interval_ms = ms;
                            ticker = new_ticker(interval_ms).await;
                        }
                    }
                    // Foreground handle dropped: the worker winds down
                    None => break,
                }
            }
            _ = ticker.tick() => {
                if !monitoring {
                    continue;
                }
                let message = match &probe {
                    Some(probe) => BackgroundMessage::StatusUpdate {
                        data: probe.probe().await,
                    },
                    None => BackgroundMessage::BackgroundCheckRequest,
                };
                if updates.send(message).await.is_err() {
                    log::debug!("No foreground listener; background update dropped");
                }
            }
        }
    }
}

async fn new_ticker(interval_ms: u64) -> tokio::time::Interval {
    let mut ticker = tokio::time::interval(Duration::from_millis(interval_ms.max(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick fires immediately; cadence starts one period out
    ticker.tick().await;
    ticker
}
