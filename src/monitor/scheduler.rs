//! Check passes and the timer that drives them.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::alert::AlertDispatcher;
use crate::feed::FeedSource;
use crate::models::{Config, MonitorState, PersistedState, Tunnel, TunnelStatus};
use crate::storage::StateStore;

use super::reconcile::reconcile;
use super::statistics::compute_statistics;
use super::tracker;

/// Entries kept per tunnel when a failed save forces pruning.
const PRUNE_KEEP: usize = 20;

/// Owns the monitor state and runs check passes over all tunnels.
pub struct Monitor {
    tunnels: Vec<Tunnel>,
    source: Arc<dyn FeedSource>,
    store: Arc<dyn StateStore>,
    dispatcher: Arc<dyn AlertDispatcher>,
    notifications_enabled: bool,
    state: MonitorState,
}

impl Monitor {
    /// Build a monitor, hydrating state from the injected store. Missing
    /// or corrupt persisted data starts empty.
    pub async fn hydrate(
        config: &Config,
        source: Arc<dyn FeedSource>,
        store: Arc<dyn StateStore>,
        dispatcher: Arc<dyn AlertDispatcher>,
    ) -> Self {
        let persisted = store.load().await.unwrap_or_else(|error| {
            log::warn!("State load failed: {}. Starting empty.", error);
            PersistedState::default()
        });

        Self {
            tunnels: config.tunnels.clone(),
            source,
            store,
            dispatcher,
            notifications_enabled: config.monitor.notifications_enabled,
            state: MonitorState::hydrate(persisted, config.monitor.check_interval_ms),
        }
    }

    pub fn state(&self) -> &MonitorState {
        &self.state
    }

    pub fn set_notifications_enabled(&mut self, enabled: bool) {
        self.notifications_enabled = enabled;
    }

    pub(crate) fn set_monitoring(&mut self, on: bool) {
        self.state.is_monitoring = on;
    }

    pub(crate) fn set_check_interval(&mut self, interval_ms: u64) {
        self.state.check_interval_ms = interval_ms;
    }

    /// Run one full pass: reconcile every tunnel concurrently, apply
    /// observations, dispatch alerts, refresh statistics, persist.
    /// Returns the authoritative status per tunnel.
    pub async fn run_pass(&mut self) -> HashMap<String, TunnelStatus> {
        let source = Arc::clone(&self.source);
        let checks = self.tunnels.iter().map(|tunnel| {
            let source = Arc::clone(&source);
            async move { (tunnel, reconcile(source.as_ref(), tunnel).await) }
        });
        let results = futures::future::join_all(checks).await;

        let mut statuses = HashMap::new();
        let mut alerts = Vec::new();
        for (tunnel, record) in results {
            let observation =
                tracker::observe(&mut self.state, tunnel, &record, self.notifications_enabled);
            if let Some(alert) = observation.alert {
                alerts.push(alert);
            }
            statuses.insert(tunnel.key.clone(), record.status);
        }

        for alert in &alerts {
            if let Err(error) = self.dispatcher.dispatch(alert).await {
                log::warn!("Alert dispatch failed: {}", error);
            }
        }

        self.state.statistics = compute_statistics(&self.state.closure_history, Utc::now());
        self.persist().await;

        statuses
    }

    /// Flush state to the store. On failure, prune history to the newest
    /// entries and retry once; repeated failure keeps state in memory only.
    async fn persist(&mut self) {
        if let Err(error) = self.store.save(&self.state.snapshot()).await {
            log::warn!("State save failed: {}. Pruning history and retrying.", error);
            self.state.prune_history(PRUNE_KEEP);
            if let Err(error) = self.store.save(&self.state.snapshot()).await {
                log::error!(
                    "State save failed after pruning: {}. State remains in memory only.",
                    error
                );
            }
        }
    }

    /// Final flush at shutdown.
    pub async fn shutdown(&mut self) {
        self.persist().await;
    }
}

struct PassLoop {
    handle: JoinHandle<()>,
    stop: watch::Sender<bool>,
}

/// Drives periodic check passes: Idle -> Running -> Idle.
pub struct Scheduler {
    monitor: Arc<Mutex<Monitor>>,
    interval_ms: u64,
    running: Option<PassLoop>,
}

impl Scheduler {
    pub fn new(monitor: Monitor, interval_ms: u64) -> Self {
        Self {
            monitor: Arc::new(Mutex::new(monitor)),
            interval_ms,
            running: None,
        }
    }

    /// Shared handle to the monitor, for callers that trigger passes
    /// outside the timer (background check requests, CLI one-shots).
    pub fn monitor(&self) -> Arc<Mutex<Monitor>> {
        Arc::clone(&self.monitor)
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Start monitoring: one immediate pass, then a repeating timer.
    /// No-op when already running.
    pub async fn start(&mut self) {
        if self.running.is_some() {
            return;
        }

        let (stop_tx, mut stop_rx) = watch::channel(false);
        let monitor = Arc::clone(&self.monitor);
        let period = Duration::from_millis(self.interval_ms.max(1));

        monitor.lock().await.set_monitoring(true);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick fires immediately
            ticker.tick().await;
            loop {
                monitor.lock().await.run_pass().await;
                tokio::select! {
                    _ = stop_rx.changed() => break,
                    _ = ticker.tick() => {}
                }
            }
        });

        self.running = Some(PassLoop {
            handle,
            stop: stop_tx,
        });
        log::info!("Monitoring started ({} ms interval)", self.interval_ms);
    }

    /// Stop monitoring. Future passes are cancelled; an in-flight pass
    /// runs to completion first.
    pub async fn stop(&mut self) {
        let Some(pass_loop) = self.running.take() else {
            return;
        };

        let _ = pass_loop.stop.send(true);
        let _ = pass_loop.handle.await;
        self.monitor.lock().await.set_monitoring(false);
        log::info!("Monitoring stopped");
    }

    /// Change the check interval. When running, the timer restarts with
    /// the new cadence, which runs an immediate extra pass.
    pub async fn set_interval(&mut self, interval_ms: u64) {
        self.interval_ms = interval_ms;
        self.monitor.lock().await.set_check_interval(interval_ms);

        if self.running.is_some() {
            self.stop().await;
            self.start().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use crate::alert::Alert;
    use crate::error::Result;
    use crate::feed::EndpointKind;
    use crate::models::TunnelStatus;
    use crate::storage::MemoryStore;

    use super::*;

    /// Feed source that serves a fixed speed document and counts passes
    /// by incidents-endpoint hits.
    struct CannedSource {
        speed_xml: std::sync::Mutex<String>,
        incident_calls: AtomicUsize,
    }

    impl CannedSource {
        fn with_speed(speed: u32) -> Self {
            Self {
                speed_xml: std::sync::Mutex::new(Self::speed_doc(speed)),
                incident_calls: AtomicUsize::new(0),
            }
        }

        fn speed_doc(speed: u32) -> String {
            format!(
                "<measurements><measurement><location>A73 Roermond</location>\
                 <speed>{}</speed></measurement></measurements>",
                speed
            )
        }

        fn set_speed(&self, speed: u32) {
            *self.speed_xml.lock().unwrap() = Self::speed_doc(speed);
        }

        fn passes(&self) -> usize {
            self.incident_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl FeedSource for CannedSource {
        async fn fetch(&self, endpoint: EndpointKind) -> Result<String> {
            match endpoint {
                EndpointKind::Incidents => {
                    self.incident_calls.fetch_add(1, Ordering::SeqCst);
                    Ok("<incidents></incidents>".to_string())
                }
                EndpointKind::Roadworks => Ok("<roadworks></roadworks>".to_string()),
                EndpointKind::TrafficSpeed => Ok(self.speed_xml.lock().unwrap().clone()),
            }
        }
    }

    /// Dispatcher that records alerts.
    #[derive(Default)]
    struct RecordingDispatcher {
        alerts: std::sync::Mutex<Vec<Alert>>,
    }

    #[async_trait]
    impl AlertDispatcher for RecordingDispatcher {
        async fn dispatch(&self, alert: &Alert) -> Result<()> {
            self.alerts.lock().unwrap().push(alert.clone());
            Ok(())
        }
    }

    fn test_config() -> Config {
        let mut config = Config::default();
        config.tunnels.truncate(1); // keep roermond
        config.monitor.notifications_enabled = true;
        config
    }

    async fn test_monitor(
        source: Arc<CannedSource>,
        store: Arc<MemoryStore>,
        dispatcher: Arc<RecordingDispatcher>,
    ) -> Monitor {
        Monitor::hydrate(&test_config(), source, store, dispatcher).await
    }

    #[tokio::test]
    async fn first_pass_never_alerts_later_transitions_do() {
        let source = Arc::new(CannedSource::with_speed(100));
        let store = Arc::new(MemoryStore::new());
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let mut monitor =
            test_monitor(Arc::clone(&source), store, Arc::clone(&dispatcher)).await;

        let statuses = monitor.run_pass().await;
        assert_eq!(statuses["roermond"], TunnelStatus::Open);
        assert!(dispatcher.alerts.lock().unwrap().is_empty());

        // Tunnel closes: transition fires exactly one alert
        source.set_speed(0);
        let statuses = monitor.run_pass().await;
        assert_eq!(statuses["roermond"], TunnelStatus::Closed);
        let alerts = dispatcher.alerts.lock().unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].tunnel_key, "roermond");
        assert!(alerts[0].urgent);
    }

    #[tokio::test]
    async fn pass_persists_state_to_store() {
        let source = Arc::new(CannedSource::with_speed(100));
        let store = Arc::new(MemoryStore::new());
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let mut monitor =
            test_monitor(Arc::clone(&source), Arc::clone(&store), dispatcher).await;

        monitor.run_pass().await;
        source.set_speed(0);
        monitor.run_pass().await;

        let persisted = store.snapshot();
        assert_eq!(persisted.closure_history["roermond"].len(), 1);
        assert!(persisted.statistics.last_update.is_some());
    }

    #[tokio::test]
    async fn failed_save_prunes_and_retries() {
        let source = Arc::new(CannedSource::with_speed(100));
        let store = Arc::new(MemoryStore::new());
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let mut monitor =
            test_monitor(Arc::clone(&source), Arc::clone(&store), dispatcher).await;

        // Build up more history than the prune threshold
        for i in 0..60 {
            source.set_speed(if i % 2 == 0 { 0 } else { 100 });
            monitor.run_pass().await;
        }
        assert_eq!(monitor.state().closure_history["roermond"].len(), 50);

        store.fail_next_saves(1);
        source.set_speed(15);
        monitor.run_pass().await;

        // First save failed, history was pruned, retry landed
        assert_eq!(monitor.state().closure_history["roermond"].len(), PRUNE_KEEP);
        assert_eq!(store.snapshot().closure_history["roermond"].len(), PRUNE_KEEP);
    }

    #[tokio::test]
    async fn scheduler_runs_immediate_and_periodic_passes() {
        let source = Arc::new(CannedSource::with_speed(100));
        let store = Arc::new(MemoryStore::new());
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let monitor = test_monitor(Arc::clone(&source), store, dispatcher).await;

        let mut scheduler = Scheduler::new(monitor, 25);
        scheduler.start().await;
        assert!(scheduler.is_running());
        // Starting twice is a no-op
        scheduler.start().await;

        tokio::time::sleep(Duration::from_millis(120)).await;
        let seen = source.passes();
        assert!(seen >= 2, "expected immediate + periodic passes, got {}", seen);

        scheduler.stop().await;
        assert!(!scheduler.is_running());
        assert!(!scheduler.monitor().lock().await.state().is_monitoring);

        let frozen = source.passes();
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(source.passes(), frozen);
    }

    #[tokio::test]
    async fn set_interval_restarts_running_timer() {
        let source = Arc::new(CannedSource::with_speed(100));
        let store = Arc::new(MemoryStore::new());
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let monitor = test_monitor(Arc::clone(&source), store, dispatcher).await;

        let mut scheduler = Scheduler::new(monitor, 60_000);
        scheduler.start().await;
        tokio::time::sleep(Duration::from_millis(40)).await;
        let before = source.passes();
        assert_eq!(before, 1); // immediate pass only, long interval

        scheduler.set_interval(25).await;
        tokio::time::sleep(Duration::from_millis(120)).await;
        assert!(source.passes() > before);
        assert_eq!(
            scheduler.monitor().lock().await.state().check_interval_ms,
            25
        );

        scheduler.stop().await;
    }
}
