use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tracing::info;

use crate::application::ports::remote_api::RemoteApi;
use crate::domain::action::now_millis;
use crate::domain::connectivity::{ConnectivityEvent, ConnectivityState, SignalSource};

/// Tracks confirmed online/offline state from two sources: passive link
/// signals applied immediately, and the periodic reachability probe. Captive
/// portals make link signals lie, so the probe is the trigger of record for
/// sync; both paths go through the same transition dedup.
pub struct ConnectivityMonitor {
    remote: Arc<dyn RemoteApi>,
    state: RwLock<ConnectivityState>,
    events: broadcast::Sender<ConnectivityEvent>,
}

impl ConnectivityMonitor {
    pub fn new(remote: Arc<dyn RemoteApi>, history_limit: usize) -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            remote,
            state: RwLock::new(ConnectivityState::new(history_limit)),
            events,
        }
    }

    pub async fn is_online(&self) -> bool {
        self.state.read().await.is_online
    }

    pub async fn snapshot(&self) -> ConnectivityState {
        self.state.read().await.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ConnectivityEvent> {
        self.events.subscribe()
    }

    /// Platform-level connect/disconnect signal, applied immediately.
    pub async fn report_link(&self, online: bool) {
        self.confirm(online, SignalSource::Link).await;
    }

    /// One active reachability check. Returns the confirmed state.
    pub async fn probe_once(&self) -> bool {
        let online = self.remote.probe().await;
        self.confirm(online, SignalSource::Probe).await;
        online
    }

    async fn confirm(&self, online: bool, source: SignalSource) {
        let event = {
            let mut state = self.state.write().await;
            state.confirm(online, source, now_millis())
        };

        if let Some(event) = event {
            info!(online, ?source, "connectivity transition");
            // No subscribers is fine; the engine may not be started yet.
            let _ = self.events.send(event);
        }
    }

    /// Probe on a fixed interval until the handle is aborted.
    pub fn spawn_probe_loop(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let monitor = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                monitor.probe_once().await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::remote_api::RemoteResponse;
    use crate::domain::action::ActionKind;
    use crate::shared::error::Result;
    use async_trait::async_trait;
    use serde_json::Value;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    struct ScriptedRemote {
        probes: Mutex<VecDeque<bool>>,
    }

    impl ScriptedRemote {
        fn new(probes: impl IntoIterator<Item = bool>) -> Arc<Self> {
            Arc::new(Self {
                probes: Mutex::new(probes.into_iter().collect()),
            })
        }
    }

    #[async_trait]
    impl RemoteApi for ScriptedRemote {
        async fn submit(&self, _kind: ActionKind, _payload: Value) -> Result<RemoteResponse> {
            unreachable!("connectivity tests never submit");
        }

        async fn probe(&self) -> bool {
            self.probes.lock().unwrap().pop_front().unwrap_or(false)
        }
    }

    #[tokio::test]
    async fn starts_offline_and_transitions_on_first_successful_probe() {
        let monitor = ConnectivityMonitor::new(ScriptedRemote::new([true]), 10);
        let mut events = monitor.subscribe();

        assert!(!monitor.is_online().await);
        assert!(monitor.probe_once().await);
        assert!(monitor.is_online().await);
        assert_eq!(events.recv().await.unwrap(), ConnectivityEvent::Online);
    }

    #[tokio::test]
    async fn repeated_probes_notify_exactly_once_per_transition() {
        let monitor = ConnectivityMonitor::new(ScriptedRemote::new([true, true, true, false]), 10);
        let mut events = monitor.subscribe();

        for _ in 0..3 {
            monitor.probe_once().await;
        }
        monitor.probe_once().await;

        assert_eq!(events.recv().await.unwrap(), ConnectivityEvent::Online);
        assert_eq!(events.recv().await.unwrap(), ConnectivityEvent::Offline);
        assert!(events.try_recv().is_err());

        let snapshot = monitor.snapshot().await;
        assert_eq!(snapshot.history.len(), 2);
    }

    #[tokio::test]
    async fn link_signal_applies_immediately() {
        let monitor = ConnectivityMonitor::new(ScriptedRemote::new([]), 10);
        let mut events = monitor.subscribe();

        monitor.report_link(true).await;
        assert!(monitor.is_online().await);
        assert_eq!(events.recv().await.unwrap(), ConnectivityEvent::Online);

        // A later probe finding the API unreachable overrides the link signal.
        monitor.probe_once().await;
        assert!(!monitor.is_online().await);
        assert_eq!(events.recv().await.unwrap(), ConnectivityEvent::Offline);
    }
}
