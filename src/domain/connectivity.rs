use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

/// Where a connectivity confirmation came from. Passive link signals give
/// low-latency feedback; the active probe is the trigger of record for sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalSource {
    Link,
    Probe,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityEvent {
    Online,
    Offline,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectivityTransition {
    pub online: bool,
    pub source: SignalSource,
    pub at: i64,
}

/// Confirmed connectivity state plus a bounded transition history.
#[derive(Debug, Clone)]
pub struct ConnectivityState {
    pub is_online: bool,
    pub last_transition_at: Option<i64>,
    pub history: VecDeque<ConnectivityTransition>,
    history_limit: usize,
}

impl ConnectivityState {
    pub fn new(history_limit: usize) -> Self {
        Self {
            is_online: false,
            last_transition_at: None,
            history: VecDeque::with_capacity(history_limit),
            history_limit,
        }
    }

    /// Applies a confirmed observation. Returns the transition event when the
    /// state actually changed; repeated confirmations of the same state are
    /// absorbed here.
    pub fn confirm(
        &mut self,
        online: bool,
        source: SignalSource,
        at: i64,
    ) -> Option<ConnectivityEvent> {
        if self.is_online == online {
            return None;
        }

        self.is_online = online;
        self.last_transition_at = Some(at);
        if self.history.len() == self.history_limit {
            self.history.pop_front();
        }
        self.history.push_back(ConnectivityTransition { online, source, at });

        Some(if online {
            ConnectivityEvent::Online
        } else {
            ConnectivityEvent::Offline
        })
    }
}
