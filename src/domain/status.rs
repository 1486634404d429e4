use serde::{Deserialize, Serialize};

/// Engine state transitions emitted to the UI collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SyncStatusEvent {
    Offline,
    Syncing,
    Synced { processed: u32 },
    Error { processed: u32, failed: u32 },
}

/// Result of one drain pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainOutcome {
    /// Another pass was already in progress; nothing was attempted.
    pub skipped: bool,
    /// Actions delivered and removed during this pass.
    pub processed: u32,
    /// Actions that exhausted their retry budget during this pass.
    pub failed: u32,
    /// Items skipped because local persistence failed mid-pass.
    pub storage_errors: u32,
}

/// Operator-facing counters, exposed on demand.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncStats {
    pub is_online: bool,
    pub pending_actions: u64,
    pub failed_actions: u64,
    pub cached_visitors: u64,
    pub cached_vehicles: u64,
    pub cached_codes: u64,
    pub last_sync_at: Option<i64>,
    pub storage_bytes: u64,
}
