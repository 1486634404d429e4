//! Offline-first synchronization engine for a gatehouse visitor-management
//! client. Mutating operations are persisted to a local outbox before any
//! network attempt, replayed in priority order once the remote API is
//! reachable, and reflected back into a local entity cache for offline
//! lookups.

pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod shared;

pub use application::ports::remote_api::{RemoteApi, RemoteResponse};
pub use application::ports::status_sink::{NullStatusSink, SyncStatusSink};
pub use application::services::{
    ActionQueue, ConnectivityMonitor, EntityCache, FormDraftManager, SyncEngine,
};
pub use domain::action::{ActionCommand, ActionKind, ActionStatus, QueuedAction};
pub use domain::connectivity::ConnectivityEvent;
pub use domain::draft::{FormDraft, FormRegistration};
pub use domain::status::{DrainOutcome, SyncStats, SyncStatusEvent};
pub use infrastructure::remote::HttpRemoteApi;
pub use infrastructure::status::LogStatusSink;
pub use infrastructure::store::{collections, LocalStore};
pub use shared::config::AppConfig;
pub use shared::error::{AppError, Result};
