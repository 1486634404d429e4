pub mod action_queue;
pub mod connectivity;
pub mod engine;
pub mod entity_cache;
pub mod form_drafts;

pub use action_queue::ActionQueue;
pub use connectivity::ConnectivityMonitor;
pub use engine::SyncEngine;
pub use entity_cache::EntityCache;
pub use form_drafts::FormDraftManager;
