use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::action::ActionKind;

/// Snapshot of in-progress form state, persisted so work survives reloads.
/// Superseded on every autosave; deleted on successful submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormDraft {
    pub form_id: String,
    pub fields: Map<String, Value>,
    pub saved_at: i64,
}

/// How a form participates in offline submission: which command its fields
/// become, at what queue priority.
#[derive(Debug, Clone)]
pub struct FormRegistration {
    pub form_id: String,
    pub kind: ActionKind,
    pub priority: i64,
    pub offline_capable: bool,
}
