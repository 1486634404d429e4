use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::shared::error::{AppError, Result};

pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Closed set of mutating intents the remote authority accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Checkin,
    Checkout,
    VisitorCreate,
    VisitorUpdate,
    VehicleCreate,
    VehicleUpdate,
    PreRegistration,
}

impl ActionKind {
    pub const ALL: [ActionKind; 7] = [
        ActionKind::Checkin,
        ActionKind::Checkout,
        ActionKind::VisitorCreate,
        ActionKind::VisitorUpdate,
        ActionKind::VehicleCreate,
        ActionKind::VehicleUpdate,
        ActionKind::PreRegistration,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Checkin => "checkin",
            ActionKind::Checkout => "checkout",
            ActionKind::VisitorCreate => "visitor_create",
            ActionKind::VisitorUpdate => "visitor_update",
            ActionKind::VehicleCreate => "vehicle_create",
            ActionKind::VehicleUpdate => "vehicle_update",
            ActionKind::PreRegistration => "pre_registration",
        }
    }

    pub fn parse(kind: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|k| k.as_str() == kind)
            .ok_or_else(|| AppError::Validation(format!("unknown action kind: {kind}")))
    }

    /// Remote endpoint path relative to the API base URL.
    pub fn endpoint(&self) -> &'static str {
        match self {
            ActionKind::Checkin => "checkin",
            ActionKind::Checkout => "checkout",
            ActionKind::VisitorCreate | ActionKind::VisitorUpdate => "visitors",
            ActionKind::VehicleCreate | ActionKind::VehicleUpdate => "vehicles",
            ActionKind::PreRegistration => "pre-registrations",
        }
    }

    /// Cache collection a successful create/update result lands in.
    pub fn entity_collection(&self) -> Option<&'static str> {
        match self {
            ActionKind::VisitorCreate | ActionKind::VisitorUpdate => Some("visitors"),
            ActionKind::VehicleCreate | ActionKind::VehicleUpdate => Some("vehicles"),
            _ => None,
        }
    }

    /// Response field carrying the server-assigned identifier for this kind.
    pub fn server_id_field(&self) -> Option<&'static str> {
        match self {
            ActionKind::VisitorCreate | ActionKind::VisitorUpdate => Some("visitor_id"),
            ActionKind::VehicleCreate | ActionKind::VehicleUpdate => Some("vehicle_id"),
            _ => None,
        }
    }

    pub fn is_create(&self) -> bool {
        matches!(self, ActionKind::VisitorCreate | ActionKind::VehicleCreate)
    }

    /// Payload fields that must be present and non-null for this kind.
    fn required_fields(&self) -> &'static [&'static str] {
        match self {
            ActionKind::Checkin => &["visitor_id"],
            ActionKind::Checkout => &["visit_id"],
            ActionKind::VisitorCreate => &["name"],
            ActionKind::VisitorUpdate => &["id"],
            ActionKind::VehicleCreate => &["plate"],
            ActionKind::VehicleUpdate => &["id"],
            ActionKind::PreRegistration => &["name"],
        }
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated domain command: one variant per action kind, each carrying the
/// exact JSON-object body the remote API expects for that kind. Construction
/// is the only validation point; a command that exists is well-formed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "snake_case")]
pub enum ActionCommand {
    Checkin(Map<String, Value>),
    Checkout(Map<String, Value>),
    VisitorCreate(Map<String, Value>),
    VisitorUpdate(Map<String, Value>),
    VehicleCreate(Map<String, Value>),
    VehicleUpdate(Map<String, Value>),
    PreRegistration(Map<String, Value>),
}

impl ActionCommand {
    pub fn new(kind: ActionKind, payload: Value) -> Result<Self> {
        let map = match payload {
            Value::Object(map) => map,
            other => {
                return Err(AppError::Validation(format!(
                    "payload for `{kind}` must be a JSON object, got {other}"
                )));
            }
        };

        for field in kind.required_fields() {
            match map.get(*field) {
                Some(value) if !value.is_null() => {}
                _ => {
                    return Err(AppError::Validation(format!(
                        "payload for `{kind}` is missing required field `{field}`"
                    )));
                }
            }
        }

        Ok(match kind {
            ActionKind::Checkin => ActionCommand::Checkin(map),
            ActionKind::Checkout => ActionCommand::Checkout(map),
            ActionKind::VisitorCreate => ActionCommand::VisitorCreate(map),
            ActionKind::VisitorUpdate => ActionCommand::VisitorUpdate(map),
            ActionKind::VehicleCreate => ActionCommand::VehicleCreate(map),
            ActionKind::VehicleUpdate => ActionCommand::VehicleUpdate(map),
            ActionKind::PreRegistration => ActionCommand::PreRegistration(map),
        })
    }

    /// Validates a loosely-typed `(kind, payload)` pair, e.g. from a form.
    pub fn from_parts(kind: &str, payload: Value) -> Result<Self> {
        Self::new(ActionKind::parse(kind)?, payload)
    }

    pub fn kind(&self) -> ActionKind {
        match self {
            ActionCommand::Checkin(_) => ActionKind::Checkin,
            ActionCommand::Checkout(_) => ActionKind::Checkout,
            ActionCommand::VisitorCreate(_) => ActionKind::VisitorCreate,
            ActionCommand::VisitorUpdate(_) => ActionKind::VisitorUpdate,
            ActionCommand::VehicleCreate(_) => ActionKind::VehicleCreate,
            ActionCommand::VehicleUpdate(_) => ActionKind::VehicleUpdate,
            ActionCommand::PreRegistration(_) => ActionKind::PreRegistration,
        }
    }

    pub fn payload(&self) -> &Map<String, Value> {
        match self {
            ActionCommand::Checkin(map)
            | ActionCommand::Checkout(map)
            | ActionCommand::VisitorCreate(map)
            | ActionCommand::VisitorUpdate(map)
            | ActionCommand::VehicleCreate(map)
            | ActionCommand::VehicleUpdate(map)
            | ActionCommand::PreRegistration(map) => map,
        }
    }

    pub fn payload_value(&self) -> Value {
        Value::Object(self.payload().clone())
    }

    /// Client-generated provisional identity carried by create payloads.
    pub fn provisional_id(&self) -> Option<&str> {
        self.payload().get("local_id").and_then(Value::as_str)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    Pending,
    Retrying,
    Failed,
}

impl ActionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionStatus::Pending => "pending",
            ActionStatus::Retrying => "retrying",
            ActionStatus::Failed => "failed",
        }
    }
}

/// A persisted intent to perform one mutating remote operation. Lives in the
/// `action_queue` collection with status Pending or Retrying until it is
/// deleted on success, or parked as Failed once the retry budget is spent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuedAction {
    pub id: String,
    #[serde(flatten)]
    pub command: ActionCommand,
    pub priority: i64,
    pub enqueued_at: i64,
    pub retry_count: u32,
    pub status: ActionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_attempt_at: Option<i64>,
}

impl QueuedAction {
    pub fn new(command: ActionCommand, priority: i64) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            command,
            priority,
            enqueued_at: now_millis(),
            retry_count: 0,
            status: ActionStatus::Pending,
            last_error: None,
            last_attempt_at: None,
        }
    }

    pub fn kind(&self) -> ActionKind {
        self.command.kind()
    }

    /// Eligible for the next drain pass.
    pub fn is_eligible(&self) -> bool {
        matches!(self.status, ActionStatus::Pending | ActionStatus::Retrying)
    }

    /// Records one failed attempt. Returns true when the failure is terminal.
    pub fn record_failure(&mut self, error: String, at: i64, max_retries: u32) -> bool {
        self.retry_count += 1;
        self.last_error = Some(error);
        self.last_attempt_at = Some(at);
        if self.retry_count >= max_retries {
            self.status = ActionStatus::Failed;
            true
        } else {
            self.status = ActionStatus::Retrying;
            false
        }
    }

    /// Promotes a Retrying action back to Pending once the retry delay has
    /// elapsed. Returns true when the promotion happened.
    pub fn promote_if_due(&mut self, now: i64, retry_delay_ms: i64) -> bool {
        if self.status != ActionStatus::Retrying {
            return false;
        }
        let due = match self.last_attempt_at {
            Some(at) => now - at >= retry_delay_ms,
            None => true,
        };
        if due {
            self.status = ActionStatus::Pending;
        }
        due
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unknown_kind_is_rejected() {
        let err = ActionCommand::from_parts("visitor_delete", json!({"id": "v1"})).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn non_object_payload_is_rejected() {
        let err = ActionCommand::new(ActionKind::Checkin, json!([1, 2, 3])).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn missing_required_field_is_rejected() {
        let err = ActionCommand::new(ActionKind::Checkin, json!({"gate": "north"})).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let err =
            ActionCommand::new(ActionKind::Checkin, json!({"visitor_id": null})).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn every_kind_round_trips_through_its_string_form() {
        for kind in ActionKind::ALL {
            assert_eq!(ActionKind::parse(kind.as_str()).unwrap(), kind);
        }
    }

    #[test]
    fn queued_action_serializes_kind_and_payload_at_top_level() {
        let command =
            ActionCommand::new(ActionKind::Checkin, json!({"visitor_id": "v1"})).unwrap();
        let action = QueuedAction::new(command, 3);
        let value = serde_json::to_value(&action).unwrap();

        assert_eq!(value["kind"], "checkin");
        assert_eq!(value["payload"]["visitor_id"], "v1");
        assert_eq!(value["status"], "pending");

        let back: QueuedAction = serde_json::from_value(value).unwrap();
        assert_eq!(back.kind(), ActionKind::Checkin);
        assert_eq!(back.id, action.id);
    }

    #[test]
    fn record_failure_parks_action_after_budget_exhausted() {
        let command =
            ActionCommand::new(ActionKind::Checkout, json!({"visit_id": "x"})).unwrap();
        let mut action = QueuedAction::new(command, 1);

        assert!(!action.record_failure("boom".into(), 10, 3));
        assert_eq!(action.status, ActionStatus::Retrying);
        assert!(!action.record_failure("boom".into(), 20, 3));
        assert!(action.record_failure("boom".into(), 30, 3));
        assert_eq!(action.status, ActionStatus::Failed);
        assert_eq!(action.retry_count, 3);
        assert!(!action.is_eligible());
    }

    #[test]
    fn promote_if_due_honors_retry_delay() {
        let command =
            ActionCommand::new(ActionKind::Checkout, json!({"visit_id": "x"})).unwrap();
        let mut action = QueuedAction::new(command, 1);
        action.record_failure("boom".into(), 1_000, 3);

        assert!(!action.promote_if_due(4_000, 5_000));
        assert_eq!(action.status, ActionStatus::Retrying);
        assert!(action.promote_if_due(6_000, 5_000));
        assert_eq!(action.status, ActionStatus::Pending);
    }
}
