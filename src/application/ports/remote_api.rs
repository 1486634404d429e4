use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::domain::action::ActionKind;
use crate::shared::error::Result;

/// What the remote authority answered for one domain command. Anything
/// without `success: true` is a retryable rejection.
#[derive(Debug, Clone, Default)]
pub struct RemoteResponse {
    pub success: bool,
    pub message: Option<String>,
    /// Remaining response fields: server-assigned identifiers and any
    /// authoritative entity fields.
    pub body: Map<String, Value>,
}

impl RemoteResponse {
    pub fn from_value(value: Value) -> Self {
        let mut body = match value {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        let success = body
            .remove("success")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        let message = body
            .remove("message")
            .and_then(|v| v.as_str().map(str::to_string));
        Self {
            success,
            message,
            body,
        }
    }

    /// Server-assigned identifier for this kind, normalized to a string.
    /// Falls back to a bare `id` field when the kind-specific one is absent.
    pub fn server_id(&self, kind: ActionKind) -> Option<String> {
        let candidates: &[&str] = match kind.server_id_field() {
            Some(field) => &[field, "id"][..],
            None => &["id"][..],
        };
        for field in candidates {
            match self.body.get(*field) {
                Some(Value::String(s)) if !s.is_empty() => return Some(s.clone()),
                Some(Value::Number(n)) => return Some(n.to_string()),
                _ => {}
            }
        }
        None
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.body.get(name)
    }
}

/// The remote authority, consumed over HTTP. `submit` delivers one domain
/// command; `probe` is the bounded reachability check the monitor relies on.
#[async_trait]
pub trait RemoteApi: Send + Sync {
    async fn submit(&self, kind: ActionKind, payload: Value) -> Result<RemoteResponse>;

    /// Lightweight reachability request. Any non-success, including timeout,
    /// reads as offline; this must never error.
    async fn probe(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_success_message_and_entity_id() {
        let resp = RemoteResponse::from_value(json!({
            "success": true,
            "message": "created",
            "visitor_id": 42,
            "name": "Ada"
        }));
        assert!(resp.success);
        assert_eq!(resp.message.as_deref(), Some("created"));
        assert_eq!(resp.server_id(ActionKind::VisitorCreate), Some("42".into()));
        assert_eq!(resp.field("name"), Some(&json!("Ada")));
    }

    #[test]
    fn missing_success_flag_reads_as_rejection() {
        let resp = RemoteResponse::from_value(json!({"message": "nope"}));
        assert!(!resp.success);
    }

    #[test]
    fn falls_back_to_bare_id_field() {
        let resp = RemoteResponse::from_value(json!({"success": true, "id": "abc"}));
        assert_eq!(resp.server_id(ActionKind::VehicleCreate), Some("abc".into()));
    }
}
