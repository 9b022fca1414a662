//! Lifecycle event records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::lifecycle::{LifecycleEventType, PassportStatus};

/// Immutable audit record of one status transition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LifecycleEvent {
    pub id: String,
    pub passport_id: String,
    pub event_type: LifecycleEventType,
    /// Acting email, or "system"
    pub actor: String,
    pub metadata: Map<String, Value>,
    pub created_at: DateTime<Utc>,
}

impl LifecycleEvent {
    /// Build the event for `previous -> new_status`.
    ///
    /// `previous_status` and `new_status` are written over any caller keys
    /// of the same name.
    pub fn for_transition(
        passport_id: &str,
        previous: PassportStatus,
        new_status: PassportStatus,
        actor: &str,
        metadata: Option<Map<String, Value>>,
        at: DateTime<Utc>,
    ) -> Self {
        let mut metadata = metadata.unwrap_or_default();
        metadata.insert(
            "previous_status".into(),
            Value::String(previous.as_str().to_string()),
        );
        metadata.insert(
            "new_status".into(),
            Value::String(new_status.as_str().to_string()),
        );

        Self {
            id: Uuid::new_v4().to_string(),
            passport_id: passport_id.to_string(),
            event_type: new_status.event_type(),
            actor: actor.to_string(),
            metadata,
            created_at: at,
        }
    }

    pub fn previous_status(&self) -> Option<&str> {
        self.metadata.get("previous_status").and_then(Value::as_str)
    }

    pub fn new_status(&self) -> Option<&str> {
        self.metadata.get("new_status").and_then(Value::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_transition_metadata_merged() {
        let mut caller = Map::new();
        caller.insert("carrier".into(), json!("DHL"));
        caller.insert("previous_status".into(), json!("forged"));

        let event = LifecycleEvent::for_transition(
            "p-1",
            PassportStatus::Active,
            PassportStatus::Shipped,
            "courier@example.com",
            Some(caller),
            Utc::now(),
        );

        assert_eq!(event.event_type, LifecycleEventType::Shipped);
        assert_eq!(event.metadata["carrier"], json!("DHL"));
        assert_eq!(event.previous_status(), Some("ACTIVE"));
        assert_eq!(event.new_status(), Some("SHIPPED"));
    }

    #[test]
    fn test_event_ids_unique() {
        let now = Utc::now();
        let a = LifecycleEvent::for_transition(
            "p-1",
            PassportStatus::Active,
            PassportStatus::Shipped,
            "system",
            None,
            now,
        );
        let b = LifecycleEvent::for_transition(
            "p-1",
            PassportStatus::Active,
            PassportStatus::Shipped,
            "system",
            None,
            now,
        );
        assert_ne!(a.id, b.id);
    }
}
