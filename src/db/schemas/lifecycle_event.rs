//! Lifecycle event document schema
//!
//! Append-only audit ledger. Documents are never updated.

use bson::{doc, oid::ObjectId, DateTime, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::audit::LifecycleEvent;
use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;
use crate::lifecycle::LifecycleEventType;
use crate::types::Result;

/// Collection name for lifecycle events
pub const LIFECYCLE_EVENT_COLLECTION: &str = "lifecycle_events";

/// Lifecycle event document stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct LifecycleEventDoc {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    #[serde(default)]
    pub metadata: Metadata,

    /// Public event id (unique)
    pub event_id: String,

    pub passport_id: String,

    pub event_type: LifecycleEventType,

    /// Acting email, or "system"
    pub actor: String,

    /// Caller metadata plus previous/new status
    #[serde(default)]
    pub event_metadata: Document,

    pub created_at: DateTime,
}

impl Default for LifecycleEventDoc {
    fn default() -> Self {
        Self {
            _id: None,
            metadata: Metadata::default(),
            event_id: String::new(),
            passport_id: String::new(),
            event_type: LifecycleEventType::Reactivated,
            actor: String::new(),
            event_metadata: Document::new(),
            created_at: DateTime::now(),
        }
    }
}

impl LifecycleEventDoc {
    pub fn from_event(event: &LifecycleEvent) -> Result<Self> {
        Ok(Self {
            _id: None,
            metadata: Metadata::created(DateTime::from_chrono(event.created_at)),
            event_id: event.id.clone(),
            passport_id: event.passport_id.clone(),
            event_type: event.event_type,
            actor: event.actor.clone(),
            event_metadata: bson::to_document(&event.metadata)?,
            created_at: DateTime::from_chrono(event.created_at),
        })
    }

    pub fn into_event(self) -> Result<LifecycleEvent> {
        Ok(LifecycleEvent {
            id: self.event_id,
            passport_id: self.passport_id,
            event_type: self.event_type,
            actor: self.actor,
            metadata: bson::from_document(self.event_metadata)?,
            created_at: self.created_at.to_chrono(),
        })
    }
}

impl IntoIndexes for LifecycleEventDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            (
                doc! { "event_id": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("event_id_unique".to_string())
                        .build(),
                ),
            ),
            // Chronological reads per passport
            (
                doc! { "passport_id": 1, "created_at": 1 },
                Some(
                    IndexOptions::builder()
                        .name("passport_created_index".to_string())
                        .build(),
                ),
            ),
        ]
    }
}

impl MutMetadata for LifecycleEventDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}
