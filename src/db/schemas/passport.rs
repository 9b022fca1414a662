//! Passport document schema
//!
//! One authoritative document per battery passport.

use bson::{doc, oid::ObjectId, DateTime, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::{from_bson_time, from_bson_time_opt, to_bson_time_opt, Metadata};
use crate::lifecycle::{Passport, PassportStatus};

/// Collection name for passports
pub const PASSPORT_COLLECTION: &str = "passports";

/// Passport document stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct PassportDoc {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    #[serde(default)]
    pub metadata: Metadata,

    /// Public passport id (unique)
    pub passport_id: String,

    pub tenant_id: String,

    pub serial_number: String,

    pub status: PassportStatus,

    #[serde(default)]
    pub shipped_at: Option<DateTime>,

    #[serde(default)]
    pub installed_at: Option<DateTime>,

    #[serde(default)]
    pub returned_at: Option<DateTime>,

    #[serde(default)]
    pub recycled_at: Option<DateTime>,
}

impl From<Passport> for PassportDoc {
    fn from(p: Passport) -> Self {
        let mut metadata = Metadata::created(DateTime::from_chrono(p.created_at));
        metadata.updated_at = Some(DateTime::from_chrono(p.updated_at));
        Self {
            _id: None,
            metadata,
            passport_id: p.id,
            tenant_id: p.tenant_id,
            serial_number: p.serial_number,
            status: p.status,
            shipped_at: to_bson_time_opt(p.shipped_at),
            installed_at: to_bson_time_opt(p.installed_at),
            returned_at: to_bson_time_opt(p.returned_at),
            recycled_at: to_bson_time_opt(p.recycled_at),
        }
    }
}

impl From<PassportDoc> for Passport {
    fn from(d: PassportDoc) -> Self {
        Self {
            id: d.passport_id,
            tenant_id: d.tenant_id,
            serial_number: d.serial_number,
            status: d.status,
            shipped_at: from_bson_time_opt(d.shipped_at),
            installed_at: from_bson_time_opt(d.installed_at),
            returned_at: from_bson_time_opt(d.returned_at),
            recycled_at: from_bson_time_opt(d.recycled_at),
            created_at: from_bson_time(d.metadata.created_at),
            updated_at: from_bson_time(d.metadata.updated_at),
        }
    }
}

impl IntoIndexes for PassportDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            (
                doc! { "passport_id": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("passport_id_unique".to_string())
                        .build(),
                ),
            ),
            (
                doc! { "tenant_id": 1, "status": 1 },
                Some(
                    IndexOptions::builder()
                        .name("tenant_status_index".to_string())
                        .build(),
                ),
            ),
        ]
    }
}

impl MutMetadata for PassportDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}
