//! Bookkeeping fields shared by every stored document

use bson::DateTime;
use serde::{Deserialize, Serialize};

/// Timestamps plus the soft-delete flag the collection wrapper filters on
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct Metadata {
    /// Soft-deleted documents are invisible to every read
    #[serde(default)]
    pub is_deleted: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime>,
}

impl Metadata {
    /// Metadata for a document first written at `at`
    pub fn created(at: DateTime) -> Self {
        Self {
            is_deleted: false,
            created_at: Some(at),
            updated_at: Some(at),
        }
    }
}
