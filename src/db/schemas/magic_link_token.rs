//! Magic link token document schema
//!
//! Stores the SHA-256 hash of each issued token for single-use and audit
//! bookkeeping. The plaintext token is never written.

use bson::{doc, oid::ObjectId, DateTime, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::auth::{ActorRole, TokenRecord};
use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::{from_bson_time, from_bson_time_opt, Metadata};
use crate::trust::TrustTier;

/// Collection name for magic link tokens
pub const MAGIC_LINK_TOKEN_COLLECTION: &str = "magic_link_tokens";

/// Magic link token document stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct MagicLinkTokenDoc {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    #[serde(default)]
    pub metadata: Metadata,

    pub token_id: String,

    /// SHA-256 hex of the signed token (unique)
    pub token_hash: String,

    pub passport_id: String,

    pub email: String,

    pub role: ActorRole,

    pub tier: TrustTier,

    pub expires_at: DateTime,

    /// Null until the link is used. Kept as a stored field so the
    /// mark-used guard can match on `null`.
    #[serde(default)]
    pub used_at: Option<DateTime>,
}

impl Default for MagicLinkTokenDoc {
    fn default() -> Self {
        Self {
            _id: None,
            metadata: Metadata::default(),
            token_id: String::new(),
            token_hash: String::new(),
            passport_id: String::new(),
            email: String::new(),
            role: ActorRole::Customer,
            tier: TrustTier::Rejected,
            expires_at: DateTime::now(),
            used_at: None,
        }
    }
}

impl From<TokenRecord> for MagicLinkTokenDoc {
    fn from(r: TokenRecord) -> Self {
        let metadata = Metadata::created(DateTime::from_chrono(r.created_at));
        Self {
            _id: None,
            metadata,
            token_id: r.token_id,
            token_hash: r.token_hash,
            passport_id: r.asset_id,
            email: r.email,
            role: r.role,
            tier: r.tier,
            expires_at: DateTime::from_chrono(r.expires_at),
            used_at: r.used_at.map(DateTime::from_chrono),
        }
    }
}

impl From<MagicLinkTokenDoc> for TokenRecord {
    fn from(d: MagicLinkTokenDoc) -> Self {
        Self {
            token_id: d.token_id,
            token_hash: d.token_hash,
            asset_id: d.passport_id,
            email: d.email,
            role: d.role,
            tier: d.tier,
            expires_at: d.expires_at.to_chrono(),
            used_at: from_bson_time_opt(d.used_at),
            created_at: from_bson_time(d.metadata.created_at),
        }
    }
}

impl IntoIndexes for MagicLinkTokenDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            (
                doc! { "token_hash": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("token_hash_unique".to_string())
                        .build(),
                ),
            ),
            // Usage queries per passport for audit
            (
                doc! { "passport_id": 1 },
                Some(
                    IndexOptions::builder()
                        .name("passport_id_index".to_string())
                        .build(),
                ),
            ),
        ]
    }
}

impl MutMetadata for MagicLinkTokenDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}
