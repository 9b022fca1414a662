//! Partner code document schema (Tier B partners)

use bson::{doc, oid::ObjectId, DateTime, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::auth::ActorRole;
use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::{from_bson_time, from_bson_time_opt, to_bson_time_opt, Metadata};
use crate::trust::{PartnerCode, PartnerCodeRedemption};

/// Collection name for partner codes
pub const PARTNER_CODE_COLLECTION: &str = "partner_codes";

/// One consumption of a partner code
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct RedemptionDoc {
    pub email: String,
    pub asset_id: String,
    pub redeemed_at: DateTime,
}

/// Partner code document stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct PartnerCodeDoc {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    #[serde(default)]
    pub metadata: Metadata,

    /// Public code id (unique)
    pub code_id: String,

    pub tenant_id: String,

    /// Normalized code string (unique)
    pub code: String,

    #[serde(default)]
    pub company_name: Option<String>,

    pub role: ActorRole,

    /// Null means unlimited. Kept as a stored field (not omitted) so the
    /// usage guard can match on `null`.
    #[serde(default)]
    pub max_uses: Option<i64>,

    #[serde(default)]
    pub current_uses: i64,

    #[serde(default)]
    pub expires_at: Option<DateTime>,

    #[serde(default = "default_true")]
    pub is_active: bool,

    #[serde(default)]
    pub redemptions: Vec<RedemptionDoc>,
}

fn default_true() -> bool {
    true
}

impl Default for PartnerCodeDoc {
    fn default() -> Self {
        Self {
            _id: None,
            metadata: Metadata::default(),
            code_id: String::new(),
            tenant_id: String::new(),
            code: String::new(),
            company_name: None,
            role: ActorRole::Customer,
            max_uses: None,
            current_uses: 0,
            expires_at: None,
            is_active: true,
            redemptions: Vec::new(),
        }
    }
}

impl From<PartnerCode> for PartnerCodeDoc {
    fn from(c: PartnerCode) -> Self {
        let metadata = Metadata::created(DateTime::from_chrono(c.created_at));
        Self {
            _id: None,
            metadata,
            code_id: c.id,
            tenant_id: c.tenant_id,
            code: c.code,
            company_name: c.company_name,
            role: c.role,
            max_uses: c.max_uses.map(i64::from),
            current_uses: i64::from(c.current_uses),
            expires_at: to_bson_time_opt(c.expires_at),
            is_active: c.is_active,
            redemptions: c
                .redemptions
                .into_iter()
                .map(|r| RedemptionDoc {
                    email: r.email,
                    asset_id: r.asset_id,
                    redeemed_at: DateTime::from_chrono(r.redeemed_at),
                })
                .collect(),
        }
    }
}

impl From<PartnerCodeDoc> for PartnerCode {
    fn from(d: PartnerCodeDoc) -> Self {
        Self {
            id: d.code_id,
            tenant_id: d.tenant_id,
            code: d.code,
            company_name: d.company_name,
            role: d.role,
            max_uses: d.max_uses.map(|m| m.clamp(0, i64::from(u32::MAX)) as u32),
            current_uses: d.current_uses.clamp(0, i64::from(u32::MAX)) as u32,
            expires_at: from_bson_time_opt(d.expires_at),
            is_active: d.is_active,
            redemptions: d
                .redemptions
                .into_iter()
                .map(|r| PartnerCodeRedemption {
                    email: r.email,
                    asset_id: r.asset_id,
                    redeemed_at: r.redeemed_at.to_chrono(),
                })
                .collect(),
            created_at: from_bson_time(d.metadata.created_at),
        }
    }
}

impl IntoIndexes for PartnerCodeDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            (
                doc! { "code": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("code_unique".to_string())
                        .build(),
                ),
            ),
            (
                doc! { "code_id": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("code_id_unique".to_string())
                        .build(),
                ),
            ),
        ]
    }
}

impl MutMetadata for PartnerCodeDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}
