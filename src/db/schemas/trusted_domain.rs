//! Trusted domain document schema (Tier A partners)

use bson::{doc, oid::ObjectId, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::auth::ActorRole;
use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;
use crate::trust::TrustedDomain;

/// Collection name for trusted domains
pub const TRUSTED_DOMAIN_COLLECTION: &str = "trusted_domains";

/// Trusted domain document stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct TrustedDomainDoc {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    #[serde(default)]
    pub metadata: Metadata,

    pub tenant_id: String,

    /// Lowercase email domain (unique)
    pub domain: String,

    pub company_name: String,

    pub default_role: ActorRole,

    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_true() -> bool {
    true
}

impl Default for TrustedDomainDoc {
    fn default() -> Self {
        Self {
            _id: None,
            metadata: Metadata::default(),
            tenant_id: String::new(),
            domain: String::new(),
            company_name: String::new(),
            default_role: ActorRole::Customer,
            is_active: true,
        }
    }
}

impl From<TrustedDomain> for TrustedDomainDoc {
    fn from(d: TrustedDomain) -> Self {
        Self {
            _id: None,
            metadata: Metadata::created(bson::DateTime::now()),
            tenant_id: d.tenant_id,
            domain: d.domain,
            company_name: d.company_name,
            default_role: d.default_role,
            is_active: d.is_active,
        }
    }
}

impl From<TrustedDomainDoc> for TrustedDomain {
    fn from(d: TrustedDomainDoc) -> Self {
        Self {
            tenant_id: d.tenant_id,
            domain: d.domain,
            company_name: d.company_name,
            default_role: d.default_role,
            is_active: d.is_active,
        }
    }
}

impl IntoIndexes for TrustedDomainDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![(
            doc! { "domain": 1 },
            Some(
                IndexOptions::builder()
                    .unique(true)
                    .name("domain_unique".to_string())
                    .build(),
            ),
        )]
    }
}

impl MutMetadata for TrustedDomainDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}
