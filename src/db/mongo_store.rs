//! MongoDB-backed store
//!
//! Conditional writes carry their guard in the update filter, so a single
//! `update_one` is the atomic unit: status changes filter on the expected
//! previous status, partner-code redemptions on active/expiry/cap.

use bson::{doc, DateTime, Document};
use tracing::{debug, error};

use crate::audit::LifecycleEvent;
use crate::auth::TokenRecord;
use crate::db::mongo::{MongoClient, MongoCollection};
use crate::db::repository::{EventStore, PassportStore, TokenStore, TrustStore};
use crate::db::schemas::{
    LifecycleEventDoc, MagicLinkTokenDoc, PartnerCodeDoc, PassportDoc, TrustedDomainDoc,
    LIFECYCLE_EVENT_COLLECTION, MAGIC_LINK_TOKEN_COLLECTION, PARTNER_CODE_COLLECTION,
    PASSPORT_COLLECTION, TRUSTED_DOMAIN_COLLECTION,
};
use crate::lifecycle::{Passport, StatusUpdate};
use crate::trust::{PartnerCode, TrustedDomain};
use crate::types::{GateError, Result};

/// MongoDB implementation of every store trait
pub struct MongoStore {
    passports: MongoCollection<PassportDoc>,
    events: MongoCollection<LifecycleEventDoc>,
    domains: MongoCollection<TrustedDomainDoc>,
    codes: MongoCollection<PartnerCodeDoc>,
    tokens: MongoCollection<MagicLinkTokenDoc>,
}

impl MongoStore {
    /// Open all collections and apply their indexes
    pub async fn new(client: &MongoClient) -> Result<Self> {
        Ok(Self {
            passports: client.collection(PASSPORT_COLLECTION).await?,
            events: client.collection(LIFECYCLE_EVENT_COLLECTION).await?,
            domains: client.collection(TRUSTED_DOMAIN_COLLECTION).await?,
            codes: client.collection(PARTNER_CODE_COLLECTION).await?,
            tokens: client.collection(MAGIC_LINK_TOKEN_COLLECTION).await?,
        })
    }
}

#[async_trait::async_trait]
impl PassportStore for MongoStore {
    async fn get_passport(&self, passport_id: &str) -> Result<Option<Passport>> {
        Ok(self
            .passports
            .find_one(doc! { "passport_id": passport_id })
            .await?
            .map(Passport::from))
    }

    async fn insert_passport(&self, passport: Passport) -> Result<()> {
        let id = passport.id.clone();
        self.passports
            .insert_one(PassportDoc::from(passport))
            .await
            .map_err(|e| match e {
                GateError::Conflict(_) => {
                    GateError::Conflict(format!("passport {} already exists", id))
                }
                other => other,
            })?;
        Ok(())
    }

    async fn update_passport_status(&self, update: &StatusUpdate) -> Result<bool> {
        let at = DateTime::from_chrono(update.at);
        let mut set = doc! {
            "status": update.new_status.as_str(),
            "metadata.updated_at": at,
        };
        if let Some(milestone) = update.new_status.milestone() {
            set.insert(milestone.field_name(), at);
        }

        let result = self
            .passports
            .update_one(
                doc! {
                    "passport_id": &update.passport_id,
                    "status": update.expected.as_str(),
                    "metadata.is_deleted": { "$ne": true },
                },
                doc! { "$set": set },
            )
            .await?;

        if result.modified_count == 0 {
            debug!(
                passport_id = %update.passport_id,
                expected = %update.expected,
                "Status compare-and-set missed"
            );
        }
        Ok(result.modified_count == 1)
    }
}

#[async_trait::async_trait]
impl EventStore for MongoStore {
    async fn append_lifecycle_event(&self, event: &LifecycleEvent) -> Result<()> {
        self.events
            .insert_one(LifecycleEventDoc::from_event(event)?)
            .await?;
        Ok(())
    }

    async fn list_lifecycle_events(&self, passport_id: &str) -> Result<Vec<LifecycleEvent>> {
        let docs = self
            .events
            .find_documents(
                doc! { "passport_id": passport_id },
                doc! { "created_at": 1, "_id": 1 },
            )
            .await?;
        decode_events(passport_id, docs)
    }
}

/// Decode a passport's stored events. One unreadable record fails the whole
/// read; a partial audit trail is never returned.
fn decode_events(passport_id: &str, docs: Vec<Document>) -> Result<Vec<LifecycleEvent>> {
    docs.into_iter()
        .map(|d| {
            bson::from_document::<LifecycleEventDoc>(d)
                .map_err(GateError::from)
                .and_then(LifecycleEventDoc::into_event)
        })
        .collect::<Result<Vec<_>>>()
        .map_err(|e| {
            error!(passport_id, error = %e, "Unreadable lifecycle event");
            GateError::Persistence(format!("unreadable lifecycle event for {}: {}", passport_id, e))
        })
}

#[async_trait::async_trait]
impl TrustStore for MongoStore {
    async fn get_trusted_domain(&self, domain: &str) -> Result<Option<TrustedDomain>> {
        Ok(self
            .domains
            .find_one(doc! { "domain": domain })
            .await?
            .map(TrustedDomain::from))
    }

    async fn upsert_trusted_domain(&self, domain: TrustedDomain) -> Result<()> {
        let filter = doc! { "domain": &domain.domain };
        self.domains
            .upsert_one(filter, TrustedDomainDoc::from(domain))
            .await
    }

    async fn get_partner_code(&self, code: &str) -> Result<Option<PartnerCode>> {
        Ok(self
            .codes
            .find_one(doc! { "code": code })
            .await?
            .map(PartnerCode::from))
    }

    async fn insert_partner_code(&self, code: PartnerCode) -> Result<()> {
        self.codes
            .insert_one(PartnerCodeDoc::from(code))
            .await
            .map_err(|e| match e {
                GateError::Conflict(_) => GateError::Conflict("partner code already exists".into()),
                other => other,
            })?;
        Ok(())
    }

    async fn increment_partner_code_usage(
        &self,
        code_id: &str,
        actor_email: &str,
        asset_id: &str,
    ) -> Result<bool> {
        let now = DateTime::now();

        let filter = doc! {
            "code_id": code_id,
            "is_active": true,
            "metadata.is_deleted": { "$ne": true },
            "$and": [
                { "$or": [
                    { "expires_at": null },
                    { "expires_at": { "$gt": now } },
                ]},
                { "$or": [
                    { "max_uses": null },
                    { "$expr": { "$lt": ["$current_uses", "$max_uses"] } },
                ]},
            ],
        };
        let update = doc! {
            "$inc": { "current_uses": 1_i64 },
            "$push": { "redemptions": {
                "email": actor_email,
                "asset_id": asset_id,
                "redeemed_at": now,
            }},
            "$set": { "metadata.updated_at": now },
        };

        let result = self.codes.update_one(filter, update).await?;
        Ok(result.modified_count == 1)
    }
}

#[async_trait::async_trait]
impl TokenStore for MongoStore {
    async fn store_token_hash(&self, record: TokenRecord) -> Result<()> {
        self.tokens
            .insert_one(MagicLinkTokenDoc::from(record))
            .await?;
        Ok(())
    }

    async fn get_token_record(&self, token_hash: &str) -> Result<Option<TokenRecord>> {
        Ok(self
            .tokens
            .find_one(doc! { "token_hash": token_hash })
            .await?
            .map(TokenRecord::from))
    }

    async fn mark_token_hash_used(&self, token_hash: &str) -> Result<bool> {
        let now = DateTime::now();
        let result = self
            .tokens
            .update_one(
                doc! { "token_hash": token_hash, "used_at": null },
                doc! { "$set": { "used_at": now, "metadata.updated_at": now } },
            )
            .await?;
        Ok(result.modified_count == 1)
    }
}
