//! Persistence traits consumed by the core
//!
//! Split by concern so each component only sees the store it needs. The
//! in-memory and MongoDB backends implement all four.

use std::sync::Arc;

use crate::audit::LifecycleEvent;
use crate::auth::TokenRecord;
use crate::lifecycle::{Passport, StatusUpdate};
use crate::trust::{PartnerCode, TrustedDomain};
use crate::types::Result;

/// Passport rows. One authoritative row per passport id.
#[async_trait::async_trait]
pub trait PassportStore: Send + Sync {
    async fn get_passport(&self, passport_id: &str) -> Result<Option<Passport>>;

    /// Insert a new passport; `Conflict` if the id already exists
    async fn insert_passport(&self, passport: Passport) -> Result<()>;

    /// Apply `update` only if the stored status still equals
    /// `update.expected`. Returns whether the row was changed.
    async fn update_passport_status(&self, update: &StatusUpdate) -> Result<bool>;
}

/// Append-only lifecycle ledger
#[async_trait::async_trait]
pub trait EventStore: Send + Sync {
    async fn append_lifecycle_event(&self, event: &LifecycleEvent) -> Result<()>;

    /// Events for a passport, oldest first
    async fn list_lifecycle_events(&self, passport_id: &str) -> Result<Vec<LifecycleEvent>>;
}

/// Trusted domains and partner codes
#[async_trait::async_trait]
pub trait TrustStore: Send + Sync {
    /// Lookup by lowercase domain
    async fn get_trusted_domain(&self, domain: &str) -> Result<Option<TrustedDomain>>;

    async fn upsert_trusted_domain(&self, domain: TrustedDomain) -> Result<()>;

    /// Lookup by normalized code string
    async fn get_partner_code(&self, code: &str) -> Result<Option<PartnerCode>>;

    /// Insert a new partner code; `Conflict` if the code string exists
    async fn insert_partner_code(&self, code: PartnerCode) -> Result<()>;

    /// Atomically increment `current_uses` and record the redemption, but
    /// only while the code is active, unexpired and under its cap. Returns
    /// `false` when the code could not be redeemed.
    async fn increment_partner_code_usage(
        &self,
        code_id: &str,
        actor_email: &str,
        asset_id: &str,
    ) -> Result<bool>;
}

/// Hash-only token bookkeeping
#[async_trait::async_trait]
pub trait TokenStore: Send + Sync {
    async fn store_token_hash(&self, record: TokenRecord) -> Result<()>;

    async fn get_token_record(&self, token_hash: &str) -> Result<Option<TokenRecord>>;

    /// Set `used_at` if unset. Returns `true` only for the call that set it.
    async fn mark_token_hash_used(&self, token_hash: &str) -> Result<bool>;

    async fn is_token_hash_used(&self, token_hash: &str) -> Result<bool> {
        Ok(self
            .get_token_record(token_hash)
            .await?
            .is_some_and(|record| record.is_used()))
    }
}

/// Handles to every store, as trait objects
#[derive(Clone)]
pub struct Stores {
    pub passports: Arc<dyn PassportStore>,
    pub events: Arc<dyn EventStore>,
    pub trust: Arc<dyn TrustStore>,
    pub tokens: Arc<dyn TokenStore>,
}

impl Stores {
    /// Use one backend for all four concerns
    pub fn from_backend<B>(backend: Arc<B>) -> Self
    where
        B: PassportStore + EventStore + TrustStore + TokenStore + 'static,
    {
        Self {
            passports: backend.clone(),
            events: backend.clone(),
            trust: backend.clone(),
            tokens: backend,
        }
    }
}
