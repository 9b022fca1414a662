//! In-memory store
//!
//! Backs dev mode and the test suite. Conditional updates run under the
//! `DashMap` shard lock of the affected entry, so they are atomic with
//! respect to concurrent callers.

use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::debug;

use crate::audit::LifecycleEvent;
use crate::auth::TokenRecord;
use crate::db::repository::{EventStore, PassportStore, TokenStore, TrustStore};
use crate::lifecycle::{Passport, StatusUpdate};
use crate::trust::{PartnerCode, PartnerCodeRedemption, TrustedDomain};
use crate::types::{GateError, Result};

/// In-memory implementation of every store trait
#[derive(Default)]
pub struct MemoryStore {
    passports: DashMap<String, Passport>,
    /// passport id -> events in insertion order
    events: DashMap<String, Vec<LifecycleEvent>>,
    domains: DashMap<String, TrustedDomain>,
    /// code id -> code
    codes: DashMap<String, PartnerCode>,
    /// normalized code string -> code id
    code_index: DashMap<String, String>,
    /// token hash -> record
    tokens: DashMap<String, TokenRecord>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn passport_count(&self) -> usize {
        self.passports.len()
    }

    pub fn token_count(&self) -> usize {
        self.tokens.len()
    }
}

#[async_trait::async_trait]
impl PassportStore for MemoryStore {
    async fn get_passport(&self, passport_id: &str) -> Result<Option<Passport>> {
        Ok(self.passports.get(passport_id).map(|p| p.clone()))
    }

    async fn insert_passport(&self, passport: Passport) -> Result<()> {
        match self.passports.entry(passport.id.clone()) {
            Entry::Occupied(_) => Err(GateError::Conflict(format!(
                "passport {} already exists",
                passport.id
            ))),
            Entry::Vacant(slot) => {
                slot.insert(passport);
                Ok(())
            }
        }
    }

    async fn update_passport_status(&self, update: &StatusUpdate) -> Result<bool> {
        let Some(mut passport) = self.passports.get_mut(&update.passport_id) else {
            return Ok(false);
        };

        if passport.status != update.expected {
            debug!(
                passport_id = %update.passport_id,
                expected = %update.expected,
                actual = %passport.status,
                "Status compare-and-set missed"
            );
            return Ok(false);
        }

        passport.apply_status(update);
        Ok(true)
    }
}

#[async_trait::async_trait]
impl EventStore for MemoryStore {
    async fn append_lifecycle_event(&self, event: &LifecycleEvent) -> Result<()> {
        self.events
            .entry(event.passport_id.clone())
            .or_default()
            .push(event.clone());
        Ok(())
    }

    async fn list_lifecycle_events(&self, passport_id: &str) -> Result<Vec<LifecycleEvent>> {
        let mut events = self
            .events
            .get(passport_id)
            .map(|events| events.clone())
            .unwrap_or_default();
        // Stable: equal timestamps keep insertion order
        events.sort_by_key(|e| e.created_at);
        Ok(events)
    }
}

#[async_trait::async_trait]
impl TrustStore for MemoryStore {
    async fn get_trusted_domain(&self, domain: &str) -> Result<Option<TrustedDomain>> {
        Ok(self.domains.get(domain).map(|d| d.clone()))
    }

    async fn upsert_trusted_domain(&self, domain: TrustedDomain) -> Result<()> {
        self.domains.insert(domain.domain.clone(), domain);
        Ok(())
    }

    async fn get_partner_code(&self, code: &str) -> Result<Option<PartnerCode>> {
        let Some(code_id) = self.code_index.get(code).map(|id| id.clone()) else {
            return Ok(None);
        };
        Ok(self.codes.get(&code_id).map(|c| c.clone()))
    }

    async fn insert_partner_code(&self, code: PartnerCode) -> Result<()> {
        match self.code_index.entry(code.code.clone()) {
            Entry::Occupied(_) => Err(GateError::Conflict("partner code already exists".into())),
            Entry::Vacant(slot) => {
                slot.insert(code.id.clone());
                self.codes.insert(code.id.clone(), code);
                Ok(())
            }
        }
    }

    async fn increment_partner_code_usage(
        &self,
        code_id: &str,
        actor_email: &str,
        asset_id: &str,
    ) -> Result<bool> {
        let Some(mut code) = self.codes.get_mut(code_id) else {
            return Ok(false);
        };

        let now = Utc::now();
        if !code.is_redeemable_at(now) {
            return Ok(false);
        }

        code.current_uses += 1;
        code.redemptions.push(PartnerCodeRedemption {
            email: actor_email.to_string(),
            asset_id: asset_id.to_string(),
            redeemed_at: now,
        });
        Ok(true)
    }
}

#[async_trait::async_trait]
impl TokenStore for MemoryStore {
    async fn store_token_hash(&self, record: TokenRecord) -> Result<()> {
        // Expired records can never authorize anything again
        let now = Utc::now();
        let before = self.tokens.len();
        self.tokens.retain(|_, r| r.expires_at > now);
        let evicted = before.saturating_sub(self.tokens.len());
        if evicted > 0 {
            debug!(evicted, "Evicted expired token records");
        }

        self.tokens.insert(record.token_hash.clone(), record);
        Ok(())
    }

    async fn get_token_record(&self, token_hash: &str) -> Result<Option<TokenRecord>> {
        Ok(self.tokens.get(token_hash).map(|r| r.clone()))
    }

    async fn mark_token_hash_used(&self, token_hash: &str) -> Result<bool> {
        let Some(mut record) = self.tokens.get_mut(token_hash) else {
            return Ok(false);
        };
        if record.used_at.is_some() {
            return Ok(false);
        }
        record.used_at = Some(Utc::now());
        Ok(true)
    }
}
