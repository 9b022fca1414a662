//! Persisted form of an issued capability token

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::{ActorRole, IssuedToken};
use crate::trust::TrustTier;

/// Stored bookkeeping for one issued magic link. Holds the token hash,
/// never the token itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenRecord {
    pub token_id: String,
    pub token_hash: String,
    pub asset_id: String,
    pub email: String,
    pub role: ActorRole,
    pub tier: TrustTier,
    pub expires_at: DateTime<Utc>,
    pub used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl TokenRecord {
    pub fn from_issued(issued: &IssuedToken, tier: TrustTier) -> Self {
        Self {
            token_id: issued.token_id.clone(),
            token_hash: issued.token_hash.clone(),
            asset_id: issued.claims.asset_id.clone(),
            email: issued.claims.email.clone(),
            role: issued.claims.role,
            tier,
            expires_at: issued.expires_at,
            used_at: None,
            created_at: issued.issued_at,
        }
    }

    pub fn is_used(&self) -> bool {
        self.used_at.is_some()
    }
}
