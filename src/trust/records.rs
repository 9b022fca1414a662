//! Trust registry records and verification verdicts

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::auth::ActorRole;

/// Trust level a verification resolved to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrustTier {
    /// Trusted email domain, no code required
    #[serde(rename = "A")]
    A,
    /// Shared-secret partner code
    #[serde(rename = "B")]
    B,
    #[serde(rename = "REJECTED")]
    Rejected,
}

impl TrustTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrustTier::A => "A",
            TrustTier::B => "B",
            TrustTier::Rejected => "REJECTED",
        }
    }
}

impl fmt::Display for TrustTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tier A record: every address at `domain` is trusted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrustedDomain {
    pub tenant_id: String,
    /// Lowercase email domain, e.g. "acme-logistics.com"
    pub domain: String,
    pub company_name: String,
    pub default_role: ActorRole,
    pub is_active: bool,
}

impl TrustedDomain {
    pub fn new(
        tenant_id: impl Into<String>,
        domain: impl Into<String>,
        company_name: impl Into<String>,
        default_role: ActorRole,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            domain: domain.into().trim().to_ascii_lowercase(),
            company_name: company_name.into(),
            default_role,
            is_active: true,
        }
    }
}

/// Who consumed a partner code, and for which passport
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartnerCodeRedemption {
    pub email: String,
    pub asset_id: String,
    pub redeemed_at: DateTime<Utc>,
}

/// Tier B record: a shared secret bound to a role
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartnerCode {
    pub id: String,
    pub tenant_id: String,
    /// Normalized (trimmed, uppercase) code string
    pub code: String,
    pub company_name: Option<String>,
    pub role: ActorRole,
    /// Unlimited when unset
    pub max_uses: Option<u32>,
    pub current_uses: u32,
    pub expires_at: Option<DateTime<Utc>>,
    pub is_active: bool,
    #[serde(default)]
    pub redemptions: Vec<PartnerCodeRedemption>,
    pub created_at: DateTime<Utc>,
}

impl PartnerCode {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at <= now)
    }

    pub fn has_uses_left(&self) -> bool {
        self.max_uses.map_or(true, |max| self.current_uses < max)
    }

    /// Active, unexpired and under its use cap
    pub fn is_redeemable_at(&self, now: DateTime<Utc>) -> bool {
        self.is_active && !self.is_expired_at(now) && self.has_uses_left()
    }
}

/// Verdict of a partner access check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationResult {
    pub allowed: bool,
    pub tier: TrustTier,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<ActorRole>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reject_reason: Option<String>,
    /// Partner code to charge the redemption to (Tier B only)
    #[serde(skip)]
    pub partner_code_id: Option<String>,
}

impl VerificationResult {
    pub fn tier_a(domain: &TrustedDomain) -> Self {
        Self {
            allowed: true,
            tier: TrustTier::A,
            company: Some(domain.company_name.clone()),
            role: Some(domain.default_role),
            reject_reason: None,
            partner_code_id: None,
        }
    }

    pub fn tier_b(code: &PartnerCode) -> Self {
        Self {
            allowed: true,
            tier: TrustTier::B,
            company: code.company_name.clone(),
            role: Some(code.role),
            reject_reason: None,
            partner_code_id: Some(code.id.clone()),
        }
    }

    pub fn rejected(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            tier: TrustTier::Rejected,
            company: None,
            role: None,
            reject_reason: Some(reason.into()),
            partner_code_id: None,
        }
    }
}
