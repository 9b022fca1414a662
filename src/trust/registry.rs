//! Tiered partner verification
//!
//! Tier A: the actor's email domain is a registered, active trusted domain.
//! Tier B: the actor presents a valid partner code.
//! Anything else is rejected with one generic hint.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rand::Rng;
use tracing::{debug, info};
use uuid::Uuid;

use super::records::{PartnerCode, TrustedDomain, VerificationResult};
use crate::auth::ActorRole;
use crate::db::TrustStore;
use crate::types::{GateError, Result};

/// The only rejection hint a caller ever sees
pub const REJECT_REASON: &str =
    "Email domain not recognized. Please enter a valid partner code from your company.";

/// Alphabet for generated codes, without 0/O/1/I/L
const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKMNPQRSTUVWXYZ23456789";

/// Input for a new partner code
#[derive(Debug, Clone)]
pub struct NewPartnerCode {
    pub tenant_id: String,
    /// Generated when unset
    pub code: Option<String>,
    pub company_name: Option<String>,
    pub role: ActorRole,
    pub max_uses: Option<u32>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Trust decisions over the trust store
#[derive(Clone)]
pub struct TrustRegistry {
    store: Arc<dyn TrustStore>,
}

impl TrustRegistry {
    pub fn new(store: Arc<dyn TrustStore>) -> Self {
        Self { store }
    }

    /// Decide whether `email` may receive a capability token.
    ///
    /// A trusted domain wins over any supplied code. Store failures are
    /// errors; every other negative outcome is a `REJECTED` verdict.
    pub async fn verify_partner_access(
        &self,
        email: &str,
        partner_code: Option<&str>,
    ) -> Result<VerificationResult> {
        if let Some(domain) = extract_email_domain(email) {
            if let Some(trusted) = self.store.get_trusted_domain(&domain).await? {
                if trusted.is_active {
                    debug!(domain = %domain, "Tier A domain match");
                    return Ok(VerificationResult::tier_a(&trusted));
                }
            }
        }

        let Some(code) = partner_code.map(normalize_code).filter(|c| !c.is_empty()) else {
            return Ok(VerificationResult::rejected(REJECT_REASON));
        };

        match self.store.get_partner_code(&code).await? {
            Some(partner) if partner.is_redeemable_at(Utc::now()) => {
                debug!(code_id = %partner.id, "Tier B partner code accepted");
                Ok(VerificationResult::tier_b(&partner))
            }
            Some(partner) => {
                debug!(
                    code_id = %partner.id,
                    active = partner.is_active,
                    uses = partner.current_uses,
                    "Partner code not redeemable"
                );
                Ok(VerificationResult::rejected(REJECT_REASON))
            }
            None => {
                debug!("Unknown partner code");
                Ok(VerificationResult::rejected(REJECT_REASON))
            }
        }
    }

    /// Charge one use of a partner code to `actor_email` for `asset_id`.
    /// `false` means the code stopped being redeemable since verification.
    pub async fn increment_partner_code_usage(
        &self,
        code_id: &str,
        actor_email: &str,
        asset_id: &str,
    ) -> Result<bool> {
        self.store
            .increment_partner_code_usage(code_id, actor_email, asset_id)
            .await
    }

    /// Register or replace a Tier A domain
    pub async fn register_trusted_domain(&self, domain: TrustedDomain) -> Result<()> {
        if domain.domain.is_empty() || domain.domain.contains('@') {
            return Err(GateError::Validation(format!(
                "invalid domain: {}",
                domain.domain
            )));
        }
        info!(domain = %domain.domain, company = %domain.company_name, "Registered trusted domain");
        self.store.upsert_trusted_domain(domain).await
    }

    /// Create a Tier B code, generating the code string when none is given
    pub async fn create_partner_code(&self, new_code: NewPartnerCode) -> Result<PartnerCode> {
        let code = match new_code.code.as_deref().map(normalize_code) {
            Some(c) if c.is_empty() => {
                return Err(GateError::Validation("partner code must not be blank".into()))
            }
            Some(c) => c,
            None => generate_partner_code(),
        };
        if new_code.max_uses == Some(0) {
            return Err(GateError::Validation("max_uses must be at least 1".into()));
        }

        let partner = PartnerCode {
            id: Uuid::new_v4().to_string(),
            tenant_id: new_code.tenant_id,
            code,
            company_name: new_code.company_name,
            role: new_code.role,
            max_uses: new_code.max_uses,
            current_uses: 0,
            expires_at: new_code.expires_at,
            is_active: true,
            redemptions: Vec::new(),
            created_at: Utc::now(),
        };

        self.store.insert_partner_code(partner.clone()).await?;
        info!(code_id = %partner.id, role = %partner.role, "Created partner code");
        Ok(partner)
    }
}

/// Domain part of an email address, lowercased. `None` when malformed.
pub fn extract_email_domain(email: &str) -> Option<String> {
    let (local, domain) = email.trim().rsplit_once('@')?;
    let domain = domain.trim().to_ascii_lowercase();
    if local.is_empty() || domain.is_empty() {
        return None;
    }
    Some(domain)
}

/// Partner codes match case-insensitively after trimming
pub fn normalize_code(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}

/// Random `XXXX-XXXX` code
pub fn generate_partner_code() -> String {
    let mut rng = rand::thread_rng();
    let mut pick = || CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char;
    let head: String = (0..4).map(|_| pick()).collect();
    let tail: String = (0..4).map(|_| pick()).collect();
    format!("{}-{}", head, tail)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;
    use crate::trust::TrustTier;
    use chrono::Duration;

    fn registry() -> TrustRegistry {
        TrustRegistry::new(Arc::new(MemoryStore::new()))
    }

    async fn seeded() -> (TrustRegistry, PartnerCode) {
        let reg = registry();
        reg.register_trusted_domain(TrustedDomain::new(
            "tenant-1",
            "Acme-Logistics.com",
            "Acme Logistics",
            ActorRole::Logistics,
        ))
        .await
        .unwrap();
        let code = reg
            .create_partner_code(NewPartnerCode {
                tenant_id: "tenant-1".into(),
                code: Some("fixit-2024".into()),
                company_name: Some("Fix-It Shop".into()),
                role: ActorRole::Technician,
                max_uses: Some(1),
                expires_at: None,
            })
            .await
            .unwrap();
        (reg, code)
    }

    #[test]
    fn test_extract_email_domain() {
        assert_eq!(
            extract_email_domain(" Bob@Acme.COM "),
            Some("acme.com".to_string())
        );
        assert_eq!(
            extract_email_domain("weird@name@acme.com"),
            Some("acme.com".to_string())
        );
        assert_eq!(extract_email_domain("no-at-sign"), None);
        assert_eq!(extract_email_domain("@acme.com"), None);
        assert_eq!(extract_email_domain("bob@"), None);
    }

    #[test]
    fn test_generated_code_shape() {
        let code = generate_partner_code();
        assert_eq!(code.len(), 9);
        assert_eq!(&code[4..5], "-");
        assert!(code
            .chars()
            .filter(|c| *c != '-')
            .all(|c| CODE_ALPHABET.contains(&(c as u8))));
    }

    #[tokio::test]
    async fn test_tier_a_ignores_code() {
        let (reg, _) = seeded().await;
        let verdict = reg
            .verify_partner_access("driver@acme-logistics.com", Some("garbage"))
            .await
            .unwrap();
        assert!(verdict.allowed);
        assert_eq!(verdict.tier, TrustTier::A);
        assert_eq!(verdict.role, Some(ActorRole::Logistics));
        assert_eq!(verdict.company.as_deref(), Some("Acme Logistics"));
    }

    #[tokio::test]
    async fn test_tier_b_code_is_case_insensitive() {
        let (reg, code) = seeded().await;
        let verdict = reg
            .verify_partner_access("tech@gmail.com", Some("  FixIt-2024 "))
            .await
            .unwrap();
        assert!(verdict.allowed);
        assert_eq!(verdict.tier, TrustTier::B);
        assert_eq!(verdict.role, Some(ActorRole::Technician));
        assert_eq!(verdict.partner_code_id, Some(code.id));
    }

    #[tokio::test]
    async fn test_rejections_share_one_reason() {
        let (reg, code) = seeded().await;

        let no_code = reg.verify_partner_access("x@gmail.com", None).await.unwrap();
        let blank = reg
            .verify_partner_access("x@gmail.com", Some("   "))
            .await
            .unwrap();
        let unknown = reg
            .verify_partner_access("x@gmail.com", Some("NOPE-NOPE"))
            .await
            .unwrap();

        assert!(reg
            .increment_partner_code_usage(&code.id, "a@b.com", "p-1")
            .await
            .unwrap());
        let exhausted = reg
            .verify_partner_access("x@gmail.com", Some("FIXIT-2024"))
            .await
            .unwrap();

        for verdict in [no_code, blank, unknown, exhausted] {
            assert!(!verdict.allowed);
            assert_eq!(verdict.tier, TrustTier::Rejected);
            assert_eq!(verdict.reject_reason.as_deref(), Some(REJECT_REASON));
            assert!(verdict.role.is_none());
        }
    }

    #[tokio::test]
    async fn test_malformed_email_is_rejected_not_error() {
        let (reg, _) = seeded().await;
        let verdict = reg.verify_partner_access("not-an-email", None).await.unwrap();
        assert!(!verdict.allowed);
    }

    #[tokio::test]
    async fn test_inactive_domain_falls_through() {
        let reg = registry();
        let mut domain = TrustedDomain::new("t", "old.com", "Old Co", ActorRole::Recycler);
        domain.is_active = false;
        reg.register_trusted_domain(domain).await.unwrap();

        let verdict = reg.verify_partner_access("a@old.com", None).await.unwrap();
        assert_eq!(verdict.tier, TrustTier::Rejected);
    }

    #[tokio::test]
    async fn test_expired_code_rejected() {
        let reg = registry();
        reg.create_partner_code(NewPartnerCode {
            tenant_id: "t".into(),
            code: Some("OLD-CODE".into()),
            company_name: None,
            role: ActorRole::Recycler,
            max_uses: None,
            expires_at: Some(Utc::now() - Duration::minutes(1)),
        })
        .await
        .unwrap();

        let verdict = reg
            .verify_partner_access("r@gmail.com", Some("old-code"))
            .await
            .unwrap();
        assert!(!verdict.allowed);
    }

    #[tokio::test]
    async fn test_create_partner_code_validation() {
        let reg = registry();
        let base = NewPartnerCode {
            tenant_id: "t".into(),
            code: Some("  ".into()),
            company_name: None,
            role: ActorRole::Customer,
            max_uses: None,
            expires_at: None,
        };
        assert!(matches!(
            reg.create_partner_code(base.clone()).await,
            Err(GateError::Validation(_))
        ));

        let zero_uses = NewPartnerCode {
            code: None,
            max_uses: Some(0),
            ..base.clone()
        };
        assert!(reg.create_partner_code(zero_uses).await.is_err());

        let generated = reg
            .create_partner_code(NewPartnerCode { code: None, ..base })
            .await
            .unwrap();
        assert_eq!(generated.code.len(), 9);
    }

    #[tokio::test]
    async fn test_register_rejects_bad_domain() {
        let reg = registry();
        let domain = TrustedDomain::new("t", "bob@acme.com", "Acme", ActorRole::Customer);
        assert!(reg.register_trusted_domain(domain).await.is_err());
    }
}
