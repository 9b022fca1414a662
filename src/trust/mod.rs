//! Partner trust registry (Tier A domains, Tier B codes)

pub mod records;
pub mod registry;

pub use records::{
    PartnerCode, PartnerCodeRedemption, TrustTier, TrustedDomain, VerificationResult,
};
pub use registry::{
    extract_email_domain, generate_partner_code, normalize_code, NewPartnerCode, TrustRegistry,
    REJECT_REASON,
};
