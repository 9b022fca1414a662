//! Database schemas for passport-gate
//!
//! MongoDB document structures for passports, lifecycle events, the trust
//! registry and issued magic links.

mod lifecycle_event;
mod magic_link_token;
mod metadata;
mod partner_code;
mod passport;
mod trusted_domain;

use chrono::Utc;

pub use lifecycle_event::{LifecycleEventDoc, LIFECYCLE_EVENT_COLLECTION};
pub use magic_link_token::{MagicLinkTokenDoc, MAGIC_LINK_TOKEN_COLLECTION};
pub use metadata::Metadata;
pub use partner_code::{PartnerCodeDoc, RedemptionDoc, PARTNER_CODE_COLLECTION};
pub use passport::{PassportDoc, PASSPORT_COLLECTION};
pub use trusted_domain::{TrustedDomainDoc, TRUSTED_DOMAIN_COLLECTION};

pub(crate) fn to_bson_time_opt(t: Option<chrono::DateTime<Utc>>) -> Option<bson::DateTime> {
    t.map(bson::DateTime::from_chrono)
}

pub(crate) fn from_bson_time_opt(t: Option<bson::DateTime>) -> Option<chrono::DateTime<Utc>> {
    t.map(|t| t.to_chrono())
}

/// Missing metadata timestamps read back as the Unix epoch
pub(crate) fn from_bson_time(t: Option<bson::DateTime>) -> chrono::DateTime<Utc> {
    from_bson_time_opt(t).unwrap_or_default()
}
