//! Authentication for passport-gate
//!
//! Provides:
//! - Actor roles carried by capability tokens
//! - Capability token generation, validation and hashing
//! - Token extraction from headers and query strings
//! - The hash-only record persisted for each issued token

pub mod capability;
pub mod record;
pub mod roles;

pub use capability::{
    extract_token_from_header, extract_token_from_query, hash_token, CapabilityClaims,
    CapabilityTokenService, IssuedToken, TOKEN_TTL_SECONDS,
};
pub use record::TokenRecord;
pub use roles::ActorRole;
