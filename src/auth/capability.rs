//! Capability tokens ("magic links")
//!
//! A capability token authenticates an unregistered actor for exactly one
//! passport. It is a JWT carrying the passport id, actor email and role.
//!
//! Security notes:
//! - Tokens are signed with HS256 (HMAC-SHA256); any other algorithm is rejected
//! - Expiry is fixed at 1 hour with zero validation leeway
//! - Only the SHA-256 hash of a token is ever persisted
//! - The signing secret is injected at construction and must be at least 32 bytes

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use tracing::debug;
use uuid::Uuid;

use crate::auth::ActorRole;
use crate::types::{GateError, Result};

/// Lifetime of a capability token
pub const TOKEN_TTL_SECONDS: i64 = 3600;

/// Minimum accepted signing secret length in bytes
pub const MIN_SECRET_LEN: usize = 32;

const DEV_SECRET: &str = "dev-mode-secret-not-for-production-use-123456";

/// Payload stored in a capability token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityClaims {
    /// Passport the token is scoped to
    pub asset_id: String,
    /// Actor email
    pub email: String,
    /// Role resolved by the trust registry
    pub role: ActorRole,
    /// Unique token id, used for revocation bookkeeping
    pub jti: String,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Not before (Unix timestamp)
    pub nbf: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
}

impl CapabilityClaims {
    pub fn expires_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.exp, 0).unwrap_or_default()
    }
}

/// A freshly minted token together with its storage form
#[derive(Debug, Clone)]
pub struct IssuedToken {
    /// Compact signed token, handed to the actor and never stored
    pub token: String,
    pub token_id: String,
    /// SHA-256 hex digest of `token`
    pub token_hash: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub claims: CapabilityClaims,
}

/// Mints and validates capability tokens
#[derive(Clone)]
pub struct CapabilityTokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl CapabilityTokenService {
    /// Create a token service from the configured signing secret
    ///
    /// Returns an error if the secret is empty or too short
    pub fn new(secret: &str) -> Result<Self> {
        if secret.is_empty() {
            return Err(GateError::Config(
                "JWT_SECRET is required in production mode".into(),
            ));
        }

        if secret.len() < MIN_SECRET_LEN {
            return Err(GateError::Config(format!(
                "JWT_SECRET must be at least {} characters",
                MIN_SECRET_LEN
            )));
        }

        Ok(Self::from_secret_bytes(secret.as_bytes()))
    }

    /// Create a token service for dev mode with a fixed secret
    pub fn new_dev() -> Self {
        Self::from_secret_bytes(DEV_SECRET.as_bytes())
    }

    fn from_secret_bytes(secret: &[u8]) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
        }
    }

    /// Mint a token for `email` acting as `role` on `asset_id`.
    ///
    /// `role` is the wire name of one of the five actor roles.
    pub fn generate_token(&self, asset_id: &str, email: &str, role: &str) -> Result<IssuedToken> {
        let role: ActorRole = role.parse()?;
        self.generate_token_for_role(asset_id, email, role)
    }

    /// Mint a token for an already-typed role
    pub fn generate_token_for_role(
        &self,
        asset_id: &str,
        email: &str,
        role: ActorRole,
    ) -> Result<IssuedToken> {
        self.generate_token_at(asset_id, email, role, Utc::now())
    }

    pub(crate) fn generate_token_at(
        &self,
        asset_id: &str,
        email: &str,
        role: ActorRole,
        issued_at: DateTime<Utc>,
    ) -> Result<IssuedToken> {
        let asset_id = asset_id.trim();
        let email = email.trim();
        if asset_id.is_empty() {
            return Err(GateError::Validation("asset_id is required".into()));
        }
        if email.is_empty() {
            return Err(GateError::Validation("email is required".into()));
        }

        let expires_at = issued_at + Duration::seconds(TOKEN_TTL_SECONDS);
        let token_id = Uuid::new_v4().to_string();

        let claims = CapabilityClaims {
            asset_id: asset_id.to_string(),
            email: email.to_ascii_lowercase(),
            role,
            jti: token_id.clone(),
            iat: issued_at.timestamp(),
            nbf: issued_at.timestamp(),
            exp: expires_at.timestamp(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| GateError::Internal(format!("Failed to sign token: {}", e)))?;
        let token_hash = hash_token(&token);

        Ok(IssuedToken {
            token,
            token_id,
            token_hash,
            issued_at,
            expires_at,
            claims,
        })
    }

    /// Verify signature, algorithm and validity window; return the claims
    pub fn validate_token(&self, token: &str) -> Result<CapabilityClaims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.validate_nbf = true;
        validation.set_required_spec_claims(&["exp", "nbf"]);

        match decode::<CapabilityClaims>(token, &self.decoding_key, &validation) {
            Ok(data) => Ok(data.claims),
            Err(err) => {
                use jsonwebtoken::errors::ErrorKind;
                let reason = match err.kind() {
                    ErrorKind::ExpiredSignature => "token expired",
                    ErrorKind::ImmatureSignature => "token not yet valid",
                    ErrorKind::InvalidSignature => "invalid signature",
                    ErrorKind::InvalidAlgorithm => "unexpected signing algorithm",
                    ErrorKind::MissingRequiredClaim(_) => "missing required claim",
                    _ => "malformed token",
                };
                debug!(reason, "Capability token rejected");
                Err(GateError::Auth(reason.to_string()))
            }
        }
    }

    /// Validate a token and pin it to the passport being acted on
    pub fn validate_token_for_asset(&self, token: &str, asset_id: &str) -> Result<CapabilityClaims> {
        let claims = self.validate_token(token)?;
        if claims.asset_id != asset_id {
            debug!(
                token_asset = %claims.asset_id,
                requested_asset = %asset_id,
                "Capability token presented against a different passport"
            );
            return Err(GateError::Auth("token scoped to a different asset".into()));
        }
        Ok(claims)
    }
}

/// One-way digest of a signed token (lowercase hex SHA-256)
pub fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

/// Extract token from Authorization header.
/// Supports "Bearer <token>" format and raw tokens.
pub fn extract_token_from_header(auth_header: Option<&str>) -> Option<&str> {
    let header = auth_header?;

    if let Some(token) = header.strip_prefix("Bearer ") {
        let token = token.trim();
        if !token.is_empty() {
            return Some(token);
        }
    }

    if !header.contains(' ') {
        let token = header.trim();
        if !token.is_empty() {
            return Some(token);
        }
    }

    None
}

/// Extract the `token` parameter from a URL query string
pub fn extract_token_from_query(query: Option<&str>) -> Option<String> {
    let params: HashMap<String, String> = serde_urlencoded::from_str(query?).ok()?;
    params
        .get("token")
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_service() -> CapabilityTokenService {
        CapabilityTokenService::new("test-secret-that-is-at-least-32-characters-long").unwrap()
    }

    #[test]
    fn test_generate_and_validate_token() {
        let service = test_service();

        let issued = service
            .generate_token("passport-1", "Courier@Example.com", "LOGISTICS")
            .unwrap();
        assert!(!issued.token.is_empty());
        assert_eq!(issued.token_hash, hash_token(&issued.token));
        assert_eq!(
            (issued.expires_at - issued.issued_at).num_seconds(),
            TOKEN_TTL_SECONDS
        );

        let claims = service.validate_token(&issued.token).unwrap();
        assert_eq!(claims.asset_id, "passport-1");
        assert_eq!(claims.email, "courier@example.com");
        assert_eq!(claims.role, ActorRole::Logistics);
        assert_eq!(claims.jti, issued.token_id);
    }

    #[test]
    fn test_generate_rejects_bad_input() {
        let service = test_service();

        assert!(matches!(
            service.generate_token("", "a@b.com", "LOGISTICS"),
            Err(GateError::Validation(_))
        ));
        assert!(matches!(
            service.generate_token("passport-1", "  ", "LOGISTICS"),
            Err(GateError::Validation(_))
        ));
        assert!(matches!(
            service.generate_token("passport-1", "a@b.com", "JANITOR"),
            Err(GateError::Validation(_))
        ));
    }

    #[test]
    fn test_token_ids_are_unique() {
        let service = test_service();
        let a = service
            .generate_token("passport-1", "a@b.com", "CUSTOMER")
            .unwrap();
        let b = service
            .generate_token("passport-1", "a@b.com", "CUSTOMER")
            .unwrap();
        assert_ne!(a.token_id, b.token_id);
        assert_ne!(a.token_hash, b.token_hash);
    }

    #[test]
    fn test_asset_scope_enforced() {
        let service = test_service();
        let issued = service
            .generate_token("passport-A", "tech@example.com", "TECHNICIAN")
            .unwrap();

        assert!(service
            .validate_token_for_asset(&issued.token, "passport-A")
            .is_ok());
        assert!(matches!(
            service.validate_token_for_asset(&issued.token, "passport-B"),
            Err(GateError::Auth(_))
        ));
    }

    #[test]
    fn test_expiry_boundary() {
        let service = test_service();
        let now = Utc::now();

        // Expires one second from now: still valid
        let almost = service
            .generate_token_at(
                "passport-1",
                "a@b.com",
                ActorRole::Customer,
                now - Duration::seconds(TOKEN_TTL_SECONDS - 1),
            )
            .unwrap();
        assert!(service.validate_token(&almost.token).is_ok());

        // Expired one second ago
        let expired = service
            .generate_token_at(
                "passport-1",
                "a@b.com",
                ActorRole::Customer,
                now - Duration::seconds(TOKEN_TTL_SECONDS + 1),
            )
            .unwrap();
        assert!(matches!(
            service.validate_token(&expired.token),
            Err(GateError::Auth(_))
        ));
    }

    #[test]
    fn test_not_yet_valid_rejected() {
        let service = test_service();
        let future = service
            .generate_token_at(
                "passport-1",
                "a@b.com",
                ActorRole::Customer,
                Utc::now() + Duration::seconds(120),
            )
            .unwrap();
        assert!(service.validate_token(&future.token).is_err());
    }

    #[test]
    fn test_wrong_secret() {
        let service1 = test_service();
        let service2 =
            CapabilityTokenService::new("different-secret-that-is-at-least-32-characters").unwrap();

        let issued = service1
            .generate_token("passport-1", "a@b.com", "RECYCLER")
            .unwrap();
        assert!(service2.validate_token(&issued.token).is_err());
    }

    #[test]
    fn test_wrong_algorithm_rejected() {
        let secret = "test-secret-that-is-at-least-32-characters-long";
        let service = CapabilityTokenService::new(secret).unwrap();
        let now = Utc::now().timestamp();

        let claims = CapabilityClaims {
            asset_id: "passport-1".into(),
            email: "a@b.com".into(),
            role: ActorRole::Manufacturer,
            jti: "jti-1".into(),
            iat: now,
            nbf: now,
            exp: now + TOKEN_TTL_SECONDS,
        };
        let token = encode(
            &Header::new(Algorithm::HS384),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap();

        assert!(matches!(
            service.validate_token(&token),
            Err(GateError::Auth(_))
        ));
    }

    #[test]
    fn test_garbage_token() {
        let service = test_service();
        assert!(service.validate_token("not-a-token").is_err());
        assert!(service.validate_token("").is_err());
    }

    #[test]
    fn test_secret_validation() {
        assert!(CapabilityTokenService::new("short").is_err());
        assert!(CapabilityTokenService::new("").is_err());
        assert!(CapabilityTokenService::new("this-secret-is-at-least-32-chars-long").is_ok());
    }

    #[test]
    fn test_dev_mode_service() {
        let service = CapabilityTokenService::new_dev();
        let issued = service
            .generate_token("passport-1", "a@b.com", "MANUFACTURER")
            .unwrap();
        assert!(service.validate_token(&issued.token).is_ok());
    }

    #[test]
    fn test_hash_is_stable_hex() {
        let h = hash_token("abc");
        assert_eq!(h.len(), 64);
        assert_eq!(h, hash_token("abc"));
        assert_ne!(h, hash_token("abd"));
    }

    #[test]
    fn test_extract_token_from_header() {
        assert_eq!(
            extract_token_from_header(Some("Bearer abc123")),
            Some("abc123")
        );
        assert_eq!(extract_token_from_header(Some("abc123")), Some("abc123"));
        assert_eq!(extract_token_from_header(None), None);
        assert_eq!(extract_token_from_header(Some("")), None);
        assert_eq!(extract_token_from_header(Some("Bearer ")), None);
        assert_eq!(extract_token_from_header(Some("Basic abc123")), None);
    }

    #[test]
    fn test_extract_token_from_query() {
        assert_eq!(
            extract_token_from_query(Some("token=abc123")),
            Some("abc123".into())
        );
        assert_eq!(
            extract_token_from_query(Some("lang=en&token=abc123")),
            Some("abc123".into())
        );
        assert_eq!(extract_token_from_query(Some("lang=en")), None);
        assert_eq!(extract_token_from_query(Some("token=")), None);
        assert_eq!(extract_token_from_query(None), None);
    }
}
