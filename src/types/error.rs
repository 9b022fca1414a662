//! Error types for passport-gate
//!
//! Every fallible operation returns [`GateError`]. Variants map onto HTTP
//! status codes and carry a client-safe message; storage and configuration
//! details are logged, never returned.

use hyper::StatusCode;

use crate::auth::ActorRole;
use crate::lifecycle::PassportStatus;

/// Generic message for every authentication failure.
pub const AUTH_FAILURE_MESSAGE: &str = "invalid or expired token";

/// Main error type for passport-gate operations
#[derive(Debug, thiserror::Error)]
pub enum GateError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// The inner string is the internal reason (signature, expiry, scope).
    /// It is logged but never shown to the client.
    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Invalid transition from {from} to {to}")]
    InvalidTransition {
        from: PassportStatus,
        to: PassportStatus,
        allowed: Vec<PassportStatus>,
    },

    #[error("Role {role} is not permitted to transition from {from} to {to}")]
    PermissionDenied {
        role: ActorRole,
        from: PassportStatus,
        to: PassportStatus,
        /// What this role may do from `from`
        allowed: Vec<PassportStatus>,
    },

    #[error("Conflict: {0}")]
    Conflict(String),

    /// Strict audit mode: the status change is stored but its event is
    /// still queued.
    #[error("Passport {passport_id} moved to {new_status}; audit event {event_id} is pending")]
    AuditPending {
        passport_id: String,
        new_status: PassportStatus,
        event_id: String,
    },

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl GateError {
    /// Convert error to HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Auth(_) => StatusCode::UNAUTHORIZED,
            Self::InvalidTransition { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Self::PermissionDenied { .. } => StatusCode::FORBIDDEN,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::AuditPending { .. } => StatusCode::ACCEPTED,
            Self::Persistence(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short machine-readable code for JSON error bodies
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Auth(_) => "AUTH_ERROR",
            Self::InvalidTransition { .. } => "INVALID_TRANSITION",
            Self::PermissionDenied { .. } => "PERMISSION_DENIED",
            Self::Conflict(_) => "CONFLICT",
            Self::AuditPending { .. } => "AUDIT_PENDING",
            Self::Persistence(_) => "PERSISTENCE_ERROR",
            Self::Config(_) | Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Message that is safe to return to the caller.
    pub fn client_message(&self) -> String {
        match self {
            Self::Auth(_) => AUTH_FAILURE_MESSAGE.to_string(),
            Self::Persistence(_) => "storage unavailable".to_string(),
            Self::Config(_) | Self::Internal(_) => "internal error".to_string(),
            other => other.to_string(),
        }
    }

    /// Allowed next states, for errors that should help the client recover
    pub fn allowed_transitions(&self) -> Option<&[PassportStatus]> {
        match self {
            Self::InvalidTransition { allowed, .. } | Self::PermissionDenied { allowed, .. } => {
                Some(allowed)
            }
            _ => None,
        }
    }

    /// Status the passport now holds when the error came after the write
    pub fn applied_status(&self) -> Option<PassportStatus> {
        match self {
            Self::AuditPending { new_status, .. } => Some(*new_status),
            _ => None,
        }
    }

    /// Whether this error indicates a server-side fault (5xx)
    pub fn is_server_error(&self) -> bool {
        self.status_code().is_server_error()
    }
}

impl From<std::io::Error> for GateError {
    fn from(err: std::io::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<serde_json::Error> for GateError {
    fn from(err: serde_json::Error) -> Self {
        Self::Validation(format!("JSON error: {}", err))
    }
}

impl From<mongodb::error::Error> for GateError {
    fn from(err: mongodb::error::Error) -> Self {
        Self::Persistence(err.to_string())
    }
}

impl From<bson::ser::Error> for GateError {
    fn from(err: bson::ser::Error) -> Self {
        Self::Persistence(format!("BSON encode failed: {}", err))
    }
}

impl From<bson::de::Error> for GateError {
    fn from(err: bson::de::Error) -> Self {
        Self::Persistence(format!("BSON decode failed: {}", err))
    }
}

/// Result type alias for passport-gate operations
pub type Result<T> = std::result::Result<T, GateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_error_hides_reason() {
        let err = GateError::Auth("signature mismatch".into());
        assert_eq!(err.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(err.client_message(), AUTH_FAILURE_MESSAGE);
        assert!(!err.client_message().contains("signature"));
    }

    #[test]
    fn test_persistence_error_hides_detail() {
        let err = GateError::Persistence("connection refused at 10.0.0.3".into());
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(!err.client_message().contains("10.0.0.3"));
        assert!(err.is_server_error());
    }

    #[test]
    fn test_invalid_transition_carries_allowed_set() {
        let err = GateError::InvalidTransition {
            from: PassportStatus::Active,
            to: PassportStatus::Recycled,
            allowed: vec![PassportStatus::Shipped, PassportStatus::Recalled],
        };
        assert_eq!(err.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(
            err.allowed_transitions(),
            Some(&[PassportStatus::Shipped, PassportStatus::Recalled][..])
        );
        assert!(!err.is_server_error());
    }

    #[test]
    fn test_permission_denied_names_role_and_states() {
        let err = GateError::PermissionDenied {
            role: ActorRole::Customer,
            from: PassportStatus::Active,
            to: PassportStatus::ReturnRequested,
            allowed: vec![],
        };
        let msg = err.client_message();
        assert!(msg.contains("CUSTOMER"));
        assert!(msg.contains("ACTIVE"));
        assert!(msg.contains("RETURN_REQUESTED"));
        assert_eq!(err.allowed_transitions(), Some(&[][..]));
    }

    #[test]
    fn test_audit_pending_reports_applied_status() {
        let err = GateError::AuditPending {
            passport_id: "p-1".into(),
            new_status: PassportStatus::Recalled,
            event_id: "evt-1".into(),
        };
        assert_eq!(err.code(), "AUDIT_PENDING");
        assert_eq!(err.applied_status(), Some(PassportStatus::Recalled));
        assert!(!err.is_server_error());
        assert!(err.client_message().contains("RECALLED"));
    }
}
