//! Configuration for passport-gate
//!
//! CLI arguments with environment variable fallbacks, using clap.

use clap::{Parser, ValueEnum};
use std::net::SocketAddr;
use std::path::PathBuf;

use crate::audit::AuditWriteMode;
use crate::auth::{capability::MIN_SECRET_LEN, CapabilityTokenService};
use crate::types::Result;

/// Where durable state lives
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StorageBackend {
    /// Process memory, lost on restart
    Memory,
    /// MongoDB at MONGODB_URI
    Mongo,
}

impl StorageBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageBackend::Memory => "memory",
            StorageBackend::Mongo => "mongo",
        }
    }
}

/// passport-gate - battery passport lifecycle gateway
#[derive(Parser, Debug, Clone)]
#[command(name = "passport-gate")]
#[command(about = "Magic-link gateway for battery passport lifecycle transitions")]
pub struct Args {
    /// Address to listen on
    #[arg(long, env = "LISTEN", default_value = "0.0.0.0:8080")]
    pub listen: SocketAddr,

    /// Enable development mode (fixed signing secret, relaxed startup)
    #[arg(long, env = "DEV_MODE", default_value = "false")]
    pub dev_mode: bool,

    /// Storage backend
    #[arg(long, env = "STORAGE_BACKEND", value_enum, default_value = "memory")]
    pub storage_backend: StorageBackend,

    /// MongoDB connection URI
    #[arg(long, env = "MONGODB_URI", default_value = "mongodb://localhost:27017")]
    pub mongodb_uri: String,

    /// MongoDB database name
    #[arg(long, env = "MONGODB_DB", default_value = "passport_gate")]
    pub mongodb_db: String,

    /// Secret for signing magic links (required in production)
    #[arg(long, env = "JWT_SECRET")]
    pub jwt_secret: Option<String>,

    /// Key for the admin endpoints. Admin endpoints are open when unset.
    #[arg(long, env = "ADMIN_API_KEY")]
    pub admin_api_key: Option<String>,

    /// Reject a magic link after it has been used once
    #[arg(
        long,
        env = "SINGLE_USE_LINKS",
        default_value_t = true,
        action = clap::ArgAction::Set
    )]
    pub single_use_links: bool,

    /// What a failed audit write does to the request
    #[arg(long, env = "AUDIT_WRITE_MODE", value_enum, default_value = "best-effort")]
    pub audit_write_mode: AuditWriteMode,

    /// Seconds between retries of queued audit events
    #[arg(long, env = "AUDIT_RETRY_INTERVAL_SECS", default_value = "30")]
    pub audit_retry_interval_secs: u64,

    /// JSONL file for link and transition activity (disabled when unset)
    #[arg(long, env = "ACTIVITY_LOG_PATH")]
    pub activity_log_path: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl Args {
    /// Token service for the configured secret; the fixed dev secret when
    /// running in dev mode without one
    pub fn token_service(&self) -> Result<CapabilityTokenService> {
        match (self.jwt_secret.as_deref(), self.dev_mode) {
            (Some(secret), _) => CapabilityTokenService::new(secret),
            (None, true) => Ok(CapabilityTokenService::new_dev()),
            (None, false) => CapabilityTokenService::new(""),
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> std::result::Result<(), String> {
        if !self.dev_mode && self.jwt_secret.is_none() {
            return Err("JWT_SECRET is required in production mode".to_string());
        }

        if let Some(secret) = &self.jwt_secret {
            if secret.len() < MIN_SECRET_LEN {
                return Err(format!(
                    "JWT_SECRET must be at least {} characters",
                    MIN_SECRET_LEN
                ));
            }
        }

        if self.audit_retry_interval_secs == 0 {
            return Err("AUDIT_RETRY_INTERVAL_SECS must be greater than 0".to_string());
        }

        if self.admin_api_key.as_deref().is_some_and(|k| k.trim().is_empty()) {
            return Err("ADMIN_API_KEY must not be blank".to_string());
        }

        Ok(())
    }
}
