//! Magic link service
//!
//! The facade the HTTP layer calls. Ties together the trust registry, the
//! capability token service, the token-hash store and the lifecycle engine:
//!
//! 1. `request_link`: trust decision, partner-code charge, token mint
//! 2. `act_with_link`: token check, single-use check, lifecycle transition
//! 3. `action_info`: what the token holder may do next
//! 4. `passport_events`: audit trail read

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::audit::{AuditLog, LifecycleEvent};
use crate::auth::{hash_token, ActorRole, CapabilityClaims, CapabilityTokenService, TokenRecord};
use crate::db::{Stores, TokenStore};
use crate::lifecycle::{
    allowed_transitions_for_role, BulkTransitionReport, LifecycleEngine, PassportStatus,
    TransitionResult,
};
use crate::logging::ActivityLogger;
use crate::trust::{TrustRegistry, TrustTier};
use crate::types::{GateError, Result};

/// Upper bound on asset ids in one bulk request
pub const MAX_BULK_ASSETS: usize = 1000;

#[derive(Debug, Clone, Copy)]
pub struct MagicLinkConfig {
    /// Reject a token once it has driven a transition
    pub single_use: bool,
}

impl Default for MagicLinkConfig {
    fn default() -> Self {
        Self { single_use: true }
    }
}

/// Body of a link request
#[derive(Debug, Clone, Deserialize)]
pub struct LinkRequest {
    pub asset_id: String,
    pub email: String,
    /// Role the actor claims; the registry's role wins
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub partner_code: Option<String>,
}

/// A minted magic link, returned once and never stored
#[derive(Debug, Clone, Serialize)]
pub struct IssuedLink {
    pub token: String,
    pub token_id: String,
    pub asset_id: String,
    pub expires_at: DateTime<Utc>,
    pub tier: TrustTier,
    pub role: ActorRole,
    pub company: Option<String>,
}

#[derive(Debug, Clone)]
pub enum LinkRequestOutcome {
    Issued(IssuedLink),
    Rejected { reason: String, requires_code: bool },
}

/// What the holder of a token may do right now
#[derive(Debug, Clone, Serialize)]
pub struct ActionInfo {
    pub asset_id: String,
    pub email: String,
    pub role: ActorRole,
    pub current_status: PassportStatus,
    pub allowed_transitions: Vec<PassportStatus>,
    pub expires_at: DateTime<Utc>,
}

pub struct MagicLinkService {
    engine: Arc<LifecycleEngine>,
    registry: TrustRegistry,
    tokens: CapabilityTokenService,
    token_store: Arc<dyn TokenStore>,
    activity: ActivityLogger,
    config: MagicLinkConfig,
}

impl MagicLinkService {
    pub fn new(
        stores: &Stores,
        tokens: CapabilityTokenService,
        audit: Arc<AuditLog>,
        activity: ActivityLogger,
        config: MagicLinkConfig,
    ) -> Self {
        Self {
            engine: Arc::new(LifecycleEngine::new(stores.passports.clone(), audit)),
            registry: TrustRegistry::new(stores.trust.clone()),
            tokens,
            token_store: stores.tokens.clone(),
            activity,
            config,
        }
    }

    pub fn engine(&self) -> &Arc<LifecycleEngine> {
        &self.engine
    }

    pub fn registry(&self) -> &TrustRegistry {
        &self.registry
    }

    pub fn config(&self) -> MagicLinkConfig {
        self.config
    }

    /// Decide on and, if allowed, mint a magic link for one passport
    pub async fn request_link(&self, request: LinkRequest) -> Result<LinkRequestOutcome> {
        let asset_id = request.asset_id.trim();
        let email = request.email.trim().to_ascii_lowercase();
        if asset_id.is_empty() || email.is_empty() {
            return Err(GateError::Validation("asset_id and email are required".into()));
        }
        let claimed_role = request
            .role
            .as_deref()
            .filter(|r| !r.trim().is_empty())
            .map(str::parse::<ActorRole>)
            .transpose()?;

        self.engine.get_passport(asset_id).await?;

        let verdict = self
            .registry
            .verify_partner_access(&email, request.partner_code.as_deref())
            .await?;

        let (true, Some(role)) = (verdict.allowed, verdict.role) else {
            self.activity.log_link_rejected(asset_id, &email).await;
            return Ok(LinkRequestOutcome::Rejected {
                reason: verdict.reject_reason.unwrap_or_default(),
                requires_code: true,
            });
        };

        if let Some(claimed) = claimed_role.filter(|claimed| *claimed != role) {
            debug!(%claimed, resolved = %role, "Claimed role overridden by registry");
        }

        if let Some(code_id) = verdict.partner_code_id.as_deref() {
            let charged = self
                .registry
                .increment_partner_code_usage(code_id, &email, asset_id)
                .await?;
            if !charged {
                debug!(code_id, "Partner code exhausted between check and charge");
                self.activity.log_link_rejected(asset_id, &email).await;
                return Ok(LinkRequestOutcome::Rejected {
                    reason: crate::trust::REJECT_REASON.to_string(),
                    requires_code: true,
                });
            }
        }

        // A charged code stays charged if minting or recording fails
        let minted = async {
            let issued = self.tokens.generate_token_for_role(asset_id, &email, role)?;
            self.token_store
                .store_token_hash(TokenRecord::from_issued(&issued, verdict.tier))
                .await?;
            Ok::<_, GateError>(issued)
        }
        .await;
        let issued = match minted {
            Ok(issued) => issued,
            Err(e) => {
                if let Some(code_id) = verdict.partner_code_id.as_deref() {
                    warn!(
                        code_id,
                        passport_id = %asset_id,
                        error = %e,
                        "Partner code use charged but no link issued"
                    );
                }
                return Err(e);
            }
        };

        info!(
            passport_id = %asset_id,
            tier = %verdict.tier,
            role = %role,
            token_id = %issued.token_id,
            "Magic link issued"
        );
        self.activity
            .log_link_issued(asset_id, &email, role, verdict.tier, &issued.token_id)
            .await;

        Ok(LinkRequestOutcome::Issued(IssuedLink {
            token: issued.token,
            token_id: issued.token_id,
            asset_id: asset_id.to_string(),
            expires_at: issued.expires_at,
            tier: verdict.tier,
            role,
            company: verdict.company,
        }))
    }

    /// Drive one transition with a magic link
    pub async fn act_with_link(
        &self,
        token: &str,
        asset_id: &str,
        to: PassportStatus,
        metadata: Option<Map<String, Value>>,
    ) -> Result<TransitionResult> {
        let claims = self.tokens.validate_token_for_asset(token, asset_id)?;
        let token_hash = hash_token(token);
        self.ensure_unused(&token_hash).await?;

        let mut metadata = metadata.unwrap_or_default();
        metadata.insert("via".into(), Value::String("magic_link".into()));
        metadata.insert("token_id".into(), Value::String(claims.jti.clone()));
        metadata.insert("role".into(), Value::String(claims.role.as_str().into()));

        let result = match self
            .engine
            .transition_passport(
                asset_id,
                to,
                Some(&claims.email),
                Some(claims.role),
                Some(metadata),
            )
            .await
        {
            Ok(result) => result,
            Err(e @ GateError::AuditPending { .. }) => {
                // The transition stands, so the link is spent
                self.mark_used(&token_hash, &claims.jti).await?;
                return Err(e);
            }
            Err(e) => return Err(e),
        };

        self.mark_used(&token_hash, &claims.jti).await?;

        self.activity
            .log_transition(
                asset_id,
                &claims.email,
                Some(claims.role),
                result.previous_status,
                result.new_status,
            )
            .await;

        Ok(result)
    }

    /// Current status and the transitions the token's role may drive
    pub async fn action_info(&self, token: &str) -> Result<ActionInfo> {
        let claims: CapabilityClaims = self.tokens.validate_token(token)?;
        self.ensure_unused(&hash_token(token)).await?;

        let passport = self.engine.get_passport(&claims.asset_id).await?;
        Ok(ActionInfo {
            allowed_transitions: allowed_transitions_for_role(passport.status, claims.role),
            current_status: passport.status,
            expires_at: claims.expires_at(),
            asset_id: claims.asset_id,
            email: claims.email,
            role: claims.role,
        })
    }

    /// Audit trail of a passport, oldest first
    pub async fn passport_events(&self, asset_id: &str) -> Result<Vec<LifecycleEvent>> {
        self.engine.get_passport(asset_id).await?;
        self.engine.audit().get_passport_events(asset_id).await
    }

    /// Administrative bulk move, no role checks
    pub async fn bulk_transition(
        &self,
        asset_ids: &[String],
        to: PassportStatus,
        actor: Option<&str>,
        metadata: Option<Map<String, Value>>,
    ) -> Result<BulkTransitionReport> {
        if asset_ids.is_empty() {
            return Err(GateError::Validation("asset_ids must not be empty".into()));
        }
        if asset_ids.len() > MAX_BULK_ASSETS {
            return Err(GateError::Validation(format!(
                "at most {} asset_ids per request",
                MAX_BULK_ASSETS
            )));
        }
        Ok(self
            .engine
            .bulk_transition_passports(asset_ids, to, actor, metadata)
            .await)
    }

    async fn mark_used(&self, token_hash: &str, token_id: &str) -> Result<()> {
        if self.config.single_use && !self.token_store.mark_token_hash_used(token_hash).await? {
            warn!(token_id, "Magic link was already marked used");
        }
        Ok(())
    }

    /// With single-use on, only a recorded and unused token passes
    async fn ensure_unused(&self, token_hash: &str) -> Result<()> {
        if !self.config.single_use {
            return Ok(());
        }
        match self.token_store.get_token_record(token_hash).await? {
            None => Err(GateError::Auth("token not on record".into())),
            Some(record) if record.is_used() => Err(GateError::Auth("token already used".into())),
            Some(_) => Ok(()),
        }
    }
}
