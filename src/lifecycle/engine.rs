//! Lifecycle engine: validates and applies passport transitions
//!
//! Every status change goes through [`LifecycleEngine::transition_passport`]:
//! role check, state machine check, compare-and-set persist, audit event.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use super::passport::{Passport, StatusUpdate};
use super::status::{allowed_transitions_for_role, is_role_permitted, PassportStatus};
use crate::audit::{AuditLog, LifecycleEvent};
use crate::auth::ActorRole;
use crate::db::PassportStore;
use crate::types::{GateError, Result};

/// Actor recorded when no identity accompanies a transition
pub const SYSTEM_ACTOR: &str = "system";

/// Outcome of one applied transition
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransitionResult {
    pub passport_id: String,
    pub previous_status: PassportStatus,
    pub new_status: PassportStatus,
    pub event_id: String,
}

/// One asset a bulk transition could not move
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BulkFailure {
    pub asset_id: String,
    pub reason: String,
    pub code: &'static str,
}

/// Partial-failure report of a bulk transition
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BulkTransitionReport {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Asset ids that moved, in request order
    pub results: Vec<String>,
    pub failures: Vec<BulkFailure>,
}

pub struct LifecycleEngine {
    passports: Arc<dyn PassportStore>,
    audit: Arc<AuditLog>,
}

impl LifecycleEngine {
    pub fn new(passports: Arc<dyn PassportStore>, audit: Arc<AuditLog>) -> Self {
        Self { passports, audit }
    }

    pub fn audit(&self) -> &Arc<AuditLog> {
        &self.audit
    }

    pub async fn get_passport(&self, passport_id: &str) -> Result<Passport> {
        self.passports
            .get_passport(passport_id)
            .await?
            .ok_or_else(|| GateError::NotFound(format!("passport {}", passport_id)))
    }

    /// Create a passport in the initial state
    pub async fn register_passport(
        &self,
        passport_id: &str,
        tenant_id: &str,
        serial_number: &str,
    ) -> Result<Passport> {
        let passport_id = passport_id.trim();
        if passport_id.is_empty() || tenant_id.trim().is_empty() {
            return Err(GateError::Validation(
                "passport id and tenant id are required".into(),
            ));
        }

        let passport = Passport::new(passport_id, tenant_id.trim(), serial_number.trim());
        self.passports.insert_passport(passport.clone()).await?;
        info!(passport_id = %passport.id, tenant_id = %passport.tenant_id, "Registered passport");
        Ok(passport)
    }

    /// Move one passport to `to`.
    ///
    /// `role` is the matrix check for external actors and runs before the
    /// state machine, so a restricted role asking for a non-edge is denied
    /// rather than told which edges exist. `None` is the system actor and
    /// only the state machine applies. A blank `actor` is recorded as
    /// `"system"`.
    ///
    /// In strict audit mode a failed event write returns
    /// [`GateError::AuditPending`] after the status has been stored.
    pub async fn transition_passport(
        &self,
        asset_id: &str,
        to: PassportStatus,
        actor: Option<&str>,
        role: Option<ActorRole>,
        metadata: Option<Map<String, Value>>,
    ) -> Result<TransitionResult> {
        let passport = self.get_passport(asset_id).await?;
        let from = passport.status;

        if let Some(role) = role {
            if !is_role_permitted(role, from, to) {
                debug!(passport_id = %asset_id, %role, %from, %to, "Role not permitted");
                return Err(GateError::PermissionDenied {
                    role,
                    from,
                    to,
                    allowed: allowed_transitions_for_role(from, role),
                });
            }
        }

        if !from.can_transition_to(to) {
            debug!(passport_id = %asset_id, %from, %to, "Rejected invalid transition");
            return Err(GateError::InvalidTransition {
                from,
                to,
                allowed: from.allowed_transitions().to_vec(),
            });
        }

        let now = Utc::now();
        let update = StatusUpdate {
            passport_id: passport.id.clone(),
            expected: from,
            new_status: to,
            at: now,
        };

        if !self.passports.update_passport_status(&update).await? {
            // Either the row vanished or another writer moved it first
            return match self.passports.get_passport(asset_id).await? {
                None => Err(GateError::NotFound(format!("passport {}", asset_id))),
                Some(current) => {
                    warn!(
                        passport_id = %asset_id,
                        expected = %from,
                        actual = %current.status,
                        "Concurrent status change"
                    );
                    Err(GateError::Conflict(format!(
                        "passport {} changed from {} to {} during the request",
                        asset_id, from, current.status
                    )))
                }
            };
        }

        let actor = actor
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .unwrap_or(SYSTEM_ACTOR);
        let event = LifecycleEvent::for_transition(&passport.id, from, to, actor, metadata, now);
        let event_id = event.id.clone();

        info!(
            passport_id = %passport.id,
            %from,
            %to,
            actor = %actor,
            event_id = %event_id,
            "Passport transitioned"
        );

        if let Err(e) = self.audit.record(event).await {
            // Only strict mode gets here; the status write stands
            warn!(
                passport_id = %passport.id,
                event_id = %event_id,
                error = %e,
                "Transition applied, audit pending"
            );
            return Err(GateError::AuditPending {
                passport_id: passport.id,
                new_status: to,
                event_id,
            });
        }

        Ok(TransitionResult {
            passport_id: passport.id,
            previous_status: from,
            new_status: to,
            event_id,
        })
    }

    /// Move many passports to `to` as the system actor.
    ///
    /// Sequential, no rollback: each asset succeeds or fails on its own.
    pub async fn bulk_transition_passports(
        &self,
        asset_ids: &[String],
        to: PassportStatus,
        actor: Option<&str>,
        metadata: Option<Map<String, Value>>,
    ) -> BulkTransitionReport {
        let mut report = BulkTransitionReport {
            total: asset_ids.len(),
            ..Default::default()
        };

        for asset_id in asset_ids {
            match self
                .transition_passport(asset_id, to, actor, None, metadata.clone())
                .await
            {
                Ok(result) => {
                    report.succeeded += 1;
                    report.results.push(result.passport_id);
                }
                Err(e) => {
                    if e.is_server_error() {
                        warn!(passport_id = %asset_id, error = %e, "Bulk transition failed");
                    }
                    report.failed += 1;
                    report.failures.push(BulkFailure {
                        asset_id: asset_id.clone(),
                        reason: e.client_message(),
                        code: e.code(),
                    });
                }
            }
        }

        info!(
            to = %to,
            total = report.total,
            succeeded = report.succeeded,
            failed = report.failed,
            "Bulk transition finished"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::AuditWriteMode;
    use crate::db::{MemoryStore, Stores};
    use serde_json::json;
    use PassportStatus::*;

    async fn engine_with(ids: &[&str]) -> LifecycleEngine {
        let stores = Stores::from_backend(Arc::new(MemoryStore::new()));
        let audit = Arc::new(AuditLog::new(stores.events.clone(), AuditWriteMode::BestEffort));
        let engine = LifecycleEngine::new(stores.passports.clone(), audit);
        for id in ids {
            engine.register_passport(id, "tenant-1", "SN").await.unwrap();
        }
        engine
    }

    #[tokio::test]
    async fn test_valid_transition_writes_one_event() {
        let engine = engine_with(&["p-1"]).await;
        let mut meta = Map::new();
        meta.insert("carrier".into(), json!("DHL"));

        let result = engine
            .transition_passport("p-1", Shipped, Some("ops@maker.com"), None, Some(meta))
            .await
            .unwrap();
        assert_eq!(result.previous_status, Active);
        assert_eq!(result.new_status, Shipped);

        let events = engine.audit().get_passport_events("p-1").await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].id, result.event_id);
        assert_eq!(events[0].actor, "ops@maker.com");
        assert_eq!(events[0].previous_status(), Some("ACTIVE"));
        assert_eq!(events[0].new_status(), Some("SHIPPED"));
        assert_eq!(events[0].metadata["carrier"], json!("DHL"));
    }

    #[tokio::test]
    async fn test_invalid_transition_carries_allowed_set() {
        let engine = engine_with(&["p-1"]).await;
        let err = engine
            .transition_passport("p-1", Recycled, None, None, None)
            .await
            .unwrap_err();

        match err {
            GateError::InvalidTransition { from, to, allowed } => {
                assert_eq!(from, Active);
                assert_eq!(to, Recycled);
                assert_eq!(allowed, vec![Shipped, Recalled]);
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(engine.get_passport("p-1").await.unwrap().status, Active);
        assert!(engine.audit().get_passport_events("p-1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_role_matrix_enforced() {
        let engine = engine_with(&["p-1"]).await;

        let err = engine
            .transition_passport("p-1", Shipped, Some("c@x.com"), Some(ActorRole::Customer), None)
            .await
            .unwrap_err();
        assert!(matches!(err, GateError::PermissionDenied { .. }));
        assert_eq!(err.allowed_transitions(), Some(&[][..]));
        assert_eq!(
            err.to_string(),
            "Role CUSTOMER is not permitted to transition from ACTIVE to SHIPPED"
        );

        let err = engine
            .transition_passport("p-1", Recalled, Some("d@x.com"), Some(ActorRole::Logistics), None)
            .await
            .unwrap_err();
        assert_eq!(err.allowed_transitions(), Some(&[Shipped][..]));

        let ok = engine
            .transition_passport("p-1", Shipped, Some("d@x.com"), Some(ActorRole::Logistics), None)
            .await
            .unwrap();
        assert_eq!(ok.new_status, Shipped);
        assert!(engine.get_passport("p-1").await.unwrap().shipped_at.is_some());
    }

    #[tokio::test]
    async fn test_blank_actor_is_system() {
        let engine = engine_with(&["p-1"]).await;
        engine
            .transition_passport("p-1", Recalled, Some("   "), None, None)
            .await
            .unwrap();
        let events = engine.audit().get_passport_events("p-1").await.unwrap();
        assert_eq!(events[0].actor, SYSTEM_ACTOR);
    }

    #[tokio::test]
    async fn test_unknown_passport() {
        let engine = engine_with(&[]).await;
        let err = engine
            .transition_passport("nope", Shipped, None, None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, GateError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_bulk_partial_failure() {
        let engine = engine_with(&["p-1", "p-2", "p-3"]).await;
        for to in [Shipped, InService, Recycled] {
            engine
                .transition_passport("p-2", to, None, None, None)
                .await
                .unwrap();
        }

        let ids: Vec<String> = ["p-1", "p-2", "p-3"].iter().map(|s| s.to_string()).collect();
        let report = engine
            .bulk_transition_passports(&ids, Recalled, Some("admin@maker.com"), None)
            .await;

        assert_eq!(report.total, 3);
        assert_eq!(report.succeeded, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(report.results, vec!["p-1".to_string(), "p-3".to_string()]);
        assert_eq!(report.failures[0].asset_id, "p-2");
        assert_eq!(report.failures[0].code, "INVALID_TRANSITION");
        assert_eq!(engine.get_passport("p-2").await.unwrap().status, Recycled);
    }

    #[tokio::test]
    async fn test_bulk_duplicate_ids_processed_in_order() {
        let engine = engine_with(&["p-1"]).await;
        let ids = vec!["p-1".to_string(), "p-1".to_string()];
        let report = engine.bulk_transition_passports(&ids, Shipped, None, None).await;
        assert_eq!(report.succeeded, 1);
        assert_eq!(report.failed, 1);
    }

    #[tokio::test]
    async fn test_register_rejects_duplicates_and_blank_ids() {
        let engine = engine_with(&["p-1"]).await;
        assert!(matches!(
            engine.register_passport("p-1", "t", "SN").await,
            Err(GateError::Conflict(_))
        ));
        assert!(matches!(
            engine.register_passport("  ", "t", "SN").await,
            Err(GateError::Validation(_))
        ));
    }
}
