//! Activity notifications for the loyalty/reward system
//!
//! Issued links and applied transitions are appended as JSONL. The reward
//! system tails the file; nothing here computes points.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info};

use crate::auth::ActorRole;
use crate::lifecycle::PassportStatus;
use crate::trust::TrustTier;

/// Activity event types
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ActivityType {
    /// Capability token issued
    LinkIssued,
    /// Token request refused by the trust registry
    LinkRejected,
    /// Passport status changed
    TransitionApplied,
}

/// One line of the activity log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityEvent {
    pub timestamp: DateTime<Utc>,
    pub event_type: ActivityType,
    pub asset_id: String,
    /// Actor email, or "system"
    pub actor: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<ActorRole>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tier: Option<TrustTier>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_status: Option<PassportStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_status: Option<PassportStatus>,
}

impl ActivityEvent {
    pub fn new(event_type: ActivityType, asset_id: &str, actor: &str) -> Self {
        Self {
            timestamp: Utc::now(),
            event_type,
            asset_id: asset_id.to_string(),
            actor: actor.to_string(),
            role: None,
            tier: None,
            token_id: None,
            previous_status: None,
            new_status: None,
        }
    }

    pub fn with_role(mut self, role: ActorRole) -> Self {
        self.role = Some(role);
        self
    }

    pub fn with_tier(mut self, tier: TrustTier) -> Self {
        self.tier = Some(tier);
        self
    }

    pub fn with_token(mut self, token_id: &str) -> Self {
        self.token_id = Some(token_id.to_string());
        self
    }

    pub fn with_statuses(mut self, previous: PassportStatus, new: PassportStatus) -> Self {
        self.previous_status = Some(previous);
        self.new_status = Some(new);
        self
    }

    pub fn to_jsonl(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// JSONL activity writer. Without a file it only counts.
#[derive(Clone)]
pub struct ActivityLogger {
    inner: Arc<Mutex<ActivityLoggerInner>>,
}

struct ActivityLoggerInner {
    writer: Option<BufWriter<File>>,
    path: Option<PathBuf>,
    written: u64,
}

impl Default for ActivityLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl ActivityLogger {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(ActivityLoggerInner {
                writer: None,
                path: None,
                written: 0,
            })),
        }
    }

    /// Start appending to `path`
    pub async fn init_file(&self, path: PathBuf) -> std::io::Result<()> {
        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        let mut inner = self.inner.lock().await;
        inner.writer = Some(BufWriter::new(file));
        inner.path = Some(path.clone());

        info!("Activity logging initialized to {}", path.display());
        Ok(())
    }

    pub async fn path(&self) -> Option<PathBuf> {
        self.inner.lock().await.path.clone()
    }

    /// Events accepted since startup
    pub async fn written(&self) -> u64 {
        self.inner.lock().await.written
    }

    pub async fn log(&self, event: ActivityEvent) {
        let line = match event.to_jsonl() {
            Ok(line) => line,
            Err(e) => {
                error!("Failed to serialize activity event: {}", e);
                return;
            }
        };

        let mut inner = self.inner.lock().await;
        inner.written += 1;

        if let Some(ref mut writer) = inner.writer {
            if let Err(e) = writeln!(writer, "{}", line) {
                error!("Failed to write activity event: {}", e);
            }
            if let Err(e) = writer.flush() {
                error!("Failed to flush activity log: {}", e);
            }
        }
    }

    pub async fn log_link_issued(
        &self,
        asset_id: &str,
        email: &str,
        role: ActorRole,
        tier: TrustTier,
        token_id: &str,
    ) {
        let event = ActivityEvent::new(ActivityType::LinkIssued, asset_id, email)
            .with_role(role)
            .with_tier(tier)
            .with_token(token_id);
        self.log(event).await;
    }

    pub async fn log_link_rejected(&self, asset_id: &str, email: &str) {
        let event = ActivityEvent::new(ActivityType::LinkRejected, asset_id, email)
            .with_tier(TrustTier::Rejected);
        self.log(event).await;
    }

    pub async fn log_transition(
        &self,
        asset_id: &str,
        actor: &str,
        role: Option<ActorRole>,
        previous: PassportStatus,
        new: PassportStatus,
    ) {
        let mut event = ActivityEvent::new(ActivityType::TransitionApplied, asset_id, actor)
            .with_statuses(previous, new);
        if let Some(role) = role {
            event = event.with_role(role);
        }
        self.log(event).await;
    }
}
