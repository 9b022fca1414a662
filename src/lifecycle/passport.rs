//! Battery passport record

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::status::{Milestone, PassportStatus};

/// A tracked battery unit and its lifecycle state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Passport {
    pub id: String,
    pub tenant_id: String,
    pub serial_number: String,
    pub status: PassportStatus,
    pub shipped_at: Option<DateTime<Utc>>,
    pub installed_at: Option<DateTime<Utc>>,
    pub returned_at: Option<DateTime<Utc>>,
    pub recycled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Passport {
    /// New passport in the initial `ACTIVE` state
    pub fn new(
        id: impl Into<String>,
        tenant_id: impl Into<String>,
        serial_number: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            tenant_id: tenant_id.into(),
            serial_number: serial_number.into(),
            status: PassportStatus::Active,
            shipped_at: None,
            installed_at: None,
            returned_at: None,
            recycled_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn milestone(&self, milestone: Milestone) -> Option<DateTime<Utc>> {
        match milestone {
            Milestone::ShippedAt => self.shipped_at,
            Milestone::InstalledAt => self.installed_at,
            Milestone::ReturnedAt => self.returned_at,
            Milestone::RecycledAt => self.recycled_at,
        }
    }

    /// Apply a status change in place. Only stores call this, after their
    /// compare-and-set on the previous status succeeded.
    pub fn apply_status(&mut self, update: &StatusUpdate) {
        self.status = update.new_status;
        if let Some(milestone) = update.new_status.milestone() {
            let slot = match milestone {
                Milestone::ShippedAt => &mut self.shipped_at,
                Milestone::InstalledAt => &mut self.installed_at,
                Milestone::ReturnedAt => &mut self.returned_at,
                Milestone::RecycledAt => &mut self.recycled_at,
            };
            *slot = Some(update.at);
        }
        self.updated_at = update.at;
    }
}

/// Compare-and-set status change handed to the passport store
#[derive(Debug, Clone, PartialEq)]
pub struct StatusUpdate {
    pub passport_id: String,
    /// Status the passport must still have for the update to apply
    pub expected: PassportStatus,
    pub new_status: PassportStatus,
    pub at: DateTime<Utc>,
}
