//! Passport status state machine and role-permission matrix
//!
//! Both tables are exhaustive matches over closed enums, so adding a status
//! or a role will not compile until every decision below is revisited.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::auth::ActorRole;
use crate::types::GateError;

/// Lifecycle status of a battery passport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[derive(Default)]
pub enum PassportStatus {
    /// Manufactured, not yet shipped
    #[default]
    Active,
    Shipped,
    /// Installed at the customer site
    InService,
    ReturnRequested,
    Returned,
    Recycled,
    Recalled,
    EndOfLife,
}

/// Event type recorded in the audit log, derived from the target status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LifecycleEventType {
    Reactivated,
    Shipped,
    Installed,
    ReturnRequested,
    Returned,
    Recycled,
    Recalled,
    EndOfLife,
}

/// Milestone timestamp stamped when a passport enters certain states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Milestone {
    ShippedAt,
    InstalledAt,
    ReturnedAt,
    RecycledAt,
}

impl Milestone {
    /// Field name in the persisted passport document
    pub fn field_name(&self) -> &'static str {
        match self {
            Milestone::ShippedAt => "shipped_at",
            Milestone::InstalledAt => "installed_at",
            Milestone::ReturnedAt => "returned_at",
            Milestone::RecycledAt => "recycled_at",
        }
    }
}

impl PassportStatus {
    pub const ALL: [PassportStatus; 8] = [
        PassportStatus::Active,
        PassportStatus::Shipped,
        PassportStatus::InService,
        PassportStatus::ReturnRequested,
        PassportStatus::Returned,
        PassportStatus::Recycled,
        PassportStatus::Recalled,
        PassportStatus::EndOfLife,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PassportStatus::Active => "ACTIVE",
            PassportStatus::Shipped => "SHIPPED",
            PassportStatus::InService => "IN_SERVICE",
            PassportStatus::ReturnRequested => "RETURN_REQUESTED",
            PassportStatus::Returned => "RETURNED",
            PassportStatus::Recycled => "RECYCLED",
            PassportStatus::Recalled => "RECALLED",
            PassportStatus::EndOfLife => "END_OF_LIFE",
        }
    }

    /// Outgoing edges of the state machine
    pub fn allowed_transitions(&self) -> &'static [PassportStatus] {
        use PassportStatus::*;
        match self {
            Active => &[Shipped, Recalled],
            Shipped => &[InService, Recalled],
            InService => &[ReturnRequested, Recycled, Recalled],
            ReturnRequested => &[Returned, Recycled, Recalled],
            Returned => &[InService, Recycled, Recalled],
            Recalled => &[Recycled, EndOfLife],
            Recycled | EndOfLife => &[],
        }
    }

    pub fn can_transition_to(&self, to: PassportStatus) -> bool {
        self.allowed_transitions().contains(&to)
    }

    pub fn is_terminal(&self) -> bool {
        self.allowed_transitions().is_empty()
    }

    /// Milestone stamped on entering this status, if any
    pub fn milestone(&self) -> Option<Milestone> {
        match self {
            PassportStatus::Shipped => Some(Milestone::ShippedAt),
            PassportStatus::InService => Some(Milestone::InstalledAt),
            PassportStatus::Returned => Some(Milestone::ReturnedAt),
            PassportStatus::Recycled => Some(Milestone::RecycledAt),
            PassportStatus::Active
            | PassportStatus::ReturnRequested
            | PassportStatus::Recalled
            | PassportStatus::EndOfLife => None,
        }
    }

    /// Audit event type for a transition into this status
    pub fn event_type(&self) -> LifecycleEventType {
        match self {
            PassportStatus::Active => LifecycleEventType::Reactivated,
            PassportStatus::Shipped => LifecycleEventType::Shipped,
            PassportStatus::InService => LifecycleEventType::Installed,
            PassportStatus::ReturnRequested => LifecycleEventType::ReturnRequested,
            PassportStatus::Returned => LifecycleEventType::Returned,
            PassportStatus::Recycled => LifecycleEventType::Recycled,
            PassportStatus::Recalled => LifecycleEventType::Recalled,
            PassportStatus::EndOfLife => LifecycleEventType::EndOfLife,
        }
    }
}

impl fmt::Display for PassportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PassportStatus {
    type Err = GateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase();
        PassportStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == normalized)
            .ok_or_else(|| GateError::Validation(format!("unknown status: {}", s.trim())))
    }
}

/// Whether `from -> to` is an edge of the state machine
pub fn is_valid_transition(from: PassportStatus, to: PassportStatus) -> bool {
    from.can_transition_to(to)
}

/// Edge set for a state
pub fn get_allowed_transitions(from: PassportStatus) -> Vec<PassportStatus> {
    from.allowed_transitions().to_vec()
}

/// Whether `role` may drive the edge `from -> to`.
///
/// Does not check that the edge exists; callers check the state machine first.
pub fn is_role_permitted(role: ActorRole, from: PassportStatus, to: PassportStatus) -> bool {
    use PassportStatus::*;
    match role {
        ActorRole::Manufacturer => true,
        ActorRole::Logistics => matches!((from, to), (Active, Shipped)),
        ActorRole::Technician => matches!((from, to), (Shipped, InService) | (Returned, InService)),
        ActorRole::Customer => matches!((from, to), (InService, ReturnRequested)),
        ActorRole::Recycler => matches!((from, to), (InService, Recycled) | (ReturnRequested, Recycled)),
    }
}

/// Edges out of `from` that `role` may drive
pub fn allowed_transitions_for_role(from: PassportStatus, role: ActorRole) -> Vec<PassportStatus> {
    from.allowed_transitions()
        .iter()
        .copied()
        .filter(|to| is_role_permitted(role, from, *to))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use PassportStatus::*;

    #[test]
    fn test_forward_path() {
        assert!(is_valid_transition(Active, Shipped));
        assert!(is_valid_transition(Shipped, InService));
        assert!(is_valid_transition(InService, ReturnRequested));
        assert!(is_valid_transition(ReturnRequested, Returned));
        assert!(is_valid_transition(Returned, InService));
        assert!(is_valid_transition(Returned, Recycled));
        assert!(is_valid_transition(InService, Recycled));
    }

    #[test]
    fn test_recall_from_every_non_terminal_state() {
        for status in PassportStatus::ALL {
            if status.is_terminal() || status == Recalled {
                assert!(!is_valid_transition(status, Recalled), "{}", status);
            } else {
                assert!(is_valid_transition(status, Recalled), "{}", status);
            }
        }
    }

    #[test]
    fn test_terminal_states() {
        assert!(Recycled.is_terminal());
        assert!(EndOfLife.is_terminal());
        for status in PassportStatus::ALL {
            assert!(!is_valid_transition(Recycled, status));
            assert!(!is_valid_transition(EndOfLife, status));
        }
        assert!(!Recalled.is_terminal());
    }

    #[test]
    fn test_no_skipping_or_going_back() {
        assert!(!is_valid_transition(Active, InService));
        assert!(!is_valid_transition(Shipped, Active));
        assert!(!is_valid_transition(InService, Shipped));
        assert!(!is_valid_transition(Active, Active));
        assert!(!is_valid_transition(Active, Recycled));
    }

    #[test]
    fn test_role_matrix() {
        assert!(is_role_permitted(ActorRole::Logistics, Active, Shipped));
        assert!(!is_role_permitted(ActorRole::Logistics, Shipped, InService));

        assert!(is_role_permitted(ActorRole::Technician, Shipped, InService));
        assert!(is_role_permitted(ActorRole::Technician, Returned, InService));
        assert!(!is_role_permitted(ActorRole::Technician, InService, Recycled));

        assert!(is_role_permitted(ActorRole::Customer, InService, ReturnRequested));
        assert!(!is_role_permitted(ActorRole::Customer, Active, ReturnRequested));

        assert!(is_role_permitted(ActorRole::Recycler, InService, Recycled));
        assert!(is_role_permitted(ActorRole::Recycler, ReturnRequested, Recycled));
        assert!(!is_role_permitted(ActorRole::Recycler, Returned, Recycled));

        for from in PassportStatus::ALL {
            for to in from.allowed_transitions() {
                assert!(is_role_permitted(ActorRole::Manufacturer, from, *to));
            }
        }
    }

    #[test]
    fn test_role_edges_are_real_edges() {
        for role in ActorRole::ALL {
            for from in PassportStatus::ALL {
                for to in allowed_transitions_for_role(from, role) {
                    assert!(is_valid_transition(from, to));
                }
            }
        }
    }

    #[test]
    fn test_allowed_transitions_for_role() {
        assert_eq!(allowed_transitions_for_role(Active, ActorRole::Logistics), vec![Shipped]);
        assert!(allowed_transitions_for_role(Active, ActorRole::Customer).is_empty());
        assert_eq!(
            allowed_transitions_for_role(InService, ActorRole::Manufacturer),
            vec![ReturnRequested, Recycled, Recalled]
        );
    }

    #[test]
    fn test_milestones_and_event_types() {
        assert_eq!(Shipped.milestone(), Some(Milestone::ShippedAt));
        assert_eq!(InService.milestone(), Some(Milestone::InstalledAt));
        assert_eq!(Returned.milestone(), Some(Milestone::ReturnedAt));
        assert_eq!(Recycled.milestone(), Some(Milestone::RecycledAt));
        assert_eq!(Recalled.milestone(), None);

        assert_eq!(InService.event_type(), LifecycleEventType::Installed);
        assert_eq!(Shipped.event_type(), LifecycleEventType::Shipped);
    }

    #[test]
    fn test_status_parse_and_display() {
        assert_eq!("in_service".parse::<PassportStatus>().unwrap(), InService);
        assert_eq!("RETURN_REQUESTED".parse::<PassportStatus>().unwrap(), ReturnRequested);
        assert!("BROKEN".parse::<PassportStatus>().is_err());
        for status in PassportStatus::ALL {
            let json = serde_json::to_string(&status).unwrap();
            assert_eq!(json.trim_matches('"'), status.to_string());
        }
    }
}
