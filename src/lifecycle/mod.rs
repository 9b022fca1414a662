//! Passport lifecycle: state machine, role matrix and transition engine

pub mod engine;
pub mod passport;
pub mod status;

pub use engine::{
    BulkFailure, BulkTransitionReport, LifecycleEngine, TransitionResult, SYSTEM_ACTOR,
};
pub use passport::{Passport, StatusUpdate};
pub use status::{
    allowed_transitions_for_role, get_allowed_transitions, is_role_permitted,
    is_valid_transition, LifecycleEventType, Milestone, PassportStatus,
};
