//! Activity logging

pub mod activity;

pub use activity::{ActivityEvent, ActivityLogger, ActivityType};
