//! Lifecycle audit trail

pub mod event;
pub mod log;

pub use event::LifecycleEvent;
pub use log::{spawn_audit_retry_task, AuditLog, AuditWriteMode};
