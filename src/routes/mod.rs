//! HTTP route handlers

pub mod health;
pub mod magic_link;

pub use health::{health_check, version_info};
pub use magic_link::handle_api_request;
