//! Shared types for passport-gate

pub mod error;

pub use error::{GateError, Result, AUTH_FAILURE_MESSAGE};
