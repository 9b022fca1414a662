//! passport-gate - battery passport lifecycle gateway
//!
//! Lets unregistered actors (couriers, technicians, recyclers, customers)
//! drive exactly one permitted lifecycle transition on one battery passport
//! through a scoped, one-hour magic link.
//!
//! ## Components
//!
//! - **Trust**: Tier A trusted email domains, Tier B partner codes
//! - **Auth**: HS256 capability tokens scoped to one passport
//! - **Lifecycle**: status state machine, role matrix, transition engine
//! - **Audit**: append-only lifecycle ledger with a retry queue
//! - **Services**: the magic link facade the HTTP routes call
//! - **DB**: in-memory and MongoDB persistence

pub mod audit;
pub mod auth;
pub mod config;
pub mod db;
pub mod lifecycle;
pub mod logging;
pub mod routes;
pub mod server;
pub mod services;
pub mod trust;
pub mod types;

pub use config::Args;
pub use server::{run, AppState};
pub use types::{GateError, Result};
