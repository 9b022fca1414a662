//! Persistence for passport-gate
//!
//! The core only sees the traits in [`repository`]. Two backends:
//! [`memory::MemoryStore`] for dev mode and tests, [`mongo_store::MongoStore`]
//! for production.

pub mod memory;
pub mod mongo;
pub mod mongo_store;
pub mod repository;
pub mod schemas;

pub use memory::MemoryStore;
pub use mongo::MongoClient;
pub use mongo_store::MongoStore;
pub use repository::{EventStore, PassportStore, Stores, TokenStore, TrustStore};
