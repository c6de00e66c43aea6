//! Storage capability implementations.
//!
//! `MemoryStore` backs tests and paper runs; `PgStore` is the deployment
//! backend. Both implement [`autopilot_core::traits::Store`], which the
//! engine treats as a transactional read-modify-write per entity.

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;
