//! Master controller: the top-level cycle scheduler.
//!
//! One cycle runs monitor -> scanner -> validator -> executor, in that
//! order, under a per-user mutual-exclusion token. Cadence adapts to the
//! market session.

pub mod controller;
pub mod notify;
pub mod status;

pub use controller::{CycleReport, MasterController};
pub use notify::LogNotificationSink;
pub use status::EngineStatus;
