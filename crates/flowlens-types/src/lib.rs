//! Shared domain types for the flowlens workspace.

pub mod activity;
pub mod config;
pub mod events;
pub mod metrics;
pub mod person;
pub mod timing;

mod errors;

pub use errors::{FlowlensError, Result};
pub use timing::Architecture;
