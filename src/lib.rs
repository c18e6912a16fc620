//! papertrader: paper-trading execution engine.
//!
//! Hexagonal architecture: domain logic in [`domain`], port traits in [`ports`],
//! concrete implementations in [`adapters`]. The async daily runner lives in
//! [`scheduler`].

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod ports;
pub mod scheduler;
pub mod telemetry;
