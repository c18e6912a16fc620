//! Core domain types and logic.

pub mod account;
pub mod broker;
pub mod error;
pub mod execution;
pub mod ohlcv;
pub mod order;
pub mod position;
pub mod run;
pub mod schedule;
pub mod strategies;
pub mod strategy;
