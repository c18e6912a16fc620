//! Port traits: the seams between the paper-trading core and the outside.

pub mod config_port;
pub mod ledger_port;
pub mod market_data_port;
pub mod strategy_port;
