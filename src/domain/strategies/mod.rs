//! Built-in strategies. New strategies are added to [`all`] by hand.

pub mod ma_cross;

use super::strategy::StrategyDescriptor;

pub fn all() -> Vec<StrategyDescriptor> {
    vec![ma_cross::descriptor()]
}
