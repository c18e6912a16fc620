//! Dual moving average crossover.
//!
//! Buys `stake` shares when the fast SMA crosses above the slow SMA while
//! flat, and sells the stake when it crosses back below while long.

use rust_decimal::Decimal;

use crate::domain::error::PaperError;
use crate::domain::ohlcv::Bar;
use crate::domain::order::{OrderIntent, Side};
use crate::domain::strategy::{
    ParamSpec, SignalGenerator, StrategyDescriptor, StrategyParams, param_count,
};

pub const ID: &str = "DualMovingAverage";

const PARAMS: &[ParamSpec] = &[
    ParamSpec {
        name: "fast_period",
        default: 10.0,
        description: "Fast SMA period",
    },
    ParamSpec {
        name: "slow_period",
        default: 30.0,
        description: "Slow SMA period",
    },
    ParamSpec {
        name: "stake",
        default: 100.0,
        description: "Shares per trade",
    },
];

pub fn descriptor() -> StrategyDescriptor {
    StrategyDescriptor {
        id: ID,
        name: "Dual Moving Average",
        description: "Trend following strategy using two moving averages",
        params: PARAMS,
        build,
    }
}

fn build(params: &StrategyParams) -> Result<Box<dyn SignalGenerator>, PaperError> {
    Ok(Box::new(DualMovingAverage::from_params(params)?))
}

/// Simple moving average of closes ending at `index`, if enough history.
pub fn sma_at(bars: &[Bar], index: usize, period: usize) -> Option<Decimal> {
    if period == 0 || index + 1 < period || index >= bars.len() {
        return None;
    }
    let sum: Decimal = bars[index + 1 - period..=index].iter().map(|b| b.close).sum();
    Some(sum / Decimal::from(period))
}

#[derive(Debug, Clone, PartialEq)]
pub struct DualMovingAverage {
    fast_period: usize,
    slow_period: usize,
    stake: i64,
    in_market: bool,
}

impl DualMovingAverage {
    pub fn from_params(params: &StrategyParams) -> Result<Self, PaperError> {
        let fast_period = param_count(params, "fast_period", 1)?;
        let slow_period = param_count(params, "slow_period", 2)?;
        let stake = param_count(params, "stake", 1)?;
        if fast_period >= slow_period {
            return Err(PaperError::InvalidRequest {
                reason: format!(
                    "fast_period ({fast_period}) must be shorter than slow_period ({slow_period})"
                ),
            });
        }
        Ok(DualMovingAverage {
            fast_period,
            slow_period,
            stake: stake as i64,
            in_market: false,
        })
    }

    /// +1 on a golden cross at `index`, -1 on a death cross, 0 otherwise.
    fn crossover(&self, bars: &[Bar], index: usize) -> i8 {
        if index == 0 {
            return 0;
        }
        let now = (
            sma_at(bars, index, self.fast_period),
            sma_at(bars, index, self.slow_period),
        );
        let prev = (
            sma_at(bars, index - 1, self.fast_period),
            sma_at(bars, index - 1, self.slow_period),
        );
        match (now, prev) {
            ((Some(fast), Some(slow)), (Some(prev_fast), Some(prev_slow))) => {
                if fast > slow && prev_fast <= prev_slow {
                    1
                } else if fast < slow && prev_fast >= prev_slow {
                    -1
                } else {
                    0
                }
            }
            _ => 0,
        }
    }
}

impl SignalGenerator for DualMovingAverage {
    fn on_bar(&mut self, bars: &[Bar], index: usize) -> Option<OrderIntent> {
        match (self.crossover(bars, index), self.in_market) {
            (1, false) => {
                self.in_market = true;
                Some(OrderIntent::market(Side::Buy, self.stake))
            }
            (-1, true) => {
                self.in_market = false;
                Some(OrderIntent::market(Side::Sell, self.stake))
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::strategy::{StrategyRegistry, replay_final_intent};
    use crate::ports::strategy_port::StrategyEvaluationPort;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn bars(closes: &[Decimal]) -> Vec<Bar> {
        let start = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        closes
            .iter()
            .enumerate()
            .map(|(i, &close)| Bar {
                date: start + chrono::Duration::days(i as i64),
                open: close,
                high: close,
                low: close,
                close,
                volume: 100,
            })
            .collect()
    }

    fn fast_params() -> StrategyParams {
        let mut params = StrategyParams::new();
        params.insert("fast_period".into(), 2.0);
        params.insert("slow_period".into(), 3.0);
        params.insert("stake".into(), 200.0);
        params
    }

    // SMA2 crosses above SMA3 on the last bar: 9 <= 9.33 then 10.5 > 10.33
    fn golden_cross_closes() -> Vec<Decimal> {
        vec![dec!(10), dec!(10), dec!(10), dec!(10), dec!(8), dec!(13)]
    }

    #[test]
    fn sma_needs_full_period() {
        let window = bars(&[dec!(1), dec!(2), dec!(3)]);
        assert_eq!(sma_at(&window, 1, 3), None);
        assert_eq!(sma_at(&window, 2, 3), Some(dec!(2)));
        assert_eq!(sma_at(&window, 2, 2), Some(dec!(2.5)));
        assert_eq!(sma_at(&window, 5, 2), None);
    }

    #[test]
    fn golden_cross_on_final_bar_buys_stake() {
        let window = bars(&golden_cross_closes());
        let mut strategy = DualMovingAverage::from_params(&fast_params()).unwrap();
        assert_eq!(
            replay_final_intent(&mut strategy, &window),
            Some(OrderIntent::market(Side::Buy, 200))
        );
    }

    #[test]
    fn cross_one_bar_ago_is_not_actionable() {
        let mut closes = golden_cross_closes();
        closes.push(dec!(13));
        let window = bars(&closes);
        let mut strategy = DualMovingAverage::from_params(&fast_params()).unwrap();
        assert_eq!(replay_final_intent(&mut strategy, &window), None);
    }

    #[test]
    fn death_cross_after_entry_sells_stake() {
        let mut closes = golden_cross_closes();
        closes.push(dec!(13));
        // SMA2 9 < SMA3 10.33 after 13 > 11.33
        closes.push(dec!(5));
        let window = bars(&closes);
        let mut strategy = DualMovingAverage::from_params(&fast_params()).unwrap();
        assert_eq!(
            replay_final_intent(&mut strategy, &window),
            Some(OrderIntent::market(Side::Sell, 200))
        );
    }

    #[test]
    fn death_cross_while_flat_is_ignored() {
        // 10 >= 10 then 7.5 < 8.33 with no prior entry
        let window = bars(&[dec!(10), dec!(10), dec!(10), dec!(5)]);
        let mut strategy = DualMovingAverage::from_params(&fast_params()).unwrap();
        assert_eq!(replay_final_intent(&mut strategy, &window), None);
    }

    #[test]
    fn rejects_inverted_periods() {
        let mut params = fast_params();
        params.insert("fast_period".into(), 5.0);
        assert!(matches!(
            DualMovingAverage::from_params(&params),
            Err(PaperError::InvalidRequest { .. })
        ));
    }

    #[test]
    fn evaluates_through_registry_with_defaults_filled_in() {
        let registry = StrategyRegistry::builtin();
        let mut params = StrategyParams::new();
        params.insert("fast_period".into(), 2.0);
        params.insert("slow_period".into(), 3.0);
        let intent = registry
            .evaluate("600519", &bars(&golden_cross_closes()), ID, &params)
            .unwrap();
        assert_eq!(intent, Some(OrderIntent::market(Side::Buy, 100)));
    }
}
