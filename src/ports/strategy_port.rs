//! Strategy evaluation port trait.

use crate::domain::error::PaperError;
use crate::domain::ohlcv::Bar;
use crate::domain::order::OrderIntent;
use crate::domain::strategy::StrategyParams;

pub trait StrategyEvaluationPort: Send + Sync {
    /// Replay `bars` (oldest first) and return the intent produced on the
    /// final bar, if any. Signals on earlier bars are never returned.
    fn evaluate(
        &self,
        symbol: &str,
        bars: &[Bar],
        strategy_id: &str,
        params: &StrategyParams,
    ) -> Result<Option<OrderIntent>, PaperError>;
}
