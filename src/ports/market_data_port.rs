//! Market data port trait.

use crate::domain::error::PaperError;
use crate::domain::ohlcv::Bar;

pub trait MarketDataPort: Send + Sync {
    /// The most recent `count` bars for `symbol`, ascending by date.
    /// An empty vector means no data is available.
    fn last_bars(&self, symbol: &str, count: usize) -> Result<Vec<Bar>, PaperError>;
}
