//! OHLCV bar representation.

use chrono::NaiveDate;
use rust_decimal::Decimal;

/// One period of market data. Sequences of bars are always ordered oldest first.
#[derive(Debug, Clone, PartialEq)]
pub struct Bar {
    pub date: NaiveDate,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: i64,
}

/// True if `bars` is strictly ascending by date.
pub fn is_chronological(bars: &[Bar]) -> bool {
    bars.windows(2).all(|w| w[0].date < w[1].date)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn bar(day: u32, close: Decimal) -> Bar {
        Bar {
            date: NaiveDate::from_ymd_opt(2024, 1, day).unwrap(),
            open: close,
            high: close + dec!(1),
            low: close - dec!(2),
            close,
            volume: 1_000,
        }
    }

    #[test]
    fn chronological_detection() {
        assert!(is_chronological(&[]));
        assert!(is_chronological(&[bar(1, dec!(1)), bar(2, dec!(2))]));
        assert!(!is_chronological(&[bar(2, dec!(1)), bar(1, dec!(2))]));
        assert!(!is_chronological(&[bar(1, dec!(1)), bar(1, dec!(2))]));
    }
}
