//! Held positions and their volume-weighted cost basis.

use rust_decimal::Decimal;

/// Scale kept on recomputed average costs.
pub const COST_PRICE_SCALE: u32 = 8;

/// A long holding in one symbol. Stored only while `quantity > 0`.
#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    pub symbol: String,
    pub quantity: i64,
    pub cost_price: Decimal,
}

impl Position {
    pub fn new(symbol: &str, quantity: i64, cost_price: Decimal) -> Self {
        Position {
            symbol: symbol.to_string(),
            quantity,
            cost_price,
        }
    }

    pub fn market_value(&self, price: Decimal) -> Decimal {
        Decimal::from(self.quantity) * price
    }

    pub fn cost_value(&self) -> Decimal {
        Decimal::from(self.quantity) * self.cost_price
    }

    pub fn unrealized_pnl(&self, price: Decimal) -> Decimal {
        Decimal::from(self.quantity) * (price - self.cost_price)
    }

    /// Merge a buy of `quantity` shares costing `gross` in total.
    ///
    /// new_cost = (old_cost * old_qty + gross) / (old_qty + quantity)
    ///
    /// Returns `None` when the merged quantity or cost does not fit.
    pub fn checked_add(&self, quantity: i64, gross: Decimal) -> Option<Position> {
        let total = self.quantity.checked_add(quantity)?;
        let basis = Decimal::from(self.quantity)
            .checked_mul(self.cost_price)?
            .checked_add(gross)?;
        let cost = basis.checked_div(Decimal::from(total))?;
        Some(Position {
            symbol: self.symbol.clone(),
            quantity: total,
            cost_price: cost.round_dp(COST_PRICE_SCALE),
        })
    }

    /// Remove `quantity` shares. Returns the remaining quantity.
    /// Cost basis is unchanged by sells.
    pub fn reduce(&mut self, quantity: i64) -> i64 {
        self.quantity -= quantity;
        self.quantity
    }
}
