//! Market-fill simulation against an account snapshot.
//!
//! Everything here is pure: `apply_order` takes a snapshot and returns the
//! next state, leaving persistence and conflict handling to the broker.

use chrono::Utc;
use rust_decimal::Decimal;

use super::account::Account;
use super::order::{OrderRequest, RejectReason, Side};
use super::position::Position;

/// Default commission rate (3 basis points of traded value).
pub fn default_commission_rate() -> Decimal {
    Decimal::new(3, 4)
}

/// commission = gross * rate
pub fn calculate_commission(gross: Decimal, commission_rate: Decimal) -> Decimal {
    gross * commission_rate
}

/// Outcome of a successful fill: the next account state plus the amounts.
#[derive(Debug, Clone, PartialEq)]
pub struct Fill {
    pub account: Account,
    pub gross: Decimal,
    pub commission: Decimal,
}

/// Gross value and commission of an order, or `ValueOutOfRange` when either
/// does not fit in a `Decimal`.
fn order_amounts(
    order: &OrderRequest,
    commission_rate: Decimal,
) -> Result<(Decimal, Decimal), RejectReason> {
    let gross = Decimal::from(order.quantity)
        .checked_mul(order.price)
        .ok_or(RejectReason::ValueOutOfRange)?;
    let commission = gross
        .checked_mul(commission_rate)
        .ok_or(RejectReason::ValueOutOfRange)?;
    Ok((gross, commission))
}

/// Check an order against the snapshot without changing anything.
pub fn validate_order(
    account: &Account,
    order: &OrderRequest,
    commission_rate: Decimal,
) -> Result<(), RejectReason> {
    if !account.is_active() {
        return Err(RejectReason::AccountStopped);
    }
    if order.quantity <= 0 {
        return Err(RejectReason::InvalidQuantity(order.quantity));
    }
    if order.price <= Decimal::ZERO {
        return Err(RejectReason::InvalidPrice(order.price));
    }

    let (gross, commission) = order_amounts(order, commission_rate)?;
    match order.side {
        Side::Buy => {
            let required = gross
                .checked_add(commission)
                .ok_or(RejectReason::ValueOutOfRange)?;
            if account.cash < required {
                return Err(RejectReason::InsufficientFunds {
                    required,
                    available: account.cash,
                });
            }
        }
        Side::Sell => {
            let held = account.held_quantity(&order.symbol);
            if held < order.quantity {
                return Err(RejectReason::InsufficientPosition {
                    symbol: order.symbol.clone(),
                    held,
                    requested: order.quantity,
                });
            }
        }
    }
    Ok(())
}

/// Validate and apply an order to a copy of `account`.
///
/// Buy: cash -= gross + commission; merge into the position at the
/// volume-weighted average cost.
/// Sell: cash += gross - commission; a position that reaches zero is removed.
pub fn apply_order(
    account: &Account,
    order: &OrderRequest,
    commission_rate: Decimal,
) -> Result<Fill, RejectReason> {
    validate_order(account, order, commission_rate)?;

    let (gross, commission) = order_amounts(order, commission_rate)?;
    let mut next = account.clone();

    match order.side {
        Side::Buy => {
            next.cash -= gross + commission;
            let position = match account.get_position(&order.symbol) {
                Some(pos) => pos
                    .checked_add(order.quantity, gross)
                    .ok_or(RejectReason::ValueOutOfRange)?,
                None => Position::new(&order.symbol, order.quantity, order.price),
            };
            next.positions.insert(order.symbol.clone(), position);
        }
        Side::Sell => {
            next.cash = next
                .cash
                .checked_add(gross - commission)
                .ok_or(RejectReason::ValueOutOfRange)?;
            let remaining = next
                .positions
                .get_mut(&order.symbol)
                .map_or(0, |pos| pos.reduce(order.quantity));
            if remaining == 0 {
                next.positions.remove(&order.symbol);
            }
        }
    }

    next.updated_at = Utc::now();

    Ok(Fill {
        account: next,
        gross,
        commission,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::account::tests::sample_account;
    use crate::domain::account::{AccountKey, AccountStatus};
    use rust_decimal_macros::dec;

    fn order(side: Side, quantity: i64, price: Decimal) -> OrderRequest {
        OrderRequest {
            key: AccountKey::new("alice", "DualMovingAverage"),
            symbol: "600519".into(),
            side,
            quantity,
            price,
        }
    }

    #[test]
    fn commission_is_rate_of_gross() {
        assert_eq!(calculate_commission(dec!(1000), dec!(0.0003)), dec!(0.3));
        assert_eq!(default_commission_rate(), dec!(0.0003));
    }

    #[test]
    fn buy_debits_gross_plus_commission() {
        let account = sample_account(dec!(100000));
        let fill = apply_order(&account, &order(Side::Buy, 100, dec!(10)), dec!(0.0003)).unwrap();

        assert_eq!(fill.gross, dec!(1000));
        assert_eq!(fill.commission, dec!(0.3));
        assert_eq!(fill.account.cash, dec!(98999.7));
        let pos = fill.account.get_position("600519").unwrap();
        assert_eq!(pos.quantity, 100);
        assert_eq!(pos.cost_price, dec!(10));
    }

    #[test]
    fn second_buy_uses_weighted_average_cost() {
        let account = sample_account(dec!(100000));
        let first = apply_order(&account, &order(Side::Buy, 100, dec!(10)), Decimal::ZERO).unwrap();
        let second =
            apply_order(&first.account, &order(Side::Buy, 50, dec!(13)), Decimal::ZERO).unwrap();

        let pos = second.account.get_position("600519").unwrap();
        assert_eq!(pos.quantity, 150);
        assert_eq!(pos.cost_price, dec!(11));
        assert_eq!(second.account.cash, dec!(98350));
    }

    #[test]
    fn buy_exactly_affordable_is_filled() {
        let account = sample_account(dec!(1000.3));
        let fill = apply_order(&account, &order(Side::Buy, 100, dec!(10)), dec!(0.0003)).unwrap();
        assert_eq!(fill.account.cash, Decimal::ZERO);
    }

    #[test]
    fn buy_rejected_when_commission_tips_over_cash() {
        let account = sample_account(dec!(1000));
        let result = apply_order(&account, &order(Side::Buy, 100, dec!(10)), dec!(0.0003));
        assert_eq!(
            result,
            Err(RejectReason::InsufficientFunds {
                required: dec!(1000.3),
                available: dec!(1000),
            })
        );
    }

    #[test]
    fn sell_without_position_rejected() {
        let account = sample_account(dec!(1000));
        let result = apply_order(&account, &order(Side::Sell, 10, dec!(10)), Decimal::ZERO);
        assert!(matches!(
            result,
            Err(RejectReason::InsufficientPosition { held: 0, requested: 10, .. })
        ));
    }

    #[test]
    fn partial_sell_credits_cash_and_keeps_cost() {
        let mut account = sample_account(dec!(0));
        account
            .positions
            .insert("600519".into(), Position::new("600519", 100, dec!(8)));

        let fill = apply_order(&account, &order(Side::Sell, 40, dec!(10)), dec!(0.001)).unwrap();

        assert_eq!(fill.account.cash, dec!(399.6));
        let pos = fill.account.get_position("600519").unwrap();
        assert_eq!(pos.quantity, 60);
        assert_eq!(pos.cost_price, dec!(8));
    }

    #[test]
    fn selling_entire_position_removes_it() {
        let mut account = sample_account(dec!(0));
        account
            .positions
            .insert("600519".into(), Position::new("600519", 100, dec!(8)));

        let fill = apply_order(&account, &order(Side::Sell, 100, dec!(10)), Decimal::ZERO).unwrap();

        assert!(fill.account.get_position("600519").is_none());
        assert_eq!(fill.account.position_count(), 0);
        assert_eq!(fill.account.cash, dec!(1000));
    }

    #[test]
    fn oversell_rejected() {
        let mut account = sample_account(dec!(0));
        account
            .positions
            .insert("600519".into(), Position::new("600519", 10, dec!(8)));
        let result = apply_order(&account, &order(Side::Sell, 11, dec!(10)), Decimal::ZERO);
        assert!(matches!(
            result,
            Err(RejectReason::InsufficientPosition { held: 10, requested: 11, .. })
        ));
    }

    #[test]
    fn stopped_account_rejects_everything() {
        let mut account = sample_account(dec!(100000));
        account.status = AccountStatus::Stopped;
        let result = apply_order(&account, &order(Side::Buy, 1, dec!(1)), Decimal::ZERO);
        assert_eq!(result, Err(RejectReason::AccountStopped));
    }

    #[test]
    fn non_positive_quantity_and_price_rejected() {
        let account = sample_account(dec!(100000));
        assert_eq!(
            apply_order(&account, &order(Side::Buy, 0, dec!(1)), Decimal::ZERO),
            Err(RejectReason::InvalidQuantity(0))
        );
        assert_eq!(
            apply_order(&account, &order(Side::Buy, 1, dec!(0)), Decimal::ZERO),
            Err(RejectReason::InvalidPrice(dec!(0)))
        );
    }

    #[test]
    fn order_value_beyond_decimal_range_rejected() {
        let account = sample_account(dec!(100000));
        let result = apply_order(
            &account,
            &order(Side::Buy, i64::MAX, dec!(100000000000)),
            dec!(0.0003),
        );
        assert_eq!(result, Err(RejectReason::ValueOutOfRange));
    }

    #[test]
    fn buy_that_would_overflow_held_quantity_rejected() {
        let account = sample_account(dec!(100000000000000000));
        let half = i64::MAX / 2 + 1;
        let first =
            apply_order(&account, &order(Side::Buy, half, dec!(0.0001)), Decimal::ZERO).unwrap();
        assert_eq!(first.account.held_quantity("600519"), half);

        let second = apply_order(
            &first.account,
            &order(Side::Buy, half, dec!(0.0001)),
            Decimal::ZERO,
        );
        assert_eq!(second, Err(RejectReason::ValueOutOfRange));
    }

    #[test]
    fn apply_does_not_touch_version() {
        let mut account = sample_account(dec!(100000));
        account.version = 5;
        let fill = apply_order(&account, &order(Side::Buy, 1, dec!(1)), Decimal::ZERO).unwrap();
        assert_eq!(fill.account.version, 5);
        assert_eq!(account.cash, dec!(100000));
    }
}
