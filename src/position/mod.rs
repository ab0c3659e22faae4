//! StrategyPosition and the weighted-average entry/PnL ledger (§4.7).
//!
//! Grounded in `original_source/position_service.py::update_position`; the
//! formulas here are a direct, side-aware port of that function's branches,
//! expressed as pure functions over `Decimal` rather than mutated dict state.

pub mod capital;
pub mod pnl_sweep;
pub mod repository;

pub use capital::{PgStrategyCapitalRepository, StrategyCapital, StrategyCapitalRepository};
pub use pnl_sweep::UnrealizedPnlSweep;
pub use repository::{PgPositionRepository, PositionRepository};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::core_types::{Side, StrategyAccountId};

/// (strategy_account_id, symbol) unique; signed quantity encodes side.
#[derive(Debug, Clone)]
pub struct StrategyPosition {
    pub strategy_account_id: StrategyAccountId,
    pub symbol: String,
    /// Positive = long, negative = short, zero = flat.
    pub quantity: Decimal,
    pub entry_price: Decimal,
    pub current_pnl: Decimal,
    pub updated_at: DateTime<Utc>,
}

impl StrategyPosition {
    pub fn flat(strategy_account_id: StrategyAccountId, symbol: String) -> Self {
        StrategyPosition {
            strategy_account_id,
            symbol,
            quantity: Decimal::ZERO,
            entry_price: Decimal::ZERO,
            current_pnl: Decimal::ZERO,
            updated_at: Utc::now(),
        }
    }

    fn is_long(&self) -> bool {
        self.quantity > Decimal::ZERO
    }

    fn is_short(&self) -> bool {
        self.quantity < Decimal::ZERO
    }

    fn is_flat(&self) -> bool {
        self.quantity.is_zero()
    }
}

/// Outcome of applying one fill to a position: the new position plus any
/// pnl realized by this fill (zero unless the fill reduced or flipped an
/// existing position), and whether the fill was an entry or an exit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionUpdate {
    pub position: StrategyPositionSnapshot,
    pub realized_pnl: Decimal,
    pub is_entry: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrategyPositionSnapshot {
    pub quantity: Decimal,
    pub entry_price: Decimal,
}

/// Applies one fill of `(side, qty, price)` to `position`, per §4.7.
///
/// `is_entry` is true iff the fill's side agrees in sign with the pre-trade
/// position, or the pre-trade position was flat.
pub fn apply_fill(
    position: &StrategyPosition,
    side: Side,
    qty: Decimal,
    price: Decimal,
) -> PositionUpdate {
    let is_entry = position.is_flat()
        || (side == Side::Buy && position.is_long())
        || (side == Side::Sell && position.is_short());

    let (new_qty, new_entry, realized_pnl) = match side {
        Side::Buy => {
            if position.is_flat() || position.is_long() {
                // Entry/add to long: weighted-average.
                let old_qty = position.quantity;
                let new_qty = old_qty + qty;
                let new_entry = if new_qty.is_zero() {
                    Decimal::ZERO
                } else {
                    (old_qty * position.entry_price + qty * price) / new_qty
                };
                (new_qty, new_entry, Decimal::ZERO)
            } else {
                // Reducing a short.
                let short_qty = -position.quantity;
                if qty >= short_qty {
                    let realized = short_qty * (position.entry_price - price);
                    let leftover = qty - short_qty;
                    if leftover.is_zero() {
                        (Decimal::ZERO, Decimal::ZERO, realized)
                    } else {
                        // Flip to long with the remainder.
                        (leftover, price, realized)
                    }
                } else {
                    let realized = qty * (position.entry_price - price);
                    (position.quantity + qty, position.entry_price, realized)
                }
            }
        }
        Side::Sell => {
            if position.is_flat() || position.is_short() {
                let old_qty = position.quantity;
                let new_qty = old_qty - qty;
                let old_abs = old_qty.abs();
                let new_abs = new_qty.abs();
                let new_entry = if new_abs.is_zero() {
                    Decimal::ZERO
                } else {
                    (old_abs * position.entry_price + qty * price) / new_abs
                };
                (new_qty, new_entry, Decimal::ZERO)
            } else {
                // Reducing a long.
                let long_qty = position.quantity;
                if qty >= long_qty {
                    let realized = long_qty * (price - position.entry_price);
                    let leftover = qty - long_qty;
                    if leftover.is_zero() {
                        (Decimal::ZERO, Decimal::ZERO, realized)
                    } else {
                        // Flip to short with the remainder.
                        (-leftover, price, realized)
                    }
                } else {
                    let realized = qty * (price - position.entry_price);
                    (position.quantity - qty, position.entry_price, realized)
                }
            }
        }
    };

    PositionUpdate {
        position: StrategyPositionSnapshot {
            quantity: new_qty,
            entry_price: new_entry,
        },
        realized_pnl,
        is_entry,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn flat() -> StrategyPosition {
        StrategyPosition::flat(1, "BTC/USDT".into())
    }

    #[test]
    fn buy_from_flat_is_entry() {
        let pos = flat();
        let r = apply_fill(&pos, Side::Buy, d("1"), d("50000"));
        assert!(r.is_entry);
        assert_eq!(r.position.quantity, d("1"));
        assert_eq!(r.position.entry_price, d("50000"));
        assert_eq!(r.realized_pnl, Decimal::ZERO);
    }

    #[test]
    fn buy_add_to_long_averages_entry() {
        let mut pos = flat();
        pos.quantity = d("1");
        pos.entry_price = d("50000");
        let r = apply_fill(&pos, Side::Buy, d("1"), d("52000"));
        assert_eq!(r.position.quantity, d("2"));
        assert_eq!(r.position.entry_price, d("51000"));
        assert!(r.is_entry);
    }

    #[test]
    fn sell_reduces_long_no_flip() {
        let mut pos = flat();
        pos.quantity = d("2");
        pos.entry_price = d("50000");
        let r = apply_fill(&pos, Side::Sell, d("1"), d("52000"));
        assert_eq!(r.position.quantity, d("1"));
        assert_eq!(r.position.entry_price, d("50000"));
        assert_eq!(r.realized_pnl, d("2000"));
        assert!(!r.is_entry);
    }

    #[test]
    fn sell_full_fill_flips_to_short() {
        let mut pos = flat();
        pos.quantity = d("1");
        pos.entry_price = d("50000");
        let r = apply_fill(&pos, Side::Sell, d("3"), d("48000"));
        assert_eq!(r.position.quantity, d("-2"));
        assert_eq!(r.position.entry_price, d("48000"));
        assert_eq!(r.realized_pnl, d("2000"));
    }

    #[test]
    fn buy_reduces_short_and_flips_realizing_pnl() {
        let mut pos = flat();
        pos.quantity = d("-2");
        pos.entry_price = d("50000");
        let r = apply_fill(&pos, Side::Buy, d("3"), d("49000"));
        // short of 2 closed at 49000, realized = 2 * (50000 - 49000) = 2000
        assert_eq!(r.realized_pnl, d("2000"));
        assert_eq!(r.position.quantity, d("1"));
        assert_eq!(r.position.entry_price, d("49000"));
    }
}
