//! Precision quantization module.
//!
//! Unified conversion between a raw client-submitted price/quantity and the
//! exchange-legal value: quantized down to the symbol's `tick_size`/`step_size`
//! and checked against `min_qty`/`min_notional`. All conversions MUST go
//! through this module — the order path never rounds ad hoc.
//!
//! Mirrors the teacher's money module in spirit (single source of truth,
//! explicit error handling, no silent truncation) but the target
//! representation here is `rust_decimal::Decimal`, the type `sqlx` persists
//! OpenOrder/PendingOrder price and quantity columns as, rather than a scaled
//! u64 — the spec's Account/Symbol model carries no fixed decimals table to
//! scale against; precision instead comes from the per-symbol `MarketInfo`
//! read out of the PrecisionCache.

use rust_decimal::Decimal;
use rust_decimal::prelude::*;
use thiserror::Error;

use crate::market::MarketInfo;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum QuantizeError {
    #[error("quantity {0} is below min_qty {1}")]
    BelowMinQty(Decimal, Decimal),
    #[error("notional {0} is below min_notional {1}")]
    BelowMinNotional(Decimal, Decimal),
    #[error("value rounds down to zero at this step size")]
    RoundsToZero,
}

/// Rounds `value` down to the nearest multiple of `step` (tick_size or
/// step_size). `step` of zero means "no constraint, pass through unchanged" —
/// some rule-based exchanges report a zero step for assets with no minimum
/// increment.
pub fn quantize_down(value: Decimal, step: Decimal) -> Decimal {
    if step.is_zero() {
        return value;
    }
    (value / step).floor() * step
}

/// Quantizes a quantity against a symbol's `step_size` and `min_qty`.
pub fn quantize_qty(qty: Decimal, market: &MarketInfo) -> Result<Decimal, QuantizeError> {
    let q = quantize_down(qty, market.step_size);
    if q.is_zero() {
        return Err(QuantizeError::RoundsToZero);
    }
    if q < market.min_qty {
        return Err(QuantizeError::BelowMinQty(q, market.min_qty));
    }
    Ok(q)
}

/// Quantizes a price against a symbol's `tick_size`. `None` price (MARKET
/// orders) passes through untouched.
pub fn quantize_price(price: Decimal, market: &MarketInfo) -> Result<Decimal, QuantizeError> {
    let p = quantize_down(price, market.tick_size);
    if p.is_zero() {
        return Err(QuantizeError::RoundsToZero);
    }
    Ok(p)
}

/// Checks `qty * price >= min_notional` after quantization. Skipped for
/// MARKET orders where `price` is not yet known.
pub fn check_min_notional(
    qty: Decimal,
    price: Decimal,
    market: &MarketInfo,
) -> Result<(), QuantizeError> {
    let notional = qty * price;
    if notional < market.min_notional {
        return Err(QuantizeError::BelowMinNotional(notional, market.min_notional));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn market() -> MarketInfo {
        MarketInfo {
            tick_size: d("0.5"),
            step_size: d("0.001"),
            min_qty: d("0.001"),
            min_notional: d("10"),
            price_precision: 1,
            qty_precision: 3,
        }
    }

    #[test]
    fn quantizes_price_down_to_tick() {
        assert_eq!(quantize_down(d("50000.37"), d("0.5")), d("50000.0"));
        assert_eq!(quantize_down(d("50000.5"), d("0.5")), d("50000.5"));
    }

    #[test]
    fn zero_step_is_passthrough() {
        assert_eq!(quantize_down(d("1.23456"), Decimal::ZERO), d("1.23456"));
    }

    #[test]
    fn rejects_below_min_qty() {
        let m = market();
        let err = quantize_qty(d("0.0005"), &m).unwrap_err();
        assert!(matches!(err, QuantizeError::BelowMinQty(_, _)));
    }

    #[test]
    fn rejects_below_min_notional() {
        let m = market();
        let qty = quantize_qty(d("0.001"), &m).unwrap();
        let err = check_min_notional(qty, d("100"), &m).unwrap_err();
        assert!(matches!(err, QuantizeError::BelowMinNotional(_, _)));
    }

    #[test]
    fn accepts_valid_order() {
        let m = market();
        let qty = quantize_qty(d("0.0015"), &m).unwrap();
        assert_eq!(qty, d("0.001"));
        let price = quantize_price(d("50000.37"), &m).unwrap();
        assert_eq!(price, d("50000.0"));
        assert!(check_min_notional(qty, price, &m).is_err());
    }
}
