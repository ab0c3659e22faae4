//! Webhook payload normalization (§4.1).
//!
//! Grounded in `original_source/web_server/app/services/utils.py`'s
//! `normalize_webhook_data` field-mapping rules: side aliasing, order-type
//! validation, symbol-format correction and the `qty`/`qty_per` precedence
//! call. The Python original works over a loosely-typed dict; here the
//! webhook body is parsed straight into `WebhookSignal` (serde) and this
//! module only normalizes the handful of fields serde can't validate on its
//! own (side aliases, symbol shape).

use std::str::FromStr;

use rust_decimal::Decimal;

use crate::core_types::{OrderType, Side};
use crate::error::EngineError;
use crate::gateway::types::{RawOrderItem, WebhookSignal};

/// One order ready for dispatch: every field resolved, no further lookups
/// required except `StrategyAccount`-specific capital sizing for `qty_per`.
#[derive(Debug, Clone)]
pub struct NormalizedOrder {
    pub symbol: String,
    pub side: Side,
    pub order_type: OrderType,
    pub price: Option<Decimal>,
    pub stop_price: Option<Decimal>,
    /// Resolved quantity spec: exactly one of absolute or fractional.
    pub quantity: QuantitySpec,
}

#[derive(Debug, Clone, Copy)]
pub enum QuantitySpec {
    Absolute(Decimal),
    /// Fraction of the StrategyAccount's allocated capital.
    Fraction(Decimal),
}

/// `buy|long -> BUY`, `sell|short -> SELL`. Case-insensitive.
pub fn normalize_side(raw: &str) -> Result<Side, EngineError> {
    match raw.to_lowercase().as_str() {
        "buy" | "long" => Ok(Side::Buy),
        "sell" | "short" => Ok(Side::Sell),
        other => Err(EngineError::Validation(format!("unknown side: {other}"))),
    }
}

/// `order_type` must be an exact match against the canonical set; no
/// aliases are accepted (§4.1 — "aliases are rejected").
pub fn normalize_order_type(raw: &str) -> Result<OrderType, EngineError> {
    OrderType::from_str(&raw.to_uppercase())
        .map_err(|_| EngineError::Validation(format!("unknown order_type: {raw}")))
}

/// Validates a crypto symbol is in `BASE/QUOTE` form, and where it isn't,
/// suggests the corrected form for a handful of common exchange-native
/// spellings (`BTCUSDT`, `KRW-BTC`) to help the caller fix their payload.
/// Securities-market regex rules are out of scope for this crypto-only
/// build; anything not already a crypto pair is rejected.
pub fn validate_symbol(raw: &str) -> Result<String, EngineError> {
    if let Some((base, quote)) = raw.split_once('/') {
        if !base.is_empty() && !quote.is_empty() {
            return Ok(format!("{}/{}", base.to_uppercase(), quote.to_uppercase()));
        }
    }

    if let Some(suggestion) = suggest_correction(raw) {
        return Err(EngineError::Validation(format!(
            "invalid symbol format: {raw} (did you mean {suggestion}?)"
        )));
    }

    Err(EngineError::Validation(format!(
        "invalid symbol format: {raw}, expected BASE/QUOTE"
    )))
}

/// Best-effort `BASE/QUOTE` suggestion for common exchange-native spellings.
/// `KRW-BTC` (Upbit quote-first, dash-separated) and `BTCUSDT` (Binance,
/// no separator, quote is one of a handful of well-known stablecoins/majors).
fn suggest_correction(raw: &str) -> Option<String> {
    const QUOTE_FIRST_PREFIXES: &[&str] = &["KRW-", "USDT-", "BTC-"];
    for prefix in QUOTE_FIRST_PREFIXES {
        if let Some(base) = raw.strip_prefix(prefix) {
            let quote = &prefix[..prefix.len() - 1];
            return Some(format!("{}/{}", base.to_uppercase(), quote.to_uppercase()));
        }
    }

    const KNOWN_QUOTES: &[&str] = &["USDT", "USDC", "BUSD", "KRW", "BTC", "ETH"];
    let upper = raw.to_uppercase();
    for quote in KNOWN_QUOTES {
        if upper.len() > quote.len() && upper.ends_with(quote) {
            let base = &upper[..upper.len() - quote.len()];
            if !base.is_empty() {
                return Some(format!("{base}/{quote}"));
            }
        }
    }
    None
}

/// Resolves the `qty`/`qty_per` precedence rule: when both are present,
/// `qty` wins and the fraction is ignored, logged at `debug` as a benign
/// client mistake rather than rejected (§4.1, Open Question resolved).
fn resolve_quantity(
    qty: Option<Decimal>,
    qty_per: Option<Decimal>,
) -> Result<QuantitySpec, EngineError> {
    match (qty, qty_per) {
        (Some(q), Some(_)) => {
            tracing::debug!(qty = %q, "both qty and qty_per set; qty takes precedence");
            Ok(QuantitySpec::Absolute(q))
        }
        (Some(q), None) => Ok(QuantitySpec::Absolute(q)),
        (None, Some(p)) => Ok(QuantitySpec::Fraction(p)),
        (None, None) => Err(EngineError::Validation(
            "order needs either qty or qty_per".into(),
        )),
    }
}

/// Normalizes one order item. `fallback_symbol` is the top-level symbol,
/// usable only for `symbol` itself — `side`/`price`/`stop_price`/`qty_per`
/// are never inherited from the top level into a batch item (§4.1).
pub fn normalize_order(
    item: &RawOrderItem,
    fallback_symbol: Option<&str>,
) -> Result<NormalizedOrder, EngineError> {
    let symbol_raw = item
        .symbol
        .as_deref()
        .or(fallback_symbol)
        .ok_or_else(|| EngineError::Validation("missing symbol".into()))?;
    let symbol = validate_symbol(symbol_raw)?;

    let side_raw = item
        .side
        .as_deref()
        .ok_or_else(|| EngineError::Validation("missing side".into()))?;
    let side = normalize_side(side_raw)?;

    let order_type_raw = item
        .order_type
        .as_deref()
        .ok_or_else(|| EngineError::Validation("missing order_type".into()))?;
    let order_type = normalize_order_type(order_type_raw)?;

    if order_type.requires_price() && item.price.is_none() {
        return Err(EngineError::Validation(format!(
            "{order_type} requires price"
        )));
    }
    if order_type.requires_stop_price() && item.stop_price.is_none() {
        return Err(EngineError::Validation(format!(
            "{order_type} requires stop_price"
        )));
    }

    let quantity = if order_type == OrderType::CancelAllOrder {
        // CANCEL_ALL_ORDER carries no quantity; a zero-value placeholder
        // keeps the struct uniform without leaking an Option through the
        // rest of the dispatch path.
        QuantitySpec::Absolute(Decimal::ZERO)
    } else {
        resolve_quantity(item.qty, item.qty_per)?
    };

    Ok(NormalizedOrder {
        symbol,
        side,
        order_type,
        price: item.price,
        stop_price: item.stop_price,
        quantity,
    })
}

/// Expands a `WebhookSignal` into the list of orders to dispatch. Batch mode
/// is detected purely by the presence of a non-empty `orders` array — there
/// is no derived `batch_mode` flag (§4.1).
pub fn normalize_signal(signal: &WebhookSignal) -> Result<Vec<NormalizedOrder>, EngineError> {
    match &signal.orders {
        Some(items) if !items.is_empty() => items
            .iter()
            .map(|item| normalize_order(item, signal.symbol.as_deref()))
            .collect(),
        _ => {
            let item = RawOrderItem {
                symbol: signal.symbol.clone(),
                side: signal.side.clone(),
                order_type: signal.order_type.clone(),
                price: signal.price,
                stop_price: signal.stop_price,
                qty: signal.qty,
                qty_per: signal.qty_per,
            };
            Ok(vec![normalize_order(&item, None)?])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn side_aliases_map_correctly() {
        assert_eq!(normalize_side("buy").unwrap(), Side::Buy);
        assert_eq!(normalize_side("long").unwrap(), Side::Buy);
        assert_eq!(normalize_side("SELL").unwrap(), Side::Sell);
        assert_eq!(normalize_side("short").unwrap(), Side::Sell);
        assert!(normalize_side("flat").is_err());
    }

    #[test]
    fn order_type_aliases_are_rejected() {
        assert!(normalize_order_type("LMT").is_err());
        assert!(normalize_order_type("limit").is_ok());
    }

    #[test]
    fn well_formed_symbol_passes_through_uppercased() {
        assert_eq!(validate_symbol("btc/usdt").unwrap(), "BTC/USDT");
    }

    #[test]
    fn binance_native_symbol_suggests_correction() {
        let err = validate_symbol("BTCUSDT").unwrap_err();
        assert!(err.to_string().contains("BTC/USDT"));
    }

    #[test]
    fn upbit_native_symbol_suggests_correction() {
        let err = validate_symbol("KRW-BTC").unwrap_err();
        assert!(err.to_string().contains("BTC/KRW"));
    }

    #[test]
    fn qty_takes_precedence_over_qty_per() {
        let spec = resolve_quantity(Some(Decimal::ONE), Some(Decimal::new(5, 1))).unwrap();
        assert!(matches!(spec, QuantitySpec::Absolute(q) if q == Decimal::ONE));
    }

    #[test]
    fn missing_both_quantity_fields_is_rejected() {
        assert!(resolve_quantity(None, None).is_err());
    }

    #[test]
    fn batch_items_do_not_inherit_top_level_side_or_price() {
        let signal = WebhookSignal {
            group_name: "g1".into(),
            token: "tok".into(),
            symbol: Some("BTC/USDT".into()),
            side: Some("buy".into()),
            order_type: Some("LIMIT".into()),
            price: Some(Decimal::new(50000, 0)),
            stop_price: None,
            qty: None,
            qty_per: None,
            orders: Some(vec![RawOrderItem {
                symbol: None,
                side: None,
                order_type: Some("MARKET".into()),
                price: None,
                stop_price: None,
                qty: Some(Decimal::ONE),
                qty_per: None,
            }]),
        };
        // the batch item has no side of its own, so normalization must fail
        // rather than silently borrow the top-level "buy".
        let err = normalize_signal(&signal).unwrap_err();
        assert!(err.to_string().contains("side"));
    }

    #[test]
    fn batch_items_may_fall_back_to_top_level_symbol() {
        let signal = WebhookSignal {
            group_name: "g1".into(),
            token: "tok".into(),
            symbol: Some("BTC/USDT".into()),
            side: None,
            order_type: None,
            price: None,
            stop_price: None,
            qty: None,
            qty_per: None,
            orders: Some(vec![RawOrderItem {
                symbol: None,
                side: Some("buy".into()),
                order_type: Some("MARKET".into()),
                price: None,
                stop_price: None,
                qty: Some(Decimal::ONE),
                qty_per: None,
            }]),
        };
        let orders = normalize_signal(&signal).unwrap();
        assert_eq!(orders[0].symbol, "BTC/USDT");
    }
}
