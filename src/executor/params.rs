//! Per-order-type parameter preparation (§4.4).

use rust_decimal::Decimal;
use thiserror::Error;

use crate::core_types::OrderType;
use crate::exchange_port::OrderRequest;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParamError {
    #[error("{0:?} requires a price")]
    MissingPrice(OrderType),
    #[error("{0:?} requires a stop price")]
    MissingStopPrice(OrderType),
    #[error("order type {0:?} is not submittable (CANCEL_ALL_ORDER is handled separately)")]
    Unsupported(OrderType),
}

/// Whether the exchange call needs `timeInForce=GTC` attached.
pub fn requires_time_in_force(order_type: OrderType) -> bool {
    matches!(order_type, OrderType::Limit | OrderType::StopLimit)
}

/// Validates that an `OrderRequest` carries the fields its order type
/// requires before it reaches the wire. MARKET needs only quantity; LIMIT
/// needs price; STOP_MARKET needs stop_price; STOP_LIMIT needs both.
pub fn validate_params(request: &OrderRequest) -> Result<(), ParamError> {
    match request.order_type {
        OrderType::Market => Ok(()),
        OrderType::Limit => require_price(request.price, request.order_type),
        OrderType::StopMarket => require_stop_price(request.stop_price, request.order_type),
        OrderType::StopLimit => {
            require_price(request.price, request.order_type)?;
            require_stop_price(request.stop_price, request.order_type)
        }
        OrderType::CancelAllOrder => Err(ParamError::Unsupported(request.order_type)),
    }
}

fn require_price(price: Option<Decimal>, order_type: OrderType) -> Result<(), ParamError> {
    if price.is_none() {
        return Err(ParamError::MissingPrice(order_type));
    }
    Ok(())
}

fn require_stop_price(stop_price: Option<Decimal>, order_type: OrderType) -> Result<(), ParamError> {
    if stop_price.is_none() {
        return Err(ParamError::MissingStopPrice(order_type));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_types::Side;
    use std::str::FromStr;

    fn base(order_type: OrderType) -> OrderRequest {
        OrderRequest {
            symbol: "BTC/USDT".into(),
            side: Side::Buy,
            order_type,
            quantity: Decimal::ONE,
            price: None,
            stop_price: None,
            reduce_only: false,
        }
    }

    #[test]
    fn market_needs_nothing_extra() {
        assert!(validate_params(&base(OrderType::Market)).is_ok());
    }

    #[test]
    fn limit_without_price_is_rejected() {
        assert_eq!(
            validate_params(&base(OrderType::Limit)),
            Err(ParamError::MissingPrice(OrderType::Limit))
        );
    }

    #[test]
    fn stop_limit_requires_both() {
        let mut req = base(OrderType::StopLimit);
        req.price = Some(Decimal::from_str("50000").unwrap());
        assert_eq!(
            validate_params(&req),
            Err(ParamError::MissingStopPrice(OrderType::StopLimit))
        );
        req.stop_price = Some(Decimal::from_str("49900").unwrap());
        assert!(validate_params(&req).is_ok());
    }

    #[test]
    fn cancel_all_order_is_not_a_submittable_request() {
        assert_eq!(
            validate_params(&base(OrderType::CancelAllOrder)),
            Err(ParamError::Unsupported(OrderType::CancelAllOrder))
        );
    }
}
