//! Normalized connector types (spec.md §4.B, §6).

use crate::models::OrderSide;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    L2Book,
    Trades,
    Candles,
    UserStream,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderType {
    Limit,
    Market,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeInForce {
    Gtc,
    Ioc,
    Fok,
}

#[derive(Debug, Clone)]
pub struct PlaceOrderRequest {
    pub symbol: String,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub price: f64,
    pub size: f64,
    pub tif: TimeInForce,
    pub reduce_only: bool,
    pub client_order_id: String,
}

#[derive(Debug, Clone)]
pub struct OrderAck {
    pub exchange_order_id: String,
    pub client_order_id: String,
}

#[derive(Debug, Clone)]
pub struct Position {
    pub symbol: String,
    pub size: f64,
    pub entry_price: f64,
}

#[derive(Debug, Clone, Default)]
pub struct Balances {
    pub available_margin: f64,
    pub total_equity: f64,
}

/// Instrument metadata: tick/lot sizes the connector rounds to before
/// emission (spec.md §6).
#[derive(Debug, Clone, Copy)]
pub struct InstrumentMeta {
    pub tick_size: f64,
    pub lot_size: f64,
}

impl InstrumentMeta {
    pub fn round_price(&self, price: f64) -> f64 {
        round_to_increment(price, self.tick_size)
    }

    pub fn round_size(&self, size: f64) -> f64 {
        round_to_increment(size, self.lot_size)
    }
}

fn round_to_increment(value: f64, increment: f64) -> f64 {
    if increment <= 0.0 {
        return value;
    }
    (value / increment).round() * increment
}

/// Business-vs-transient split used by the connector's retry policy
/// (spec.md §4.B, §7).
#[derive(Debug, Clone)]
pub enum ConnectorErrorKind {
    /// insufficient margin, invalid price, self-trade, etc. Never retried.
    Business(String),
    /// network error, 5xx, or 429 after cooldown. Retried internally.
    Transient(String),
}

#[derive(Debug, Clone)]
pub enum OrderEvent {
    Ack(OrderAck),
    Fill {
        client_order_id: String,
        price: f64,
        size: f64,
    },
    Cancelled {
        client_order_id: String,
    },
    Rejected {
        client_order_id: String,
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounds_to_tick_and_lot() {
        let meta = InstrumentMeta {
            tick_size: 0.01,
            lot_size: 0.001,
        };
        assert!((meta.round_price(100.004) - 100.00).abs() < 1e-9);
        assert!((meta.round_size(1.2347) - 1.235).abs() < 1e-9);
    }
}
