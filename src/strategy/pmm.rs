//! Pure Market Making variant (spec.md §4.E): symmetric bid/ask ladder
//! around the book mid, clamped to an optional price ceiling/floor and
//! skewed away from an existing position when inventory skew is enabled.

use super::{DesiredOrder, TickContext};
use crate::models::{OrderSide, PmmParams};

pub fn decide(ctx: &TickContext, params: &PmmParams) -> Vec<DesiredOrder> {
    let Some(mid) = ctx.book.mid() else {
        return Vec::new();
    };

    let skew = if params.inventory_skew_enabled {
        // Shift both sides down when long, up when short, proportional to
        // position size relative to the per-level order amount.
        let ref_size = params.order_amount * params.order_levels.max(1) as f64;
        if ref_size > 0.0 {
            -(ctx.position_size / ref_size) * params.minimum_spread.max(params.bid_spread)
        } else {
            0.0
        }
    } else {
        0.0
    };

    let mut orders = Vec::with_capacity(params.order_levels as usize * 2);
    for level in 0..params.order_levels.max(1) {
        let level_mult = 1.0 + level as f64;

        let bid_price = clamp_price(
            mid * (1.0 - params.bid_spread * level_mult) + skew,
            params.price_floor,
            params.price_ceiling,
        );
        let ask_price = clamp_price(
            mid * (1.0 + params.ask_spread * level_mult) + skew,
            params.price_floor,
            params.price_ceiling,
        );

        let place_bid = !(params.ping_pong_enabled && ctx.position_size > 0.0);
        let place_ask = !(params.ping_pong_enabled && ctx.position_size < 0.0);

        if place_bid {
            orders.push(DesiredOrder {
                side: OrderSide::Buy,
                price: bid_price,
                size: params.order_amount,
            });
        }
        if place_ask {
            orders.push(DesiredOrder {
                side: OrderSide::Sell,
                price: ask_price,
                size: params.order_amount,
            });
        }
    }

    orders
}

fn clamp_price(price: f64, floor: Option<f64>, ceiling: Option<f64>) -> f64 {
    let mut p = price;
    if let Some(floor) = floor {
        p = p.max(floor);
    }
    if let Some(ceiling) = ceiling {
        p = p.min(ceiling);
    }
    p
}
