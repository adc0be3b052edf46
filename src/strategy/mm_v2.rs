//! Market Making V2 variant (spec.md §4.E): a spread/amount ladder defined
//! by parallel `buy_spreads`/`sell_spreads` and `buy_amounts_pct`/
//! `sell_amounts_pct` vectors, sized off `total_amount_quote`. The amount
//! vectors are percentages (each side must sum to 100, enforced at
//! registration), not pre-normalized fractions.

use super::{DesiredOrder, TickContext};
use crate::models::{MmV2Params, OrderSide};

pub fn decide(ctx: &TickContext, params: &MmV2Params) -> Vec<DesiredOrder> {
    let Some(mid) = ctx.book.mid() else {
        return Vec::new();
    };
    if mid <= 0.0 {
        return Vec::new();
    }

    let mut orders = Vec::with_capacity(params.buy_spreads.len() + params.sell_spreads.len());

    for (spread, amount_pct) in params.buy_spreads.iter().zip(params.buy_amounts_pct.iter()) {
        let price = mid * (1.0 - spread);
        let size = (ctx.config.total_amount_quote * amount_pct / 100.0) / mid;
        if size > 0.0 {
            orders.push(DesiredOrder {
                side: OrderSide::Buy,
                price,
                size,
            });
        }
    }

    for (spread, amount_pct) in params.sell_spreads.iter().zip(params.sell_amounts_pct.iter()) {
        let price = mid * (1.0 + spread);
        let size = (ctx.config.total_amount_quote * amount_pct / 100.0) / mid;
        if size > 0.0 {
            orders.push(DesiredOrder {
                side: OrderSide::Sell,
                price,
                size,
            });
        }
    }

    orders
}
