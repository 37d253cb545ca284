//! Inventory-aware Avellaneda-Stoikov-style baseline. Grounded on
//! `original_source/trading_bot/market_strategy/ans_strategy.py`.

use super::{apply_safety_guards, optimal_spread, reservation_price, QuoteInput, Strategy};

#[derive(Debug, Clone, Copy, Default)]
pub struct Baseline;

impl Strategy for Baseline {
    fn quote(&self, input: &QuoteInput) -> (f64, f64) {
        let market = input.market;

        // The source bails out to the raw top of book when it has nothing to price
        // from: no volatility reading yet, or an arrival-rate sensitivity at or below
        // the floor the spread formula divides by.
        if market.volatility_sum <= 0.0 || market.order_arrival_rate_sensitivity <= 1.0 {
            return (input.best_bid, input.best_ask);
        }

        let r = reservation_price(
            input.best_bid,
            input.best_ask,
            market,
            input.inventory,
            input.risk_aversion,
        );
        let half_spread = optimal_spread(market, input.risk_aversion) / 2.0;

        let raw_bid = r - half_spread;
        let raw_ask = r + half_spread;

        apply_safety_guards(
            raw_bid,
            raw_ask,
            input.tick,
            input.best_bid,
            input.best_ask,
            input.top_bid,
            input.top_ask,
            input.mirror_ask,
            input.force_sell,
        )
    }
}
