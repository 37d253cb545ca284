//! Depth-derisked overlay on top of the baseline quote: widens away from whichever
//! side of the book is thin, scaled by expected order flow. Grounded on
//! `original_source/trading_bot/market_strategy/ans_derisked_strategy.py`.

use super::{apply_safety_guards, Baseline, QuoteInput, Strategy};

#[derive(Debug, Clone, Copy, Default)]
pub struct DepthDerisked;

impl Strategy for DepthDerisked {
    fn quote(&self, input: &QuoteInput) -> (f64, f64) {
        let (bid, ask) = Baseline.quote(input);
        let market = input.market;

        if market.depth_bids <= 0.0 || market.depth_asks <= 0.0 {
            return (bid, ask);
        }

        let expected_flow = market.avg_trades_per_hour * market.avg_trade_size;
        let phi = input.order_book_depth_skew_factor;

        let skewed_bid = bid - phi * expected_flow / market.depth_bids;
        let skewed_ask = ask + phi * expected_flow / market.depth_asks;

        apply_safety_guards(
            skewed_bid,
            skewed_ask,
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
