//! GLFT-style reward-tilt overlay: skews by depth normalized against the mean depth
//! across the tradable set, rather than this market's own average flow. Grounded on
//! `original_source/trading_bot/market_strategy/glft_strategy.py`.

use super::{apply_safety_guards, Baseline, QuoteInput, Strategy};

#[derive(Debug, Clone, Copy, Default)]
pub struct RewardTilt;

impl Strategy for RewardTilt {
    fn quote(&self, input: &QuoteInput) -> (f64, f64) {
        let (bid, ask) = Baseline.quote(input);
        let market = input.market;

        if input.mean_tradable_depth <= 0.0 {
            return (bid, ask);
        }

        let d_norm = (market.depth_bids + market.depth_asks) / input.mean_tradable_depth;
        if d_norm <= 0.0 {
            return (bid, ask);
        }

        let phi = input.order_book_depth_skew_factor;
        let skewed_bid = bid - phi / d_norm;
        let skewed_ask = ask + phi / d_norm;

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
