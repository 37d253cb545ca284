//! Pricing strategy: the inventory-aware Avellaneda-Stoikov-style baseline plus two
//! overlays, represented as a tagged variant rather than a class hierarchy. Grounded on
//! `original_source/trading_bot/market_strategy/{ans_strategy,ans_derisked_strategy,
//! glft_strategy,strategy_factory}.py`.

mod baseline;
mod depth_derisked;
mod reward_tilt;

pub use baseline::Baseline;
pub use depth_derisked::DepthDerisked;
pub use reward_tilt::RewardTilt;

use crate::types::Market;

/// Everything a strategy needs to compute a quote for one token, collected from the
/// order book view and market row by the per-market engine.
pub struct QuoteInput<'a> {
    pub best_bid: f64,
    pub best_ask: f64,
    pub mid: f64,
    pub market: &'a Market,
    pub tick: f64,
    pub force_sell: bool,
    pub inventory: f64,
    /// Outermost visible bid/ask, used by the box-sum guard fallback.
    pub top_bid: f64,
    pub top_ask: f64,
    /// The complementary token's current best ask, used by the box-sum guard
    /// (`bid + mirror.ask_for_complement >= PRICE_PRECISION_LIMIT`).
    pub mirror_ask: f64,
    pub risk_aversion: f64,
    pub order_book_depth_skew_factor: f64,
    /// Mean `(depth_bids + depth_asks)` across the tradable set, for the reward-tilt
    /// overlay's normalization; supplied by the caller since the core does not itself
    /// enumerate the tradable set (market-universe selection is out of scope).
    pub mean_tradable_depth: f64,
}

/// A pricing strategy: converts book/inventory state into a two-sided quote, and
/// position/row state into order sizes. Every variant shares the same `sizes`
/// implementation (see `sizes`), matching the source where only `get_order_prices`
/// differs between `AnSMarketStrategy`, `ANSDeriskedMarketStrategy`, and
/// `GLFTMarketStrategy`.
pub trait Strategy {
    fn quote(&self, input: &QuoteInput) -> (f64, f64);

    fn sizes(&self, position: f64, market: &Market, force_sell: bool) -> (f64, f64) {
        sizes(position, market, force_sell)
    }
}

/// Reservation price: `wmid - k_inv * inventory * risk_aversion * volatility^2 * T`.
/// `k_inv = 3e-8` is the source's `factor = 0.00000003` scale constant.
pub(crate) fn reservation_price(
    best_bid: f64,
    best_ask: f64,
    market: &Market,
    inventory: f64,
    risk_aversion: f64,
) -> f64 {
    const K_INV: f64 = 3e-8;
    let wmid = weighted_mid_price(best_bid, best_ask, market.market_order_imbalance);
    let sigma = market.volatility_sum;
    wmid - K_INV * inventory * risk_aversion * sigma * sigma * crate::pricing::TIME_TO_HORIZON_HOURS
}

/// `((1-b)/2)*best_bid + ((1+b)/2)*best_ask`, `b` the order-book imbalance.
pub(crate) fn weighted_mid_price(best_bid: f64, best_ask: f64, imbalance: f64) -> f64 {
    ((1.0 - imbalance) / 2.0) * best_bid + ((1.0 + imbalance) / 2.0) * best_ask
}

/// Optimal full spread: `k_spr * (risk_aversion*sigma^2*T + (2/risk_aversion)*ln(1 +
/// risk_aversion/max(lambda,1)))`. `k_spr = 2.5e-5` is the source's `factor = 0.000025`.
pub(crate) fn optimal_spread(market: &Market, risk_aversion: f64) -> f64 {
    const K_SPR: f64 = 2.5e-5;
    let sigma = market.volatility_sum;
    let lambda = market.order_arrival_rate_sensitivity.max(1.0);
    let left = risk_aversion * sigma * sigma * TIME_TO_HORIZON_HOURS;
    let right = (2.0 / risk_aversion) * (1.0 + risk_aversion / lambda).ln();
    K_SPR * (left + right)
}

pub(crate) const TIME_TO_HORIZON_HOURS: f64 = 24.0;

/// Safety guards applied to every strategy variant's raw `(bid, ask)`. The body of the
/// source's `apply_safety_guards` was not recoverable from the
/// retrieved sources (no `market_strategy/__init__.py` in the pack); this is built
/// directly from the documented behavior, preserving the call signature the three
/// concrete strategies use.
pub(crate) fn apply_safety_guards(
    mut bid: f64,
    mut ask: f64,
    tick: f64,
    best_bid: f64,
    best_ask: f64,
    top_bid: f64,
    top_ask: f64,
    mirror_ask: f64,
    force_sell: bool,
) -> (f64, f64) {
    const MIN_PRICE_LIMIT: f64 = 0.1;
    const MAX_PRICE_LIMIT: f64 = 0.9;
    const PRICE_PRECISION_LIMIT: f64 = 0.99;

    if force_sell {
        bid = 0.0;
        ask = ask.max(best_ask + tick);
    }

    // Never cross the book.
    bid = bid.min(best_ask - tick);
    ask = ask.max(best_bid + tick);

    // Box-sum guard: pull to the outermost visible prices if this bid plus the
    // complementary token's current ask would sum to (near) 1 — the natural
    // cross-token arbitrage bound for a binary market.
    if bid + mirror_ask >= PRICE_PRECISION_LIMIT {
        bid = top_bid;
        ask = top_ask;
    }

    if !force_sell && (bid < MIN_PRICE_LIMIT || bid >= MAX_PRICE_LIMIT) {
        bid = 0.0;
    }

    bid = round_to_tick(bid, tick);
    ask = round_to_tick(ask, tick);
    (bid, ask)
}

fn round_to_tick(price: f64, tick: f64) -> f64 {
    (price / tick).round() * tick
}

/// Order sizing, shared by every strategy variant (`ans_strategy.py`'s
/// `get_buy_sell_amount`; the derisked and reward-tilt variants delegate to it
/// unchanged).
pub(crate) fn sizes(position: f64, market: &Market, force_sell: bool) -> (f64, f64) {
    let trade_size = market.trade_size;
    let max_size = market.effective_max_size();
    let min_size = market.min_size;

    let mut buy_amount = if position < max_size {
        trade_size.min(max_size - position)
    } else {
        0.0
    };

    let mut sell_amount = if position >= trade_size || force_sell {
        position
    } else {
        0.0
    };

    if buy_amount < min_size {
        buy_amount = if buy_amount > 0.7 * min_size { min_size } else { 0.0 };
    }
    if sell_amount < min_size {
        sell_amount = if sell_amount > 0.7 * min_size { min_size } else { 0.0 };
    }

    if sell_amount > position {
        sell_amount = if force_sell { position } else { 0.0 };
    }

    if force_sell {
        buy_amount = 0.0;
    }

    (buy_amount, sell_amount)
}

/// The three selectable pricing variants, dispatched without a class hierarchy.
pub enum StrategyKind {
    Baseline(Baseline),
    DepthDerisked(DepthDerisked),
    RewardTilt(RewardTilt),
}

impl Strategy for StrategyKind {
    fn quote(&self, input: &QuoteInput) -> (f64, f64) {
        match self {
            StrategyKind::Baseline(s) => s.quote(input),
            StrategyKind::DepthDerisked(s) => s.quote(input),
            StrategyKind::RewardTilt(s) => s.quote(input),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Market;

    fn sample_market() -> Market {
        Market {
            condition_id: "0xabc".into(),
            token1: "T1".into(),
            token2: "T2".into(),
            neg_risk: false,
            tick_size: 0.001,
            min_size: 5.0,
            trade_size: 20.0,
            max_size: Some(40.0),
            best_bid: 0.40,
            best_ask: 0.42,
            max_spread: 0.05,
            rewards_daily_rate: 0.0,
            volatility_1h: 1.0,
            volatility_3h: 2.0,
            volatility_24h: 3.0,
            volatility_7d: 4.0,
            volatility_sum: 10.0,
            order_arrival_rate_sensitivity: 5.0,
            market_order_imbalance: 0.0,
            depth_bids: 1000.0,
            depth_asks: 1000.0,
            avg_trades_per_hour: 2.0,
            avg_trade_size: 50.0,
            question: "Will it happen?".into(),
            answer1: "Yes".into(),
            answer2: "No".into(),
        }
    }

    /// Scenario: `volatility_sum == 0` — no valid data to price with.
    /// Expected: quote falls back to `(best_bid, best_ask)` unchanged.
    #[test]
    fn test_baseline_quote_returns_raw_book_when_no_volatility() {
        let mut market = sample_market();
        market.volatility_sum = 0.0;
        let input = QuoteInput {
            best_bid: 0.40,
            best_ask: 0.42,
            mid: 0.41,
            market: &market,
            tick: 0.001,
            force_sell: false,
            inventory: 0.0,
            top_bid: 0.39,
            top_ask: 0.43,
            mirror_ask: 1.0,
            risk_aversion: 0.45,
            order_book_depth_skew_factor: 0.025,
            mean_tradable_depth: 1000.0,
        };
        let (bid, ask) = Baseline.quote(&input);
        assert_eq!((bid, ask), (0.40, 0.42));
    }

    /// Scenario: `order_arrival_rate_sensitivity <= 1` — below the source's cutoff.
    /// Expected: quote falls back to `(best_bid, best_ask)` unchanged.
    #[test]
    fn test_baseline_quote_returns_raw_book_when_low_arrival_sensitivity() {
        let mut market = sample_market();
        market.order_arrival_rate_sensitivity = 1.0;
        let input = QuoteInput {
            best_bid: 0.40,
            best_ask: 0.42,
            mid: 0.41,
            market: &market,
            tick: 0.001,
            force_sell: false,
            inventory: 0.0,
            top_bid: 0.39,
            top_ask: 0.43,
            mirror_ask: 1.0,
            risk_aversion: 0.45,
            order_book_depth_skew_factor: 0.025,
            mean_tradable_depth: 1000.0,
        };
        let (bid, ask) = Baseline.quote(&input);
        assert_eq!((bid, ask), (0.40, 0.42));
    }

    /// Scenario: `force_sell` is set.
    /// Expected: bid is forced to 0 and ask is pushed to at least `best_ask + tick`.
    #[test]
    fn test_safety_guards_force_sell_zeroes_bid() {
        let (bid, ask) = apply_safety_guards(
            0.45, 0.46, 0.001, 0.40, 0.42, 0.39, 0.43, 1.0, true,
        );
        assert_eq!(bid, 0.0);
        assert!(ask >= 0.42 + 0.001 - 1e-9);
    }

    /// Scenario: box-sum guard scenario: candidate bid 0.46, complementary token's
    /// current ask 0.55 -> sum 1.01 >= 0.99.
    /// Expected: bid/ask are pulled to the outermost visible top_bid/top_ask.
    #[test]
    fn test_safety_guards_box_sum_guard_trips() {
        let (bid, ask) = apply_safety_guards(
            0.46, 0.48, 0.001, 0.40, 0.50, 0.39, 0.51, 0.55, false,
        );
        assert_eq!(bid, 0.39);
        assert_eq!(ask, 0.51);
    }

    /// Scenario: the complementary token's ask is far from the combined-sum bound.
    /// Expected: the box-sum guard does not trip.
    #[test]
    fn test_safety_guards_box_sum_guard_does_not_trip_when_sum_low() {
        let (bid, _ask) = apply_safety_guards(
            0.46, 0.48, 0.001, 0.40, 0.50, 0.39, 0.51, 0.30, false,
        );
        assert_eq!(bid, 0.46);
    }

    /// Scenario: a clamp case — bid below MIN_PRICE_LIMIT.
    /// Expected: the bid is zeroed rather than submitted out of band.
    #[test]
    fn test_safety_guards_clamps_low_bid_to_zero() {
        let (bid, _ask) = apply_safety_guards(
            0.05, 0.20, 0.001, 0.01, 0.20, 0.0, 0.21, 1.0, false,
        );
        assert_eq!(bid, 0.0);
    }

    /// Scenario: position exactly at `min_size`, `0.7*min_size`, and just below that
    /// boundary.
    /// Expected: at/above 0.7*min_size rounds up to min_size; below it drops to 0.
    #[test]
    fn test_sizes_rounds_near_min_size_boundary() {
        let market = sample_market(); // min_size = 5.0, trade_size = 20.0, max_size = 40.0
        // position far from max, buy_amount = trade_size = 20 >= min_size: untouched path.
        let (buy, _) = sizes(0.0, &market, false);
        assert_eq!(buy, 20.0);

        // Force a small buy_amount by putting position near max_size.
        let mut near_max = market.clone();
        near_max.max_size = Some(3.5); // remaining_to_max = 3.5, 0.7*min_size = 3.5
        let (buy_at_boundary, _) = sizes(0.0, &near_max, false);
        assert_eq!(buy_at_boundary, 5.0); // rounds up to min_size

        let mut below_boundary = market.clone();
        below_boundary.max_size = Some(3.0); // remaining_to_max = 3.0 < 3.5 boundary
        let (buy_below, _) = sizes(0.0, &below_boundary, false);
        assert_eq!(buy_below, 0.0);
    }

    /// Scenario: `force_sell` with an existing position.
    /// Expected: buy_amount is forced to 0 and sell_amount is the full position.
    #[test]
    fn test_sizes_force_sell_zeroes_buy_and_sells_all() {
        let market = sample_market();
        let (buy, sell) = sizes(15.0, &market, true);
        assert_eq!(buy, 0.0);
        assert_eq!(sell, 15.0);
    }
}
