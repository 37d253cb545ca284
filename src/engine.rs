//! Per-market trading pass: the core loop that turns a book update into quotes,
//! sizes, a stop-loss check, and order submissions. Grounded end to end on
//! `original_source/trading_bot/trading.py`'s `perform_trade`/`send_buy_order`/
//! `send_sell_order`; the per-market orchestration shape (acquired by the scheduler,
//! numbered steps) follows `examples/mufund-nitro-fig/src/engine/runner.rs` and
//! `engine/pipeline.rs`.

use std::sync::{Arc, Mutex};

use chrono::{Duration as ChronoDuration, Utc};

use crate::book::OrderBookRegistry;
use crate::config::Config;
use crate::gateway::exchange::ExchangeClient;
use crate::pricing::{QuoteInput, Strategy, StrategyKind};
use crate::risk::RiskJournal;
use crate::state::EngineState;
use crate::types::{CreateOrderResponse, Market, Side, TokenId};

/// Everything a trading pass for one market needs, shared process-wide.
pub struct EngineContext {
    pub state: Arc<EngineState>,
    pub registry: Arc<Mutex<OrderBookRegistry>>,
    pub exchange: Arc<ExchangeClient>,
    pub risk: Arc<RiskJournal>,
    pub config: Arc<Config>,
    pub strategy: StrategyKind,
}

/// A probe of one side's resting liquidity, grounded on
/// `trading_utils.py`'s `find_best_price_with_size`: `top` is the outermost level seen
/// regardless of size, `best`/`best_size` is the first level whose size clears the
/// probe minimum.
#[derive(Debug, Clone, Copy, Default)]
struct ProbedSide {
    top: Option<f64>,
    best: Option<f64>,
    best_size: Option<f64>,
}

fn probe_side(ladder: &std::collections::BTreeMap<crate::types::Ticks, f64>, tick_size: f64, min_size: f64, descending: bool) -> ProbedSide {
    let mut probed = ProbedSide::default();
    let mut push = |tick: &crate::types::Ticks, size: &f64| {
        let price = tick.to_price(tick_size);
        if probed.top.is_none() {
            probed.top = Some(price);
        }
        if probed.best.is_none() && *size > min_size {
            probed.best = Some(price);
            probed.best_size = Some(*size);
        }
    };
    if descending {
        for (tick, size) in ladder.iter().rev() {
            push(tick, size);
        }
    } else {
        for (tick, size) in ladder.iter() {
            push(tick, size);
        }
    }
    probed
}

/// One token's probed book state: `get_best_bid_ask_deets(token, 100)`, retried at `20`
/// if anything came back empty.
struct ProbedBook {
    top_bid: Option<f64>,
    top_ask: Option<f64>,
    best_bid: Option<f64>,
    best_bid_size: Option<f64>,
    best_ask: Option<f64>,
    best_ask_size: Option<f64>,
}

fn probe_book_with_retry(
    bids: &std::collections::BTreeMap<crate::types::Ticks, f64>,
    asks: &std::collections::BTreeMap<crate::types::Ticks, f64>,
    tick_size: f64,
    probe_size: f64,
    retry_size: f64,
) -> ProbedBook {
    let probe = |min_size: f64| {
        let bid = probe_side(bids, tick_size, min_size, true);
        let ask = probe_side(asks, tick_size, min_size, false);
        ProbedBook {
            top_bid: bid.top,
            top_ask: ask.top,
            best_bid: bid.best,
            best_bid_size: bid.best_size,
            best_ask: ask.best,
            best_ask_size: ask.best_size,
        }
    };
    let first = probe(probe_size);
    if first.best_bid.is_none() || first.best_ask.is_none() || first.best_bid_size.is_none() || first.best_ask_size.is_none() {
        probe(retry_size)
    } else {
        first
    }
}

/// Sell-only if this market is held but no longer selected,
/// liquidity has dried up relative to total balance, or short-term volatility blew
/// through the exit threshold.
fn determine_sell_only(
    held_but_not_selected: bool,
    liquidity: f64,
    total_balance: f64,
    volatility_3h: f64,
    thresholds: &crate::config::TradingThresholds,
) -> bool {
    held_but_not_selected
        || liquidity < total_balance * (1.0 - thresholds.sell_only_threshold)
        || volatility_3h > thresholds.volatility_exit_threshold
}

/// Engine-level box-sum guard on a pending buy: true if the complementary token's
/// position is large enough to matter and this bid would push the combined cost basis
/// to (near) 1, grounded on `trading.py:434`'s `rev_pos['size'] > row['min_size'] and
/// order['price'] + rev_pos['avgPrice'] >= TCNF.PRICE_PRECISION_LIMIT`. The size
/// precondition matters: `Position::apply_trade` preserves `avg_price` across a full
/// sell-down to zero, so without it a market once held and fully closed out on the
/// mirror token would leave a stale non-zero `avg_price` that trips this guard forever.
fn box_sum_guard_trips(mirror_size: f64, mirror_avg_price: f64, bid_price: f64, min_size: f64, price_precision_limit: f64) -> bool {
    mirror_size > min_size && mirror_avg_price + bid_price >= price_precision_limit
}

/// Cancel-replace decision shared by the buy and sell order-hygiene paths, grounded on
/// `trading.py`'s `send_buy_order`/`send_sell_order`.
fn should_cancel_existing(
    existing_price: f64,
    existing_size: f64,
    new_price: f64,
    new_size: f64,
    price_diff_threshold: f64,
    size_diff_percentage: f64,
) -> bool {
    let price_diff = if existing_size > 0.0 { (existing_price - new_price).abs() } else { f64::INFINITY };
    let size_diff = if existing_size > 0.0 { (existing_size - new_size).abs() } else { f64::INFINITY };
    price_diff > price_diff_threshold || size_diff > new_size * size_diff_percentage || existing_size == 0.0
}

/// Run one trading pass for `market`. `held_but_not_selected` and
/// `mean_tradable_depth` come from the caller since ranking/selecting the tradable set
/// is out of scope for this crate.
pub async fn perform_trade(
    market: &Market,
    ctx: &EngineContext,
    held_but_not_selected: bool,
    mean_tradable_depth: f64,
) -> Result<(), String> {
    let thresholds = &ctx.config.thresholds;

    let pos1 = ctx.state.get_position(&market.token1);
    let pos2 = ctx.state.get_position(&market.token2);

    let liquidity = ctx.state.liquidity();
    let total_balance = ctx.state.total_balance();
    let sell_only = determine_sell_only(held_but_not_selected, liquidity, total_balance, market.volatility_3h, thresholds);

    let merge_amount = pos1.size.min(pos2.size);
    if merge_amount > thresholds.min_merge_size {
        if let Err(e) = ctx.exchange.merge_positions(&market.condition_id, merge_amount, market.neg_risk).await {
            eprintln!("[ENGINE] merge_positions failed for {}: {e}", market.condition_id);
        }
    }

    for token in [&market.token1, &market.token2] {
        if let Err(e) = trade_one_token(market, token, sell_only, mean_tradable_depth, ctx).await {
            eprintln!("[ENGINE] pass failed for {} / {token}: {e}", market.condition_id);
        }
    }

    Ok(())
}

async fn trade_one_token(
    market: &Market,
    token: &TokenId,
    sell_only: bool,
    mean_tradable_depth: f64,
    ctx: &EngineContext,
) -> Result<(), String> {
    let thresholds = &ctx.config.thresholds;
    let mirror_token = market
        .mirror_of(token)
        .ok_or_else(|| format!("token {token} is not part of market {}", market.condition_id))?
        .clone();

    let (bids, asks, mirror_ask) = {
        let reg = ctx.registry.lock().unwrap();
        let (bids, asks) = reg.view_excluding_self(token);
        let mirror_ask = reg.book(&mirror_token).and_then(|b| b.best_ask()).map(|(t, _)| t.to_price(market.tick_size)).unwrap_or(1.0);
        (bids, asks, mirror_ask)
    };

    let probed = probe_book_with_retry(&bids, &asks, market.tick_size, ctx.config.best_bid_probe_size, ctx.config.best_bid_probe_retry_size);
    let (Some(top_bid), Some(top_ask)) = (probed.top_bid, probed.top_ask) else {
        return Ok(());
    };

    let mid = (top_bid + top_ask) / 2.0;
    let position = ctx.state.get_position(token);
    let mirror_position = ctx.state.get_position(&mirror_token);

    let risk_aversion = ctx.config.overrides.risk_aversion(&market.condition_id, thresholds);
    let depth_skew_factor = ctx.config.overrides.order_book_depth_skew_factor(&market.condition_id, thresholds);

    let quote_input = QuoteInput {
        best_bid: probed.best_bid.unwrap_or(top_bid),
        best_ask: probed.best_ask.unwrap_or(top_ask),
        mid,
        market,
        tick: market.tick_size,
        force_sell: sell_only,
        inventory: position.size,
        top_bid,
        top_ask,
        mirror_ask,
        risk_aversion,
        order_book_depth_skew_factor: depth_skew_factor,
        mean_tradable_depth,
    };
    let (bid_price, ask_price) = ctx.strategy.quote(&quote_input);
    let (buy_amount, sell_amount) = ctx.strategy.sizes(position.size, market, sell_only);

    // Stop-loss: evaluated before any quoting decision, and short-circuits the rest of
    // this token's pass on trip.
    if position.avg_price > 0.0 {
        let pnl = (mid - position.avg_price) / position.avg_price * 100.0;
        if pnl < thresholds.stop_loss_threshold && (top_ask - top_bid) <= thresholds.stop_loss_spread_threshold {
            send_sell_order(market, token, top_bid, position.size, ctx).await?;
            ctx.risk.record_trip(
                &market.condition_id,
                &market.question,
                &format!("stop loss tripped: pnl={pnl:.2}% mid={mid:.4} avg_price={:.4}", position.avg_price),
                Utc::now() + ChronoDuration::minutes(thresholds.stop_loss_sleep_period_mins),
            )?;
            return Ok(());
        }
    }

    if sell_only && sell_amount > 0.0 {
        send_sell_order(market, token, ask_price, sell_amount, ctx).await?;
        return Ok(());
    }

    let max_size = market.effective_max_size();
    if position.size < max_size && buy_amount >= market.min_size {
        if ctx.risk.is_buy_gated(&market.condition_id, Utc::now()) {
            return Ok(());
        }

        let current_buy_size = { ctx.registry.lock().unwrap().get_local_order(token, Side::Buy).size };

        if box_sum_guard_trips(mirror_position.size, mirror_position.avg_price, bid_price, market.min_size, thresholds.price_precision_limit) {
            if current_buy_size > thresholds.min_merge_size {
                ctx.exchange.cancel_all_asset(token).await?;
            }
            return Ok(());
        }

        if position.size + current_buy_size < max_size {
            send_buy_order(market, token, bid_price, buy_amount, ctx).await?;
        }
    } else if sell_amount > 0.0 {
        send_sell_order(market, token, ask_price, sell_amount, ctx).await?;
    }

    Ok(())
}

async fn send_buy_order(market: &Market, token: &TokenId, price: f64, size: f64, ctx: &EngineContext) -> Result<(), String> {
    let thresholds = &ctx.config.thresholds;
    let (existing_buy, existing_sell) = {
        let reg = ctx.registry.lock().unwrap();
        (reg.get_local_order(token, Side::Buy), reg.get_local_order(token, Side::Sell))
    };

    let should_cancel = should_cancel_existing(
        existing_buy.price,
        existing_buy.size,
        price,
        size,
        thresholds.buy_price_diff_threshold,
        thresholds.size_diff_percentage,
    );

    if should_cancel {
        if existing_buy.size > 0.0 || existing_sell.size > 0.0 {
            ctx.exchange.cancel_all_asset(token).await?;
        }
    } else {
        return Ok(());
    }

    if price >= thresholds.min_price_limit && price < thresholds.max_price_limit {
        let resp = ctx.exchange.create_order(token, Side::Buy, price, size, market.neg_risk).await?;
        handle_create_order_response(&market.condition_id, &resp, ctx);
    } else {
        eprintln!(
            "[ENGINE] not creating buy order for {token}, price {price} outside [{}, {})",
            thresholds.min_price_limit, thresholds.max_price_limit
        );
    }
    Ok(())
}

async fn send_sell_order(market: &Market, token: &TokenId, price: f64, size: f64, ctx: &EngineContext) -> Result<(), String> {
    let thresholds = &ctx.config.thresholds;
    let (existing_buy, existing_sell) = {
        let reg = ctx.registry.lock().unwrap();
        (reg.get_local_order(token, Side::Buy), reg.get_local_order(token, Side::Sell))
    };

    let should_cancel = should_cancel_existing(
        existing_sell.price,
        existing_sell.size,
        price,
        size,
        thresholds.sell_price_diff_threshold,
        thresholds.size_diff_percentage,
    );

    if should_cancel {
        if existing_sell.size > 0.0 || existing_buy.size > 0.0 {
            ctx.exchange.cancel_all_asset(token).await?;
        }
    } else {
        return Ok(());
    }

    let resp = ctx.exchange.create_order(token, Side::Sell, price, size, market.neg_risk).await?;
    handle_create_order_response(&market.condition_id, &resp, ctx);
    Ok(())
}

fn handle_create_order_response(market: &str, resp: &CreateOrderResponse, ctx: &EngineContext) {
    if resp.success {
        if let Some(order_id) = &resp.order_id {
            ctx.state.add_in_flight(market, order_id);
        }
    } else {
        eprintln!("[ENGINE] order submission for {market} failed: {resp:?}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TradingThresholds;

    /// Scenario: a market is held (non-zero position) but no longer in the selected
    /// set.
    /// Expected: sell-only trips regardless of liquidity or volatility.
    #[test]
    fn test_determine_sell_only_trips_on_held_but_not_selected() {
        let thresholds = TradingThresholds::default();
        assert!(determine_sell_only(true, 1000.0, 100.0, 1.0, &thresholds));
    }

    /// Scenario: liquidity has dropped below `total_balance * (1 - 0.8)`.
    /// Expected: sell-only trips even though the market is still selected.
    #[test]
    fn test_determine_sell_only_trips_on_low_liquidity() {
        let thresholds = TradingThresholds::default();
        assert!(determine_sell_only(false, 5.0, 1000.0, 1.0, &thresholds));
    }

    /// Scenario: normal liquidity, selected, and volatility under the exit threshold.
    /// Expected: sell-only does not trip.
    #[test]
    fn test_determine_sell_only_false_in_normal_conditions() {
        let thresholds = TradingThresholds::default();
        assert!(!determine_sell_only(false, 1000.0, 1000.0, 1.0, &thresholds));
    }

    /// Scenario: the mirror token has a real position above `min_size` and the box sum
    /// would exceed the precision limit.
    /// Expected: the guard trips.
    #[test]
    fn test_box_sum_guard_trips_on_real_mirror_position() {
        assert!(box_sum_guard_trips(25.0, 0.55, 0.46, 5.0, 0.99));
    }

    /// Scenario: the mirror token was once held and fully sold down to zero, but
    /// `avg_price` is still the stale entry price from before the sell-down.
    /// Expected: the guard does not trip, since `mirror_size` is at (or below)
    /// `min_size`.
    #[test]
    fn test_box_sum_guard_does_not_trip_on_stale_avg_price_after_full_exit() {
        assert!(!box_sum_guard_trips(0.0, 0.55, 0.46, 5.0, 0.99));
    }

    /// Scenario: a small residual mirror position at or below `min_size`, even with a
    /// box sum over the limit.
    /// Expected: the guard does not trip — too small to be worth blocking the buy over.
    #[test]
    fn test_box_sum_guard_does_not_trip_on_dust_mirror_position() {
        assert!(!box_sum_guard_trips(5.0, 0.60, 0.45, 5.0, 0.99));
    }

    /// Scenario: no existing order on this token at all.
    /// Expected: cancel-replace always submits (nothing to keep).
    #[test]
    fn test_should_cancel_existing_true_when_nothing_resting() {
        assert!(should_cancel_existing(0.0, 0.0, 0.42, 20.0, 0.001, 0.1));
    }

    /// Scenario: existing order matches the new order within both thresholds.
    /// Expected: no cancel — the existing order is left alone.
    #[test]
    fn test_should_cancel_existing_false_when_close_enough() {
        assert!(!should_cancel_existing(0.420, 20.0, 0.4205, 20.5, 0.001, 0.1));
    }

    /// Scenario: price has moved more than the threshold.
    /// Expected: cancel-replace triggers.
    #[test]
    fn test_should_cancel_existing_true_on_price_drift() {
        assert!(should_cancel_existing(0.40, 20.0, 0.42, 20.0, 0.001, 0.1));
    }
}
