//! Periodic reconciliation tasks: pull authoritative position/order/liquidity state
//! from the exchange on a timer, and prune stale in-memory bookkeeping. Grounded on
//! `original_source/trading_bot/data_utils.py`'s `update_positions`/`update_liquidity`/
//! `update_orders`/`clear_all_orders`, run on the cadence from `configuration.py`.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use crate::book::OrderBookRegistry;
use crate::config::Config;
use crate::gateway::exchange::ExchangeClient;
use crate::state::EngineState;
use crate::types::{RawOrder, Side, TokenId};

/// Startup sweep: cancel every resting order left over from a previous run, then pull a
/// fresh view of positions and liquidity. Grounded on `clear_all_orders` +
/// `update_positions(avgOnly=False)` + `update_liquidity`, both run once before trading
/// begins.
pub async fn startup_reconcile(
    exchange: &ExchangeClient,
    state: &EngineState,
    registry: &std::sync::Mutex<OrderBookRegistry>,
) -> Result<(), String> {
    let open_orders = exchange.get_all_orders().await?;
    if open_orders.is_empty() {
        eprintln!("[RECONCILE] no existing orders to clear");
    } else {
        let assets: HashSet<&str> = open_orders.iter().map(|o| o.asset_id.as_str()).collect();
        eprintln!("[RECONCILE] clearing {} existing order books on startup", assets.len());
        for asset_id in assets {
            if let Err(e) = exchange.cancel_all_asset(asset_id).await {
                eprintln!("[RECONCILE] failed to clear orders for asset {asset_id}: {e}");
            }
        }
    }

    let positions = exchange.get_all_positions().await?;
    for (token, position) in &positions {
        state.reconcile_position_full(token, position.size, position.avg_price);
    }

    sync_local_orders(exchange, registry).await?;

    let liquidity = exchange.get_usdc_balance().await?;
    state.set_liquidity(liquidity);
    eprintln!("[RECONCILE] startup: {} positions, liquidity={liquidity:.2}", positions.len());
    Ok(())
}

/// Group raw orders by `(token, side)` and flag every token with more than one order
/// resting on the same side, matching `update_orders`'s `if len(curr) > 1` duplicate
/// check. Split out from `sync_local_orders` so the grouping/detection logic is
/// testable without a live exchange.
fn group_and_flag_duplicates(
    orders: Vec<RawOrder>,
) -> (HashMap<(TokenId, Side), Vec<RawOrder>>, HashSet<TokenId>) {
    let mut by_token_side: HashMap<(TokenId, Side), Vec<RawOrder>> = HashMap::new();
    for order in orders {
        by_token_side.entry((order.asset_id.clone(), order.side)).or_default().push(order);
    }
    let duplicated_tokens = by_token_side
        .iter()
        .filter(|(_, orders)| orders.len() > 1)
        .map(|((token, _side), _)| token.clone())
        .collect();
    (by_token_side, duplicated_tokens)
}

/// Pull the exchange's view of this agent's own resting orders into the local
/// registry, matching `update_orders`'s "cancel and reset if duplicate orders exist on
/// one side" defensive behavior: if the server ever shows more than one order on the
/// same (token, side) — which should not happen given this agent's own order hygiene,
/// but the exchange does not prevent it — cancel everything resting on that token and
/// treat the local view as flat rather than guess which duplicate is authoritative.
async fn sync_local_orders(exchange: &ExchangeClient, registry: &std::sync::Mutex<OrderBookRegistry>) -> Result<(), String> {
    let all_orders = exchange.get_all_orders().await?;
    let (by_token_side, duplicated_tokens) = group_and_flag_duplicates(all_orders);

    for token in &duplicated_tokens {
        eprintln!("[RECONCILE] duplicate same-side orders for asset {token}, cancelling and resetting to zero");
        if let Err(e) = exchange.cancel_all_asset(token).await {
            eprintln!("[RECONCILE] failed to clear duplicate orders for asset {token}: {e}");
        }
    }

    let mut reg = registry.lock().unwrap();
    apply_orders_to_registry(&mut reg, by_token_side, &duplicated_tokens);
    Ok(())
}

/// Write grouped orders into the local registry: tokens with a same-side duplicate are
/// reset to zero on both sides rather than guessing which duplicate is authoritative;
/// everything else is recorded as its single resting order.
fn apply_orders_to_registry(
    reg: &mut OrderBookRegistry,
    by_token_side: HashMap<(TokenId, Side), Vec<RawOrder>>,
    duplicated_tokens: &HashSet<TokenId>,
) {
    for ((token, side), orders) in by_token_side {
        if !duplicated_tokens.contains(&token) {
            if let Some(order) = orders.into_iter().next() {
                reg.set_local_order(&token, side, order.price, order.size);
            }
        }
    }
    for token in duplicated_tokens {
        reg.set_local_order(token, Side::Buy, 0.0, 0.0);
        reg.set_local_order(token, Side::Sell, 0.0, 0.0);
    }
}

/// Runs forever on `config.position_update_interval_secs`, reconciling positions
/// avg-price-only (size is left to the websocket fills unless quiet long enough —
/// `EngineState::reconcile_position_avg_only` carries that logic) and liquidity.
pub async fn run_position_reconciler(exchange: Arc<ExchangeClient>, state: Arc<EngineState>, config: Arc<Config>) {
    let mut interval = tokio::time::interval(Duration::from_secs(config.position_update_interval_secs));
    let min_quiet = Duration::from_secs(5);
    loop {
        interval.tick().await;
        match exchange.get_all_positions().await {
            Ok(positions) => {
                for (token, position) in positions {
                    state.reconcile_position_avg_only(&token, position.size, position.avg_price, min_quiet);
                }
            }
            Err(e) => eprintln!("[RECONCILE] position refresh failed: {e}"),
        }
        match exchange.get_usdc_balance().await {
            Ok(liquidity) => state.set_liquidity(liquidity),
            Err(e) => eprintln!("[RECONCILE] liquidity refresh failed: {e}"),
        }
    }
}

/// Runs forever on `config.stale_trade_timeout_secs`, dropping performing-set entries
/// old enough that they're presumed to have settled (or failed) without a terminal
/// websocket event ever arriving (`STALE_TRADE_TIMEOUT`).
pub async fn run_performing_pruner(state: Arc<EngineState>, config: Arc<Config>) {
    let max_age = Duration::from_secs(config.stale_trade_timeout_secs.max(0) as u64);
    let mut interval = tokio::time::interval(Duration::from_secs(5));
    loop {
        interval.tick().await;
        state.prune_stale_performing(max_age);
    }
}
