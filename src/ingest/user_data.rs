//! User-data WebSocket consumer: `trade` fills and `order` lifecycle events.
//! Maker-detection and status-dispatch logic grounded on `original_source/trading_bot/
//! data_utils.py`'s trade-handling path; the position-blend and open-order accounting
//! formulas it calls down into are
//! grounded on `original_source/trading_bot/data_utils.py`'s `set_position`/
//! `update_orders`. Transport shape shared with `ingest::market_data`, grounded the
//! same way (`examples/mufund-nitro-fig/src/feeds/polymarket.rs`).

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use crate::book::OrderBookRegistry;
use crate::scheduler::TaskScheduler;
use crate::state::EngineState;
use crate::types::{OrderEvent, OrderEventType, Side, TradeEvent, TradeStatus, UserDataEvent};

pub async fn run<F, Fut>(
    ws_url: &str,
    agent_address: &str,
    registry: Arc<Mutex<OrderBookRegistry>>,
    state: Arc<EngineState>,
    scheduler: Arc<TaskScheduler>,
    on_update: F,
) where
    F: Fn(String) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = Result<(), String>> + Send + 'static,
{
    let mut backoff_ms: u64 = 1000;

    loop {
        eprintln!("[UD] connecting to {ws_url}");
        let ws = match connect_async(ws_url).await {
            Ok((ws, _)) => {
                eprintln!("[UD] connected");
                backoff_ms = 1000;
                ws
            }
            Err(e) => {
                eprintln!("[UD] connection failed: {e}, retrying in {backoff_ms}ms");
                tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                backoff_ms = (backoff_ms * 2).min(10_000);
                continue;
            }
        };

        let (mut write, mut read) = ws.split();

        let sub = serde_json::json!({ "type": "user" });
        if let Err(e) = write.send(Message::Text(sub.to_string())).await {
            eprintln!("[UD] subscribe failed: {e}, reconnecting");
            continue;
        }

        let mut ping_interval = tokio::time::interval(Duration::from_secs(10));

        loop {
            tokio::select! {
                msg = read.next() => {
                    let msg = match msg {
                        Some(Ok(m)) => m,
                        Some(Err(e)) => {
                            eprintln!("[UD] ws error: {e}, reconnecting");
                            break;
                        }
                        None => {
                            eprintln!("[UD] stream ended, reconnecting");
                            break;
                        }
                    };

                    if let Message::Text(text) = msg {
                        handle_message(&text, agent_address, &registry, &state, &scheduler, &on_update).await;
                    }
                }
                _ = ping_interval.tick() => {
                    let _ = write.send(Message::Ping(vec![])).await;
                }
            }
        }

        eprintln!("[UD] disconnected, reconnecting in {backoff_ms}ms");
        tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
        backoff_ms = (backoff_ms * 2).min(10_000);
    }
}

async fn handle_message<F, Fut>(
    text: &str,
    agent_address: &str,
    registry: &Arc<Mutex<OrderBookRegistry>>,
    state: &Arc<EngineState>,
    scheduler: &Arc<TaskScheduler>,
    on_update: &F,
) where
    F: Fn(String) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = Result<(), String>> + Send + 'static,
{
    let event: UserDataEvent = match serde_json::from_str(text) {
        Ok(e) => e,
        Err(e) => {
            eprintln!("[UD] failed to parse event: {e}");
            return;
        }
    };

    match event {
        UserDataEvent::Trade(trade) => handle_trade(trade, agent_address, registry, state, scheduler, on_update),
        UserDataEvent::Order(order) => handle_order(order, registry, state, scheduler, on_update),
    }
}

fn handle_trade<F, Fut>(
    trade: TradeEvent,
    agent_address: &str,
    registry: &Arc<Mutex<OrderBookRegistry>>,
    state: &Arc<EngineState>,
    scheduler: &Arc<TaskScheduler>,
    on_update: &F,
) where
    F: Fn(String) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = Result<(), String>> + Send + 'static,
{
    let mut side = if trade.side.eq_ignore_ascii_case("BUY") { Side::Buy } else { Side::Sell };
    let mut token = trade.asset_id.clone();
    let mut size = trade.size;
    let mut price = trade.price;

    if let Some(maker) = trade.maker_orders.iter().find(|m| m.maker_address.eq_ignore_ascii_case(agent_address)) {
        size = maker.matched_amount;
        price = maker.price;
        if maker.outcome == trade.outcome {
            side = side.opposite();
            let mirror = registry.lock().unwrap().mirror_of(&token).cloned();
            if let Some(mirror_token) = mirror {
                token = mirror_token;
            }
        }
    }

    match trade.status {
        TradeStatus::Failed => {
            eprintln!("[UD] trade {} FAILED, position reconcile will pick this up", trade.id);
        }
        TradeStatus::Matched => {
            state.performing_add(&token, side, &trade.id);
            state.set_position(&token, side, size, price);
            scheduler.schedule(&trade.market, state, on_update.clone());
        }
        TradeStatus::Confirmed => {
            state.performing_remove(&token, side, &trade.id);
            scheduler.schedule(&trade.market, state, on_update.clone());
        }
        TradeStatus::Mined => {
            state.performing_remove(&token, side, &trade.id);
        }
    }
}

fn handle_order<F, Fut>(
    order: OrderEvent,
    registry: &Arc<Mutex<OrderBookRegistry>>,
    state: &Arc<EngineState>,
    scheduler: &Arc<TaskScheduler>,
    on_update: &F,
) where
    F: Fn(String) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = Result<(), String>> + Send + 'static,
{
    let side = if order.side.eq_ignore_ascii_case("BUY") { Side::Buy } else { Side::Sell };
    let mut reg = registry.lock().unwrap();
    let current = reg.get_local_order(&order.asset_id, side);

    let open_size = match order.kind {
        OrderEventType::Placement => current.size + order.original_size,
        OrderEventType::Update => current.size - order.size_matched,
        OrderEventType::Cancellation => current.size - order.original_size,
    }
    .max(0.0);

    reg.set_local_order(&order.asset_id, side, order.price, open_size);
    drop(reg);

    state.remove_in_flight(&order.market, &order.id);

    if order.kind == OrderEventType::Update {
        scheduler.schedule(&order.market, state, on_update.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{MakerOrder, TradeEvent};

    fn base_trade(status: TradeStatus) -> TradeEvent {
        TradeEvent {
            market: "m1".into(),
            id: "trade-1".into(),
            asset_id: "T1".into(),
            side: "BUY".into(),
            outcome: "Yes".into(),
            size: 10.0,
            price: 0.40,
            status,
            maker_orders: vec![],
        }
    }

    /// Scenario: a MATCHED trade where the agent is not the maker.
    /// Expected: the top-level size/price is applied directly and the trade ID is
    /// recorded as performing.
    #[test]
    fn test_handle_trade_matched_taker_applies_top_level_fields() {
        let registry = Arc::new(Mutex::new(OrderBookRegistry::new()));
        let state = Arc::new(EngineState::new());
        let scheduler = Arc::new(TaskScheduler::new());
        let trade = base_trade(TradeStatus::Matched);

        handle_trade(trade, "0xagent", &registry, &state, &scheduler, &|_m: String| async { Ok(()) });

        let pos = state.get_position("T1");
        assert_eq!(pos.size, 10.0);
        assert_eq!(pos.avg_price, 0.40);
    }

    /// Scenario: a MATCHED trade where the agent is the maker and the maker's outcome
    /// matches the trade's top-level outcome.
    /// Expected: side inverts and the position lands on the mirror token, per the
    /// maker-detection rule: a maker who took the same outcome as the trade's
    /// top-level outcome was actually on the complementary side.
    #[test]
    fn test_handle_trade_matched_maker_with_matching_outcome_inverts_and_remaps() {
        let registry = Arc::new(Mutex::new(OrderBookRegistry::new()));
        registry.lock().unwrap().register_pair("T1", "T2", 0.001);
        let state = Arc::new(EngineState::new());
        let scheduler = Arc::new(TaskScheduler::new());

        let mut trade = base_trade(TradeStatus::Matched);
        trade.maker_orders.push(MakerOrder {
            maker_address: "0xagent".into(),
            matched_amount: 5.0,
            price: 0.35,
            outcome: "Yes".into(),
        });

        handle_trade(trade, "0xagent", &registry, &state, &scheduler, &|_m: String| async { Ok(()) });

        let mirror_pos = state.get_position("T2");
        assert_eq!(mirror_pos.size, -5.0); // side inverted BUY -> SELL
        let original_pos = state.get_position("T1");
        assert_eq!(original_pos.size, 0.0);
    }

    /// Scenario: a CANCELLATION that would drive `open_size` negative.
    /// Expected: the stored size clamps at zero.
    #[test]
    fn test_handle_order_cancellation_clamps_at_zero() {
        let registry = Arc::new(Mutex::new(OrderBookRegistry::new()));
        registry.lock().unwrap().register_pair("T1", "T2", 0.001);
        let state = Arc::new(EngineState::new());
        let scheduler = Arc::new(TaskScheduler::new());

        let order = OrderEvent {
            market: "m1".into(),
            id: "order-1".into(),
            asset_id: "T1".into(),
            side: "BUY".into(),
            kind: OrderEventType::Cancellation,
            original_size: 50.0,
            size_matched: 0.0,
            price: 0.40,
        };

        handle_order(order, &registry, &state, &scheduler, &|_m: String| async { Ok(()) });

        let stored = registry.lock().unwrap().get_local_order("T1", Side::Buy);
        assert_eq!(stored.size, 0.0);
    }
}
