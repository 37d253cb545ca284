//! Market-data WebSocket consumer: `book`, `price_change`, and `last_trade_price`
//! events, routed into the shared order-book registry, triggering a scheduled pass for
//! the owning market on every update. Reconnect/backoff/ping/select! shape grounded on
//! `examples/mufund-nitro-fig/src/feeds/polymarket.rs`; event semantics (full
//! snapshot vs. incremental batch) grounded on
//! `original_source/trading_bot/order_books.py`'s `process_book_data`/
//! `process_price_change`.

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
use crate::types::{MarketDataEvent, TokenId};

/// Runs forever, reconnecting with exponential backoff capped at 10s, matching
/// `feeds/polymarket.rs`. `on_update` schedules a trading pass for the market that owns
/// the updated token; it is the same shape `TaskScheduler::schedule` expects so callers
/// can pass it directly.
pub async fn run<F, Fut>(
    ws_url: &str,
    token_ids: &[TokenId],
    token_to_market: Arc<HashMap<TokenId, String>>,
    registry: Arc<Mutex<OrderBookRegistry>>,
    scheduler: Arc<TaskScheduler>,
    state: Arc<EngineState>,
    on_update: F,
) where
    F: Fn(String) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = Result<(), String>> + Send + 'static,
{
    let mut backoff_ms: u64 = 1000;

    loop {
        eprintln!("[MD] connecting to {ws_url}");
        let ws = match connect_async(ws_url).await {
            Ok((ws, _)) => {
                eprintln!("[MD] connected");
                backoff_ms = 1000;
                ws
            }
            Err(e) => {
                eprintln!("[MD] connection failed: {e}, retrying in {backoff_ms}ms");
                tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                backoff_ms = (backoff_ms * 2).min(10_000);
                continue;
            }
        };

        let (mut write, mut read) = ws.split();

        let sub = serde_json::json!({
            "assets_ids": token_ids,
            "type": "market",
        });
        if let Err(e) = write.send(Message::Text(sub.to_string())).await {
            eprintln!("[MD] subscribe failed: {e}, reconnecting");
            continue;
        }
        eprintln!("[MD] subscribed to {} tokens", token_ids.len());

        let mut ping_interval = tokio::time::interval(Duration::from_secs(10));

        loop {
            tokio::select! {
                msg = read.next() => {
                    let msg = match msg {
                        Some(Ok(m)) => m,
                        Some(Err(e)) => {
                            eprintln!("[MD] ws error: {e}, reconnecting");
                            break;
                        }
                        None => {
                            eprintln!("[MD] stream ended, reconnecting");
                            break;
                        }
                    };

                    if let Message::Text(text) = msg {
                        handle_message(
                            &text,
                            &token_to_market,
                            &registry,
                            &scheduler,
                            &state,
                            &on_update,
                        )
                        .await;
                    }
                }
                _ = ping_interval.tick() => {
                    let _ = write.send(Message::Ping(vec![])).await;
                }
            }
        }

        eprintln!("[MD] disconnected, reconnecting in {backoff_ms}ms");
        tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
        backoff_ms = (backoff_ms * 2).min(10_000);
    }
}

async fn handle_message<F, Fut>(
    text: &str,
    token_to_market: &Arc<HashMap<TokenId, String>>,
    registry: &Arc<Mutex<OrderBookRegistry>>,
    scheduler: &Arc<TaskScheduler>,
    state: &Arc<EngineState>,
    on_update: &F,
) where
    F: Fn(String) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = Result<(), String>> + Send + 'static,
{
    let events: Vec<MarketDataEvent> = match serde_json::from_str::<Vec<MarketDataEvent>>(text) {
        Ok(v) => v,
        Err(_) => match serde_json::from_str::<MarketDataEvent>(text) {
            Ok(single) => vec![single],
            Err(e) => {
                eprintln!("[MD] failed to parse event: {e}");
                return;
            }
        },
    };

    for event in events {
        let asset_id = match &event {
            MarketDataEvent::Book { asset_id, .. } => asset_id.clone(),
            MarketDataEvent::PriceChange { asset_id, .. } => asset_id.clone(),
            MarketDataEvent::LastTradePrice { asset_id, .. } => asset_id.clone(),
        };

        match &event {
            MarketDataEvent::Book { bids, asks, .. } => {
                let bids: Vec<(f64, f64)> = bids.iter().map(|l| (l.price, l.size)).collect();
                let asks: Vec<(f64, f64)> = asks.iter().map(|l| (l.price, l.size)).collect();
                let mut reg = registry.lock().unwrap();
                reg.process_book_snapshot(&asset_id, &bids, &asks);
            }
            MarketDataEvent::PriceChange { price_changes, .. } => {
                let mut reg = registry.lock().unwrap();
                for change in price_changes {
                    reg.apply_price_change(&change.asset_id, change.book_side(), change.price, change.size);
                }
            }
            MarketDataEvent::LastTradePrice { price, .. } => {
                eprintln!("[MD] last_trade_price asset={asset_id} price={price}");
                continue;
            }
        }

        if let Some(market) = token_to_market.get(&asset_id) {
            scheduler.schedule(market, state, on_update.clone());
        }
    }
}
