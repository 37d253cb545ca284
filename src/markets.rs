//! The tradable set: markets currently selected for quoting, plus any market this
//! agent still holds a position in even after it drops out of selection. Grounded on
//! `original_source/trading_bot/market_manager.py`'s `update_markets`/
//! `update_markets_with_positions` — market *selection* itself (the sheet-backed
//! filter/ranking) is out of scope, so this loads a flat JSON list of candidate
//! markets from disk, the same stand-in pattern `config::OverrideTable` uses for the
//! feature-flag service.

use std::collections::{HashMap, HashSet};

use crate::book::OrderBookRegistry;
use crate::state::EngineState;
use crate::types::Market;

/// Every market ever seen from the source file, plus which of those are currently
/// selected. A market that drops out of selection is kept in `known` so a held
/// position still has the row data (tick size, tokens, question) needed to trade it
/// down; `tradable` computes the union against current positions.
pub struct MarketSet {
    file_path: String,
    known: HashMap<String, Market>,
    selected_ids: HashSet<String>,
}

impl MarketSet {
    /// Load (or reload) from `file_path`: a JSON array of [`Market`] rows. A missing or
    /// unparseable file is not fatal — it just means no market is currently selected,
    /// matching `update_markets`'s "no rows received, leave state untouched" branch.
    pub fn load(file_path: impl Into<String>) -> Self {
        let file_path = file_path.into();
        let mut set = MarketSet { file_path, known: HashMap::new(), selected_ids: HashSet::new() };
        set.refresh();
        set
    }

    /// Re-read the source file and update the selected set. Markets no longer present
    /// in the file simply fall out of `selected_ids`; their `known` entry is kept so a
    /// held position can still be traded down via `tradable`.
    pub fn refresh(&mut self) {
        let rows: Vec<Market> = match std::fs::read_to_string(&self.file_path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(rows) => rows,
                Err(e) => {
                    eprintln!("[MARKETS] failed to parse {}: {e}, keeping previous selection", self.file_path);
                    return;
                }
            },
            Err(_) => {
                eprintln!("[MARKETS] no market source file at {}, selected set is empty", self.file_path);
                Vec::new()
            }
        };

        self.selected_ids = rows.iter().map(|m| m.condition_id.clone()).collect();
        for market in rows {
            self.known.insert(market.condition_id.clone(), market);
        }
        eprintln!("[MARKETS] refreshed: {} selected, {} known total", self.selected_ids.len(), self.known.len());
    }

    pub fn is_selected(&self, condition_id: &str) -> bool {
        self.selected_ids.contains(condition_id)
    }

    /// Register every known market's token pair with the order-book registry so mirror
    /// bookkeeping works even for a market that isn't currently selected.
    pub fn register_all_pairs(&self, registry: &std::sync::Mutex<OrderBookRegistry>) {
        let mut reg = registry.lock().unwrap();
        for market in self.known.values() {
            reg.register_pair(&market.token1, &market.token2, market.tick_size);
        }
    }

    pub fn token_to_market_map(&self) -> HashMap<String, String> {
        let mut map = HashMap::new();
        for market in self.known.values() {
            map.insert(market.token1.clone(), market.condition_id.clone());
            map.insert(market.token2.clone(), market.condition_id.clone());
        }
        map
    }

    pub fn all_token_ids(&self) -> Vec<String> {
        self.known.values().flat_map(|m| [m.token1.clone(), m.token2.clone()]).collect()
    }

    /// `(market, held_but_not_selected)` pairs to run a trading pass over: every
    /// selected market, plus any known-but-unselected market where this agent still
    /// holds a non-zero position in either token (`update_markets_with_positions`).
    pub fn tradable<'a>(&'a self, state: &EngineState) -> Vec<(&'a Market, bool)> {
        self.known
            .values()
            .filter_map(|market| {
                if self.selected_ids.contains(&market.condition_id) {
                    Some((market, false))
                } else {
                    let held = state.get_position(&market.token1).size > 0.0 || state.get_position(&market.token2).size > 0.0;
                    held.then_some((market, true))
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Side;

    fn sample_json() -> &'static str {
        r#"[{"condition_id":"0xabc","token1":"T1","token2":"T2","neg_risk":false,"tick_size":0.001,"min_size":5.0,"trade_size":20.0,"max_size":null,"best_bid":0.4,"best_ask":0.42,"max_spread":0.05,"rewards_daily_rate":0.0,"volatility_1h":1.0,"volatility_3h":2.0,"volatility_24h":3.0,"volatility_7d":4.0,"volatility_sum":10.0,"order_arrival_rate_sensitivity":5.0,"market_order_imbalance":0.0,"depth_bids":1000.0,"depth_asks":1000.0,"avg_trades_per_hour":2.0,"avg_trade_size":50.0,"question":"Will it happen?","answer1":"Yes","answer2":"No"}]"#
    }

    /// Scenario: a market present in the source file.
    /// Expected: it shows up in `tradable` as selected (not held-but-not-selected).
    #[test]
    fn test_tradable_includes_selected_market() {
        let dir = std::env::temp_dir().join(format!("poly-maker-markets-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("markets.json");
        std::fs::write(&path, sample_json()).unwrap();

        let set = MarketSet::load(path.to_str().unwrap());
        let state = EngineState::new();
        let tradable = set.tradable(&state);
        assert_eq!(tradable.len(), 1);
        assert_eq!(tradable[0].0.condition_id, "0xabc");
        assert!(!tradable[0].1);
        std::fs::remove_dir_all(&dir).ok();
    }

    /// Scenario: a market drops out of the source file's selection but this agent
    /// still holds a position in one of its tokens.
    /// Expected: it stays tradable, flagged as held-but-not-selected.
    #[test]
    fn test_tradable_keeps_held_position_after_deselection() {
        let dir = std::env::temp_dir().join(format!("poly-maker-markets-test-held-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("markets.json");
        std::fs::write(&path, sample_json()).unwrap();

        let mut set = MarketSet::load(path.to_str().unwrap());
        let state = EngineState::new();
        state.set_position("T1", Side::Buy, 10.0, 0.40);

        std::fs::write(&path, "[]").unwrap();
        set.refresh();

        let tradable = set.tradable(&state);
        assert_eq!(tradable.len(), 1);
        assert!(tradable[0].1);
        std::fs::remove_dir_all(&dir).ok();
    }

    /// Scenario: a market is neither selected nor held.
    /// Expected: it is excluded from `tradable` entirely.
    #[test]
    fn test_tradable_excludes_unselected_unheld_market() {
        let dir = std::env::temp_dir().join(format!("poly-maker-markets-test-excl-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("markets.json");
        std::fs::write(&path, "[]").unwrap();

        let set = MarketSet::load(path.to_str().unwrap());
        let state = EngineState::new();
        assert!(set.tradable(&state).is_empty());
        std::fs::remove_dir_all(&dir).ok();
    }
}
