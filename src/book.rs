//! Per-token order book ladders plus the synthesized mirror for the complementary
//! token. Grounded on `original_source/trading_bot/order_books.py` (mirror-sync
//! mechanics, self-exclusion subtraction) and `original_source/poly_utils/market_utils.py`
//! (hybrid level/percentage windowing for imbalance and depth).

use std::collections::BTreeMap;

use crate::types::{BookSide, Side, TokenId, Ticks, UserOrders};

/// One token's bid/ask ladders, quantized to that market's tick grid. Bids are keyed
/// descending (best bid = max key), asks ascending (best ask = min key); `BTreeMap`
/// gives us that ordering for free, standing in for the source's `SortedDict`.
#[derive(Debug, Clone, Default)]
pub struct OrderBook {
    pub bids: BTreeMap<Ticks, f64>,
    pub asks: BTreeMap<Ticks, f64>,
    pub orders: UserOrders,
}

impl OrderBook {
    pub fn best_bid(&self) -> Option<(Ticks, f64)> {
        self.bids.iter().next_back().map(|(&p, &s)| (p, s))
    }

    pub fn best_ask(&self) -> Option<(Ticks, f64)> {
        self.asks.iter().next().map(|(&p, &s)| (p, s))
    }
}

/// Registry owning every token's `OrderBook`, plus the mirror relationship between
/// complementary tokens. The registry owns all
/// books and each book only needs its complement's token ID, not a reference to it —
/// avoiding the cyclic-ownership problem the source's bidirectional dict update has.
#[derive(Debug, Clone, Default)]
pub struct OrderBookRegistry {
    books: std::collections::HashMap<TokenId, OrderBook>,
    /// token -> its complementary token, populated once the pair is known.
    mirrors: std::collections::HashMap<TokenId, TokenId>,
    tick_sizes: std::collections::HashMap<TokenId, f64>,
}

impl OrderBookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a token's tick size and its complement. Must be called (e.g. from
    /// market discovery ingestion) before book events for the token arrive.
    pub fn register_pair(&mut self, token_a: &str, token_b: &str, tick_size: f64) {
        self.mirrors.insert(token_a.to_string(), token_b.to_string());
        self.mirrors.insert(token_b.to_string(), token_a.to_string());
        self.tick_sizes.insert(token_a.to_string(), tick_size);
        self.tick_sizes.insert(token_b.to_string(), tick_size);
        self.books.entry(token_a.to_string()).or_default();
        self.books.entry(token_b.to_string()).or_default();
    }

    pub fn book(&self, token: &str) -> Option<&OrderBook> {
        self.books.get(token)
    }

    pub fn mirror_of(&self, token: &str) -> Option<&TokenId> {
        self.mirrors.get(token)
    }

    fn tick_size(&self, token: &str) -> f64 {
        self.tick_sizes.get(token).copied().unwrap_or(0.001)
    }

    /// Replace a token's ladders from a full snapshot, then sync the mirror.
    pub fn process_book_snapshot(&mut self, token: &str, bids: &[(f64, f64)], asks: &[(f64, f64)]) {
        let tick_size = self.tick_size(token);
        let book = self.books.entry(token.to_string()).or_default();
        book.bids.clear();
        book.asks.clear();
        for &(price, size) in bids {
            book.bids.insert(Ticks::from_price(price, tick_size), size);
        }
        for &(price, size) in asks {
            book.asks.insert(Ticks::from_price(price, tick_size), size);
        }
        self.sync_mirror(token);
    }

    /// Apply one incremental price-change level, then sync the mirror. `size == 0`
    /// removes the level.
    pub fn apply_price_change(&mut self, token: &str, side: BookSide, price: f64, size: f64) {
        let tick_size = self.tick_size(token);
        let tick = Ticks::from_price(price, tick_size);
        let book = self.books.entry(token.to_string()).or_default();
        let ladder = match side {
            BookSide::Bids => &mut book.bids,
            BookSide::Asks => &mut book.asks,
        };
        if size <= 0.0 {
            ladder.remove(&tick);
        } else {
            ladder.insert(tick, size);
        }
        self.sync_mirror(token);
    }

    /// Rebuild the complementary token's ladders as the price-reflection of `token`'s:
    /// `mirror.bids[1-p] = token.asks[p]` and `mirror.asks[1-p] = token.bids[p]`.
    fn sync_mirror(&mut self, token: &str) {
        let Some(mirror_token) = self.mirrors.get(token).cloned() else {
            return;
        };
        let tick_size = self.tick_size(token);
        let (new_bids, new_asks) = {
            let book = self.books.entry(token.to_string()).or_default();
            let new_bids: BTreeMap<Ticks, f64> = book
                .asks
                .iter()
                .map(|(&p, &s)| (p.mirror(tick_size), s))
                .collect();
            let new_asks: BTreeMap<Ticks, f64> = book
                .bids
                .iter()
                .map(|(&p, &s)| (p.mirror(tick_size), s))
                .collect();
            (new_bids, new_asks)
        };
        let mirror_book = self.books.entry(mirror_token).or_default();
        mirror_book.bids = new_bids;
        mirror_book.asks = new_asks;
    }

    /// Set this agent's own resting order for `(token, side)`. Also updates the
    /// mirror's orders with the side flipped (a buy on token is a sell on its
    /// complement), matching `set_order`'s reverse-token propagation.
    pub fn set_local_order(&mut self, token: &str, side: Side, price: f64, size: f64) {
        let order = crate::types::UserOrder { price, size };
        if let Some(book) = self.books.get_mut(token) {
            book.orders.set(side, order);
        }
        if let Some(mirror_token) = self.mirrors.get(token).cloned() {
            if let Some(mirror_book) = self.books.get_mut(&mirror_token) {
                mirror_book.orders.set(side.opposite(), order);
            }
        }
    }

    pub fn get_local_order(&self, token: &str, side: Side) -> crate::types::UserOrder {
        self.books
            .get(token)
            .map(|b| b.orders.get(side))
            .unwrap_or_default()
    }

    /// Bid/ask ladders for `token` with this agent's own orders subtracted out: own
    /// `buy.size` comes off the bid level at `buy.price`, own `sell.size` off the ask
    /// level at `sell.price`. Levels at or below zero are dropped. This is the only
    /// view the pricing layer ever consumes.
    pub fn view_excluding_self(&self, token: &str) -> (BTreeMap<Ticks, f64>, BTreeMap<Ticks, f64>) {
        let Some(book) = self.books.get(token) else {
            return (BTreeMap::new(), BTreeMap::new());
        };
        let tick_size = self.tick_size(token);
        let mut bids = book.bids.clone();
        let mut asks = book.asks.clone();

        let buy = book.orders.buy;
        if buy.size > 0.0 {
            let buy_tick = Ticks::from_price(buy.price, tick_size);
            if let Some(existing) = bids.get(&buy_tick).copied() {
                let remaining = existing - buy.size;
                if remaining <= 0.0 {
                    bids.remove(&buy_tick);
                } else {
                    bids.insert(buy_tick, remaining);
                }
            }
        }
        let sell = book.orders.sell;
        if sell.size > 0.0 {
            let sell_tick = Ticks::from_price(sell.price, tick_size);
            if let Some(existing) = asks.get(&sell_tick).copied() {
                let remaining = existing - sell.size;
                if remaining <= 0.0 {
                    asks.remove(&sell_tick);
                } else {
                    asks.insert(sell_tick, remaining);
                }
            }
        }
        (bids, asks)
    }

    /// Order-book imbalance in `[-1, 1]`; positive means more bid pressure. Uses the
    /// hybrid level/percentage window: `LEVELS` levels on each side of mid, intersected
    /// with a percentage half-width of `PCT/2` around mid. Errors (e.g. no usable
    /// window) return the neutral value `0.0`.
    pub fn imbalance(&self, token: &str, levels: usize, pct: f64) -> f64 {
        let Some(book) = self.books.get(token) else {
            return 0.0;
        };
        let tick_size = self.tick_size(token);
        let (bids, asks) = self.view_excluding_self(token);
        let mid = midpoint(&bids, &asks, tick_size);

        let half_width = mid.min(1.0 - mid) * pct / 2.0;
        let lo = mid - half_width;
        let hi = mid + half_width;

        let bid_sum = windowed_sum(&bids, tick_size, levels, lo, hi, true, &book.bids);
        let ask_sum = windowed_sum(&asks, tick_size, levels, lo, hi, false, &book.asks);

        let total = bid_sum + ask_sum;
        if total <= 0.0 {
            0.0
        } else {
            (bid_sum - ask_sum) / total
        }
    }

    /// `(depth_bids, depth_asks)`: summed size within the hybrid window, one-sided from
    /// mid outward (bids capped at mid, asks floored at mid), using the full `PCT`
    /// half-width (not halved, unlike `imbalance`). Errors return `(0.0, 0.0)`.
    pub fn depth(&self, token: &str, levels: usize, pct: f64) -> (f64, f64) {
        let Some(book) = self.books.get(token) else {
            return (0.0, 0.0);
        };
        let tick_size = self.tick_size(token);
        let (bids, asks) = self.view_excluding_self(token);
        let mid = midpoint(&bids, &asks, tick_size);

        let half_width = mid.min(1.0 - mid) * pct;
        let bid_lo = mid - half_width;
        let ask_hi = mid + half_width;

        let depth_bids = windowed_sum(&bids, tick_size, levels, bid_lo, mid, true, &book.bids);
        let depth_asks = windowed_sum(&asks, tick_size, levels, mid, ask_hi, false, &book.asks);
        (depth_bids, depth_asks)
    }
}

/// `(best_bid + best_ask) / 2`, defaulting the missing side to the book's edge (0 for
/// bids, 1 for asks) if that side is empty, matching `_get_order_book_dataframes`.
fn midpoint(bids: &BTreeMap<Ticks, f64>, asks: &BTreeMap<Ticks, f64>, tick_size: f64) -> f64 {
    let best_bid = bids.keys().next_back().map(|t| t.to_price(tick_size)).unwrap_or(0.0);
    let best_ask = asks.keys().next().map(|t| t.to_price(tick_size)).unwrap_or(1.0);
    (best_bid + best_ask) / 2.0
}

/// Sum sizes in `ladder` whose price falls within `[lo, hi]`, additionally capped to
/// at most `levels` entries counted from the side nearest mid (the "level window"),
/// defaulting to `mid` itself (an empty contribution) when the ladder is empty.
#[allow(clippy::too_many_arguments)]
fn windowed_sum(
    ladder: &BTreeMap<Ticks, f64>,
    tick_size: f64,
    levels: usize,
    lo: f64,
    hi: f64,
    is_bids: bool,
    _full_ladder_for_level_default: &BTreeMap<Ticks, f64>,
) -> f64 {
    if ladder.is_empty() {
        return 0.0;
    }
    let iter: Box<dyn Iterator<Item = (&Ticks, &f64)>> = if is_bids {
        Box::new(ladder.iter().rev())
    } else {
        Box::new(ladder.iter())
    };
    iter.take(levels)
        .map(|(&t, &s)| (t.to_price(tick_size), s))
        .filter(|&(price, _)| price >= lo && price <= hi)
        .map(|(_, size)| size)
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry_with_pair() -> OrderBookRegistry {
        let mut reg = OrderBookRegistry::new();
        reg.register_pair("T1", "T2", 0.001);
        reg
    }

    /// Scenario: feed a full snapshot for T1.
    /// Expected: T2's bids/asks are exactly the price-reflected mirror of T1's asks/bids.
    #[test]
    fn test_mirror_snapshot_scenario() {
        let mut reg = registry_with_pair();
        reg.process_book_snapshot(
            "T1",
            &[(0.40, 100.0), (0.39, 50.0)],
            &[(0.42, 80.0)],
        );
        let t2 = reg.book("T2").unwrap();
        let bids: Vec<(f64, f64)> = t2.bids.iter().map(|(&t, &s)| (t.to_price(0.001), s)).collect();
        let asks: Vec<(f64, f64)> = t2.asks.iter().map(|(&t, &s)| (t.to_price(0.001), s)).collect();
        assert_eq!(bids, vec![(0.58, 80.0)]);
        assert_eq!(asks, vec![(0.60, 100.0), (0.61, 50.0)]);
    }

    /// Scenario: an incremental price-change removes a level via size=0.
    /// Expected: the level disappears from both the token's own book and the mirror.
    #[test]
    fn test_price_change_removes_level_and_resyncs_mirror() {
        let mut reg = registry_with_pair();
        reg.process_book_snapshot("T1", &[(0.40, 100.0)], &[(0.42, 80.0)]);
        reg.apply_price_change("T1", BookSide::Bids, 0.40, 0.0);
        assert!(reg.book("T1").unwrap().bids.is_empty());
        assert!(reg.book("T2").unwrap().asks.is_empty());
    }

    /// Scenario: this agent has a resting buy at a price matching a visible bid level.
    /// Expected: `view_excluding_self` subtracts the own-order size from that level.
    #[test]
    fn test_view_excluding_self_subtracts_own_buy() {
        let mut reg = registry_with_pair();
        reg.process_book_snapshot("T1", &[(0.40, 100.0)], &[(0.42, 80.0)]);
        reg.set_local_order("T1", Side::Buy, 0.40, 30.0);
        let (bids, _) = reg.view_excluding_self("T1");
        let size = bids.get(&Ticks::from_price(0.40, 0.001)).copied().unwrap();
        assert_eq!(size, 70.0);
    }

    /// Scenario: this agent's own order size equals or exceeds the visible level.
    /// Expected: the level is removed entirely rather than going to zero or negative.
    #[test]
    fn test_view_excluding_self_removes_level_when_own_order_covers_it() {
        let mut reg = registry_with_pair();
        reg.process_book_snapshot("T1", &[(0.40, 20.0)], &[(0.42, 80.0)]);
        reg.set_local_order("T1", Side::Buy, 0.40, 30.0);
        let (bids, _) = reg.view_excluding_self("T1");
        assert!(bids.get(&Ticks::from_price(0.40, 0.001)).is_none());
    }

    /// Scenario: setting a buy on T1 also sets a sell on T2 at the same price, per the
    /// reverse-token order propagation in `set_order`.
    /// Expected: T2's resting sell order mirrors T1's buy.
    #[test]
    fn test_set_local_order_propagates_to_mirror_with_side_flip() {
        let mut reg = registry_with_pair();
        reg.register_pair("T1", "T2", 0.001);
        reg.set_local_order("T1", Side::Buy, 0.40, 25.0);
        let t2_sell = reg.get_local_order("T2", Side::Sell);
        assert_eq!(t2_sell.price, 0.40);
        assert_eq!(t2_sell.size, 25.0);
    }

    /// Scenario: a perfectly balanced book around mid.
    /// Expected: imbalance is 0 (neutral).
    #[test]
    fn test_imbalance_balanced_book_is_neutral() {
        let mut reg = registry_with_pair();
        reg.process_book_snapshot(
            "T1",
            &[(0.49, 100.0)],
            &[(0.51, 100.0)],
        );
        let imb = reg.imbalance("T1", 10, 0.6);
        assert!(imb.abs() < 1e-9);
    }

    /// Scenario: an entirely empty book.
    /// Expected: imbalance and depth both return their neutral defaults, not an error.
    #[test]
    fn test_empty_book_returns_neutral_imbalance_and_depth() {
        let reg = registry_with_pair();
        assert_eq!(reg.imbalance("T1", 10, 0.6), 0.0);
        assert_eq!(reg.depth("T1", 10, 0.6), (0.0, 0.0));
    }

    /// Scenario: bid-heavy book.
    /// Expected: imbalance is positive (more bid pressure).
    #[test]
    fn test_imbalance_bid_heavy_is_positive() {
        let mut reg = registry_with_pair();
        reg.process_book_snapshot("T1", &[(0.49, 200.0)], &[(0.51, 50.0)]);
        let imb = reg.imbalance("T1", 10, 0.6);
        assert!(imb > 0.0);
    }
}
