//! Data model shared across the order book, pricing, engine, and ingest modules.

use serde::{Deserialize, Serialize};

/// One of the two complementary outcome tokens in a binary market.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Outcome {
    Token1,
    Token2,
}

impl Outcome {
    pub fn other(self) -> Outcome {
        match self {
            Outcome::Token1 => Outcome::Token2,
            Outcome::Token2 => Outcome::Token1,
        }
    }
}

/// Buy or sell, as used for both order books and user orders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn opposite(self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

/// A token ID, as handed to us by the market-universe selection process. Kept as a
/// `String` rather than a numeric type since the exchange treats them as opaque strings.
pub type TokenId = String;

/// A market's per-market tunable parameters, as produced by market-universe selection
/// (out of scope for this crate) and consumed here. Mirrors the `row` dict in the
/// source: a flat bag of fields the pricing and engine layers read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Market {
    pub condition_id: String,
    pub token1: TokenId,
    pub token2: TokenId,
    pub neg_risk: bool,
    pub tick_size: f64,
    pub min_size: f64,
    pub trade_size: f64,
    pub max_size: Option<f64>,
    pub best_bid: f64,
    pub best_ask: f64,
    pub max_spread: f64,
    pub rewards_daily_rate: f64,
    pub volatility_1h: f64,
    pub volatility_3h: f64,
    pub volatility_24h: f64,
    pub volatility_7d: f64,
    pub volatility_sum: f64,
    pub order_arrival_rate_sensitivity: f64,
    pub market_order_imbalance: f64,
    pub depth_bids: f64,
    pub depth_asks: f64,
    pub avg_trades_per_hour: f64,
    pub avg_trade_size: f64,
    pub question: String,
    pub answer1: String,
    pub answer2: String,
}

impl Market {
    /// Token ID of the complementary outcome for the given token, or `None` if `token`
    /// is neither of this market's two outcomes.
    pub fn mirror_of(&self, token: &str) -> Option<&TokenId> {
        if token == self.token1 {
            Some(&self.token2)
        } else if token == self.token2 {
            Some(&self.token1)
        } else {
            None
        }
    }

    pub fn outcome_of(&self, token: &str) -> Option<Outcome> {
        if token == self.token1 {
            Some(Outcome::Token1)
        } else if token == self.token2 {
            Some(Outcome::Token2)
        } else {
            None
        }
    }

    /// `row.get('max_size', trade_size)`, matching `ans_strategy.py`.
    pub fn effective_max_size(&self) -> f64 {
        self.max_size.unwrap_or(self.trade_size)
    }
}

/// A price expressed as an integer count of the market's ticks. Keeping book-map keys
/// as exact integers avoids float-equality bugs in the bid/ask ladders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Ticks(pub i64);

impl Ticks {
    pub fn from_price(price: f64, tick_size: f64) -> Ticks {
        Ticks((price / tick_size).round() as i64)
    }

    pub fn to_price(self, tick_size: f64) -> f64 {
        self.0 as f64 * tick_size
    }

    /// The tick representing `1 - price` for the given `tick_size`, i.e. the mirror
    /// reflection used by the complementary order book.
    pub fn mirror(self, tick_size: f64) -> Ticks {
        let total = (1.0 / tick_size).round() as i64;
        Ticks(total - self.0)
    }
}

/// `{size, avgPrice}` per token.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Position {
    /// Signed: negative means net sold (short). The engine trades only the long side in
    /// practice, so `size >= 0` is the normal case.
    pub size: f64,
    pub avg_price: f64,
}

impl Position {
    /// Apply a signed trade of `qty` (positive = buy, negative = sell) at `price`.
    /// On additive buys, blends `avg_price`; on sells, `avg_price` is preserved.
    pub fn apply_trade(&mut self, qty: f64, price: f64) {
        if qty > 0.0 {
            if self.size == 0.0 {
                self.avg_price = price;
            } else {
                self.avg_price = (self.avg_price * self.size + price * qty) / (self.size + qty);
            }
        }
        // qty < 0 (sell) or qty == 0: avg_price unchanged.
        self.size += qty;
    }
}

/// A single resting order this agent has on one side of one token's book.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct UserOrder {
    pub price: f64,
    pub size: f64,
}

/// One row of the exchange's raw open-orders response, before any per-token/side
/// collapsing. Kept separate from `UserOrder` so callers can detect duplicate same-side
/// orders, which the exchange otherwise allows but this agent never intentionally
/// places.
#[derive(Debug, Clone)]
pub struct RawOrder {
    pub asset_id: TokenId,
    pub side: Side,
    pub price: f64,
    pub size: f64,
}

/// The buy/sell pair of resting orders this agent has on a token.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct UserOrders {
    pub buy: UserOrder,
    pub sell: UserOrder,
}

impl UserOrders {
    pub fn get(&self, side: Side) -> UserOrder {
        match side {
            Side::Buy => self.buy,
            Side::Sell => self.sell,
        }
    }

    pub fn set(&mut self, side: Side, order: UserOrder) {
        match side {
            Side::Buy => self.buy = order,
            Side::Sell => self.sell = order,
        }
    }
}

/// Market-data WebSocket event.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum MarketDataEvent {
    Book {
        market: String,
        asset_id: TokenId,
        bids: Vec<BookLevel>,
        asks: Vec<BookLevel>,
    },
    PriceChange {
        market: String,
        asset_id: TokenId,
        price_changes: Vec<PriceChangeEntry>,
    },
    LastTradePrice {
        market: String,
        asset_id: TokenId,
        price: f64,
        timestamp: i64,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub struct BookLevel {
    pub price: f64,
    pub size: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PriceChangeEntry {
    pub asset_id: TokenId,
    /// "BUY" -> bids ladder, "SELL" -> asks ladder.
    pub side: String,
    pub price: f64,
    pub size: f64,
}

impl PriceChangeEntry {
    pub fn book_side(&self) -> BookSide {
        if self.side.eq_ignore_ascii_case("BUY") {
            BookSide::Bids
        } else {
            BookSide::Asks
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookSide {
    Bids,
    Asks,
}

/// Lifecycle status of a user trade event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeStatus {
    Failed,
    Matched,
    Confirmed,
    Mined,
}

/// User-data WebSocket event: either a trade fill or an order lifecycle update.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum UserDataEvent {
    Trade(TradeEvent),
    Order(OrderEvent),
}

/// User-stream trade event.
#[derive(Debug, Clone, Deserialize)]
pub struct TradeEvent {
    pub market: String,
    pub id: String,
    pub asset_id: TokenId,
    pub side: String,
    pub outcome: String,
    pub size: f64,
    pub price: f64,
    pub status: TradeStatus,
    #[serde(default)]
    pub maker_orders: Vec<MakerOrder>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MakerOrder {
    pub maker_address: String,
    pub matched_amount: f64,
    pub price: f64,
    pub outcome: String,
}

/// User-stream order lifecycle event type (PLACEMENT/UPDATE/CANCELLATION).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderEventType {
    Placement,
    Update,
    Cancellation,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrderEvent {
    pub market: String,
    pub id: String,
    pub asset_id: TokenId,
    pub side: String,
    #[serde(rename = "type")]
    pub kind: OrderEventType,
    pub original_size: f64,
    pub size_matched: f64,
    pub price: f64,
}

/// Outcome of a `create_order` call to the exchange client.
#[derive(Debug, Clone)]
pub struct CreateOrderResponse {
    pub success: bool,
    pub order_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Scenario: an all-new long position is opened with a single buy.
    /// Expected: avg_price becomes the fill price, size becomes the fill qty.
    #[test]
    fn test_position_apply_trade_from_flat() {
        let mut pos = Position::default();
        pos.apply_trade(10.0, 0.40);
        assert_eq!(pos.size, 10.0);
        assert_eq!(pos.avg_price, 0.40);
    }

    /// Scenario: adding to an existing long position at a different price.
    /// Expected: avg_price blends by size-weighted average, matching `set_position`.
    #[test]
    fn test_position_apply_trade_blends_on_buy() {
        let mut pos = Position { size: 10.0, avg_price: 0.40 };
        pos.apply_trade(10.0, 0.60);
        assert_eq!(pos.size, 20.0);
        assert!((pos.avg_price - 0.50).abs() < 1e-9);
    }

    /// Scenario: selling out of an existing position.
    /// Expected: avg_price is preserved even though size shrinks.
    #[test]
    fn test_position_apply_trade_preserves_avg_on_sell() {
        let mut pos = Position { size: 20.0, avg_price: 0.50 };
        pos.apply_trade(-5.0, 0.70);
        assert_eq!(pos.size, 15.0);
        assert_eq!(pos.avg_price, 0.50);
    }

    /// Scenario: reflecting a tick at a 0.001 grid.
    /// Expected: mirror(0.40) == 0.60, matching `round(1-p, 3)` in the source.
    #[test]
    fn test_ticks_mirror_standard_grid() {
        let tick_size = 0.001;
        let t = Ticks::from_price(0.40, tick_size);
        let mirrored = t.mirror(tick_size).to_price(tick_size);
        assert!((mirrored - 0.60).abs() < 1e-9);
    }

    /// Scenario: a market with a coarser 0.01 tick grid.
    /// Expected: mirroring still reflects about 0.5 using that market's own resolution.
    #[test]
    fn test_ticks_mirror_coarse_grid() {
        let tick_size = 0.01;
        let t = Ticks::from_price(0.42, tick_size);
        let mirrored = t.mirror(tick_size).to_price(tick_size);
        assert!((mirrored - 0.58).abs() < 1e-9);
    }
}
