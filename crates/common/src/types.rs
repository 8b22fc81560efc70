use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::timeframe::Timeframe;

/// One aggregated price/volume data point for a symbol over a timeframe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    /// Open time of the candle, epoch seconds.
    pub open_time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// A window of recent candles for one (symbol, timeframe) pair, handed to
/// evaluators by value. The scheduler never interprets its contents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandleBatch {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub candles: Vec<Candle>,
}

impl CandleBatch {
    pub fn latest(&self) -> Option<&Candle> {
        self.candles.last()
    }
}

/// Best bid/ask snapshot for a symbol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ticker {
    pub symbol: String,
    pub bid: f64,
    pub ask: f64,
    pub last: f64,
    pub timestamp: DateTime<Utc>,
}

/// Aggregated order book levels, best price first on both sides.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderBookSnapshot {
    pub symbol: String,
    /// (price, quantity) levels.
    pub bids: Vec<(f64, f64)>,
    pub asks: Vec<(f64, f64)>,
    pub timestamp: DateTime<Utc>,
}

/// A single public trade.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub symbol: String,
    pub price: f64,
    pub quantity: f64,
    pub timestamp: DateTime<Utc>,
}

/// Lifecycle state of an order tracked by the source's order simulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderState {
    Pending,
    Filled,
    Cancelled,
}

/// Status of one order as reported by the exchange collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderUpdate {
    pub id: String,
    pub symbol: String,
    pub state: OrderState,
    pub filled_quantity: f64,
    pub timestamp: DateTime<Utc>,
}

/// Per-asset account balance.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct AssetBalance {
    pub free: f64,
    pub locked: f64,
}

/// Account balance snapshot, keyed by asset.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Balance {
    pub assets: HashMap<String, AssetBalance>,
}

/// Identity of a concrete producer. Doubles as the trigger tag consumers
/// receive, so a notified evaluator knows what woke it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProducerKind {
    Ohlcv,
    OrderBook,
    Ticker,
    RecentTrades,
    Orders,
    Balance,
}

impl std::fmt::Display for ProducerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProducerKind::Ohlcv => write!(f, "ohlcv"),
            ProducerKind::OrderBook => write!(f, "order_book"),
            ProducerKind::Ticker => write!(f, "ticker"),
            ProducerKind::RecentTrades => write!(f, "recent_trades"),
            ProducerKind::Orders => write!(f, "orders"),
            ProducerKind::Balance => write!(f, "balance"),
        }
    }
}

/// Typed payload union covering every concrete producer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum MarketPayload {
    Candles(CandleBatch),
    Ticker(Ticker),
    OrderBook(OrderBookSnapshot),
    Trades(Vec<Trade>),
    Orders(Vec<OrderUpdate>),
    Balance(Balance),
}

impl MarketPayload {
    pub fn kind(&self) -> ProducerKind {
        match self {
            MarketPayload::Candles(_) => ProducerKind::Ohlcv,
            MarketPayload::Ticker(_) => ProducerKind::Ticker,
            MarketPayload::OrderBook(_) => ProducerKind::OrderBook,
            MarketPayload::Trades(_) => ProducerKind::RecentTrades,
            MarketPayload::Orders(_) => ProducerKind::Orders,
            MarketPayload::Balance(_) => ProducerKind::Balance,
        }
    }
}

/// The token carried on consumer queues: either fresh market data or a
/// bare trigger naming the producer that caused the wake-up.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum FeedItem {
    Data(MarketPayload),
    Trigger(ProducerKind),
}

/// Whether the feed runs against live wall-clock polling or a simulated
/// replay clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedMode {
    Live,
    Backtest,
}

impl std::fmt::Display for FeedMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FeedMode::Live => write!(f, "live"),
            FeedMode::Backtest => write!(f, "backtest"),
        }
    }
}
