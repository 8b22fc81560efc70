use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use common::{
    Balance, Candle, CandleBatch, Error, MarketDataSource, OrderBookSnapshot, OrderState,
    OrderUpdate, Result, Ticker, Timeframe, Trade,
};

/// Half-spread applied around the replayed close when synthesizing
/// tickers and order book levels.
const SYNTHETIC_SPREAD: f64 = 0.0005;

type PairKey = (Timeframe, String);

/// Simulated market-data source replaying preloaded candle series under a
/// simulated clock.
///
/// Each (timeframe, symbol) series has a cursor; a candle fetch returns
/// the window ending at the cursor and advances it. The finest timeframe
/// of a symbol drives its simulated time: coarser frames only become due
/// once enough fine-grained candles have been consumed, and a fetch past
/// the end of the finest series yields the backtesting-ended condition
/// for that symbol.
///
/// Safe for concurrent use: the refresh scheduler fans a whole cycle of
/// fetches out against one instance.
pub struct SimulatedSource {
    /// Candles returned per fetch when the caller passes no limit.
    window: usize,
    series: HashMap<PairKey, Vec<Candle>>,
    pairs: Vec<String>,
    /// Finest monitored timeframe per symbol; drives that symbol's clock.
    finest: HashMap<String, Timeframe>,
    cursors: RwLock<HashMap<PairKey, usize>>,
    ended: RwLock<HashSet<String>>,
    orders: RwLock<Vec<OrderUpdate>>,
    balance: Balance,
}

impl SimulatedSource {
    pub fn new(window: usize) -> Self {
        Self {
            window,
            series: HashMap::new(),
            pairs: Vec::new(),
            finest: HashMap::new(),
            cursors: RwLock::new(HashMap::new()),
            ended: RwLock::new(HashSet::new()),
            orders: RwLock::new(Vec::new()),
            balance: Balance::default(),
        }
    }

    pub fn with_balance(mut self, balance: Balance) -> Self {
        self.balance = balance;
        self
    }

    /// Preload one candle series. Series shorter than the window have
    /// nothing to replay and end immediately.
    pub fn add_series(&mut self, symbol: &str, timeframe: Timeframe, candles: Vec<Candle>) {
        let key = (timeframe, symbol.to_string());
        self.cursors
            .get_mut()
            .insert(key.clone(), self.window.min(candles.len()));
        self.series.insert(key, candles);

        if !self.pairs.iter().any(|p| p == symbol) {
            self.pairs.push(symbol.to_string());
        }
        self.finest
            .entry(symbol.to_string())
            .and_modify(|current| {
                if timeframe < *current {
                    *current = timeframe;
                }
            })
            .or_insert(timeframe);
    }

    /// Record an order for the simulated ledger; it stays pending until a
    /// forced status pass fills it.
    pub async fn push_order(&self, order: OrderUpdate) {
        self.orders.write().await.push(order);
    }

    /// Simulated elapsed minutes for a symbol: consumed candles of its
    /// finest timeframe.
    async fn sim_time_minutes(&self, symbol: &str) -> u64 {
        let Some(finest) = self.finest.get(symbol) else {
            return 0;
        };
        let cursors = self.cursors.read().await;
        let cursor = cursors
            .get(&(*finest, symbol.to_string()))
            .copied()
            .unwrap_or(0);
        cursor as u64 * finest.minutes()
    }

    /// Close of the most recently replayed candle on the symbol's finest
    /// timeframe.
    async fn last_close(&self, symbol: &str) -> Result<f64> {
        let finest = self
            .finest
            .get(symbol)
            .ok_or_else(|| Error::Source(format!("unknown symbol '{symbol}'")))?;
        let key = (*finest, symbol.to_string());
        let cursors = self.cursors.read().await;
        let cursor = cursors.get(&key).copied().unwrap_or(0);
        let candles = &self.series[&key];
        candles
            .get(cursor.saturating_sub(1).min(candles.len().saturating_sub(1)))
            .map(|c| c.close)
            .ok_or_else(|| Error::Source(format!("no candles replayed yet for '{symbol}'")))
    }
}

#[async_trait]
impl MarketDataSource for SimulatedSource {
    fn traded_pairs(&self) -> Vec<String> {
        self.pairs.clone()
    }

    async fn latest_candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: Option<usize>,
    ) -> Result<CandleBatch> {
        let key = (timeframe, symbol.to_string());
        let candles = self
            .series
            .get(&key)
            .ok_or_else(|| Error::Source(format!("no series for {symbol} {timeframe}")))?;

        let mut cursors = self.cursors.write().await;
        let cursor = cursors.entry(key.clone()).or_insert(0);
        if *cursor >= candles.len() {
            return Err(Error::BacktestingEnded {
                symbol: symbol.to_string(),
            });
        }
        *cursor += 1;

        let take = limit.unwrap_or(self.window);
        let window = candles[cursor.saturating_sub(take)..*cursor].to_vec();
        Ok(CandleBatch {
            symbol: symbol.to_string(),
            timeframe,
            candles: window,
        })
    }

    async fn ticker(&self, symbol: &str) -> Result<Ticker> {
        let last = self.last_close(symbol).await?;
        Ok(Ticker {
            symbol: symbol.to_string(),
            bid: last * (1.0 - SYNTHETIC_SPREAD),
            ask: last * (1.0 + SYNTHETIC_SPREAD),
            last,
            timestamp: Utc::now(),
        })
    }

    async fn order_book(&self, symbol: &str, depth: usize) -> Result<OrderBookSnapshot> {
        let last = self.last_close(symbol).await?;
        let mut bids = Vec::with_capacity(depth);
        let mut asks = Vec::with_capacity(depth);
        for level in 0..depth {
            let offset = SYNTHETIC_SPREAD * (level + 1) as f64;
            bids.push((last * (1.0 - offset), 1.0));
            asks.push((last * (1.0 + offset), 1.0));
        }
        Ok(OrderBookSnapshot {
            symbol: symbol.to_string(),
            bids,
            asks,
            timestamp: Utc::now(),
        })
    }

    async fn recent_trades(&self, symbol: &str) -> Result<Vec<Trade>> {
        let last = self.last_close(symbol).await?;
        Ok(vec![Trade {
            symbol: symbol.to_string(),
            price: last,
            quantity: 1.0,
            timestamp: Utc::now(),
        }])
    }

    async fn open_orders(&self, symbol: &str) -> Result<Vec<OrderUpdate>> {
        Ok(self
            .orders
            .read()
            .await
            .iter()
            .filter(|o| o.symbol == symbol && o.state == OrderState::Pending)
            .cloned()
            .collect())
    }

    async fn balance(&self) -> Result<Balance> {
        Ok(self.balance.clone())
    }

    async fn should_update(&self, timeframe: Timeframe, symbol: &str) -> bool {
        if self.ended.read().await.contains(symbol) {
            return false;
        }
        let Some(finest) = self.finest.get(symbol) else {
            return false;
        };
        // The finest frame always advances (its fetch reports exhaustion);
        // coarser frames wait until simulated time catches up.
        if timeframe == *finest {
            return true;
        }
        let key = (timeframe, symbol.to_string());
        let Some(candles) = self.series.get(&key) else {
            return false;
        };
        let cursor = self
            .cursors
            .read()
            .await
            .get(&key)
            .copied()
            .unwrap_or(0);
        cursor < candles.len()
            && (cursor as u64 + 1) * timeframe.minutes() <= self.sim_time_minutes(symbol).await
    }

    async fn init_historical_offset(
        &self,
        timeframes: &[Timeframe],
        symbol: &str,
    ) -> Result<()> {
        let mut cursors = self.cursors.write().await;
        for timeframe in timeframes {
            let key = (*timeframe, symbol.to_string());
            let Some(candles) = self.series.get(&key) else {
                return Err(Error::Source(format!(
                    "no series for {symbol} {timeframe}"
                )));
            };
            cursors.insert(key, self.window.min(candles.len()));
        }
        debug!(symbol = %symbol, "historical offset aligned");
        Ok(())
    }

    async fn end_backtesting(&self, symbol: &str) -> Result<()> {
        self.ended.write().await.insert(symbol.to_string());
        info!(symbol = %symbol, "backtesting closed out");
        Ok(())
    }

    async fn force_update_order_status(&self, simulated_time: bool) -> Result<()> {
        let mut orders = self.orders.write().await;
        for order in orders.iter_mut() {
            if order.state == OrderState::Pending {
                order.state = OrderState::Filled;
                if !simulated_time {
                    order.timestamp = Utc::now();
                }
            }
        }
        Ok(())
    }
}
