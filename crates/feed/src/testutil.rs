//! Shared in-crate test doubles for the scheduler, poller, and manager
//! tests.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;

use common::{
    Balance, Candle, CandleBatch, Error, EvaluatorConfig, MarketDataSource, MarketPayload,
    OrderBookSnapshot, OrderUpdate, PairEvaluator, ProducerKind, Result, SymbolEvaluator,
    Ticker, Timeframe, Trade,
};

/// Scriptable market-data source: per-pair failure injection, per-symbol
/// replay exhaustion, call counting.
pub struct MockSource {
    pairs: Vec<String>,
    fail_pairs: HashSet<(Timeframe, String)>,
    /// Successful fetches allowed per symbol before the replay ends.
    end_after: HashMap<String, usize>,
    fetches: Mutex<HashMap<(Timeframe, String), usize>>,
    ended: Mutex<HashSet<String>>,
    offsets: Mutex<Vec<String>>,
    order_status_calls: Mutex<usize>,
}

impl MockSource {
    pub fn new(pairs: &[&str]) -> Self {
        Self {
            pairs: pairs.iter().map(|s| s.to_string()).collect(),
            fail_pairs: HashSet::new(),
            end_after: HashMap::new(),
            fetches: Mutex::new(HashMap::new()),
            ended: Mutex::new(HashSet::new()),
            offsets: Mutex::new(Vec::new()),
            order_status_calls: Mutex::new(0),
        }
    }

    /// Every candle fetch for this pair fails with a source error.
    pub fn failing_pair(mut self, timeframe: Timeframe, symbol: &str) -> Self {
        self.fail_pairs.insert((timeframe, symbol.to_string()));
        self
    }

    /// The symbol's replay signals backtesting-ended after `fetches`
    /// successful candle fetches per timeframe.
    pub fn ending_after(mut self, symbol: &str, fetches: usize) -> Self {
        self.end_after.insert(symbol.to_string(), fetches);
        self
    }

    /// Total candle fetch attempts for the pair, failed ones included.
    pub fn fetch_count(&self, timeframe: Timeframe, symbol: &str) -> usize {
        self.fetches
            .lock()
            .unwrap()
            .get(&(timeframe, symbol.to_string()))
            .copied()
            .unwrap_or(0)
    }

    pub fn ended_symbols(&self) -> HashSet<String> {
        self.ended.lock().unwrap().clone()
    }

    pub fn offset_initialized(&self) -> Vec<String> {
        self.offsets.lock().unwrap().clone()
    }

    pub fn order_status_calls(&self) -> usize {
        *self.order_status_calls.lock().unwrap()
    }
}

#[async_trait]
impl MarketDataSource for MockSource {
    fn traded_pairs(&self) -> Vec<String> {
        self.pairs.clone()
    }

    async fn latest_candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        _limit: Option<usize>,
    ) -> Result<CandleBatch> {
        if self.fail_pairs.contains(&(timeframe, symbol.to_string())) {
            return Err(Error::Source(format!(
                "injected failure for {symbol} {timeframe}"
            )));
        }

        let mut fetches = self.fetches.lock().unwrap();
        let calls = fetches.entry((timeframe, symbol.to_string())).or_insert(0);
        let exhausted = self
            .end_after
            .get(symbol)
            .is_some_and(|&limit| *calls >= limit);
        *calls += 1;
        if exhausted {
            return Err(Error::BacktestingEnded {
                symbol: symbol.to_string(),
            });
        }

        Ok(CandleBatch {
            symbol: symbol.to_string(),
            timeframe,
            candles: vec![Candle {
                open_time: *calls as i64,
                open: 100.0,
                high: 101.0,
                low: 99.0,
                close: 100.5,
                volume: 10.0,
            }],
        })
    }

    async fn ticker(&self, symbol: &str) -> Result<Ticker> {
        Ok(Ticker {
            symbol: symbol.to_string(),
            bid: 99.0,
            ask: 101.0,
            last: 100.0,
            timestamp: Utc::now(),
        })
    }

    async fn order_book(&self, symbol: &str, depth: usize) -> Result<OrderBookSnapshot> {
        Ok(OrderBookSnapshot {
            symbol: symbol.to_string(),
            bids: vec![(99.0, 1.0); depth.min(1)],
            asks: vec![(101.0, 1.0); depth.min(1)],
            timestamp: Utc::now(),
        })
    }

    async fn recent_trades(&self, symbol: &str) -> Result<Vec<Trade>> {
        Ok(vec![Trade {
            symbol: symbol.to_string(),
            price: 100.0,
            quantity: 0.5,
            timestamp: Utc::now(),
        }])
    }

    async fn open_orders(&self, _symbol: &str) -> Result<Vec<OrderUpdate>> {
        Ok(Vec::new())
    }

    async fn balance(&self) -> Result<Balance> {
        Ok(Balance::default())
    }

    async fn should_update(&self, _timeframe: Timeframe, symbol: &str) -> bool {
        !self.ended.lock().unwrap().contains(symbol)
    }

    async fn init_historical_offset(
        &self,
        _timeframes: &[Timeframe],
        symbol: &str,
    ) -> Result<()> {
        self.offsets.lock().unwrap().push(symbol.to_string());
        Ok(())
    }

    async fn end_backtesting(&self, symbol: &str) -> Result<()> {
        self.ended.lock().unwrap().insert(symbol.to_string());
        Ok(())
    }

    async fn force_update_order_status(&self, _simulated_time: bool) -> Result<()> {
        *self.order_status_calls.lock().unwrap() += 1;
        Ok(())
    }
}

/// Pair evaluator that records everything it is handed.
pub struct RecordingPairEvaluator {
    backtesting: bool,
    payloads: Mutex<Vec<MarketPayload>>,
    triggers: Mutex<Vec<ProducerKind>>,
}

impl RecordingPairEvaluator {
    pub fn new(backtesting: bool) -> Self {
        Self {
            backtesting,
            payloads: Mutex::new(Vec::new()),
            triggers: Mutex::new(Vec::new()),
        }
    }

    pub fn payloads(&self) -> usize {
        self.payloads.lock().unwrap().len()
    }

    pub fn triggers(&self) -> Vec<ProducerKind> {
        self.triggers.lock().unwrap().clone()
    }
}

#[async_trait]
impl PairEvaluator for RecordingPairEvaluator {
    fn config(&self) -> EvaluatorConfig {
        EvaluatorConfig {
            backtesting: self.backtesting,
        }
    }

    async fn set_data(&self, payload: MarketPayload) {
        self.payloads.lock().unwrap().push(payload);
    }

    async fn eval(&self, trigger: ProducerKind) -> Result<()> {
        self.triggers.lock().unwrap().push(trigger);
        Ok(())
    }
}

/// Symbol evaluator with a fixed score that appends itself to a shared
/// list when finalized, so tests can assert the finalize order.
pub struct RecordingSymbolEvaluator {
    symbol: String,
    score: f64,
    finalize_order: Arc<Mutex<Vec<String>>>,
}

impl RecordingSymbolEvaluator {
    pub fn new(symbol: &str, score: f64, finalize_order: Arc<Mutex<Vec<String>>>) -> Self {
        Self {
            symbol: symbol.to_string(),
            score,
            finalize_order,
        }
    }
}

#[async_trait]
impl SymbolEvaluator for RecordingSymbolEvaluator {
    fn symbol(&self) -> &str {
        &self.symbol
    }

    async fn average_strategy_eval(&self, _source: &dyn MarketDataSource) -> f64 {
        self.score
    }

    async fn finalize(&self, _source: &dyn MarketDataSource) -> Result<()> {
        self.finalize_order.lock().unwrap().push(self.symbol.clone());
        Ok(())
    }
}
