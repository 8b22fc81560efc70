use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use common::{
    Candle, Config, EvaluatorConfig, FeedMode, MarketDataSource, MarketPayload, PairEvaluator,
    ProducerKind, Result, SymbolEvaluator, Timeframe, WatchlistConfig,
};
use dispatch::{Consumer, ConsumerTarget};
use feed::{ProducersManager, RoutingTable, RoutingTarget};
use sim::SimulatedSource;

/// Candles of history kept ahead of the replay window.
const HISTORY_WINDOW: usize = 30;
/// Candles replayed per (symbol, timeframe) series in the demo source.
const REPLAY_CANDLES: usize = 240;

/// Demo pair evaluator: tracks the momentum of the latest candle and logs
/// every evaluation pass.
struct LoggingEvaluator {
    symbol: String,
    timeframe: Timeframe,
    backtesting: bool,
    momentum: Mutex<f64>,
}

impl LoggingEvaluator {
    fn new(symbol: &str, timeframe: Timeframe, backtesting: bool) -> Self {
        Self {
            symbol: symbol.to_string(),
            timeframe,
            backtesting,
            momentum: Mutex::new(0.0),
        }
    }

    fn momentum(&self) -> f64 {
        *self.momentum.lock().unwrap()
    }
}

#[async_trait]
impl PairEvaluator for LoggingEvaluator {
    fn config(&self) -> EvaluatorConfig {
        EvaluatorConfig {
            backtesting: self.backtesting,
        }
    }

    async fn set_data(&self, payload: MarketPayload) {
        if let MarketPayload::Candles(batch) = payload {
            if let Some(candle) = batch.latest() {
                *self.momentum.lock().unwrap() = candle.close - candle.open;
            }
        }
    }

    async fn eval(&self, trigger: ProducerKind) -> Result<()> {
        debug!(
            symbol = %self.symbol,
            timeframe = %self.timeframe,
            trigger = %trigger,
            momentum = self.momentum(),
            "evaluation pass"
        );
        Ok(())
    }
}

/// Demo symbol evaluator: averages the momentum of its pair evaluators.
struct LoggingSymbolEvaluator {
    symbol: String,
    pair_evaluators: Vec<Arc<LoggingEvaluator>>,
}

#[async_trait]
impl SymbolEvaluator for LoggingSymbolEvaluator {
    fn symbol(&self) -> &str {
        &self.symbol
    }

    async fn average_strategy_eval(&self, _source: &dyn MarketDataSource) -> f64 {
        if self.pair_evaluators.is_empty() {
            return 0.0;
        }
        let total: f64 = self.pair_evaluators.iter().map(|e| e.momentum()).sum();
        total / self.pair_evaluators.len() as f64
    }

    async fn finalize(&self, _source: &dyn MarketDataSource) -> Result<()> {
        info!(symbol = %self.symbol, "symbol signals consolidated");
        Ok(())
    }
}

/// Deterministic synthetic price series for the demo replay.
fn synth_candles(seed: f64, timeframe: Timeframe, count: usize) -> Vec<Candle> {
    let step = timeframe.duration_secs() as i64;
    (0..count)
        .map(|i| {
            let t = i as f64;
            let base = 100.0 * (1.0 + seed);
            let open = base + 5.0 * ((t - 1.0) * 0.15 + seed).sin();
            let close = base + 5.0 * (t * 0.15 + seed).sin();
            Candle {
                open_time: i as i64 * step,
                open,
                high: open.max(close) + 0.5,
                low: open.min(close) - 0.5,
                close,
                volume: 10.0 + (t * 0.3).cos().abs(),
            }
        })
        .collect()
}

#[tokio::main]
async fn main() {
    // ── Logging ──────────────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .init();

    // ── Config ────────────────────────────────────────────────────────────────
    let cfg = Config::from_env();
    info!(mode = %cfg.mode, "feedbot starting");
    let watchlist = WatchlistConfig::load(&cfg.watchlist_path);

    // ── Simulated data source ─────────────────────────────────────────────────
    let mut source = SimulatedSource::new(HISTORY_WINDOW);
    for (index, entry) in watchlist.entries.iter().enumerate() {
        for timeframe in &entry.timeframes {
            source.add_series(
                &entry.symbol,
                *timeframe,
                synth_candles(index as f64, *timeframe, HISTORY_WINDOW + REPLAY_CANDLES),
            );
        }
    }
    let source: Arc<dyn MarketDataSource> = Arc::new(source);

    // ── Evaluators, consumers, routing ────────────────────────────────────────
    let backtesting = cfg.mode == FeedMode::Backtest;
    let mut routing = RoutingTable::new();
    let mut symbol_evaluators: Vec<Arc<dyn SymbolEvaluator>> = Vec::new();
    for entry in &watchlist.entries {
        let mut pair_evaluators = Vec::new();
        for timeframe in &entry.timeframes {
            let evaluator = Arc::new(LoggingEvaluator::new(&entry.symbol, *timeframe, backtesting));
            let (consumer, handle) = Consumer::new(ConsumerTarget::Evaluator(evaluator.clone()));
            tokio::spawn(consumer.run());
            routing.insert(RoutingTarget {
                symbol: entry.symbol.clone(),
                timeframe: *timeframe,
                evaluator: evaluator.clone(),
                consumer: handle,
            });
            pair_evaluators.push(evaluator);
        }
        symbol_evaluators.push(Arc::new(LoggingSymbolEvaluator {
            symbol: entry.symbol.clone(),
            pair_evaluators,
        }));
    }

    // ── Producers ─────────────────────────────────────────────────────────────
    let mut manager = ProducersManager::new(
        source,
        routing,
        symbol_evaluators,
        Duration::from_secs(cfg.poll_interval_secs),
    );
    manager.start_all().await;

    // Run until interrupted, or until the scheduler finishes the replay.
    let scheduler_stop = manager
        .stop_handle(ProducerKind::Ohlcv)
        .expect("scheduler is always registered");
    let mut scheduler_done = scheduler_stop.subscribe();
    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("shutdown signal received"),
        _ = scheduler_done.changed() => info!("scheduler finished"),
    }

    manager.stop_all();
    manager.join_all().await;
    info!("feedbot stopped");
}
