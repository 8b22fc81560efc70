use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use futures_util::future;
use tracing::{error, info, warn};

use common::{
    timeframe, Error, FeedItem, MarketDataSource, MarketPayload, ProducerKind, Result,
    SymbolEvaluator, Timeframe,
};
use dispatch::{FanOut, Producer};

use crate::routing::RoutingTable;

/// Upper bound on how often the scheduler wakes: a cycle that finishes
/// early sleeps out the remainder of this interval.
pub const MAX_CYCLE_SLEEP: Duration = Duration::from_secs(2);

/// Lifecycle of the refresh scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SchedulerState {
    #[default]
    Uninitialized,
    Ready,
    Running,
    Stopping,
    Stopped,
}

impl std::fmt::Display for SchedulerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SchedulerState::Uninitialized => write!(f, "uninitialized"),
            SchedulerState::Ready => write!(f, "ready"),
            SchedulerState::Running => write!(f, "running"),
            SchedulerState::Stopping => write!(f, "stopping"),
            SchedulerState::Stopped => write!(f, "stopped"),
        }
    }
}

/// Outcome of one per-pair refresh, applied to the bookkeeping maps by the
/// cycle after the barrier. Keeps the maps single-writer without locks.
enum RefreshOutcome {
    Refreshed {
        timeframe: Timeframe,
        symbol: String,
        completed_at: i64,
    },
    Skipped,
    Failed,
    Ended {
        symbol: String,
    },
}

/// The timeframe-driven refresh scheduler: decides, for every
/// (timeframe, symbol) pair, when to pull fresh candle data, issues the
/// pulls in parallel behind a join-all barrier, notifies the routed
/// consumer exactly once per refresh, and runs the per-symbol finalize
/// pass ordered by evaluation conviction.
///
/// In backtesting the elapsed-time due-check is bypassed entirely: the
/// data source's own `should_update` predicate governs cadence, and the
/// scheduler never sleeps.
pub struct OhlcvScheduler {
    source: Arc<dyn MarketDataSource>,
    fanout: FanOut,
    routing: RoutingTable,
    symbol_evaluators: Vec<Arc<dyn SymbolEvaluator>>,
    symbols: Vec<String>,
    timeframes: Vec<Timeframe>,
    /// Epoch seconds of the last successful refresh per pair. Live mode only.
    last_update: HashMap<Timeframe, HashMap<String, i64>>,
    /// Successful refreshes per pair. Diagnostic, monotonically increasing.
    refreshed_times: HashMap<Timeframe, HashMap<String, u64>>,
    /// Symbols whose replay has been closed out. Never refreshed again.
    ended_symbols: HashSet<String>,
    in_backtesting: bool,
    state: SchedulerState,
}

impl OhlcvScheduler {
    pub fn new(
        source: Arc<dyn MarketDataSource>,
        routing: RoutingTable,
        symbol_evaluators: Vec<Arc<dyn SymbolEvaluator>>,
    ) -> Self {
        Self {
            source,
            fanout: FanOut::new(),
            routing,
            symbol_evaluators,
            symbols: Vec::new(),
            timeframes: Vec::new(),
            last_update: HashMap::new(),
            refreshed_times: HashMap::new(),
            ended_symbols: HashSet::new(),
            in_backtesting: false,
            state: SchedulerState::Uninitialized,
        }
    }

    /// Current lifecycle state. `Stopping` is derived: the stop flag has
    /// been requested but the running cycle has not finished yet.
    pub fn state(&self) -> SchedulerState {
        if self.state == SchedulerState::Running && self.fanout.should_stop() {
            SchedulerState::Stopping
        } else {
            self.state
        }
    }

    pub fn in_backtesting(&self) -> bool {
        self.in_backtesting
    }

    /// Epoch seconds of the pair's last successful refresh, 0 if never.
    pub fn last_update_at(&self, timeframe: Timeframe, symbol: &str) -> i64 {
        self.last_update
            .get(&timeframe)
            .and_then(|per_symbol| per_symbol.get(symbol))
            .copied()
            .unwrap_or(0)
    }

    /// Number of successful refreshes for the pair since start.
    pub fn refresh_count(&self, timeframe: Timeframe, symbol: &str) -> u64 {
        self.refreshed_times
            .get(&timeframe)
            .and_then(|per_symbol| per_symbol.get(symbol))
            .copied()
            .unwrap_or(0)
    }

    /// Probe one representative routing target to learn whether this run
    /// replays historical data; if so, align the source's replay window
    /// for every monitored symbol once.
    async fn probe_backtesting(&self) -> Result<bool> {
        let timeframe = self.timeframes[0];
        let symbol = &self.symbols[0];
        let representative = self.routing.get(timeframe, symbol).ok_or_else(|| {
            Error::MissingRoute {
                symbol: symbol.clone(),
                timeframe,
            }
        })?;

        let enabled = representative.evaluator.config().backtesting;
        if enabled {
            for symbol in &self.symbols {
                self.source
                    .init_historical_offset(&self.timeframes, symbol)
                    .await?;
            }
        }
        Ok(enabled)
    }

    /// Pairs to refresh this cycle. Live mode applies the elapsed-time
    /// due-check; backtesting attempts every pair still replaying and
    /// lets the source's `should_update` predicate gate inside the
    /// refresh, since simulated time governs cadence there.
    fn due_pairs(&self, now: i64) -> Vec<(Timeframe, String)> {
        let mut due = Vec::new();
        for timeframe in &self.timeframes {
            for symbol in &self.symbols {
                if self.ended_symbols.contains(symbol) {
                    continue;
                }
                let is_due = self.in_backtesting
                    || now - self.last_update_at(*timeframe, symbol)
                        >= timeframe.duration_secs() as i64;
                if is_due {
                    due.push((*timeframe, symbol.clone()));
                }
            }
        }
        due
    }

    /// One full refresh cycle: due-check, parallel refreshes behind a
    /// join-all barrier, bookkeeping, finalize pass, simulated-order
    /// refresh when backtesting.
    async fn run_cycle(&mut self) -> Result<()> {
        let now = Utc::now().timestamp();
        let due = self.due_pairs(now);
        if due.is_empty() {
            return Ok(());
        }

        // One failure must not prevent the others from completing or
        // from being awaited: every refresh resolves to an outcome.
        let outcomes = future::join_all(
            due.iter()
                .map(|(timeframe, symbol)| self.refresh_pair(*timeframe, symbol)),
        )
        .await;
        self.apply_outcomes(outcomes).await;

        self.finalize_symbols().await;

        if self.in_backtesting {
            if let Err(e) = self.source.force_update_order_status(true).await {
                error!(error = %e, "simulated order status refresh failed");
            }
        }
        Ok(())
    }

    async fn refresh_pair(&self, timeframe: Timeframe, symbol: &str) -> RefreshOutcome {
        if self.in_backtesting {
            return self.refresh_backtesting_pair(timeframe, symbol).await;
        }
        match self.refresh_data(timeframe, symbol, None, true).await {
            Ok(()) => RefreshOutcome::Refreshed {
                timeframe,
                symbol: symbol.to_string(),
                completed_at: Utc::now().timestamp(),
            },
            Err(e) => {
                error!(
                    timeframe = %timeframe,
                    symbol = %symbol,
                    error = %e,
                    "refresh failed; pair stays stale until next cycle"
                );
                RefreshOutcome::Failed
            }
        }
    }

    async fn refresh_backtesting_pair(
        &self,
        timeframe: Timeframe,
        symbol: &str,
    ) -> RefreshOutcome {
        if !self.source.should_update(timeframe, symbol).await {
            return RefreshOutcome::Skipped;
        }
        match self.refresh_data(timeframe, symbol, None, true).await {
            Ok(()) => RefreshOutcome::Refreshed {
                timeframe,
                symbol: symbol.to_string(),
                completed_at: Utc::now().timestamp(),
            },
            Err(Error::BacktestingEnded { symbol }) => {
                info!(symbol = %symbol, "backtesting data exhausted");
                RefreshOutcome::Ended { symbol }
            }
            Err(e) => {
                error!(
                    timeframe = %timeframe,
                    symbol = %symbol,
                    error = %e,
                    "backtesting refresh failed"
                );
                RefreshOutcome::Failed
            }
        }
    }

    /// Fetch the latest candle window for the pair, hand it to the routed
    /// evaluator, and notify the routed consumer with this producer's
    /// identity as the trigger tag.
    async fn refresh_data(
        &self,
        timeframe: Timeframe,
        symbol: &str,
        limit: Option<usize>,
        notify: bool,
    ) -> Result<()> {
        let target = self
            .routing
            .get(timeframe, symbol)
            .ok_or_else(|| Error::MissingRoute {
                symbol: symbol.to_string(),
                timeframe,
            })?;

        let candles = self
            .source
            .latest_candles(&target.symbol, target.timeframe, limit)
            .await?;
        target
            .evaluator
            .set_data(MarketPayload::Candles(candles))
            .await;
        if notify {
            target
                .consumer
                .push(FeedItem::Trigger(ProducerKind::Ohlcv));
        }
        Ok(())
    }

    async fn apply_outcomes(&mut self, outcomes: Vec<RefreshOutcome>) {
        for outcome in outcomes {
            match outcome {
                RefreshOutcome::Refreshed {
                    timeframe,
                    symbol,
                    completed_at,
                } => {
                    *self
                        .refreshed_times
                        .entry(timeframe)
                        .or_default()
                        .entry(symbol.clone())
                        .or_default() += 1;
                    if !self.in_backtesting {
                        self.last_update
                            .entry(timeframe)
                            .or_default()
                            .insert(symbol, completed_at);
                    }
                }
                RefreshOutcome::Ended { symbol } => {
                    self.ended_symbols.insert(symbol.clone());
                    if let Err(e) = self.source.end_backtesting(&symbol).await {
                        error!(symbol = %symbol, error = %e, "failed to close out backtesting");
                    }
                    if self.ended_symbols.len() == self.symbols.len() {
                        info!("all symbols finished backtesting; stopping scheduler");
                        self.fanout.stop();
                    }
                }
                RefreshOutcome::Skipped | RefreshOutcome::Failed => {}
            }
        }
    }

    /// Consolidate symbol-level signals, strongest conviction first, so
    /// decisive symbols settle shared resources before weaker ones
    /// compete for them.
    async fn finalize_symbols(&self) {
        let mut scored = Vec::with_capacity(self.symbol_evaluators.len());
        for evaluator in &self.symbol_evaluators {
            let score = evaluator.average_strategy_eval(self.source.as_ref()).await;
            scored.push((score, evaluator));
        }
        scored.sort_by(|a, b| b.0.abs().total_cmp(&a.0.abs()));

        for (_, evaluator) in scored {
            if let Err(e) = evaluator.finalize(self.source.as_ref()).await {
                error!(symbol = %evaluator.symbol(), error = %e, "symbol finalize failed");
            }
        }
    }

    /// Sleep out the remainder of the wake interval, cut short by a stop
    /// request. Never called in backtesting: simulated runs must not
    /// incur wall-clock delay.
    async fn pace(&self, cycle_elapsed: Duration) {
        if self.fanout.should_stop() {
            return;
        }
        if let Some(remaining) = MAX_CYCLE_SLEEP.checked_sub(cycle_elapsed) {
            let mut stop_rx = self.fanout.stop_signal();
            tokio::select! {
                _ = tokio::time::sleep(remaining) => {}
                _ = stop_rx.changed() => {}
            }
        }
    }
}

#[async_trait]
impl Producer for OhlcvScheduler {
    fn kind(&self) -> ProducerKind {
        ProducerKind::Ohlcv
    }

    fn fanout(&self) -> &FanOut {
        &self.fanout
    }

    fn fanout_mut(&mut self) -> &mut FanOut {
        &mut self.fanout
    }

    /// Refreshes are self-paced; external notifications carry no extra
    /// policy for this producer.
    async fn receive(&mut self, _item: FeedItem) {}

    /// Discover the monitored set, order it finest first, zero the
    /// bookkeeping, and probe for backtesting. With nothing to monitor
    /// the scheduler goes idle instead of looping over an empty set.
    async fn start(&mut self) -> Result<()> {
        self.timeframes = timeframe::sort_by_accuracy(self.routing.timeframes());
        self.symbols = self.source.traded_pairs();

        if self.timeframes.is_empty() || self.symbols.is_empty() {
            self.fanout.stop();
            self.state = SchedulerState::Stopped;
            warn!(
                "no timeframes or symbols to monitor, going to sleep; \
                 normal when no candle-driven evaluator is active"
            );
            return Ok(());
        }

        self.in_backtesting = self.probe_backtesting().await?;

        for timeframe in &self.timeframes {
            let zeroed_update: HashMap<String, i64> =
                self.symbols.iter().map(|s| (s.clone(), 0)).collect();
            let zeroed_count: HashMap<String, u64> =
                self.symbols.iter().map(|s| (s.clone(), 0)).collect();
            self.last_update.insert(*timeframe, zeroed_update);
            self.refreshed_times.insert(*timeframe, zeroed_count);
        }

        info!(
            timeframes = self.timeframes.len(),
            symbols = self.symbols.len(),
            backtesting = self.in_backtesting,
            "ohlcv scheduler ready"
        );
        self.state = SchedulerState::Ready;
        Ok(())
    }

    async fn perform(&mut self) {
        if self.state != SchedulerState::Ready {
            if self.state != SchedulerState::Stopped {
                warn!(state = %self.state, "perform called before start; refusing to run");
            }
            return;
        }
        self.state = SchedulerState::Running;

        while !self.fanout.should_stop() {
            let cycle_started = Instant::now();
            if let Err(e) = self.run_cycle().await {
                error!(error = %e, "refresh cycle failed; retrying next cycle");
            }
            if !self.in_backtesting {
                self.pace(cycle_started.elapsed()).await;
            }
        }

        self.state = SchedulerState::Stopped;
        info!("ohlcv scheduler stopped");
    }
}
