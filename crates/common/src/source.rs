use async_trait::async_trait;

use crate::timeframe::Timeframe;
use crate::types::{Balance, CandleBatch, OrderBookSnapshot, OrderUpdate, Ticker, Trade};
use crate::Result;

/// Abstraction over the exchange data-access layer.
///
/// Live connectors and `sim::SimulatedSource` both implement this. The
/// backtesting surface has no-op defaults so live sources only provide the
/// data fetches; the scheduler only calls the backtesting methods when a
/// replay is active.
///
/// Implementations must tolerate concurrent read access: the scheduler
/// issues all of one cycle's refreshes against the same source in parallel.
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// Symbols this source serves. Fixed for the lifetime of the session.
    fn traded_pairs(&self) -> Vec<String>;

    /// Latest candle window for a (symbol, timeframe) pair. Returned by
    /// value; callers own the batch outright.
    async fn latest_candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: Option<usize>,
    ) -> Result<CandleBatch>;

    async fn ticker(&self, symbol: &str) -> Result<Ticker>;

    async fn order_book(&self, symbol: &str, depth: usize) -> Result<OrderBookSnapshot>;

    async fn recent_trades(&self, symbol: &str) -> Result<Vec<Trade>>;

    async fn open_orders(&self, symbol: &str) -> Result<Vec<OrderUpdate>>;

    async fn balance(&self) -> Result<Balance>;

    // ─── Backtesting surface ──────────────────────────────────────────────

    /// Whether a new simulated candle is available for this pair. Only
    /// consulted during backtesting; simulated time, not wall clock,
    /// governs cadence.
    async fn should_update(&self, _timeframe: Timeframe, _symbol: &str) -> bool {
        false
    }

    /// One-time alignment step: position the replay so enough history
    /// precedes the first simulated candle of every timeframe.
    async fn init_historical_offset(
        &self,
        _timeframes: &[Timeframe],
        _symbol: &str,
    ) -> Result<()> {
        Ok(())
    }

    /// Close out the replay for one symbol after its data is exhausted.
    async fn end_backtesting(&self, _symbol: &str) -> Result<()> {
        Ok(())
    }

    /// Force a pass over the source's order simulator. `simulated_time`
    /// selects the replay clock instead of wall time.
    async fn force_update_order_status(&self, _simulated_time: bool) -> Result<()> {
        Ok(())
    }
}
