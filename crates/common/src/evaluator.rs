use async_trait::async_trait;

use crate::source::MarketDataSource;
use crate::types::{MarketPayload, ProducerKind};
use crate::Result;

/// Effective configuration of an evaluator, probed once at scheduler start.
#[derive(Debug, Clone, Copy, Default)]
pub struct EvaluatorConfig {
    /// True when this run replays historical data under a simulated clock.
    pub backtesting: bool,
}

/// Per-(timeframe, symbol) analysis capability fed by the refresh scheduler.
#[async_trait]
pub trait PairEvaluator: Send + Sync {
    fn config(&self) -> EvaluatorConfig;

    /// Hand the evaluator a fresh payload. The payload is opaque to the
    /// producers; evaluators ignore variants they do not use. Called
    /// before the notify that triggers evaluation.
    async fn set_data(&self, payload: MarketPayload);

    /// Run an evaluation pass. `trigger` names the producer that caused it.
    async fn eval(&self, trigger: ProducerKind) -> Result<()>;
}

/// Task-manager capability: receives bare wake-up notifications instead of
/// evaluation triggers.
#[async_trait]
pub trait TaskManager: Send + Sync {
    async fn notify(&self, notifier: ProducerKind) -> Result<()>;
}

/// Symbol-level evaluator consolidated during the finalize pass.
#[async_trait]
pub trait SymbolEvaluator: Send + Sync {
    fn symbol(&self) -> &str;

    /// Current average strategy evaluation score for this symbol. The
    /// finalize pass orders symbols by the absolute value of this score,
    /// most decisive first.
    async fn average_strategy_eval(&self, source: &dyn MarketDataSource) -> f64;

    /// Consolidate this symbol's accumulated signals against the exchange.
    async fn finalize(&self, source: &dyn MarketDataSource) -> Result<()>;
}
