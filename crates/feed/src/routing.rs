use std::collections::HashMap;
use std::sync::Arc;

use common::{PairEvaluator, Timeframe};
use dispatch::ConsumerHandle;

/// Downstream destination for one (timeframe, symbol) pair: the evaluator
/// that receives fresh candle windows and the consumer queue that receives
/// the wake-up trigger.
pub struct RoutingTarget {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub evaluator: Arc<dyn PairEvaluator>,
    pub consumer: ConsumerHandle,
}

/// Routing table consulted by the refresh scheduler. Built once at wiring
/// time; the monitored set never changes after the scheduler starts.
#[derive(Default)]
pub struct RoutingTable {
    targets: HashMap<(Timeframe, String), RoutingTarget>,
}

impl RoutingTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, target: RoutingTarget) {
        self.targets
            .insert((target.timeframe, target.symbol.clone()), target);
    }

    pub fn get(&self, timeframe: Timeframe, symbol: &str) -> Option<&RoutingTarget> {
        self.targets.get(&(timeframe, symbol.to_string()))
    }

    /// Distinct timeframes present in the table, unordered.
    pub fn timeframes(&self) -> Vec<Timeframe> {
        let mut seen = Vec::new();
        for (timeframe, _) in self.targets.keys() {
            if !seen.contains(timeframe) {
                seen.push(*timeframe);
            }
        }
        seen
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }
}
