use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{error, info};

use common::{MarketDataSource, ProducerKind, SymbolEvaluator};
use dispatch::{Producer, StopHandle};

use crate::ohlcv::OhlcvScheduler;
use crate::pollers::{
    BalanceProducer, OrderBookProducer, OrdersProducer, RecentTradesProducer, TickerProducer,
};
use crate::routing::RoutingTable;

/// Composition root for one exchange session: instantiates exactly one of
/// each concrete producer against the given source and retains handles for
/// lifecycle control. No policy beyond construction and broadcast.
pub struct ProducersManager {
    producers: Vec<Box<dyn Producer>>,
    stops: Vec<(ProducerKind, StopHandle)>,
    tasks: Vec<(ProducerKind, JoinHandle<()>)>,
}

impl ProducersManager {
    pub fn new(
        source: Arc<dyn MarketDataSource>,
        routing: RoutingTable,
        symbol_evaluators: Vec<Arc<dyn SymbolEvaluator>>,
        poll_interval: Duration,
    ) -> Self {
        let producers: Vec<Box<dyn Producer>> = vec![
            Box::new(OrdersProducer::new(source.clone(), poll_interval)),
            Box::new(BalanceProducer::new(source.clone(), poll_interval)),
            Box::new(OhlcvScheduler::new(
                source.clone(),
                routing,
                symbol_evaluators,
            )),
            Box::new(OrderBookProducer::new(source.clone(), poll_interval)),
            Box::new(TickerProducer::new(source.clone(), poll_interval)),
            Box::new(RecentTradesProducer::new(source, poll_interval)),
        ];

        Self {
            producers,
            stops: Vec::new(),
            tasks: Vec::new(),
        }
    }

    /// Access a producer before start, e.g. to register consumers.
    pub fn producer_mut(&mut self, kind: ProducerKind) -> Option<&mut dyn Producer> {
        self.producers
            .iter_mut()
            .find(|p| p.kind() == kind)
            .map(|p| p.as_mut())
    }

    /// Run every producer's one-time setup and spawn its standing loop.
    pub async fn start_all(&mut self) {
        for mut producer in self.producers.drain(..) {
            let kind = producer.kind();
            self.stops.push((kind, producer.stop_handle()));
            let task = tokio::spawn(async move {
                if let Err(e) = producer.start().await {
                    error!(producer = %kind, error = %e, "producer start failed");
                    return;
                }
                producer.perform().await;
            });
            self.tasks.push((kind, task));
        }
        info!(producers = self.tasks.len(), "all producers started");
    }

    /// Request a cooperative stop from every producer. Idempotent.
    pub fn stop_all(&self) {
        for (_, stop) in &self.stops {
            stop.stop();
        }
    }

    pub fn stop_handle(&self, kind: ProducerKind) -> Option<StopHandle> {
        self.stops
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, stop)| stop.clone())
    }

    /// Await every producer task. Call after `stop_all` for an orderly
    /// shutdown.
    pub async fn join_all(&mut self) {
        for (kind, task) in self.tasks.drain(..) {
            if let Err(e) = task.await {
                error!(producer = %kind, error = %e, "producer task failed");
            }
        }
    }
}
