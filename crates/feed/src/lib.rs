pub mod manager;
pub mod ohlcv;
pub mod pollers;
pub mod routing;

#[cfg(test)]
pub(crate) mod testutil;

pub use manager::ProducersManager;
pub use ohlcv::{OhlcvScheduler, SchedulerState, MAX_CYCLE_SLEEP};
pub use pollers::{
    BalanceProducer, OrderBookProducer, OrdersProducer, RecentTradesProducer, TickerProducer,
};
pub use routing::{RoutingTable, RoutingTarget};
