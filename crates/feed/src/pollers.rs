use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, warn};

use common::{FeedItem, MarketDataSource, MarketPayload, ProducerKind, Result};
use dispatch::{FanOut, Producer};

/// Depth requested from the source for order book snapshots.
const ORDER_BOOK_DEPTH: usize = 20;

/// Sleep out the poll interval, cut short by a stop request.
async fn pause(fanout: &FanOut, interval: Duration) {
    if fanout.should_stop() {
        return;
    }
    let mut stop_rx = fanout.stop_signal();
    tokio::select! {
        _ = tokio::time::sleep(interval) => {}
        _ = stop_rx.changed() => {}
    }
}

/// Best bid/ask poller: fetches one ticker per traded pair each cycle and
/// fans the snapshots out. No per-pair cadence or backtesting policy —
/// that belongs to the candle scheduler alone.
pub struct TickerProducer {
    source: Arc<dyn MarketDataSource>,
    fanout: FanOut,
    symbols: Vec<String>,
    poll_interval: Duration,
}

impl TickerProducer {
    pub fn new(source: Arc<dyn MarketDataSource>, poll_interval: Duration) -> Self {
        Self {
            source,
            fanout: FanOut::new(),
            symbols: Vec::new(),
            poll_interval,
        }
    }
}

#[async_trait]
impl Producer for TickerProducer {
    fn kind(&self) -> ProducerKind {
        ProducerKind::Ticker
    }

    fn fanout(&self) -> &FanOut {
        &self.fanout
    }

    fn fanout_mut(&mut self) -> &mut FanOut {
        &mut self.fanout
    }

    async fn start(&mut self) -> Result<()> {
        self.symbols = self.source.traded_pairs();
        info!(symbols = self.symbols.len(), "ticker producer ready");
        Ok(())
    }

    async fn perform(&mut self) {
        while !self.should_stop() {
            for symbol in &self.symbols {
                match self.source.ticker(symbol).await {
                    Ok(ticker) => self.fanout.send(FeedItem::Data(MarketPayload::Ticker(ticker))),
                    Err(e) => warn!(symbol = %symbol, error = %e, "ticker fetch failed"),
                }
            }
            pause(&self.fanout, self.poll_interval).await;
        }
    }
}

/// Order book snapshot poller.
pub struct OrderBookProducer {
    source: Arc<dyn MarketDataSource>,
    fanout: FanOut,
    symbols: Vec<String>,
    poll_interval: Duration,
}

impl OrderBookProducer {
    pub fn new(source: Arc<dyn MarketDataSource>, poll_interval: Duration) -> Self {
        Self {
            source,
            fanout: FanOut::new(),
            symbols: Vec::new(),
            poll_interval,
        }
    }
}

#[async_trait]
impl Producer for OrderBookProducer {
    fn kind(&self) -> ProducerKind {
        ProducerKind::OrderBook
    }

    fn fanout(&self) -> &FanOut {
        &self.fanout
    }

    fn fanout_mut(&mut self) -> &mut FanOut {
        &mut self.fanout
    }

    async fn start(&mut self) -> Result<()> {
        self.symbols = self.source.traded_pairs();
        Ok(())
    }

    async fn perform(&mut self) {
        while !self.should_stop() {
            for symbol in &self.symbols {
                match self.source.order_book(symbol, ORDER_BOOK_DEPTH).await {
                    Ok(book) => self
                        .fanout
                        .send(FeedItem::Data(MarketPayload::OrderBook(book))),
                    Err(e) => warn!(symbol = %symbol, error = %e, "order book fetch failed"),
                }
            }
            pause(&self.fanout, self.poll_interval).await;
        }
    }
}

/// Public trade tape poller.
pub struct RecentTradesProducer {
    source: Arc<dyn MarketDataSource>,
    fanout: FanOut,
    symbols: Vec<String>,
    poll_interval: Duration,
}

impl RecentTradesProducer {
    pub fn new(source: Arc<dyn MarketDataSource>, poll_interval: Duration) -> Self {
        Self {
            source,
            fanout: FanOut::new(),
            symbols: Vec::new(),
            poll_interval,
        }
    }
}

#[async_trait]
impl Producer for RecentTradesProducer {
    fn kind(&self) -> ProducerKind {
        ProducerKind::RecentTrades
    }

    fn fanout(&self) -> &FanOut {
        &self.fanout
    }

    fn fanout_mut(&mut self) -> &mut FanOut {
        &mut self.fanout
    }

    async fn start(&mut self) -> Result<()> {
        self.symbols = self.source.traded_pairs();
        Ok(())
    }

    async fn perform(&mut self) {
        while !self.should_stop() {
            for symbol in &self.symbols {
                match self.source.recent_trades(symbol).await {
                    Ok(trades) if trades.is_empty() => {}
                    Ok(trades) => self
                        .fanout
                        .send(FeedItem::Data(MarketPayload::Trades(trades))),
                    Err(e) => warn!(symbol = %symbol, error = %e, "recent trades fetch failed"),
                }
            }
            pause(&self.fanout, self.poll_interval).await;
        }
    }
}

/// Open order status poller.
pub struct OrdersProducer {
    source: Arc<dyn MarketDataSource>,
    fanout: FanOut,
    symbols: Vec<String>,
    poll_interval: Duration,
}

impl OrdersProducer {
    pub fn new(source: Arc<dyn MarketDataSource>, poll_interval: Duration) -> Self {
        Self {
            source,
            fanout: FanOut::new(),
            symbols: Vec::new(),
            poll_interval,
        }
    }
}

#[async_trait]
impl Producer for OrdersProducer {
    fn kind(&self) -> ProducerKind {
        ProducerKind::Orders
    }

    fn fanout(&self) -> &FanOut {
        &self.fanout
    }

    fn fanout_mut(&mut self) -> &mut FanOut {
        &mut self.fanout
    }

    async fn start(&mut self) -> Result<()> {
        self.symbols = self.source.traded_pairs();
        Ok(())
    }

    async fn perform(&mut self) {
        while !self.should_stop() {
            for symbol in &self.symbols {
                match self.source.open_orders(symbol).await {
                    Ok(orders) if orders.is_empty() => {}
                    Ok(orders) => self
                        .fanout
                        .send(FeedItem::Data(MarketPayload::Orders(orders))),
                    Err(e) => warn!(symbol = %symbol, error = %e, "open orders fetch failed"),
                }
            }
            pause(&self.fanout, self.poll_interval).await;
        }
    }
}

/// Account balance poller. Account-level, not per-symbol.
pub struct BalanceProducer {
    source: Arc<dyn MarketDataSource>,
    fanout: FanOut,
    poll_interval: Duration,
}

impl BalanceProducer {
    pub fn new(source: Arc<dyn MarketDataSource>, poll_interval: Duration) -> Self {
        Self {
            source,
            fanout: FanOut::new(),
            poll_interval,
        }
    }
}

#[async_trait]
impl Producer for BalanceProducer {
    fn kind(&self) -> ProducerKind {
        ProducerKind::Balance
    }

    fn fanout(&self) -> &FanOut {
        &self.fanout
    }

    fn fanout_mut(&mut self) -> &mut FanOut {
        &mut self.fanout
    }

    async fn perform(&mut self) {
        while !self.should_stop() {
            match self.source.balance().await {
                Ok(balance) => self
                    .fanout
                    .send(FeedItem::Data(MarketPayload::Balance(balance))),
                Err(e) => warn!(error = %e, "balance fetch failed"),
            }
            pause(&self.fanout, self.poll_interval).await;
        }
    }
}
