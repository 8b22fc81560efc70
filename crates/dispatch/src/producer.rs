use async_trait::async_trait;
use tokio::sync::watch;

use common::{FeedItem, ProducerKind, Result};

use crate::consumer::ConsumerHandle;

/// Cooperative stop signal shared between a producer and its owner.
///
/// `stop` only sets the flag; in-flight work is never cancelled forcibly.
/// Long-running loops observe the flag within one cycle, either by polling
/// `is_stopped` or by racing `subscribe().changed()` against their sleeps.
#[derive(Clone)]
pub struct StopHandle {
    tx: watch::Sender<bool>,
}

impl StopHandle {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx }
    }

    /// Idempotent: setting an already-set flag is a no-op.
    pub fn stop(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_stopped(&self) -> bool {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

impl Default for StopHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// The shared base state of every producer: the insertion-ordered list of
/// registered consumers plus the stop flag.
pub struct FanOut {
    consumers: Vec<ConsumerHandle>,
    stop: StopHandle,
}

impl FanOut {
    pub fn new() -> Self {
        Self {
            consumers: Vec::new(),
            stop: StopHandle::new(),
        }
    }

    /// Register a consumer. Duplicates are the caller's responsibility.
    pub fn register(&mut self, consumer: ConsumerHandle) {
        self.consumers.push(consumer);
    }

    /// Enqueue `item` onto every registered consumer, in registration
    /// order. Never blocks and never fails: the queues are unbounded and a
    /// consumer that already shut down simply drops the item.
    pub fn send(&self, item: FeedItem) {
        for consumer in &self.consumers {
            consumer.push(item.clone());
        }
    }

    pub fn consumer_count(&self) -> usize {
        self.consumers.len()
    }

    pub fn stop(&self) {
        self.stop.stop();
    }

    pub fn should_stop(&self) -> bool {
        self.stop.is_stopped()
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn stop_signal(&self) -> watch::Receiver<bool> {
        self.stop.subscribe()
    }
}

impl Default for FanOut {
    fn default() -> Self {
        Self::new()
    }
}

/// Lifecycle contract shared by every market-data producer.
///
/// `start` runs one-time setup, `perform` is the standing self-driven loop
/// (run it from `tokio::spawn`), `stop` requests a cooperative shutdown.
/// `receive` is the external notification entry point; by default it
/// forwards to `send` unchanged, and producers override it to add policy.
#[async_trait]
pub trait Producer: Send + 'static {
    fn kind(&self) -> ProducerKind;

    fn fanout(&self) -> &FanOut;

    fn fanout_mut(&mut self) -> &mut FanOut;

    /// Fan the item out to every registered consumer.
    fn send(&self, item: FeedItem) {
        self.fanout().send(item);
    }

    /// Notification that new data is available.
    async fn receive(&mut self, item: FeedItem) {
        self.send(item);
    }

    /// One-time setup before `perform`.
    async fn start(&mut self) -> Result<()> {
        Ok(())
    }

    /// The producer's standing work loop. Must observe the stop flag
    /// within one cycle and return cleanly.
    async fn perform(&mut self);

    fn stop(&self) {
        self.fanout().stop();
    }

    fn should_stop(&self) -> bool {
        self.fanout().should_stop()
    }

    fn stop_handle(&self) -> StopHandle {
        self.fanout().stop_handle()
    }

    fn register(&mut self, consumer: ConsumerHandle) {
        self.fanout_mut().register(consumer);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use common::TaskManager;

    use super::*;
    use crate::consumer::{Consumer, ConsumerTarget};

    struct RecordingManager {
        seen: Arc<Mutex<Vec<ProducerKind>>>,
    }

    #[async_trait]
    impl TaskManager for RecordingManager {
        async fn notify(&self, notifier: ProducerKind) -> Result<()> {
            self.seen.lock().unwrap().push(notifier);
            Ok(())
        }
    }

    struct NullProducer {
        fanout: FanOut,
    }

    #[async_trait]
    impl Producer for NullProducer {
        fn kind(&self) -> ProducerKind {
            ProducerKind::Ticker
        }

        fn fanout(&self) -> &FanOut {
            &self.fanout
        }

        fn fanout_mut(&mut self) -> &mut FanOut {
            &mut self.fanout
        }

        async fn perform(&mut self) {}
    }

    fn recording_consumer() -> (ConsumerHandle, Arc<Mutex<Vec<ProducerKind>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let (consumer, handle) = Consumer::new(ConsumerTarget::TaskManager(Arc::new(
            RecordingManager { seen: seen.clone() },
        )));
        tokio::spawn(consumer.run());
        (handle, seen)
    }

    #[tokio::test]
    async fn send_enqueues_once_per_consumer() {
        let mut producer = NullProducer {
            fanout: FanOut::new(),
        };
        let mut records = Vec::new();
        for _ in 0..3 {
            let (handle, seen) = recording_consumer();
            producer.register(handle);
            records.push(seen);
        }

        producer.send(FeedItem::Trigger(ProducerKind::Ticker));
        tokio::time::sleep(Duration::from_millis(20)).await;

        for seen in records {
            assert_eq!(seen.lock().unwrap().as_slice(), &[ProducerKind::Ticker]);
        }
    }

    #[tokio::test]
    async fn default_receive_forwards_to_send() {
        let mut producer = NullProducer {
            fanout: FanOut::new(),
        };
        let (handle, seen) = recording_consumer();
        producer.register(handle);

        producer
            .receive(FeedItem::Trigger(ProducerKind::Ticker))
            .await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn stop_is_idempotent() {
        let producer = NullProducer {
            fanout: FanOut::new(),
        };
        assert!(!producer.should_stop());
        producer.stop();
        producer.stop();
        assert!(producer.should_stop());
    }

    #[tokio::test]
    async fn stop_handle_reaches_the_producer() {
        let producer = NullProducer {
            fanout: FanOut::new(),
        };
        let handle = producer.stop_handle();
        handle.stop();
        assert!(producer.should_stop());
    }
}
