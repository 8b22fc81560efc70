use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tracing::{error, warn};

use common::{FeedItem, PairEvaluator, TaskManager};

use crate::producer::StopHandle;

/// The downstream capability a consumer wraps. A closed set: either an
/// evaluator that receives data and evaluation triggers, or a task manager
/// that receives bare wake-up notifications.
pub enum ConsumerTarget {
    Evaluator(Arc<dyn PairEvaluator>),
    TaskManager(Arc<dyn TaskManager>),
}

impl ConsumerTarget {
    async fn deliver(&self, item: FeedItem) {
        match (self, item) {
            (ConsumerTarget::Evaluator(evaluator), FeedItem::Trigger(tag)) => {
                if let Err(e) = evaluator.eval(tag).await {
                    error!(trigger = %tag, error = %e, "evaluation failed");
                }
            }
            (ConsumerTarget::Evaluator(evaluator), FeedItem::Data(payload)) => {
                evaluator.set_data(payload).await;
            }
            (ConsumerTarget::TaskManager(manager), FeedItem::Trigger(tag)) => {
                if let Err(e) = manager.notify(tag).await {
                    error!(notifier = %tag, error = %e, "notify failed");
                }
            }
            (ConsumerTarget::TaskManager(_), FeedItem::Data(payload)) => {
                warn!(payload = %payload.kind(), "task-manager consumer dropped unusable payload");
            }
        }
    }
}

/// Queue-backed consumer: one unbounded FIFO in front of one downstream
/// capability. Exactly one `run` loop dequeues per instance; any producer
/// may enqueue through a cloned [`ConsumerHandle`].
///
/// The loop forwards each item synchronously and does not dequeue the next
/// until the current invocation completes, so per-consumer ordering and
/// at-most-one-in-flight delivery hold. Enqueueing never blocks, so a slow
/// capability never stalls producers.
pub struct Consumer {
    target: ConsumerTarget,
    queue_rx: mpsc::UnboundedReceiver<FeedItem>,
    stop_rx: watch::Receiver<bool>,
}

impl Consumer {
    pub fn new(target: ConsumerTarget) -> (Self, ConsumerHandle) {
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        let stop = StopHandle::new();
        let consumer = Self {
            target,
            queue_rx,
            stop_rx: stop.subscribe(),
        };
        (consumer, ConsumerHandle { queue_tx, stop })
    }

    /// Run until the stop flag is set or every handle is dropped.
    /// Call from `tokio::spawn`.
    pub async fn run(mut self) {
        loop {
            tokio::select! {
                changed = self.stop_rx.changed() => match changed {
                    Ok(()) => {
                        if *self.stop_rx.borrow() {
                            break;
                        }
                    }
                    // Every handle dropped: no further stop can arrive.
                    // Drain what was already enqueued, then exit.
                    Err(_) => {
                        while let Ok(item) = self.queue_rx.try_recv() {
                            self.target.deliver(item).await;
                        }
                        break;
                    }
                },
                item = self.queue_rx.recv() => match item {
                    Some(item) => self.target.deliver(item).await,
                    None => break,
                },
            }
        }
    }
}

/// Producer-facing end of a consumer's queue. Cloned into every producer
/// that fans out to this consumer.
#[derive(Clone)]
pub struct ConsumerHandle {
    queue_tx: mpsc::UnboundedSender<FeedItem>,
    stop: StopHandle,
}

impl ConsumerHandle {
    /// Enqueue one item. Non-blocking; an item sent after the consumer
    /// shut down is silently dropped.
    pub fn push(&self, item: FeedItem) {
        let _ = self.queue_tx.send(item);
    }

    /// Ask the consumer loop to exit after its current delivery.
    pub fn stop(&self) {
        self.stop.stop();
    }
}
