//! Publication fan-out: every registered [Consumer] receives every
//! [CosmicEvent], in assembly order, through its own bounded queue.
use std::{
    future::Future,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use log::{debug, error, info};

use tokio::{
    sync::mpsc::{self, Receiver, Sender, error::TrySendError},
    task::JoinHandle,
};

pub mod index;
pub mod journal;
pub mod relay;

use crate::{error::ConsumerError, event::CosmicEvent};

/// Downstream [Consumer] of published events.
pub trait Consumer: Send + 'static {
    /// Name used when reporting
    fn name(&self) -> &str;

    /// Called before the first event is delivered. On failure,
    /// it is attempted again before the next event.
    fn prepare(&mut self) -> impl Future<Output = Result<(), ConsumerError>> + Send {
        async { Ok(()) }
    }

    /// Processes one event
    fn on_event(
        &mut self,
        event: &CosmicEvent,
    ) -> impl Future<Output = Result<(), ConsumerError>> + Send;
}

/// Delivery summary of one [Consumer], available once the [FanOut] is dropped
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ConsumerReport {
    pub name: String,
    /// Events processed successfully
    pub delivered: u64,
    /// Events the consumer failed on (or timed out)
    pub failed: u64,
    /// Events dropped because the consumer queue was full
    pub dropped: u64,
}

impl std::fmt::Display for ConsumerReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: {} delivered, {} failed, {} dropped",
            self.name, self.delivered, self.failed, self.dropped
        )
    }
}

struct Route {
    name: String,
    tx: Sender<Arc<CosmicEvent>>,
    dropped: Arc<AtomicU64>,
}

/// [FanOut] owns the consumer registry
pub struct FanOut {
    routes: Vec<Route>,
    queue_size: usize,
    timeout: Duration,
}

impl FanOut {
    /// Builds a new [FanOut]: each consumer may lag `queue_size` events
    /// behind, each delivery is limited to `timeout`.
    pub fn new(queue_size: usize, timeout: Duration) -> Self {
        Self {
            routes: Vec::new(),
            queue_size: queue_size.max(1),
            timeout,
        }
    }

    /// Registers a new [Consumer] and deploys its worker.
    /// Must be called within a tokio runtime.
    pub fn register<C: Consumer>(&mut self, consumer: C) -> JoinHandle<ConsumerReport> {
        let (tx, rx) = mpsc::channel(self.queue_size);
        let dropped = Arc::new(AtomicU64::new(0));
        let name = consumer.name().to_string();

        self.routes.push(Route {
            name: name.clone(),
            tx,
            dropped: dropped.clone(),
        });

        info!("{} - consumer registered", name);
        tokio::spawn(deliver(consumer, rx, self.timeout, dropped))
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Hands the event over to every consumer. Never blocks.
    pub fn publish(&self, event: CosmicEvent) {
        let event = Arc::new(event);

        for route in self.routes.iter() {
            match route.tx.try_send(event.clone()) {
                Ok(_) => {},
                Err(TrySendError::Full(event)) => {
                    route.dropped.fetch_add(1, Ordering::Relaxed);
                    error!(
                        "{} - event {}: {}",
                        route.name,
                        event.id,
                        ConsumerError::QueueFull
                    );
                },
                Err(TrySendError::Closed(event)) => {
                    route.dropped.fetch_add(1, Ordering::Relaxed);
                    error!("{} - event {}: consumer has terminated", route.name, event.id);
                },
            }
        }
    }
}

async fn prepare<C: Consumer>(consumer: &mut C, timeout: Duration) -> Result<(), ConsumerError> {
    match tokio::time::timeout(timeout, consumer.prepare()).await {
        Ok(result) => result,
        Err(_) => Err(ConsumerError::Timeout(timeout)),
    }
}

/// Consumer worker
async fn deliver<C: Consumer>(
    mut consumer: C,
    mut rx: Receiver<Arc<CosmicEvent>>,
    timeout: Duration,
    dropped: Arc<AtomicU64>,
) -> ConsumerReport {
    let mut report = ConsumerReport {
        name: consumer.name().to_string(),
        ..Default::default()
    };

    let mut ready = match prepare(&mut consumer, timeout).await {
        Ok(_) => {
            debug!("{} - ready", report.name);
            true
        },
        Err(e) => {
            error!("{} - not ready: {}", report.name, e);
            false
        },
    };

    while let Some(event) = rx.recv().await {
        if !ready {
            match prepare(&mut consumer, timeout).await {
                Ok(_) => {
                    info!("{} - ready", report.name);
                    ready = true;
                },
                Err(e) => {
                    report.failed += 1;
                    error!("{} - event {}: not ready: {}", report.name, event.id, e);
                    continue;
                },
            }
        }

        let result = match tokio::time::timeout(timeout, consumer.on_event(&event)).await {
            Ok(result) => result,
            Err(_) => Err(ConsumerError::Timeout(timeout)),
        };

        match result {
            Ok(_) => report.delivered += 1,
            Err(e) => {
                report.failed += 1;
                error!("{} - event {}: {}", report.name, event.id, e);
            },
        }
    }

    report.dropped = dropped.load(Ordering::Relaxed);
    debug!("{} - terminated", report.name);
    report
}
