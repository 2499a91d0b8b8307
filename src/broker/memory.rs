//! In-memory broker for single-process deployments and tests.
//!
//! Exchanges, queues and bindings are kept in a single state table guarded by
//! a mutex that is never held across an await. Each queue owns an unbounded
//! channel; subscribers read from clones of its receiver. Every delivery stays
//! in the queue's unacked set until it is acked or nacked, which is what lets
//! `recover` and `restart` hand unacknowledged messages out again.

use super::{Broker, BrokerError, Delivery, DeliveryStream, ExchangeSpec, QueueSpec};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, trace, warn};

/// How many rejected deliveries each queue keeps for inspection. Older ones
/// are only counted.
pub const DROPPED_LOG_CAPACITY: usize = 256;

struct QueueState {
    spec: QueueSpec,
    tx: async_channel::Sender<Delivery>,
    rx: async_channel::Receiver<Delivery>,
    unacked: BTreeMap<u64, Vec<u8>>,
    /// Tags replaced by a fresh tag on redelivery, still held by a consumer.
    superseded: HashSet<u64>,
    acked: u64,
    dropped: VecDeque<Delivery>,
    dropped_total: u64,
}

impl QueueState {
    fn new(spec: QueueSpec) -> Self {
        let (tx, rx) = async_channel::unbounded();
        Self {
            spec,
            tx,
            rx,
            unacked: BTreeMap::new(),
            superseded: HashSet::new(),
            acked: 0,
            dropped: VecDeque::new(),
            dropped_total: 0,
        }
    }

    fn enqueue(&mut self, delivery: Delivery) -> Result<(), BrokerError> {
        self.unacked
            .insert(delivery.delivery_tag, delivery.payload.clone());
        self.tx
            .try_send(delivery)
            .map_err(|_| BrokerError::Closed(self.spec.name.clone()))
    }

    fn record_dropped(&mut self, delivery: Delivery) {
        if self.dropped.len() == DROPPED_LOG_CAPACITY {
            self.dropped.pop_front();
        }
        self.dropped.push_back(delivery);
        self.dropped_total += 1;
    }

    /// Removes `tag` from the unacked set. `Ok(None)` means the tag was
    /// superseded by a redelivery and there is nothing left to settle.
    fn settle(&mut self, tag: u64) -> Result<Option<Vec<u8>>, BrokerError> {
        if let Some(payload) = self.unacked.remove(&tag) {
            return Ok(Some(payload));
        }
        if self.superseded.remove(&tag) {
            debug!(queue = %self.spec.name, delivery_tag = tag, "Settled superseded delivery");
            return Ok(None);
        }
        Err(BrokerError::PreconditionFailed(format!(
            "unknown delivery tag {tag} on queue '{}'",
            self.spec.name
        )))
    }

    /// Pulls back everything still buffered and re-enqueues all unacked
    /// messages in tag order. Messages a subscriber already took get a fresh
    /// tag and the redelivered flag; buffered ones go back unchanged.
    fn recover(&mut self, next_tag: &mut u64) -> Result<usize, BrokerError> {
        let mut pending = HashMap::new();
        while let Ok(delivery) = self.rx.try_recv() {
            pending.insert(delivery.delivery_tag, delivery.redelivered);
        }

        let unacked = std::mem::take(&mut self.unacked);
        let count = unacked.len();
        for (tag, payload) in unacked {
            let delivery = match pending.get(&tag) {
                Some(redelivered) => Delivery {
                    queue: self.spec.name.clone(),
                    delivery_tag: tag,
                    payload,
                    redelivered: *redelivered,
                },
                None => {
                    let fresh = *next_tag;
                    *next_tag += 1;
                    self.superseded.insert(tag);
                    Delivery {
                        queue: self.spec.name.clone(),
                        delivery_tag: fresh,
                        payload,
                        redelivered: true,
                    }
                }
            };
            self.enqueue(delivery)?;
        }
        Ok(count)
    }
}

#[derive(Default)]
struct State {
    connected: bool,
    next_tag: u64,
    exchanges: HashMap<String, ExchangeSpec>,
    queues: HashMap<String, QueueState>,
    /// Exchange name to bound queue names, in binding order.
    bindings: HashMap<String, Vec<String>>,
}

impl State {
    fn check_connected(&self) -> Result<(), BrokerError> {
        if self.connected {
            Ok(())
        } else {
            Err(BrokerError::Unreachable("connection is closed".to_string()))
        }
    }

    fn queue_mut(&mut self, name: &str) -> Result<&mut QueueState, BrokerError> {
        self.queues
            .get_mut(name)
            .ok_or_else(|| BrokerError::UnknownQueue(name.to_string()))
    }

    fn allocate_tag(&mut self) -> u64 {
        let tag = self.next_tag;
        self.next_tag += 1;
        tag
    }
}

/// A thread-safe, cloneable broker living entirely in process memory.
#[derive(Clone)]
pub struct InMemoryBroker {
    state: Arc<Mutex<State>>,
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                connected: true,
                next_tag: 1,
                ..Default::default()
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // A panic while holding the lock leaves the tables consistent: every
        // mutation is a single insert or remove.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Simulates losing (`false`) or regaining (`true`) the connection.
    /// While disconnected every operation fails with `Unreachable`.
    pub fn set_connected(&self, connected: bool) {
        self.lock().connected = connected;
    }

    /// Simulates a broker restart: non-durable exchanges and queues vanish,
    /// bindings touching them go too, and every unacked message on a durable
    /// queue is handed out again.
    pub fn restart(&self) -> Result<(), BrokerError> {
        let mut state = self.lock();
        state.exchanges.retain(|_, spec| spec.durable);
        state.queues.retain(|_, queue| queue.spec.durable);

        let State {
            exchanges,
            queues,
            bindings,
            next_tag,
            ..
        } = &mut *state;
        bindings.retain(|exchange, _| exchanges.contains_key(exchange));
        for bound in bindings.values_mut() {
            bound.retain(|queue| queues.contains_key(queue));
        }
        for queue in queues.values_mut() {
            queue.recover(next_tag)?;
        }
        debug!("In-memory broker restarted");
        Ok(())
    }

    /// Hands every unacked message on `queue` out again. Messages that had
    /// already reached a subscriber are flagged as redelivered.
    pub fn recover(&self, queue: &str) -> Result<usize, BrokerError> {
        let mut state = self.lock();
        state.check_connected()?;
        let State { queues, next_tag, .. } = &mut *state;
        queues
            .get_mut(queue)
            .ok_or_else(|| BrokerError::UnknownQueue(queue.to_string()))?
            .recover(next_tag)
    }

    pub fn exchange_count(&self) -> usize {
        self.lock().exchanges.len()
    }

    pub fn queue_count(&self) -> usize {
        self.lock().queues.len()
    }

    pub fn binding_count(&self) -> usize {
        self.lock().bindings.values().map(Vec::len).sum()
    }

    pub fn has_exchange(&self, name: &str) -> bool {
        self.lock().exchanges.contains_key(name)
    }

    pub fn has_queue(&self, name: &str) -> bool {
        self.lock().queues.contains_key(name)
    }

    /// Names of the queues bound to `exchange`, in binding order.
    pub fn bound_queues(&self, exchange: &str) -> Vec<String> {
        self.lock()
            .bindings
            .get(exchange)
            .cloned()
            .unwrap_or_default()
    }

    /// Messages waiting in the queue buffer, not yet picked up by a subscriber.
    pub fn ready_count(&self, queue: &str) -> usize {
        self.lock()
            .queues
            .get(queue)
            .map(|q| q.rx.len())
            .unwrap_or(0)
    }

    pub fn unacked_count(&self, queue: &str) -> usize {
        self.lock()
            .queues
            .get(queue)
            .map(|q| q.unacked.len())
            .unwrap_or(0)
    }

    pub fn acked_count(&self, queue: &str) -> u64 {
        self.lock().queues.get(queue).map(|q| q.acked).unwrap_or(0)
    }

    /// The most recent deliveries rejected without requeue, oldest first, at
    /// most `DROPPED_LOG_CAPACITY` of them.
    pub fn dropped(&self, queue: &str) -> Vec<Delivery> {
        self.lock()
            .queues
            .get(queue)
            .map(|q| q.dropped.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Every delivery ever rejected without requeue on `queue`.
    pub fn dropped_count(&self, queue: &str) -> u64 {
        self.lock()
            .queues
            .get(queue)
            .map(|q| q.dropped_total)
            .unwrap_or(0)
    }
}

#[async_trait]
impl Broker for InMemoryBroker {
    async fn declare_exchange(&self, spec: &ExchangeSpec) -> Result<(), BrokerError> {
        let mut state = self.lock();
        state.check_connected()?;
        match state.exchanges.get(&spec.name) {
            Some(existing) if existing == spec => {
                trace!(exchange = %spec.name, "Exchange already declared");
                Ok(())
            }
            Some(existing) => Err(BrokerError::PreconditionFailed(format!(
                "exchange '{}' already declared (durable: {})",
                existing.name, existing.durable
            ))),
            None => {
                debug!(exchange = %spec.name, durable = spec.durable, "Declared exchange");
                state.exchanges.insert(spec.name.clone(), spec.clone());
                Ok(())
            }
        }
    }

    async fn declare_queue(&self, spec: &QueueSpec) -> Result<(), BrokerError> {
        let mut state = self.lock();
        state.check_connected()?;
        match state.queues.get(&spec.name) {
            Some(existing) if existing.spec == *spec => {
                trace!(queue = %spec.name, "Queue already declared");
                Ok(())
            }
            Some(existing) => Err(BrokerError::PreconditionFailed(format!(
                "queue '{}' already declared (durable: {})",
                existing.spec.name, existing.spec.durable
            ))),
            None => {
                debug!(queue = %spec.name, durable = spec.durable, "Declared queue");
                state
                    .queues
                    .insert(spec.name.clone(), QueueState::new(spec.clone()));
                Ok(())
            }
        }
    }

    async fn bind_queue(
        &self,
        queue: &str,
        exchange: &str,
        routing_key: &str,
    ) -> Result<(), BrokerError> {
        let mut state = self.lock();
        state.check_connected()?;
        if !state.exchanges.contains_key(exchange) {
            return Err(BrokerError::UnknownExchange(exchange.to_string()));
        }
        if !state.queues.contains_key(queue) {
            return Err(BrokerError::UnknownQueue(queue.to_string()));
        }

        let bound = state.bindings.entry(exchange.to_string()).or_default();
        if !bound.iter().any(|q| q == queue) {
            debug!(queue, exchange, routing_key, "Bound queue");
            bound.push(queue.to_string());
        }
        Ok(())
    }

    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        payload: Vec<u8>,
    ) -> Result<(), BrokerError> {
        let mut state = self.lock();
        state.check_connected()?;
        if !state.exchanges.contains_key(exchange) {
            return Err(BrokerError::UnknownExchange(exchange.to_string()));
        }

        let targets = state.bindings.get(exchange).cloned().unwrap_or_default();
        if targets.is_empty() {
            warn!(exchange, routing_key, "Message was unroutable and has been discarded");
            return Ok(());
        }

        for queue in targets {
            let tag = state.allocate_tag();
            let delivery = Delivery {
                queue: queue.clone(),
                delivery_tag: tag,
                payload: payload.clone(),
                redelivered: false,
            };
            state.queue_mut(&queue)?.enqueue(delivery)?;
            trace!(exchange, queue = %queue, delivery_tag = tag, "Routed message");
        }
        Ok(())
    }

    async fn subscribe(&self, queue: &str) -> Result<DeliveryStream, BrokerError> {
        let mut state = self.lock();
        state.check_connected()?;
        let rx = state.queue_mut(queue)?.rx.clone();
        debug!(queue, "Subscribed to queue");
        Ok(DeliveryStream::new(queue, rx))
    }

    async fn ack(&self, queue: &str, delivery_tag: u64) -> Result<(), BrokerError> {
        let mut state = self.lock();
        state.check_connected()?;
        let queue_state = state.queue_mut(queue)?;
        if queue_state.settle(delivery_tag)?.is_some() {
            queue_state.acked += 1;
        }
        Ok(())
    }

    async fn nack(
        &self,
        queue: &str,
        delivery_tag: u64,
        requeue: bool,
    ) -> Result<(), BrokerError> {
        let mut state = self.lock();
        state.check_connected()?;
        let payload = match state.queue_mut(queue)?.settle(delivery_tag)? {
            Some(payload) => payload,
            None => return Ok(()),
        };
        if requeue {
            // A requeued message is a new delivery and gets a new tag.
            let tag = state.allocate_tag();
            state.queue_mut(queue)?.enqueue(Delivery {
                queue: queue.to_string(),
                delivery_tag: tag,
                payload,
                redelivered: true,
            })
        } else {
            state.queue_mut(queue)?.record_dropped(Delivery {
                queue: queue.to_string(),
                delivery_tag,
                payload,
                redelivered: false,
            });
            Ok(())
        }
    }
}
