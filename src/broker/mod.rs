//! Execution stream broker (spec §4.4): per-execution publish/subscribe
//! fan-out from a controller's `UpdateStatus` to every subscribed gRPC
//! stream.
//!
//! Grounded on the teacher's `dashmap` dependency (`Cargo.toml`) for the
//! sharded subscriber map, and the channel-per-subscriber pattern in
//! `src/api/agents/websocket_handlers.rs`. The per-subscriber channel
//! itself is a small hand-rolled bounded ring buffer rather than
//! `tokio::sync::mpsc`: spec §4.4 requires drop-**oldest** backpressure
//! ("if a subscriber's channel is full, drop the oldest and enqueue the
//! new"), which `mpsc::Sender` cannot express — its `try_send` only ever
//! fails on a full channel, it cannot evict from the receiving end.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Notify;

/// Bounded so a slow subscriber can't grow memory without limit (spec
/// §4.4 "registers a buffered channel (bound, e.g., 16 messages)").
const SUBSCRIBER_BUFFER: usize = 16;

struct ChannelState<T> {
    buffer: VecDeque<T>,
    closed: bool,
}

/// One subscriber's bounded inbox. `send` evicts the oldest buffered
/// update when full (spec §4.4 drop-oldest); `recv` awaits the next
/// update or `None` once `close()` has drained and closed the channel.
struct Channel<T> {
    state: Mutex<ChannelState<T>>,
    notify: Notify,
}

impl<T> Channel<T> {
    fn new() -> Arc<Self> {
        Arc::new(Channel {
            state: Mutex::new(ChannelState {
                buffer: VecDeque::with_capacity(SUBSCRIBER_BUFFER),
                closed: false,
            }),
            notify: Notify::new(),
        })
    }

    fn send(&self, value: T) {
        let mut state = self.state.lock().expect("subscriber channel lock poisoned");
        if state.closed {
            return;
        }
        if state.buffer.len() >= SUBSCRIBER_BUFFER {
            state.buffer.pop_front();
        }
        state.buffer.push_back(value);
        drop(state);
        self.notify.notify_one();
    }

    fn close(&self) {
        let mut state = self.state.lock().expect("subscriber channel lock poisoned");
        state.closed = true;
        drop(state);
        self.notify.notify_waiters();
    }
}

/// Receiving half handed back to the caller of `subscribe`. Dropping it
/// is the unsubscribe (spec §4.4 "unsubscribe-fn"): the `Drop` impl below
/// removes this subscriber's own channel from its execution's entry,
/// leaving every other subscriber of that execution untouched.
pub struct Subscription<T: Clone + Send + 'static> {
    id: u64,
    execution_id: String,
    channel: Arc<Channel<T>>,
    subscribers: Arc<DashMap<String, Subscribers<T>>>,
}

impl<T: Clone + Send + 'static> Subscription<T> {
    /// Awaits the next update, or `None` once the execution's channel has
    /// been closed and fully drained (spec §4.4 "Close: ... closes all
    /// subscriber channels").
    pub async fn recv(&mut self) -> Option<T> {
        loop {
            {
                let mut state = self.channel.state.lock().expect("subscriber channel lock poisoned");
                if let Some(value) = state.buffer.pop_front() {
                    return Some(value);
                }
                if state.closed {
                    return None;
                }
            }
            self.channel.notify.notified().await;
        }
    }
}

impl<T: Clone + Send + 'static> Drop for Subscription<T> {
    fn drop(&mut self) {
        if let Some(mut entry) = self.subscribers.get_mut(&self.execution_id) {
            entry.channels.retain(|(id, _)| *id != self.id);
        }
    }
}

/// One fan-out point per execution id.
struct Subscribers<T> {
    channels: Vec<(u64, Arc<Channel<T>>)>,
}

impl<T> Default for Subscribers<T> {
    fn default() -> Self {
        Subscribers { channels: Vec::new() }
    }
}

/// Sharded (by execution id, via `DashMap`'s own internal sharding) map of
/// subscriber channels, generic over the update type each resource kind's
/// broker instance carries (`AgentExecution` and `WorkflowExecution` each
/// get their own `StreamBroker<...>`).
pub struct StreamBroker<T: Clone + Send + 'static> {
    subscribers: Arc<DashMap<String, Subscribers<T>>>,
    next_subscriber_id: AtomicU64,
}

impl<T: Clone + Send + 'static> Default for StreamBroker<T> {
    fn default() -> Self {
        StreamBroker {
            subscribers: Arc::new(DashMap::new()),
            next_subscriber_id: AtomicU64::new(0),
        }
    }
}

impl<T: Clone + Send + 'static> StreamBroker<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new subscriber for `execution_id` (spec §4.4
    /// "Subscribe(execution_id) → channel, unsubscribe-fn"). Dropping the
    /// returned `Subscription` is the unsubscribe: it prunes just this
    /// subscriber's channel from the execution's entry, not the whole
    /// entry.
    pub fn subscribe(&self, execution_id: &str) -> Subscription<T> {
        let id = self.next_subscriber_id.fetch_add(1, Ordering::Relaxed);
        let channel = Channel::new();
        self.subscribers
            .entry(execution_id.to_string())
            .or_default()
            .channels
            .push((id, channel.clone()));
        Subscription {
            id,
            execution_id: execution_id.to_string(),
            channel,
            subscribers: self.subscribers.clone(),
        }
    }

    /// Delivers `update` to every live subscriber of `execution_id`,
    /// evicting each subscriber's oldest buffered update if its channel
    /// is already full (spec §4.4).
    pub fn publish(&self, execution_id: &str, update: T) {
        let Some(entry) = self.subscribers.get(execution_id) else {
            return;
        };
        for (_, channel) in &entry.channels {
            channel.send(update.clone());
        }
    }

    /// Invoked when the execution reaches a terminal phase (spec §4.4
    /// "Close"): closes every subscriber channel so in-flight `Subscribe`
    /// streams observe the end after draining whatever was already
    /// buffered, then drops the broker's own bookkeeping for this id.
    pub fn close(&self, execution_id: &str) {
        if let Some((_, subscribers)) = self.subscribers.remove(execution_id) {
            for (_, channel) in subscribers.channels {
                channel.close();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscriber_receives_published_updates_in_order() {
        let broker: StreamBroker<u32> = StreamBroker::new();
        let mut rx = broker.subscribe("exec-1");
        broker.publish("exec-1", 1);
        broker.publish("exec-1", 2);
        assert_eq!(rx.recv().await, Some(1));
        assert_eq!(rx.recv().await, Some(2));
    }

    #[tokio::test]
    async fn publish_to_unknown_execution_is_a_no_op() {
        let broker: StreamBroker<u32> = StreamBroker::new();
        broker.publish("ghost", 1); // must not panic
    }

    #[tokio::test]
    async fn close_terminates_subscriber_streams_after_draining_buffered_updates() {
        let broker: StreamBroker<u32> = StreamBroker::new();
        let mut rx = broker.subscribe("exec-1");
        broker.publish("exec-1", 7);
        broker.close("exec-1");
        assert_eq!(rx.recv().await, Some(7));
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn multiple_subscribers_each_get_every_update() {
        let broker: StreamBroker<u32> = StreamBroker::new();
        let mut a = broker.subscribe("exec-1");
        let mut b = broker.subscribe("exec-1");
        broker.publish("exec-1", 42);
        assert_eq!(a.recv().await, Some(42));
        assert_eq!(b.recv().await, Some(42));
    }

    #[tokio::test]
    async fn dropping_one_subscription_does_not_affect_another() {
        let broker: StreamBroker<u32> = StreamBroker::new();
        let a = broker.subscribe("exec-1");
        let mut b = broker.subscribe("exec-1");
        drop(a);
        broker.publish("exec-1", 9);
        assert_eq!(b.recv().await, Some(9));
        assert_eq!(broker.subscribers.get("exec-1").unwrap().channels.len(), 1);
    }

    #[tokio::test]
    async fn full_channel_drops_oldest_update_not_the_newest() {
        let broker: StreamBroker<u32> = StreamBroker::new();
        let mut rx = broker.subscribe("exec-1");
        for i in 0..(SUBSCRIBER_BUFFER as u32 + 1) {
            broker.publish("exec-1", i);
        }
        // The oldest update (0) was evicted to make room for the newest
        // (SUBSCRIBER_BUFFER); the first update a slow subscriber observes
        // is therefore 1, and the newest one did make it in.
        assert_eq!(rx.recv().await, Some(1));
    }
}
