//! Channel registry, named-event broadcast and change-feed subscriptions.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use common::{RestaurantId, SessionId, StaffId};
use dashmap::DashMap;
use domain::{DomainEvent, OrderEvent};
use order_store::{ChangeFeed, ChangeFilter, RowChange};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio_util::sync::CancellationToken;

use crate::Channel;

/// Default per-channel buffer.
const DEFAULT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub struct RealtimeConfig {
    /// Messages buffered per channel before slow subscribers start lagging.
    pub channel_capacity: usize,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

/// A named event broadcast on one channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RealtimeEvent {
    pub channel: String,
    pub event: String,
    pub payload: Value,
    pub sent_at: DateTime<Utc>,
}

pub type EventCallback = Arc<dyn Fn(&RealtimeEvent) + Send + Sync>;
pub type ChangeCallback = Arc<dyn Fn(&RowChange) + Send + Sync>;

/// Callbacks invoked for a subscription. Without `on_change` the
/// subscription does not listen to the change feed at all.
#[derive(Clone, Default)]
pub struct Handlers {
    on_event: Option<EventCallback>,
    on_change: Option<ChangeCallback>,
}

impl Handlers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_event(mut self, f: impl Fn(&RealtimeEvent) + Send + Sync + 'static) -> Self {
        self.on_event = Some(Arc::new(f));
        self
    }

    pub fn on_change(mut self, f: impl Fn(&RowChange) + Send + Sync + 'static) -> Self {
        self.on_change = Some(Arc::new(f));
        self
    }
}

struct Registration {
    id: u64,
    active: Arc<AtomicBool>,
    token: CancellationToken,
}

impl Registration {
    fn deactivate(&self) {
        self.active.store(false, Ordering::SeqCst);
        self.token.cancel();
    }
}

type Registry = DashMap<String, Registration>;
type Topics = DashMap<String, broadcast::Sender<RealtimeEvent>>;

/// Drops a channel's sender once nobody listens to it anymore.
fn prune_topic(topics: &Topics, name: &str) {
    topics.remove_if(name, |_, sender| sender.receiver_count() == 0);
}

/// Handle to one open subscription.
#[derive(Clone)]
pub struct SubscriptionHandle {
    channel: String,
    id: u64,
    active: Arc<AtomicBool>,
    token: CancellationToken,
    registry: Arc<Registry>,
}

impl SubscriptionHandle {
    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Stops handler invocations for this subscription.
    ///
    /// Safe to call repeatedly and after the channel was re-subscribed;
    /// a newer subscription on the same channel is left untouched.
    pub fn unsubscribe(&self) {
        self.active.store(false, Ordering::SeqCst);
        self.token.cancel();
        self.registry
            .remove_if(&self.channel, |_, registration| registration.id == self.id);
    }
}

impl std::fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionHandle")
            .field("channel", &self.channel)
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}

/// Registry of realtime channels and their subscriptions.
///
/// Each hub is independent; dropping it does not stop running
/// subscriptions, call [`RealtimeHub::close`] for that.
#[derive(Clone)]
pub struct RealtimeHub {
    config: RealtimeConfig,
    topics: Arc<Topics>,
    registry: Arc<Registry>,
    changes: ChangeFeed,
    next_id: Arc<AtomicU64>,
}

impl RealtimeHub {
    pub fn new(config: RealtimeConfig, changes: ChangeFeed) -> Self {
        Self {
            config,
            topics: Arc::new(DashMap::new()),
            registry: Arc::new(DashMap::new()),
            changes,
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    pub fn changes(&self) -> &ChangeFeed {
        &self.changes
    }

    /// Subscribes under the entry lock so pruning never orphans a receiver.
    fn subscribe_topic(&self, name: &str) -> broadcast::Receiver<RealtimeEvent> {
        self.topics
            .entry(name.to_string())
            .or_insert_with(|| broadcast::channel(self.config.channel_capacity.max(1)).0)
            .subscribe()
    }

    /// Returns a raw receiver for a channel's named events, for stream bridges.
    ///
    /// The channel lives while at least one receiver exists.
    pub fn receiver(&self, channel: &Channel) -> broadcast::Receiver<RealtimeEvent> {
        self.subscribe_topic(&channel.name())
    }

    /// Number of channels that currently have listeners.
    pub fn channel_count(&self) -> usize {
        self.topics.len()
    }

    pub fn subscribe_session(&self, session_id: SessionId, handlers: Handlers) -> SubscriptionHandle {
        self.subscribe(Channel::Session(session_id), handlers)
    }

    pub fn subscribe_staff(&self, staff_id: StaffId, handlers: Handlers) -> SubscriptionHandle {
        self.subscribe(Channel::Staff(staff_id), handlers)
    }

    pub fn subscribe_restaurant(
        &self,
        restaurant_id: RestaurantId,
        handlers: Handlers,
    ) -> SubscriptionHandle {
        self.subscribe(Channel::Restaurant(restaurant_id), handlers)
    }

    /// Subscribes with the channel's default change filter.
    pub fn subscribe(&self, channel: Channel, handlers: Handlers) -> SubscriptionHandle {
        let filter = channel.default_filter();
        self.subscribe_filtered(channel, filter, handlers)
    }

    /// Subscribes to a channel, replacing any open subscription on it.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn subscribe_filtered(
        &self,
        channel: Channel,
        filter: ChangeFilter,
        handlers: Handlers,
    ) -> SubscriptionHandle {
        let name = channel.name();
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let active = Arc::new(AtomicBool::new(true));
        let token = CancellationToken::new();

        let events = self.subscribe_topic(&name);
        let changes = handlers.on_change.as_ref().map(|_| self.changes.subscribe());

        let previous = self.registry.insert(
            name.clone(),
            Registration {
                id,
                active: active.clone(),
                token: token.clone(),
            },
        );
        if let Some(previous) = previous {
            tracing::debug!(channel = %name, "Replacing existing subscription");
            previous.deactivate();
        }

        tokio::spawn(run_subscription(
            name.clone(),
            events,
            changes,
            filter,
            handlers,
            active.clone(),
            token.clone(),
            self.topics.clone(),
        ));

        tracing::debug!(channel = %name, subscription_id = id, "Subscribed");

        SubscriptionHandle {
            channel: name,
            id,
            active,
            token,
            registry: self.registry.clone(),
        }
    }

    /// Broadcasts a named event. Returns how many receivers it reached.
    ///
    /// Channels nobody listens to are skipped without being created.
    pub fn broadcast(&self, channel: &Channel, event: &str, payload: Value) -> usize {
        let name = channel.name();
        let delivered = match self.topics.get(&name) {
            Some(sender) => sender.send(RealtimeEvent {
                channel: name.clone(),
                event: event.to_string(),
                payload,
                sent_at: Utc::now(),
            }),
            None => return 0,
        };
        match delivered {
            Ok(receivers) => {
                metrics::counter!("realtime_messages_published_total").increment(1);
                receivers
            }
            Err(_) => {
                prune_topic(&self.topics, &name);
                0
            }
        }
    }

    /// Publishes an order event to the restaurant channel, the session
    /// channel (if any) and the channel of every staff member involved.
    pub fn publish_event(&self, event: &OrderEvent) -> usize {
        let payload = match serde_json::to_value(event) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(event_type = event.event_type(), error = %e, "Failed to encode realtime event");
                return 0;
            }
        };

        let mut channels = vec![Channel::Restaurant(event.restaurant_id())];
        if let Some(session_id) = event.session_id() {
            channels.push(Channel::Session(session_id));
        }
        channels.extend(event.staff_ids().into_iter().map(Channel::Staff));

        channels
            .iter()
            .map(|channel| self.broadcast(channel, event.event_type(), payload.clone()))
            .sum()
    }

    pub fn is_subscribed(&self, channel: &Channel) -> bool {
        self.registry.contains_key(&channel.name())
    }

    pub fn subscription_count(&self) -> usize {
        self.registry.len()
    }

    /// Tears down every open subscription.
    pub fn unsubscribe_all(&self) {
        let count = self.registry.len();
        self.registry.retain(|_, registration| {
            registration.deactivate();
            false
        });
        tracing::debug!(count, "Unsubscribed all channels");
    }

    /// Tears down every subscription and drops all channels.
    pub fn close(&self) {
        self.unsubscribe_all();
        self.topics.clear();
    }
}

async fn run_subscription(
    channel: String,
    mut events: broadcast::Receiver<RealtimeEvent>,
    mut changes: Option<broadcast::Receiver<RowChange>>,
    filter: ChangeFilter,
    handlers: Handlers,
    active: Arc<AtomicBool>,
    token: CancellationToken,
    topics: Arc<Topics>,
) {
    loop {
        tokio::select! {
            biased;

            _ = token.cancelled() => break,

            received = events.recv() => match received {
                Ok(event) => {
                    if !active.load(Ordering::SeqCst) {
                        break;
                    }
                    if let Some(on_event) = &handlers.on_event {
                        on_event(&event);
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(%channel, skipped, "Subscriber lagged behind channel");
                }
                Err(RecvError::Closed) => break,
            },

            received = next_change(&mut changes) => match received {
                Ok(change) => {
                    if !active.load(Ordering::SeqCst) {
                        break;
                    }
                    if filter.matches(&change) {
                        if let Some(on_change) = &handlers.on_change {
                            on_change(&change);
                        }
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(%channel, skipped, "Subscriber lagged behind change feed");
                }
                Err(RecvError::Closed) => changes = None,
            },
        }
    }
    drop(events);
    prune_topic(&topics, &channel);
    tracing::debug!(%channel, "Subscription stopped");
}

async fn next_change(
    changes: &mut Option<broadcast::Receiver<RowChange>>,
) -> Result<RowChange, RecvError> {
    match changes {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hub() -> RealtimeHub {
        RealtimeHub::new(RealtimeConfig::default(), ChangeFeed::new(16))
    }

    #[tokio::test]
    async fn resubscribe_replaces_registration() {
        let hub = hub();
        let restaurant = RestaurantId::new();
        let first = hub.subscribe_restaurant(restaurant, Handlers::new());
        let second = hub.subscribe_restaurant(restaurant, Handlers::new());

        assert!(!first.is_active());
        assert!(second.is_active());
        assert_eq!(hub.subscription_count(), 1);

        // Unsubscribing the stale handle leaves the replacement registered.
        first.unsubscribe();
        assert!(hub.is_subscribed(&Channel::Restaurant(restaurant)));

        second.unsubscribe();
        second.unsubscribe();
        assert_eq!(hub.subscription_count(), 0);
    }

    #[tokio::test]
    async fn broadcast_without_subscribers() {
        let hub = hub();
        assert_eq!(
            hub.broadcast(&Channel::Staff(StaffId::new()), "ping", Value::Null),
            0
        );
    }

    #[tokio::test]
    async fn unheard_channels_are_not_retained() {
        let hub = hub();
        for _ in 0..1_000 {
            hub.broadcast(&Channel::Session(SessionId::new()), "order_created", Value::Null);
        }
        assert_eq!(hub.channel_count(), 0);
    }

    #[tokio::test]
    async fn dropped_receiver_channel_is_pruned_on_next_broadcast() {
        let hub = hub();
        let channel = Channel::Session(SessionId::new());
        let rx = hub.receiver(&channel);
        assert_eq!(hub.broadcast(&channel, "order_created", Value::Null), 1);
        assert_eq!(hub.channel_count(), 1);

        drop(rx);
        assert_eq!(hub.broadcast(&channel, "order_assigned", Value::Null), 0);
        assert_eq!(hub.channel_count(), 0);
    }

    #[tokio::test]
    async fn unsubscribed_channel_is_released() {
        let hub = hub();
        let handle = hub.subscribe_staff(StaffId::new(), Handlers::new());
        assert_eq!(hub.channel_count(), 1);

        handle.unsubscribe();
        for _ in 0..100 {
            if hub.channel_count() == 0 {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(hub.channel_count(), 0);
    }

    #[tokio::test]
    async fn unsubscribe_all_clears_registry() {
        let hub = hub();
        let a = hub.subscribe_session(SessionId::new(), Handlers::new());
        let b = hub.subscribe_staff(StaffId::new(), Handlers::new());
        hub.unsubscribe_all();

        assert_eq!(hub.subscription_count(), 0);
        assert!(!a.is_active());
        assert!(!b.is_active());
    }

    #[tokio::test]
    async fn receiver_sees_broadcasts_in_order() {
        let hub = hub();
        let channel = Channel::Restaurant(RestaurantId::new());
        let mut rx = hub.receiver(&channel);
        hub.broadcast(&channel, "first", Value::from(1));
        hub.broadcast(&channel, "second", Value::from(2));

        assert_eq!(rx.recv().await.unwrap().event, "first");
        assert_eq!(rx.recv().await.unwrap().event, "second");
    }
}
