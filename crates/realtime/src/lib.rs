//! Realtime propagation of order workflow changes.
//!
//! Three channel scopes ([`Channel`]): per session, per staff member and per
//! restaurant. Each channel carries two kinds of traffic:
//! - named events broadcast with a JSON payload ([`RealtimeEvent`])
//! - persisted row changes from the order store's change feed, filtered per subscription
//!
//! [`RealtimeHub`] owns the registry of open subscriptions. Subscribing to a
//! channel that is already open replaces the previous subscription.

pub mod channel;
pub mod hub;

pub use channel::Channel;
pub use hub::{
    ChangeCallback, EventCallback, Handlers, RealtimeConfig, RealtimeEvent, RealtimeHub,
    SubscriptionHandle,
};
