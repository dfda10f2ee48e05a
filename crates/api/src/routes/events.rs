//! Server-sent event stream over the realtime hub.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use common::RestaurantId;
use futures_util::Stream;
use notifications::NotificationStore;
use order_store::OrderStore;
use realtime::Channel;
use tokio::sync::broadcast::error::RecvError;
use uuid::Uuid;

use super::orders::AppState;
use super::parse_id;
use crate::error::ApiError;

fn channel(scope: &str, id: &str) -> Result<Channel, ApiError> {
    let id: Uuid = parse_id(id, "channel id")?;
    match scope {
        "session" => Ok(Channel::Session(id.into())),
        "staff" => Ok(Channel::Staff(id.into())),
        "restaurant" => Ok(Channel::Restaurant(id.into())),
        other => Err(ApiError::BadRequest(format!("Unknown channel scope: {other}"))),
    }
}

/// GET /events/{scope}/{id} — streams the channel's named events.
///
/// Each SSE message carries the event name (`order_assigned`,
/// `order_status_changed`, ...) and the full event as JSON data. The stream
/// ends when the hub shuts down.
#[tracing::instrument(skip(state))]
pub async fn stream<S: OrderStore + 'static, N: NotificationStore + 'static>(
    State(state): State<Arc<AppState<S, N>>>,
    Path((scope, id)): Path<(String, String)>,
) -> Result<Sse<impl Stream<Item = Result<SseEvent, Infallible>>>, ApiError> {
    let channel = channel(&scope, &id)?;
    Ok(channel_events(&state, channel))
}

/// GET /restaurants/{id}/events — the owner dashboard feed.
#[tracing::instrument(skip(state))]
pub async fn restaurant<S: OrderStore + 'static, N: NotificationStore + 'static>(
    State(state): State<Arc<AppState<S, N>>>,
    Path(id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<SseEvent, Infallible>>>, ApiError> {
    let restaurant_id: RestaurantId = parse_id(&id, "restaurant id")?;
    Ok(channel_events(&state, Channel::Restaurant(restaurant_id)))
}

fn channel_events<S: OrderStore, N: NotificationStore>(
    state: &AppState<S, N>,
    channel: Channel,
) -> Sse<impl Stream<Item = Result<SseEvent, Infallible>> + use<S, N>> {
    let rx = state.engine.realtime().receiver(&channel);
    tracing::debug!(%channel, "SSE client connected");

    let events = futures_util::stream::unfold(rx, move |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    let payload =
                        serde_json::to_string(&event).unwrap_or_else(|_| "{}".to_string());
                    let sse = SseEvent::default().event(event.event.as_str()).data(payload);
                    return Some((Ok(sse), rx));
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(%channel, skipped, "SSE subscriber lagged; dropping old events");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    });

    Sse::new(events).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(10))
            .text("keepalive"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_channel_scopes() {
        let id = Uuid::new_v4();
        let parsed = channel("staff", &id.to_string()).unwrap();
        assert_eq!(parsed, Channel::Staff(id.into()));
        assert!(matches!(
            channel("kitchen", &id.to_string()),
            Err(ApiError::BadRequest(_))
        ));
        assert!(matches!(
            channel("session", "nope"),
            Err(ApiError::BadRequest(_))
        ));
    }
}
