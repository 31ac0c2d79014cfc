//! Live fan-out broadcaster
//!
//! Maintains the in-memory, process-local registry of open dashboard
//! subscriber channels, keyed by tenant. The registry is rebuilt from nothing
//! on restart; delivery is best-effort, at most once per publish, and
//! subscribers are expected to treat the stream as a hint to re-fetch rather
//! than the sole source of truth.
//!
//! The broadcaster is an explicit service object constructed once at process
//! start and passed by reference into request handlers; horizontal scale-out
//! requires sticky routing of a tenant's subscribers to one instance.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll};

use dashmap::DashMap;
use futures::Stream;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use shared::primitives::WrappedChronoDateTime;
use tokio::sync::mpsc;
use tracing::trace;
use utoipa::ToSchema;

/// Tag identifying what changed, carried on every pushed event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum StreamEventKind {
    Connected,
    Heartbeat,
    NewMessage,
    ReactionUpdate,
    NewThreadReply,
    AppUninstalled,
    UserTokensRevoked,
}

/// A tagged event pushed to live dashboard subscribers.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, JsonSchema)]
pub struct StreamEvent {
    #[serde(rename = "type")]
    pub kind: StreamEventKind,
    /// Enough payload (ids, text, author) for a subscriber to render the
    /// change without a full re-fetch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    pub timestamp: WrappedChronoDateTime,
}

impl StreamEvent {
    pub fn new(kind: StreamEventKind, data: Value) -> Self {
        Self {
            kind,
            data: Some(data),
            timestamp: WrappedChronoDateTime::now(),
        }
    }

    pub fn connected(tenant_id: &str) -> Self {
        Self::new(StreamEventKind::Connected, json!({ "tenant_id": tenant_id }))
    }

    pub fn heartbeat() -> Self {
        Self {
            kind: StreamEventKind::Heartbeat,
            data: None,
            timestamp: WrappedChronoDateTime::now(),
        }
    }
}

type SubscriberMap = HashMap<u64, mpsc::UnboundedSender<StreamEvent>>;

/// Per-tenant subscriber registry.
#[derive(Default)]
pub struct Broadcaster {
    subscribers: DashMap<String, SubscriberMap>,
    next_id: AtomicU64,
}

impl Broadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a live subscriber for a tenant.
    ///
    /// The returned subscription immediately yields a `connected` event and
    /// unregisters itself when dropped (transport disconnect).
    pub fn subscribe(self: &Arc<Self>, tenant_id: &str) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        // Queued before registration is visible, so `connected` is always
        // the first event a subscriber sees.
        let _ = tx.send(StreamEvent::connected(tenant_id));
        self.subscribers
            .entry(tenant_id.to_string())
            .or_default()
            .insert(id, tx);
        trace!(tenant_id = %tenant_id, subscriber_id = id, "Subscriber registered");
        Subscription {
            tenant_id: tenant_id.to_string(),
            id,
            rx,
            broadcaster: Arc::clone(self),
        }
    }

    /// Push an event to every live subscriber of a tenant.
    ///
    /// A failed send marks that subscriber dead and removes it; a tenant
    /// whose subscriber set empties is pruned from the registry entirely.
    pub fn publish(&self, tenant_id: &str, event: StreamEvent) {
        let Some(mut entry) = self.subscribers.get_mut(tenant_id) else {
            return;
        };
        entry.retain(|id, tx| {
            let alive = tx.send(event.clone()).is_ok();
            if !alive {
                trace!(tenant_id = %tenant_id, subscriber_id = id, "Dropping dead subscriber");
            }
            alive
        });
        let now_empty = entry.is_empty();
        drop(entry);
        if now_empty {
            self.subscribers
                .remove_if(tenant_id, |_, senders| senders.is_empty());
        }
    }

    pub fn subscriber_count(&self, tenant_id: &str) -> usize {
        self.subscribers
            .get(tenant_id)
            .map(|entry| entry.len())
            .unwrap_or(0)
    }

    /// Whether the registry still holds an entry for this tenant at all.
    pub fn has_tenant_entry(&self, tenant_id: &str) -> bool {
        self.subscribers.contains_key(tenant_id)
    }

    fn unsubscribe(&self, tenant_id: &str, id: u64) {
        if let Some(mut entry) = self.subscribers.get_mut(tenant_id) {
            entry.remove(&id);
            let now_empty = entry.is_empty();
            drop(entry);
            if now_empty {
                self.subscribers
                    .remove_if(tenant_id, |_, senders| senders.is_empty());
            }
        }
        trace!(tenant_id = %tenant_id, subscriber_id = id, "Subscriber removed");
    }
}

/// A registered subscriber channel; a `Stream` of [`StreamEvent`]s that
/// unregisters itself on drop.
pub struct Subscription {
    tenant_id: String,
    id: u64,
    rx: mpsc::UnboundedReceiver<StreamEvent>,
    broadcaster: Arc<Broadcaster>,
}

impl Subscription {
    pub async fn recv(&mut self) -> Option<StreamEvent> {
        self.rx.recv().await
    }
}

impl Stream for Subscription {
    type Item = StreamEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().rx.poll_recv(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.broadcaster.unsubscribe(&self.tenant_id, self.id);
    }
}

#[cfg(test)]
mod tests {
    mod unit {
        use super::super::*;

        #[tokio::test]
        async fn test_subscribe_emits_connected_first() {
            let broadcaster = Arc::new(Broadcaster::new());
            let mut sub = broadcaster.subscribe("tenant-1");
            let event = sub.recv().await.expect("connected event");
            assert_eq!(event.kind, StreamEventKind::Connected);
            assert_eq!(
                event.data.unwrap()["tenant_id"],
                serde_json::json!("tenant-1")
            );
        }

        #[tokio::test]
        async fn test_publish_reaches_all_tenant_subscribers() {
            let broadcaster = Arc::new(Broadcaster::new());
            let mut a = broadcaster.subscribe("tenant-1");
            let mut b = broadcaster.subscribe("tenant-1");
            let mut other = broadcaster.subscribe("tenant-2");
            // Drain connected events.
            a.recv().await.unwrap();
            b.recv().await.unwrap();
            other.recv().await.unwrap();

            broadcaster.publish(
                "tenant-1",
                StreamEvent::new(StreamEventKind::NewMessage, serde_json::json!({"id": "1.2"})),
            );
            assert_eq!(a.recv().await.unwrap().kind, StreamEventKind::NewMessage);
            assert_eq!(b.recv().await.unwrap().kind, StreamEventKind::NewMessage);
            assert!(other.rx.try_recv().is_err());
        }

        #[tokio::test]
        async fn test_drop_unsubscribes_and_prunes_registry() {
            let broadcaster = Arc::new(Broadcaster::new());
            let sub = broadcaster.subscribe("tenant-1");
            assert_eq!(broadcaster.subscriber_count("tenant-1"), 1);
            drop(sub);
            assert_eq!(broadcaster.subscriber_count("tenant-1"), 0);
            assert!(!broadcaster.has_tenant_entry("tenant-1"));
        }

        #[tokio::test]
        async fn test_publish_prunes_dead_subscribers() {
            let broadcaster = Arc::new(Broadcaster::new());
            let mut kept = broadcaster.subscribe("tenant-1");
            kept.recv().await.unwrap();

            // Simulate a dead transport: close the receiver while the
            // subscriber is still registered.
            let mut dead = broadcaster.subscribe("tenant-1");
            dead.rx.close();
            assert_eq!(broadcaster.subscriber_count("tenant-1"), 2);

            broadcaster.publish("tenant-1", StreamEvent::heartbeat());
            assert_eq!(broadcaster.subscriber_count("tenant-1"), 1);
            kept.recv().await.unwrap();
        }

        #[tokio::test]
        async fn test_publish_without_subscribers_is_noop() {
            let broadcaster = Broadcaster::new();
            broadcaster.publish("nobody", StreamEvent::heartbeat());
            assert_eq!(broadcaster.subscriber_count("nobody"), 0);
        }

        #[test]
        fn test_stream_event_serialization_tags_type() {
            let event = StreamEvent::new(
                StreamEventKind::ReactionUpdate,
                serde_json::json!({"conversation_id": "1.2"}),
            );
            let json = serde_json::to_string(&event).unwrap();
            assert!(json.contains("\"type\":\"reaction_update\""));
        }
    }
}
