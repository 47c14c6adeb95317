use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

/// Topic names for the domain facts this engine announces.
pub mod topics {
    pub const SUBSCRIPTION_CREATED: &str = "billing.subscription.created";
    pub const SUBSCRIPTION_UPDATED: &str = "billing.subscription.updated";
    pub const SUBSCRIPTION_CANCELED: &str = "billing.subscription.canceled";
    pub const SUBSCRIPTION_CANCEL_SCHEDULED: &str = "billing.subscription.cancel_scheduled";
    pub const INVOICE_PAID: &str = "billing.invoice.paid";
    pub const INVOICE_PAYMENT_FAILED: &str = "billing.invoice.payment_failed";
}

#[derive(Debug, Clone, Serialize)]
pub struct EventEnvelope {
    pub id: Uuid,
    pub topic: String,
    pub timestamp: DateTime<Utc>,
    pub payload: serde_json::Value,
}

#[async_trait]
pub trait EventHandler: Send + Sync {
    fn name(&self) -> &str;

    async fn handle(&self, event: &EventEnvelope) -> anyhow::Result<()>;
}

/// In-process publish/subscribe channel for domain facts. Delivery is
/// fire-and-forget on a task per handler: at-least-once per subscriber, no
/// ordering guarantee across subscribers or topics, and a failing handler
/// never affects publishing or its peers.
///
/// With a retention window configured, published envelopes are kept around
/// and replayed (oldest first) to subscribers that register after the fact,
/// for consumers deployed later than their publisher.
pub struct EventBus {
    subscribers: RwLock<HashMap<String, Vec<Arc<dyn EventHandler>>>>,
    retention: Option<Duration>,
    retained: RwLock<HashMap<String, VecDeque<EventEnvelope>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            subscribers: RwLock::new(HashMap::new()),
            retention: None,
            retained: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_retention(window: Duration) -> Self {
        Self {
            subscribers: RwLock::new(HashMap::new()),
            retention: Some(window),
            retained: RwLock::new(HashMap::new()),
        }
    }

    pub async fn subscribe(&self, topic: &str, handler: Arc<dyn EventHandler>) {
        debug!(topic, handler = handler.name(), "event bus: subscribing");
        self.subscribers
            .write()
            .await
            .entry(topic.to_string())
            .or_default()
            .push(Arc::clone(&handler));

        if self.retention.is_some() {
            let retained = self.retained.read().await;
            if let Some(events) = retained.get(topic) {
                for event in events.iter().cloned() {
                    Self::dispatch(Arc::clone(&handler), event);
                }
            }
        }
    }

    pub async fn publish(&self, topic: &str, payload: serde_json::Value) -> Uuid {
        let envelope = EventEnvelope {
            id: Uuid::new_v4(),
            topic: topic.to_string(),
            timestamp: Utc::now(),
            payload,
        };

        if let Some(window) = self.retention {
            let cutoff = Utc::now() - window;
            let mut retained = self.retained.write().await;
            let events = retained.entry(topic.to_string()).or_default();
            while events
                .front()
                .is_some_and(|event| event.timestamp < cutoff)
            {
                events.pop_front();
            }
            events.push_back(envelope.clone());
        }

        let handlers = self
            .subscribers
            .read()
            .await
            .get(topic)
            .cloned()
            .unwrap_or_default();
        debug!(
            topic,
            event_id = %envelope.id,
            subscriber_count = handlers.len(),
            "event bus: publishing"
        );
        for handler in handlers {
            Self::dispatch(handler, envelope.clone());
        }

        envelope.id
    }

    fn dispatch(handler: Arc<dyn EventHandler>, event: EventEnvelope) {
        tokio::spawn(async move {
            if let Err(error) = handler.handle(&event).await {
                warn!(
                    handler = handler.name(),
                    topic = %event.topic,
                    event_id = %event.id,
                    error = ?error,
                    "event bus: handler failed"
                );
            }
        });
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
