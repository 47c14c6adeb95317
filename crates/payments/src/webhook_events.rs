use serde::Deserialize;

use crate::gateway::{GatewayError, RemoteInvoice, RemoteSubscription};

/// Raw webhook envelope as the processor sends it. `type_` is an open
/// string enum; `data.object` stays untyped until the event type is known.
#[derive(Debug, Deserialize)]
pub struct StripeEvent {
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub type_: String,
    pub created: Option<i64>,
    pub livemode: Option<bool>,
    pub data: StripeEventData,
}

#[derive(Debug, Deserialize)]
pub struct StripeEventData {
    pub object: serde_json::Value,
}

/// Typed view of the events the engine reconciles. Unrecognized types are
/// carried through so new processor events never break ingestion.
#[derive(Debug)]
pub enum WebhookEvent {
    SubscriptionCreated(RemoteSubscription),
    SubscriptionUpdated(RemoteSubscription),
    SubscriptionDeleted(RemoteSubscription),
    InvoicePaid(RemoteInvoice),
    InvoicePaymentFailed(RemoteInvoice),
    Unknown { event_type: String },
}

impl WebhookEvent {
    pub fn from_event(event: &StripeEvent) -> Result<Self, GatewayError> {
        let object = event.data.object.clone();
        Ok(match event.type_.as_str() {
            "customer.subscription.created" => {
                WebhookEvent::SubscriptionCreated(serde_json::from_value(object)?)
            }
            "customer.subscription.updated" => {
                WebhookEvent::SubscriptionUpdated(serde_json::from_value(object)?)
            }
            "customer.subscription.deleted" => {
                WebhookEvent::SubscriptionDeleted(serde_json::from_value(object)?)
            }
            "invoice.paid" | "invoice.payment_succeeded" => {
                WebhookEvent::InvoicePaid(serde_json::from_value(object)?)
            }
            "invoice.payment_failed" => {
                WebhookEvent::InvoicePaymentFailed(serde_json::from_value(object)?)
            }
            other => WebhookEvent::Unknown {
                event_type: other.to_string(),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn envelope(type_: &str, object: serde_json::Value) -> StripeEvent {
        StripeEvent {
            id: Some("evt_1".to_string()),
            type_: type_.to_string(),
            created: Some(1_700_000_000),
            livemode: Some(false),
            data: StripeEventData { object },
        }
    }

    #[test]
    fn decodes_subscription_created() {
        let event = envelope(
            "customer.subscription.created",
            json!({
                "id": "sub_123",
                "customer": "cus_123",
                "status": "active",
                "current_period_start": 1_700_000_000,
                "current_period_end": 1_702_592_000,
                "items": { "data": [ { "id": "si_1", "quantity": 2, "price": { "id": "price_123" } } ] }
            }),
        );

        match WebhookEvent::from_event(&event).unwrap() {
            WebhookEvent::SubscriptionCreated(sub) => {
                assert_eq!(sub.id, "sub_123");
                assert_eq!(sub.effective_quantity(), 2);
                assert_eq!(sub.price_id(), Some("price_123"));
            }
            other => panic!("unexpected decode: {other:?}"),
        }
    }

    #[test]
    fn decodes_invoice_paid() {
        let event = envelope(
            "invoice.paid",
            json!({
                "id": "in_123",
                "customer": "cus_123",
                "subscription": "sub_123",
                "status": "paid",
                "amount_due": 2000,
                "amount_paid": 2000,
                "currency": "usd"
            }),
        );

        match WebhookEvent::from_event(&event).unwrap() {
            WebhookEvent::InvoicePaid(invoice) => {
                assert_eq!(invoice.id, "in_123");
                assert_eq!(invoice.amount_paid, Some(2000));
            }
            other => panic!("unexpected decode: {other:?}"),
        }
    }

    #[test]
    fn unknown_event_types_are_preserved() {
        let event = envelope("charge.refunded", json!({ "id": "ch_1" }));

        match WebhookEvent::from_event(&event).unwrap() {
            WebhookEvent::Unknown { event_type } => assert_eq!(event_type, "charge.refunded"),
            other => panic!("unexpected decode: {other:?}"),
        }
    }

    #[test]
    fn malformed_known_event_payload_is_an_error() {
        let event = envelope("customer.subscription.updated", json!({ "customer": 42 }));
        assert!(WebhookEvent::from_event(&event).is_err());
    }

    #[test]
    fn period_falls_back_to_items_then_anchor() {
        let sub: RemoteSubscription = serde_json::from_value(json!({
            "id": "sub_1",
            "customer": "cus_1",
            "status": "active",
            "billing_cycle_anchor": 1_700_000_000,
            "items": { "data": [ { "id": "si_1", "current_period_end": 1_702_592_000 } ] }
        }))
        .unwrap();

        assert_eq!(sub.period_start(), Some(1_700_000_000));
        assert_eq!(sub.period_end(), Some(1_702_592_000));
    }
}
