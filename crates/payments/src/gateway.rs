use async_trait::async_trait;
use mockall::automock;
use serde::Deserialize;
use thiserror::Error;
use uuid::Uuid;

use crate::webhook_events::StripeEvent;

#[derive(Debug, Error)]
pub enum GatewayError {
    /// The remote id no longer resolves (deleted remotely, wrong
    /// environment, or a remote-side reset). Sync adapters recover from
    /// this by recreating the entity.
    #[error("remote entity not found")]
    NotFound,
    #[error("webhook signature rejected: {0}")]
    SignatureInvalid(String),
    #[error("processor api request failed: {context} (status {status}, code {code:?})")]
    Api {
        context: &'static str,
        status: u16,
        code: Option<String>,
        message: Option<String>,
        request_id: Option<String>,
    },
    #[error(transparent)]
    Transport(#[from] reqwest::Error),
    #[error("unexpected processor payload: {0}")]
    Payload(#[from] serde_json::Error),
}

pub type GatewayResult<T> = Result<T, GatewayError>;

#[derive(Debug, Clone, Deserialize)]
pub struct RemoteCustomer {
    pub id: String,
    pub email: Option<String>,
    #[serde(default)]
    pub deleted: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemoteProduct {
    pub id: String,
    pub name: Option<String>,
    #[serde(default)]
    pub active: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemoteRecurrence {
    pub interval: String,
    pub interval_count: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemotePrice {
    pub id: String,
    pub unit_amount: Option<i64>,
    pub currency: Option<String>,
    pub product: Option<String>,
    pub recurring: Option<RemoteRecurrence>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RemoteSubscriptionItems {
    pub data: Vec<RemoteSubscriptionItem>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemoteSubscriptionItem {
    pub id: Option<String>,
    pub quantity: Option<i64>,
    pub current_period_start: Option<i64>,
    pub current_period_end: Option<i64>,
    pub price: Option<RemotePriceRef>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemotePriceRef {
    pub id: String,
}

/// Snapshot of a processor-side subscription, as returned by mutating calls
/// and carried inside webhook payloads. Timestamps are unix seconds.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteSubscription {
    pub id: String,
    pub customer: String,
    pub status: String,
    pub quantity: Option<i64>,
    pub current_period_start: Option<i64>,
    pub current_period_end: Option<i64>,
    pub billing_cycle_anchor: Option<i64>,
    pub cancel_at: Option<i64>,
    pub canceled_at: Option<i64>,
    pub ended_at: Option<i64>,
    pub trial_start: Option<i64>,
    pub trial_end: Option<i64>,
    #[serde(default)]
    pub cancel_at_period_end: bool,
    pub collection_method: Option<String>,
    #[serde(default)]
    pub items: RemoteSubscriptionItems,
}

impl RemoteSubscription {
    /// Period start, falling back to the first item or the billing cycle
    /// anchor when the top-level field is absent.
    pub fn period_start(&self) -> Option<i64> {
        self.current_period_start
            .or_else(|| {
                self.items
                    .data
                    .first()
                    .and_then(|item| item.current_period_start)
            })
            .or(self.billing_cycle_anchor)
    }

    pub fn period_end(&self) -> Option<i64> {
        self.current_period_end.or_else(|| {
            self.items
                .data
                .first()
                .and_then(|item| item.current_period_end)
        })
    }

    pub fn effective_quantity(&self) -> i64 {
        self.quantity
            .or_else(|| self.items.data.first().and_then(|item| item.quantity))
            .unwrap_or(1)
    }

    pub fn price_id(&self) -> Option<&str> {
        self.items
            .data
            .first()
            .and_then(|item| item.price.as_ref())
            .map(|price| price.id.as_str())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemoteInvoice {
    pub id: String,
    pub customer: Option<String>,
    pub subscription: Option<String>,
    pub status: Option<String>,
    pub amount_due: Option<i64>,
    pub amount_paid: Option<i64>,
    pub currency: Option<String>,
    pub payment_intent: Option<String>,
    pub period_start: Option<i64>,
    pub period_end: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct CreateSubscriptionRequest {
    pub customer: String,
    pub price: String,
    pub quantity: i64,
    pub default_payment_method: Option<String>,
    pub trial_period_days: Option<i32>,
    /// Fresh per logical attempt; the processor dedupes retries on it.
    pub idempotency_key: String,
}

#[derive(Debug, Clone, Default)]
pub struct SubscriptionChange {
    pub quantity: Option<i64>,
    pub price: Option<String>,
}

/// Capability interface over the external payment processor. The engine
/// only ever talks through this trait; adding a processor means adding one
/// adapter, not touching the lifecycle or webhook code.
#[automock]
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_customer(
        &self,
        email: &str,
        name: &str,
        user_id: Uuid,
    ) -> GatewayResult<String>;

    async fn retrieve_customer(&self, stripe_customer_id: &str) -> GatewayResult<RemoteCustomer>;

    async fn create_product<'a>(
        &self,
        name: &str,
        description: Option<&'a str>,
        product_id: Uuid,
    ) -> GatewayResult<String>;

    async fn retrieve_product(&self, stripe_product_id: &str) -> GatewayResult<RemoteProduct>;

    async fn create_price(
        &self,
        stripe_product_id: &str,
        amount_minor: i64,
        currency: &str,
        interval: &str,
        interval_count: i32,
    ) -> GatewayResult<String>;

    async fn retrieve_price(&self, stripe_price_id: &str) -> GatewayResult<RemotePrice>;

    async fn create_subscription(
        &self,
        request: CreateSubscriptionRequest,
    ) -> GatewayResult<RemoteSubscription>;

    /// Immediate cancellation on the remote side.
    async fn cancel_subscription(
        &self,
        stripe_subscription_id: &str,
    ) -> GatewayResult<RemoteSubscription>;

    async fn cancel_at_period_end(
        &self,
        stripe_subscription_id: &str,
    ) -> GatewayResult<RemoteSubscription>;

    async fn update_subscription(
        &self,
        stripe_subscription_id: &str,
        change: SubscriptionChange,
    ) -> GatewayResult<RemoteSubscription>;

    /// Attaching a payment method already attached to the same customer is
    /// a no-op.
    async fn attach_payment_method(
        &self,
        payment_method_id: &str,
        stripe_customer_id: &str,
    ) -> GatewayResult<()>;

    fn verify_webhook(&self, payload: &[u8], signature_header: &str) -> GatewayResult<StripeEvent>;
}
