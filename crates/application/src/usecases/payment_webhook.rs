use std::sync::Arc;

use chrono::Utc;
use domain::repositories::customers::CustomerRepository;
use domain::repositories::invoices::InvoiceRepository;
use domain::repositories::prices::PriceRepository;
use domain::repositories::subscriptions::SubscriptionRepository;
use domain::value_objects::enums::invoice_statuses::InvoiceStatus;
use domain::value_objects::enums::subscription_statuses::SubscriptionStatus;
use domain::value_objects::invoices::InvoicePatch;
use domain::entities::invoices::InsertInvoiceEntity;
use payments::gateway::{GatewayError, PaymentGateway, RemoteInvoice, RemoteSubscription};
use payments::webhook_events::WebhookEvent;
use serde_json::json;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::event_bus::{EventBus, topics};
use crate::usecases::projection;

#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("webhook signature verification failed")]
    SignatureInvalid,
    #[error("invalid webhook payload: {0}")]
    Payload(String),
    #[error("reconciliation failed: {0}")]
    Reconciliation(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl WebhookError {
    /// Only signature failures push back on the sender. Every other outcome
    /// is acknowledged; redelivery cannot fix a reconciliation gap and a
    /// non-2xx answer would only trigger a redelivery storm.
    pub fn status_code(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            WebhookError::SignatureInvalid => StatusCode::BAD_REQUEST,
            _ => StatusCode::OK,
        }
    }
}

pub type WebhookResult<T> = Result<T, WebhookError>;

/// Verifies, decodes, and reconciles inbound processor webhooks. Every
/// routine is idempotent under redelivery: lookup by remote id first, then
/// branch create-vs-update, so the synchronous path and replayed events
/// converge on the same rows.
pub struct PaymentWebhookUseCase<C, Pr, S, I, G>
where
    C: CustomerRepository + Send + Sync + 'static,
    Pr: PriceRepository + Send + Sync + 'static,
    S: SubscriptionRepository + Send + Sync + 'static,
    I: InvoiceRepository + Send + Sync + 'static,
    G: PaymentGateway + Send + Sync + 'static,
{
    customer_repo: Arc<C>,
    price_repo: Arc<Pr>,
    subscription_repo: Arc<S>,
    invoice_repo: Arc<I>,
    gateway: Arc<G>,
    event_bus: Arc<EventBus>,
}

impl<C, Pr, S, I, G> PaymentWebhookUseCase<C, Pr, S, I, G>
where
    C: CustomerRepository + Send + Sync + 'static,
    Pr: PriceRepository + Send + Sync + 'static,
    S: SubscriptionRepository + Send + Sync + 'static,
    I: InvoiceRepository + Send + Sync + 'static,
    G: PaymentGateway + Send + Sync + 'static,
{
    pub fn new(
        customer_repo: Arc<C>,
        price_repo: Arc<Pr>,
        subscription_repo: Arc<S>,
        invoice_repo: Arc<I>,
        gateway: Arc<G>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            customer_repo,
            price_repo,
            subscription_repo,
            invoice_repo,
            gateway,
            event_bus,
        }
    }

    pub async fn handle_webhook(
        &self,
        payload: &[u8],
        signature_header: &str,
    ) -> WebhookResult<()> {
        let event = self
            .gateway
            .verify_webhook(payload, signature_header)
            .map_err(|err| match err {
                GatewayError::SignatureInvalid(reason) => {
                    warn!(reason = %reason, "payment webhook rejected");
                    WebhookError::SignatureInvalid
                }
                GatewayError::Payload(err) => WebhookError::Payload(err.to_string()),
                other => WebhookError::Internal(anyhow::Error::new(other)),
            })?;

        let event_type = event.type_.clone();
        info!(event_type = %event_type, event_id = ?event.id, "payment webhook verified");

        let parsed = WebhookEvent::from_event(&event)
            .map_err(|err| WebhookError::Payload(err.to_string()))?;

        let result = match parsed {
            WebhookEvent::SubscriptionCreated(snapshot) => {
                self.reconcile_subscription_created(snapshot).await
            }
            WebhookEvent::SubscriptionUpdated(snapshot) => {
                self.reconcile_subscription_updated(snapshot).await
            }
            WebhookEvent::SubscriptionDeleted(snapshot) => {
                self.reconcile_subscription_deleted(snapshot).await
            }
            WebhookEvent::InvoicePaid(invoice) => {
                self.reconcile_invoice(
                    invoice,
                    InvoiceStatus::Paid,
                    SubscriptionStatus::Active,
                    topics::INVOICE_PAID,
                )
                .await
            }
            WebhookEvent::InvoicePaymentFailed(invoice) => {
                self.reconcile_invoice(
                    invoice,
                    InvoiceStatus::Open,
                    SubscriptionStatus::PastDue,
                    topics::INVOICE_PAYMENT_FAILED,
                )
                .await
            }
            WebhookEvent::Unknown { event_type } => {
                debug!(event_type = %event_type, "ignoring unhandled payment webhook event type");
                Ok(())
            }
        };

        match &result {
            Ok(()) => {}
            Err(WebhookError::Reconciliation(reason)) => {
                error!(
                    event_type = %event_type,
                    reason = %reason,
                    "payment webhook reconciliation failed"
                );
            }
            Err(err) => {
                error!(
                    event_type = %event_type,
                    error = ?err,
                    "payment webhook processing failed"
                );
            }
        }

        result
    }

    /// The synchronous path usually wins the race and this event is a
    /// no-op. When the subscription was born remotely (or the local row was
    /// lost), the owning user and price are resolved by their remote ids
    /// and the row is created here.
    async fn reconcile_subscription_created(
        &self,
        snapshot: RemoteSubscription,
    ) -> WebhookResult<()> {
        if let Some(existing) = self
            .subscription_repo
            .find_by_stripe_subscription_id(&snapshot.id)
            .await?
        {
            debug!(
                stripe_subscription_id = %snapshot.id,
                subscription_id = %existing.id,
                "subscription already known; created event is a no-op"
            );
            return Ok(());
        }

        let customer = self
            .customer_repo
            .find_by_stripe_customer_id(&snapshot.customer)
            .await?
            .ok_or_else(|| {
                WebhookError::Reconciliation(format!(
                    "no local customer for remote customer {}",
                    snapshot.customer
                ))
            })?;

        let remote_price_id = snapshot.price_id().ok_or_else(|| {
            WebhookError::Reconciliation(format!(
                "subscription {} carries no price reference",
                snapshot.id
            ))
        })?;
        let local_price = self
            .price_repo
            .find_by_stripe_price_id(remote_price_id)
            .await?
            .ok_or_else(|| {
                WebhookError::Reconciliation(format!(
                    "no local price for remote price {remote_price_id}"
                ))
            })?;

        let insert =
            projection::subscription_insert_from_snapshot(customer.id, local_price.id, &snapshot)?;
        let created = self.subscription_repo.create(insert).await?;

        info!(
            subscription_id = %created.id,
            stripe_subscription_id = %created.stripe_subscription_id,
            user_id = %created.user_id,
            "subscription created from webhook"
        );

        self.event_bus
            .publish(
                topics::SUBSCRIPTION_CREATED,
                json!({
                    "subscription_id": created.id,
                    "user_id": created.user_id,
                    "price_id": created.price_id,
                    "quantity": created.quantity,
                    "stripe_subscription_id": created.stripe_subscription_id,
                }),
            )
            .await;

        Ok(())
    }

    /// An update for a subscription we have never seen means its `created`
    /// event was missed. That gap is surfaced, never guessed at.
    async fn reconcile_subscription_updated(
        &self,
        snapshot: RemoteSubscription,
    ) -> WebhookResult<()> {
        let existing = self
            .subscription_repo
            .find_by_stripe_subscription_id(&snapshot.id)
            .await?
            .ok_or_else(|| {
                WebhookError::Reconciliation(format!("unknown subscription {}", snapshot.id))
            })?;

        let patch = projection::subscription_patch_from_snapshot(
            SubscriptionStatus::from_str(&existing.status),
            &snapshot,
        )?;
        self.subscription_repo
            .update_by_stripe_subscription_id(&snapshot.id, patch)
            .await?;

        info!(
            subscription_id = %existing.id,
            stripe_subscription_id = %snapshot.id,
            "subscription updated from webhook"
        );

        self.event_bus
            .publish(
                topics::SUBSCRIPTION_UPDATED,
                json!({
                    "subscription_id": existing.id,
                    "user_id": existing.user_id,
                    "stripe_subscription_id": snapshot.id,
                }),
            )
            .await;

        Ok(())
    }

    async fn reconcile_subscription_deleted(
        &self,
        snapshot: RemoteSubscription,
    ) -> WebhookResult<()> {
        let existing = self
            .subscription_repo
            .find_by_stripe_subscription_id(&snapshot.id)
            .await?
            .ok_or_else(|| {
                WebhookError::Reconciliation(format!("unknown subscription {}", snapshot.id))
            })?;

        if SubscriptionStatus::from_str(&existing.status).is_terminal() {
            debug!(
                subscription_id = %existing.id,
                "subscription already canceled; deleted event is a no-op"
            );
            return Ok(());
        }

        let at = projection::opt_ts(snapshot.ended_at)
            .or_else(|| projection::opt_ts(snapshot.canceled_at))
            .unwrap_or_else(Utc::now);
        self.subscription_repo.mark_canceled(existing.id, at).await?;

        info!(
            subscription_id = %existing.id,
            stripe_subscription_id = %snapshot.id,
            canceled_at = %at,
            "subscription canceled from webhook"
        );

        self.event_bus
            .publish(
                topics::SUBSCRIPTION_CANCELED,
                json!({
                    "subscription_id": existing.id,
                    "user_id": existing.user_id,
                    "canceled_at": at,
                    "immediate": false,
                }),
            )
            .await;

        Ok(())
    }

    /// Resolve-or-create by remote invoice id, then let the payment outcome
    /// move the owning subscription along the lifecycle where legal.
    /// Amounts are overwritten, never accumulated, so redelivery converges.
    async fn reconcile_invoice(
        &self,
        invoice: RemoteInvoice,
        fallback_status: InvoiceStatus,
        subscription_target: SubscriptionStatus,
        topic: &'static str,
    ) -> WebhookResult<()> {
        let status = invoice
            .status
            .as_deref()
            .map(InvoiceStatus::from_str)
            .unwrap_or(fallback_status);

        let local_invoice_id = match self
            .invoice_repo
            .find_by_stripe_invoice_id(&invoice.id)
            .await?
        {
            Some(existing) => {
                self.invoice_repo
                    .update_by_stripe_invoice_id(
                        &invoice.id,
                        InvoicePatch {
                            status,
                            amount_due: invoice.amount_due.unwrap_or(existing.amount_due),
                            amount_paid: invoice.amount_paid.unwrap_or(existing.amount_paid),
                            payment_intent_id: invoice
                                .payment_intent
                                .clone()
                                .or_else(|| existing.payment_intent_id.clone()),
                            period_start: projection::opt_ts(invoice.period_start)
                                .or(existing.period_start),
                            period_end: projection::opt_ts(invoice.period_end)
                                .or(existing.period_end),
                        },
                    )
                    .await?;
                existing.id
            }
            None => {
                let (user_id, subscription_id) = self.resolve_invoice_owner(&invoice).await?;
                let created_id = self
                    .invoice_repo
                    .create(InsertInvoiceEntity {
                        user_id,
                        subscription_id,
                        status: status.to_string(),
                        amount_due: invoice.amount_due.unwrap_or(0),
                        amount_paid: invoice.amount_paid.unwrap_or(0),
                        currency: invoice.currency.clone().unwrap_or_else(|| "usd".to_string()),
                        stripe_invoice_id: invoice.id.clone(),
                        payment_intent_id: invoice.payment_intent.clone(),
                        period_start: projection::opt_ts(invoice.period_start),
                        period_end: projection::opt_ts(invoice.period_end),
                    })
                    .await?;
                info!(
                    invoice_id = %created_id,
                    stripe_invoice_id = %invoice.id,
                    status = %status,
                    "invoice created from webhook"
                );
                created_id
            }
        };

        if let Some(remote_subscription_id) = invoice.subscription.as_deref() {
            if let Some(subscription) = self
                .subscription_repo
                .find_by_stripe_subscription_id(remote_subscription_id)
                .await?
            {
                let current = SubscriptionStatus::from_str(&subscription.status);
                if current != subscription_target
                    && current.can_transition_to(subscription_target)
                {
                    self.subscription_repo
                        .update_status_by_stripe_subscription_id(
                            remote_subscription_id,
                            subscription_target,
                        )
                        .await?;
                    info!(
                        subscription_id = %subscription.id,
                        from = %current,
                        to = %subscription_target,
                        "subscription status moved by invoice webhook"
                    );
                }
            }
        }

        self.event_bus
            .publish(
                topic,
                json!({
                    "invoice_id": local_invoice_id,
                    "stripe_invoice_id": invoice.id,
                    "status": status,
                    "amount_due": invoice.amount_due,
                    "amount_paid": invoice.amount_paid,
                    "stripe_subscription_id": invoice.subscription,
                }),
            )
            .await;

        Ok(())
    }

    async fn resolve_invoice_owner(
        &self,
        invoice: &RemoteInvoice,
    ) -> WebhookResult<(Uuid, Option<Uuid>)> {
        if let Some(remote_subscription_id) = invoice.subscription.as_deref() {
            if let Some(subscription) = self
                .subscription_repo
                .find_by_stripe_subscription_id(remote_subscription_id)
                .await?
            {
                return Ok((subscription.user_id, Some(subscription.id)));
            }
        }

        if let Some(remote_customer_id) = invoice.customer.as_deref() {
            if let Some(customer) = self
                .customer_repo
                .find_by_stripe_customer_id(remote_customer_id)
                .await?
            {
                return Ok((customer.id, None));
            }
        }

        Err(WebhookError::Reconciliation(format!(
            "cannot resolve a local owner for invoice {}",
            invoice.id
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use domain::entities::customers::CustomerEntity;
    use domain::entities::invoices::InvoiceEntity;
    use domain::entities::prices::PriceEntity;
    use domain::entities::subscriptions::SubscriptionEntity;
    use domain::repositories::customers::MockCustomerRepository;
    use domain::repositories::invoices::MockInvoiceRepository;
    use domain::repositories::prices::MockPriceRepository;
    use domain::repositories::subscriptions::MockSubscriptionRepository;
    use payments::gateway::MockPaymentGateway;
    use payments::webhook_events::{StripeEvent, StripeEventData};
    use serde_json::json;

    fn event(type_: &str, object: serde_json::Value) -> StripeEvent {
        StripeEvent {
            id: Some("evt_1".to_string()),
            type_: type_.to_string(),
            created: Some(1_700_000_000),
            livemode: Some(false),
            data: StripeEventData { object },
        }
    }

    fn subscription_object() -> serde_json::Value {
        json!({
            "id": "sub_1",
            "customer": "cus_1",
            "status": "active",
            "current_period_start": 1_700_000_000,
            "current_period_end": 1_702_592_000,
            "items": { "data": [ { "id": "si_1", "quantity": 1, "price": { "id": "price_1" } } ] }
        })
    }

    fn invoice_object() -> serde_json::Value {
        json!({
            "id": "in_1",
            "customer": "cus_1",
            "subscription": "sub_1",
            "status": "paid",
            "amount_due": 2000,
            "amount_paid": 2000,
            "currency": "usd",
            "payment_intent": "pi_1"
        })
    }

    fn subscription_row(status: &str) -> SubscriptionEntity {
        SubscriptionEntity {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            price_id: Uuid::new_v4(),
            quantity: 1,
            status: status.to_string(),
            current_period_start: Utc::now(),
            current_period_end: Utc::now() + Duration::days(30),
            cancel_at: None,
            canceled_at: None,
            ended_at: None,
            trial_start: None,
            trial_end: None,
            stripe_subscription_id: "sub_1".to_string(),
            stripe_customer_id: "cus_1".to_string(),
            collection_method: "charge_automatically".to_string(),
            cancel_at_period_end: false,
            created_at: Utc::now(),
        }
    }

    fn invoice_row() -> InvoiceEntity {
        InvoiceEntity {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            subscription_id: Some(Uuid::new_v4()),
            status: "open".to_string(),
            amount_due: 2000,
            amount_paid: 0,
            currency: "usd".to_string(),
            stripe_invoice_id: "in_1".to_string(),
            payment_intent_id: None,
            period_start: None,
            period_end: None,
            created_at: Utc::now(),
        }
    }

    fn customer_row() -> CustomerEntity {
        CustomerEntity {
            id: Uuid::new_v4(),
            email: "jo@example.com".to_string(),
            name: "Jo".to_string(),
            stripe_customer_id: Some("cus_1".to_string()),
            created_at: Utc::now(),
        }
    }

    fn price_row() -> PriceEntity {
        PriceEntity {
            id: Uuid::new_v4(),
            product_id: Uuid::new_v4(),
            amount_minor: 2000,
            currency: "usd".to_string(),
            interval: "month".to_string(),
            interval_count: 1,
            trial_period_days: None,
            is_active: true,
            stripe_price_id: Some("price_1".to_string()),
            created_at: Utc::now(),
        }
    }

    type TestProcessor = PaymentWebhookUseCase<
        MockCustomerRepository,
        MockPriceRepository,
        MockSubscriptionRepository,
        MockInvoiceRepository,
        MockPaymentGateway,
    >;

    fn processor(
        customers: MockCustomerRepository,
        prices: MockPriceRepository,
        subscriptions: MockSubscriptionRepository,
        invoices: MockInvoiceRepository,
        gateway: MockPaymentGateway,
    ) -> TestProcessor {
        PaymentWebhookUseCase::new(
            Arc::new(customers),
            Arc::new(prices),
            Arc::new(subscriptions),
            Arc::new(invoices),
            Arc::new(gateway),
            Arc::new(EventBus::new()),
        )
    }

    fn gateway_returning(event_value: StripeEvent) -> MockPaymentGateway {
        let mut gateway = MockPaymentGateway::new();
        let mut event_value = Some(event_value);
        gateway
            .expect_verify_webhook()
            .returning(move |_, _| Ok(event_value.take().expect("single verification expected")));
        gateway
    }

    #[tokio::test]
    async fn created_replay_for_known_subscription_is_a_noop() {
        let gateway =
            gateway_returning(event("customer.subscription.created", subscription_object()));

        let mut subscriptions = MockSubscriptionRepository::new();
        let row = subscription_row("active");
        subscriptions
            .expect_find_by_stripe_subscription_id()
            .withf(|id| id == "sub_1")
            .returning(move |_| Ok(Some(row.clone())));
        subscriptions.expect_create().never();

        let processor = processor(
            MockCustomerRepository::new(),
            MockPriceRepository::new(),
            subscriptions,
            MockInvoiceRepository::new(),
            gateway,
        );

        processor.handle_webhook(b"{}", "t=1,v1=sig").await.unwrap();
    }

    #[tokio::test]
    async fn created_for_unknown_subscription_resolves_owner_and_inserts() {
        let gateway =
            gateway_returning(event("customer.subscription.created", subscription_object()));

        let mut subscriptions = MockSubscriptionRepository::new();
        subscriptions
            .expect_find_by_stripe_subscription_id()
            .returning(|_| Ok(None));
        subscriptions
            .expect_create()
            .withf(|insert| insert.stripe_subscription_id == "sub_1")
            .times(1)
            .returning(|insert| {
                Ok(SubscriptionEntity {
                    id: Uuid::new_v4(),
                    user_id: insert.user_id,
                    price_id: insert.price_id,
                    quantity: insert.quantity,
                    status: insert.status,
                    current_period_start: insert.current_period_start,
                    current_period_end: insert.current_period_end,
                    cancel_at: insert.cancel_at,
                    canceled_at: insert.canceled_at,
                    ended_at: insert.ended_at,
                    trial_start: insert.trial_start,
                    trial_end: insert.trial_end,
                    stripe_subscription_id: insert.stripe_subscription_id,
                    stripe_customer_id: insert.stripe_customer_id,
                    collection_method: insert.collection_method,
                    cancel_at_period_end: insert.cancel_at_period_end,
                    created_at: Utc::now(),
                })
            });

        let mut customers = MockCustomerRepository::new();
        customers
            .expect_find_by_stripe_customer_id()
            .withf(|id| id == "cus_1")
            .returning(|_| Ok(Some(customer_row())));

        let mut prices = MockPriceRepository::new();
        prices
            .expect_find_by_stripe_price_id()
            .withf(|id| id == "price_1")
            .returning(|_| Ok(Some(price_row())));

        let processor = processor(
            customers,
            prices,
            subscriptions,
            MockInvoiceRepository::new(),
            gateway,
        );

        processor.handle_webhook(b"{}", "t=1,v1=sig").await.unwrap();
    }

    #[tokio::test]
    async fn created_without_local_customer_is_a_reconciliation_error() {
        let gateway =
            gateway_returning(event("customer.subscription.created", subscription_object()));

        let mut subscriptions = MockSubscriptionRepository::new();
        subscriptions
            .expect_find_by_stripe_subscription_id()
            .returning(|_| Ok(None));
        subscriptions.expect_create().never();

        let mut customers = MockCustomerRepository::new();
        customers
            .expect_find_by_stripe_customer_id()
            .returning(|_| Ok(None));

        let processor = processor(
            customers,
            MockPriceRepository::new(),
            subscriptions,
            MockInvoiceRepository::new(),
            gateway,
        );

        let err = processor
            .handle_webhook(b"{}", "t=1,v1=sig")
            .await
            .unwrap_err();
        assert!(matches!(err, WebhookError::Reconciliation(_)));
        assert_eq!(err.status_code(), axum::http::StatusCode::OK);
    }

    #[tokio::test]
    async fn updated_before_created_surfaces_the_gap() {
        let gateway =
            gateway_returning(event("customer.subscription.updated", subscription_object()));

        let mut subscriptions = MockSubscriptionRepository::new();
        subscriptions
            .expect_find_by_stripe_subscription_id()
            .returning(|_| Ok(None));
        subscriptions.expect_create().never();
        subscriptions.expect_update_by_stripe_subscription_id().never();

        let processor = processor(
            MockCustomerRepository::new(),
            MockPriceRepository::new(),
            subscriptions,
            MockInvoiceRepository::new(),
            gateway,
        );

        let err = processor
            .handle_webhook(b"{}", "t=1,v1=sig")
            .await
            .unwrap_err();
        assert!(matches!(err, WebhookError::Reconciliation(_)));
    }

    #[tokio::test]
    async fn updated_moves_status_and_period() {
        let object = json!({
            "id": "sub_1",
            "customer": "cus_1",
            "status": "past_due",
            "current_period_start": 1_700_000_000,
            "current_period_end": 1_702_592_000,
            "items": { "data": [ { "id": "si_1", "quantity": 1 } ] }
        });
        let gateway = gateway_returning(event("customer.subscription.updated", object));

        let mut subscriptions = MockSubscriptionRepository::new();
        let row = subscription_row("active");
        subscriptions
            .expect_find_by_stripe_subscription_id()
            .returning(move |_| Ok(Some(row.clone())));
        subscriptions
            .expect_update_by_stripe_subscription_id()
            .withf(|id, patch| id == "sub_1" && patch.status == SubscriptionStatus::PastDue)
            .times(1)
            .returning(|_, _| Ok(()));

        let processor = processor(
            MockCustomerRepository::new(),
            MockPriceRepository::new(),
            subscriptions,
            MockInvoiceRepository::new(),
            gateway,
        );

        processor.handle_webhook(b"{}", "t=1,v1=sig").await.unwrap();
    }

    #[tokio::test]
    async fn deleted_is_idempotent_for_already_canceled_rows() {
        let gateway =
            gateway_returning(event("customer.subscription.deleted", subscription_object()));

        let mut subscriptions = MockSubscriptionRepository::new();
        let row = subscription_row("canceled");
        subscriptions
            .expect_find_by_stripe_subscription_id()
            .returning(move |_| Ok(Some(row.clone())));
        subscriptions.expect_mark_canceled().never();

        let processor = processor(
            MockCustomerRepository::new(),
            MockPriceRepository::new(),
            subscriptions,
            MockInvoiceRepository::new(),
            gateway,
        );

        processor.handle_webhook(b"{}", "t=1,v1=sig").await.unwrap();
    }

    #[tokio::test]
    async fn deleted_cancels_a_live_subscription() {
        let object = json!({
            "id": "sub_1",
            "customer": "cus_1",
            "status": "canceled",
            "current_period_start": 1_700_000_000,
            "current_period_end": 1_702_592_000,
            "ended_at": 1_701_000_000
        });
        let gateway = gateway_returning(event("customer.subscription.deleted", object));

        let row = subscription_row("active");
        let local_id = row.id;
        let mut subscriptions = MockSubscriptionRepository::new();
        subscriptions
            .expect_find_by_stripe_subscription_id()
            .returning(move |_| Ok(Some(row.clone())));
        subscriptions
            .expect_mark_canceled()
            .withf(move |id, _| *id == local_id)
            .times(1)
            .returning(|_, _| Ok(()));

        let processor = processor(
            MockCustomerRepository::new(),
            MockPriceRepository::new(),
            subscriptions,
            MockInvoiceRepository::new(),
            gateway,
        );

        processor.handle_webhook(b"{}", "t=1,v1=sig").await.unwrap();
    }

    #[tokio::test]
    async fn first_invoice_paid_creates_row_with_settled_amounts() {
        let gateway = gateway_returning(event("invoice.paid", invoice_object()));

        let row = subscription_row("past_due");
        let mut subscriptions = MockSubscriptionRepository::new();
        subscriptions
            .expect_find_by_stripe_subscription_id()
            .returning(move |_| Ok(Some(row.clone())));
        subscriptions
            .expect_update_status_by_stripe_subscription_id()
            .withf(|id, status| id == "sub_1" && *status == SubscriptionStatus::Active)
            .times(1)
            .returning(|_, _| Ok(()));

        let mut invoices = MockInvoiceRepository::new();
        invoices
            .expect_find_by_stripe_invoice_id()
            .withf(|id| id == "in_1")
            .returning(|_| Ok(None));
        invoices
            .expect_create()
            .withf(|insert| {
                insert.stripe_invoice_id == "in_1"
                    && insert.amount_due == 2000
                    && insert.amount_paid == 2000
                    && insert.status == "paid"
            })
            .times(1)
            .returning(|_| Ok(Uuid::new_v4()));
        invoices.expect_update_by_stripe_invoice_id().never();

        let processor = processor(
            MockCustomerRepository::new(),
            MockPriceRepository::new(),
            subscriptions,
            invoices,
            gateway,
        );

        processor.handle_webhook(b"{}", "t=1,v1=sig").await.unwrap();
    }

    #[tokio::test]
    async fn replayed_invoice_paid_updates_in_place() {
        let gateway = gateway_returning(event("invoice.paid", invoice_object()));

        let row = subscription_row("active");
        let mut subscriptions = MockSubscriptionRepository::new();
        subscriptions
            .expect_find_by_stripe_subscription_id()
            .returning(move |_| Ok(Some(row.clone())));
        // Already active: the replay must not touch the status again.
        subscriptions
            .expect_update_status_by_stripe_subscription_id()
            .never();

        let mut invoices = MockInvoiceRepository::new();
        invoices
            .expect_find_by_stripe_invoice_id()
            .returning(|_| Ok(Some(invoice_row())));
        invoices
            .expect_update_by_stripe_invoice_id()
            .withf(|id, patch| {
                id == "in_1"
                    && patch.status == InvoiceStatus::Paid
                    && patch.amount_paid == 2000
                    && patch.amount_due == 2000
            })
            .times(1)
            .returning(|_, _| Ok(()));
        invoices.expect_create().never();

        let processor = processor(
            MockCustomerRepository::new(),
            MockPriceRepository::new(),
            subscriptions,
            invoices,
            gateway,
        );

        processor.handle_webhook(b"{}", "t=1,v1=sig").await.unwrap();
    }

    #[tokio::test]
    async fn invoice_payment_failure_moves_subscription_past_due() {
        let object = json!({
            "id": "in_2",
            "customer": "cus_1",
            "subscription": "sub_1",
            "status": "open",
            "amount_due": 2000,
            "amount_paid": 0,
            "currency": "usd"
        });
        let gateway = gateway_returning(event("invoice.payment_failed", object));

        let row = subscription_row("active");
        let mut subscriptions = MockSubscriptionRepository::new();
        subscriptions
            .expect_find_by_stripe_subscription_id()
            .returning(move |_| Ok(Some(row.clone())));
        subscriptions
            .expect_update_status_by_stripe_subscription_id()
            .withf(|id, status| id == "sub_1" && *status == SubscriptionStatus::PastDue)
            .times(1)
            .returning(|_, _| Ok(()));

        let mut invoices = MockInvoiceRepository::new();
        invoices
            .expect_find_by_stripe_invoice_id()
            .returning(|_| Ok(None));
        invoices.expect_create().times(1).returning(|_| Ok(Uuid::new_v4()));

        let processor = processor(
            MockCustomerRepository::new(),
            MockPriceRepository::new(),
            subscriptions,
            invoices,
            gateway,
        );

        processor.handle_webhook(b"{}", "t=1,v1=sig").await.unwrap();
    }

    #[tokio::test]
    async fn unknown_event_types_are_acknowledged() {
        let gateway = gateway_returning(event("charge.refunded", json!({ "id": "ch_1" })));

        let processor = processor(
            MockCustomerRepository::new(),
            MockPriceRepository::new(),
            MockSubscriptionRepository::new(),
            MockInvoiceRepository::new(),
            gateway,
        );

        processor.handle_webhook(b"{}", "t=1,v1=sig").await.unwrap();
    }

    #[tokio::test]
    async fn signature_failure_is_rejected_with_a_client_error() {
        let mut gateway = MockPaymentGateway::new();
        gateway.expect_verify_webhook().returning(|_, _| {
            Err(GatewayError::SignatureInvalid("signature mismatch".to_string()))
        });

        let processor = processor(
            MockCustomerRepository::new(),
            MockPriceRepository::new(),
            MockSubscriptionRepository::new(),
            MockInvoiceRepository::new(),
            gateway,
        );

        let err = processor
            .handle_webhook(b"{}", "t=1,v1=bad")
            .await
            .unwrap_err();
        assert!(matches!(err, WebhookError::SignatureInvalid));
        assert_eq!(err.status_code(), axum::http::StatusCode::BAD_REQUEST);
    }
}
