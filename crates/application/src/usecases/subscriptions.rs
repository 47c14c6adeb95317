use std::sync::Arc;

use chrono::Utc;
use domain::entities::subscriptions::SubscriptionEntity;
use domain::repositories::customers::CustomerRepository;
use domain::repositories::prices::PriceRepository;
use domain::repositories::products::ProductRepository;
use domain::repositories::subscriptions::SubscriptionRepository;
use domain::value_objects::enums::subscription_statuses::SubscriptionStatus;
use payments::gateway::{
    CreateSubscriptionRequest, GatewayError, PaymentGateway, SubscriptionChange,
};
use serde_json::json;
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::event_bus::{EventBus, topics};
use crate::usecases::entity_sync::{EntitySyncUseCase, SyncError};
use crate::usecases::projection;

#[derive(Debug, Error)]
pub enum SubscriptionError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("subscription not found")]
    NotFound,
    #[error("payment processor call failed: {0}")]
    Remote(#[from] GatewayError),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl SubscriptionError {
    pub fn status_code(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            SubscriptionError::Validation(_) => StatusCode::BAD_REQUEST,
            SubscriptionError::NotFound => StatusCode::NOT_FOUND,
            SubscriptionError::Remote(_) => StatusCode::BAD_GATEWAY,
            SubscriptionError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<SyncError> for SubscriptionError {
    fn from(err: SyncError) -> Self {
        match err {
            SyncError::UnknownLocal(entity) => {
                SubscriptionError::Validation(format!("{entity} does not exist"))
            }
            SyncError::Remote(err) => SubscriptionError::Remote(err),
            SyncError::Internal(err) => SubscriptionError::Internal(err),
        }
    }
}

pub type LifecycleResult<T> = Result<T, SubscriptionError>;

/// Drives subscription state from local intent: resolves remote
/// counterparts lazily, calls the processor, and only then projects the
/// returned snapshot into the local store. A processor failure therefore
/// never leaves a local row the remote side does not know about.
pub struct SubscriptionLifecycleUseCase<C, P, Pr, S, G>
where
    C: CustomerRepository + Send + Sync + 'static,
    P: ProductRepository + Send + Sync + 'static,
    Pr: PriceRepository + Send + Sync + 'static,
    S: SubscriptionRepository + Send + Sync + 'static,
    G: PaymentGateway + Send + Sync + 'static,
{
    entity_sync: EntitySyncUseCase<C, P, Pr, G>,
    price_repo: Arc<Pr>,
    subscription_repo: Arc<S>,
    gateway: Arc<G>,
    event_bus: Arc<EventBus>,
}

impl<C, P, Pr, S, G> SubscriptionLifecycleUseCase<C, P, Pr, S, G>
where
    C: CustomerRepository + Send + Sync + 'static,
    P: ProductRepository + Send + Sync + 'static,
    Pr: PriceRepository + Send + Sync + 'static,
    S: SubscriptionRepository + Send + Sync + 'static,
    G: PaymentGateway + Send + Sync + 'static,
{
    pub fn new(
        customer_repo: Arc<C>,
        product_repo: Arc<P>,
        price_repo: Arc<Pr>,
        subscription_repo: Arc<S>,
        gateway: Arc<G>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        let entity_sync = EntitySyncUseCase::new(
            customer_repo,
            product_repo,
            Arc::clone(&price_repo),
            Arc::clone(&gateway),
        );
        Self {
            entity_sync,
            price_repo,
            subscription_repo,
            gateway,
            event_bus,
        }
    }

    pub async fn create_subscription(
        &self,
        user_id: Uuid,
        price_id: Uuid,
        quantity: i32,
        payment_method_id: Option<String>,
    ) -> LifecycleResult<SubscriptionEntity> {
        info!(%user_id, %price_id, quantity, "subscriptions: create requested");

        if quantity < 1 {
            let err = SubscriptionError::Validation("quantity must be at least 1".to_string());
            warn!(
                %user_id,
                %price_id,
                quantity,
                status = err.status_code().as_u16(),
                "subscriptions: rejected invalid quantity"
            );
            return Err(err);
        }

        let remote_customer_id = self.entity_sync.sync_customer(user_id).await?;
        let remote_price_id = self.entity_sync.sync_price(price_id).await?;

        let price = self
            .price_repo
            .find_by_id(price_id)
            .await?
            .ok_or_else(|| SubscriptionError::Validation("price does not exist".to_string()))?;

        if let Some(payment_method) = payment_method_id.as_deref() {
            self.gateway
                .attach_payment_method(payment_method, &remote_customer_id)
                .await?;
        }

        let idempotency_key = Uuid::new_v4().to_string();
        let snapshot = self
            .gateway
            .create_subscription(CreateSubscriptionRequest {
                customer: remote_customer_id.clone(),
                price: remote_price_id.clone(),
                quantity: i64::from(quantity),
                default_payment_method: payment_method_id,
                trial_period_days: price.trial_period_days,
                idempotency_key,
            })
            .await
            .map_err(|err| {
                error!(
                    %user_id,
                    %price_id,
                    remote_customer_id = %remote_customer_id,
                    remote_price_id = %remote_price_id,
                    error = ?err,
                    "subscriptions: remote subscription creation failed"
                );
                SubscriptionError::Remote(err)
            })?;

        let insert = projection::subscription_insert_from_snapshot(user_id, price_id, &snapshot)?;
        let created = self.subscription_repo.create(insert).await?;

        info!(
            %user_id,
            subscription_id = %created.id,
            stripe_subscription_id = %created.stripe_subscription_id,
            status = %created.status,
            "subscriptions: created"
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

        Ok(created)
    }

    /// Remote first, local second. The local row is only touched after the
    /// processor confirms, so a failed cancel leaves no divergence to
    /// reconcile later.
    pub async fn cancel_subscription(
        &self,
        subscription_id: Uuid,
        immediate: bool,
    ) -> LifecycleResult<()> {
        let subscription = self
            .subscription_repo
            .find_by_id(subscription_id)
            .await?
            .ok_or(SubscriptionError::NotFound)?;

        let status = SubscriptionStatus::from_str(&subscription.status);
        if status.is_terminal() {
            let err =
                SubscriptionError::Validation("subscription is already canceled".to_string());
            warn!(
                %subscription_id,
                status = err.status_code().as_u16(),
                "subscriptions: cancel of terminal subscription rejected"
            );
            return Err(err);
        }

        if immediate {
            let snapshot = self
                .gateway
                .cancel_subscription(&subscription.stripe_subscription_id)
                .await
                .map_err(|err| {
                    error!(
                        %subscription_id,
                        stripe_subscription_id = %subscription.stripe_subscription_id,
                        error = ?err,
                        "subscriptions: remote cancel failed"
                    );
                    SubscriptionError::Remote(err)
                })?;

            let at = projection::opt_ts(snapshot.ended_at)
                .or_else(|| projection::opt_ts(snapshot.canceled_at))
                .unwrap_or_else(Utc::now);
            self.subscription_repo
                .mark_canceled(subscription.id, at)
                .await?;

            info!(
                %subscription_id,
                stripe_subscription_id = %subscription.stripe_subscription_id,
                canceled_at = %at,
                "subscriptions: canceled immediately"
            );

            self.event_bus
                .publish(
                    topics::SUBSCRIPTION_CANCELED,
                    json!({
                        "subscription_id": subscription.id,
                        "user_id": subscription.user_id,
                        "canceled_at": at,
                        "immediate": true,
                    }),
                )
                .await;
        } else {
            let snapshot = self
                .gateway
                .cancel_at_period_end(&subscription.stripe_subscription_id)
                .await
                .map_err(|err| {
                    error!(
                        %subscription_id,
                        stripe_subscription_id = %subscription.stripe_subscription_id,
                        error = ?err,
                        "subscriptions: scheduling remote cancel failed"
                    );
                    SubscriptionError::Remote(err)
                })?;

            let cancel_at = projection::opt_ts(snapshot.cancel_at)
                .unwrap_or(subscription.current_period_end);
            self.subscription_repo
                .schedule_cancellation(subscription.id, cancel_at)
                .await?;

            info!(
                %subscription_id,
                stripe_subscription_id = %subscription.stripe_subscription_id,
                cancel_at = %cancel_at,
                "subscriptions: cancellation scheduled for period end"
            );

            self.event_bus
                .publish(
                    topics::SUBSCRIPTION_CANCEL_SCHEDULED,
                    json!({
                        "subscription_id": subscription.id,
                        "user_id": subscription.user_id,
                        "cancel_at": cancel_at,
                    }),
                )
                .await;
        }

        Ok(())
    }

    pub async fn update_quantity(
        &self,
        subscription_id: Uuid,
        quantity: i32,
    ) -> LifecycleResult<()> {
        if quantity < 1 {
            return Err(SubscriptionError::Validation(
                "quantity must be at least 1".to_string(),
            ));
        }

        let subscription = self
            .subscription_repo
            .find_by_id(subscription_id)
            .await?
            .ok_or(SubscriptionError::NotFound)?;

        let status = SubscriptionStatus::from_str(&subscription.status);
        if status.is_terminal() {
            return Err(SubscriptionError::Validation(
                "cannot change a canceled subscription".to_string(),
            ));
        }

        let snapshot = self
            .gateway
            .update_subscription(
                &subscription.stripe_subscription_id,
                SubscriptionChange {
                    quantity: Some(i64::from(quantity)),
                    price: None,
                },
            )
            .await?;

        let patch = projection::subscription_patch_from_snapshot(status, &snapshot)?;
        self.subscription_repo
            .update_by_stripe_subscription_id(&subscription.stripe_subscription_id, patch)
            .await?;

        info!(
            %subscription_id,
            quantity,
            "subscriptions: quantity updated"
        );

        self.event_bus
            .publish(
                topics::SUBSCRIPTION_UPDATED,
                json!({
                    "subscription_id": subscription.id,
                    "user_id": subscription.user_id,
                    "quantity": quantity,
                }),
            )
            .await;

        Ok(())
    }
}
