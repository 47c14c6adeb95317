use std::sync::Arc;

use application::event_bus::EventBus;
use application::usecases::subscriptions::SubscriptionLifecycleUseCase;
use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{patch, post},
};
use domain::value_objects::subscriptions::{
    CancelSubscriptionModel, CreateSubscriptionModel, SubscriptionDto, UpdateQuantityModel,
};
use infra::db::postgres::postgres_connection::PgPoolSquad;
use infra::db::repositories::customers::CustomerPostgres;
use infra::db::repositories::prices::PricePostgres;
use infra::db::repositories::products::ProductPostgres;
use infra::db::repositories::subscriptions::SubscriptionPostgres;
use payments::stripe_client::StripeClient;
use uuid::Uuid;

use crate::axum_http::error_responses;

type Lifecycle = SubscriptionLifecycleUseCase<
    CustomerPostgres,
    ProductPostgres,
    PricePostgres,
    SubscriptionPostgres,
    StripeClient,
>;

pub fn routes(
    db_pool: Arc<PgPoolSquad>,
    stripe_client: Arc<StripeClient>,
    event_bus: Arc<EventBus>,
) -> Router {
    let lifecycle_usecase = SubscriptionLifecycleUseCase::new(
        Arc::new(CustomerPostgres::new(Arc::clone(&db_pool))),
        Arc::new(ProductPostgres::new(Arc::clone(&db_pool))),
        Arc::new(PricePostgres::new(Arc::clone(&db_pool))),
        Arc::new(SubscriptionPostgres::new(Arc::clone(&db_pool))),
        stripe_client,
        event_bus,
    );

    Router::new()
        .route("/", post(create_subscription))
        .route("/:id/cancel", post(cancel_subscription))
        .route("/:id/quantity", patch(update_quantity))
        .with_state(Arc::new(lifecycle_usecase))
}

pub async fn create_subscription(
    State(lifecycle_usecase): State<Arc<Lifecycle>>,
    Json(model): Json<CreateSubscriptionModel>,
) -> impl IntoResponse {
    match lifecycle_usecase
        .create_subscription(
            model.user_id,
            model.price_id,
            model.quantity,
            model.payment_method_id,
        )
        .await
    {
        Ok(subscription) => (
            StatusCode::CREATED,
            Json(SubscriptionDto::from(subscription)),
        )
            .into_response(),
        Err(err) => error_responses::subscription_error_response(err),
    }
}

pub async fn cancel_subscription(
    State(lifecycle_usecase): State<Arc<Lifecycle>>,
    Path(subscription_id): Path<Uuid>,
    Json(model): Json<CancelSubscriptionModel>,
) -> impl IntoResponse {
    match lifecycle_usecase
        .cancel_subscription(subscription_id, model.immediate)
        .await
    {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => error_responses::subscription_error_response(err),
    }
}

pub async fn update_quantity(
    State(lifecycle_usecase): State<Arc<Lifecycle>>,
    Path(subscription_id): Path<Uuid>,
    Json(model): Json<UpdateQuantityModel>,
) -> impl IntoResponse {
    match lifecycle_usecase
        .update_quantity(subscription_id, model.quantity)
        .await
    {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => error_responses::subscription_error_response(err),
    }
}
