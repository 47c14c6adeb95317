use std::sync::Arc;

use application::event_bus::EventBus;
use application::usecases::payment_webhook::PaymentWebhookUseCase;
use axum::{
    Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::post,
};
use infra::db::postgres::postgres_connection::PgPoolSquad;
use infra::db::repositories::customers::CustomerPostgres;
use infra::db::repositories::invoices::InvoicePostgres;
use infra::db::repositories::prices::PricePostgres;
use infra::db::repositories::subscriptions::SubscriptionPostgres;
use payments::stripe_client::StripeClient;
use tower_http::limit::RequestBodyLimitLayer;

use crate::axum_http::error_responses;

/// Processor webhook bodies are small; anything larger is hostile.
const WEBHOOK_BODY_LIMIT_BYTES: usize = 64 * 1024;

type WebhookProcessor = PaymentWebhookUseCase<
    CustomerPostgres,
    PricePostgres,
    SubscriptionPostgres,
    InvoicePostgres,
    StripeClient,
>;

pub fn routes(
    db_pool: Arc<PgPoolSquad>,
    stripe_client: Arc<StripeClient>,
    event_bus: Arc<EventBus>,
) -> Router {
    let webhook_usecase = PaymentWebhookUseCase::new(
        Arc::new(CustomerPostgres::new(Arc::clone(&db_pool))),
        Arc::new(PricePostgres::new(Arc::clone(&db_pool))),
        Arc::new(SubscriptionPostgres::new(Arc::clone(&db_pool))),
        Arc::new(InvoicePostgres::new(Arc::clone(&db_pool))),
        stripe_client,
        event_bus,
    );

    Router::new()
        .route("/payment", post(handle_payment_webhook))
        .layer(RequestBodyLimitLayer::new(WEBHOOK_BODY_LIMIT_BYTES))
        .with_state(Arc::new(webhook_usecase))
}

/// Always 200 once the signature checks out, whatever reconciliation did;
/// redelivery storms help nobody. Signature failures are the one 400.
pub async fn handle_payment_webhook(
    State(webhook_usecase): State<Arc<WebhookProcessor>>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let signature = headers
        .get("stripe-signature")
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();

    match webhook_usecase.handle_webhook(&body, signature).await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(err) => {
            let status = err.status_code();
            if status == StatusCode::OK {
                StatusCode::OK.into_response()
            } else {
                error_responses::plain_error_response(status, &err.to_string())
            }
        }
    }
}
