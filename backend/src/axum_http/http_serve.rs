use crate::{
    axum_http::{default_routers, routers},
    config::config_model::DotEnvyConfig,
};
use anyhow::Result;
use application::event_bus::EventBus;
use axum::{
    Router,
    http::{
        Method,
        header::{AUTHORIZATION, CONTENT_TYPE},
    },
    routing::get,
};
use infra::db::postgres::postgres_connection::PgPoolSquad;
use payments::stripe_client::{StripeClient, StripeConfig};
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tower_http::{
    cors::{Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::info;

pub async fn start(config: Arc<DotEnvyConfig>, db_pool: Arc<PgPoolSquad>) -> Result<()> {
    let stripe_client = Arc::new(StripeClient::new(StripeConfig {
        secret_key: config.stripe.secret_key.clone(),
        webhook_secret: config.stripe.webhook_secret.clone(),
        webhook_tolerance_secs: config.stripe.webhook_tolerance_secs,
    }));

    // Retained so late-starting consumers (variant generation, alerting)
    // can replay the facts they missed.
    let event_bus = Arc::new(EventBus::with_retention(chrono::Duration::hours(24)));

    let app = Router::new()
        .fallback(default_routers::not_found)
        .nest(
            "/api/v1/subscriptions",
            routers::subscriptions::routes(
                Arc::clone(&db_pool),
                Arc::clone(&stripe_client),
                Arc::clone(&event_bus),
            ),
        )
        .nest(
            "/webhooks",
            routers::payment_webhook::routes(
                Arc::clone(&db_pool),
                Arc::clone(&stripe_client),
                Arc::clone(&event_bus),
            ),
        )
        .route("/api/v1/health-check", get(default_routers::health_check))
        .layer(TimeoutLayer::new(Duration::from_secs(config.server.timeout)))
        .layer(RequestBodyLimitLayer::new(
            (config.server.body_limit * 1024 * 1024).try_into()?,
        ))
        .layer(
            CorsLayer::new()
                .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE])
                .allow_headers([AUTHORIZATION, CONTENT_TYPE])
                .allow_origin(Any),
        )
        .layer(TraceLayer::new_for_http());

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    let listener = TcpListener::bind(addr).await?;

    info!("Server is running on port {}", config.server.port);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install CTRL+C signal handler");
    };

    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received ctrl+C signal"),
        _ = terminate => info!("Received terminate signal"),
    }
}
