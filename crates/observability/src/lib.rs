mod alerts;
mod config;
mod discord;
mod layer;

use anyhow::Result;
use config::ObservabilityConfig;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{
    EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt,
};

use alerts::OperatorNotifier;
use discord::DiscordSink;
use layer::OperatorAlertLayer;

/// Initializes tracing for one component: stdout formatting with an
/// `EnvFilter` (RUST_LOG, default `info`) plus an optional operator alert
/// layer that forwards ERROR events (reconciliation failures, processor
/// outages) to a Discord webhook.
pub fn init_observability(component: &str) -> Result<()> {
    let config = ObservabilityConfig::from_env(component);

    let alert_layer = config.discord.as_ref().map(|discord| {
        let notifier = OperatorNotifier::new(vec![Arc::new(DiscordSink::new(
            discord.webhook_url.clone(),
        ))]);

        OperatorAlertLayer::new(notifier, config.service_context.clone()).with_filter(
            tracing_subscriber::filter::LevelFilter::from_level(discord.min_level),
        )
    });

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_timer(tracing_subscriber::fmt::time::ChronoUtc::rfc_3339());

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(alert_layer)
        .with(env_filter)
        .try_init()?;

    for warning in &config.warnings {
        warn!(
            component = %config.service_context.component,
            warning = %warning,
            "observability config warning"
        );
    }

    if config.discord.is_some() {
        info!(
            component = %config.service_context.component,
            environment = %config.service_context.environment,
            "operator alerts enabled"
        );
    } else {
        info!(
            component = %config.service_context.component,
            environment = %config.service_context.environment,
            "operator alerts disabled"
        );
    }

    Ok(())
}
