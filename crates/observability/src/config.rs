use std::env;
use tracing::Level;
use url::Url;

#[derive(Clone)]
pub(crate) struct ServiceContext {
    pub(crate) component: String,
    pub(crate) environment: String,
}

#[derive(Clone)]
pub(crate) struct DiscordConfig {
    pub(crate) webhook_url: Url,
    pub(crate) min_level: Level,
}

#[derive(Clone)]
pub(crate) struct ObservabilityConfig {
    pub(crate) service_context: ServiceContext,
    pub(crate) discord: Option<DiscordConfig>,
    /// Warnings collected during parsing, logged once tracing is up.
    pub(crate) warnings: Vec<String>,
}

impl ObservabilityConfig {
    pub(crate) fn from_env(component: &str) -> Self {
        let service_context = ServiceContext {
            component: component.trim().to_string(),
            environment: env::var("STAGE")
                .ok()
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| "unknown".to_string()),
        };

        let mut warnings = Vec::new();
        let discord = match env::var("DISCORD_WEBHOOK_URL").ok().filter(|v| !v.is_empty()) {
            Some(raw) => match Url::parse(&raw) {
                Ok(webhook_url) => Some(DiscordConfig {
                    webhook_url,
                    min_level: min_level_from_env(&mut warnings),
                }),
                Err(err) => {
                    // Never echo the raw URL; webhook URLs embed secrets.
                    warnings.push(format!(
                        "DISCORD_WEBHOOK_URL is set but invalid; operator alerts disabled (parse error: {err})"
                    ));
                    None
                }
            },
            None => None,
        };

        Self {
            service_context,
            discord,
            warnings,
        }
    }
}

fn min_level_from_env(warnings: &mut Vec<String>) -> Level {
    match env::var("ALERT_MIN_LEVEL") {
        Ok(raw) if !raw.trim().is_empty() => match raw.trim().to_ascii_lowercase().as_str() {
            "error" => Level::ERROR,
            "warn" | "warning" => Level::WARN,
            "info" => Level::INFO,
            _ => {
                warnings.push(format!(
                    "ALERT_MIN_LEVEL is invalid (value: {raw}); defaulting to ERROR"
                ));
                Level::ERROR
            }
        },
        _ => Level::ERROR,
    }
}
