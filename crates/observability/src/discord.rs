use super::alerts::{AlertEvent, AlertSink};
use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::SecondsFormat;
use reqwest::Client;
use serde_json::json;
use url::Url;

pub(crate) struct DiscordSink {
    webhook_url: Url,
    client: Client,
}

impl DiscordSink {
    pub(crate) fn new(webhook_url: Url) -> Self {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(3))
            .build()
            .expect("reqwest client must build");

        Self {
            webhook_url,
            client,
        }
    }

    fn format_content(&self, event: &AlertEvent) -> String {
        let mut lines = Vec::new();

        lines.push(format!(
            "**{}** `{}` `{}`",
            event.component,
            event.environment,
            event.level.as_str()
        ));
        lines.push(format!(
            "`{}` `{}`",
            event.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
            event.target
        ));

        if let Some(message) = event.message.as_ref().filter(|m| !m.trim().is_empty()) {
            lines.push(format!("> {}", message.trim()));
        }

        for (key, value) in &event.fields {
            lines.push(format!("- `{}` = `{}`", key, value));
        }

        truncate_for_discord(lines.join("\n"))
    }
}

#[async_trait]
impl AlertSink for DiscordSink {
    async fn send(&self, event: &AlertEvent) -> Result<()> {
        let content = self.format_content(event);

        let response = self
            .client
            .post(self.webhook_url.clone())
            .json(&json!({ "content": content }))
            .send()
            .await
            .map_err(sanitize_reqwest_error)?;

        if response.status().is_success() {
            return Ok(());
        }

        Err(anyhow!(
            "discord webhook returned non-success status: {}",
            response.status()
        ))
    }

    fn sink_name(&self) -> &'static str {
        "discord"
    }
}

fn sanitize_reqwest_error(error: reqwest::Error) -> anyhow::Error {
    if error.is_timeout() {
        return anyhow!("discord webhook request timed out");
    }
    if error.is_connect() {
        return anyhow!("discord webhook connection failed");
    }
    anyhow!("discord webhook request failed")
}

fn truncate_for_discord(mut content: String) -> String {
    const LIMIT: usize = 2000;
    const SUFFIX: &str = "\n… (truncated)";

    if content.chars().count() <= LIMIT {
        return content;
    }

    let allowed = LIMIT.saturating_sub(SUFFIX.chars().count());
    let truncated: String = content.chars().take(allowed).collect();
    content.clear();
    content.push_str(&truncated);
    content.push_str(SUFFIX);
    content
}
