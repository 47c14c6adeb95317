use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{Level, warn};

#[derive(Clone, Debug)]
pub(crate) struct AlertEvent {
    pub(crate) level: Level,
    pub(crate) timestamp: DateTime<Utc>,
    pub(crate) component: String,
    pub(crate) environment: String,
    pub(crate) target: String,
    pub(crate) message: Option<String>,
    pub(crate) fields: BTreeMap<String, String>,
}

#[async_trait]
pub(crate) trait AlertSink: Send + Sync {
    async fn send(&self, event: &AlertEvent) -> Result<()>;
    fn sink_name(&self) -> &'static str;
}

/// Fans alert events out to the configured sinks on a background task.
/// Delivery is best-effort; a full queue drops the event rather than
/// blocking the tracing hot path.
#[derive(Clone)]
pub(crate) struct OperatorNotifier {
    tx: mpsc::Sender<AlertEvent>,
}

impl OperatorNotifier {
    pub(crate) fn new(sinks: Vec<Arc<dyn AlertSink>>) -> Self {
        let (tx, mut rx) = mpsc::channel::<AlertEvent>(256);

        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                for sink in &sinks {
                    if let Err(error) = sink.send(&event).await {
                        warn!(
                            sink = sink.sink_name(),
                            error = %error,
                            "operator alert sink failed"
                        );
                    }
                }
            }
        });

        Self { tx }
    }

    pub(crate) fn try_notify(&self, event: AlertEvent) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("operator alert queue full; dropping event");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                warn!("operator alert queue closed; dropping event");
            }
        }
    }
}
