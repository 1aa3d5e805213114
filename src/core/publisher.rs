use std::sync::Arc;

use serde_json::{Value, json};

use crate::config::RuntimeConfig;
use crate::metrics;
use crate::ports::http_client::HttpClient;

const AGGREGATOR_ROUTE: &str = "api/add-subscriptions";

/// A single outbound notification: target URL plus JSON body
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub url: String,
    pub body: Value,
}

/// Registration of the subscription URL with the aggregator, when both the
/// aggregator endpoint and the public project URL are configured.
pub fn aggregator_notification(config: &RuntimeConfig) -> Option<Notification> {
    let upload_url = config.upload_url()?;
    let project_url = config.project_url()?;

    Some(Notification {
        url: format!("{}/{}", upload_url.trim_end_matches('/'), AGGREGATOR_ROUTE),
        body: json!({
            "subscription": [format!("{}/{}", project_url.trim_end_matches('/'), config.sub_path)]
        }),
    })
}

/// Keep-alive registration of the project URL, when enabled.
pub fn keepalive_notification(config: &RuntimeConfig) -> Option<Notification> {
    if !config.auto_access {
        return None;
    }
    let project_url = config.project_url()?;

    Some(Notification {
        url: config.keepalive_url.clone(),
        body: json!({ "url": project_url }),
    })
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PublishReport {
    /// `None` when not configured, otherwise whether the call succeeded
    pub aggregator: Option<bool>,
    pub keepalive: Option<bool>,
}

/// Best-effort outbound notifications. Errors are logged and dropped; nothing retries.
#[derive(Clone)]
pub struct Publisher {
    config: Arc<RuntimeConfig>,
    http: Arc<dyn HttpClient>,
}

impl Publisher {
    pub fn new(config: Arc<RuntimeConfig>, http: Arc<dyn HttpClient>) -> Self {
        Self { config, http }
    }

    pub async fn publish(&self) -> PublishReport {
        let aggregator = aggregator_notification(&self.config);
        let keepalive = keepalive_notification(&self.config);

        let (aggregator, keepalive) = tokio::join!(
            self.send("aggregator", aggregator),
            self.send("keepalive", keepalive),
        );
        PublishReport {
            aggregator,
            keepalive,
        }
    }

    /// Fire and forget on the runtime; the caller never observes the result.
    pub fn publish_detached(&self) {
        let publisher = self.clone();
        tokio::spawn(async move {
            publisher.publish().await;
        });
    }

    async fn send(&self, target: &'static str, notification: Option<Notification>) -> Option<bool> {
        let Some(notification) = notification else {
            tracing::debug!(kind = target, "Not configured; skipping");
            return None;
        };

        let ok = match self.http.post_json(&notification.url, &notification.body).await {
            Ok(()) => {
                tracing::info!(kind = target, url = %notification.url, "Notification delivered");
                true
            }
            Err(err) => {
                tracing::warn!(kind = target, url = %notification.url, "Notification failed: {}", err);
                false
            }
        };
        metrics::increment_publish_total(target, ok);
        Some(ok)
    }
}
