//! Capabilities wired in by the CLI host.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Method;
use serde_json::{json, Value};
use steps::{
    ActionHandler, Capabilities, CapabilityError, Notification, NotificationSink, WebhookDelivery,
    WebhookRequest, WebhookResponse,
};
use tracing::info;

/// `log` action: writes its params to the log and returns them.
pub struct LogAction;

#[async_trait]
impl ActionHandler for LogAction {
    async fn call(&self, params: Value) -> Result<Value, CapabilityError> {
        info!(target: "workflow::action", %params, "log action");
        Ok(json!({ "logged": true }))
    }
}

/// `echo` action: returns its params unchanged.
pub struct EchoAction;

#[async_trait]
impl ActionHandler for EchoAction {
    async fn call(&self, params: Value) -> Result<Value, CapabilityError> {
        Ok(params)
    }
}

/// Notifications go to the log.
pub struct LogSink;

#[async_trait]
impl NotificationSink for LogSink {
    async fn send(&self, notification: &Notification) -> Result<(), CapabilityError> {
        let channel = notification.channel.as_deref().unwrap_or("default");
        info!(target: "workflow::notification", channel, "{}", notification.message);
        Ok(())
    }
}

/// Webhook delivery over HTTP.
pub struct HttpWebhook {
    client: reqwest::Client,
}

impl Default for HttpWebhook {
    fn default() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl WebhookDelivery for HttpWebhook {
    async fn deliver(&self, request: WebhookRequest) -> Result<WebhookResponse, CapabilityError> {
        let method = Method::from_bytes(request.method.to_uppercase().as_bytes())
            .map_err(|e| CapabilityError::Fatal(format!("invalid HTTP method '{}': {e}", request.method)))?;

        let mut builder = self
            .client
            .request(method, &request.url)
            .timeout(request.timeout)
            .json(&request.payload);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_builder() {
                CapabilityError::Fatal(format!("invalid webhook request: {e}"))
            } else {
                CapabilityError::Retryable(format!("webhook request failed: {e}"))
            }
        })?;

        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| CapabilityError::Retryable(format!("failed to read webhook response: {e}")))?;
        let body = serde_json::from_str(&text).unwrap_or(Value::String(text));

        Ok(WebhookResponse { status, body })
    }
}

/// The capability set the `run` command starts the engine with.
pub fn cli_capabilities() -> Capabilities {
    Capabilities::new()
        .with_action("log", Arc::new(LogAction))
        .with_action("echo", Arc::new(EchoAction))
        .with_webhook(Arc::new(HttpWebhook::default()))
        .with_notifications(Arc::new(LogSink))
}
