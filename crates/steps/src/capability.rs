//! Host-supplied capabilities the built-in executors delegate to.
//!
//! The engine never performs side effects itself: actions, webhook delivery
//! and notification delivery are injected by the host at startup.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::CapabilityError;

// ---------------------------------------------------------------------------
// Actions
// ---------------------------------------------------------------------------

/// A named side-effecting operation invoked by `action` steps.
#[async_trait]
pub trait ActionHandler: Send + Sync {
    /// Run the action with already-rendered `params` and return its output.
    async fn call(&self, params: Value) -> Result<Value, CapabilityError>;
}

/// Maps action names to handlers.
pub type ActionRegistry = HashMap<String, Arc<dyn ActionHandler>>;

// ---------------------------------------------------------------------------
// Webhooks
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookRequest {
    pub url: String,
    pub method: String,
    pub headers: BTreeMap<String, String>,
    pub payload: Value,
    pub timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookResponse {
    pub status: u16,
    #[serde(default)]
    pub body: Value,
}

impl WebhookResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Performs the actual outbound HTTP call (and any signing) for `webhook`
/// steps. Transport failures are reported as errors; HTTP error statuses are
/// reported as a response and judged by the executor.
#[async_trait]
pub trait WebhookDelivery: Send + Sync {
    async fn deliver(&self, request: WebhookRequest) -> Result<WebhookResponse, CapabilityError>;
}

// ---------------------------------------------------------------------------
// Notifications
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub message: String,
    pub channel: Option<String>,
}

/// Receives rendered notification text.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn send(&self, notification: &Notification) -> Result<(), CapabilityError>;
}

// ---------------------------------------------------------------------------
// Capabilities bundle
// ---------------------------------------------------------------------------

/// Everything the host injects for the built-in executors.
///
/// Missing capabilities are not a construction error: a step that needs one
/// fails at run time with a host-capability error.
#[derive(Clone, Default)]
pub struct Capabilities {
    pub actions: ActionRegistry,
    pub webhook: Option<Arc<dyn WebhookDelivery>>,
    pub notifications: Option<Arc<dyn NotificationSink>>,
}

impl Capabilities {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_action(mut self, name: impl Into<String>, handler: Arc<dyn ActionHandler>) -> Self {
        self.actions.insert(name.into(), handler);
        self
    }

    pub fn with_webhook(mut self, delivery: Arc<dyn WebhookDelivery>) -> Self {
        self.webhook = Some(delivery);
        self
    }

    pub fn with_notifications(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.notifications = Some(sink);
        self
    }
}

impl std::fmt::Debug for Capabilities {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut actions: Vec<&str> = self.actions.keys().map(String::as_str).collect();
        actions.sort_unstable();
        f.debug_struct("Capabilities")
            .field("actions", &actions)
            .field("webhook", &self.webhook.is_some())
            .field("notifications", &self.notifications.is_some())
            .finish()
    }
}
