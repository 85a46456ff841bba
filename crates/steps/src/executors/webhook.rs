//! `webhook` steps: deliver the execution context to an HTTP endpoint.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use super::retry::{with_retry, RetryPolicy};
use crate::capability::{WebhookDelivery, WebhookRequest};
use crate::model::Step;
use crate::template::render;
use crate::traits::{StepContext, StepExecutor, StepOutcome};
use crate::{CapabilityError, Interrupted};

pub const DEFAULT_WEBHOOK_TIMEOUT: Duration = Duration::from_secs(30);

/// Config: `{ "url": template, "method"?: "POST", "headers"?: {..},
/// "timeoutMs"?: ms, "retries"?: n, "retryDelayMs"?: ms }`.
///
/// A transport error, a timeout, or a non-2xx status fails the step. 5xx and
/// 429 responses count as retryable.
pub struct WebhookExecutor {
    delivery: Option<Arc<dyn WebhookDelivery>>,
    default_timeout: Duration,
}

impl WebhookExecutor {
    pub fn new(delivery: Option<Arc<dyn WebhookDelivery>>) -> Self {
        Self {
            delivery,
            default_timeout: DEFAULT_WEBHOOK_TIMEOUT,
        }
    }

    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    fn build_request(&self, step: &Step, ctx: &StepContext<'_>) -> Result<WebhookRequest, String> {
        let url = step
            .config
            .get("url")
            .and_then(Value::as_str)
            .map(|raw| render(raw, ctx))
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| "webhook step requires a `url`".to_string())?;

        let method = step
            .config
            .get("method")
            .and_then(Value::as_str)
            .unwrap_or("POST")
            .to_ascii_uppercase();

        let headers: BTreeMap<String, String> = step
            .config
            .get("headers")
            .and_then(Value::as_object)
            .map(|map| {
                map.iter()
                    .map(|(k, v)| {
                        let value = match v {
                            Value::String(s) => render(s, ctx),
                            other => other.to_string(),
                        };
                        (k.clone(), value)
                    })
                    .collect()
            })
            .unwrap_or_default();

        let timeout = step
            .config
            .get("timeoutMs")
            .and_then(Value::as_u64)
            .map(Duration::from_millis)
            .unwrap_or(self.default_timeout);

        Ok(WebhookRequest {
            url,
            method,
            headers,
            payload: ctx.to_payload(),
            timeout,
        })
    }
}

#[async_trait]
impl StepExecutor for WebhookExecutor {
    async fn execute(&self, step: &Step, ctx: &StepContext<'_>) -> Result<StepOutcome, Interrupted> {
        let Some(delivery) = &self.delivery else {
            return Ok(StepOutcome::failure("no webhook delivery configured"));
        };
        let request = match self.build_request(step, ctx) {
            Ok(request) => request,
            Err(reason) => return Ok(StepOutcome::failure(reason)),
        };
        let policy = RetryPolicy::from_config(&step.config);
        debug!(step_id = %step.id, url = %request.url, method = %request.method, "delivering webhook");

        let clock = ctx.clock;
        let attempt = || {
            let request = request.clone();
            let delivery = Arc::clone(delivery);
            async move {
                // The timeout runs on the execution's clock, not wall time.
                let timeout = request.timeout;
                let response = tokio::select! {
                    result = delivery.deliver(request) => result?,
                    _ = clock.sleep(timeout) => {
                        return Err(CapabilityError::Retryable(format!("timed out after {timeout:?}")));
                    }
                };

                match response.status {
                    _ if response.is_success() => Ok(response),
                    429 | 500..=599 => Err(CapabilityError::Retryable(format!(
                        "webhook returned HTTP {}",
                        response.status
                    ))),
                    status => Err(CapabilityError::Fatal(format!("webhook returned HTTP {status}"))),
                }
            }
        };

        match with_retry(step, policy, ctx, attempt).await? {
            Ok(response) => Ok(StepOutcome::success(json!({
                "status": response.status,
                "body": response.body,
            }))),
            Err(err) => Ok(StepOutcome::failure(err.message())),
        }
    }
}
