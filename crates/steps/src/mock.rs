//! Test doubles for host capabilities and the clock.
//!
//! Useful in unit and integration tests where a real action backend, HTTP
//! endpoint or notification channel is either unavailable or irrelevant.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;
use tokio::sync::watch;

use crate::capability::{
    ActionHandler, Notification, NotificationSink, WebhookDelivery, WebhookRequest,
    WebhookResponse,
};
use crate::clock::Clock;
use crate::CapabilityError;

// ---------------------------------------------------------------------------
// MockAction
// ---------------------------------------------------------------------------

/// Behaviour injected into `MockAction` at construction time.
pub enum MockBehaviour {
    /// Return a specific JSON value.
    ReturnValue(Value),
    /// Fail with a `Retryable` error.
    FailRetryable(String),
    /// Fail with a `Fatal` error.
    FailFatal(String),
    /// Fail with `Retryable` for the first `n` calls, then return the value.
    FlakyThen(usize, Value),
}

/// An action handler that records every call it receives and returns a
/// programmer-specified result.
pub struct MockAction {
    pub behaviour: MockBehaviour,
    calls: Mutex<Vec<Value>>,
}

impl MockAction {
    fn with(behaviour: MockBehaviour) -> Self {
        Self {
            behaviour,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Create a mock that always succeeds with the given value.
    pub fn returning(value: Value) -> Self {
        Self::with(MockBehaviour::ReturnValue(value))
    }

    /// Create a mock that always fails with a `Fatal` error.
    pub fn failing_fatal(msg: impl Into<String>) -> Self {
        Self::with(MockBehaviour::FailFatal(msg.into()))
    }

    /// Create a mock that always fails with a `Retryable` error.
    pub fn failing_retryable(msg: impl Into<String>) -> Self {
        Self::with(MockBehaviour::FailRetryable(msg.into()))
    }

    /// Create a mock that fails `failures` times before succeeding.
    pub fn flaky(failures: usize, value: Value) -> Self {
        Self::with(MockBehaviour::FlakyThen(failures, value))
    }

    /// Every `params` value seen, in call order.
    pub fn calls(&self) -> Vec<Value> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of times this action has been invoked.
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl ActionHandler for MockAction {
    async fn call(&self, params: Value) -> Result<Value, CapabilityError> {
        let seen = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(params);
            calls.len()
        };

        match &self.behaviour {
            MockBehaviour::ReturnValue(v) => Ok(v.clone()),
            MockBehaviour::FailRetryable(msg) => Err(CapabilityError::Retryable(msg.clone())),
            MockBehaviour::FailFatal(msg)     => Err(CapabilityError::Fatal(msg.clone())),
            MockBehaviour::FlakyThen(failures, v) => {
                if seen <= *failures {
                    Err(CapabilityError::Retryable(format!("transient failure #{seen}")))
                } else {
                    Ok(v.clone())
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// RecordingSink
// ---------------------------------------------------------------------------

/// A notification sink that keeps every message it is given.
pub struct RecordingSink {
    available: bool,
    sent: Mutex<Vec<Notification>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self {
            available: true,
            sent: Mutex::new(Vec::new()),
        }
    }

    /// A sink that rejects every notification.
    pub fn unavailable() -> Self {
        Self {
            available: false,
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.sent.lock().unwrap().clone()
    }

    pub fn messages(&self) -> Vec<String> {
        self.notifications().into_iter().map(|n| n.message).collect()
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn send(&self, notification: &Notification) -> Result<(), CapabilityError> {
        if !self.available {
            return Err(CapabilityError::Fatal("sink unavailable".into()));
        }
        self.sent.lock().unwrap().push(notification.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MockWebhook
// ---------------------------------------------------------------------------

/// A webhook delivery that records requests and returns a canned result.
pub struct MockWebhook {
    result: Result<WebhookResponse, CapabilityError>,
    hang: bool,
    requests: Mutex<Vec<WebhookRequest>>,
}

impl MockWebhook {
    fn with(result: Result<WebhookResponse, CapabilityError>, hang: bool) -> Self {
        Self {
            result,
            hang,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn responding(status: u16, body: Value) -> Self {
        Self::with(Ok(WebhookResponse { status, body }), false)
    }

    /// Every call fails at the transport level.
    pub fn unreachable(msg: impl Into<String>) -> Self {
        Self::with(Err(CapabilityError::Retryable(msg.into())), false)
    }

    /// Every call is accepted and never answered.
    pub fn hanging() -> Self {
        Self::with(Ok(WebhookResponse { status: 200, body: Value::Null }), true)
    }

    pub fn requests(&self) -> Vec<WebhookRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl WebhookDelivery for MockWebhook {
    async fn deliver(&self, request: WebhookRequest) -> Result<WebhookResponse, CapabilityError> {
        self.requests.lock().unwrap().push(request);
        if self.hang {
            std::future::pending::<()>().await;
        }
        self.result.clone()
    }
}

// ---------------------------------------------------------------------------
// VirtualClock
// ---------------------------------------------------------------------------

/// A clock that only moves when told to.
///
/// `sleep` resolves once [`VirtualClock::advance`] has moved the clock past
/// the sleeper's deadline, so delayed executions can be held suspended for
/// as long as a test needs.
pub struct VirtualClock {
    now: watch::Sender<DateTime<Utc>>,
    sleeping: AtomicUsize,
}

impl VirtualClock {
    pub fn new() -> Self {
        Self::starting_at(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
    }

    pub fn starting_at(start: DateTime<Utc>) -> Self {
        let (now, _) = watch::channel(start);
        Self {
            now,
            sleeping: AtomicUsize::new(0),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.now.send_modify(|now| *now = offset(*now, by));
    }

    /// Number of `sleep` calls currently waiting.
    pub fn pending_sleeps(&self) -> usize {
        self.sleeping.load(Ordering::SeqCst)
    }
}

impl Default for VirtualClock {
    fn default() -> Self {
        Self::new()
    }
}

fn offset(from: DateTime<Utc>, by: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(by)
        .ok()
        .and_then(|by| from.checked_add_signed(by))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

struct SleepGuard<'a>(&'a AtomicUsize);

impl Drop for SleepGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Clock for VirtualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.borrow()
    }

    async fn sleep(&self, duration: Duration) {
        let deadline = offset(self.now(), duration);
        let mut rx = self.now.subscribe();

        self.sleeping.fetch_add(1, Ordering::SeqCst);
        let _guard = SleepGuard(&self.sleeping);
        loop {
            let reached = *rx.borrow_and_update() >= deadline;
            if reached || rx.changed().await.is_err() {
                break;
            }
        }
    }
}
