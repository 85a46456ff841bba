//! `steps` crate: step definitions, the `StepExecutor` trait and the
//! built-in executors.
//!
//! Every step kind, built-in or host-overridden, runs through
//! [`StepExecutor`]. The engine crate dispatches execution through this
//! trait object and never performs side effects itself; those go through
//! the host capabilities in [`capability`].

pub mod capability;
pub mod clock;
pub mod condition;
pub mod error;
pub mod executors;
pub mod mock;
pub mod model;
pub mod template;
pub mod traits;

pub use capability::{
    ActionHandler, ActionRegistry, Capabilities, Notification, NotificationSink, WebhookDelivery,
    WebhookRequest, WebhookResponse,
};
pub use clock::{Clock, TokioClock};
pub use condition::{evaluate, evaluate_all, lookup_path, Lookup};
pub use error::{CapabilityError, Interrupted};
pub use executors::{builtin_executors, ExecutorRegistry};
pub use model::{Condition, ConditionOperator, Step, StepKind};
pub use traits::{Route, StepContext, StepExecutor, StepOutcome, StepStatus};
