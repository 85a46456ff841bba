//! `condition` steps: branch on a predicate over the execution context.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::condition::evaluate_all;
use crate::model::{Condition, Step};
use crate::traits::{StepContext, StepExecutor, StepOutcome};
use crate::Interrupted;

/// Config: `{ "conditions": [Condition] }`.
///
/// True follows `next_step_id`. False follows `on_error_step_id` when the
/// step has one; otherwise the step is recorded as skipped and the
/// execution completes successfully.
pub struct ConditionExecutor;

#[async_trait]
impl StepExecutor for ConditionExecutor {
    async fn execute(&self, step: &Step, ctx: &StepContext<'_>) -> Result<StepOutcome, Interrupted> {
        let conditions: Vec<Condition> = match step.config.get("conditions") {
            None | Some(Value::Null) => Vec::new(),
            Some(raw) => match serde_json::from_value(raw.clone()) {
                Ok(conditions) => conditions,
                Err(e) => return Ok(StepOutcome::failure(format!("invalid conditions: {e}"))),
            },
        };

        let matched = evaluate_all(&conditions, ctx);
        let output = json!({ "matched": matched });

        Ok(if matched {
            StepOutcome::success(output)
        } else if step.has_error_successor() {
            StepOutcome::divert(output)
        } else {
            StepOutcome::skipped(output)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::TokioClock;
    use crate::executors::test_support::Fixture;
    use crate::model::StepKind;
    use crate::traits::{Route, StepStatus};

    fn step(conditions: Value) -> Step {
        Step::new("check", StepKind::Condition, json!({ "conditions": conditions }))
    }

    #[tokio::test]
    async fn true_predicate_routes_to_next() {
        let fixture = Fixture::new(json!({ "tier": "gold" }));
        let outcome = ConditionExecutor
            .execute(
                &step(json!([{ "field": "tier", "operator": "equals", "value": "gold" }])),
                &fixture.ctx(&TokioClock),
            )
            .await
            .unwrap();

        assert_eq!(outcome.route, Route::Next);
        assert_eq!(outcome.output, json!({ "matched": true }));
    }

    #[tokio::test]
    async fn false_predicate_with_error_successor_diverts() {
        let fixture = Fixture::new(json!({ "tier": "basic" }));
        let outcome = ConditionExecutor
            .execute(
                &step(json!([{ "field": "tier", "operator": "equals", "value": "gold" }]))
                    .on_error("fallback"),
                &fixture.ctx(&TokioClock),
            )
            .await
            .unwrap();

        assert_eq!(outcome.status, StepStatus::Success);
        assert_eq!(outcome.route, Route::OnError);
    }

    #[tokio::test]
    async fn false_predicate_without_error_successor_is_skipped() {
        let fixture = Fixture::new(json!({}));
        let outcome = ConditionExecutor
            .execute(
                &step(json!([{ "field": "tier", "operator": "exists" }])),
                &fixture.ctx(&TokioClock),
            )
            .await
            .unwrap();

        assert_eq!(outcome.status, StepStatus::Skipped);
        assert_eq!(outcome.route, Route::Halt);
    }

    #[tokio::test]
    async fn malformed_conditions_fail_the_step() {
        let fixture = Fixture::new(json!({}));
        let outcome = ConditionExecutor
            .execute(&step(json!("tier == gold")), &fixture.ctx(&TokioClock))
            .await
            .unwrap();

        assert_eq!(outcome.status, StepStatus::Failure);
    }
}
