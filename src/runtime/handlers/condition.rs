/// Condition node handler
///
/// Extracts a value from the merged input with a JSONPath expression and
/// compares it against a configured operand. The output carries the verdict
/// and the selected value, so downstream scripts can branch on `matched`.

use crate::runtime::error::NodeFailure;
use crate::runtime::handler::{require_str, HandlerContext, NodeHandler};
use async_trait::async_trait;
use serde_json::{json, Value};

pub struct ConditionHandler;

fn as_f64(value: &Value) -> Option<f64> {
    value.as_f64()
}

fn compare(operator: &str, selected: Option<&Value>, operand: Option<&Value>) -> Result<bool, NodeFailure> {
    let matched = match operator {
        "exists" => selected.is_some(),
        "not_exists" => selected.is_none(),
        "eq" => matches!((selected, operand), (Some(s), Some(o)) if s == o),
        "ne" => match (selected, operand) {
            (Some(s), Some(o)) => s != o,
            _ => false,
        },
        "gt" | "gte" | "lt" | "lte" => {
            let (s, o) = match (selected.and_then(as_f64), operand.and_then(as_f64)) {
                (Some(s), Some(o)) => (s, o),
                _ => return Ok(false),
            };
            match operator {
                "gt" => s > o,
                "gte" => s >= o,
                "lt" => s < o,
                _ => s <= o,
            }
        }
        "contains" => match (selected, operand) {
            (Some(Value::String(s)), Some(Value::String(o))) => s.contains(o.as_str()),
            (Some(Value::Array(items)), Some(o)) => items.contains(o),
            _ => false,
        },
        other => {
            return Err(NodeFailure::config(format!(
                "unknown condition operator: {other}"
            )))
        }
    };
    Ok(matched)
}

#[async_trait]
impl NodeHandler for ConditionHandler {
    async fn execute(
        &self,
        config: &Value,
        input: Value,
        ctx: &HandlerContext,
    ) -> Result<Value, NodeFailure> {
        let path = require_str(config, "path")?;
        let operator = config
            .get("operator")
            .and_then(|o| o.as_str())
            .unwrap_or("exists");
        let operand = config.get("value");

        let selected = jsonpath_lib::select(&input, path)
            .map_err(|e| NodeFailure::config(format!("invalid JSONPath '{path}': {e}")))?;
        let selected = selected.first().copied();

        let matched = compare(operator, selected, operand)?;

        tracing::debug!(
            "🔀 Node '{}': {} {} → {}",
            ctx.node_id,
            path,
            operator,
            matched
        );

        Ok(json!({
            "matched": matched,
            "selected": selected.cloned().unwrap_or(Value::Null),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;
    use std::time::Duration;
    use uuid::Uuid;

    fn ctx() -> HandlerContext {
        HandlerContext {
            run_id: Uuid::new_v4(),
            workflow_id: "wf".to_string(),
            node_id: "c1".to_string(),
            variables: HashMap::new(),
            remaining_budget: Duration::from_secs(5),
        }
    }

    async fn run(config: Value, input: Value) -> Value {
        ConditionHandler.execute(&config, input, &ctx()).await.unwrap()
    }

    #[tokio::test]
    async fn default_operator_checks_existence() {
        let out = run(json!({"path": "$.user.id"}), json!({"user": {"id": 1}})).await;
        assert_eq!(out["matched"], json!(true));
        assert_eq!(out["selected"], json!(1));

        let out = run(json!({"path": "$.user.email"}), json!({"user": {"id": 1}})).await;
        assert_eq!(out["matched"], json!(false));
    }

    #[tokio::test]
    async fn numeric_comparison() {
        let input = json!({"score": 0.87});
        let out = run(json!({"path": "$.score", "operator": "gte", "value": 0.8}), input.clone()).await;
        assert_eq!(out["matched"], json!(true));

        let out = run(json!({"path": "$.score", "operator": "lt", "value": 0.8}), input).await;
        assert_eq!(out["matched"], json!(false));
    }

    #[tokio::test]
    async fn equality_on_strings() {
        let out = run(
            json!({"path": "$.status", "operator": "eq", "value": "active"}),
            json!({"status": "active"}),
        )
        .await;
        assert_eq!(out["matched"], json!(true));
    }

    #[tokio::test]
    async fn contains_on_arrays() {
        let out = run(
            json!({"path": "$.tags", "operator": "contains", "value": "beta"}),
            json!({"tags": ["alpha", "beta"]}),
        )
        .await;
        assert_eq!(out["matched"], json!(true));
    }

    #[tokio::test]
    async fn invalid_path_is_configuration_error() {
        let err = ConditionHandler
            .execute(&json!({"path": "$[[["}), json!({}), &ctx())
            .await
            .unwrap_err();
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn unknown_operator_is_configuration_error() {
        let err = ConditionHandler
            .execute(
                &json!({"path": "$.x", "operator": "almost"}),
                json!({"x": 1}),
                &ctx(),
            )
            .await
            .unwrap_err();
        assert!(!err.is_retryable());
    }
}
