/// Delay node handler
///
/// Sleeps for a configured interval, then passes its input through unchanged.
/// Mostly useful for pacing external systems; the run-level timeout still
/// applies, so a delay longer than the remaining budget times the run out.

use crate::runtime::error::NodeFailure;
use crate::runtime::handler::{HandlerContext, NodeHandler};
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

pub struct DelayHandler;

#[async_trait]
impl NodeHandler for DelayHandler {
    async fn execute(
        &self,
        config: &Value,
        input: Value,
        ctx: &HandlerContext,
    ) -> Result<Value, NodeFailure> {
        let millis = match (config.get("ms"), config.get("seconds")) {
            (Some(ms), _) => ms
                .as_u64()
                .ok_or_else(|| NodeFailure::config("'ms' must be a non-negative integer"))?,
            (None, Some(secs)) => secs
                .as_u64()
                .and_then(|s| s.checked_mul(1000))
                .ok_or_else(|| {
                    NodeFailure::config("'seconds' must be a non-negative integer in millisecond range")
                })?,
            (None, None) => {
                return Err(NodeFailure::config("delay requires 'ms' or 'seconds'"))
            }
        };

        tracing::debug!("⏸️ Node '{}': sleeping {}ms", ctx.node_id, millis);
        tokio::time::sleep(Duration::from_millis(millis)).await;

        Ok(input)
    }
}
