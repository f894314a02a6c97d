/// HTTP request node handler
///
/// Calls an external HTTP endpoint and exposes the response (status, headers,
/// parsed body) as the node output. Network-level failures and 5xx responses
/// are transient; bad config and 4xx responses are configuration errors.

use crate::runtime::error::NodeFailure;
use crate::runtime::handler::{require_str, HandlerContext, NodeHandler};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;

pub struct HttpRequestHandler {
    client: reqwest::Client,
}

impl HttpRequestHandler {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for HttpRequestHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NodeHandler for HttpRequestHandler {
    async fn execute(
        &self,
        config: &Value,
        input: Value,
        ctx: &HandlerContext,
    ) -> Result<Value, NodeFailure> {
        let url = require_str(config, "url")?;
        let method = config
            .get("method")
            .and_then(|m| m.as_str())
            .unwrap_or("GET");

        tracing::debug!("🌐 Node '{}': {} {}", ctx.node_id, method, url);

        let mut request = match method.to_uppercase().as_str() {
            "GET" => self.client.get(url),
            "POST" => self.client.post(url),
            "PUT" => self.client.put(url),
            "DELETE" => self.client.delete(url),
            "PATCH" => self.client.patch(url),
            other => {
                return Err(NodeFailure::config(format!(
                    "unsupported HTTP method: {other}"
                )))
            }
        };

        if let Some(headers) = config.get("headers").and_then(|h| h.as_object()) {
            for (key, value) in headers {
                if let Some(header_value) = value.as_str() {
                    request = request.header(key, header_value);
                }
            }
        }

        // Explicit config body wins; otherwise body-carrying methods forward
        // the node's merged input.
        let body = match config.get("body") {
            Some(body) => Some(body),
            None if matches!(method.to_uppercase().as_str(), "POST" | "PUT" | "PATCH") => {
                Some(&input)
            }
            None => None,
        };
        if let Some(body) = body {
            request = request.json(body);
        }

        // Stay within the run's remaining budget so a slow endpoint fails
        // this attempt instead of stalling the whole run.
        let response = request
            .timeout(ctx.remaining_budget)
            .send()
            .await
            .map_err(|e| NodeFailure::transient(format!("HTTP request failed: {e}")))?;

        let status = response.status();
        let headers: HashMap<String, String> = response
            .headers()
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|s| (k.to_string(), s.to_string())))
            .collect();

        let text = response
            .text()
            .await
            .map_err(|e| NodeFailure::transient(format!("failed to read response body: {e}")))?;

        if status.is_server_error() {
            return Err(NodeFailure::transient(format!(
                "upstream returned {status}: {text}"
            )));
        }
        if status.is_client_error() {
            return Err(NodeFailure::config(format!(
                "upstream rejected request with {status}: {text}"
            )));
        }

        tracing::debug!("📡 Node '{}': {} {} → {}", ctx.node_id, method, url, status);

        // Parse the body as JSON when possible, fall back to raw text
        let body = serde_json::from_str::<Value>(&text).unwrap_or(Value::String(text));
        Ok(json!({
            "status": status.as_u16(),
            "headers": headers,
            "body": body,
        }))
    }
}
