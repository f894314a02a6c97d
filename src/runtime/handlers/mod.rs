/// Built-in node handlers
///
/// The standard node vocabulary: HTTP calls, SQL against the data store, Lua
/// transforms, JSONPath conditions and delays. Everything here goes through
/// the same NodeHandler contract as user-provided handlers.

pub mod condition;
pub mod database_query;
pub mod delay;
pub mod http_request;
pub mod script;

use crate::runtime::registry::HandlerRegistry;
use sqlx::sqlite::SqlitePool;
use std::sync::Arc;

/// Register the built-in handler set under its canonical type tags
pub fn register_builtins(registry: &mut HandlerRegistry, data_pool: SqlitePool) {
    registry.register("http_request", Arc::new(http_request::HttpRequestHandler::new()));
    registry.register("database_query", Arc::new(database_query::DatabaseQueryHandler::new(data_pool)));
    registry.register("script", Arc::new(script::ScriptHandler));
    registry.register("condition", Arc::new(condition::ConditionHandler));
    registry.register("delay", Arc::new(delay::DelayHandler));
}
