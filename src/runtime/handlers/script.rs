/// Script node handler (embedded Lua)
///
/// Runs a user-supplied Lua script against the node's merged input and uses
/// the script's return value as the node output. The Lua state is created
/// fresh per invocation and sandboxed (no os/io/debug/package). Script errors
/// are deterministic, so every failure here is a configuration error.

use crate::runtime::error::NodeFailure;
use crate::runtime::handler::{require_str, HandlerContext, NodeHandler};
use async_trait::async_trait;
use mlua::LuaSerdeExt;
use serde_json::Value;

pub struct ScriptHandler;

#[async_trait]
impl NodeHandler for ScriptHandler {
    async fn execute(
        &self,
        config: &Value,
        input: Value,
        ctx: &HandlerContext,
    ) -> Result<Value, NodeFailure> {
        let script = require_str(config, "script")?;

        tracing::debug!("🧠 Node '{}': running Lua script", ctx.node_id);

        // Fresh Lua state per invocation; nothing leaks between runs. All the
        // Lua work is synchronous, so the state never crosses an await point.
        let lua = mlua::Lua::new();
        let globals = lua.globals();

        // Sandbox: scripts transform data, they don't touch the host
        let _ = globals.set("os", mlua::Nil);
        let _ = globals.set("io", mlua::Nil);
        let _ = globals.set("debug", mlua::Nil);
        let _ = globals.set("package", mlua::Nil);

        let lua_input = lua
            .to_value(&input)
            .map_err(|e| NodeFailure::config(format!("failed to convert input for Lua: {e}")))?;
        globals
            .set("input", lua_input)
            .map_err(|e| NodeFailure::config(format!("failed to set Lua input: {e}")))?;

        let result: mlua::Value = lua
            .load(script)
            .eval()
            .map_err(|e| NodeFailure::config(format!("Lua script failed: {e}")))?;

        lua.from_value(result)
            .map_err(|e| NodeFailure::config(format!("script returned unconvertible value: {e}")))
    }
}
